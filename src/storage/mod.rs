// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Layer
//!
//! Persistence contract for identities, rosters, and the supported-version
//! list, plus the change-notification bus the caching layers subscribe to.
//!
//! ## Design
//!
//! The auth layer is written against the `Storage` trait so deployments can
//! swap the backing store without touching token validation or caching.
//! The bundled [`memory::MemoryStorage`] keeps everything in process memory
//! and is the default for development and tests.
//!
//! ## Change Notifications
//!
//! Collaborating services may mutate the same records out of band. Every
//! backend therefore carries a broadcast [`StorageEvent`] bus; the identity
//! cache, roster index, and version resolver subscribe and refresh or
//! invalidate on receipt. In-process mutations publish the same events, so
//! subscribers never need to distinguish local from remote writes.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::{Identity, RosterEntry};

// =============================================================================
// Errors
// =============================================================================

/// Errors surfaced by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend is unreachable or failed mid-operation.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// A stored record failed to decode.
    #[error("corrupt record for {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

// =============================================================================
// Change Notifications
// =============================================================================

/// Broadcast on every mutation, local or collaborator-driven.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    /// The supported-version list changed.
    ConfigChanged,
    /// The roster was replaced.
    RosterChanged,
    /// One identity's record changed.
    IdentityUpdated { external_id: String },
    /// One identity's data was cleared or the identity removed.
    IdentityCleared { external_id: String },
}

// =============================================================================
// Storage Contract
// =============================================================================

/// Persistence operations the auth and version layers depend on.
///
/// Mutating operations must publish the matching [`StorageEvent`] after the
/// write is durable, never before.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Load one identity by its stable external identifier.
    async fn get_identity(&self, external_id: &str) -> Result<Option<Identity>, StorageError>;

    /// Insert or replace one identity record.
    async fn put_identity(&self, identity: &Identity) -> Result<(), StorageError>;

    /// Wipe an identity's accounts and encrypted blobs, keeping the record
    /// itself so the external identifier stays known. Returns the cleared
    /// identity, or `None` when nothing was stored under the identifier.
    async fn clear_identity_data(
        &self,
        external_id: &str,
    ) -> Result<Option<Identity>, StorageError>;

    /// Load the full roster.
    async fn list_roster(&self) -> Result<Vec<RosterEntry>, StorageError>;

    /// Replace the roster wholesale. Returns the new entry count.
    async fn replace_roster(&self, entries: Vec<RosterEntry>) -> Result<usize, StorageError>;

    /// Load the ordered supported-version list (newest first).
    async fn get_supported_versions(&self) -> Result<Vec<String>, StorageError>;

    /// Replace the supported-version list wholesale.
    async fn set_supported_versions(&self, versions: Vec<String>) -> Result<(), StorageError>;

    /// Subscribe to the change-notification bus.
    fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;
}
