// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # App Version Resolution
//!
//! Mobile clients ship asynchronously with backend configuration changes.
//! Version-scoped configuration (symptom sets, rule blobs) is published per
//! supported version, and a client's requested version degrades to the
//! nearest older supported one instead of forcing a hard upgrade.
//!
//! ## Version Form
//!
//! Canonical versions are `major.minor` or `major.minor.patch`, with a zero
//! patch normalized to the two-part form. Comparison is dotted-numeric, not
//! lexical, with one wrinkle: at an equal common prefix the two-part form
//! denotes the tip of its line and outranks any explicit patch within it, so
//! a request for `3.1.5` does not degrade to a supported `3.1` — it falls
//! past the whole `3.1` line to the next older entry.
//!
//! ## Refresh
//!
//! The supported list is loaded from persistence at startup and again on
//! every configuration change notification. Readers take an `Arc` snapshot;
//! refresh swaps the whole list atomically, never mutating in place.

use std::cmp::Ordering;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::storage::{Storage, StorageError, StorageEvent};

// =============================================================================
// Errors
// =============================================================================

/// Version resolution failures. Domain errors, not auth failures: the HTTP
/// layer maps them to 400 and 422 respectively.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The requested string is not a dotted-numeric version.
    #[error("'{0}' is not a dotted-numeric version string")]
    Malformed(String),
    /// No supported version is at or below the requested one.
    #[error("no supported version available for '{0}'")]
    Unsupported(String),
}

// =============================================================================
// SupportedVersion
// =============================================================================

/// A canonical supported version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupportedVersion {
    canonical: String,
    segments: Vec<u64>,
}

impl SupportedVersion {
    /// Parse and canonicalize a version string.
    ///
    /// Accepts one to three dot-separated decimal segments; a zero patch is
    /// dropped, so `"3.2.0"` and `"3.2"` parse identically.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(VersionError::Malformed(raw.to_string()));
        }

        let mut segments = Vec::new();
        for part in trimmed.split('.') {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionError::Malformed(raw.to_string()));
            }
            let n: u64 = part
                .parse()
                .map_err(|_| VersionError::Malformed(raw.to_string()))?;
            segments.push(n);
        }
        if segments.len() > 3 {
            return Err(VersionError::Malformed(raw.to_string()));
        }
        if segments.len() == 3 && segments[2] == 0 {
            segments.pop();
        }

        let canonical = segments
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(".");
        Ok(Self {
            canonical,
            segments,
        })
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }
}

impl std::fmt::Display for SupportedVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl Ord for SupportedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.segments.iter().zip(other.segments.iter()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                decided => return decided,
            }
        }
        // Equal common prefix: the shorter form is the tip of its line and
        // outranks any explicit patch within it.
        other.segments.len().cmp(&self.segments.len())
    }
}

impl PartialOrd for SupportedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// =============================================================================
// VersionResolver
// =============================================================================

/// Resolves a client's requested version against the supported list.
pub struct VersionResolver {
    storage: Arc<dyn Storage>,
    versions: RwLock<Arc<Vec<SupportedVersion>>>,
}

impl VersionResolver {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            versions: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Reload the supported list from persistence and swap it in.
    ///
    /// Unparseable entries are skipped with a warning, the rest are ordered
    /// newest-first and deduplicated.
    pub async fn refresh(&self) -> Result<usize, StorageError> {
        let raw = self.storage.get_supported_versions().await?;
        let mut parsed = Vec::with_capacity(raw.len());
        for entry in &raw {
            match SupportedVersion::parse(entry) {
                Ok(version) => parsed.push(version),
                Err(e) => warn!(entry = %entry, error = %e, "skipping unparseable supported version"),
            }
        }
        parsed.sort_by(|a, b| b.cmp(a));
        parsed.dedup();
        let count = parsed.len();

        let mut versions = self.versions.write().unwrap_or_else(|e| e.into_inner());
        *versions = Arc::new(parsed);
        Ok(count)
    }

    /// A snapshot of the supported list, newest first.
    pub fn supported(&self) -> Arc<Vec<SupportedVersion>> {
        let versions = self.versions.read().unwrap_or_else(|e| e.into_inner());
        versions.clone()
    }

    /// Resolve a requested version to a supported one.
    ///
    /// No request means the newest. An exact match wins; otherwise the list
    /// is scanned newest-first for the first entry older than the request.
    pub fn resolve(&self, requested: Option<&str>) -> Result<SupportedVersion, VersionError> {
        let versions = self.supported();
        match requested {
            None => versions
                .first()
                .cloned()
                .ok_or_else(|| VersionError::Unsupported("latest".to_string())),
            Some(raw) => {
                let requested = SupportedVersion::parse(raw)?;
                if let Some(exact) = versions.iter().find(|v| **v == requested) {
                    return Ok(exact.clone());
                }
                versions
                    .iter()
                    .find(|v| **v < requested)
                    .cloned()
                    .ok_or_else(|| VersionError::Unsupported(requested.to_string()))
            }
        }
    }

    /// Listen for configuration change notifications until cancelled.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(resolver.clone().run_listener(shutdown.clone()));
    /// ```
    pub async fn run_listener(self: Arc<Self>, shutdown: CancellationToken) {
        let mut events = self.storage.subscribe();
        info!("Version list listener starting");

        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(StorageEvent::ConfigChanged) => self.refresh_step().await,
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Version listener lagged behind change notifications");
                        self.refresh_step().await;
                    }
                    Err(RecvError::Closed) => {
                        info!("Version listener: notification bus closed");
                        return;
                    }
                },
                _ = shutdown.cancelled() => {
                    info!("Version listener shutting down");
                    return;
                }
            }
        }
    }

    async fn refresh_step(&self) {
        match self.refresh().await {
            Ok(count) => info!(versions = count, "Supported version list refreshed"),
            Err(e) => warn!(error = %e, "Version refresh failed; keeping previous list"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use std::time::Duration;

    async fn resolver_with(versions: &[&str]) -> VersionResolver {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set_supported_versions(versions.iter().map(|v| v.to_string()).collect())
            .await
            .unwrap();
        let resolver = VersionResolver::new(storage);
        resolver.refresh().await.unwrap();
        resolver
    }

    #[test]
    fn parse_normalizes_zero_patch() {
        assert_eq!(SupportedVersion::parse("3.2.0").unwrap().as_str(), "3.2");
        assert_eq!(SupportedVersion::parse("3.2.1").unwrap().as_str(), "3.2.1");
        assert_eq!(SupportedVersion::parse("3.0").unwrap().as_str(), "3.0");
        assert_eq!(SupportedVersion::parse(" 3.2 ").unwrap().as_str(), "3.2");
    }

    #[test]
    fn parse_rejects_junk() {
        for raw in ["", "three.two", "3.", ".2", "3.2.1.4", "3.-1", "3.+2"] {
            assert!(
                matches!(SupportedVersion::parse(raw), Err(VersionError::Malformed(_))),
                "expected {raw:?} to be rejected"
            );
        }
    }

    #[test]
    fn ordering_is_dotted_numeric() {
        let parse = |s| SupportedVersion::parse(s).unwrap();
        assert!(parse("3.2") > parse("3.1"));
        assert!(parse("3.10") > parse("3.9"));
        assert!(parse("2.9") < parse("3.0"));
        // The two-part form is the tip of its line.
        assert!(parse("3.1") > parse("3.1.5"));
        assert_eq!(parse("3.2"), parse("3.2.0"));
    }

    #[tokio::test]
    async fn resolution_degrades_to_next_older() {
        let resolver = resolver_with(&["3.2", "3.1", "3.0", "2.9"]).await;

        // Exact match after patch-0 normalization.
        assert_eq!(resolver.resolve(Some("3.2.0")).unwrap().as_str(), "3.2");
        // No exact match: falls past the 3.1 line to the next older entry.
        assert_eq!(resolver.resolve(Some("3.1.5")).unwrap().as_str(), "3.0");
        // No request means newest.
        assert_eq!(resolver.resolve(None).unwrap().as_str(), "3.2");
        // Nothing older left.
        assert_eq!(
            resolver.resolve(Some("1.0")),
            Err(VersionError::Unsupported("1.0".to_string()))
        );
    }

    #[tokio::test]
    async fn newer_clients_than_backend_get_the_newest() {
        let resolver = resolver_with(&["3.2", "3.1"]).await;
        assert_eq!(resolver.resolve(Some("4.0")).unwrap().as_str(), "3.2");
        assert_eq!(resolver.resolve(Some("3.3.7")).unwrap().as_str(), "3.2");
    }

    #[tokio::test]
    async fn malformed_requests_are_distinguished_from_unsupported() {
        let resolver = resolver_with(&["3.2"]).await;
        assert!(matches!(
            resolver.resolve(Some("latest")),
            Err(VersionError::Malformed(_))
        ));
        assert!(matches!(
            resolver.resolve(Some("2.0")),
            Err(VersionError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn refresh_orders_and_dedupes() {
        let resolver = resolver_with(&["3.0", "3.2", "not-a-version", "2.9", "3.2.0", "3.1"]).await;
        let snapshot = resolver.supported();
        let supported: Vec<&str> = snapshot.iter().map(|v| v.as_str()).collect();
        assert_eq!(supported, vec!["3.2", "3.1", "3.0", "2.9"]);
    }

    #[tokio::test]
    async fn empty_list_resolves_nothing() {
        let resolver = resolver_with(&[]).await;
        assert!(matches!(
            resolver.resolve(None),
            Err(VersionError::Unsupported(_))
        ));
        assert!(matches!(
            resolver.resolve(Some("3.2")),
            Err(VersionError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn listener_reloads_on_config_change() {
        let storage = Arc::new(MemoryStorage::new());
        let resolver = Arc::new(VersionResolver::new(storage.clone()));

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(resolver.clone().run_listener(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;

        storage
            .set_supported_versions(vec!["3.2".into(), "3.1".into()])
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(resolver.resolve(None).unwrap().as_str(), "3.2");

        shutdown.cancel();
        handle.await.unwrap();
    }
}
