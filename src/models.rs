// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Identity Domain Models
//!
//! This module defines the persisted identity records the authentication
//! layer resolves tokens against. All API-facing types derive `Serialize`,
//! `Deserialize`, and `ToSchema` for automatic JSON handling and OpenAPI
//! documentation.
//!
//! ## Model Categories
//!
//! - **Identity**: a person known to the system, keyed by external identifier
//! - **Account**: a sub-identity under one Identity (multi-account support)
//! - **RosterEntry**: phone number → institutional identifier mapping
//!
//! ## External Identifiers
//!
//! The external identifier is the stable string correlating a person across
//! login sessions: an institutional ID for federated logins, or the
//! roster-resolved institutional ID for phone logins. Phone numbers are
//! never used directly as external identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// =============================================================================
// Identity
// =============================================================================

/// A person known to the system.
///
/// Created on first successful login. Verified claims (email, SSO UIN, group
/// memberships) are synchronized from the token on every authenticated load.
/// The encrypted blobs are owned by client-side encryption and opaque here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Identity {
    /// Internal identifier.
    pub id: Uuid,
    /// Stable external identifier (institutional ID or roster-resolved ID).
    pub external_id: String,
    /// SSO UIN claim, when the identity has been seen through a federated
    /// login. Absent only for identities discovered before first full login.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_uin: Option<String>,
    /// Verified email claim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Verified group-membership claims, kept sorted.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Client-encrypted payload blobs, opaque to this layer.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub encrypted_blobs: Vec<serde_json::Value>,
    /// Linked accounts; exactly one is flagged default once the identity has
    /// completed the authenticated flow at least once.
    #[serde(default)]
    pub accounts: Vec<Account>,
    /// When the identity was created.
    pub created_at: DateTime<Utc>,
    /// When the identity was last mutated.
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Whether any linked account carries the default flag.
    pub fn has_default_account(&self) -> bool {
        self.accounts.iter().any(|account| account.default)
    }

    /// Whether the verified claims include the exact group scope.
    pub fn is_member_of(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// Fields needed to create a new Identity from a verified token.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    /// Stable external identifier (already roster-resolved for phone logins).
    pub external_id: String,
    /// SSO UIN claim, when federated.
    pub sso_uin: Option<String>,
    /// Verified email claim.
    pub email: Option<String>,
    /// Verified group memberships, sorted.
    pub groups: Vec<String>,
}

// =============================================================================
// Account
// =============================================================================

/// A sub-identity under one Identity.
///
/// Supports multiple linked accounts per institutional person; the default
/// account is the one used when a client does not explicitly select one.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Account {
    /// Account identifier.
    pub id: Uuid,
    /// External identifier this account is bound to.
    pub external_id: String,
    /// Whether this is the identity's default account.
    pub default: bool,
    /// Whether the account is active.
    pub active: bool,
    /// Demographic given name, when provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Demographic family name, when provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Demographic birth date (ISO 8601 date string), when provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,
}

impl Account {
    /// Build a fresh default account for an identity.
    pub fn new_default(external_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            default: true,
            active: true,
            first_name: None,
            last_name: None,
            birth_date: None,
        }
    }
}

// =============================================================================
// Roster
// =============================================================================

/// One roster record: an administrator-maintained mapping admitting a
/// non-federated (phone-only) user into the institutional identity scheme.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct RosterEntry {
    /// Enrolled phone number, as it appears in the phone token claim.
    pub phone: String,
    /// Institutional identifier the phone resolves to.
    pub external_id: String,
    /// Other demographic fields, opaque to the auth layer.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_with_accounts(accounts: Vec<Account>) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            external_id: "6500112233".into(),
            sso_uin: Some("6500112233".into()),
            email: Some("person@example.edu".into()),
            groups: vec!["urn:campus:health admin".into()],
            encrypted_blobs: Vec::new(),
            accounts,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn default_account_detection() {
        let none = identity_with_accounts(Vec::new());
        assert!(!none.has_default_account());

        let mut secondary = Account::new_default("6500112233");
        secondary.default = false;
        let without_default = identity_with_accounts(vec![secondary]);
        assert!(!without_default.has_default_account());

        let with_default = identity_with_accounts(vec![Account::new_default("6500112233")]);
        assert!(with_default.has_default_account());
    }

    #[test]
    fn group_membership_is_exact() {
        let identity = identity_with_accounts(Vec::new());
        assert!(identity.is_member_of("urn:campus:health admin"));
        assert!(!identity.is_member_of("urn:campus:health"));
        assert!(!identity.is_member_of("urn:campus:health admin "));
    }

    #[test]
    fn new_default_account_is_active_default() {
        let account = Account::new_default("6500112233");
        assert!(account.default);
        assert!(account.active);
        assert_eq!(account.external_id, "6500112233");
    }
}
