// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token schemes, claim shapes, and the verified-token representation.
//!
//! Three token schemes coexist: the legacy federated-SSO ID token, the legacy
//! phone JWT, and the modern access/CSRF pair. Scheme discrimination is
//! structural: the payload is decoded without verification and classified by
//! which claim keys are present, in a fixed priority order. Nothing in the
//! transport declares the scheme.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// =============================================================================
// Scheme Classification
// =============================================================================

/// The three supported token shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScheme {
    /// Federated-SSO ID token carrying an institutional UIN claim.
    LegacySso,
    /// Shared-secret phone JWT carrying a phone-number claim.
    LegacyPhone,
    /// Access/CSRF token pair carrying a generic subject claim.
    Modern,
}

impl TokenScheme {
    /// Classify an unverified payload by claim-key presence.
    ///
    /// Priority order matters: a UIN claim wins over everything else, a phone
    /// claim wins over a subject claim. Returns `None` when the payload fits
    /// no scheme.
    pub fn classify(claims: &serde_json::Value) -> Option<Self> {
        if claims.get("uiucedu_uin").is_some() {
            Some(TokenScheme::LegacySso)
        } else if claims.get("phoneNumber").is_some() {
            Some(TokenScheme::LegacyPhone)
        } else if claims.get("uid").is_some() {
            Some(TokenScheme::Modern)
        } else {
            None
        }
    }
}

/// How the token reached the server. Decides the expected SSO audience and
/// whether a CSRF companion token is required for the modern scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// `Authorization: Bearer` header (mobile clients).
    Header,
    /// Named auth cookie (web clients).
    Cookie,
}

/// Expected role of a modern-scheme token, matched against its `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Csrf,
}

impl TokenKind {
    /// The `type` claim value this kind requires.
    pub fn claim_value(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Csrf => "csrf",
        }
    }
}

// =============================================================================
// Per-Scheme Claim Shapes
// =============================================================================

/// Claims of a legacy federated-SSO ID token.
///
/// Required fields stay `Option` so absence surfaces as a domain error after
/// signature verification rather than a deserialization failure.
#[derive(Debug, Clone, Deserialize)]
pub struct SsoClaims {
    /// Institutional UIN, the canonical external identifier for SSO logins.
    #[serde(rename = "uiucedu_uin")]
    pub uin: Option<String>,
    /// Institutional group memberships.
    #[serde(rename = "uiucedu_is_member_of", default)]
    pub member_of: Option<Vec<String>>,
    /// Verified email address.
    #[serde(default)]
    pub email: Option<String>,
}

/// Claims of a legacy phone JWT. Expiry is optional in this scheme; tokens
/// that carry one are still checked against it.
#[derive(Debug, Clone, Deserialize)]
pub struct PhoneClaims {
    /// Enrolled phone number, resolved to an institutional identifier
    /// through the roster before use.
    #[serde(rename = "phoneNumber")]
    pub phone_number: Option<String>,
}

/// Claims of a modern access or CSRF token.
#[derive(Debug, Clone, Deserialize)]
pub struct ModernClaims {
    /// Stable subject identifier.
    pub uid: Option<String>,
    /// Token role: `"access"` or `"csrf"`. Checked against the slot the
    /// token was presented in to block substitution.
    #[serde(rename = "type")]
    pub token_type: Option<String>,
    /// How the underlying identity was originally established: `"oidc"` or
    /// `"phone"`.
    pub auth: Option<String>,
    /// Group memberships minted into the token.
    #[serde(default)]
    pub groups: Option<Vec<String>>,
    /// Verified email address.
    #[serde(default)]
    pub email: Option<String>,
}

// =============================================================================
// Verified Output
// =============================================================================

/// How a verified identity was originally established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Federated SSO (institutional login).
    Oidc,
    /// Phone-number login, admitted through the roster.
    Phone,
}

impl AuthMethod {
    /// Parse the modern-scheme `auth` claim value.
    pub fn from_claim(value: &str) -> Option<Self> {
        match value {
            "oidc" => Some(AuthMethod::Oidc),
            "phone" => Some(AuthMethod::Phone),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::Oidc => write!(f, "oidc"),
            AuthMethod::Phone => write!(f, "phone"),
        }
    }
}

/// Output of token verification: a verified scheme-native identifier plus the
/// claims it was extracted from. Consumed immediately by the auth gate; never
/// persisted.
///
/// For phone-derived tokens the identifier is the phone number itself; the
/// gate resolves it to an institutional identifier through the roster before
/// any identity lookup.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    /// Verified scheme-native identifier (UIN, phone number, or subject).
    pub identifier: String,
    /// How the identity behind the token was established.
    pub method: AuthMethod,
    /// Verified email claim, when the scheme carries one.
    pub email: Option<String>,
    /// Verified group memberships, sorted and deduplicated.
    pub groups: Vec<String>,
    /// Full raw claim set, for listeners that need claims this layer does
    /// not interpret.
    pub claims: serde_json::Value,
}

impl VerifiedToken {
    /// Whether the identifier still needs roster resolution before it can be
    /// used as an external identifier.
    pub fn needs_roster_resolution(&self) -> bool {
        self.method == AuthMethod::Phone
    }
}

/// Sort and deduplicate a group-membership claim so identical memberships
/// always compare equal regardless of claim ordering.
pub fn normalize_groups(groups: Option<Vec<String>>) -> Vec<String> {
    let mut groups = groups.unwrap_or_default();
    groups.sort();
    groups.dedup();
    groups
}
