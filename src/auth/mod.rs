// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! This module provides multi-scheme token authentication and identity
//! resolution for the campus health API.
//!
//! ## Auth Flow
//!
//! 1. A client presents a JWT via `Authorization: Bearer` (mobile) or the
//!    auth cookie plus a `CSRF` companion header (web)
//! 2. The token is classified structurally by its claims:
//!    - `uiucedu_uin` → legacy federated SSO (campus OIDC provider)
//!    - `phoneNumber` → legacy phone login (pre-shared HMAC secret)
//!    - `uid` → first-party access token (rotating key set)
//! 3. The matching scheme verifies the signature, expiry, and (where the
//!    scheme defines them) issuer and audience
//! 4. The verified identifier is resolved to a stored identity — through
//!    the roster for phone logins — and claims are synchronized
//!
//! ## Security
//!
//! - Every endpoint requires one of the three tiers (API key, user, admin)
//! - SSO keys are fetched over HTTPS via OIDC discovery and cached with TTL
//! - 401-class failures share one opaque response body, so enrollment
//!   status is not observable from the outside
//! - Clock skew tolerance is 60 seconds
//! - Resolved identities are cached per tier with 5-minute idle eviction

pub mod cache;
pub mod claims;
pub mod error;
pub mod extractor;
pub mod gate;
pub mod jwks;
pub mod keyset;
pub mod provisioner;
pub mod roster;
pub mod validator;

pub use cache::IdentityCache;
pub use claims::{AuthMethod, TokenSource, VerifiedToken};
pub use error::AuthError;
pub use extractor::{ApiKeyClient, AuthAdmin, AuthUser};
pub use gate::{AdminPrincipal, Auth, UserOutcome};
pub use jwks::OidcKeyProvider;
pub use keyset::SigningKeySet;
pub use roster::RosterIndex;
pub use validator::TokenValidator;
