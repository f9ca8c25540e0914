// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for the three caller audiences.
//!
//! Use the matching extractor in handlers to require a tier:
//!
//! ```rust,ignore
//! async fn get_user(AuthUser(outcome): AuthUser) -> impl IntoResponse {
//!     // outcome is UserOutcome (registered or not, both verified)
//! }
//! ```
//!
//! Token material is accepted from two transports: an
//! `Authorization: Bearer` header (mobile clients) or the configured auth
//! cookie plus a `CSRF` companion header (web clients). The transport is
//! passed through to verification because the legacy SSO scheme expects a
//! different audience per transport and the modern scheme requires the CSRF
//! companion for cookies.

use axum::{
    extract::FromRequestParts,
    http::{
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
    },
};

use super::claims::TokenSource;
use super::error::AuthError;
use super::gate::{AdminPrincipal, UserOutcome};
use crate::state::AppState;

/// Header carrying the static key for anonymous clients.
pub const API_KEY_HEADER: &str = "API-KEY";

/// Header carrying the CSRF companion token for cookie transport.
pub const CSRF_HEADER: &str = "CSRF";

/// Header naming the group scope an admin request claims.
pub const GROUP_HEADER: &str = "GROUP";

/// Header carrying the client's requested interface version.
pub const CLIENT_VERSION_HEADER: &str = "v";

// =============================================================================
// API-Key Tier
// =============================================================================

/// Extractor for anonymous clients presenting a static API key.
///
/// Also picks up the optional `v` header so version-scoped handlers can
/// resolve the client's interface version.
pub struct ApiKeyClient {
    pub requested_version: Option<String>,
}

impl FromRequestParts<AppState> for ApiKeyClient {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let presented = optional_header(parts, API_KEY_HEADER)?;
        state.auth.api_key.check(presented.as_deref())?;

        Ok(ApiKeyClient {
            requested_version: optional_header(parts, CLIENT_VERSION_HEADER)?,
        })
    }
}

// =============================================================================
// User Tier
// =============================================================================

/// Extractor for end users. Yields both registered and
/// verified-but-unregistered outcomes; handlers decide what the latter may
/// do.
pub struct AuthUser(pub UserOutcome);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credentials = extract_credentials(parts, &state.auth_cookie_name)?;
        let outcome = state
            .auth
            .user
            .check(
                &credentials.token,
                credentials.source,
                credentials.csrf_token.as_deref(),
            )
            .await?;
        Ok(AuthUser(outcome))
    }
}

// =============================================================================
// Admin Tier
// =============================================================================

/// Extractor for administrators. Requires the `GROUP` header and exact
/// membership in the named group.
pub struct AuthAdmin(pub AdminPrincipal);

impl FromRequestParts<AppState> for AuthAdmin {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let group = optional_header(parts, GROUP_HEADER)?.ok_or_else(|| {
            AuthError::MalformedRequest(format!("{GROUP_HEADER} header is required"))
        })?;

        let credentials = extract_credentials(parts, &state.auth_cookie_name)?;
        let principal = state
            .auth
            .admin
            .check(
                &credentials.token,
                credentials.source,
                credentials.csrf_token.as_deref(),
                &group,
            )
            .await?;
        Ok(AuthAdmin(principal))
    }
}

// =============================================================================
// Transport Handling
// =============================================================================

struct Credentials {
    token: String,
    source: TokenSource,
    csrf_token: Option<String>,
}

/// Pull the raw token off the request, header transport first.
fn extract_credentials(parts: &Parts, cookie_name: &str) -> Result<Credentials, AuthError> {
    let csrf_token = optional_header(parts, CSRF_HEADER)?;

    if let Some(value) = parts.headers.get(AUTHORIZATION) {
        let value = value.to_str().map_err(|_| {
            AuthError::MalformedRequest("Authorization header is not valid UTF-8".to_string())
        })?;
        let token = value.strip_prefix("Bearer ").ok_or_else(|| {
            AuthError::MalformedRequest("Authorization header must be a Bearer token".to_string())
        })?;
        return Ok(Credentials {
            token: token.to_string(),
            source: TokenSource::Header,
            csrf_token,
        });
    }

    if let Some(token) = read_cookie(parts, cookie_name)? {
        return Ok(Credentials {
            token,
            source: TokenSource::Cookie,
            csrf_token,
        });
    }

    Err(AuthError::MalformedRequest(format!(
        "Authorization header or {cookie_name} cookie is required"
    )))
}

/// Find one cookie by name across however many `Cookie` headers arrived.
fn read_cookie(parts: &Parts, name: &str) -> Result<Option<String>, AuthError> {
    for header in parts.headers.get_all(COOKIE) {
        let header = header.to_str().map_err(|_| {
            AuthError::MalformedRequest("Cookie header is not valid UTF-8".to_string())
        })?;
        for pair in header.split(';') {
            if let Some((key, value)) = pair.split_once('=') {
                if key.trim() == name {
                    return Ok(Some(value.trim().to_string()));
                }
            }
        }
    }
    Ok(None)
}

fn optional_header(parts: &Parts, name: &str) -> Result<Option<String>, AuthError> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.to_string()))
            .map_err(|_| AuthError::MalformedRequest(format!("{name} header is not valid UTF-8"))),
    }
}
