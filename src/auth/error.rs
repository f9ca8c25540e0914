// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.
//!
//! ## Opaque Rejections
//!
//! Every credential failure in the 401 class maps to one identical response
//! body. A caller probing the API cannot distinguish a bad signature from an
//! unknown key or an unenrolled identity, so rejection responses leak nothing
//! about enrollment status. The specific cause is still available internally
//! via [`AuthError::error_code`] and is logged at the rejection site.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication error type.
///
/// Variants are grouped by HTTP status: 400 for requests that cannot be
/// parsed far enough to attempt verification, 401 for every credential
/// failure, 403 for authenticated-but-unauthorized, 500 for upstream faults.
#[derive(Debug)]
pub enum AuthError {
    /// Request structure prevents verification (bad header shape, unparseable
    /// version string, missing cookie named by configuration).
    MalformedRequest(String),
    /// Token matches none of the supported token shapes.
    UnsupportedTokenType,
    /// Token signature did not verify.
    InvalidSignature,
    /// Token `exp` is in the past.
    TokenExpired,
    /// Token `nbf` is in the future.
    TokenNotYetValid,
    /// Token issuer does not match the configured issuer.
    IssuerMismatch,
    /// Token audience does not match the expected client.
    AudienceMismatch,
    /// Token `kid` matched no key, or matched ambiguously.
    UnknownSigningKey,
    /// Required claim absent from an otherwise valid token.
    MissingRequiredClaim(&'static str),
    /// Token `type` claim does not fit the slot it was presented in.
    TokenTypeMismatch,
    /// Paired token subjects disagree.
    CsrfMismatch,
    /// Token verified but no identity record exists for it.
    IdentityNotProvisioned,
    /// API key matched no configured client.
    InvalidApiKey,
    /// Authenticated identity lacks the required group scope.
    InsufficientPrivilege,
    /// Key material or discovery endpoint unreachable.
    UpstreamUnavailable(String),
    /// Internal error.
    InternalError(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the internal error code for this error. Logged, never sent to
    /// callers for the 401 class.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MalformedRequest(_) => "malformed_request",
            AuthError::UnsupportedTokenType => "unsupported_token_type",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::TokenNotYetValid => "token_not_yet_valid",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::AudienceMismatch => "audience_mismatch",
            AuthError::UnknownSigningKey => "unknown_signing_key",
            AuthError::MissingRequiredClaim(_) => "missing_required_claim",
            AuthError::TokenTypeMismatch => "token_type_mismatch",
            AuthError::CsrfMismatch => "csrf_mismatch",
            AuthError::IdentityNotProvisioned => "identity_not_provisioned",
            AuthError::InvalidApiKey => "invalid_api_key",
            AuthError::InsufficientPrivilege => "insufficient_privilege",
            AuthError::UpstreamUnavailable(_) => "upstream_unavailable",
            AuthError::InternalError(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            AuthError::UnsupportedTokenType
            | AuthError::InvalidSignature
            | AuthError::TokenExpired
            | AuthError::TokenNotYetValid
            | AuthError::IssuerMismatch
            | AuthError::AudienceMismatch
            | AuthError::UnknownSigningKey
            | AuthError::MissingRequiredClaim(_)
            | AuthError::TokenTypeMismatch
            | AuthError::CsrfMismatch
            | AuthError::IdentityNotProvisioned
            | AuthError::InvalidApiKey => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientPrivilege => StatusCode::FORBIDDEN,
            AuthError::UpstreamUnavailable(_) | AuthError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MalformedRequest(msg) => write!(f, "Malformed request: {msg}"),
            AuthError::UnsupportedTokenType => write!(f, "Token matches no supported shape"),
            AuthError::InvalidSignature => write!(f, "Token signature is invalid"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::TokenNotYetValid => write!(f, "Token is not yet valid"),
            AuthError::IssuerMismatch => write!(f, "Token issuer is invalid"),
            AuthError::AudienceMismatch => write!(f, "Token audience is invalid"),
            AuthError::UnknownSigningKey => write!(f, "Token key id matched no signing key"),
            AuthError::MissingRequiredClaim(claim) => {
                write!(f, "Token is missing required claim '{claim}'")
            }
            AuthError::TokenTypeMismatch => write!(f, "Token type does not fit this slot"),
            AuthError::CsrfMismatch => write!(f, "Paired token subjects disagree"),
            AuthError::IdentityNotProvisioned => write!(f, "No identity record for this token"),
            AuthError::InvalidApiKey => write!(f, "API key is not recognized"),
            AuthError::InsufficientPrivilege => {
                write!(f, "Insufficient privilege for this operation")
            }
            AuthError::UpstreamUnavailable(msg) => {
                write!(f, "Identity provider unavailable: {msg}")
            }
            AuthError::InternalError(msg) => write!(f, "Internal authentication error: {msg}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<crate::storage::StorageError> for AuthError {
    fn from(e: crate::storage::StorageError) -> Self {
        AuthError::UpstreamUnavailable(e.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // All 401s share one body; the cause never reaches the caller.
        let body = if status == StatusCode::UNAUTHORIZED {
            AuthErrorBody {
                error: "Unauthorized".to_string(),
                error_code: "unauthorized".to_string(),
            }
        } else {
            AuthErrorBody {
                error: self.to_string(),
                error_code: self.error_code().to_string(),
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn all_credential_failures_look_identical() {
        let variants = [
            AuthError::UnsupportedTokenType,
            AuthError::InvalidSignature,
            AuthError::TokenExpired,
            AuthError::IssuerMismatch,
            AuthError::UnknownSigningKey,
            AuthError::MissingRequiredClaim("uid"),
            AuthError::TokenTypeMismatch,
            AuthError::CsrfMismatch,
            AuthError::IdentityNotProvisioned,
            AuthError::InvalidApiKey,
        ];

        let mut bodies = Vec::new();
        for variant in variants {
            let response = variant.into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            bodies.push(body_json(response).await);
        }
        // Unenrolled identity is indistinguishable from a bad signature.
        assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(bodies[0]["error_code"], "unauthorized");
    }

    #[tokio::test]
    async fn malformed_request_returns_400_with_detail() {
        let response =
            AuthError::MalformedRequest("version header is not dotted-numeric".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error_code"], "malformed_request");
    }

    #[tokio::test]
    async fn insufficient_privilege_returns_403() {
        let response = AuthError::InsufficientPrivilege.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn upstream_fault_returns_500() {
        let response = AuthError::UpstreamUnavailable("discovery timed out".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error_code"], "upstream_unavailable");
    }
}
