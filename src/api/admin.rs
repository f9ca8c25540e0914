// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only API endpoints for system management.
//!
//! These endpoints require a token in the admin tier plus the `GROUP`
//! header naming the scope the request acts under. They provide:
//! - The resolved admin principal (who am I, under which scope)
//! - Supported-version management
//! - Roster replacement
//!
//! Version and roster writes publish change notifications; the resolver and
//! roster index pick them up out of band, so responses here reflect what was
//! stored, not what every reader has observed yet.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::auth::AuthAdmin;
use crate::error::ApiError;
use crate::models::{Identity, RosterEntry};
use crate::state::AppState;
use crate::version::SupportedVersion;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response for GET /v1/admin/identity.
#[derive(Debug, Serialize, ToSchema)]
pub struct AdminIdentityResponse {
    /// The administrator's resolved identity.
    pub identity: Identity,
    /// The group scope this request was authorized under.
    pub group: String,
}

/// Request body for POST /v1/admin/versions.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AddVersionRequest {
    /// The version to add, `major.minor` or `major.minor.patch`.
    pub version: String,
}

/// Response carrying the stored supported-version list.
#[derive(Debug, Serialize, ToSchema)]
pub struct SupportedVersionsResponse {
    pub versions: Vec<String>,
}

/// Response for POST /v1/admin/rosters.
#[derive(Debug, Serialize, ToSchema)]
pub struct RosterReplacedResponse {
    /// Number of entries in the new roster.
    pub entries: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the calling administrator's resolved identity and granted scope.
#[utoipa::path(
    get,
    path = "/v1/admin/identity",
    tag = "Admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "The admin principal", body = AdminIdentityResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 403, description = "Not a member of the requested group"),
    )
)]
pub async fn get_identity(AuthAdmin(principal): AuthAdmin) -> Json<AdminIdentityResponse> {
    Json(AdminIdentityResponse {
        identity: principal.identity,
        group: principal.group,
    })
}

/// Add a supported version.
///
/// The version is canonicalized before storage, so `3.3.0` and `3.3` are
/// the same entry. Adding an existing version is a no-op that returns 200.
#[utoipa::path(
    post,
    path = "/v1/admin/versions",
    tag = "Admin",
    security(("bearer" = [])),
    request_body = AddVersionRequest,
    responses(
        (status = 201, description = "Version added", body = SupportedVersionsResponse),
        (status = 200, description = "Version was already supported", body = SupportedVersionsResponse),
        (status = 400, description = "Not a dotted-numeric version string"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 403, description = "Not a member of the requested group"),
    )
)]
pub async fn add_version(
    State(state): State<AppState>,
    AuthAdmin(principal): AuthAdmin,
    Json(request): Json<AddVersionRequest>,
) -> Result<(StatusCode, Json<SupportedVersionsResponse>), ApiError> {
    let canonical = SupportedVersion::parse(&request.version)?
        .as_str()
        .to_string();

    let mut versions = state.storage.get_supported_versions().await?;
    if versions.iter().any(|v| *v == canonical) {
        return Ok((
            StatusCode::OK,
            Json(SupportedVersionsResponse { versions }),
        ));
    }

    versions.push(canonical.clone());
    state
        .storage
        .set_supported_versions(versions.clone())
        .await?;
    info!(
        version = %canonical,
        admin = %principal.identity.external_id,
        "supported version added"
    );

    Ok((
        StatusCode::CREATED,
        Json(SupportedVersionsResponse { versions }),
    ))
}

/// Replace the phone roster wholesale.
#[utoipa::path(
    post,
    path = "/v1/admin/rosters",
    tag = "Admin",
    security(("bearer" = [])),
    request_body = Vec<RosterEntry>,
    responses(
        (status = 200, description = "Roster replaced", body = RosterReplacedResponse),
        (status = 400, description = "An entry is missing its phone or identifier"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 403, description = "Not a member of the requested group"),
    )
)]
pub async fn replace_roster(
    State(state): State<AppState>,
    AuthAdmin(principal): AuthAdmin,
    Json(entries): Json<Vec<RosterEntry>>,
) -> Result<Json<RosterReplacedResponse>, ApiError> {
    for entry in &entries {
        if entry.phone.trim().is_empty() || entry.external_id.trim().is_empty() {
            return Err(ApiError::bad_request(
                "roster entries need a phone and an external identifier",
            ));
        }
    }

    let count = state.storage.replace_roster(entries).await?;
    info!(
        entries = count,
        admin = %principal.identity.external_id,
        "roster replaced"
    );
    Ok(Json(RosterReplacedResponse { entries: count }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::gate::{AdminPrincipal, Auth};
    use crate::auth::jwks::OidcKeyProvider;
    use crate::auth::keyset::SigningKeySet;
    use crate::auth::validator::TokenValidator;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::Storage;
    use crate::version::VersionResolver;
    use chrono::Utc;
    use std::sync::Arc;
    use uuid::Uuid;

    fn test_state() -> AppState {
        let storage = Arc::new(MemoryStorage::new());
        let validator = TokenValidator::new(
            OidcKeyProvider::new("https://sso.example.edu/idp"),
            "edu.example.health.mobile",
            "edu.example.health.web",
            "phone-login-shared-secret",
            SigningKeySet::from_json(r#"{"keys":[]}"#).unwrap(),
            "https://health.example.edu/auth",
        );
        let auth = Arc::new(Auth::new(
            validator,
            ["provider-key-1".to_string()],
            storage.clone() as Arc<dyn Storage>,
        ));
        let versions = Arc::new(VersionResolver::new(storage.clone() as Arc<dyn Storage>));
        AppState::new(auth, versions, storage, "auth-token")
    }

    fn principal(external_id: &str) -> AdminPrincipal {
        let now = Utc::now();
        AdminPrincipal {
            identity: Identity {
                id: Uuid::new_v4(),
                external_id: external_id.to_string(),
                sso_uin: Some(external_id.to_string()),
                email: None,
                groups: vec!["urn:campus:health admin".to_string()],
                encrypted_blobs: Vec::new(),
                accounts: Vec::new(),
                created_at: now,
                updated_at: now,
            },
            group: "urn:campus:health admin".to_string(),
        }
    }

    #[tokio::test]
    async fn adding_a_version_canonicalizes_and_dedupes() {
        let state = test_state();

        let (status, Json(response)) = add_version(
            State(state.clone()),
            AuthAdmin(principal("admin-1")),
            Json(AddVersionRequest {
                version: "3.3.0".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(response.versions, vec!["3.3"]);

        // The canonical duplicate is a no-op.
        let (status, Json(response)) = add_version(
            State(state.clone()),
            AuthAdmin(principal("admin-1")),
            Json(AddVersionRequest {
                version: "3.3".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.versions, vec!["3.3"]);

        let err = add_version(
            State(state),
            AuthAdmin(principal("admin-1")),
            Json(AddVersionRequest {
                version: "latest".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn roster_replacement_validates_entries() {
        let state = test_state();

        let entries = vec![
            RosterEntry {
                phone: "+16505550100".to_string(),
                external_id: "6500112233".to_string(),
                details: serde_json::Value::Null,
            },
            RosterEntry {
                phone: "+16505550101".to_string(),
                external_id: "6500112234".to_string(),
                details: serde_json::Value::Null,
            },
        ];
        let Json(response) = replace_roster(
            State(state.clone()),
            AuthAdmin(principal("admin-1")),
            Json(entries),
        )
        .await
        .unwrap();
        assert_eq!(response.entries, 2);

        let err = replace_roster(
            State(state),
            AuthAdmin(principal("admin-1")),
            Json(vec![RosterEntry {
                phone: " ".to_string(),
                external_id: "6500112233".to_string(),
                details: serde_json::Value::Null,
            }]),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn identity_echoes_the_principal() {
        let Json(response) = get_identity(AuthAdmin(principal("admin-1"))).await;
        assert_eq!(response.identity.external_id, "admin-1");
        assert_eq!(response.group, "urn:campus:health admin");
    }
}
