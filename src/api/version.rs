// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Interface-version resolution endpoint.

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::ApiKeyClient;
use crate::error::ApiError;
use crate::state::AppState;

/// Response for GET /v1/version.
#[derive(Debug, Serialize, ToSchema)]
pub struct VersionResponse {
    /// The supported version the client should speak.
    pub version: String,
}

/// Resolve the client's interface version.
///
/// The optional `v` header names the version the client was built against;
/// without it the newest supported version is returned. A version with no
/// exact match degrades to the next older supported one.
#[utoipa::path(
    get,
    path = "/v1/version",
    tag = "Version",
    params(
        ("v" = Option<String>, Header, description = "Client's requested interface version"),
    ),
    security(("api_key" = [])),
    responses(
        (status = 200, description = "Resolved version", body = VersionResponse),
        (status = 400, description = "Requested version is not a dotted-numeric string"),
        (status = 401, description = "Unauthorized - unrecognized API key"),
        (status = 422, description = "No supported version at or below the request"),
    )
)]
pub async fn get_version(
    State(state): State<AppState>,
    client: ApiKeyClient,
) -> Result<Json<VersionResponse>, ApiError> {
    let resolved = state.versions.resolve(client.requested_version.as_deref())?;
    Ok(Json(VersionResponse {
        version: resolved.as_str().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::gate::Auth;
    use crate::auth::jwks::OidcKeyProvider;
    use crate::auth::keyset::SigningKeySet;
    use crate::auth::validator::TokenValidator;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::Storage;
    use crate::version::VersionResolver;
    use axum::http::StatusCode;
    use std::sync::Arc;

    async fn test_state() -> AppState {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set_supported_versions(vec![
                "3.2".to_string(),
                "3.1".to_string(),
                "3.0".to_string(),
                "2.9".to_string(),
            ])
            .await
            .unwrap();
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
        versions.refresh().await.unwrap();
        AppState::new(auth, versions, storage, "auth-token")
    }

    fn client(requested: Option<&str>) -> ApiKeyClient {
        ApiKeyClient {
            requested_version: requested.map(String::from),
        }
    }

    #[tokio::test]
    async fn no_request_resolves_to_newest() {
        let state = test_state().await;
        let Json(response) = get_version(State(state), client(None)).await.unwrap();
        assert_eq!(response.version, "3.2");
    }

    #[tokio::test]
    async fn unmatched_request_degrades() {
        let state = test_state().await;
        let Json(response) = get_version(State(state), client(Some("3.1.5")))
            .await
            .unwrap();
        assert_eq!(response.version, "3.0");
    }

    #[tokio::test]
    async fn errors_map_to_their_statuses() {
        let state = test_state().await;

        let err = get_version(State(state.clone()), client(Some("latest")))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = get_version(State(state), client(Some("1.0")))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
