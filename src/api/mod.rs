// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{Account, Identity, RosterEntry},
    state::AppState,
};

pub mod admin;
pub mod health;
pub mod user;
pub mod version;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route(
            "/user",
            get(user::get_user)
                .post(user::create_user)
                .delete(user::clear_user),
        )
        .route("/version", get(version::get_version))
        .route("/admin/identity", get(admin::get_identity))
        .route("/admin/versions", post(admin::add_version))
        .route("/admin/rosters", post(admin::replace_roster));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        // Request ids are assigned outermost so the trace span and every
        // collaborator call downstream can carry the same `x-request-id`.
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        user::get_user,
        user::create_user,
        user::clear_user,
        version::get_version,
        admin::get_identity,
        admin::add_version,
        admin::replace_roster
    ),
    components(
        schemas(
            Identity,
            Account,
            RosterEntry,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            version::VersionResponse,
            admin::AdminIdentityResponse,
            admin::AddVersionRequest,
            admin::SupportedVersionsResponse,
            admin::RosterReplacedResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "User", description = "End-user identity resolution"),
        (name = "Version", description = "Interface-version resolution"),
        (name = "Admin", description = "Version and roster management")
    )
)]
struct ApiDoc;

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
    use std::sync::Arc;

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

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = router(test_state());
        // Ensure the router can be converted into a service without panicking.
        let _ = app.into_make_service();
    }

    #[test]
    fn openapi_doc_includes_every_path() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        for path in [
            "/health",
            "/health/live",
            "/health/ready",
            "/v1/user",
            "/v1/version",
            "/v1/admin/identity",
            "/v1/admin/versions",
            "/v1/admin/rosters",
        ] {
            assert!(paths.contains_key(path), "missing OpenAPI path {path}");
        }
    }
}
