// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! End-user identity endpoints.
//!
//! All three handlers sit behind the user tier, which admits both
//! registered and verified-but-unregistered callers. What each outcome may
//! do is decided here: reading requires a stored identity, creation is the
//! one thing an unregistered caller can do, and clearing is idempotent.

use axum::{extract::State, http::StatusCode, Json};

use crate::auth::{AuthError, AuthUser, UserOutcome};
use crate::error::ApiError;
use crate::models::Identity;
use crate::state::AppState;

/// Get the calling user's identity record.
#[utoipa::path(
    get,
    path = "/v1/user",
    tag = "User",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "The resolved identity", body = Identity),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 404, description = "Token verified but no identity is registered"),
    )
)]
pub async fn get_user(AuthUser(outcome): AuthUser) -> Result<Json<Identity>, ApiError> {
    match outcome {
        UserOutcome::Registered { identity, .. } => Ok(Json(identity)),
        UserOutcome::Unregistered { .. } => Err(ApiError::not_found("Identity not found")),
    }
}

/// Create the calling user's identity record.
///
/// Idempotent: an already-registered caller gets their existing record back
/// with a 200 instead of a 201.
#[utoipa::path(
    post,
    path = "/v1/user",
    tag = "User",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Identity created", body = Identity),
        (status = 200, description = "Identity already existed", body = Identity),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    AuthUser(outcome): AuthUser,
) -> Result<(StatusCode, Json<Identity>), AuthError> {
    match outcome {
        UserOutcome::Registered { identity, .. } => Ok((StatusCode::OK, Json(identity))),
        UserOutcome::Unregistered { external_id, token } => {
            let identity = state.auth.user.register(&external_id, &token).await?;
            Ok((StatusCode::CREATED, Json(identity)))
        }
    }
}

/// Clear the calling user's data (accounts and encrypted blobs).
///
/// The identity record itself survives, so the same external identifier
/// keeps resolving afterwards. Clearing an identity that holds no data is a
/// no-op.
#[utoipa::path(
    delete,
    path = "/v1/user",
    tag = "User",
    security(("bearer" = [])),
    responses(
        (status = 204, description = "User data cleared"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn clear_user(
    State(state): State<AppState>,
    AuthUser(outcome): AuthUser,
) -> Result<StatusCode, AuthError> {
    state
        .auth
        .clear_identity_data(outcome.external_id())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
