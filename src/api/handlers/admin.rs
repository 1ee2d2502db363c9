//! Admin user-administration handlers.
//!
//! Role changes made here propagate to live sessions through the issuer's
//! per-request refresh, without forcing re-authentication.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::auth::RequireAdmin;
use crate::user::{Role, UserInfo};

/// List all users.
#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> ApiResult<Json<Vec<UserInfo>>> {
    let users = state.store.list().await?;
    Ok(Json(users.into_iter().map(UserInfo::from).collect()))
}

/// Get one user.
#[instrument(skip(state, _admin))]
pub async fn get_user(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserInfo>> {
    let user = state
        .store
        .find_by_id(&user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User not found: {}", user_id)))?;

    Ok(Json(user.into()))
}

/// Request body for a role change.
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// Change a user's role.
#[instrument(skip(state, admin, request))]
pub async fn update_role(
    State(state): State<AppState>,
    admin: RequireAdmin,
    Path(user_id): Path<String>,
    Json(request): Json<UpdateRoleRequest>,
) -> ApiResult<Json<UserInfo>> {
    state.store.update_role(&user_id, request.role).await?;

    let user = state
        .store
        .find_by_id(&user_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("User not found: {}", user_id)))?;

    info!(
        user_id = %user_id,
        role = %request.role,
        changed_by = %admin.0.id(),
        "user role updated"
    );

    Ok(Json(user.into()))
}
