//! Administrative user and session operations.
//!
//! Routed behind `Tier::RequireRole(ADMIN_ROLE)` plus a per-route permission gate.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::{
    error::{AuthError, ErrorResponse},
    middleware::Principal,
    state::AuthState,
    types::SessionSummary,
    utils::bounded,
};

pub const SESSIONS_READ: &str = "sessions:read";
pub const USERS_DELETE: &str = "users:delete";

#[utoipa::path(
    get,
    path = "/admin/users/{id}/sessions",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User's active sessions, oldest first", body = [SessionSummary]),
        (status = 403, description = "Caller lacks the Admin role or permission", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip_all, fields(admin_id = %principal.user_id, user_id = %user_id))]
pub async fn list_user_sessions(
    Extension(principal): Extension<Principal>,
    auth_state: Extension<Arc<AuthState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<SessionSummary>>, AuthError> {
    let sessions = auth_state.ledger().list_active_sessions(user_id).await?;
    Ok(Json(sessions.into_iter().map(SessionSummary::from).collect()))
}

#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User soft-deleted and signed out everywhere"),
        (status = 403, description = "Caller lacks the Admin role or permission", body = ErrorResponse),
        (status = 404, description = "No such user", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip_all, fields(admin_id = %principal.user_id, user_id = %user_id))]
pub async fn delete_user(
    Extension(principal): Extension<Principal>,
    auth_state: Extension<Arc<AuthState>>,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, AuthError> {
    delete_account(&auth_state, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Soft-delete the user, then drop every session they hold.
async fn delete_account(state: &AuthState, user_id: Uuid) -> Result<(), AuthError> {
    let deleted = bounded(
        state.config().store_timeout(),
        "soft delete user",
        state.credentials().soft_delete_user(user_id),
    )
    .await?;
    if !deleted {
        return Err(AuthError::NotFound);
    }

    let removed = state.ledger().delete_all_for(user_id).await?;
    info!(removed, "user deleted");
    Ok(())
}
