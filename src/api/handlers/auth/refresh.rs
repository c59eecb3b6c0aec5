//! Refresh-token rotation.
//!
//! A refresh token is accepted only while it matches the hash stored on a live session.
//! Rotation swaps that hash for the new token's, so the presented token is dead the
//! moment a new one is issued. Session expiry is not extended.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    cookie::extract_refresh_cookie,
    error::{AuthError, ErrorResponse},
    login::{signing_failed, with_refresh_cookie},
    models::Role,
    state::AuthState,
    token::{AccessSubject, TokenError},
    types::AccessTokenResponse,
    utils::bounded,
};

pub(super) struct RotatedTokens {
    pub(super) access_token: String,
    pub(super) refresh_token: String,
}

/// Exchange a signed refresh cookie value for a new token pair.
pub(super) async fn rotate(state: &AuthState, signed_cookie: &str) -> Result<RotatedTokens, AuthError> {
    // A badly signed cookie is treated the same as no cookie at all.
    let refresh_token = state
        .cookies()
        .unsign(signed_cookie)
        .ok_or(AuthError::Unauthenticated)?;

    let claims = state
        .codec()
        .verify_refresh(&refresh_token)
        .map_err(|err: TokenError| {
            info!("refresh token rejected: {err}");
            AuthError::InvalidToken
        })?;

    let session = state
        .ledger()
        .find_active(claims.user_id, &refresh_token)
        .await?
        .ok_or(AuthError::SessionInvalid)?;

    let timeout = state.config().store_timeout();
    let Some(user) = bounded(
        timeout,
        "lookup user",
        state.credentials().find_user(claims.user_id),
    )
    .await?
    else {
        warn!(user_id = %claims.user_id, session_id = %session.id, "refresh for missing user, revoking session");
        // Already revoked elsewhere is fine; the outcome is the same.
        match state.ledger().revoke(session.id).await {
            Ok(()) | Err(AuthError::NotFound) => {}
            Err(err) => return Err(err),
        }
        return Err(AuthError::SessionInvalid);
    };

    let role: Role = bounded(timeout, "lookup role", state.credentials().find_role(user.role_id))
        .await?
        .ok_or(AuthError::SessionInvalid)?;

    let access_token = state
        .codec()
        .issue_access_token(&AccessSubject::for_user(&user, &role))
        .map_err(signing_failed)?;
    let next = state
        .codec()
        .issue_refresh_token(user.id)
        .map_err(signing_failed)?;

    state
        .ledger()
        .revise_session(session.id, &refresh_token, &next.token)
        .await
        .map_err(|err| match err {
            // Someone else rotated this token first.
            AuthError::NotFound => AuthError::SessionInvalid,
            other => other,
        })?;

    info!(user_id = %user.id, session_id = %session.id, "refresh token rotated");
    Ok(RotatedTokens {
        access_token,
        refresh_token: next.token,
    })
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Rotated; new refresh cookie set", body = AccessTokenResponse),
        (status = 401, description = "Missing refresh cookie", body = ErrorResponse),
        (status = 403, description = "Invalid token or session", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn refresh(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Response, AuthError> {
    let signed = extract_refresh_cookie(&headers).ok_or(AuthError::Unauthenticated)?;
    let rotated = rotate(&auth_state, &signed).await?;
    with_refresh_cookie(
        &auth_state,
        StatusCode::OK,
        &rotated.refresh_token,
        Json(AccessTokenResponse {
            access_token: rotated.access_token,
        }),
    )
}
