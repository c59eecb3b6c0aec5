//! Session self-service: logout, identity and the caller's own sessions.

use axum::{
    extract::{Extension, Path},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    cookie::extract_refresh_cookie,
    error::{AuthError, ErrorResponse},
    middleware::Principal,
    state::AuthState,
    types::{MeResponse, SessionSummary},
};

/// Revoke the session behind a signed refresh cookie, if it still exists.
async fn revoke_presented(state: &AuthState, signed_cookie: &str) -> Result<(), AuthError> {
    let Some(token) = state.cookies().unsign(signed_cookie) else {
        return Ok(());
    };
    let Ok(claims) = state.codec().verify_refresh(&token) else {
        return Ok(());
    };
    if let Some(session) = state.ledger().find_active(claims.user_id, &token).await? {
        match state.ledger().revoke(session.id).await {
            Ok(()) | Err(AuthError::NotFound) => {
                info!(user_id = %claims.user_id, session_id = %session.id, "logged out");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Session revoked (if any) and refresh cookie cleared")
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout(headers: HeaderMap, auth_state: Extension<Arc<AuthState>>) -> Response {
    if let Some(signed) = extract_refresh_cookie(&headers) {
        if let Err(err) = revoke_presented(&auth_state, &signed).await {
            warn!("logout could not revoke session: {err}");
        }
    }

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = auth_state.clear_refresh_cookie() {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Authenticated identity", body = MeResponse),
        (status = 400, description = "Malformed authorization header", body = ErrorResponse),
        (status = 401, description = "Missing bearer token", body = ErrorResponse),
        (status = 403, description = "Invalid token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn me(Extension(principal): Extension<Principal>) -> Json<MeResponse> {
    Json(MeResponse {
        user_id: principal.user_id,
        email: principal.email,
    })
}

#[utoipa::path(
    get,
    path = "/auth/sessions",
    responses(
        (status = 200, description = "Caller's active sessions, oldest first", body = [SessionSummary]),
        (status = 401, description = "Missing bearer token", body = ErrorResponse),
        (status = 403, description = "Invalid token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "sessions"
)]
#[instrument(skip_all, fields(user_id = %principal.user_id))]
pub async fn list_sessions(
    Extension(principal): Extension<Principal>,
    auth_state: Extension<Arc<AuthState>>,
) -> Result<Json<Vec<SessionSummary>>, AuthError> {
    let sessions = auth_state
        .ledger()
        .list_active_sessions(principal.user_id)
        .await?;
    Ok(Json(sessions.into_iter().map(SessionSummary::from).collect()))
}

#[utoipa::path(
    delete,
    path = "/auth/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 404, description = "No such active session for the caller", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "sessions"
)]
#[instrument(skip_all, fields(user_id = %principal.user_id, session_id = %session_id))]
pub async fn revoke_session(
    Extension(principal): Extension<Principal>,
    auth_state: Extension<Arc<AuthState>>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AuthError> {
    auth_state
        .ledger()
        .revoke_owned(principal.user_id, session_id)
        .await?;
    info!("session revoked by owner");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::{
        login::verify_credentials,
        models::{ClientMetadata, DEFAULT_ROLE},
        test_support::{default_harness, seed_user},
    };

    #[tokio::test]
    async fn revoke_presented_revokes_only_that_session() -> Result<(), AuthError> {
        let harness = default_harness();
        let user = seed_user(&harness, "a@lexicard.dev", "hunter22", DEFAULT_ROLE).await;
        let first = verify_credentials(
            &harness.state,
            "a@lexicard.dev",
            "hunter22",
            ClientMetadata::default(),
        )
        .await?;
        verify_credentials(
            &harness.state,
            "a@lexicard.dev",
            "hunter22",
            ClientMetadata::default(),
        )
        .await?;

        let cookie = harness.state.cookies().sign(&first.refresh_token);
        revoke_presented(&harness.state, &cookie).await?;

        let active = harness.state.ledger().list_active_sessions(user.id).await?;
        assert_eq!(active.len(), 1);
        assert_ne!(active[0].id, first.session_id);

        // Second logout with the same cookie is a no-op.
        revoke_presented(&harness.state, &cookie).await?;
        Ok(())
    }

    #[tokio::test]
    async fn garbage_cookie_is_ignored() -> Result<(), AuthError> {
        let harness = default_harness();
        revoke_presented(&harness.state, "garbage").await?;
        let forged = harness.state.cookies().sign("not-a-jwt");
        revoke_presented(&harness.state, &forged).await
    }
}
