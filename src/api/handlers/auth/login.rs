//! Password login and session start.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::{
    error::{AuthError, ErrorResponse},
    models::{ClientMetadata, User},
    state::AuthState,
    token::{AccessSubject, TokenError},
    types::{LoginRequest, LoginResponse},
    utils::{bounded, client_metadata, internal, normalize_email},
};

/// Tokens and session produced by a successful login or registration.
#[derive(Debug)]
pub(super) struct IssuedSession {
    pub(super) access_token: String,
    pub(super) refresh_token: String,
    pub(super) role: String,
    pub(super) session_id: Uuid,
}

pub(super) fn signing_failed(err: TokenError) -> AuthError {
    error!("token signing failed: {err}");
    AuthError::Internal
}

/// Issue a token pair for `user` and record the session under the bounded policy.
pub(super) async fn start_session(
    state: &AuthState,
    user: &User,
    client: ClientMetadata,
) -> Result<IssuedSession, AuthError> {
    let role = bounded(
        state.config().store_timeout(),
        "lookup role",
        state.credentials().find_role(user.role_id),
    )
    .await?
    .ok_or_else(|| {
        error!(user_id = %user.id, role_id = %user.role_id, "user references a missing role");
        AuthError::Internal
    })?;

    let access_token = state
        .codec()
        .issue_access_token(&AccessSubject::for_user(user, &role))
        .map_err(signing_failed)?;
    let refresh = state
        .codec()
        .issue_refresh_token(user.id)
        .map_err(signing_failed)?;

    let session = state
        .ledger()
        .create_session(user.id, &refresh.token, client, refresh.expires_at)
        .await?;

    info!(user_id = %user.id, session_id = %session.id, "session started");
    Ok(IssuedSession {
        access_token,
        refresh_token: refresh.token,
        role: role.title,
        session_id: session.id,
    })
}

/// Check the password for `email` and start a session.
///
/// Unknown email and wrong password are indistinguishable, timing included.
pub(super) async fn verify_credentials(
    state: &AuthState,
    email: &str,
    password: &str,
    client: ClientMetadata,
) -> Result<IssuedSession, AuthError> {
    let user = bounded(
        state.config().store_timeout(),
        "lookup user by email",
        state.credentials().find_user_by_email(email),
    )
    .await?;

    let stored_hash = user.as_ref().map(|user| user.password_hash.clone());
    let verified = state
        .passwords()
        .verify(password.to_string(), stored_hash)
        .await
        .map_err(internal("password verification"))?;

    match user {
        Some(user) if verified => start_session(state, &user, client).await,
        _ => Err(AuthError::InvalidCredentials),
    }
}

/// Response carrying a body plus the refresh cookie.
pub(super) fn with_refresh_cookie(
    state: &AuthState,
    status: StatusCode,
    refresh_token: &str,
    body: impl IntoResponse,
) -> Result<Response, AuthError> {
    let cookie = state.refresh_cookie(refresh_token).map_err(|err| {
        error!("failed to build refresh cookie: {err}");
        AuthError::Internal
    })?;
    Ok((status, [(SET_COOKIE, cookie)], body).into_response())
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; refresh cookie set", body = LoginResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse),
        (status = 401, description = "Invalid email or password", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Response, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::BadRequest("Missing payload"));
    };

    let email = normalize_email(&request.email);
    if email.is_empty() || request.password.is_empty() {
        return Err(AuthError::BadRequest("Email and password are required"));
    }

    let issued = verify_credentials(
        &auth_state,
        &email,
        &request.password,
        client_metadata(&headers),
    )
    .await?;

    with_refresh_cookie(
        &auth_state,
        StatusCode::OK,
        &issued.refresh_token,
        Json(LoginResponse {
            access_token: issued.access_token,
            role: issued.role,
        }),
    )
}
