//! Registration: OTP request, then verify-and-create.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::Response,
    Json,
};
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::{
    error::{AuthError, ErrorResponse},
    login::{start_session, with_refresh_cookie, IssuedSession},
    models::{ClientMetadata, CreateUserOutcome, NewProfile, NewUser, DEFAULT_ROLE},
    otp,
    state::AuthState,
    types::{AccessTokenResponse, MessageResponse, RegisterRequest, RequestOtpRequest},
    utils::{bounded, client_metadata, internal, normalize_email, valid_email},
};

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Consume the OTP, create the account and start its first session.
async fn complete_registration(
    state: &AuthState,
    email: &str,
    request: RegisterRequest,
    client: ClientMetadata,
) -> Result<IssuedSession, AuthError> {
    otp::consume_otp(state, email, request.otp.trim()).await?;

    let password_hash = state
        .passwords()
        .hash(request.password)
        .await
        .map_err(internal("password hashing"))?;

    let timeout = state.config().store_timeout();
    let role = bounded(
        timeout,
        "lookup default role",
        state.credentials().find_role_by_title(DEFAULT_ROLE),
    )
    .await?
    .ok_or_else(|| {
        error!("default role {DEFAULT_ROLE} is missing");
        AuthError::Internal
    })?;

    let new_user = NewUser {
        email: email.to_string(),
        password_hash,
        role_id: role.id,
        profile: NewProfile {
            full_name: request.full_name.trim().to_string(),
            address: optional(request.address),
            phone: optional(request.phone),
        },
    };
    let user = match bounded(timeout, "create user", state.credentials().create_user(new_user)).await? {
        CreateUserOutcome::Created(user) => user,
        CreateUserOutcome::Conflict => return Err(AuthError::Conflict),
    };

    info!(user_id = %user.id, "account registered");
    start_session(state, &user, client).await
}

#[utoipa::path(
    post,
    path = "/auth/register/request-otp",
    request_body = RequestOtpRequest,
    responses(
        (status = 200, description = "Code sent", body = MessageResponse),
        (status = 400, description = "Missing or malformed email", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse),
        (status = 429, description = "Code recently sent", body = ErrorResponse)
    ),
    tag = "registration"
)]
#[instrument(skip_all)]
pub async fn request_otp(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RequestOtpRequest>>,
) -> Result<Json<MessageResponse>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::BadRequest("Missing payload"));
    };
    let email = normalize_email(&request.email);
    if email.is_empty() {
        return Err(AuthError::BadRequest("Email is required"));
    }
    if !valid_email(&email) {
        return Err(AuthError::BadRequest("Invalid email"));
    }

    otp::request_otp(&auth_state, &email).await?;

    Ok(Json(MessageResponse {
        message: "Verification code sent".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/register/verify",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created; refresh cookie set", body = AccessTokenResponse),
        (status = 400, description = "Missing fields", body = ErrorResponse),
        (status = 401, description = "Invalid or expired OTP", body = ErrorResponse),
        (status = 409, description = "Email already registered", body = ErrorResponse)
    ),
    tag = "registration"
)]
#[instrument(skip_all)]
pub async fn verify(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<Response, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::BadRequest("Missing payload"));
    };
    let email = normalize_email(&request.email);
    if email.is_empty()
        || request.otp.trim().is_empty()
        || request.password.is_empty()
        || request.full_name.trim().is_empty()
    {
        return Err(AuthError::BadRequest(
            "Email, OTP, password and full name are required",
        ));
    }
    if !valid_email(&email) {
        return Err(AuthError::BadRequest("Invalid email"));
    }

    let issued =
        complete_registration(&auth_state, &email, request, client_metadata(&headers)).await?;

    with_refresh_cookie(
        &auth_state,
        StatusCode::CREATED,
        &issued.refresh_token,
        Json(AccessTokenResponse {
            access_token: issued.access_token,
        }),
    )
}
