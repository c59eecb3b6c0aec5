//! Error taxonomy for the auth surface.
//!
//! Every variant renders a fixed message; callers tell failures apart by status code.
//! Internal details are logged where they happen and never reach the response.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Unknown email or wrong password; deliberately indistinguishable.
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Email is already registered")]
    Conflict,
    #[error("Too many requests, try again later")]
    RateLimited,
    #[error("Invalid or expired OTP")]
    InvalidOrExpiredOtp,
    /// No credential was presented.
    #[error("Authentication required")]
    Unauthenticated,
    #[error("{0}")]
    BadRequest(&'static str),
    /// A credential was presented but does not grant access.
    #[error("Forbidden")]
    Forbidden,
    #[error("Invalid token")]
    InvalidToken,
    /// Session revoked, expired, rotated away or missing.
    #[error("Session is invalid or expired")]
    SessionInvalid,
    #[error("Not found")]
    NotFound,
    /// A backing store timed out; safe to retry.
    #[error("Service temporarily unavailable")]
    Unavailable,
    #[error("Internal server error")]
    Internal,
}

impl AuthError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidCredentials | Self::InvalidOrExpiredOtp | Self::Unauthenticated => {
                StatusCode::UNAUTHORIZED
            }
            Self::Conflict => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden | Self::InvalidToken | Self::SessionInvalid => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            message: self.to_string(),
        });
        let mut response = (self.status(), body).into_response();
        if matches!(self, Self::Unavailable | Self::RateLimited) {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}
