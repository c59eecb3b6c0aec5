//! Small helpers shared by the auth handlers.

use axum::http::{header::USER_AGENT, HeaderMap};
use base64ct::{Base64UrlUnpadded, Encoding};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::{future::Future, time::Duration};
use tracing::{error, warn};

use super::{error::AuthError, models::ClientMetadata};

const MAX_USER_AGENT_LEN: usize = 512;

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Hash a refresh token so raw values never touch the database.
pub(super) fn hash_refresh_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    Base64UrlUnpadded::encode_string(&digest)
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Extract a client IP from common proxy headers.
pub(super) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Collect the user agent and client IP recorded with a new session.
pub(super) fn client_metadata(headers: &HeaderMap) -> ClientMetadata {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.chars().take(MAX_USER_AGENT_LEN).collect());
    ClientMetadata {
        user_agent,
        ip_address: extract_client_ip(headers),
    }
}

/// Run a store call under `timeout`.
///
/// A timeout becomes [`AuthError::Unavailable`]; any other failure is logged and
/// becomes [`AuthError::Internal`].
pub(super) async fn bounded<T, F>(timeout: Duration, operation: &str, call: F) -> Result<T, AuthError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            error!("{operation} failed: {err:#}");
            Err(AuthError::Internal)
        }
        Err(_) => {
            warn!("{operation} timed out after {timeout:?}");
            Err(AuthError::Unavailable)
        }
    }
}

/// Log an infrastructure error and collapse it to [`AuthError::Internal`].
pub(super) fn internal(operation: &'static str) -> impl FnOnce(anyhow::Error) -> AuthError {
    move |err| {
        error!("{operation} failed: {err:#}");
        AuthError::Internal
    }
}
