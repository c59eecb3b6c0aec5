//! Signed bearer tokens.
//!
//! Access and refresh tokens are HS256 JWTs signed with two independent secrets, so a
//! token of one kind never verifies as the other. Expiry is checked with zero leeway.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use ulid::Ulid;
use uuid::Uuid;

use super::models::{Role, User};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token invalid")]
    Invalid,
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Claims carried by an access token.
///
/// `role` is present only for elevated roles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshClaims {
    pub user_id: Uuid,
    /// Unique per issuance; two refresh tokens minted in the same second still differ.
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// Identity embedded in an access token.
#[derive(Debug, Clone, Copy)]
pub struct AccessSubject<'a> {
    pub user_id: Uuid,
    pub email: &'a str,
    pub role: Option<&'a str>,
}

impl<'a> AccessSubject<'a> {
    #[must_use]
    pub fn for_user(user: &'a User, role: &'a Role) -> Self {
        Self {
            user_id: user.id,
            email: &user.email,
            role: role.is_elevated().then_some(role.title.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn new(secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        }
    }
}

pub struct TokenCodec {
    access: SigningKeys,
    refresh: SigningKeys,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    validation: Validation,
}

impl TokenCodec {
    #[must_use]
    pub fn new(
        access_secret: &SecretString,
        refresh_secret: &SecretString,
        access_ttl_seconds: i64,
        refresh_ttl_seconds: i64,
    ) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            access: SigningKeys::new(access_secret),
            refresh: SigningKeys::new(refresh_secret),
            access_ttl_seconds,
            refresh_ttl_seconds,
            validation,
        }
    }

    /// Mint a short-lived access token for `subject`.
    ///
    /// # Errors
    /// Returns [`TokenError::Signing`] if the claims cannot be signed.
    pub fn issue_access_token(&self, subject: &AccessSubject<'_>) -> Result<String, TokenError> {
        let iat = Utc::now().timestamp();
        let claims = AccessClaims {
            user_id: Some(subject.user_id),
            email: subject.email.to_string(),
            role: subject.role.map(str::to_string),
            iat,
            exp: iat + self.access_ttl_seconds,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.access.encoding)
            .map_err(TokenError::Signing)
    }

    /// Mint a refresh token carrying only the user id and a unique `jti`.
    ///
    /// # Errors
    /// Returns [`TokenError::Signing`] if the claims cannot be signed.
    pub fn issue_refresh_token(&self, user_id: Uuid) -> Result<IssuedToken, TokenError> {
        let iat = Utc::now().timestamp();
        let exp = iat + self.refresh_ttl_seconds;
        let claims = RefreshClaims {
            user_id,
            jti: Ulid::new().to_string(),
            iat,
            exp,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.refresh.encoding)
            .map_err(TokenError::Signing)?;
        let expires_at = Utc
            .timestamp_opt(exp, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Ok(IssuedToken { token, expires_at })
    }

    /// # Errors
    /// Returns [`TokenError::Expired`] or [`TokenError::Invalid`].
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        verify(token, &self.access.decoding, &self.validation)
    }

    /// # Errors
    /// Returns [`TokenError::Expired`] or [`TokenError::Invalid`].
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        verify(token, &self.refresh.decoding, &self.validation)
    }
}

fn verify<C: DeserializeOwned>(
    token: &str,
    key: &DecodingKey,
    validation: &Validation,
) -> Result<C, TokenError> {
    decode::<C>(token, key, validation)
        .map(|data| data.claims)
        .map_err(|err| match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        })
}
