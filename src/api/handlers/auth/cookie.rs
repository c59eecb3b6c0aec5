//! The refresh-token cookie.
//!
//! The cookie value is `<token>.<mac>` where `<mac>` is an HMAC-SHA256 over the token,
//! so a tampered cookie is rejected before any token parsing happens.

use anyhow::{anyhow, Result};
use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

pub const REFRESH_COOKIE_NAME: &str = "lexicard_refresh";
const REFRESH_COOKIE_PATH: &str = "/auth";

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl CookieSigner {
    /// # Errors
    /// Returns an error if the key is rejected by the MAC.
    pub fn new(secret: &SecretString) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|err| anyhow!("invalid cookie secret: {err}"))?;
        Ok(Self { mac })
    }

    #[must_use]
    pub fn sign(&self, value: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(value.as_bytes());
        let tag = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());
        format!("{value}.{tag}")
    }

    /// Return the inner value if the signature checks out.
    #[must_use]
    pub fn unsign(&self, signed: &str) -> Option<String> {
        let (value, tag) = signed.rsplit_once('.')?;
        let tag = Base64UrlUnpadded::decode_vec(tag).ok()?;
        let mut mac = self.mac.clone();
        mac.update(value.as_bytes());
        mac.verify_slice(&tag).ok()?;
        Some(value.to_string())
    }
}

/// Build the `Set-Cookie` value carrying a signed refresh token.
pub(super) fn refresh_cookie(
    signer: &CookieSigner,
    token: &str,
    max_age_seconds: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let signed = signer.sign(token);
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={signed}; Path={REFRESH_COOKIE_PATH}; HttpOnly; SameSite=Strict; Max-Age={max_age_seconds}"
    );
    // Only mark cookies secure when the frontend is served over HTTPS.
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_refresh_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}=; Path={REFRESH_COOKIE_PATH}; HttpOnly; SameSite=Strict; Max-Age=0"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Raw (still signed) refresh cookie value, if present.
pub(super) fn extract_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((key, val)) = pair.trim().split_once('=') else {
                continue;
            };
            if key.trim() == REFRESH_COOKIE_NAME {
                let val = val.trim();
                return (!val.is_empty()).then(|| val.to_string());
            }
        }
    }
    None
}
