//! Auth configuration and the shared state handed to every handler.

use anyhow::Result;
use axum::http::{header::InvalidHeaderValue, HeaderValue};
use std::{sync::Arc, time::Duration};

use super::{
    cookie::{self, CookieSigner},
    ledger::SessionLedger,
    password::Passwords,
    storage::{CredentialStore, SessionStore},
    token::TokenCodec,
};
use crate::{api::email::MailQueue, cli::globals::GlobalArgs, ephemeral::EphemeralStore};

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 7;
const DEFAULT_MAX_SESSIONS: usize = 5;
const DEFAULT_OTP_EXPIRATION_MINUTES: u64 = 5;
const DEFAULT_OTP_RESEND_LIMIT_MINUTES: u64 = 1;
const DEFAULT_STORE_TIMEOUT_SECONDS: u64 = 5;

/// One day.
pub const MAX_ACCESS_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
/// One year.
pub const MAX_REFRESH_TOKEN_TTL_DAYS: i64 = 365;
/// One day, for both the code lifetime and the resend guard.
pub const MAX_OTP_MINUTES: u64 = 24 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_days: i64,
    max_sessions: usize,
    otp_expiration_minutes: u64,
    otp_resend_limit_minutes: u64,
    store_timeout: Duration,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_days: DEFAULT_REFRESH_TOKEN_TTL_DAYS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            otp_expiration_minutes: DEFAULT_OTP_EXPIRATION_MINUTES,
            otp_resend_limit_minutes: DEFAULT_OTP_RESEND_LIMIT_MINUTES,
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECONDS),
        }
    }

    /// Clamped to `1..=MAX_ACCESS_TOKEN_TTL_SECONDS`.
    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds.clamp(1, MAX_ACCESS_TOKEN_TTL_SECONDS);
        self
    }

    /// Clamped to `1..=MAX_REFRESH_TOKEN_TTL_DAYS`.
    #[must_use]
    pub fn with_refresh_token_ttl_days(mut self, days: i64) -> Self {
        self.refresh_token_ttl_days = days.clamp(1, MAX_REFRESH_TOKEN_TTL_DAYS);
        self
    }

    /// At least one session is always allowed.
    #[must_use]
    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions.max(1);
        self
    }

    #[must_use]
    pub fn with_otp_expiration_minutes(mut self, minutes: u64) -> Self {
        self.otp_expiration_minutes = minutes.clamp(1, MAX_OTP_MINUTES);
        self
    }

    #[must_use]
    pub fn with_otp_resend_limit_minutes(mut self, minutes: u64) -> Self {
        self.otp_resend_limit_minutes = minutes.clamp(1, MAX_OTP_MINUTES);
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    #[must_use]
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_days * 24 * 60 * 60
    }

    #[must_use]
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    #[must_use]
    pub fn otp_expiration(&self) -> Duration {
        Duration::from_secs(self.otp_expiration_minutes * 60)
    }

    pub(super) fn otp_expiration_minutes(&self) -> u64 {
        self.otp_expiration_minutes
    }

    #[must_use]
    pub fn otp_resend_limit(&self) -> Duration {
        Duration::from_secs(self.otp_resend_limit_minutes * 60)
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    pub(super) fn cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// Storage and delivery backends the auth flows run against.
pub struct AuthBackends {
    pub credentials: Arc<dyn CredentialStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub ephemeral: Arc<dyn EphemeralStore>,
    pub mailer: MailQueue,
}

pub struct AuthState {
    config: AuthConfig,
    codec: TokenCodec,
    cookies: CookieSigner,
    passwords: Passwords,
    credentials: Arc<dyn CredentialStore>,
    ledger: SessionLedger,
    ephemeral: Arc<dyn EphemeralStore>,
    mailer: MailQueue,
}

impl AuthState {
    /// # Errors
    /// Returns an error if the cookie secret is rejected.
    pub fn new(
        config: AuthConfig,
        globals: &GlobalArgs,
        passwords: Passwords,
        backends: AuthBackends,
    ) -> Result<Self> {
        let codec = TokenCodec::new(
            &globals.access_token_secret,
            &globals.refresh_token_secret,
            config.access_token_ttl_seconds(),
            config.refresh_token_ttl_seconds(),
        );
        let cookies = CookieSigner::new(&globals.cookie_secret)?;
        let ledger = SessionLedger::new(
            backends.sessions,
            config.max_sessions(),
            config.store_timeout(),
        );
        Ok(Self {
            config,
            codec,
            cookies,
            passwords,
            credentials: backends.credentials,
            ledger,
            ephemeral: backends.ephemeral,
            mailer: backends.mailer,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub(super) fn cookies(&self) -> &CookieSigner {
        &self.cookies
    }

    pub(super) fn passwords(&self) -> &Passwords {
        &self.passwords
    }

    pub(crate) fn credentials(&self) -> &dyn CredentialStore {
        self.credentials.as_ref()
    }

    #[must_use]
    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    pub(crate) fn ephemeral(&self) -> &dyn EphemeralStore {
        self.ephemeral.as_ref()
    }

    pub(super) fn mailer(&self) -> &MailQueue {
        &self.mailer
    }

    /// `Set-Cookie` value for a freshly issued refresh token.
    pub(super) fn refresh_cookie(&self, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        cookie::refresh_cookie(
            &self.cookies,
            token,
            self.config.refresh_token_ttl_seconds(),
            self.config.cookie_secure(),
        )
    }

    pub(super) fn clear_refresh_cookie(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        cookie::clear_refresh_cookie(self.config.cookie_secure())
    }
}
