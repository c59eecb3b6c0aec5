use anyhow::{anyhow, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::api::handlers::auth::{
    MAX_ACCESS_TOKEN_TTL_SECONDS, MAX_OTP_MINUTES, MAX_REFRESH_TOKEN_TTL_DAYS,
};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_ACCESS_TOKEN_SECRET: &str = "access-token-secret";
pub const ARG_REFRESH_TOKEN_SECRET: &str = "refresh-token-secret";
pub const ARG_COOKIE_SECRET: &str = "cookie-secret";
pub const ARG_ACCESS_TOKEN_TTL_SECONDS: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL_DAYS: &str = "refresh-token-ttl-days";
pub const ARG_MAX_SESSIONS: &str = "max-sessions";
pub const ARG_OTP_EXPIRATION_MINUTES: &str = "otp-expiration-minutes";
pub const ARG_OTP_RESEND_LIMIT_MINUTES: &str = "otp-resend-limit-minutes";
pub const ARG_STORE_TIMEOUT_MS: &str = "store-timeout-ms";

const MAX_STORE_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct Options {
    pub frontend_base_url: String,
    pub access_token_secret: SecretString,
    pub refresh_token_secret: SecretString,
    pub cookie_secret: SecretString,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_days: i64,
    pub max_sessions: usize,
    pub otp_expiration_minutes: u64,
    pub otp_resend_limit_minutes: u64,
    pub store_timeout_ms: u64,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a secret is missing or blank, or if both token secrets are equal.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read_secret = |id: &str| -> Result<String> {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("missing required argument: --{id}"))
        };

        let access = read_secret(ARG_ACCESS_TOKEN_SECRET)?;
        let refresh = read_secret(ARG_REFRESH_TOKEN_SECRET)?;
        if access == refresh {
            return Err(anyhow!(
                "--{ARG_ACCESS_TOKEN_SECRET} and --{ARG_REFRESH_TOKEN_SECRET} must differ"
            ));
        }
        let cookie = read_secret(ARG_COOKIE_SECRET)?;

        Ok(Self {
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .unwrap_or_else(|| "http://localhost:5173".to_string()),
            access_token_secret: SecretString::from(access),
            refresh_token_secret: SecretString::from(refresh),
            cookie_secret: SecretString::from(cookie),
            access_token_ttl_seconds: matches
                .get_one::<i64>(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .copied()
                .unwrap_or(900),
            refresh_token_ttl_days: matches
                .get_one::<i64>(ARG_REFRESH_TOKEN_TTL_DAYS)
                .copied()
                .unwrap_or(7),
            max_sessions: matches
                .get_one::<usize>(ARG_MAX_SESSIONS)
                .copied()
                .unwrap_or(5),
            otp_expiration_minutes: matches
                .get_one::<u64>(ARG_OTP_EXPIRATION_MINUTES)
                .copied()
                .unwrap_or(5),
            otp_resend_limit_minutes: matches
                .get_one::<u64>(ARG_OTP_RESEND_LIMIT_MINUTES)
                .copied()
                .unwrap_or(1),
            store_timeout_ms: matches
                .get_one::<u64>(ARG_STORE_TIMEOUT_MS)
                .copied()
                .unwrap_or(5000),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_secret_args(command);
    let command = with_token_args(command);
    with_otp_args(command)
}

fn with_secret_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_SECRET)
                .long(ARG_ACCESS_TOKEN_SECRET)
                .help("HMAC secret for access tokens")
                .env("LEXICARD_ACCESS_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_SECRET)
                .long(ARG_REFRESH_TOKEN_SECRET)
                .help("HMAC secret for refresh tokens (must differ from the access secret)")
                .env("LEXICARD_REFRESH_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECRET)
                .long(ARG_COOKIE_SECRET)
                .help("Secret used to sign the refresh cookie")
                .env("LEXICARD_COOKIE_SECRET")
                .hide_env_values(true)
                .required(true),
        )
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL, used for CORS and the cookie Secure flag")
                .env("LEXICARD_FRONTEND_BASE_URL")
                .default_value("http://localhost:5173"),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .long(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .help("Access token lifetime in seconds")
                .env("LEXICARD_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_ACCESS_TOKEN_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL_DAYS)
                .long(ARG_REFRESH_TOKEN_TTL_DAYS)
                .help("Refresh token and session lifetime in days")
                .env("LEXICARD_REFRESH_TOKEN_TTL_DAYS")
                .default_value("7")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_REFRESH_TOKEN_TTL_DAYS)),
        )
        .arg(
            Arg::new(ARG_MAX_SESSIONS)
                .long(ARG_MAX_SESSIONS)
                .help("Maximum concurrent sessions per user; the oldest is revoked beyond it")
                .env("LEXICARD_MAX_SESSIONS")
                .default_value("5")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_MS)
                .long(ARG_STORE_TIMEOUT_MS)
                .help("Timeout for every database and ephemeral store call, in milliseconds")
                .env("LEXICARD_STORE_TIMEOUT_MS")
                .default_value("5000")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_STORE_TIMEOUT_MS)),
        )
}

fn with_otp_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OTP_EXPIRATION_MINUTES)
                .long(ARG_OTP_EXPIRATION_MINUTES)
                .help("Registration code lifetime in minutes")
                .env("LEXICARD_OTP_EXPIRATION_MINUTES")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_OTP_MINUTES)),
        )
        .arg(
            Arg::new(ARG_OTP_RESEND_LIMIT_MINUTES)
                .long(ARG_OTP_RESEND_LIMIT_MINUTES)
                .help("Minimum minutes between two codes for the same email")
                .env("LEXICARD_OTP_RESEND_LIMIT_MINUTES")
                .default_value("1")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_OTP_MINUTES)),
        )
}
