//! # Lexicard (credential and session lifecycle)
//!
//! `lexicard` is the authentication core of the Lexicard vocabulary flashcard
//! application. It issues and rotates signed tokens, bounds the number of concurrent
//! sessions per user, and runs the email OTP flow that gates account creation.
//!
//! ## Tokens
//!
//! Access tokens are short-lived HS256 JWTs sent as `Authorization: Bearer`. Refresh
//! tokens are signed with an independent secret, delivered only in a signed `HttpOnly`
//! cookie, and tracked server-side: the database stores a hash of the current refresh
//! token of every session. Each refresh rotates the token and the previous value stops
//! working immediately.
//!
//! ## Sessions
//!
//! A user may hold at most `max_sessions` active sessions. Logging in beyond the bound
//! revokes the oldest session. Count, eviction and insertion run in one transaction that
//! holds the owning user's row lock, so concurrent logins cannot overshoot.
//!
//! ## Registration
//!
//! Sign-up is a two step OTP flow: request a 6-digit code by email, then submit the code
//! together with the account details. Codes and resend throttles live in an ephemeral
//! store (memory or Redis) with explicit TTLs.

pub mod api;
pub mod cli;
pub mod ephemeral;

#[cfg(test)]
mod containers;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
