//! Credential and session lifecycle.
//!
//! Login and registration hand out a short-lived access token (bearer header) and a
//! refresh token (signed `HttpOnly` cookie). Every refresh token is tracked as a row in
//! the session ledger, which caps how many sessions a user may hold at once: starting a
//! session past the cap revokes the oldest ones. Refresh rotates the token in place, so a
//! presented refresh token is single use.
//!
//! ## Registration
//!
//! `request-otp` mails a six digit code and arms a resend guard; `verify` consumes the
//! code atomically, creates the user with the `User` role and starts the first session.
//!
//! ## Access tiers
//!
//! Protected routes are registered with a [`middleware::Tier`]. `IdentityOnly` needs a
//! valid access token. `RequireRole` additionally needs the token's role claim to match;
//! admin routes also check permissions against the caller's current role.

pub(crate) mod admin;
mod cookie;
mod error;
mod ledger;
pub(crate) mod login;
pub(crate) mod middleware;
mod models;
mod otp;
mod password;
pub(crate) mod refresh;
pub(crate) mod register;
pub(crate) mod session;
mod state;
mod storage;
mod token;
pub(crate) mod types;
mod utils;

pub use error::{AuthError, ErrorResponse};
pub use ledger::SessionLedger;
pub use middleware::{Gate, PermissionGate, Principal, Tier};
pub use models::{ADMIN_ROLE, DEFAULT_ROLE};
pub use password::Passwords;
pub use state::{
    AuthBackends, AuthConfig, AuthState, MAX_ACCESS_TOKEN_TTL_SECONDS, MAX_OTP_MINUTES,
    MAX_REFRESH_TOKEN_TTL_DAYS,
};
pub use storage::{CredentialStore, PgCredentialStore, PgSessionStore, SessionStore};

#[cfg(test)]
pub(crate) mod test_support;
