//! One-time codes proving control of an email address.
//!
//! `NoRequest -> OtpSent -> Verified -> Registered`. A code lives under
//! `otp:code:<email>` for the configured expiration; a resend guard under
//! `otp:limit:<email>` blocks new requests until it lapses. Consuming a code is an
//! atomic compare-and-delete, so a code verifies at most once.

use rand::Rng;
use tracing::{info, warn};

use super::{
    error::AuthError,
    state::AuthState,
    utils::bounded,
};
use crate::{
    api::email::EmailMessage,
    ephemeral::{otp_code_key, otp_limit_key},
};

const OTP_MIN: u32 = 100_000;
const OTP_MAX: u32 = 999_999;

/// Six digits, uniform over `[100000, 999999]`.
pub(super) fn generate_otp() -> String {
    rand::thread_rng().gen_range(OTP_MIN..=OTP_MAX).to_string()
}

fn otp_email(email: &str, code: &str, expiration_minutes: u64) -> EmailMessage {
    EmailMessage {
        to_email: email.to_string(),
        subject: "Your Lexicard verification code".to_string(),
        body: format!(
            "Your verification code is {code}. It expires in {expiration_minutes} minute(s).\n\
             If you did not try to create a Lexicard account, ignore this email."
        ),
    }
}

/// Issue a code for an already-normalized, validated email.
///
/// # Errors
/// [`AuthError::Conflict`] if an account owns the email, [`AuthError::RateLimited`] while
/// the resend guard is active, store errors otherwise.
pub(super) async fn request_otp(state: &AuthState, email: &str) -> Result<(), AuthError> {
    let config = state.config();
    let timeout = config.store_timeout();

    let existing = bounded(
        timeout,
        "lookup user by email",
        state.credentials().find_user_by_email(email),
    )
    .await?;
    if existing.is_some() {
        return Err(AuthError::Conflict);
    }

    let guarded = bounded(
        timeout,
        "set otp resend guard",
        state
            .ephemeral()
            .set_if_absent(&otp_limit_key(email), "1", config.otp_resend_limit()),
    )
    .await?;
    if !guarded {
        return Err(AuthError::RateLimited);
    }

    let code = generate_otp();
    if let Err(err) = bounded(
        timeout,
        "store otp",
        state
            .ephemeral()
            .set(&otp_code_key(email), &code, config.otp_expiration()),
    )
    .await
    {
        // No code went out, so the caller must be free to retry right away.
        release_guard(state, email).await;
        return Err(err);
    }

    state
        .mailer()
        .submit(otp_email(email, &code, config.otp_expiration_minutes()));
    info!(email = %email, "otp issued");
    Ok(())
}

async fn release_guard(state: &AuthState, email: &str) {
    let released = bounded(
        state.config().store_timeout(),
        "release otp resend guard",
        state.ephemeral().delete(&otp_limit_key(email)),
    )
    .await;
    if released.is_err() {
        warn!(email = %email, "otp resend guard left in place after failed issue");
    }
}

/// Consume the code for `email`. Succeeds once per issued code.
///
/// # Errors
/// [`AuthError::InvalidOrExpiredOtp`] when no code is stored or it does not match.
pub(super) async fn consume_otp(state: &AuthState, email: &str, code: &str) -> Result<(), AuthError> {
    let taken = bounded(
        state.config().store_timeout(),
        "consume otp",
        state.ephemeral().take_if_eq(&otp_code_key(email), code),
    )
    .await?;
    if taken {
        Ok(())
    } else {
        Err(AuthError::InvalidOrExpiredOtp)
    }
}
