//! Ephemeral key-value storage for OTP codes and resend throttles.
//!
//! Every entry carries its own TTL and disappears on its own; nothing here needs manual
//! cleanup. Two back-ends are available:
//!
//! - [`MemoryStore`]: process-local, for a single instance and for tests.
//! - [`RedisStore`]: shared across instances, uses `SET NX PX` and a Lua
//!   compare-and-delete so concurrent requests stay atomic.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use anyhow::Result;
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::info;

const OTP_CODE_PREFIX: &str = "otp:code:";
const OTP_LIMIT_PREFIX: &str = "otp:limit:";

#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Store `value` only if `key` is absent. Returns `true` when the value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Returns `true` if a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete `key` only if it currently holds `expected`. Returns `true` on deletion.
    async fn take_if_eq(&self, key: &str, expected: &str) -> Result<bool>;

    /// Cheap liveness probe used by `/health`.
    async fn ping(&self) -> Result<()>;

    /// Short backend name reported by `/health`.
    fn backend(&self) -> &'static str;
}

/// Key holding the current OTP code for `email`.
#[must_use]
pub fn otp_code_key(email: &str) -> String {
    format!("{OTP_CODE_PREFIX}{email}")
}

/// Key holding the resend guard for `email`.
#[must_use]
pub fn otp_limit_key(email: &str) -> String {
    format!("{OTP_LIMIT_PREFIX}{email}")
}

/// Build the configured store: Redis when a URL is given, memory otherwise.
///
/// # Errors
/// Returns an error if the Redis URL is invalid or the server is unreachable.
pub async fn connect(redis_url: Option<&str>) -> Result<Arc<dyn EphemeralStore>> {
    if let Some(url) = redis_url {
        let store = RedisStore::connect(url).await?;
        info!("Ephemeral store: redis");
        Ok(Arc::new(store))
    } else {
        info!("Ephemeral store: memory (single instance only)");
        Ok(Arc::new(MemoryStore::new()))
    }
}
