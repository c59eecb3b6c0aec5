use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, Script};
use std::time::Duration;
use tracing::{info_span, Instrument};

use super::EphemeralStore;

// Delete the key only when it still holds the expected value.
const TAKE_IF_EQ_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
";

/// Redis-backed store shared by every service instance.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    take_if_eq: Script,
}

impl RedisStore {
    /// Open a managed connection to `url` (e.g. `redis://127.0.0.1:6379/0`).
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the first connection fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Invalid redis URL")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("Failed to connect to redis")?;
        Ok(Self {
            manager,
            take_if_eq: Script::new(TAKE_IF_EQ_SCRIPT),
        })
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn span(operation: &'static str) -> tracing::Span {
    info_span!("kv.command", db.system = "redis", db.operation = operation)
}

#[async_trait]
impl EphemeralStore for RedisStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .instrument(span("SET"))
            .await
            .context("redis SET failed")?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.manager.clone();
        // Replies "OK" when written, nil when the key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .instrument(span("SET NX"))
            .await
            .context("redis SET NX failed")?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .instrument(span("GET"))
            .await
            .context("redis GET failed")?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .instrument(span("DEL"))
            .await
            .context("redis DEL failed")?;
        Ok(removed > 0)
    }

    async fn take_if_eq(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = self
            .take_if_eq
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .instrument(span("EVALSHA"))
            .await
            .context("redis compare-and-delete failed")?;
        Ok(removed > 0)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .instrument(span("PING"))
            .await
            .context("redis PING failed")?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
