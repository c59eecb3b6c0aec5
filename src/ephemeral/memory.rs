use anyhow::Result;
use async_trait::async_trait;
use std::{collections::HashMap, time::Duration};
use tokio::{sync::Mutex, time::Instant};

use super::EphemeralStore;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local TTL map.
///
/// Expiry uses `tokio::time::Instant`, so tests can drive it with a paused clock.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EphemeralStore for MemoryStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.is_live(now));
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        if entries.get(key).is_some_and(|entry| entry.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        Ok(entries.remove(key).is_some_and(|entry| entry.is_live(now)))
    }

    async fn take_if_eq(&self, key: &str, expected: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let matches = entries
            .get(key)
            .is_some_and(|entry| entry.is_live(now) && entry.value == expected);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() -> Result<()> {
        let store = MemoryStore::new();
        store.set("k", "v", TTL).await?;
        assert_eq!(store.get("k").await?.as_deref(), Some("v"));

        tokio::time::advance(TTL).await;
        assert_eq!(store.get("k").await?, None);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn set_if_absent_respects_live_entries() -> Result<()> {
        let store = MemoryStore::new();
        assert!(store.set_if_absent("guard", "1", TTL).await?);
        assert!(!store.set_if_absent("guard", "2", TTL).await?);
        assert_eq!(store.get("guard").await?.as_deref(), Some("1"));

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        assert!(store.set_if_absent("guard", "3", TTL).await?);
        assert_eq!(store.get("guard").await?.as_deref(), Some("3"));
        Ok(())
    }

    #[tokio::test]
    async fn set_overwrites_previous_value() -> Result<()> {
        let store = MemoryStore::new();
        store.set("code", "111111", TTL).await?;
        store.set("code", "222222", TTL).await?;
        assert_eq!(store.get("code").await?.as_deref(), Some("222222"));
        Ok(())
    }

    #[tokio::test]
    async fn take_if_eq_only_removes_matching_value() -> Result<()> {
        let store = MemoryStore::new();
        store.set("code", "123456", TTL).await?;

        assert!(!store.take_if_eq("code", "000000").await?);
        assert_eq!(store.get("code").await?.as_deref(), Some("123456"));

        assert!(store.take_if_eq("code", "123456").await?);
        assert!(!store.take_if_eq("code", "123456").await?);
        assert_eq!(store.get("code").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn delete_reports_presence() -> Result<()> {
        let store = MemoryStore::new();
        assert!(!store.delete("missing").await?);
        store.set("k", "v", TTL).await?;
        assert!(store.delete("k").await?);
        Ok(())
    }
}
