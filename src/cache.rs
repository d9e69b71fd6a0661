//! Secret cache: auth token string -> auth signing secret, with per-key TTL.
//!
//! A missing key is an ordinary outcome meaning "not verifiable via the fast
//! path". Expired entries are dropped lazily on read and in bulk by
//! [`MemorySecretCache::purge_expired`].

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::authority::BackendError;
use crate::clock::Clock;

#[async_trait]
pub trait SecretCache: Send + Sync {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError>;

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Returns whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, BackendError>;
}

struct CacheEntry {
    value: String,
    expires_at: Duration,
}

/// In-process secret cache backed by a concurrent map.
///
/// Per-key atomicity comes from the map's shard locks; no lock is held across
/// an await point.
pub struct MemorySecretCache {
    entries: DashMap<String, CacheEntry>,
    clock: Arc<dyn Clock>,
}

impl MemorySecretCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SecretCache for MemorySecretCache {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        let expires_at = self.clock.now().saturating_add(ttl);
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let now = self.clock.now();

        match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }

        // Expired: remove unless it was replaced in the meantime
        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        let now = self.clock.now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.expires_at > now))
    }
}
