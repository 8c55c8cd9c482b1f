//! In-process cache store
//!
//! DashMap-backed store with per-entry deadlines. Used for single-node
//! deployments without Redis and throughout the test suite.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{CacheEntry, CacheKey, CacheStats, CacheStore};
use crate::types::{ForgeError, Result};

struct StoredEntry {
    payload: String,
    expires_at: Instant,
}

pub struct MemoryCacheStore {
    entries: DashMap<String, StoredEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Live (unexpired) entry count
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| entry.value().expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining lifetime of `key`, if present and unexpired
    pub fn ttl_of(&self, key: &CacheKey) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key.as_str())
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.expires_at - now)
    }

    fn purge_expired(&self, now: Instant) {
        self.entries.retain(|_, stored| stored.expires_at > now);
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let now = Instant::now();
        let payload = match self.entries.get(key.as_str()) {
            Some(stored) if stored.expires_at > now => Some(stored.payload.clone()),
            _ => None,
        };

        let Some(payload) = payload else {
            // Expired entries are dropped lazily on read
            self.entries.remove_if(key.as_str(), |_, v| v.expires_at <= now);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        self.hits.fetch_add(1, Ordering::Relaxed);
        let entry = serde_json::from_str(&payload)?;
        Ok(Some(entry))
    }

    async fn put(&self, key: &CacheKey, entry: &CacheEntry, ttl: Duration) -> Result<()> {
        let payload = serde_json::to_string(entry)?;
        let now = Instant::now();
        self.purge_expired(now);
        self.entries.insert(
            key.as_str().to_string(),
            StoredEntry {
                payload,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn clear(&self, prefix: &str) -> Result<usize> {
        let now = Instant::now();
        let mut cleared = 0;
        // Expired entries go too but are not counted
        self.entries.retain(|key, stored| {
            if !key.starts_with(prefix) {
                return stored.expires_at > now;
            }
            if stored.expires_at > now {
                cleared += 1;
            }
            false
        });
        Ok(cleared)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let entries = u64::try_from(self.len())
            .map_err(|e| ForgeError::Cache(format!("entry count overflow: {}", e)))?;

        Ok(CacheStats {
            backend: self.name().to_string(),
            entries: Some(entries),
            keyspace_hits: hits,
            keyspace_misses: misses,
            hit_ratio_percent: CacheStats::compute_hit_ratio(hits, misses),
            ..Default::default()
        })
    }

    async fn close(&self) {}

    fn name(&self) -> &str {
        "memory"
    }
}
