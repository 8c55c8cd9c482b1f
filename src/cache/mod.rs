//! Analysis Cache
//!
//! Content-addressed cache of completed analyses.
//!
//! ## Keys
//!
//! `analysis:` + first 16 hex chars of SHA-256(description UTF-8). Title and
//! backend do not participate, so two requests sharing a description share
//! a cache entry.
//!
//! ## Failure Policy
//!
//! [`AnalysisCache`] is fail-open: store errors on lookup or write are
//! logged and treated as a miss / skipped write. Only administrative
//! operations (clear, stats) report errors to their caller.

mod memory;
mod redis_store;

pub use memory::MemoryCacheStore;
pub use redis_store::RedisCacheStore;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::config::{CacheBackend, CacheConfig};
use crate::constants::cache as cache_constants;
use crate::types::{ForgeError, Result};

// =============================================================================
// Keys and Entries
// =============================================================================

/// Deterministic fingerprint of a problem description
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `description` under the default `analysis:` prefix
    pub fn for_description(description: &str) -> Self {
        Self::with_prefix(cache_constants::KEY_PREFIX, description)
    }

    pub fn with_prefix(prefix: &str, description: &str) -> Self {
        let digest = Sha256::digest(description.as_bytes());
        let hex: String = digest
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect::<String>();
        Self(format!(
            "{}{}",
            prefix,
            &hex[..cache_constants::DIGEST_HEX_CHARS]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Persisted analysis payload: `{analysis, tokens_used, timestamp}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub analysis: String,
    #[serde(default)]
    pub tokens_used: Option<u32>,
    /// Seconds since the Unix epoch at write time
    pub timestamp: f64,
}

impl CacheEntry {
    pub fn new(analysis: impl Into<String>, tokens_used: Option<u32>) -> Self {
        Self {
            analysis: analysis.into(),
            tokens_used,
            timestamp: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }
}

/// Store statistics; fields a backend cannot report stay `None`
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_clients: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_connections_received: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_commands_processed: Option<u64>,
    pub keyspace_hits: u64,
    pub keyspace_misses: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_in_seconds: Option<u64>,
    pub hit_ratio_percent: f64,
}

impl CacheStats {
    /// Hit ratio in percent, rounded to two decimals
    pub fn compute_hit_ratio(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        let ratio = hits as f64 / total as f64 * 100.0;
        (ratio * 100.0).round() / 100.0
    }
}

// =============================================================================
// Store Trait
// =============================================================================

/// Key-value store with expiry backing the analysis cache
///
/// Implementations must tolerate concurrent use from many analyses.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Write `entry`, replacing any previous value (last writer wins)
    async fn put(&self, key: &CacheKey, entry: &CacheEntry, ttl: Duration) -> Result<()>;

    /// Remove every key starting with `prefix`; returns the number removed
    async fn clear(&self, prefix: &str) -> Result<usize>;

    async fn ping(&self) -> Result<()>;

    async fn stats(&self) -> Result<CacheStats>;

    /// Release the underlying connection; later operations fail
    async fn close(&self);

    fn name(&self) -> &str;
}

pub type SharedCacheStore = Arc<dyn CacheStore>;

// =============================================================================
// Fail-open Facade
// =============================================================================

/// Fail-open cache used by the analysis pipeline
#[derive(Clone)]
pub struct AnalysisCache {
    store: Option<SharedCacheStore>,
    prefix: String,
    ttl: Duration,
}

impl fmt::Debug for AnalysisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisCache")
            .field("store", &self.store.as_ref().map(|s| s.name().to_string()))
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl AnalysisCache {
    pub fn new(store: SharedCacheStore, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store: Some(store),
            prefix: prefix.into(),
            ttl,
        }
    }

    /// Cache with default prefix and TTL
    pub fn with_store(store: SharedCacheStore) -> Self {
        Self::new(
            store,
            cache_constants::KEY_PREFIX,
            Duration::from_secs(cache_constants::DEFAULT_TTL_SECS),
        )
    }

    /// A cache that always misses and never writes
    pub fn disabled() -> Self {
        Self {
            store: None,
            prefix: cache_constants::KEY_PREFIX.to_string(),
            ttl: Duration::from_secs(cache_constants::DEFAULT_TTL_SECS),
        }
    }

    /// Build the cache from configuration
    ///
    /// A Redis connection failure is logged and yields a disabled cache.
    pub async fn connect(config: &CacheConfig) -> Self {
        let store: SharedCacheStore = match config.backend {
            CacheBackend::Disabled => {
                info!("Analysis cache disabled by configuration");
                return Self::disabled();
            }
            CacheBackend::Memory => Arc::new(MemoryCacheStore::new()),
            CacheBackend::Redis => match RedisCacheStore::connect(&config.redis).await {
                Ok(store) => {
                    info!(
                        host = %config.redis.host,
                        port = config.redis.port,
                        "Redis connection established"
                    );
                    Arc::new(store)
                }
                Err(e) => {
                    error!(error = %e, "Failed to connect to Redis; caching disabled");
                    return Self::disabled();
                }
            },
        };

        Self::new(store, config.key_prefix.clone(), config.ttl())
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key_for(&self, description: &str) -> CacheKey {
        CacheKey::with_prefix(&self.prefix, description)
    }

    /// Look up a previous analysis; any store error is a miss
    pub async fn lookup(&self, description: &str) -> Option<CacheEntry> {
        let store = self.store.as_ref()?;
        let key = self.key_for(description);

        match store.get(&key).await {
            Ok(Some(entry)) => {
                info!(key = %key, "Cache hit");
                Some(entry)
            }
            Ok(None) => None,
            Err(e) => {
                error!(key = %key, error = %e, "Cache check error");
                None
            }
        }
    }

    /// Store a completed analysis; any store error is logged and skipped
    pub async fn remember(&self, description: &str, analysis: &str, tokens_used: Option<u32>) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let key = self.key_for(description);
        let entry = CacheEntry::new(analysis, tokens_used);

        match store.put(&key, &entry, self.ttl).await {
            Ok(()) => info!(key = %key, bytes = analysis.len(), "Analysis cached"),
            Err(e) => error!(key = %key, error = %e, "Cache store error"),
        }
    }

    /// Remove all cached analyses under this cache's prefix
    pub async fn clear(&self) -> Result<usize> {
        let store = self.require_store()?;
        let cleared = store.clear(&self.prefix).await?;
        info!(cleared, "Cleared cached analyses");
        Ok(cleared)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        self.require_store()?.stats().await
    }

    /// Health of the backing store: `healthy`, `disconnected` or `error: ...`
    pub async fn health(&self) -> String {
        match &self.store {
            None => "disconnected".to_string(),
            Some(store) => match store.ping().await {
                Ok(()) => "healthy".to_string(),
                Err(e) => {
                    warn!(error = %e, "Cache health check failed");
                    format!("error: {}", e)
                }
            },
        }
    }

    /// Release the store connection
    pub async fn close(&self) {
        if let Some(store) = &self.store {
            store.close().await;
            info!(store = store.name(), "Cache connection closed");
        }
    }

    fn require_store(&self) -> Result<&SharedCacheStore> {
        self.store
            .as_ref()
            .ok_or_else(|| ForgeError::Cache("cache store not connected".to_string()))
    }
}
