//! Redis cache store
//!
//! One `ConnectionManager` is shared by all operations; each operation works
//! on a cheap clone of it. `close` drops the manager so later calls fail with
//! a cache error rather than silently reconnecting.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::RwLock;
use tracing::debug;

use super::{CacheEntry, CacheKey, CacheStats, CacheStore};
use crate::config::RedisConfig;
use crate::constants::cache::SCAN_BATCH;
use crate::types::{ForgeError, Result};

pub struct RedisCacheStore {
    connection: RwLock<Option<ConnectionManager>>,
}

impl RedisCacheStore {
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        Self::connect_url(&config.connection_url()).await
    }

    pub async fn connect_url(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let mut manager = client.get_connection_manager().await?;

        let _: String = redis::cmd("PING").query_async(&mut manager).await?;

        Ok(Self {
            connection: RwLock::new(Some(manager)),
        })
    }

    async fn conn(&self) -> Result<ConnectionManager> {
        self.connection
            .read()
            .await
            .clone()
            .ok_or_else(|| ForgeError::Cache("redis connection closed".to_string()))
    }
}

/// Parse the `field:value` lines of an INFO reply
fn parse_info(raw: &str) -> HashMap<&str, &str> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .collect()
}

fn info_u64(info: &HashMap<&str, &str>, field: &str) -> Option<u64> {
    info.get(field).and_then(|v| v.parse().ok())
}

fn stats_from_info(raw: &str, entries: Option<u64>) -> CacheStats {
    let info = parse_info(raw);
    let hits = info_u64(&info, "keyspace_hits").unwrap_or(0);
    let misses = info_u64(&info, "keyspace_misses").unwrap_or(0);

    CacheStats {
        backend: "redis".to_string(),
        entries,
        connected_clients: info_u64(&info, "connected_clients"),
        used_memory: info.get("used_memory_human").map(|v| v.to_string()),
        total_connections_received: info_u64(&info, "total_connections_received"),
        total_commands_processed: info_u64(&info, "total_commands_processed"),
        keyspace_hits: hits,
        keyspace_misses: misses,
        uptime_in_seconds: info_u64(&info, "uptime_in_seconds"),
        hit_ratio_percent: CacheStats::compute_hit_ratio(hits, misses),
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(key.as_str()).await?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &CacheKey, entry: &CacheEntry, ttl: Duration) -> Result<()> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(entry)?;
        let _: () = conn.set_ex(key.as_str(), json, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn clear(&self, prefix: &str) -> Result<usize> {
        let mut conn = self.conn().await?;
        let pattern = format!("{}*", prefix);
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: usize = conn.del(&keys).await?;
                removed += deleted;
                debug!(batch = keys.len(), deleted, "Deleted cache keys");
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let mut conn = self.conn().await?;
        let raw: String = redis::cmd("INFO").query_async(&mut conn).await?;
        let entries: Option<u64> = redis::cmd("DBSIZE").query_async(&mut conn).await.ok();
        Ok(stats_from_info(&raw, entries))
    }

    async fn close(&self) {
        self.connection.write().await.take();
    }

    fn name(&self) -> &str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO_SAMPLE: &str = "# Server\r\n\
redis_version:7.2.4\r\n\
uptime_in_seconds:3600\r\n\
\r\n\
# Clients\r\n\
connected_clients:4\r\n\
\r\n\
# Memory\r\n\
used_memory_human:1.20M\r\n\
\r\n\
# Stats\r\n\
total_connections_received:17\r\n\
total_commands_processed:250\r\n\
keyspace_hits:30\r\n\
keyspace_misses:10\r\n";

    #[test]
    fn test_stats_from_info() {
        let stats = stats_from_info(INFO_SAMPLE, Some(12));
        assert_eq!(stats.backend, "redis");
        assert_eq!(stats.entries, Some(12));
        assert_eq!(stats.connected_clients, Some(4));
        assert_eq!(stats.used_memory.as_deref(), Some("1.20M"));
        assert_eq!(stats.total_connections_received, Some(17));
        assert_eq!(stats.total_commands_processed, Some(250));
        assert_eq!(stats.uptime_in_seconds, Some(3600));
        assert_eq!(stats.keyspace_hits, 30);
        assert_eq!(stats.keyspace_misses, 10);
        assert_eq!(stats.hit_ratio_percent, 75.0);
    }

    #[test]
    fn test_stats_from_empty_info() {
        let stats = stats_from_info("", None);
        assert_eq!(stats.keyspace_hits, 0);
        assert_eq!(stats.hit_ratio_percent, 0.0);
        assert!(stats.connected_clients.is_none());
    }
}
