//! Cache Command
//!
//! Inspect or clear the analysis cache configured for this project.
//!
//! Usage:
//!   codeforge cache stats
//!   codeforge cache clear

use std::path::Path;

use crate::cache::AnalysisCache;
use crate::cli::Output;
use crate::config::ConfigLoader;
use crate::types::{ForgeError, Result};

async fn connect(config_path: Option<&Path>) -> Result<AnalysisCache> {
    let config = ConfigLoader::load(config_path)?;
    let cache = AnalysisCache::connect(&config.cache).await;
    if !cache.is_enabled() {
        return Err(ForgeError::Cache(format!(
            "cache backend '{}' is not available",
            config.cache.backend
        )));
    }
    Ok(cache)
}

pub async fn stats(config_path: Option<&Path>) -> Result<()> {
    let cache = connect(config_path).await?;
    let outcome = cache.stats().await;
    cache.close().await;
    let stats = outcome?;

    let output = Output::new();
    output.section(&format!("Cache statistics ({})", stats.backend));
    let optional = [
        ("entries", stats.entries),
        ("connected_clients", stats.connected_clients),
        ("total_connections_received", stats.total_connections_received),
        ("total_commands_processed", stats.total_commands_processed),
        ("uptime_in_seconds", stats.uptime_in_seconds),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            output.field(key, value);
        }
    }
    if let Some(used_memory) = &stats.used_memory {
        output.field("used_memory", used_memory);
    }
    output.field("keyspace_hits", stats.keyspace_hits);
    output.field("keyspace_misses", stats.keyspace_misses);
    output.field("hit_ratio_percent", stats.hit_ratio_percent);
    Ok(())
}

pub async fn clear(config_path: Option<&Path>) -> Result<()> {
    let cache = connect(config_path).await?;
    let outcome = cache.clear().await;
    cache.close().await;

    let output = Output::new();
    match outcome? {
        0 => output.info("No cached analyses found"),
        cleared => output.success(&format!("Cleared {} cached analyses", cleared)),
    }
    Ok(())
}
