//! Configuration Types
//!
//! All configuration structures with sensible defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{cache, network, retry};
use crate::types::{ForgeError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings
    pub server: ServerConfig,

    /// LLM provider and retry settings
    pub llm: LlmConfig,

    /// Analysis cache settings
    pub cache: CacheConfig,
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `ForgeError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(ForgeError::Config(
                "server.port must be greater than 0".to_string(),
            ));
        }

        if self.llm.retry.max_attempts == 0 {
            return Err(ForgeError::Config(
                "llm.retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.llm.retry.backoff_factor < 1.0 {
            return Err(ForgeError::Config(format!(
                "llm.retry.backoff_factor must be >= 1.0, got {}",
                self.llm.retry.backoff_factor
            )));
        }

        for (name, temperature) in [
            ("openai", self.llm.openai.temperature),
            ("ollama", self.llm.ollama.temperature),
        ] {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ForgeError::Config(format!(
                    "llm.{}.temperature must be between 0.0 and 2.0, got {}",
                    name, temperature
                )));
            }
        }

        if self.llm.openai.timeout_secs == 0 || self.llm.ollama.timeout_secs == 0 {
            return Err(ForgeError::Config(
                "LLM timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.cache.ttl_secs == 0 {
            return Err(ForgeError::Config(
                "cache.ttl_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allow any origin/method/header (CORS)
    pub cors_allow_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: network::DEFAULT_HOST.to_string(),
            port: network::DEFAULT_PORT,
            cors_allow_any: true,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub openai: OpenAiConfig,
    pub ollama: OllamaConfig,
    pub retry: RetryConfig,
}

/// OpenAI provider settings
///
/// The API key is never serialized and is redacted in debug output.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4-turbo-preview".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
            timeout_secs: network::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl OpenAiConfig {
    /// Configured key, falling back to `OPENAI_API_KEY`
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// Same as [`resolve_api_key`](Self::resolve_api_key) with an injected
    /// environment lookup. A configured key, even a blank one, wins over
    /// the environment; blank keys resolve to `None`.
    pub fn resolve_api_key_with(&self, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| env("OPENAI_API_KEY"))
            .filter(|key| !key.trim().is_empty())
    }
}

/// Ollama provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// When false the backend answers with NOT_IMPLEMENTED
    pub enabled: bool,
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: "http://localhost:11434".to_string(),
            model: "llama3:latest".to_string(),
            temperature: 0.7,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f32,
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: retry::MAX_ATTEMPTS,
            base_delay_ms: retry::BASE_DELAY_MS,
            backoff_factor: retry::BACKOFF_FACTOR,
            max_delay_secs: retry::MAX_DELAY_SECS,
        }
    }
}

// =============================================================================
// Cache Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Redis,
    Memory,
    Disabled,
}

impl std::fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackend::Redis => write!(f, "redis"),
            CacheBackend::Memory => write!(f, "memory"),
            CacheBackend::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub ttl_secs: u64,
    pub key_prefix: String,
    pub redis: RedisConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            ttl_secs: cache::DEFAULT_TTL_SECS,
            key_prefix: cache::KEY_PREFIX.to_string(),
            redis: RedisConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub db: i64,
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("db", &self.db)
            .finish()
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
        }
    }
}

impl RedisConfig {
    /// Connection URL in `redis://[:password@]host:port/db` form
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.cache.ttl_secs, 604_800);
        assert_eq!(config.llm.retry.max_attempts, 3);
        assert!(!config.llm.ollama.enabled);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = Config::default();
        config.llm.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_temperature() {
        let mut config = Config::default();
        config.llm.openai.temperature = 3.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_api_key_is_redacted_and_not_serialized() {
        let mut config = OpenAiConfig::default();
        config.api_key = Some("sk-secret".to_string());

        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn test_api_key_resolution() {
        let from_env = |name: &str| (name == "OPENAI_API_KEY").then(|| "sk-env".to_string());
        let no_env = |_: &str| None;

        let mut config = OpenAiConfig::default();
        assert_eq!(config.resolve_api_key_with(from_env), Some("sk-env".to_string()));
        assert_eq!(config.resolve_api_key_with(no_env), None);

        config.api_key = Some("sk-file".to_string());
        assert_eq!(config.resolve_api_key_with(from_env), Some("sk-file".to_string()));

        config.api_key = Some("  ".to_string());
        assert_eq!(config.resolve_api_key_with(from_env), None);
    }

    #[test]
    fn test_redis_connection_url() {
        let mut redis = RedisConfig::default();
        assert_eq!(redis.connection_url(), "redis://localhost:6379/0");

        redis.password = Some("hunter2".to_string());
        redis.db = 3;
        assert_eq!(redis.connection_url(), "redis://:hunter2@localhost:6379/3");
    }
}
