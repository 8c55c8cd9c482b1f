//! LLM Provider Abstraction
//!
//! Defines the [`AnalysisProvider`] trait: turn a prompt into a lazy stream
//! of text fragments. Providers never retry; a call either yields its whole
//! stream or fails with a classified [`ProviderFailure`], which the retry
//! controller acts on.
//!
//! ## Modules
//!
//! - `openai`: Chat Completions over server-sent events
//! - `ollama`: local models over newline-delimited JSON
//! - `scripted`: deterministic provider replaying canned attempts (tests and
//!   the `test-util` feature)
//! - `unimplemented`: placeholder for a backend that is not wired up

mod framing;
mod ollama;
mod openai;
#[cfg(any(test, feature = "test-util"))]
mod scripted;
mod unimplemented;

pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
#[cfg(any(test, feature = "test-util"))]
pub use scripted::{ScriptedAttempt, ScriptedProvider};
pub use unimplemented::UnimplementedProvider;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use secrecy::SecretString;
use tracing::{info, warn};

use crate::config::LlmConfig;
use crate::types::{Backend, ProviderFailure, Result};

/// Incremental text fragments of one generation; finite and not restartable
pub type FragmentStream = BoxStream<'static, std::result::Result<String, ProviderFailure>>;

/// Shared provider type for concurrent access across analyses
pub type SharedProvider = Arc<dyn AnalysisProvider>;

// =============================================================================
// Provider Trait
// =============================================================================

/// Streaming text generation backend
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Open a generation stream for `prompt`
    ///
    /// `model` overrides the configured model for this call. Failures may
    /// surface here (request rejected) or later inside the stream.
    async fn generate(
        &self,
        prompt: &str,
        model: Option<&str>,
    ) -> std::result::Result<FragmentStream, ProviderFailure>;

    /// Provider name for logging
    fn name(&self) -> &str;

    /// Model name currently in use
    fn model(&self) -> &str;

    /// Check if the provider is reachable
    async fn health_check(&self) -> bool;
}

// =============================================================================
// Registry
// =============================================================================

/// Provider health as reported by `/api/health`
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderHealth {
    pub backend: Backend,
    pub provider: String,
    pub model: String,
    pub available: bool,
}

/// Backend identifier → provider implementation
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Backend, SharedProvider>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (backend, provider) in &self.providers {
            map.entry(backend, &provider.name());
        }
        map.finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for `backend`, replacing any previous one
    pub fn with(mut self, backend: Backend, provider: SharedProvider) -> Self {
        self.providers.insert(backend, provider);
        self
    }

    pub fn register(&mut self, backend: Backend, provider: SharedProvider) {
        self.providers.insert(backend, provider);
    }

    pub fn get(&self, backend: Backend) -> Option<SharedProvider> {
        self.providers.get(&backend).cloned()
    }

    pub fn contains(&self, backend: Backend) -> bool {
        self.providers.contains_key(&backend)
    }

    /// Registered backends in declaration order
    pub fn backends(&self) -> Vec<Backend> {
        Backend::all()
            .into_iter()
            .filter(|backend| self.providers.contains_key(backend))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Build the registry from configuration
    ///
    /// OpenAI is only registered when an API key is available. Ollama is
    /// registered either as a live provider or, when disabled, as a
    /// placeholder that reports `NOT_IMPLEMENTED`.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut registry = Self::new();

        match config.openai.resolve_api_key() {
            Some(key) => {
                let provider = OpenAiProvider::new(&config.openai, SecretString::from(key))?;
                info!(model = provider.model(), "Registered OpenAI provider");
                registry.register(Backend::OpenAi, Arc::new(provider));
            }
            None => warn!("No OpenAI API key configured; openai backend unavailable"),
        }

        if config.ollama.enabled {
            let provider = OllamaProvider::new(&config.ollama)?;
            info!(model = provider.model(), "Registered Ollama provider");
            registry.register(Backend::Ollama, Arc::new(provider));
        } else {
            registry.register(
                Backend::Ollama,
                Arc::new(UnimplementedProvider::new(Backend::Ollama)),
            );
        }

        Ok(registry)
    }

    /// Probe every registered provider
    pub async fn health(&self) -> Vec<ProviderHealth> {
        let mut report = Vec::with_capacity(self.providers.len());
        for backend in self.backends() {
            let Some(provider) = self.get(backend) else {
                continue;
            };
            report.push(ProviderHealth {
                backend,
                provider: provider.name().to_string(),
                model: provider.model().to_string(),
                available: provider.health_check().await,
            });
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;

    #[test]
    fn test_registry_from_config_without_key() {
        let mut config = LlmConfig::default();
        // A configured blank key never falls back to the environment
        config.openai.api_key = Some("   ".to_string());

        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert!(!registry.contains(Backend::OpenAi));
        assert!(registry.contains(Backend::Ollama));
        assert_eq!(registry.get(Backend::Ollama).unwrap().name(), "ollama");
    }

    #[test]
    fn test_registry_from_config_with_key() {
        let mut config = LlmConfig::default();
        config.openai.api_key = Some("sk-test".to_string());
        config.ollama.enabled = true;

        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert_eq!(registry.backends(), vec![Backend::OpenAi, Backend::Ollama]);
        assert_eq!(registry.get(Backend::OpenAi).unwrap().model(), "gpt-4-turbo-preview");

        let debug = format!("{:?}", registry);
        assert!(!debug.contains("sk-test"));
    }

    #[test]
    fn test_registry_replaces_provider() {
        let registry = ProviderRegistry::new()
            .with(
                Backend::OpenAi,
                Arc::new(ScriptedProvider::new(vec![ScriptedAttempt::fragments(["a"])])),
            )
            .with(
                Backend::OpenAi,
                Arc::new(UnimplementedProvider::new(Backend::OpenAi)),
            );
        assert_eq!(registry.backends(), vec![Backend::OpenAi]);
        assert_eq!(registry.get(Backend::OpenAi).unwrap().name(), "openai");
    }
}
