//! Placeholder provider for a backend that is not wired up
//!
//! Every call fails immediately with `NotImplemented`, which the retry
//! controller turns into a single terminal `NOT_IMPLEMENTED` error event.

use async_trait::async_trait;
use tracing::warn;

use super::{AnalysisProvider, FragmentStream};
use crate::types::{Backend, ProviderFailure};

#[derive(Debug, Clone)]
pub struct UnimplementedProvider {
    backend: Backend,
}

impl UnimplementedProvider {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl AnalysisProvider for UnimplementedProvider {
    async fn generate(
        &self,
        _prompt: &str,
        _model: Option<&str>,
    ) -> Result<FragmentStream, ProviderFailure> {
        warn!(backend = %self.backend, "Analysis requested on unimplemented backend");
        Err(ProviderFailure::not_implemented(format!(
            "{} backend not yet implemented",
            capitalize(self.backend.as_str())
        ))
        .provider(self.backend.as_str()))
    }

    fn name(&self) -> &str {
        self.backend.as_str()
    }

    fn model(&self) -> &str {
        "none"
    }

    async fn health_check(&self) -> bool {
        false
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FailureKind;

    #[tokio::test]
    async fn test_generate_fails_without_retry() {
        let provider = UnimplementedProvider::new(Backend::Ollama);
        let Err(failure) = provider.generate("prompt", None).await else {
            panic!("expected failure");
        };
        assert_eq!(failure.kind, FailureKind::NotImplemented);
        assert!(!failure.is_retryable());
        assert_eq!(failure.message, "Ollama backend not yet implemented");
        assert!(!provider.health_check().await);
    }
}
