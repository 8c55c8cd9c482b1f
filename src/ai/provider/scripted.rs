//! Deterministic provider replaying canned attempts
//!
//! Each `generate` call consumes the next [`ScriptedAttempt`]. Used to drive
//! the pipeline without network access in tests. Compiled only for tests or
//! with the `test-util` feature.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;

use super::{AnalysisProvider, FragmentStream};
use crate::types::ProviderFailure;

/// Outcome of one scripted `generate` call
#[derive(Debug, Clone)]
pub enum ScriptedAttempt {
    /// Stream all fragments, then end normally
    Succeed(Vec<String>),
    /// Reject the call before any fragment
    Reject(ProviderFailure),
    /// Stream some fragments, then fail mid-stream
    FailAfter {
        fragments: Vec<String>,
        failure: ProviderFailure,
    },
    /// Stream some fragments, then never finish
    Stall(Vec<String>),
}

impl ScriptedAttempt {
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Succeed(fragments.into_iter().map(Into::into).collect())
    }
}

pub struct ScriptedProvider {
    name: String,
    attempts: Mutex<VecDeque<ScriptedAttempt>>,
    /// Replayed once the script runs out
    fallback: Option<ScriptedAttempt>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(attempts: Vec<ScriptedAttempt>) -> Self {
        Self {
            name: "scripted".to_string(),
            attempts: Mutex::new(attempts.into()),
            fallback: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Provider that answers every call with `attempt`
    pub fn always(attempt: ScriptedAttempt) -> Self {
        Self {
            fallback: Some(attempt),
            ..Self::new(Vec::new())
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of `generate` calls made so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisProvider for ScriptedProvider {
    async fn generate(
        &self,
        _prompt: &str,
        _model: Option<&str>,
    ) -> Result<FragmentStream, ProviderFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let next = self.attempts.lock().await.pop_front();
        let attempt = match next.or_else(|| self.fallback.clone()) {
            Some(attempt) => attempt,
            None => {
                return Err(
                    ProviderFailure::provider_error("script exhausted").provider(&self.name)
                );
            }
        };

        let ok = |fragments: Vec<String>| fragments.into_iter().map(Ok);
        Ok(match attempt {
            ScriptedAttempt::Succeed(fragments) => stream::iter(ok(fragments)).boxed(),
            ScriptedAttempt::Reject(failure) => return Err(failure),
            ScriptedAttempt::FailAfter { fragments, failure } => {
                stream::iter(ok(fragments).chain(std::iter::once(Err(failure)))).boxed()
            }
            ScriptedAttempt::Stall(fragments) => stream::iter(ok(fragments))
                .chain(stream::pending())
                .boxed(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_attempts_are_consumed_in_order() {
        let provider = ScriptedProvider::new(vec![
            ScriptedAttempt::Reject(ProviderFailure::rate_limited("slow down")),
            ScriptedAttempt::fragments(["a", "b"]),
        ]);

        assert!(provider.generate("p", None).await.is_err());
        let Ok(stream) = provider.generate("p", None).await else {
            panic!("expected stream");
        };
        let fragments: Vec<String> = stream.try_collect().await.unwrap();
        assert_eq!(fragments, vec!["a", "b"]);

        assert!(provider.generate("p", None).await.is_err());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_always_repeats() {
        let provider = ScriptedProvider::always(ScriptedAttempt::Reject(ProviderFailure::timeout(
            "deadline",
        )));
        for _ in 0..5 {
            assert!(provider.generate("p", None).await.is_err());
        }
        assert_eq!(provider.calls(), 5);
    }

    #[tokio::test]
    async fn test_fail_after_yields_fragments_first() {
        let provider = ScriptedProvider::new(vec![ScriptedAttempt::FailAfter {
            fragments: vec!["partial".to_string()],
            failure: ProviderFailure::provider_error("reset"),
        }]);
        let Ok(mut stream) = provider.generate("p", None).await else {
            panic!("expected stream");
        };
        assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }
}
