//! AI Integration Layer
//!
//! Provider adapters, prompt rendering, and the retry controller that sits
//! between them and the analysis orchestrator.

pub mod prompt;
pub mod provider;
pub mod retry;

pub use prompt::{AnalysisPromptTemplate, PromptBuilder, PromptRenderer, SYSTEM_PROMPT};
pub use provider::{
    AnalysisProvider, FragmentStream, OllamaProvider, OpenAiProvider, ProviderHealth,
    ProviderRegistry, SharedProvider, UnimplementedProvider,
};
#[cfg(any(test, feature = "test-util"))]
pub use provider::{ScriptedAttempt, ScriptedProvider};
pub use retry::{RetryController, RetryEvent, RetryPolicy};
