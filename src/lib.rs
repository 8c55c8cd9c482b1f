//! CodeForge - Streaming LLM Problem Analysis
//!
//! Turns a problem statement into a structured technical analysis produced
//! by an LLM, delivered as an ordered stream of progress, content and
//! terminal events.
//!
//! ## Core Features
//!
//! - **Streaming orchestration**: cache lookup, generation and cache write
//!   driven by the consumer; dropping the stream cancels the analysis
//! - **Retry with backoff**: rate limits, timeouts and provider errors are
//!   retried on an exponential schedule with client-visible notices
//! - **Content-addressed cache**: analyses keyed by a digest of the problem
//!   description, fail-open when the store is unavailable
//! - **Transports**: REST, server-sent events and WebSocket via axum
//!
//! ## Quick Start
//!
//! ```ignore
//! use codeforge::{AnalysisRequest, Analyzer, Backend, ConfigLoader};
//! use futures::StreamExt;
//!
//! let config = ConfigLoader::load(None)?;
//! let analyzer = Analyzer::from_config(&config).await?;
//! let request = AnalysisRequest::new(title, description, Backend::OpenAi)?;
//! let mut events = analyzer.stream_analysis(request);
//! while let Some(event) = events.next().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: provider adapters, prompt rendering, retry controller
//! - [`analysis`]: the streaming orchestrator
//! - [`cache`]: cache keys, stores and the fail-open facade
//! - [`records`]: in-memory problem records
//! - [`server`]: HTTP, SSE and WebSocket surfaces

pub mod ai;
pub mod analysis;
pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod records;
pub mod server;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{ErrorCode, ForgeError, Result};

// Domain
pub use types::{AnalysisPayload, AnalysisRequest, AnalysisResult, Backend, StreamEvent};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use analysis::Analyzer;
pub use cache::{AnalysisCache, CacheStore, MemoryCacheStore, RedisCacheStore};
pub use records::ProblemStore;
pub use server::{AppState, create_router, serve};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    AnalysisProvider, OllamaProvider, OpenAiProvider, ProviderRegistry, RetryController,
    RetryPolicy,
};
#[cfg(feature = "test-util")]
pub use ai::{ScriptedAttempt, ScriptedProvider};
