//! Streaming Analysis Orchestrator
//!
//! Turns `(title, description, backend)` into an ordered stream of
//! [`StreamEvent`]s:
//!
//! ```text
//! Status(0) ─┬─ cache hit ──▶ Status(50) ─▶ Delta(cached) ─▶ Complete
//!            └─ cache miss ─▶ retry controller events ... ─▶ Complete | Error
//!                                                 └─ cache write spawned on Complete
//! ```
//!
//! Every stream ends with exactly one terminal event. Streams are lazy: the
//! cache lookup and provider calls happen while the consumer polls, so
//! dropping the stream before `Complete` cancels the analysis and nothing
//! partial is cached. The cache write is detached the moment `Complete` is
//! produced, so a consumer may stop at the terminal event.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, BoxStream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, debug, info, info_span, instrument, warn};

use crate::ai::{
    AnalysisPromptTemplate, PromptRenderer, ProviderRegistry, RetryController, RetryEvent,
    RetryPolicy,
};
use crate::cache::AnalysisCache;
use crate::config::Config;
use crate::constants::progress;
use crate::types::{AnalysisRequest, AnalysisResult, ErrorCode, ForgeError, Result, StreamEvent};

/// Analysis orchestrator with injected cache, providers and retry policy
#[derive(Clone)]
pub struct Analyzer {
    cache: AnalysisCache,
    providers: ProviderRegistry,
    retry: RetryController,
    prompts: Arc<dyn PromptRenderer>,
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("cache", &self.cache)
            .field("providers", &self.providers)
            .field("retry", &self.retry)
            .finish()
    }
}

impl Analyzer {
    pub fn new(cache: AnalysisCache, providers: ProviderRegistry, policy: RetryPolicy) -> Self {
        Self {
            cache,
            providers,
            retry: RetryController::new(policy),
            prompts: Arc::new(AnalysisPromptTemplate),
        }
    }

    /// Connect the configured cache and build providers
    ///
    /// An unreachable cache does not fail construction; analyses then run
    /// uncached.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let cache = AnalysisCache::connect(&config.cache).await;
        let providers = ProviderRegistry::from_config(&config.llm)?;
        if providers.is_empty() {
            warn!("No LLM providers configured; every analysis will fail");
        }
        Ok(Self::new(
            cache,
            providers,
            RetryPolicy::from_config(&config.llm.retry),
        ))
    }

    /// Replace the default prompt template
    pub fn with_prompt_renderer(mut self, prompts: Arc<dyn PromptRenderer>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Stream the events of one analysis
    ///
    /// Never fails: every problem surfaces as a terminal `Error` event.
    pub fn stream_analysis(&self, request: AnalysisRequest) -> BoxStream<'static, StreamEvent> {
        let run = self.start_run(request);

        stream::unfold(run, |mut run| async move {
            let span = run.span.clone();
            let event = run.next_event().instrument(span).await?;
            Some((event, run))
        })
        .boxed()
    }

    /// Run an analysis to completion and return the aggregated result
    ///
    /// A terminal `Error` event becomes [`ForgeError::Analysis`]; no partial
    /// result is ever returned.
    #[instrument(skip_all, fields(backend = %request.backend()))]
    pub async fn analyze_blocking(&self, request: AnalysisRequest) -> Result<AnalysisResult> {
        let started = Instant::now();
        let mut run = self.start_run(request);
        let mut processing_time = Duration::ZERO;

        while let Some(event) = run.next_event().await {
            match event {
                StreamEvent::Error {
                    message,
                    error_code,
                } => {
                    warn!(code = %error_code, %message, "Blocking analysis failed");
                    return Err(ForgeError::Analysis {
                        code: error_code,
                        message,
                    });
                }
                StreamEvent::Complete { .. } => processing_time = started.elapsed(),
                _ => {}
            }
        }

        if let Some(write) = run.cache_write.take() {
            if let Err(e) = write.await {
                warn!(error = %e, "Cache write task failed");
            }
        }

        let cached = !run.provider_called;
        info!(
            cached,
            chars = run.buffer.len(),
            elapsed_ms = processing_time.as_millis() as u64,
            "Blocking analysis finished"
        );

        Ok(AnalysisResult {
            analysis: run.buffer,
            tokens_used: run.tokens_used,
            processing_time,
            cached,
        })
    }

    fn start_run(&self, request: AnalysisRequest) -> AnalysisRun {
        let span = info_span!(
            "analysis",
            backend = %request.backend(),
            title = %request.title()
        );
        AnalysisRun {
            cache: self.cache.clone(),
            providers: self.providers.clone(),
            retry: self.retry.clone(),
            prompts: Arc::clone(&self.prompts),
            request,
            stage: Stage::Start,
            pending: VecDeque::new(),
            buffer: String::new(),
            tokens_used: None,
            provider_called: false,
            cache_write: None,
            span,
        }
    }
}

// =============================================================================
// Run State Machine
// =============================================================================

enum Stage {
    Start,
    Lookup,
    Generate(BoxStream<'static, RetryEvent>),
    Done,
}

struct AnalysisRun {
    cache: AnalysisCache,
    providers: ProviderRegistry,
    retry: RetryController,
    prompts: Arc<dyn PromptRenderer>,
    request: AnalysisRequest,
    stage: Stage,
    pending: VecDeque<StreamEvent>,
    /// Content of the current attempt, or the cached analysis on a hit
    buffer: String,
    tokens_used: Option<u32>,
    provider_called: bool,
    /// Detached cache write started on `Complete`
    cache_write: Option<JoinHandle<()>>,
    span: Span,
}

impl AnalysisRun {
    async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            match &mut self.stage {
                Stage::Done => return None,
                Stage::Start => {
                    self.stage = Stage::Lookup;
                    return Some(StreamEvent::status(
                        "Initializing analysis...",
                        progress::INITIALIZING,
                    ));
                }
                Stage::Lookup => self.lookup().await,
                Stage::Generate(events) => match events.next().await {
                    Some(RetryEvent::Event(event)) => {
                        match &event {
                            StreamEvent::Delta { content } => self.buffer.push_str(content),
                            StreamEvent::Complete { .. } => {
                                self.stage = Stage::Done;
                                self.store_result();
                            }
                            StreamEvent::Error { .. } => self.stage = Stage::Done,
                            StreamEvent::Status { .. } => {}
                        }
                        return Some(event);
                    }
                    Some(RetryEvent::AttemptAborted { attempt }) => {
                        debug!(
                            attempt,
                            discarded = self.buffer.len(),
                            "Discarding partial attempt output"
                        );
                        self.buffer.clear();
                    }
                    None => {
                        self.stage = Stage::Done;
                        return Some(StreamEvent::error(
                            ErrorCode::AnalysisFailed,
                            "Analysis failed: provider stream ended without a result",
                        ));
                    }
                },
            }
        }
    }

    /// Fire-and-forget write of the finished analysis
    fn store_result(&mut self) {
        if self.buffer.is_empty() || !self.cache.is_enabled() {
            return;
        }

        let cache = self.cache.clone();
        let description = self.request.description().to_string();
        let analysis = self.buffer.clone();
        let write = async move { cache.remember(&description, &analysis, None).await };
        self.cache_write = Some(tokio::spawn(write.instrument(self.span.clone())));
    }

    async fn lookup(&mut self) {
        if let Some(entry) = self.cache.lookup(self.request.description()).await {
            self.pending
                .push_back(StreamEvent::status("Found cached analysis", progress::CACHE_HIT));
            self.pending.push_back(StreamEvent::delta(entry.analysis.clone()));
            self.pending.push_back(StreamEvent::complete());
            self.buffer = entry.analysis;
            self.tokens_used = entry.tokens_used;
            self.stage = Stage::Done;
            return;
        }

        let prompt = self.prompts.render(&self.request);
        let backend = self.request.backend();

        match self.providers.get(backend) {
            Some(provider) => {
                debug!(provider = provider.name(), "Starting provider generation");
                self.provider_called = true;
                self.stage = Stage::Generate(self.retry.run(provider, prompt, None));
            }
            None => {
                warn!(%backend, "No provider registered for backend");
                self.pending.push_back(StreamEvent::error(
                    ErrorCode::UnsupportedBackend,
                    format!("Unsupported backend: {}", backend),
                ));
                self.stage = Stage::Done;
            }
        }
    }
}
