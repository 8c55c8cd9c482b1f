//! Retry/Backoff Controller
//!
//! Wraps provider `generate` calls with bounded retries. Each attempt either
//! streams to completion or fails with a classified [`ProviderFailure`]:
//!
//! - retryable failure with attempts left: emit a retry notice, sleep, retry
//! - retryable failure on the last attempt: emit the terminal error
//! - non-retryable failure: emit the terminal error immediately
//!
//! The controller is a pull-driven stream. Nothing runs until it is polled,
//! and dropping it drops the in-flight provider stream with it.

use std::collections::VecDeque;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, info, warn};

use crate::ai::provider::{FragmentStream, SharedProvider};
use crate::config::RetryConfig;
use crate::constants::progress;
use crate::types::{FailureKind, ProviderFailure, StreamEvent};

// =============================================================================
// Policy
// =============================================================================

/// Bounded exponential backoff policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    factor: f32,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, factor: f32, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            factor: factor.max(1.0),
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            config.backoff_factor,
            Duration::from_secs(config.max_delay_secs),
        )
    }

    /// Total attempts, first try included
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delays before each retry: base, base × factor, ... capped at the max
    /// delay, one per retry (`max_attempts - 1` in total)
    pub fn delays(&self) -> impl Iterator<Item = Duration> + Send + 'static {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_factor(self.factor)
            .with_max_delay(self.max_delay)
            .with_max_times((self.max_attempts - 1) as usize)
            .build()
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Output of the retry controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryEvent {
    /// Event for the client
    Event(StreamEvent),
    /// The attempt that produced the preceding deltas failed; its partial
    /// output must be discarded
    AttemptAborted { attempt: u32 },
}

enum Phase {
    Connect,
    Open,
    Streaming {
        fragments: FragmentStream,
        received: usize,
    },
    Backoff(Duration),
    Finished,
}

struct RetryRun {
    provider: SharedProvider,
    prompt: String,
    model: Option<String>,
    max_attempts: u32,
    delays: Box<dyn Iterator<Item = Duration> + Send>,
    attempt: u32,
    phase: Phase,
    pending: VecDeque<RetryEvent>,
}

impl RetryRun {
    async fn next_event(&mut self) -> Option<RetryEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            match &mut self.phase {
                Phase::Finished => return None,
                Phase::Backoff(delay) => {
                    let delay = *delay;
                    tokio::time::sleep(delay).await;
                    self.phase = Phase::Connect;
                }
                Phase::Connect => {
                    self.attempt += 1;
                    let message = format!(
                        "Connecting to {} (attempt {})...",
                        self.provider.name(),
                        self.attempt
                    );
                    self.emit(StreamEvent::status(message, connect_progress(self.attempt)));
                    self.phase = Phase::Open;
                }
                Phase::Open => {
                    debug!(
                        provider = self.provider.name(),
                        attempt = self.attempt,
                        "Opening provider stream"
                    );
                    match self
                        .provider
                        .generate(&self.prompt, self.model.as_deref())
                        .await
                    {
                        Ok(fragments) => {
                            self.emit(StreamEvent::status(
                                "Generating analysis...",
                                progress::GENERATING,
                            ));
                            self.phase = Phase::Streaming {
                                fragments,
                                received: 0,
                            };
                        }
                        Err(failure) => self.fail(failure),
                    }
                }
                Phase::Streaming {
                    fragments,
                    received,
                } => match fragments.next().await {
                    Some(Ok(text)) => {
                        if text.is_empty() {
                            continue;
                        }
                        *received += 1;
                        let count = *received;
                        self.emit(StreamEvent::delta(text));
                        if count % progress::FRAGMENTS_PER_UPDATE == 0 {
                            self.emit(StreamEvent::progress(generation_progress(count)));
                        }
                    }
                    Some(Err(failure)) => {
                        let received = *received;
                        self.phase = Phase::Connect;
                        if received > 0 {
                            self.pending.push_back(RetryEvent::AttemptAborted {
                                attempt: self.attempt,
                            });
                        }
                        self.fail(failure);
                    }
                    None => {
                        info!(
                            provider = self.provider.name(),
                            attempt = self.attempt,
                            fragments = *received,
                            "Provider stream completed"
                        );
                        self.phase = Phase::Finished;
                        self.emit(StreamEvent::complete());
                    }
                },
            }
        }
    }

    fn emit(&mut self, event: StreamEvent) {
        self.pending.push_back(RetryEvent::Event(event));
    }

    /// Decide between retry and terminal error for a failed attempt
    fn fail(&mut self, failure: ProviderFailure) {
        warn!(
            provider = self.provider.name(),
            attempt = self.attempt,
            kind = %failure.kind,
            error = %failure.message,
            "Provider attempt failed"
        );

        let next_delay = if failure.is_retryable() && self.attempt < self.max_attempts {
            self.delays.next()
        } else {
            None
        };

        match next_delay {
            Some(delay) => {
                let message = format!(
                    "{}. Retrying in {} (attempt {} of {})...",
                    retry_reason(failure.kind),
                    format_delay(delay),
                    self.attempt + 1,
                    self.max_attempts
                );
                let progress = retry_progress(self.attempt);
                self.emit(StreamEvent::retry_notice(
                    message,
                    progress,
                    failure.kind.retry_code(),
                ));
                self.phase = Phase::Backoff(delay);
            }
            None => {
                self.emit(StreamEvent::error(
                    failure.kind.terminal_code(),
                    terminal_message(&failure),
                ));
                self.phase = Phase::Finished;
            }
        }
    }
}

/// Drives a provider with retries, producing a lazy event stream
#[derive(Debug, Clone, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Stream the events of one retried generation
    ///
    /// The stream ends after exactly one terminal event (`Complete` or
    /// `Error`). Deltas of a failed attempt are followed by
    /// [`RetryEvent::AttemptAborted`].
    pub fn run(
        &self,
        provider: SharedProvider,
        prompt: String,
        model: Option<String>,
    ) -> BoxStream<'static, RetryEvent> {
        let run = RetryRun {
            provider,
            prompt,
            model,
            max_attempts: self.policy.max_attempts(),
            delays: Box::new(self.policy.delays()),
            attempt: 0,
            phase: Phase::Connect,
            pending: VecDeque::new(),
        };

        stream::unfold(run, |mut run| async move {
            let event = run.next_event().await?;
            Some((event, run))
        })
        .boxed()
    }
}

fn generation_progress(fragments: usize) -> u8 {
    let steps = fragments / progress::FRAGMENTS_PER_UPDATE;
    let value = usize::from(progress::GENERATING) + steps * usize::from(progress::STEP);
    value.min(usize::from(progress::GENERATION_CEILING)) as u8
}

fn connect_progress(attempt: u32) -> u8 {
    let value =
        u32::from(progress::CONNECTING) + attempt.saturating_sub(1) * u32::from(progress::STEP);
    value.min(u32::from(progress::GENERATION_CEILING)) as u8
}

fn retry_progress(failed_attempt: u32) -> u8 {
    let value = u32::from(progress::RETRY_BASE) + failed_attempt * u32::from(progress::STEP);
    value.min(u32::from(progress::GENERATION_CEILING)) as u8
}

fn retry_reason(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::RateLimited => "Rate limit reached",
        FailureKind::Timeout => "Request timeout",
        FailureKind::Provider | FailureKind::NotImplemented => "API error",
    }
}

fn terminal_message(failure: &ProviderFailure) -> String {
    match failure.kind {
        FailureKind::RateLimited => "Rate limit exceeded. Please try again later.".to_string(),
        FailureKind::Timeout => "Request timed out after multiple attempts.".to_string(),
        FailureKind::Provider => format!("API error: {}", failure.message),
        FailureKind::NotImplemented => failure.message.clone(),
    }
}

fn format_delay(delay: Duration) -> String {
    if delay.subsec_millis() == 0 {
        match delay.as_secs() {
            1 => "1 second".to_string(),
            secs => format!("{} seconds", secs),
        }
    } else {
        format!("{:.1} seconds", delay.as_secs_f64())
    }
}
