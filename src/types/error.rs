//! Unified Error Type System
//!
//! Centralized error types for the entire service.
//! Provider failures carry a [`FailureKind`] that drives retry decisions.
//!
//! ## Failure Kinds
//!
//! - **RateLimited**: provider throttled the request (wait and retry)
//! - **Timeout**: provider did not answer in time (retry with backoff)
//! - **Provider**: any other provider-side failure (retry with backoff)
//! - **NotImplemented**: backend adapter is not wired up (fail immediately)
//!
//! Cache errors exist as a variant but never escape the analysis pipeline;
//! the cache facade logs and swallows them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Wire Error Codes
// =============================================================================

/// Error codes carried on the event wire (`error_code` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    UnsupportedBackend,
    /// Retry notice: provider rate limited this attempt
    RateLimit,
    /// Retry notice: provider timed out on this attempt
    Timeout,
    /// Retry notice: provider failed on this attempt
    ApiError,
    RateLimitExceeded,
    TimeoutExceeded,
    ApiErrorFinal,
    NotImplemented,
    UnknownAction,
    JsonError,
    AnalysisFailed,
    InternalError,
    NotFound,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::UnsupportedBackend => "UNSUPPORTED_BACKEND",
            Self::RateLimit => "RATE_LIMIT",
            Self::Timeout => "TIMEOUT",
            Self::ApiError => "API_ERROR",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::TimeoutExceeded => "TIMEOUT_EXCEEDED",
            Self::ApiErrorFinal => "API_ERROR_FINAL",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::UnknownAction => "UNKNOWN_ACTION",
            Self::JsonError => "JSON_ERROR",
            Self::AnalysisFailed => "ANALYSIS_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::NotFound => "NOT_FOUND",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Provider Failures
// =============================================================================

/// Failure classes a provider call can end in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    RateLimited,
    Timeout,
    /// Catch-all provider failure
    Provider,
    NotImplemented,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "RATE_LIMITED"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Provider => write!(f, "PROVIDER_ERROR"),
            Self::NotImplemented => write!(f, "NOT_IMPLEMENTED"),
        }
    }
}

impl FailureKind {
    /// Check if another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout | Self::Provider)
    }

    /// Code attached to the status event announcing a retry
    pub fn retry_code(&self) -> ErrorCode {
        match self {
            Self::RateLimited => ErrorCode::RateLimit,
            Self::Timeout => ErrorCode::Timeout,
            Self::Provider | Self::NotImplemented => ErrorCode::ApiError,
        }
    }

    /// Code attached to the terminal error once retries are exhausted
    pub fn terminal_code(&self) -> ErrorCode {
        match self {
            Self::RateLimited => ErrorCode::RateLimitExceeded,
            Self::Timeout => ErrorCode::TimeoutExceeded,
            Self::Provider => ErrorCode::ApiErrorFinal,
            Self::NotImplemented => ErrorCode::NotImplemented,
        }
    }
}

/// A single failed provider call, with the provider that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub kind: FailureKind,
    pub message: String,
    pub provider: Option<String>,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.kind, self.message)
        } else {
            write!(f, "[{}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for ProviderFailure {}

impl ProviderFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: None,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn provider_error(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Provider, message)
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotImplemented, message)
    }

    /// Add provider context to an existing failure
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

// =============================================================================
// Failure Classifier
// =============================================================================

/// Maps transport-level errors onto [`FailureKind`]
pub struct FailureClassifier;

impl FailureClassifier {
    /// Classify an HTTP status code returned by a provider
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> ProviderFailure {
        let kind = match status {
            429 => FailureKind::RateLimited,
            408 | 504 => FailureKind::Timeout,
            _ => FailureKind::Provider,
        };
        ProviderFailure::new(kind, format!("HTTP {}: {}", status, message)).provider(provider)
    }

    /// Classify a reqwest transport error
    pub fn classify_reqwest(err: &reqwest::Error, provider: &str) -> ProviderFailure {
        if err.is_timeout() {
            return ProviderFailure::timeout(err.to_string()).provider(provider);
        }
        if let Some(status) = err.status() {
            return Self::classify_http_status(status.as_u16(), &err.to_string(), provider);
        }
        ProviderFailure::provider_error(err.to_string()).provider(provider)
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input rejected before any I/O happens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Field that failed validation
    pub field: Option<String>,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "Validation failed for '{}': {}", field, self.message)
        } else {
            write!(f, "Validation failed: {}", self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ForgeError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Infrastructure Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    /// Cache store failure; never surfaced from the analysis pipeline
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Server error: {0}")]
    Server(String),

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("{0}")]
    Validation(ValidationError),

    #[error("Provider error: {0}")]
    Provider(ProviderFailure),

    /// Terminal error event converted into a failure by the blocking surface
    #[error("Analysis failed ({code}): {message}")]
    Analysis { code: ErrorCode, message: String },

    #[error("{0} not found")]
    NotFound(String),
}

impl From<ValidationError> for ForgeError {
    fn from(err: ValidationError) -> Self {
        ForgeError::Validation(err)
    }
}

impl From<ProviderFailure> for ForgeError {
    fn from(err: ProviderFailure) -> Self {
        ForgeError::Provider(err)
    }
}

impl From<redis::RedisError> for ForgeError {
    fn from(err: redis::RedisError) -> Self {
        ForgeError::Cache(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ForgeError>;

impl ForgeError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::new(message).with_field(field))
    }

    /// Wire code that best describes this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Analysis { code, .. } => *code,
            Self::Provider(failure) => failure.kind.terminal_code(),
            Self::NotFound(_) => ErrorCode::NotFound,
            _ => ErrorCode::InternalError,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
