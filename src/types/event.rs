//! Client-facing stream events and the aggregated analysis result

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ErrorCode;

/// One message of the analysis event protocol
///
/// Serializes to `{type, message?, content?, progress?, error_code?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Status {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        progress: u8,
        /// Set on retry notices (`RATE_LIMIT`, `TIMEOUT`, `API_ERROR`)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_code: Option<ErrorCode>,
    },
    Delta {
        content: String,
    },
    Complete {
        progress: u8,
    },
    Error {
        message: String,
        error_code: ErrorCode,
    },
}

impl StreamEvent {
    pub fn status(message: impl Into<String>, progress: u8) -> Self {
        Self::Status {
            message: Some(message.into()),
            progress: progress.min(100),
            error_code: None,
        }
    }

    /// Progress-only status update
    pub fn progress(progress: u8) -> Self {
        Self::Status {
            message: None,
            progress: progress.min(100),
            error_code: None,
        }
    }

    pub fn retry_notice(message: impl Into<String>, progress: u8, code: ErrorCode) -> Self {
        Self::Status {
            message: Some(message.into()),
            progress: progress.min(100),
            error_code: Some(code),
        }
    }

    pub fn delta(content: impl Into<String>) -> Self {
        Self::Delta {
            content: content.into(),
        }
    }

    pub fn complete() -> Self {
        Self::Complete { progress: 100 }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            error_code: code,
        }
    }

    /// `Complete` or `Error`; nothing follows a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    pub fn is_retry_notice(&self) -> bool {
        matches!(
            self,
            Self::Status {
                error_code: Some(_),
                ..
            }
        )
    }
}

/// Aggregate of a finished analysis
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    /// All delta content in receipt order
    pub analysis: String,
    /// Not reported by the streaming path; kept optional
    pub tokens_used: Option<u32>,
    /// Wall-clock time from invocation to the terminal event
    pub processing_time: Duration,
    /// True only when no provider call was made
    pub cached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_wire_shape() {
        let event = StreamEvent::status("Initializing analysis...", 0);
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "status", "message": "Initializing analysis...", "progress": 0})
        );

        let progress_only = StreamEvent::progress(45);
        assert_eq!(
            serde_json::to_value(&progress_only).unwrap(),
            json!({"type": "status", "progress": 45})
        );
    }

    #[test]
    fn test_retry_notice_wire_shape() {
        let event = StreamEvent::retry_notice("Retrying in 1s", 10, ErrorCode::RateLimit);
        assert!(event.is_retry_notice());
        assert!(!event.is_terminal());
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "status", "message": "Retrying in 1s", "progress": 10, "error_code": "RATE_LIMIT"})
        );
    }

    #[test]
    fn test_terminal_events() {
        assert!(StreamEvent::complete().is_terminal());
        assert!(StreamEvent::error(ErrorCode::ApiErrorFinal, "boom").is_terminal());
        assert!(!StreamEvent::delta("x").is_terminal());

        assert_eq!(
            serde_json::to_value(StreamEvent::complete()).unwrap(),
            json!({"type": "complete", "progress": 100})
        );
        assert_eq!(
            serde_json::to_value(StreamEvent::error(ErrorCode::NotImplemented, "nope")).unwrap(),
            json!({"type": "error", "message": "nope", "error_code": "NOT_IMPLEMENTED"})
        );
    }

    #[test]
    fn test_event_parses_from_wire() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type": "delta", "content": "Hello"}"#).unwrap();
        assert_eq!(event, StreamEvent::delta("Hello"));
    }

    #[test]
    fn test_progress_is_clamped() {
        assert_eq!(StreamEvent::progress(250), StreamEvent::progress(100));
    }
}
