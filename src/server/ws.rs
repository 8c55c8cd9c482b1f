//! WebSocket event transport
//!
//! Clients send JSON commands (`{"action": "analyze" | "ping", ...}`) and
//! receive [`StreamEvent`]s as JSON text frames. One analysis runs at a time
//! per connection; commands received meanwhile are queued. Closing the
//! socket drops the running analysis stream, which cancels it.

use std::collections::VecDeque;
use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::analysis::Analyzer;
use crate::types::{AnalysisRequest, Backend, ErrorCode, StreamEvent};

const CONNECTED_MESSAGE: &str = "Connected to CodeForge AI";
const STARTING_PROGRESS: u8 = 5;

#[derive(Debug, Deserialize)]
struct ClientMessage {
    action: String,
    #[serde(default)]
    problem_title: Option<String>,
    #[serde(default)]
    problem_description: Option<String>,
    #[serde(default)]
    backend: Option<String>,
}

/// What to do with one inbound text frame
#[derive(Debug, PartialEq)]
pub(crate) enum ClientCommand {
    Reply(StreamEvent),
    Analyze(AnalysisRequest),
}

/// Decode one inbound frame
pub(crate) fn interpret(text: &str) -> ClientCommand {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            return ClientCommand::Reply(StreamEvent::error(
                ErrorCode::JsonError,
                "Invalid JSON format",
            ));
        }
    };

    let message: ClientMessage = match serde_json::from_value(value) {
        Ok(message) => message,
        Err(e) => return invalid(format!("Invalid request format: {}", e)),
    };

    match message.action.as_str() {
        "ping" => ClientCommand::Reply(StreamEvent::status("pong", 0)),
        "analyze" => {
            let backend = match message.backend.as_deref() {
                None => Backend::default(),
                Some(raw) => match raw.parse::<Backend>() {
                    Ok(backend) => backend,
                    Err(e) => return invalid(e),
                },
            };
            let (Some(title), Some(description)) =
                (message.problem_title, message.problem_description)
            else {
                return invalid("problem_title and problem_description are required");
            };

            match AnalysisRequest::new(title, description, backend) {
                Ok(request) => ClientCommand::Analyze(request),
                Err(e) => invalid(e.to_string()),
            }
        }
        other => ClientCommand::Reply(StreamEvent::error(
            ErrorCode::UnknownAction,
            format!("Unknown action: {}", other),
        )),
    }
}

fn invalid(message: impl Into<String>) -> ClientCommand {
    ClientCommand::Reply(StreamEvent::error(ErrorCode::ValidationError, message))
}

/// GET /ws/stream
pub async fn stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let analyzer = state.analyzer.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, analyzer))
}

enum Relay {
    Finished,
    Disconnected,
}

async fn handle_socket(mut socket: WebSocket, analyzer: Arc<Analyzer>) {
    let client_id = Uuid::new_v4();
    info!(%client_id, "WebSocket client connected");

    if send_event(&mut socket, &StreamEvent::status(CONNECTED_MESSAGE, 0))
        .await
        .is_err()
    {
        return;
    }

    let mut backlog: VecDeque<String> = VecDeque::new();

    loop {
        let text = match backlog.pop_front() {
            Some(text) => text,
            None => match socket.recv().await {
                Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    debug!(%client_id, error = %e, "WebSocket receive failed");
                    break;
                }
            },
        };

        match interpret(&text) {
            ClientCommand::Reply(event) => {
                if send_event(&mut socket, &event).await.is_err() {
                    break;
                }
            }
            ClientCommand::Analyze(request) => {
                let starting = StreamEvent::status(
                    format!("Starting analysis: {}", request.title()),
                    STARTING_PROGRESS,
                );
                if send_event(&mut socket, &starting).await.is_err() {
                    break;
                }

                let events = analyzer.stream_analysis(request);
                if let Relay::Disconnected = relay(&mut socket, events, &mut backlog).await {
                    info!(%client_id, "Client left during analysis; analysis cancelled");
                    break;
                }
            }
        }
    }

    info!(%client_id, "WebSocket client disconnected");
}

/// Forward analysis events until the stream ends or the client leaves
async fn relay(
    socket: &mut WebSocket,
    mut events: BoxStream<'static, StreamEvent>,
    backlog: &mut VecDeque<String>,
) -> Relay {
    loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event else {
                    return Relay::Finished;
                };
                if send_event(socket, &event).await.is_err() {
                    return Relay::Disconnected;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => backlog.push_back(text.as_str().to_owned()),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return Relay::Disconnected,
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &StreamEvent) -> Result<(), axum::Error> {
    let payload = match serde_json::to_string(event) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Failed to encode stream event");
            return Ok(());
        }
    };
    socket.send(Message::Text(payload.into())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTION: &str = "Our nightly batch job runs out of memory when the input export exceeds a few gigabytes.";

    fn error_code(command: ClientCommand) -> ErrorCode {
        match command {
            ClientCommand::Reply(StreamEvent::Error { error_code, .. }) => error_code,
            other => panic!("expected error reply, got {:?}", other),
        }
    }

    #[test]
    fn test_ping_replies_pong() {
        assert_eq!(
            interpret(r#"{"action": "ping"}"#),
            ClientCommand::Reply(StreamEvent::status("pong", 0))
        );
    }

    #[test]
    fn test_bad_json() {
        assert_eq!(error_code(interpret("{not json")), ErrorCode::JsonError);
    }

    #[test]
    fn test_unknown_action() {
        let command = interpret(r#"{"action": "dance"}"#);
        match command {
            ClientCommand::Reply(StreamEvent::Error {
                error_code,
                message,
            }) => {
                assert_eq!(error_code, ErrorCode::UnknownAction);
                assert_eq!(message, "Unknown action: dance");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_action_is_validation_error() {
        assert_eq!(
            error_code(interpret(r#"{"problem_title": "x"}"#)),
            ErrorCode::ValidationError
        );
    }

    #[test]
    fn test_analyze_validation() {
        let short = serde_json::json!({
            "action": "analyze",
            "problem_title": "Batch OOM",
            "problem_description": "too short",
        });
        assert_eq!(
            error_code(interpret(&short.to_string())),
            ErrorCode::ValidationError
        );

        let bad_backend = serde_json::json!({
            "action": "analyze",
            "problem_title": "Batch OOM",
            "problem_description": DESCRIPTION,
            "backend": "gemini",
        });
        assert_eq!(
            error_code(interpret(&bad_backend.to_string())),
            ErrorCode::ValidationError
        );
    }

    #[test]
    fn test_analyze_request() {
        let message = serde_json::json!({
            "action": "analyze",
            "problem_title": "Batch OOM",
            "problem_description": DESCRIPTION,
            "backend": "secondary",
        });

        match interpret(&message.to_string()) {
            ClientCommand::Analyze(request) => {
                assert_eq!(request.title(), "Batch OOM");
                assert_eq!(request.backend(), Backend::Ollama);
            }
            other => panic!("expected analyze, got {:?}", other),
        }
    }
}
