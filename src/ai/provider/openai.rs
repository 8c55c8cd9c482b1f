//! OpenAI API Provider
//!
//! Streams Chat Completions over server-sent events. Each `data:` line
//! carries one JSON chunk; `data: [DONE]` ends the stream.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::framing::{Frame, fragment_stream};
use super::{AnalysisProvider, FragmentStream};
use crate::ai::prompt::SYSTEM_PROMPT;
use crate::config::OpenAiConfig;
use crate::constants::network;
use crate::types::{FailureClassifier, ForgeError, ProviderFailure, Result};

const PROVIDER: &str = "openai";

/// OpenAI API Provider with secure API key handling
pub struct OpenAiProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: &OpenAiConfig, api_key: SecretString) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(network::CONNECTION_TIMEOUT_SECS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ForgeError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
        })
    }

    fn build_request(&self, prompt: &str, model: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            stream: true,
        }
    }
}

/// Parse one SSE line of a streamed chat completion
fn parse_sse_line(line: &str) -> std::result::Result<Frame, ProviderFailure> {
    // Comments (": keep-alive") and `event:`/`id:` fields carry no content
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(Frame::Skip);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(Frame::Done);
    }
    if data.is_empty() {
        return Ok(Frame::Skip);
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(data).map_err(|e| {
        ProviderFailure::provider_error(format!("Malformed stream chunk: {}", e)).provider(PROVIDER)
    })?;

    if let Some(error) = chunk.error {
        return Err(ProviderFailure::provider_error(error.message).provider(PROVIDER));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
        .map(Frame::Fragment)
        .unwrap_or(Frame::Skip))
}

#[async_trait]
impl AnalysisProvider for OpenAiProvider {
    async fn generate(
        &self,
        prompt: &str,
        model: Option<&str>,
    ) -> std::result::Result<FragmentStream, ProviderFailure> {
        let model = model.unwrap_or(&self.model);
        info!(
            model,
            temperature = self.temperature,
            "Generating with OpenAI"
        );

        let request = self.build_request(prompt, model);
        let url = format!("{}/chat/completions", self.api_base);

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(|e| FailureClassifier::classify_reqwest(&e, PROVIDER))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FailureClassifier::classify_http_status(
                status.as_u16(),
                &extract_error_message(&body),
                PROVIDER,
            ));
        }

        debug!("OpenAI stream opened");
        Ok(fragment_stream(
            response.bytes_stream(),
            PROVIDER,
            parse_sse_line,
        ))
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.api_base);

        let response = self
            .client
            .get(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), "OpenAI API check failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "OpenAI API check failed");
                false
            }
        }
    }
}

/// Pull `error.message` out of an OpenAI error body, or fall back to the raw text
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .map(|error| error.message)
        .unwrap_or_else(|| body.trim().to_string())
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}
