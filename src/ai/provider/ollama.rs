//! Ollama Local LLM Provider
//!
//! Streams `/api/generate` output as newline-delimited JSON. Each line holds
//! a `response` fragment; the line with `done: true` ends the generation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::framing::{Frame, fragment_stream};
use super::{AnalysisProvider, FragmentStream};
use crate::ai::prompt::SYSTEM_PROMPT;
use crate::config::OllamaConfig;
use crate::constants::network;
use crate::types::{FailureClassifier, ForgeError, ProviderFailure, Result};

const PROVIDER: &str = "ollama";

/// Ollama Local LLM Provider
#[derive(Debug)]
pub struct OllamaProvider {
    api_base: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let api_base = Self::validate_endpoint(&config.api_base)?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(network::CONNECTION_TIMEOUT_SECS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ForgeError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_base,
            model: config.model.clone(),
            temperature: config.temperature,
            client,
        })
    }

    /// Validate endpoint URL for security (SSRF prevention)
    ///
    /// Only allows http/https schemes and warns for non-localhost endpoints.
    fn validate_endpoint(endpoint: &str) -> Result<String> {
        let url = url::Url::parse(endpoint).map_err(|e| {
            ForgeError::Config(format!("Invalid Ollama endpoint URL '{}': {}", endpoint, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ForgeError::Config(format!(
                "Ollama endpoint must use http or https scheme, got: {}",
                url.scheme()
            )));
        }

        if let Some(host) = url.host_str()
            && !matches!(host, "localhost" | "127.0.0.1" | "[::1]")
        {
            warn!(host, "Ollama endpoint is not localhost. Ensure this is intentional.");
        }

        let mut result = url.to_string();
        if result.ends_with('/') {
            result.pop();
        }
        Ok(result)
    }

    fn build_request(&self, prompt: &str, model: &str) -> OllamaRequest {
        OllamaRequest {
            model: model.to_string(),
            prompt: prompt.to_string(),
            system: SYSTEM_PROMPT.to_string(),
            stream: true,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        }
    }
}

/// Parse one NDJSON line of a streamed generation
fn parse_ndjson_line(line: &str) -> std::result::Result<Frame, ProviderFailure> {
    let chunk: OllamaChunk = serde_json::from_str(line).map_err(|e| {
        ProviderFailure::provider_error(format!("Malformed stream chunk: {}", e)).provider(PROVIDER)
    })?;

    if let Some(error) = chunk.error {
        return Err(ProviderFailure::provider_error(error).provider(PROVIDER));
    }

    Ok(match (chunk.done, chunk.response.is_empty()) {
        (true, true) => Frame::Done,
        (true, false) => Frame::Last(chunk.response),
        (false, true) => Frame::Skip,
        (false, false) => Frame::Fragment(chunk.response),
    })
}

#[async_trait]
impl AnalysisProvider for OllamaProvider {
    async fn generate(
        &self,
        prompt: &str,
        model: Option<&str>,
    ) -> std::result::Result<FragmentStream, ProviderFailure> {
        let model = model.unwrap_or(&self.model);
        info!(model, temperature = self.temperature, "Generating with Ollama");

        let request = self.build_request(prompt, model);
        let url = format!("{}/api/generate", self.api_base);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ProviderFailure::provider_error(format!(
                        "Failed to connect to Ollama at {}. Is Ollama running?",
                        self.api_base
                    ))
                    .provider(PROVIDER)
                } else {
                    FailureClassifier::classify_reqwest(&e, PROVIDER)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FailureClassifier::classify_http_status(
                status.as_u16(),
                body.trim(),
                PROVIDER,
            ));
        }

        debug!("Ollama stream opened");
        Ok(fragment_stream(
            response.bytes_stream(),
            PROVIDER,
            parse_ndjson_line,
        ))
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.api_base);

        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let Ok(tags) = resp.json::<OllamaTagsResponse>().await else {
                    return true;
                };
                let model_available = tags.models.iter().any(|m| {
                    m.name == self.model || m.name.starts_with(&self.model.replace(":latest", ""))
                });
                if !model_available {
                    warn!(
                        model = %self.model,
                        "Ollama is running but the model is not pulled"
                    );
                }
                model_available
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "Ollama API check failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "Ollama not available");
                false
            }
        }
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    system: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FailureKind;

    #[test]
    fn test_default_config() {
        let provider = OllamaProvider::new(&OllamaConfig::default()).unwrap();
        assert_eq!(provider.api_base, "http://localhost:11434");
        assert_eq!(provider.model, "llama3:latest");
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        let config = OllamaConfig {
            api_base: "file:///etc/passwd".to_string(),
            ..Default::default()
        };
        assert!(OllamaProvider::new(&config).is_err());
    }

    #[test]
    fn test_parse_ndjson_lines() {
        assert_eq!(
            parse_ndjson_line(r#"{"model":"llama3","response":"Hi","done":false}"#).unwrap(),
            Frame::Fragment("Hi".to_string())
        );
        assert_eq!(
            parse_ndjson_line(r#"{"model":"llama3","response":"","done":true,"eval_count":12}"#)
                .unwrap(),
            Frame::Done
        );
        assert_eq!(
            parse_ndjson_line(r#"{"response":"end","done":true}"#).unwrap(),
            Frame::Last("end".to_string())
        );
    }

    #[test]
    fn test_parse_error_line() {
        let failure = parse_ndjson_line(r#"{"error":"model 'x' not found"}"#).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Provider);
        assert!(failure.message.contains("not found"));
    }
}
