//! Analysis request and backend selection

use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use crate::constants::validation;

/// LLM backend an analysis is routed to
///
/// `openai` is the primary backend and `ollama` the secondary one; the
/// `primary`/`secondary` spellings are accepted as aliases on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Backend {
    #[default]
    #[serde(rename = "openai", alias = "primary")]
    OpenAi,
    #[serde(rename = "ollama", alias = "secondary")]
    Ollama,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::OpenAi => "openai",
            Backend::Ollama => "ollama",
        }
    }

    pub fn all() -> [Backend; 2] {
        [Backend::OpenAi, Backend::Ollama]
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "primary" => Ok(Backend::OpenAi),
            "ollama" | "secondary" => Ok(Backend::Ollama),
            _ => Err(format!(
                "Unknown backend: {}. Valid values: openai, ollama",
                s
            )),
        }
    }
}

/// A validated, immutable analysis request
///
/// Title and description are trimmed; lengths are counted in characters on
/// the trimmed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    title: String,
    description: String,
    backend: Backend,
}

impl AnalysisRequest {
    pub fn new(
        title: impl AsRef<str>,
        description: impl AsRef<str>,
        backend: Backend,
    ) -> Result<Self, ValidationError> {
        let title = title.as_ref().trim();
        let description = description.as_ref().trim();

        check_length(
            "problem_title",
            title,
            validation::TITLE_MIN_CHARS,
            validation::TITLE_MAX_CHARS,
        )?;
        check_length(
            "problem_description",
            description,
            validation::DESCRIPTION_MIN_CHARS,
            validation::DESCRIPTION_MAX_CHARS,
        )?;

        Ok(Self {
            title: title.to_string(),
            description: description.to_string(),
            backend,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }
}

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len < min {
        return Err(ValidationError::new(format!(
            "must be at least {} characters long (got {})",
            min, len
        ))
        .with_field(field));
    }
    if len > max {
        return Err(ValidationError::new(format!(
            "must not exceed {} characters (got {})",
            max, len
        ))
        .with_field(field));
    }
    Ok(())
}

/// Unvalidated request body as received from a transport
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisPayload {
    pub problem_title: String,
    pub problem_description: String,
    #[serde(default)]
    pub backend: Backend,
}

impl AnalysisPayload {
    pub fn validate(&self) -> Result<AnalysisRequest, ValidationError> {
        AnalysisRequest::new(&self.problem_title, &self.problem_description, self.backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn description_of(len: usize) -> String {
        "d".repeat(len)
    }

    #[test]
    fn test_description_lower_bound() {
        let rejected = AnalysisRequest::new("Title", description_of(49), Backend::OpenAi);
        let err = rejected.unwrap_err();
        assert_eq!(err.field.as_deref(), Some("problem_description"));

        let accepted = AnalysisRequest::new("Title", description_of(50), Backend::OpenAi);
        assert!(accepted.is_ok());
    }

    #[test]
    fn test_description_upper_bound() {
        assert!(AnalysisRequest::new("Title", description_of(5000), Backend::OpenAi).is_ok());
        assert!(AnalysisRequest::new("Title", description_of(5001), Backend::OpenAi).is_err());
    }

    #[test]
    fn test_trimming_applies_before_length_check() {
        let padded = format!("   {}   ", description_of(49));
        assert!(AnalysisRequest::new("Title", &padded, Backend::OpenAi).is_err());

        let request =
            AnalysisRequest::new("  Sorting  ", format!("\n{}\n", description_of(60)), Backend::Ollama)
                .unwrap();
        assert_eq!(request.title(), "Sorting");
        assert_eq!(request.description().len(), 60);
        assert_eq!(request.backend(), Backend::Ollama);
    }

    #[test]
    fn test_title_bounds() {
        assert!(AnalysisRequest::new("ab", description_of(50), Backend::OpenAi).is_err());
        assert!(AnalysisRequest::new("abc", description_of(50), Backend::OpenAi).is_ok());
        assert!(AnalysisRequest::new("t".repeat(201), description_of(50), Backend::OpenAi).is_err());
    }

    #[test]
    fn test_lengths_count_characters() {
        let description = "é".repeat(50);
        assert!(AnalysisRequest::new("Title", &description, Backend::OpenAi).is_ok());
    }

    #[test]
    fn test_backend_wire_names() {
        assert_eq!(serde_json::to_string(&Backend::OpenAi).unwrap(), "\"openai\"");
        let secondary: Backend = serde_json::from_str("\"secondary\"").unwrap();
        assert_eq!(secondary, Backend::Ollama);
        assert_eq!("OpenAI".parse::<Backend>().unwrap(), Backend::OpenAi);
        assert!("gemini".parse::<Backend>().is_err());
    }

    #[test]
    fn test_payload_defaults_backend() {
        let payload: AnalysisPayload = serde_json::from_str(
            r#"{"problem_title": "Cache design", "problem_description": "x"}"#,
        )
        .unwrap();
        assert_eq!(payload.backend, Backend::OpenAi);
        assert!(payload.validate().is_err());
    }
}
