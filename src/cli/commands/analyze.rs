//! Analyze Command
//!
//! Runs one analysis from the terminal and streams the result to stdout.
//!
//! Usage:
//!   codeforge analyze --title "..." --description "..." [--backend openai]
//!   codeforge analyze --title "..." --file problem.md --json

use std::io::Write;
use std::path::{Path, PathBuf};

use futures::StreamExt;

use crate::analysis::Analyzer;
use crate::cli::Output;
use crate::config::ConfigLoader;
use crate::types::{AnalysisRequest, Backend, ForgeError, Result, StreamEvent};

/// Options collected from the command line
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub title: String,
    pub description: Option<String>,
    pub file: Option<PathBuf>,
    pub backend: Backend,
    /// Print every event as one JSON line instead of plain text
    pub json: bool,
}

pub async fn run(config_path: Option<&Path>, options: AnalyzeOptions) -> Result<()> {
    let description = read_description(options.description, options.file.as_deref())?;
    let request = AnalysisRequest::new(&options.title, description, options.backend)?;

    let config = ConfigLoader::load(config_path)?;
    let analyzer = Analyzer::from_config(&config).await?;

    let outcome = stream_to_stdout(&analyzer, request, options.json).await;
    analyzer.cache().close().await;
    outcome
}

fn read_description(inline: Option<String>, file: Option<&Path>) -> Result<String> {
    match (inline, file) {
        (Some(text), None) => Ok(text),
        (None, Some(path)) => Ok(std::fs::read_to_string(path)?),
        (Some(_), Some(_)) => Err(ForgeError::validation(
            "description",
            "use either --description or --file, not both",
        )),
        (None, None) => Err(ForgeError::validation(
            "description",
            "a problem description is required (--description or --file)",
        )),
    }
}

async fn stream_to_stdout(analyzer: &Analyzer, request: AnalysisRequest, json: bool) -> Result<()> {
    let output = Output::new();
    let mut stdout = std::io::stdout();
    let mut events = analyzer.stream_analysis(request);
    let mut failure = None;

    while let Some(event) = events.next().await {
        if json {
            writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
            if let StreamEvent::Error {
                message,
                error_code,
            } = event
            {
                failure = Some(ForgeError::Analysis {
                    code: error_code,
                    message,
                });
            }
            continue;
        }

        match event {
            StreamEvent::Status {
                message: Some(message),
                progress,
                error_code,
            } => {
                if error_code.is_some() {
                    output.warning(&message);
                } else {
                    output.status(progress, &message);
                }
            }
            StreamEvent::Status { message: None, .. } => {}
            StreamEvent::Delta { content } => {
                write!(stdout, "{}", content)?;
                stdout.flush()?;
            }
            StreamEvent::Complete { .. } => {
                writeln!(stdout)?;
                output.success("Analysis complete");
            }
            StreamEvent::Error {
                message,
                error_code,
            } => {
                output.error(&format!("{} ({})", message, error_code));
                failure = Some(ForgeError::Analysis {
                    code: error_code,
                    message,
                });
            }
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
