//! Prompt Builder System
//!
//! Standardized prompt construction for analysis requests. The orchestrator
//! only sees the [`PromptRenderer`] trait; template content is swappable.

use crate::types::AnalysisRequest;

/// System message sent ahead of every analysis prompt
pub const SYSTEM_PROMPT: &str = "You are an expert technical analyst providing comprehensive problem analysis and innovative solutions.";

/// Renders the user prompt for an analysis request
pub trait PromptRenderer: Send + Sync {
    fn render(&self, request: &AnalysisRequest) -> String;
}

/// Prompt section types
#[derive(Debug, Clone)]
pub enum PromptSection {
    /// Role definition with expertise area
    Role { expertise: String, task: String },
    /// Numbered objectives
    Objectives(Vec<String>),
    /// Raw text section with optional header
    Text {
        header: Option<String>,
        content: String,
    },
    /// Output format expectations
    Format(Vec<String>),
}

/// Prompt builder for consistent prompt construction
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    sections: Vec<PromptSection>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a role definition section
    pub fn role(mut self, expertise: &str, task: &str) -> Self {
        self.sections.push(PromptSection::Role {
            expertise: expertise.to_string(),
            task: task.to_string(),
        });
        self
    }

    /// Add objectives section
    pub fn objectives(mut self, objectives: Vec<&str>) -> Self {
        self.sections.push(PromptSection::Objectives(
            objectives.into_iter().map(String::from).collect(),
        ));
        self
    }

    /// Add text section with header
    pub fn section(mut self, header: &str, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: Some(header.to_string()),
            content: content.to_string(),
        });
        self
    }

    pub fn text(mut self, content: &str) -> Self {
        self.sections.push(PromptSection::Text {
            header: None,
            content: content.to_string(),
        });
        self
    }

    pub fn format(mut self, rules: Vec<&str>) -> Self {
        self.sections.push(PromptSection::Format(
            rules.into_iter().map(String::from).collect(),
        ));
        self
    }

    /// Build the final prompt string
    pub fn build(self) -> String {
        let mut prompt = String::new();

        for section in self.sections {
            match section {
                PromptSection::Role { expertise, task } => {
                    prompt.push_str(&format!(
                        "You are an expert {} specializing in {}.\n\n",
                        expertise, task
                    ));
                }
                PromptSection::Objectives(objectives) => {
                    prompt.push_str("## Objectives\n\n");
                    for (i, obj) in objectives.iter().enumerate() {
                        prompt.push_str(&format!("{}. {}\n", i + 1, obj));
                    }
                    prompt.push('\n');
                }
                PromptSection::Text { header, content } => {
                    if let Some(h) = header {
                        prompt.push_str(&format!("## {}\n\n", h));
                    }
                    prompt.push_str(&content);
                    prompt.push_str("\n\n");
                }
                PromptSection::Format(rules) => {
                    prompt.push_str("## Response Format\n\n");
                    for rule in rules {
                        prompt.push_str(&format!("- {}\n", rule));
                    }
                    prompt.push('\n');
                }
            }
        }

        prompt.trim_end().to_string()
    }
}

/// Default analysis prompt: problem statement plus a fixed set of sections
/// the model is asked to cover
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisPromptTemplate;

impl PromptRenderer for AnalysisPromptTemplate {
    fn render(&self, request: &AnalysisRequest) -> String {
        PromptBuilder::new()
            .role("technical analyst", "problem analysis and solution design")
            .section("Problem Title", request.title())
            .section("Problem Description", request.description())
            .objectives(vec![
                "Review existing solutions with their complexity, pros, cons and use cases",
                "Compare them on efficiency, scalability, implementation effort and feasibility",
                "Propose two or three innovative or hybrid approaches with a feasibility score",
                "Recommend the best overall solution and explain the choice",
                "Outline a software implementation plan for the recommendation",
                "Note hardware considerations where they apply",
                "Lay out a phased implementation roadmap",
            ])
            .format(vec![
                "Use Markdown headings for each objective",
                "Prefer concrete examples over general advice",
            ])
            .build()
    }
}
