//! Problem Records
//!
//! In-memory store of submitted problems and their analysis state. Records
//! are keyed by an increasing integer id and move through
//! `pending → processing → completed | failed` when analyzed.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analysis::Analyzer;
use crate::constants::records;
use crate::types::{AnalysisRequest, Backend, ForgeError, Result, ValidationError};

const TITLE_MIN_CHARS: usize = 3;
const TITLE_MAX_CHARS: usize = 255;
const DESCRIPTION_MIN_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Outcome of a finished record analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemAnalysis {
    pub analysis: String,
    pub backend: Backend,
    pub cached: bool,
    /// Seconds
    pub processing_time: f64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub background: Option<String>,
    pub user_email: Option<String>,
    pub analysis_status: AnalysisStatus,
    pub analysis_result: Option<ProblemAnalysis>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProblemCreate {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProblemUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
}

fn validate_title(title: &str) -> std::result::Result<String, ValidationError> {
    let title = title.trim();
    let chars = title.chars().count();
    if !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&chars) {
        return Err(ValidationError::new(format!(
            "Title must be between {} and {} characters",
            TITLE_MIN_CHARS, TITLE_MAX_CHARS
        ))
        .with_field("title"));
    }
    Ok(title.to_string())
}

fn validate_description(description: &str) -> std::result::Result<String, ValidationError> {
    let description = description.trim();
    if description.chars().count() < DESCRIPTION_MIN_CHARS {
        return Err(ValidationError::new(format!(
            "Description must be at least {} characters",
            DESCRIPTION_MIN_CHARS
        ))
        .with_field("description"));
    }
    Ok(description.to_string())
}

/// Concurrent in-memory problem store
#[derive(Debug, Default)]
pub struct ProblemStore {
    problems: DashMap<u64, Problem>,
    next_id: AtomicU64,
}

impl ProblemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, input: ProblemCreate) -> Result<Problem> {
        let title = validate_title(&input.title)?;
        let description = validate_description(&input.description)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let problem = Problem {
            id,
            title,
            description,
            background: input.background,
            user_email: input.user_email,
            analysis_status: AnalysisStatus::Pending,
            analysis_result: None,
            error_message: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.problems.insert(id, problem.clone());
        info!(id, "Problem created");
        Ok(problem)
    }

    pub fn get(&self, id: u64) -> Result<Problem> {
        self.problems
            .get(&id)
            .map(|p| p.clone())
            .ok_or_else(|| ForgeError::NotFound(format!("Problem {}", id)))
    }

    /// Newest first; `limit` is clamped to the listing maximum
    pub fn list(&self, skip: usize, limit: Option<usize>) -> Vec<Problem> {
        let limit = limit
            .unwrap_or(records::DEFAULT_LIST_LIMIT)
            .min(records::MAX_LIST_LIMIT);

        let mut problems: Vec<Problem> = self.problems.iter().map(|p| p.clone()).collect();
        problems.sort_by(|a, b| b.id.cmp(&a.id));
        problems.into_iter().skip(skip).take(limit).collect()
    }

    pub fn update(&self, id: u64, changes: ProblemUpdate) -> Result<Problem> {
        let title = changes.title.as_deref().map(validate_title).transpose()?;
        let description = changes
            .description
            .as_deref()
            .map(validate_description)
            .transpose()?;

        let mut entry = self
            .problems
            .get_mut(&id)
            .ok_or_else(|| ForgeError::NotFound(format!("Problem {}", id)))?;

        if let Some(title) = title {
            entry.title = title;
        }
        if let Some(description) = description {
            entry.description = description;
        }
        if changes.background.is_some() {
            entry.background = changes.background;
        }
        if changes.user_email.is_some() {
            entry.user_email = changes.user_email;
        }
        entry.updated_at = Some(Utc::now());
        Ok(entry.clone())
    }

    pub fn delete(&self, id: u64) -> Result<()> {
        if self.problems.remove(&id).is_none() {
            return Err(ForgeError::NotFound(format!("Problem {}", id)));
        }
        info!(id, "Problem deleted");
        Ok(())
    }

    /// Mark a record as being analyzed; returns the request to run
    ///
    /// Fails when the record is missing, already processing, or its text
    /// does not satisfy analysis request bounds.
    pub fn begin_analysis(&self, id: u64, backend: Backend) -> Result<AnalysisRequest> {
        let mut entry = self
            .problems
            .get_mut(&id)
            .ok_or_else(|| ForgeError::NotFound(format!("Problem {}", id)))?;

        if entry.analysis_status == AnalysisStatus::Processing {
            return Err(ForgeError::validation(
                "analysis_status",
                format!("Problem {} is already being analyzed", id),
            ));
        }

        let request = AnalysisRequest::new(&entry.title, &entry.description, backend)?;
        entry.analysis_status = AnalysisStatus::Processing;
        entry.error_message = None;
        entry.updated_at = Some(Utc::now());
        Ok(request)
    }

    /// Run an analysis started with [`begin_analysis`](Self::begin_analysis)
    /// and record its outcome
    pub async fn run_analysis(&self, id: u64, request: AnalysisRequest, analyzer: &Analyzer) {
        let backend = request.backend();
        let outcome = analyzer.analyze_blocking(request).await;

        let Some(mut entry) = self.problems.get_mut(&id) else {
            warn!(id, "Problem deleted while its analysis was running");
            return;
        };
        entry.updated_at = Some(Utc::now());

        match outcome {
            Ok(result) => {
                entry.analysis_status = AnalysisStatus::Completed;
                entry.analysis_result = Some(ProblemAnalysis {
                    analysis: result.analysis,
                    backend,
                    cached: result.cached,
                    processing_time: result.processing_time.as_secs_f64(),
                    completed_at: Utc::now(),
                });
                info!(id, cached = result.cached, "Problem analysis completed");
            }
            Err(e) => {
                entry.analysis_status = AnalysisStatus::Failed;
                entry.error_message = Some(e.to_string());
                warn!(id, error = %e, "Problem analysis failed");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{ProviderRegistry, RetryPolicy, ScriptedAttempt, ScriptedProvider};
    use crate::cache::{AnalysisCache, MemoryCacheStore};
    use crate::types::ProviderFailure;
    use std::sync::Arc;

    fn input(title: &str, description: &str) -> ProblemCreate {
        ProblemCreate {
            title: title.to_string(),
            description: description.to_string(),
            background: None,
            user_email: None,
        }
    }

    const LONG_DESCRIPTION: &str =
        "Route planning for delivery vans takes minutes per depot once there are more than two hundred stops.";

    fn analyzer(attempts: Vec<ScriptedAttempt>) -> Analyzer {
        Analyzer::new(
            AnalysisCache::with_store(Arc::new(MemoryCacheStore::new())),
            ProviderRegistry::new().with(Backend::OpenAi, Arc::new(ScriptedProvider::new(attempts))),
            RetryPolicy::new(1, std::time::Duration::from_millis(1), 2.0, std::time::Duration::from_millis(1)),
        )
    }

    #[test]
    fn test_create_and_get() {
        let store = ProblemStore::new();
        let created = store.create(input("  Route planning ", "Too slow for big depots")).unwrap();

        assert_eq!(created.id, 1);
        assert_eq!(created.title, "Route planning");
        assert_eq!(created.analysis_status, AnalysisStatus::Pending);
        assert_eq!(store.get(1).unwrap(), created);
        assert!(matches!(store.get(2), Err(ForgeError::NotFound(_))));
    }

    #[test]
    fn test_create_validates() {
        let store = ProblemStore::new();
        assert!(matches!(
            store.create(input("ab", "long enough description")),
            Err(ForgeError::Validation(_))
        ));
        assert!(matches!(
            store.create(input("Valid title", "short")),
            Err(ForgeError::Validation(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_list_newest_first_with_paging() {
        let store = ProblemStore::new();
        for i in 0..5 {
            store
                .create(input(&format!("Problem {}", i), "Some description text"))
                .unwrap();
        }

        let ids: Vec<u64> = store.list(0, None).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![5, 4, 3, 2, 1]);

        let ids: Vec<u64> = store.list(1, Some(2)).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![4, 3]);

        assert_eq!(store.list(0, Some(10_000)).len(), 5);
    }

    #[test]
    fn test_update_and_delete() {
        let store = ProblemStore::new();
        store.create(input("Original", "Some description text")).unwrap();

        let updated = store
            .update(
                1,
                ProblemUpdate {
                    title: Some("Renamed".to_string()),
                    background: Some("Legacy system".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.background.as_deref(), Some("Legacy system"));
        assert!(updated.updated_at.is_some());

        store.delete(1).unwrap();
        assert!(matches!(store.delete(1), Err(ForgeError::NotFound(_))));
    }

    #[test]
    fn test_begin_analysis_requires_analyzable_text() {
        let store = ProblemStore::new();
        store.create(input("Short one", "Too short to analyze")).unwrap();

        assert!(matches!(
            store.begin_analysis(1, Backend::OpenAi),
            Err(ForgeError::Validation(_))
        ));
        assert_eq!(store.get(1).unwrap().analysis_status, AnalysisStatus::Pending);
    }

    #[tokio::test]
    async fn test_analysis_completes() {
        let store = ProblemStore::new();
        store.create(input("Route planning", LONG_DESCRIPTION)).unwrap();
        let analyzer = analyzer(vec![ScriptedAttempt::fragments(["Use ", "clustering."])]);

        let request = store.begin_analysis(1, Backend::OpenAi).unwrap();
        assert_eq!(store.get(1).unwrap().analysis_status, AnalysisStatus::Processing);
        assert!(store.begin_analysis(1, Backend::OpenAi).is_err());

        store.run_analysis(1, request, &analyzer).await;

        let problem = store.get(1).unwrap();
        assert_eq!(problem.analysis_status, AnalysisStatus::Completed);
        let result = problem.analysis_result.unwrap();
        assert_eq!(result.analysis, "Use clustering.");
        assert_eq!(result.backend, Backend::OpenAi);
        assert!(!result.cached);
    }

    #[tokio::test]
    async fn test_analysis_failure_is_recorded() {
        let store = ProblemStore::new();
        store.create(input("Route planning", LONG_DESCRIPTION)).unwrap();
        let analyzer = analyzer(vec![ScriptedAttempt::Reject(ProviderFailure::provider_error(
            "HTTP 500: down",
        ))]);

        let request = store.begin_analysis(1, Backend::OpenAi).unwrap();
        store.run_analysis(1, request, &analyzer).await;

        let problem = store.get(1).unwrap();
        assert_eq!(problem.analysis_status, AnalysisStatus::Failed);
        assert!(problem.error_message.unwrap().contains("API error: HTTP 500: down"));
        assert!(problem.analysis_result.is_none());
    }
}
