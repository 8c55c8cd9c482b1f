//! Problem record routes

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::AppState;
use super::handlers::json_body;
use crate::records::{AnalysisStatus, Problem, ProblemAnalysis, ProblemCreate, ProblemUpdate};
use crate::types::{Backend, ForgeError, Result};

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: usize,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyzeOptions {
    #[serde(default, alias = "ai_provider")]
    pub backend: Backend,
}

/// POST /api/problems
pub async fn create(
    State(state): State<AppState>,
    body: std::result::Result<Json<ProblemCreate>, JsonRejection>,
) -> Result<(StatusCode, Json<Problem>)> {
    let problem = state.problems.create(json_body(body)?)?;
    info!(id = problem.id, "Problem created");
    Ok((StatusCode::CREATED, Json(problem)))
}

/// GET /api/problems
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<Vec<Problem>> {
    Json(state.problems.list(params.skip, params.limit))
}

/// GET /api/problems/{id}
pub async fn get(State(state): State<AppState>, Path(id): Path<u64>) -> Result<Json<Problem>> {
    Ok(Json(state.problems.get(id)?))
}

/// PUT /api/problems/{id}
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    body: std::result::Result<Json<ProblemUpdate>, JsonRejection>,
) -> Result<Json<Problem>> {
    Ok(Json(state.problems.update(id, json_body(body)?)?))
}

/// DELETE /api/problems/{id}
pub async fn delete(State(state): State<AppState>, Path(id): Path<u64>) -> Result<Json<Value>> {
    state.problems.delete(id)?;
    Ok(Json(json!({ "message": "Problem deleted successfully" })))
}

/// POST /api/problems/{id}/analyze
///
/// Starts a background analysis and answers `202 Accepted` right away. The
/// body is optional; `{"backend": "..."}` selects the backend.
pub async fn analyze(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>)> {
    let options: AnalyzeOptions = if body.is_empty() {
        AnalyzeOptions::default()
    } else {
        serde_json::from_slice(&body)?
    };

    let providers = state.analyzer.providers();
    if !providers.contains(options.backend) {
        let available: Vec<&str> = providers.backends().into_iter().map(|b| b.as_str()).collect();
        return Err(ForgeError::validation(
            "backend",
            format!(
                "Provider '{}' not available. Available providers: {}",
                options.backend,
                available.join(", ")
            ),
        ));
    }

    // Marked processing before the task is spawned
    let request = state.problems.begin_analysis(id, options.backend)?;

    let problems = state.problems.clone();
    let analyzer = state.analyzer.clone();
    tokio::spawn(async move {
        problems.run_analysis(id, request, &analyzer).await;
    });

    info!(id, backend = %options.backend, "Problem analysis started");

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Analysis started",
            "problem_id": id,
            "provider": options.backend,
            "status": AnalysisStatus::Processing,
        })),
    ))
}

#[derive(Debug, Serialize)]
pub struct AnalysisStatusResponse {
    pub problem_id: u64,
    pub status: AnalysisStatus,
    pub analysis_result: Option<ProblemAnalysis>,
    pub error_message: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// GET /api/problems/{id}/analysis
pub async fn analysis(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<AnalysisStatusResponse>> {
    let problem = state.problems.get(id)?;
    Ok(Json(AnalysisStatusResponse {
        problem_id: problem.id,
        status: problem.analysis_status,
        analysis_result: problem.analysis_result,
        error_message: problem.error_message,
        last_updated: problem.updated_at,
    }))
}
