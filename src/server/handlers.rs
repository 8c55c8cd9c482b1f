//! REST handlers for analysis, health and cache management

use std::convert::Infallible;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::AppState;
use crate::ai::ProviderHealth;
use crate::cache::CacheStats;
use crate::types::{AnalysisPayload, Backend, ForgeError, Result, StreamEvent};

const SERVICE_NAME: &str = "CodeForge AI Backend";

/// Unwrap a JSON body, reporting malformed input as a validation error
pub(crate) fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ForgeError::validation("body", rejection.body_text()))
}

/// GET /
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/api/health",
            "analyze": "/api/analyze",
            "analyze_stream": "/api/analyze/stream",
            "stream": "/ws/stream",
            "problems": "/api/problems",
        }
    }))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
    pub cache: String,
    pub providers: Vec<ProviderHealth>,
}

/// GET /api/health
///
/// `healthy` needs a reachable cache and at least one available provider.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let cache = state.analyzer.cache().health().await;
    let providers = state.analyzer.providers().health().await;

    let healthy = cache == "healthy" && providers.iter().any(|p| p.available);

    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
        cache,
        providers,
    })
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub problem_title: String,
    pub problem_description: String,
    pub analysis: String,
    pub backend_used: Backend,
    pub tokens_used: Option<u32>,
    /// Seconds
    pub processing_time: f64,
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
}

/// POST /api/analyze
pub async fn analyze(
    State(state): State<AppState>,
    body: std::result::Result<Json<AnalysisPayload>, JsonRejection>,
) -> Result<Json<AnalysisResponse>> {
    let request = json_body(body)?.validate()?;
    let title = request.title().to_string();
    let description = request.description().to_string();
    let backend = request.backend();

    let result = state.analyzer.analyze_blocking(request).await?;

    info!(
        title = %title,
        elapsed_secs = result.processing_time.as_secs_f64(),
        cached = result.cached,
        "Analysis completed"
    );

    Ok(Json(AnalysisResponse {
        problem_title: title,
        problem_description: description,
        analysis: result.analysis,
        backend_used: backend,
        tokens_used: result.tokens_used,
        processing_time: result.processing_time.as_secs_f64(),
        cached: result.cached,
        timestamp: Utc::now(),
    }))
}

/// POST /api/analyze/stream
///
/// Server-sent events, one JSON-encoded [`StreamEvent`] per message. The
/// analysis is cancelled when the client goes away.
pub async fn analyze_stream(
    State(state): State<AppState>,
    body: std::result::Result<Json<AnalysisPayload>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let request = json_body(body)?.validate()?;

    let events = state
        .analyzer
        .stream_analysis(request)
        .map(|event| Ok::<_, Infallible>(sse_event(&event)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn sse_event(event: &StreamEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to encode stream event");
        Event::default().comment("unencodable event")
    })
}

#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub status: &'static str,
    pub stats: CacheStats,
}

/// GET /api/cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> Result<Json<CacheStatsResponse>> {
    let stats = state.analyzer.cache().stats().await?;
    Ok(Json(CacheStatsResponse {
        status: "success",
        stats,
    }))
}

#[derive(Debug, Serialize)]
pub struct CacheClearResponse {
    pub status: &'static str,
    pub message: String,
    pub cleared: usize,
}

/// DELETE /api/cache/clear
pub async fn cache_clear(State(state): State<AppState>) -> Result<Json<CacheClearResponse>> {
    let cleared = state.analyzer.cache().clear().await?;
    let message = if cleared == 0 {
        "No cached analyses found".to_string()
    } else {
        format!("Cleared {} cached analyses", cleared)
    };

    Ok(Json(CacheClearResponse {
        status: "success",
        message,
        cleared,
    }))
}

/// GET /api/providers
pub async fn providers(State(state): State<AppState>) -> Json<Value> {
    let backends = state.analyzer.providers().backends();
    let default = backends.first().copied();
    Json(json!({
        "providers": backends,
        "default": default,
        "total": backends.len(),
    }))
}
