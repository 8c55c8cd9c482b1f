use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use codeforge::cache::MemoryCacheStore;
use codeforge::types::ProviderFailure;
use codeforge::{
    AnalysisCache, AppState, Analyzer, Backend, ProblemStore, ProviderRegistry, RetryPolicy,
    ScriptedAttempt, ScriptedProvider, create_router,
};

const DESCRIPTION: &str = "Our search service returns stale results for several minutes after a product is updated in the catalog.";

fn app_with(provider: Arc<ScriptedProvider>, cache: AnalysisCache) -> Router {
    let registry = ProviderRegistry::new().with(Backend::OpenAi, provider);
    let analyzer = Analyzer::new(cache, registry, RetryPolicy::default());
    create_router(AppState::new(analyzer, ProblemStore::new()), true)
}

fn app(provider: Arc<ScriptedProvider>) -> Router {
    app_with(
        provider,
        AnalysisCache::with_store(Arc::new(MemoryCacheStore::new())),
    )
}

fn answering(fragments: &[&str]) -> Arc<ScriptedProvider> {
    Arc::new(ScriptedProvider::always(ScriptedAttempt::fragments(
        fragments.iter().copied(),
    )))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send_raw(app, method, uri, body.map(|b| b.to_string())).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<String>,
) -> (StatusCode, Vec<u8>) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(body)
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

fn analyze_body(title: &str) -> Value {
    json!({
        "problem_title": title,
        "problem_description": DESCRIPTION,
        "backend": "openai",
    })
}

#[tokio::test]
async fn test_root_describes_service() {
    let app = app(answering(&["ok"]));
    let (status, body) = send(&app, Method::GET, "/", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "CodeForge AI Backend");
    assert_eq!(body["endpoints"]["stream"], "/ws/stream");
}

#[tokio::test]
async fn test_health_reports_cache_and_providers() {
    let app = app(answering(&["ok"]));
    let (status, body) = send(&app, Method::GET, "/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cache"], "healthy");
    assert_eq!(body["providers"][0]["backend"], "openai");
    assert_eq!(body["providers"][0]["available"], true);
}

#[tokio::test]
async fn test_health_degraded_without_cache() {
    let app = app_with(answering(&["ok"]), AnalysisCache::disabled());
    let (_, body) = send(&app, Method::GET, "/api/health", None).await;

    assert_eq!(body["status"], "degraded");
    assert_eq!(body["cache"], "disconnected");
}

#[tokio::test]
async fn test_analyze_then_cached() {
    let provider = answering(&["## Findings\n", "Invalidate on write."]);
    let app = app(provider.clone());

    let (status, first) = send(
        &app,
        Method::POST,
        "/api/analyze",
        Some(analyze_body("Stale search")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["analysis"], "## Findings\nInvalidate on write.");
    assert_eq!(first["backend_used"], "openai");
    assert_eq!(first["cached"], false);
    assert_eq!(first["problem_title"], "Stale search");

    // Same description, different title: served from cache
    let (status, second) = send(
        &app,
        Method::POST,
        "/api/analyze",
        Some(analyze_body("Search lag")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["analysis"], first["analysis"]);
    assert_eq!(second["cached"], true);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_analyze_rejects_short_description() {
    let app = app(answering(&["ok"]));
    let body = json!({
        "problem_title": "Stale search",
        "problem_description": "too short",
    });

    let (status, body) = send(&app, Method::POST, "/api/analyze", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_analyze_rejects_malformed_json() {
    let app = app(answering(&["ok"]));
    let (status, body) = send_raw(
        &app,
        Method::POST,
        "/api/analyze",
        Some("{\"problem_title\": ".to_string()),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_analyze_failure_is_reported() {
    let provider = Arc::new(ScriptedProvider::always(ScriptedAttempt::Reject(
        ProviderFailure::not_implemented("backend not wired"),
    )));
    let app = app(provider);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/analyze",
        Some(analyze_body("Stale search")),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error_code"], "NOT_IMPLEMENTED");
    assert!(body["message"].as_str().unwrap().contains("backend not wired"));
}

#[tokio::test]
async fn test_analyze_stream_emits_events() {
    let app = app(answering(&["alpha ", "beta"]));
    let (status, body) = send_raw(
        &app,
        Method::POST,
        "/api/analyze/stream",
        Some(analyze_body("Stale search").to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let events: Vec<Value> = String::from_utf8(body)
        .unwrap()
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();

    assert_eq!(events.first().unwrap()["message"], "Initializing analysis...");
    let deltas: String = events
        .iter()
        .filter(|e| e["type"] == "delta")
        .map(|e| e["content"].as_str().unwrap())
        .collect();
    assert_eq!(deltas, "alpha beta");
    assert_eq!(events.last().unwrap()["type"], "complete");
}

#[tokio::test]
async fn test_cache_stats_and_clear() {
    let app = app(answering(&["cached text"]));
    send(
        &app,
        Method::POST,
        "/api/analyze",
        Some(analyze_body("Stale search")),
    )
    .await;

    let (status, stats) = send(&app, Method::GET, "/api/cache/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["status"], "success");
    assert_eq!(stats["stats"]["backend"], "memory");

    let (status, cleared) = send(&app, Method::DELETE, "/api/cache/clear", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["cleared"], 1);
    assert_eq!(cleared["message"], "Cleared 1 cached analyses");

    let (_, again) = send(&app, Method::DELETE, "/api/cache/clear", None).await;
    assert_eq!(again["cleared"], 0);
    assert_eq!(again["message"], "No cached analyses found");
}

#[tokio::test]
async fn test_cache_endpoints_unavailable_without_store() {
    let app = app_with(answering(&["ok"]), AnalysisCache::disabled());

    let (status, body) = send(&app, Method::GET, "/api/cache/stats", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Cache unavailable");

    let (status, _) = send(&app, Method::DELETE, "/api/cache/clear", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_problem_crud() {
    let app = app(answering(&["ok"]));

    let (status, created) = send(
        &app,
        Method::POST,
        "/api/problems",
        Some(json!({"title": "Stale search", "description": DESCRIPTION})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["analysis_status"], "pending");
    let id = created["id"].as_u64().unwrap();

    let (status, fetched) = send(&app, Method::GET, &format!("/api/problems/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Stale search");

    let (status, updated) = send(
        &app,
        Method::PUT,
        &format!("/api/problems/{}", id),
        Some(json!({"title": "Stale search results"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "Stale search results");

    let (_, listed) = send(&app, Method::GET, "/api/problems?limit=5", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/problems/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, missing) = send(&app, Method::GET, &format!("/api/problems/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(missing["error_code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_problem_background_analysis() {
    let app = app(answering(&["Use change data capture."]));

    let (_, created) = send(
        &app,
        Method::POST,
        "/api/problems",
        Some(json!({"title": "Stale search", "description": DESCRIPTION})),
    )
    .await;
    let id = created["id"].as_u64().unwrap();

    let (status, started) = send(
        &app,
        Method::POST,
        &format!("/api/problems/{}/analyze", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(started["status"], "processing");

    let uri = format!("/api/problems/{}/analysis", id);
    let mut report = Value::Null;
    for _ in 0..50 {
        let (_, body) = send(&app, Method::GET, &uri, None).await;
        if body["status"] == "completed" || body["status"] == "failed" {
            report = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(report["status"], "completed");
    assert_eq!(
        report["analysis_result"]["analysis"],
        "Use change data capture."
    );
    assert_eq!(report["analysis_result"]["backend"], "openai");
}

#[tokio::test]
async fn test_problem_analysis_unknown_provider() {
    let app = app(answering(&["ok"]));

    let (_, created) = send(
        &app,
        Method::POST,
        "/api/problems",
        Some(json!({"title": "Stale search", "description": DESCRIPTION})),
    )
    .await;
    let id = created["id"].as_u64().unwrap();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/problems/{}/analyze", id),
        Some(json!({"ai_provider": "ollama"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .contains("Provider 'ollama' not available")
    );
}
