//! HTTP Server
//!
//! axum router exposing the analysis service:
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /` | service info |
//! | `GET /api/health` | cache and provider status |
//! | `POST /api/analyze` | blocking analysis |
//! | `POST /api/analyze/stream` | analysis as server-sent events |
//! | `GET /ws/stream` | analysis over WebSocket |
//! | `GET /api/cache/stats`, `DELETE /api/cache/clear` | cache management |
//! | `/api/problems/...` | problem records |

mod error;
mod handlers;
mod problems;
mod ws;

pub use error::ErrorBody;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::analysis::Analyzer;
use crate::config::Config;
use crate::records::ProblemStore;
use crate::types::{ForgeError, Result};

/// Shared state handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub analyzer: Arc<Analyzer>,
    pub problems: Arc<ProblemStore>,
}

impl AppState {
    pub fn new(analyzer: Analyzer, problems: ProblemStore) -> Self {
        Self {
            analyzer: Arc::new(analyzer),
            problems: Arc::new(problems),
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        let analyzer = Analyzer::from_config(config).await?;
        Ok(Self::new(analyzer, ProblemStore::new()))
    }
}

/// Build the router with all routes configured
pub fn create_router(state: AppState, cors_allow_any: bool) -> Router {
    let cors = if cors_allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        CorsLayer::new()
    };

    let problem_routes = Router::new()
        .route("/", post(problems::create).get(problems::list))
        .route(
            "/{id}",
            get(problems::get)
                .put(problems::update)
                .delete(problems::delete),
        )
        .route("/{id}/analyze", post(problems::analyze))
        .route("/{id}/analysis", get(problems::analysis));

    let api = Router::new()
        .route("/health", get(handlers::health))
        .route("/analyze", post(handlers::analyze))
        .route("/analyze/stream", post(handlers::analyze_stream))
        .route("/cache/stats", get(handlers::cache_stats))
        .route("/cache/clear", delete(handlers::cache_clear))
        .route("/providers", get(handlers::providers))
        .nest("/problems", problem_routes);

    Router::new()
        .route("/", get(handlers::root))
        .route("/ws/stream", get(ws::stream))
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the server until Ctrl+C or SIGTERM, then release the cache
pub async fn serve(config: Config) -> Result<()> {
    let state = AppState::from_config(&config).await?;
    let cache = state.analyzer.cache().clone();
    let router = create_router(state, config.server.cors_allow_any);

    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ForgeError::Server(format!("Failed to bind to {}: {}", addr, e)))?;

    info!(%addr, "CodeForge server starting");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ForgeError::Server(e.to_string()));

    cache.close().await;
    info!("CodeForge server stopped");
    served
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
