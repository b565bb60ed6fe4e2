//! Agent HTTP API
//!
//! Health, readiness, the last placement plan and Prometheus metrics.

use super::metrics::AgentMetrics;
use super::runner::AgentState;
use crate::error::{Error, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Bind address
    pub addr: SocketAddr,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
        }
    }
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

// =============================================================================
// Router
// =============================================================================

/// Shared application state
#[derive(Clone)]
struct AppState {
    agent: Arc<AgentState>,
    metrics: Arc<AgentMetrics>,
}

/// Build the API router
pub fn router(agent: Arc<AgentState>, metrics: Arc<AgentMetrics>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/readyz", get(readiness_check))
        .route("/v1/plan", get(get_plan))
        .route("/metrics", get(get_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { agent, metrics })
}

/// Serve the API until `cancel` fires
pub async fn serve(config: ApiServerConfig, app: Router, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind API server: {}", e)))?;
    info!("API listening on {}", config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            info!("API server shutting down");
        })
        .await
        .map_err(|e| Error::Internal(format!("API server error: {}", e)))
}

// =============================================================================
// Handlers
// =============================================================================

async fn health_check() -> &'static str {
    "ok"
}

async fn readiness_check(State(state): State<AppState>) -> Response {
    if state.agent.is_ready().await {
        return (StatusCode::OK, "ok").into_response();
    }
    let reason = state
        .agent
        .last_error()
        .await
        .unwrap_or_else(|| "no placement pass completed yet".to_string());
    (StatusCode::SERVICE_UNAVAILABLE, reason).into_response()
}

async fn get_plan(State(state): State<AppState>) -> Response {
    match state.agent.last_report().await {
        Some(report) => (StatusCode::OK, Json(report)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiErrorResponse {
                error: "not_found".into(),
                message: "no placement plan published yet".into(),
            }),
        )
            .into_response(),
    }
}

async fn get_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, state.metrics.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiErrorResponse {
                    error: "internal_error".into(),
                    message: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}
