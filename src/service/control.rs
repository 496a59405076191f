//! Local control server
//!
//! Loopback HTTP surface the tray application talks to: join and cancel,
//! status, health and Prometheus metrics.

use crate::error::JoinErrorKind;
use crate::metrics::MetricsCollector;
use crate::orchestrator::JoinOrchestrator;
use crate::service::health::{HealthCheck, HealthStatus};
use crate::types::{Password, StatusSnapshot};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, error, info, warn};

/// Control server configuration
#[derive(Debug, Clone)]
pub struct ControlServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for ControlServerConfig {
    fn default() -> Self {
        Self {
            port: 47291,
            host: "127.0.0.1".to_string(),
        }
    }
}

/// Shared state for the control server
#[derive(Clone)]
pub struct ControlState {
    pub orchestrator: Arc<JoinOrchestrator>,
    pub metrics: Arc<MetricsCollector>,
    /// Latest snapshot from the background status poller
    pub latest_status: watch::Receiver<Option<StatusSnapshot>>,
    pub is_running: Arc<RwLock<bool>>,
    pub service_name: String,
    pub status_poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct JoinRequest {
    password: Password,
}

/// HTTP server for the control endpoints
pub struct ControlServer {
    config: ControlServerConfig,
    state: ControlState,
    shutdown_tx: broadcast::Sender<()>,
}

impl ControlServer {
    pub fn new(config: ControlServerConfig, state: ControlState) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state,
            shutdown_tx,
        }
    }

    /// Bind and serve until `stop` is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid control server address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind control server to {}", addr))?;

        info!("Control server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Control server shutdown signal received");
            })
            .await?;

        info!("Control server stopped");
        Ok(())
    }

    pub(crate) fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/status", get(status_handler))
            .route("/latest", get(latest_handler))
            .route("/join", post(join_handler))
            .route("/cancel", post(cancel_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping control server...");

        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to control server: {}", e);
        }

        Ok(())
    }
}

async fn root_handler(State(state): State<ControlState>) -> impl IntoResponse {
    Json(json!({
        "service": state.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/status",
            "/latest",
            "/join",
            "/cancel",
            "/health",
            "/metrics"
        ]
    }))
}

/// Fresh poll of the local client
async fn status_handler(State(state): State<ControlState>) -> impl IntoResponse {
    debug!("Status check requested");
    Json(state.orchestrator.check_status().await)
}

/// Last snapshot taken by the background poller, without polling
async fn latest_handler(State(state): State<ControlState>) -> impl IntoResponse {
    let latest = state.latest_status.borrow().clone();
    match latest {
        Some(snapshot) => (StatusCode::OK, Json(json!(snapshot))),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "no status poll completed yet" })),
        ),
    }
}

async fn join_handler(
    State(state): State<ControlState>,
    Json(request): Json<JoinRequest>,
) -> Response {
    info!("Join requested over control server");

    // Run detached so a dropped connection cannot abandon the attempt mid-action
    let orchestrator = state.orchestrator.clone();
    let join = tokio::spawn(async move { orchestrator.join_game(request.password).await });

    match join.await {
        Ok(result) => {
            let status = match result.error {
                Some(JoinErrorKind::AlreadyJoining) => StatusCode::CONFLICT,
                _ => StatusCode::OK,
            };
            (status, Json(result)).into_response()
        }
        Err(e) => {
            error!("Join task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "message": "internal error" })),
            )
                .into_response()
        }
    }
}

async fn cancel_handler(State(state): State<ControlState>) -> impl IntoResponse {
    let cancelled = state.orchestrator.cancel();
    Json(json!({ "cancelled": cancelled }))
}

async fn health_handler(State(state): State<ControlState>) -> impl IntoResponse {
    debug!("Health check requested");

    match HealthCheck::liveness_check(&state).await {
        Ok(HealthStatus::Unhealthy) | Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": state.service_name,
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Ok(_) => match HealthCheck::check(&state).await {
            Ok(health) => (StatusCode::OK, Json(json!(health))),
            Err(e) => {
                error!("Health check failed: {}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "status": "unhealthy", "service": state.service_name })),
                )
            }
        },
    }
}

async fn metrics_handler(State(state): State<ControlState>) -> Response {
    let metric_families = state.metrics.registry().gather();
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&metric_families) {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", encoder.format_type().to_string())],
            output,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics".to_string(),
            )
                .into_response()
        }
    }
}
