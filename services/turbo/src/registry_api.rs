//! Availability registry service
//!
//! Endpoints:
//! - GET  /check/{identifier} → `{"available": bool}`
//! - POST /claim/{identifier} → `{"status": "claimed" | "failed"}`
//! - GET  /health             → identifier counts and uptime
//! - GET  /metrics            → Prometheus exposition

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use availability::Registry;
use axum::Router;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::http::{json_ok, metrics_response, serve_with_drain, shutdown_signal};

#[derive(Clone)]
pub struct RegistryState {
    registry: Arc<Registry>,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

impl RegistryState {
    pub fn new(registry: Arc<Registry>, prometheus: PrometheusHandle) -> Self {
        Self {
            registry,
            prometheus,
            started_at: Instant::now(),
        }
    }
}

pub fn build_router(state: RegistryState) -> Router {
    Router::new()
        .route("/check/{identifier}", get(check_handler))
        .route("/claim/{identifier}", post(claim_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the registry role until a shutdown signal arrives.
pub async fn run(config: &Config, prometheus: PrometheusHandle) -> anyhow::Result<()> {
    let registry = Registry::load(config.registry.data_file.clone())
        .await
        .with_context(|| {
            format!(
                "failed to initialize registry at {}",
                config.registry.data_file.display()
            )
        })?;
    let (total, available) = registry.counts().await;
    crate::metrics::record_registry_counts(total, available);

    let app = build_router(RegistryState::new(Arc::new(registry), prometheus));
    let listen_addr = config.registry.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(addr = %listen_addr, "registry accepting requests");
    serve_with_drain(listener, app, shutdown_signal()).await;
    info!("registry shutdown complete");
    Ok(())
}

async fn check_handler(
    State(state): State<RegistryState>,
    Path(identifier): Path<String>,
) -> Response {
    let available = state.registry.is_available(&identifier).await;
    json_ok(serde_json::json!({ "available": available }))
}

async fn claim_handler(
    State(state): State<RegistryState>,
    Path(identifier): Path<String>,
) -> Response {
    let status = if state.registry.mark_claimed(&identifier).await {
        let (total, available) = state.registry.counts().await;
        crate::metrics::record_registry_counts(total, available);
        "claimed"
    } else {
        "failed"
    };
    json_ok(serde_json::json!({ "status": status }))
}

async fn health_handler(State(state): State<RegistryState>) -> Response {
    let (total, available) = state.registry.counts().await;
    json_ok(serde_json::json!({
        "status": "healthy",
        "identifiers_total": total,
        "identifiers_available": available,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

async fn metrics_handler(State(state): State<RegistryState>) -> Response {
    metrics_response(&state.prometheus)
}
