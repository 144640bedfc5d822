//! Claim broker service
//!
//! Endpoints:
//! - POST /assign/{identifier} → `{"status": "success"}` or
//!   `{"status": "failure", "reason": "exhausted" | "remote_error"}`
//! - GET  /health              → pool status (never exposes passwords)
//! - GET  /metrics             → Prometheus exposition

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use claim_pool::{AccountStore, Broker};
use metrics_exporter_prometheus::PrometheusHandle;
use platform::{ActorPlatform, DryRunPlatform};
use tokio::net::TcpListener;
use tracing::{Instrument, error, info, info_span};

use crate::config::{Config, PlatformMode};
use crate::http::{
    error_response, json_ok, json_response, metrics_response, serve_with_drain, shutdown_signal,
};
use crate::platform_impl::HttpBridgePlatform;

#[derive(Clone)]
pub struct BrokerState {
    broker: Arc<Broker>,
    prometheus: PrometheusHandle,
}

impl BrokerState {
    pub fn new(broker: Arc<Broker>, prometheus: PrometheusHandle) -> Self {
        Self { broker, prometheus }
    }
}

/// Build the broker router.
///
/// `max_connections` caps concurrent requests; claims themselves are already
/// serialized inside the broker.
pub fn build_router(state: BrokerState, max_connections: usize) -> Router {
    Router::new()
        .route("/assign/{identifier}", post(assign_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Select the platform implementation named by `[platform] mode`.
pub fn build_platform(config: &Config) -> anyhow::Result<Arc<dyn ActorPlatform>> {
    match config.platform.mode {
        PlatformMode::DryRun => Ok(Arc::new(DryRunPlatform::new())),
        PlatformMode::Http => {
            let base_url = config
                .platform
                .base_url
                .as_deref()
                .context("platform.base_url is required when mode = \"http\"")?;
            Ok(Arc::new(HttpBridgePlatform::new(
                reqwest::Client::new(),
                base_url,
                Duration::from_secs(config.platform.timeout_secs),
            )))
        }
    }
}

/// Run the broker role until a shutdown signal arrives, then wait for any
/// in-flight claim to release its actor.
pub async fn run(config: &Config, prometheus: PrometheusHandle) -> anyhow::Result<()> {
    let pool_file = config.broker.pool_file.clone();
    let store = AccountStore::load(pool_file.clone())
        .await
        .with_context(|| format!("failed to initialize account pool at {}", pool_file.display()))?;
    if store.is_empty().await {
        info!("account pool is empty, every claim will report exhaustion");
    }

    let platform = build_platform(config)?;
    let broker = Arc::new(Broker::new(
        Arc::new(store),
        platform,
        Duration::from_secs(config.broker.claim_timeout_secs),
    ));

    let app = build_router(
        BrokerState::new(broker.clone(), prometheus),
        config.broker.max_connections,
    );
    let listen_addr = config.broker.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(addr = %listen_addr, "broker accepting requests");
    serve_with_drain(listener, app, shutdown_signal()).await;

    broker.quiesce().await;
    info!("broker shutdown complete");
    Ok(())
}

async fn assign_handler(
    State(state): State<BrokerState>,
    Path(identifier): Path<String>,
) -> Response {
    let claim_id = format!("claim_{}", uuid::Uuid::new_v4().as_simple());
    let span = info_span!("assign", claim_id = %claim_id, identifier = %identifier);

    let result = state.broker.try_claim(&identifier).instrument(span).await;
    match result {
        Ok(outcome) if outcome.is_claimed() => {
            json_ok(serde_json::json!({ "status": "success" }))
        }
        Ok(outcome) => json_ok(serde_json::json!({
            "status": "failure",
            "reason": outcome.label(),
        })),
        Err(claim_pool::Error::InvalidTarget(message)) => {
            error_response(StatusCode::BAD_REQUEST, "invalid_request", &message)
        }
        Err(e) => {
            error!(claim_id = %claim_id, error = %e, "assign failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                &e.to_string(),
            )
        }
    }
}

/// 200 while the pool has accounts; 503 when it has none at all.
async fn health_handler(State(state): State<BrokerState>) -> Response {
    let health = state.broker.health().await;
    let status = if health["accounts_total"].as_u64().unwrap_or(0) > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json_response(status, health)
}

async fn metrics_handler(State(state): State<BrokerState>) -> Response {
    metrics_response(&state.prometheus)
}
