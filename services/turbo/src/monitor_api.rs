//! Monitor role
//!
//! Wires the HTTP registry and broker clients, the stats tracker and the
//! notification channels into a `Dispatcher`, then polls every configured
//! target until a shutdown signal (or, under `stop_on_claim`, until every
//! target is claimed).
//!
//! Optional status endpoints when `monitor.listen_addr` is set:
//! - GET /health  → loop count and uptime
//! - GET /stats   → current stats snapshot
//! - GET /metrics → Prometheus exposition

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::Router;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use monitor::{
    DiscordWebhook, DispatchPolicy, Dispatcher, HttpBrokerClient, HttpRegistryClient, LoopExit,
    Notifier, NotifierSet, StatsTracker, TelegramBot,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::{Config, MonitorConfig, NotifyConfig};
use crate::error::Error;
use crate::http::{json_ok, metrics_response, serve_with_drain, shutdown_signal};

#[derive(Clone)]
pub struct MonitorState {
    stats: Arc<StatsTracker>,
    targets: Arc<Vec<String>>,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

impl MonitorState {
    pub fn new(stats: Arc<StatsTracker>, targets: Vec<String>, prometheus: PrometheusHandle) -> Self {
        Self {
            stats,
            targets: Arc::new(targets),
            prometheus,
            started_at: Instant::now(),
        }
    }
}

pub fn build_router(state: MonitorState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Build the configured notification channels.
///
/// Telegram needs both a bot token and a chat id; with only one of them the
/// channel is skipped with a warning.
pub fn build_notifiers(notify: &NotifyConfig, client: &reqwest::Client, timeout: Duration) -> NotifierSet {
    let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();

    if let Some(url) = &notify.discord_webhook_url {
        channels.push(Arc::new(DiscordWebhook::new(
            client.clone(),
            url.clone(),
            timeout,
        )));
    }

    match (&notify.telegram_bot_token, &notify.telegram_chat_id) {
        (Some(token), Some(chat_id)) => channels.push(Arc::new(TelegramBot::new(
            client.clone(),
            notify.telegram_api_base.clone(),
            token.clone(),
            chat_id.clone(),
            timeout,
        ))),
        (None, None) => {}
        _ => warn!("telegram needs both telegram_bot_token and telegram_chat_id, channel disabled"),
    }

    NotifierSet::new(channels)
}

fn dispatch_policy(monitor: &MonitorConfig) -> DispatchPolicy {
    DispatchPolicy {
        poll_interval: Duration::from_millis(monitor.poll_interval_ms),
        backoff: Duration::from_millis(monitor.backoff_ms),
        stop_on_claim: monitor.stop_on_claim,
        mark_claimed: monitor.mark_claimed,
    }
}

/// Run the monitor role.
pub async fn run(config: &Config, prometheus: PrometheusHandle) -> anyhow::Result<()> {
    let monitor = config
        .monitor
        .as_ref()
        .ok_or(Error::MissingSection("monitor"))?;

    info!(
        targets = ?monitor.targets,
        registry_url = %monitor.registry_url,
        broker_url = %monitor.broker_url,
        "monitor starting"
    );

    let timeout = Duration::from_secs(monitor.request_timeout_secs);
    let client = reqwest::Client::new();
    let stats = Arc::new(StatsTracker::load(monitor.stats_file.clone()).await);
    let notifiers = build_notifiers(&config.notify, &client, timeout);
    info!(channels = notifiers.len(), "notification channels configured");

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(HttpRegistryClient::new(
            client.clone(),
            monitor.registry_url.clone(),
            timeout,
        )),
        Arc::new(HttpBrokerClient::new(
            client,
            monitor.broker_url.clone(),
            Duration::from_secs(monitor.broker_timeout_secs),
        )),
        stats.clone(),
        notifiers,
        dispatch_policy(monitor),
    ));

    let handle = dispatcher.spawn(&monitor.targets);
    let shutdown = handle.shutdown_token();

    let status_server = match monitor.listen_addr {
        Some(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind to {addr}"))?;
            let app = build_router(MonitorState::new(
                stats,
                monitor.targets.clone(),
                prometheus,
            ));
            info!(addr = %addr, "monitor status endpoint listening");
            Some(tokio::spawn(serve_with_drain(
                listener,
                app,
                shutdown.clone().cancelled_owned(),
            )))
        }
        None => None,
    };

    let signal_token = shutdown.clone();
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let exits = handle.join().await;
    let claimed = exits
        .iter()
        .filter(|(_, exit)| *exit == LoopExit::Claimed)
        .count();
    info!(loops = exits.len(), claimed, "polling loops stopped");

    // Loops may all end on their own under stop-on-claim.
    shutdown.cancel();
    signal_task.abort();
    if let Some(server) = status_server {
        let _ = server.await;
    }

    info!("monitor shutdown complete");
    Ok(())
}

async fn health_handler(State(state): State<MonitorState>) -> Response {
    let snapshot = state.stats.snapshot().await;
    json_ok(serde_json::json!({
        "status": "healthy",
        "targets": state.targets.len(),
        "attempts": snapshot.attempts,
        "claimed": snapshot.claimed_usernames.len(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

async fn stats_handler(State(state): State<MonitorState>) -> Response {
    let snapshot = state.stats.snapshot().await;
    match serde_json::to_value(&snapshot) {
        Ok(body) => json_ok(body),
        Err(e) => crate::http::error_response(
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            &e.to_string(),
        ),
    }
}

async fn metrics_handler(State(state): State<MonitorState>) -> Response {
    metrics_response(&state.prometheus)
}
