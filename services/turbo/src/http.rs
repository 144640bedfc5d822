//! Shared HTTP plumbing for the three roles
//!
//! JSON and Prometheus responses, the error body shape, and the serve loop
//! with signal-driven graceful shutdown bounded by `DRAIN_TIMEOUT`.

use std::future::Future;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// How long in-flight requests may take to finish after a shutdown signal.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// 200 with a JSON body.
pub fn json_ok(body: serde_json::Value) -> Response {
    json_response(StatusCode::OK, body)
}

pub fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (status, [(CONTENT_TYPE, "application/json")], body.to_string()).into_response()
}

/// Error body: `{"error": {"type", "message", "request_id"}}`.
pub fn error_response(status: StatusCode, error_type: &str, message: &str) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    json_response(
        status,
        serde_json::json!({
            "error": {
                "type": error_type,
                "message": message,
                "request_id": request_id,
            }
        }),
    )
}

/// Prometheus text exposition.
pub fn metrics_response(prometheus: &PrometheusHandle) -> Response {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        prometheus.render(),
    )
        .into_response()
}

/// Serve `app` on `listener` until `shutdown` resolves, then give in-flight
/// requests up to `DRAIN_TIMEOUT` to finish.
///
/// The drain timer starts when `shutdown` fires, not when the server starts.
pub async fn serve_with_drain(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) {
    let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = drain_rx.await;
            })
            .await
    });

    shutdown.await;
    let _ = drain_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }
}

/// Wait for SIGTERM or SIGINT.
///
/// If a handler cannot be installed the corresponding branch never fires; the
/// other one still does.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
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
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn error_response_carries_all_fields() {
        let response = error_response(StatusCode::BAD_REQUEST, "invalid_request", "empty");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "invalid_request");
        assert_eq!(json["error"]["message"], "empty");
        assert!(
            json["error"]["request_id"]
                .as_str()
                .unwrap()
                .starts_with("req_")
        );
    }

    #[tokio::test]
    async fn serve_with_drain_returns_after_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/ping", get(|| async { "pong" }));
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

        let server = tokio::spawn(serve_with_drain(listener, app, async {
            let _ = stop_rx.await;
        }));

        let body = reqwest::get(format!("http://{addr}/ping"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "pong");

        stop_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("server must stop once shutdown fires")
            .unwrap();
    }
}
