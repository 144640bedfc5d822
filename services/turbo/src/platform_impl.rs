//! HTTP bridge platform
//!
//! Drives the remote account-automation client through a sidecar that
//! exposes three JSON endpoints:
//!
//! - `POST {base}/login` `{"username", "password"}` → `{"session": "..."}`
//! - `POST {base}/change-identifier` `{"session", "identifier"}`
//! - `POST {base}/logout` `{"session"}`
//!
//! Any non-2xx answer fails the step it belongs to; connection and timeout
//! errors are reported as transport failures.

use std::time::Duration;

use common::Secret;
use platform::{ActorPlatform, PlatformError, PlatformFuture, Session};
use serde::Deserialize;
use tracing::debug;

#[derive(Deserialize)]
struct LoginResponse {
    session: String,
}

pub struct HttpBridgePlatform {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpBridgePlatform {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// POST a JSON body and return the response if the bridge answered 2xx.
    /// `step` wraps a non-2xx answer into the matching error variant.
    async fn call(
        &self,
        path: &str,
        body: serde_json::Value,
        step: fn(String) -> PlatformError,
    ) -> platform::Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/{path}", self.base_url))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let detail = response.text().await.unwrap_or_default();
        Err(step(format!("bridge returned {status}: {detail}")))
    }
}

impl ActorPlatform for HttpBridgePlatform {
    fn id(&self) -> &str {
        "http"
    }

    fn login<'a>(
        &'a self,
        identity: &'a str,
        secret: &'a Secret<String>,
    ) -> PlatformFuture<'a, Session> {
        Box::pin(async move {
            let response = self
                .call(
                    "login",
                    serde_json::json!({ "username": identity, "password": secret.expose() }),
                    PlatformError::Login,
                )
                .await?;
            let body: LoginResponse = response
                .json()
                .await
                .map_err(|e| PlatformError::Login(format!("invalid login response: {e}")))?;
            debug!(actor = identity, "bridge login ok");
            Ok(Session {
                identity: identity.to_string(),
                token: Secret::new(body.session),
            })
        })
    }

    fn change_identifier<'a>(
        &'a self,
        session: &'a Session,
        new_identifier: &'a str,
    ) -> PlatformFuture<'a, ()> {
        Box::pin(async move {
            self.call(
                "change-identifier",
                serde_json::json!({
                    "session": session.token.expose(),
                    "identifier": new_identifier,
                }),
                PlatformError::ChangeIdentifier,
            )
            .await?;
            Ok(())
        })
    }

    fn logout(&self, session: Session) -> PlatformFuture<'_, ()> {
        Box::pin(async move {
            self.call(
                "logout",
                serde_json::json!({ "session": session.token.expose() }),
                PlatformError::Logout,
            )
            .await?;
            debug!(actor = %session.identity, "bridge logout ok");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::http::StatusCode;
    use axum::routing::post;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    type Calls = Arc<Mutex<Vec<serde_json::Value>>>;

    /// Stub bridge. `worker-1` / `pw` logs in; the identifier `taken` is
    /// refused with a 409.
    async fn start_bridge() -> (String, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let login_calls = calls.clone();
        let change_calls = calls.clone();
        let logout_calls = calls.clone();
        let app = axum::Router::new()
            .route(
                "/login",
                post(move |Json(body): Json<serde_json::Value>| async move {
                    login_calls.lock().await.push(body.clone());
                    if body["username"] == "worker-1" && body["password"] == "pw" {
                        (StatusCode::OK, Json(serde_json::json!({ "session": "s-1" })))
                    } else {
                        (
                            StatusCode::UNAUTHORIZED,
                            Json(serde_json::json!({ "error": "bad credentials" })),
                        )
                    }
                }),
            )
            .route(
                "/change-identifier",
                post(move |Json(body): Json<serde_json::Value>| async move {
                    change_calls.lock().await.push(body.clone());
                    if body["identifier"] == "taken" {
                        StatusCode::CONFLICT
                    } else {
                        StatusCode::OK
                    }
                }),
            )
            .route(
                "/logout",
                post(move |Json(body): Json<serde_json::Value>| async move {
                    logout_calls.lock().await.push(body);
                    StatusCode::NO_CONTENT
                }),
            );

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/"), calls)
    }

    fn platform(base: &str) -> HttpBridgePlatform {
        HttpBridgePlatform::new(reqwest::Client::new(), base, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn full_claim_sequence() {
        let (base, calls) = start_bridge().await;
        let bridge = platform(&base);

        let session = bridge
            .login("worker-1", &Secret::new("pw".into()))
            .await
            .unwrap();
        assert_eq!(session.identity, "worker-1");
        assert_eq!(session.token.expose(), "s-1");

        bridge.change_identifier(&session, "alpha").await.unwrap();
        bridge.logout(session).await.unwrap();

        let calls = calls.lock().await;
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[1]["session"], "s-1");
        assert_eq!(calls[1]["identifier"], "alpha");
        assert_eq!(calls[2]["session"], "s-1");
    }

    #[tokio::test]
    async fn rejected_login_is_login_error() {
        let (base, _calls) = start_bridge().await;
        let err = platform(&base)
            .login("worker-1", &Secret::new("wrong".into()))
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "login");
        assert!(err.to_string().contains("401"), "got: {err}");
    }

    #[tokio::test]
    async fn refused_change_is_change_error() {
        let (base, _calls) = start_bridge().await;
        let bridge = platform(&base);
        let session = bridge
            .login("worker-1", &Secret::new("pw".into()))
            .await
            .unwrap();

        let err = bridge.change_identifier(&session, "taken").await.unwrap_err();
        assert_eq!(err.stage(), "change_identifier");
    }

    #[tokio::test]
    async fn unreachable_bridge_is_transport_error() {
        let err = platform("http://127.0.0.1:1")
            .login("worker-1", &Secret::new("pw".into()))
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "transport");
    }

    #[tokio::test]
    async fn login_error_never_contains_password() {
        let (base, _calls) = start_bridge().await;
        let err = platform(&base)
            .login("worker-1", &Secret::new("hunter2".into()))
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("hunter2"));
    }
}
