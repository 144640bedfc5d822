//! Availability and claim service clients
//!
//! The dispatcher talks to the registry and the broker through two small
//! traits so the polling loop can run against in-process fakes in tests. The
//! HTTP implementations share one `reqwest::Client` (one connection pool for
//! every polling loop).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Boxed future returned by client operations.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Source of truth for whether an identifier can be claimed right now.
pub trait AvailabilityOracle: Send + Sync {
    /// Whether `identifier` is available.
    fn is_available<'a>(&'a self, identifier: &'a str) -> ClientFuture<'a, bool>;

    /// Tell the oracle a claim landed. Returns whether its state changed.
    fn mark_claimed<'a>(&'a self, identifier: &'a str) -> ClientFuture<'a, bool>;
}

/// Outcome of a claim request as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimReply {
    Success,
    /// Broker declined or failed; `reason` is "exhausted", "remote_error" or
    /// `None` for brokers that do not report one.
    Failure { reason: Option<String> },
}

/// Something that can claim an identifier through the actor pool.
pub trait ClaimClient: Send + Sync {
    fn try_claim<'a>(&'a self, identifier: &'a str) -> ClientFuture<'a, ClaimReply>;
}

#[derive(Deserialize)]
struct CheckResponse {
    available: bool,
}

#[derive(Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

/// HTTP client for the availability registry service.
#[derive(Clone)]
pub struct HttpRegistryClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpRegistryClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }
}

impl AvailabilityOracle for HttpRegistryClient {
    fn is_available<'a>(&'a self, identifier: &'a str) -> ClientFuture<'a, bool> {
        Box::pin(async move {
            let url = endpoint(&self.base_url, "check", identifier)?;
            let response = self
                .client
                .get(url.clone())
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| Error::Http(e.to_string()))?;
            let body: CheckResponse = decode(url, response).await?;
            debug!(identifier, available = body.available, "availability checked");
            Ok(body.available)
        })
    }

    fn mark_claimed<'a>(&'a self, identifier: &'a str) -> ClientFuture<'a, bool> {
        Box::pin(async move {
            let url = endpoint(&self.base_url, "claim", identifier)?;
            let response = self
                .client
                .post(url.clone())
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| Error::Http(e.to_string()))?;
            let body: StatusResponse = decode(url, response).await?;
            Ok(body.status == "claimed")
        })
    }
}

/// HTTP client for the claim broker service.
#[derive(Clone)]
pub struct HttpBrokerClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpBrokerClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout,
        }
    }
}

impl ClaimClient for HttpBrokerClient {
    fn try_claim<'a>(&'a self, identifier: &'a str) -> ClientFuture<'a, ClaimReply> {
        Box::pin(async move {
            let url = endpoint(&self.base_url, "assign", identifier)?;
            let response = self
                .client
                .post(url.clone())
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| Error::Http(e.to_string()))?;
            let body: StatusResponse = decode(url, response).await?;
            match body.status.as_str() {
                "success" => Ok(ClaimReply::Success),
                "failure" => Ok(ClaimReply::Failure {
                    reason: body.reason,
                }),
                other => Err(Error::Decode(format!("unknown claim status: {other}"))),
            }
        })
    }
}

/// Build `{base}/{route}/{identifier}` with the identifier percent-encoded.
fn endpoint(base_url: &str, route: &str, identifier: &str) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(base_url)
        .map_err(|e| Error::Http(format!("invalid base url {base_url}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| Error::Http(format!("base url cannot carry a path: {base_url}")))?
        .pop_if_empty()
        .push(route)
        .push(identifier);
    Ok(url)
}

/// Check the status code and decode the JSON body.
async fn decode<T: serde::de::DeserializeOwned>(
    url: reqwest::Url,
    response: reqwest::Response,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Status {
            endpoint: url.path().to_string(),
            status: status.as_u16(),
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|e| Error::Decode(e.to_string()))
}
