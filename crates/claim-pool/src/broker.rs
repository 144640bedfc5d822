//! Claim broker: pool-wide serialized identifier claims
//!
//! Every claim attempt runs inside one exclusion region that spans actor
//! selection, the lease transition and the remote login/change/logout
//! sequence. Holding the lock across the remote calls keeps two callers from
//! ever selecting the same actor and keeps pool file rewrites ordered; the
//! cost is that claims are fully serialized, which is fine because they are
//! rare relative to polling.
//!
//! The remote sequence is bounded by `claim_timeout`, so a hung platform call
//! cannot hold the lock (or the lease) indefinitely. Each attempt runs on its
//! own task and always reaches the release, even when the caller goes away.

use std::sync::Arc;
use std::time::{Duration, Instant};

use platform::{ActorPlatform, PlatformError};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::store::{AccountStore, Lease};

/// Result of a single claim attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimOutcome {
    /// The actor now holds the target identifier.
    Claimed { actor: String },
    /// Every actor was busy; nothing was attempted.
    Exhausted,
    /// The platform rejected or failed a step; the actor was released.
    RemoteError {
        actor: String,
        stage: String,
        message: String,
    },
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed { .. })
    }

    /// Outcome label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ClaimOutcome::Claimed { .. } => "claimed",
            ClaimOutcome::Exhausted => "exhausted",
            ClaimOutcome::RemoteError { .. } => "remote_error",
        }
    }
}

/// Claim broker owning the account pool and the platform capability.
pub struct Broker {
    store: Arc<AccountStore>,
    platform: Arc<dyn ActorPlatform>,
    claim_lock: Arc<Mutex<()>>,
    claim_timeout: Duration,
}

impl Broker {
    pub fn new(
        store: Arc<AccountStore>,
        platform: Arc<dyn ActorPlatform>,
        claim_timeout: Duration,
    ) -> Self {
        info!(
            platform = platform.id(),
            claim_timeout_secs = claim_timeout.as_secs(),
            "claim broker initialized"
        );
        Self {
            store,
            platform,
            claim_lock: Arc::new(Mutex::new(())),
            claim_timeout,
        }
    }

    /// Attempt to assign `target` to the first free actor in the pool.
    ///
    /// Only one attempt proceeds at a time across the whole broker. The
    /// selected actor's lease is released before the attempt finishes on every
    /// path. The attempt runs on its own task, so dropping this future (a
    /// caller timeout, a disconnected HTTP client) does not cut it short
    /// between lease and release.
    /// Returns `InvalidTarget` for an empty identifier.
    pub async fn try_claim(&self, target: &str) -> Result<ClaimOutcome> {
        if target.trim().is_empty() {
            return Err(Error::InvalidTarget("identifier must not be empty".into()));
        }

        let attempt = ClaimAttempt {
            store: self.store.clone(),
            platform: self.platform.clone(),
            claim_lock: self.claim_lock.clone(),
            claim_timeout: self.claim_timeout,
            target: target.to_string(),
        };
        tokio::spawn(attempt.run())
            .await
            .map_err(|e| Error::Aborted(e.to_string()))
    }

    /// Wait until no claim is in flight.
    ///
    /// Used on shutdown so the process never exits while an actor is leased.
    pub async fn quiesce(&self) {
        let _guard = self.claim_lock.lock().await;
        debug!("claim broker quiesced");
    }

    /// Pool health summary for the health endpoint.
    ///
    /// Status mapping: all free → healthy, some free → degraded,
    /// none free (or empty pool) → unhealthy.
    pub async fn health(&self) -> serde_json::Value {
        let accounts = self.store.snapshot().await;
        let total = accounts.len();
        let busy = accounts.iter().filter(|a| a.in_use).count();
        let free = total - busy;

        let status = if free == total && total > 0 {
            "healthy"
        } else if free > 0 {
            "degraded"
        } else {
            "unhealthy"
        };

        serde_json::json!({
            "status": status,
            "platform": self.platform.id(),
            "accounts_total": total,
            "accounts_free": free,
            "accounts_busy": busy,
            "accounts": accounts,
        })
    }
}

/// One claim attempt, owned by the task that runs it.
struct ClaimAttempt {
    store: Arc<AccountStore>,
    platform: Arc<dyn ActorPlatform>,
    claim_lock: Arc<Mutex<()>>,
    claim_timeout: Duration,
    target: String,
}

impl ClaimAttempt {
    async fn run(self) -> ClaimOutcome {
        let target = self.target.as_str();
        let _guard = self.claim_lock.lock().await;

        let Some(lease) = self.store.acquire_free().await else {
            debug!(identifier = target, "no free actor, pool exhausted");
            metrics::counter!("turbo_claims_total", "outcome" => "exhausted").increment(1);
            return ClaimOutcome::Exhausted;
        };

        let started = Instant::now();
        let result = match tokio::time::timeout(self.claim_timeout, self.run_claim(&lease, target))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(PlatformError::Transport(format!(
                "claim timed out after {}s",
                self.claim_timeout.as_secs()
            ))),
        };

        self.store.release(&lease.identity).await;
        metrics::histogram!("turbo_claim_duration_seconds").record(started.elapsed().as_secs_f64());

        let outcome = match result {
            Ok(()) => {
                info!(actor = %lease.identity, identifier = target, "claim succeeded");
                ClaimOutcome::Claimed {
                    actor: lease.identity,
                }
            }
            Err(e) => {
                warn!(
                    actor = %lease.identity,
                    identifier = target,
                    stage = e.stage(),
                    error = %e,
                    "claim failed"
                );
                ClaimOutcome::RemoteError {
                    actor: lease.identity,
                    stage: e.stage().to_string(),
                    message: e.to_string(),
                }
            }
        };
        metrics::counter!("turbo_claims_total", "outcome" => outcome.label()).increment(1);
        outcome
    }

    /// Login → change identifier → logout for one leased actor.
    ///
    /// A failed identifier change still attempts logout so the remote session
    /// is not left open; the change error is what gets reported.
    async fn run_claim(&self, lease: &Lease, target: &str) -> platform::Result<()> {
        let session = self.platform.login(&lease.identity, &lease.secret).await?;

        if let Err(e) = self.platform.change_identifier(&session, target).await {
            if let Err(logout_err) = self.platform.logout(session).await {
                debug!(actor = %lease.identity, error = %logout_err, "logout after failed change also failed");
            }
            return Err(e);
        }

        self.platform.logout(session).await
    }
}
