//! Per-target polling and claim dispatch
//!
//! Every watch target gets its own task running an independent loop:
//!
//! - Polling: count an attempt, ask the oracle. Unavailable → sleep the poll
//!   interval and repeat.
//! - Claiming: available → ask the claim client. On success record the claim,
//!   notify, optionally tell the oracle, then keep polling (or stop when the
//!   stop-on-claim policy is set).
//! - Backoff: any error inside an iteration is logged and the loop sleeps the
//!   backoff interval before polling again. Errors never leave the loop.
//!
//! Loops share one stats tracker and one set of clients. Each loop has its own
//! cancellation token, derived from a root token that cancels them all.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{AvailabilityOracle, ClaimClient, ClaimReply};
use crate::error::Result;
use crate::notify::{NotifierSet, claim_message};
use crate::stats::StatsTracker;

/// Loop timing and policy.
#[derive(Debug, Clone)]
pub struct DispatchPolicy {
    /// Sleep between polls of the same target
    pub poll_interval: Duration,
    /// Sleep after an iteration failed
    pub backoff: Duration,
    /// Stop a target's loop after it is claimed
    pub stop_on_claim: bool,
    /// Mark the identifier claimed on the oracle after a successful claim
    pub mark_claimed: bool,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            backoff: Duration::from_secs(1),
            stop_on_claim: false,
            mark_claimed: true,
        }
    }
}

/// Why a target's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    /// Claimed with the stop-on-claim policy set
    Claimed,
}

/// What a single iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Unavailable,
    ClaimDeclined(Option<String>),
    Claimed,
}

/// Shared state for all polling loops.
pub struct Dispatcher {
    oracle: Arc<dyn AvailabilityOracle>,
    claimer: Arc<dyn ClaimClient>,
    stats: Arc<StatsTracker>,
    notifiers: NotifierSet,
    policy: DispatchPolicy,
}

impl Dispatcher {
    pub fn new(
        oracle: Arc<dyn AvailabilityOracle>,
        claimer: Arc<dyn ClaimClient>,
        stats: Arc<StatsTracker>,
        notifiers: NotifierSet,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            oracle,
            claimer,
            stats,
            notifiers,
            policy,
        }
    }

    /// Spawn one polling loop per target.
    ///
    /// Duplicate targets are polled once. The returned handle owns the tasks
    /// and their cancellation tokens.
    pub fn spawn(self: Arc<Self>, targets: &[String]) -> DispatchHandle {
        let root = CancellationToken::new();
        let mut tokens = HashMap::new();
        let mut tasks = JoinSet::new();

        for target in targets {
            if tokens.contains_key(target) {
                warn!(identifier = %target, "duplicate watch target ignored");
                continue;
            }
            let token = root.child_token();
            tokens.insert(target.clone(), token.clone());

            let dispatcher = self.clone();
            let target = target.clone();
            tasks.spawn(async move {
                let exit = dispatcher.run_target(&target, token).await;
                (target, exit)
            });
        }

        info!(targets = tokens.len(), "polling loops started");
        DispatchHandle {
            root,
            tokens,
            tasks,
        }
    }

    /// Poll a single target until cancelled (or claimed, under stop-on-claim).
    pub async fn run_target(&self, target: &str, cancel: CancellationToken) -> LoopExit {
        debug!(identifier = target, "polling loop started");
        loop {
            if cancel.is_cancelled() {
                return LoopExit::Cancelled;
            }

            let pause = match self.poll_once(target).await {
                Ok(Step::Claimed) if self.policy.stop_on_claim => {
                    info!(identifier = target, "target claimed, stopping its loop");
                    return LoopExit::Claimed;
                }
                Ok(Step::ClaimDeclined(reason)) => {
                    debug!(identifier = target, ?reason, "claim not completed, continuing");
                    self.policy.poll_interval
                }
                Ok(_) => self.policy.poll_interval,
                Err(e) => {
                    error!(identifier = target, error = %e, "poll iteration failed, backing off");
                    metrics::counter!("turbo_poll_errors_total", "target" => target.to_string())
                        .increment(1);
                    self.policy.backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => return LoopExit::Cancelled,
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// One Polling (→ Claiming) pass for `target`.
    async fn poll_once(&self, target: &str) -> Result<Step> {
        self.stats.record_attempt().await;
        metrics::counter!("turbo_poll_attempts_total", "target" => target.to_string())
            .increment(1);

        if !self.oracle.is_available(target).await? {
            return Ok(Step::Unavailable);
        }

        info!(identifier = target, "target available, claiming");
        match self.claimer.try_claim(target).await? {
            ClaimReply::Success => {
                self.on_claimed(target).await;
                Ok(Step::Claimed)
            }
            ClaimReply::Failure { reason } => Ok(Step::ClaimDeclined(reason)),
        }
    }

    async fn on_claimed(&self, target: &str) {
        let message = claim_message(target);
        info!(identifier = target, "{message}");

        self.stats.record_claim(target).await;
        self.notifiers.notify_all(&message).await;

        if self.policy.mark_claimed {
            match self.oracle.mark_claimed(target).await {
                Ok(changed) => debug!(identifier = target, changed, "registry updated after claim"),
                Err(e) => warn!(identifier = target, error = %e, "failed to mark target claimed on registry"),
            }
        }
    }
}

/// Running polling loops.
pub struct DispatchHandle {
    root: CancellationToken,
    tokens: HashMap<String, CancellationToken>,
    tasks: JoinSet<(String, LoopExit)>,
}

impl DispatchHandle {
    /// Cancel one target's loop. Returns false for unknown targets.
    pub fn cancel_target(&self, target: &str) -> bool {
        match self.tokens.get(target) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Token that cancels every loop when triggered.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Wait for every loop to end, returning how each one exited.
    ///
    /// Loops only end on cancellation or stop-on-claim, so without either this
    /// waits forever.
    pub async fn join(mut self) -> Vec<(String, LoopExit)> {
        let mut exits = Vec::with_capacity(self.tokens.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(exit) => exits.push(exit),
                Err(e) => error!(error = %e, "polling task panicked"),
            }
        }
        exits
    }

    /// Cancel every loop and wait for them to finish.
    pub async fn shutdown(self) -> Vec<(String, LoopExit)> {
        self.root.cancel();
        self.join().await
    }
}
