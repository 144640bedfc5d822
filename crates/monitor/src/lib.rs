//! Availability monitor and claim dispatcher
//!
//! Polls every watch target concurrently against the availability registry,
//! hands available targets to the claim broker, and records the results.
//!
//! Per-target flow:
//! 1. `StatsTracker::record_attempt()` on every iteration
//! 2. `AvailabilityOracle::is_available()`; unavailable → sleep, repeat
//! 3. `ClaimClient::try_claim()` when available
//! 4. On success: `StatsTracker::record_claim()`, `NotifierSet::notify_all()`,
//!    optional `AvailabilityOracle::mark_claimed()`
//! 5. Errors at any step back the loop off; they never stop it

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod notify;
pub mod stats;

pub use client::{AvailabilityOracle, ClaimClient, ClaimReply, HttpBrokerClient, HttpRegistryClient};
pub use dispatcher::{DispatchHandle, DispatchPolicy, Dispatcher, LoopExit};
pub use error::{Error, Result};
pub use notify::{DiscordWebhook, Notifier, NotifierSet, TELEGRAM_API_BASE, TelegramBot};
pub use stats::{HISTORY_LIMIT, StatsSnapshot, StatsTracker};
