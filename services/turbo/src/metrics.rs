//! Prometheus metrics exposition
//!
//! The library crates emit through the `metrics` facade; this module installs
//! the recorder that backs every `/metrics` endpoint:
//!
//! - `turbo_poll_attempts_total` (counter): label `target`
//! - `turbo_poll_errors_total` (counter): label `target`
//! - `turbo_claims_total` (counter): label `outcome`
//! - `turbo_claim_duration_seconds` (histogram)
//! - `turbo_notifications_failed_total` (counter): label `channel`
//! - `turbo_pool_accounts` (gauge): label `state`

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Claim duration buckets, 50ms to 60s; a claim is three remote calls bounded
/// by the broker's claim timeout.
const CLAIM_DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("turbo_claim_duration_seconds".to_string()),
        CLAIM_DURATION_BUCKETS,
    )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// `turbo_claim_duration_seconds` gets explicit buckets so it renders as a
/// histogram (`_bucket` lines) rather than the default summary.
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    Ok(builder()?.install_recorder()?)
}

/// Record the gauges that describe the registry contents.
pub fn record_registry_counts(total: usize, available: usize) {
    metrics::gauge!("turbo_registry_identifiers", "state" => "available").set(available as f64);
    metrics::gauge!("turbo_registry_identifiers", "state" => "claimed")
        .set(total.saturating_sub(available) as f64);
}
