//! Durable poll statistics
//!
//! Tracks the total number of poll attempts, the identifiers claimed so far
//! (insertion ordered, no duplicates) and a sliding window of the most recent
//! history points. Every mutation rewrites the stats file.

use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use common::persist::{load_json_or_default, write_json_atomic};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Maximum number of history points kept.
pub const HISTORY_LIMIT: usize = 200;

/// One history point: the attempt counter at a moment in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// RFC 3339 timestamp
    pub time: String,
    pub attempts: u64,
}

/// On-disk stats shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    #[serde(default)]
    pub attempts: u64,
    #[serde(default)]
    pub claimed_usernames: Vec<String>,
    #[serde(default)]
    pub history: Vec<HistoryPoint>,
}

impl StatsSnapshot {
    fn push_history(&mut self) {
        self.history.push(HistoryPoint {
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            attempts: self.attempts,
        });
        trim_history(&mut self.history);
    }
}

/// Drop the oldest entries so at most `HISTORY_LIMIT` remain.
fn trim_history(history: &mut Vec<HistoryPoint>) {
    if history.len() > HISTORY_LIMIT {
        let excess = history.len() - HISTORY_LIMIT;
        history.drain(..excess);
    }
}

/// Thread-safe stats tracker shared by all polling loops.
pub struct StatsTracker {
    path: PathBuf,
    state: Mutex<StatsSnapshot>,
}

impl StatsTracker {
    /// Load stats from `path`, starting from zero if missing or unreadable.
    pub async fn load(path: PathBuf) -> Self {
        let mut state: StatsSnapshot = load_json_or_default(&path).await;
        trim_history(&mut state.history);
        info!(
            path = %path.display(),
            attempts = state.attempts,
            claimed = state.claimed_usernames.len(),
            "loaded stats"
        );
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// Count one poll attempt and append a history point. Returns the new total.
    pub async fn record_attempt(&self) -> u64 {
        let mut state = self.state.lock().await;
        state.attempts += 1;
        state.push_history();
        self.persist(&state).await;
        state.attempts
    }

    /// Record a claimed identifier and append a history point.
    ///
    /// Returns whether the identifier was new to the claimed set.
    pub async fn record_claim(&self, identifier: &str) -> bool {
        let mut state = self.state.lock().await;
        let added = !state.claimed_usernames.iter().any(|c| c == identifier);
        if added {
            state.claimed_usernames.push(identifier.to_string());
        }
        state.push_history();
        self.persist(&state).await;
        added
    }

    /// Clone of the current stats.
    pub async fn snapshot(&self) -> StatsSnapshot {
        self.state.lock().await.clone()
    }

    async fn persist(&self, state: &StatsSnapshot) {
        if let Err(e) = write_json_atomic(&self.path, state).await {
            warn!(path = %self.path.display(), error = %e, "failed to persist stats");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn attempts_increment_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let stats = StatsTracker::load(path.clone()).await;

        assert_eq!(stats.record_attempt().await, 1);
        assert_eq!(stats.record_attempt().await, 2);

        let reloaded = StatsTracker::load(path).await;
        let snapshot = reloaded.snapshot().await;
        assert_eq!(snapshot.attempts, 2);
        assert_eq!(snapshot.history.len(), 2);
        assert_eq!(snapshot.history[1].attempts, 2);
    }

    #[tokio::test]
    async fn history_is_capped_and_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let stats = StatsTracker::load(dir.path().join("stats.json")).await;

        for _ in 0..(HISTORY_LIMIT + 25) {
            stats.record_attempt().await;
        }
        stats.record_claim("alpha").await;

        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.history.len(), HISTORY_LIMIT);
        // Oldest 26 points (attempts 1..=26) were dropped
        assert_eq!(snapshot.history[0].attempts, 27);
        assert_eq!(
            snapshot.history.last().unwrap().attempts,
            (HISTORY_LIMIT + 25) as u64
        );
    }

    #[tokio::test]
    async fn duplicate_claims_are_recorded_once() {
        let dir = tempfile::tempdir().unwrap();
        let stats = StatsTracker::load(dir.path().join("stats.json")).await;

        assert!(stats.record_claim("alpha").await);
        assert!(!stats.record_claim("alpha").await);
        assert!(stats.record_claim("beta").await);

        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.claimed_usernames, vec!["alpha", "beta"]);
        // Claims do not count as attempts but still add history points
        assert_eq!(snapshot.attempts, 0);
        assert_eq!(snapshot.history.len(), 3);
    }

    #[tokio::test]
    async fn oversized_history_is_trimmed_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let history: Vec<HistoryPoint> = (0..250)
            .map(|i| HistoryPoint {
                time: "2024-01-01T00:00:00".into(),
                attempts: i,
            })
            .collect();
        let seeded = StatsSnapshot {
            attempts: 250,
            claimed_usernames: vec![],
            history,
        };
        write_json_atomic(&path, &seeded).await.unwrap();

        let stats = StatsTracker::load(path).await;
        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.history.len(), HISTORY_LIMIT);
        assert_eq!(snapshot.history[0].attempts, 50);
    }

    #[tokio::test]
    async fn reads_original_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        tokio::fs::write(
            &path,
            r#"{"attempts": 7, "claimed_usernames": ["gamma"], "history": [{"time": "2024-05-01T10:00:00.123456", "attempts": 7}]}"#,
        )
        .await
        .unwrap();

        let snapshot = StatsTracker::load(path).await.snapshot().await;
        assert_eq!(snapshot.attempts, 7);
        assert_eq!(snapshot.claimed_usernames, vec!["gamma"]);
        assert_eq!(snapshot.history.len(), 1);
    }
}
