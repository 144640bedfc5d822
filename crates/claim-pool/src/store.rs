//! Account pool storage
//!
//! Manages a JSON file holding the ordered list of actor accounts and their
//! busy leases. The file is rewritten atomically on every lease transition. A
//! tokio Mutex guards the in-memory list; it is held only for the duration of
//! a single mutation, never across remote calls.
//!
//! Busy is a lease, not a durable fact: it records when it was taken, and any
//! lease found at load time belongs to a process that no longer exists, so it
//! is released before the store is handed out.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use common::Secret;
use common::persist::{load_json_or_default, write_json_atomic};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;

/// A single actor account as persisted in the pool file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorRecord {
    /// Login identity, unique within the pool
    pub username: String,
    pub password: Secret<String>,
    /// Busy flag: set while a claim attempt is using this account
    #[serde(default)]
    pub in_use: bool,
    /// When the current lease was taken, unix milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leased_at: Option<u64>,
}

impl ActorRecord {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Secret::new(password.into()),
            in_use: false,
            leased_at: None,
        }
    }
}

/// A leased account handed to the broker for one claim attempt.
#[derive(Debug)]
pub struct Lease {
    pub identity: String,
    pub secret: Secret<String>,
}

/// Credential-free view of an account for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct AccountView {
    pub username: String,
    pub in_use: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease_age_secs: Option<u64>,
}

/// Thread-safe pool file manager.
pub struct AccountStore {
    path: PathBuf,
    records: Mutex<Vec<ActorRecord>>,
}

impl AccountStore {
    /// Load the pool from the given file path.
    ///
    /// A missing file yields an empty pool and is created. An unreadable or
    /// malformed file also yields an empty pool but is left untouched on disk.
    /// Leases left behind by a previous process are released and the cleaned
    /// pool is written back.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let cold_start = matches!(tokio::fs::try_exists(&path).await, Ok(false));
        let mut records: Vec<ActorRecord> = load_json_or_default(&path).await;

        let released = release_stale_leases(&mut records, now_millis());
        if released > 0 {
            warn!(released, "released stale leases left by a previous run");
        }
        if cold_start || released > 0 {
            write_json_atomic(&path, &records).await?;
        }

        record_pool_gauges(&records);
        info!(path = %path.display(), accounts = records.len(), "loaded account pool");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Lease the first free account in stored order.
    ///
    /// Returns `None` without touching any record when every account is busy
    /// (or the pool is empty). Callers must hold the broker's claim lock so
    /// that selection and the lease transition are atomic relative to other
    /// selections.
    pub async fn acquire_free(&self) -> Option<Lease> {
        let mut records = self.records.lock().await;
        let record = records.iter_mut().find(|r| !r.in_use)?;

        record.in_use = true;
        record.leased_at = Some(now_millis());
        let lease = Lease {
            identity: record.username.clone(),
            secret: record.password.clone(),
        };
        debug!(actor = %lease.identity, "account leased");

        record_pool_gauges(&records);
        self.persist(&records).await;
        Some(lease)
    }

    /// Release an account's lease and persist.
    ///
    /// Returns whether the account was leased. Releasing an unknown or free
    /// account is a no-op.
    pub async fn release(&self, identity: &str) -> bool {
        let mut records = self.records.lock().await;
        let Some(record) = records.iter_mut().find(|r| r.username == identity) else {
            warn!(actor = identity, "release requested for unknown account");
            return false;
        };
        if !record.in_use {
            return false;
        }

        record.in_use = false;
        record.leased_at = None;
        debug!(actor = identity, "account released");

        record_pool_gauges(&records);
        self.persist(&records).await;
        true
    }

    /// Snapshot of all accounts without credentials.
    pub async fn snapshot(&self) -> Vec<AccountView> {
        let records = self.records.lock().await;
        let now = now_millis();
        records
            .iter()
            .map(|r| AccountView {
                username: r.username.clone(),
                in_use: r.in_use,
                lease_age_secs: r.leased_at.map(|at| now.saturating_sub(at) / 1000),
            })
            .collect()
    }

    /// Count accounts as (total, free, busy).
    pub async fn counts(&self) -> (usize, usize, usize) {
        let records = self.records.lock().await;
        let busy = records.iter().filter(|r| r.in_use).count();
        (records.len(), records.len() - busy, busy)
    }

    /// Number of accounts in the pool.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Whether the pool has no accounts.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Rewrite the pool file. Failures are logged; the in-memory state stays
    /// authoritative so a claim in progress is never aborted by a disk error.
    async fn persist(&self, records: &[ActorRecord]) {
        if let Err(e) = write_json_atomic(&self.path, records).await {
            warn!(path = %self.path.display(), error = %e, "failed to persist account pool");
        }
    }
}

fn record_pool_gauges(records: &[ActorRecord]) {
    let busy = records.iter().filter(|r| r.in_use).count();
    metrics::gauge!("turbo_pool_accounts", "state" => "free").set((records.len() - busy) as f64);
    metrics::gauge!("turbo_pool_accounts", "state" => "busy").set(busy as f64);
}

/// Clear every lease in `records`, returning how many were cleared.
///
/// Runs only at load time, before any claim can be in flight in this process.
fn release_stale_leases(records: &mut [ActorRecord], now: u64) -> usize {
    let mut released = 0;
    for record in records.iter_mut().filter(|r| r.in_use) {
        let age_secs = record
            .leased_at
            .map(|at| now.saturating_sub(at) / 1000);
        info!(actor = %record.username, ?age_secs, "releasing stale lease");
        record.in_use = false;
        record.leased_at = None;
        released += 1;
    }
    released
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_pool(dir: &tempfile::TempDir, records: &[ActorRecord]) -> PathBuf {
        let path = dir.path().join("pool.json");
        write_json_atomic(&path, records).await.unwrap();
        path
    }

    #[tokio::test]
    async fn cold_start_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");

        assert!(!path.exists());
        let store = AccountStore::load(path.clone()).await.unwrap();
        assert!(store.is_empty().await);
        assert!(path.exists());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: Vec<ActorRecord> = serde_json::from_str(&contents).unwrap();
        assert!(parsed.is_empty());
    }

    #[tokio::test]
    async fn malformed_file_is_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        let provisioned = r#"[{"username":"w1","password":"p1","in_use":false},]"#;
        tokio::fs::write(&path, provisioned).await.unwrap();

        let store = AccountStore::load(path.clone()).await.unwrap();
        assert!(store.is_empty().await);
        assert!(store.acquire_free().await.is_none());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, provisioned);
    }

    #[tokio::test]
    async fn clean_file_is_not_rewritten_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        let provisioned = r#"[{"username":"w1","password":"p1"}]"#;
        tokio::fs::write(&path, provisioned).await.unwrap();

        AccountStore::load(path.clone()).await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), provisioned);
    }

    #[tokio::test]
    async fn pool_gauges_follow_lease_transitions() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let dir = tempfile::tempdir().unwrap();
        let path = write_pool(
            &dir,
            &[ActorRecord::new("w1", "p1"), ActorRecord::new("w2", "p2")],
        )
        .await;
        let store = AccountStore::load(path).await.unwrap();
        let rendered = handle.render();
        assert!(rendered.contains(r#"turbo_pool_accounts{state="free"} 2"#), "{rendered}");
        assert!(rendered.contains(r#"turbo_pool_accounts{state="busy"} 0"#), "{rendered}");

        store.acquire_free().await.unwrap();
        let rendered = handle.render();
        assert!(rendered.contains(r#"turbo_pool_accounts{state="free"} 1"#), "{rendered}");
        assert!(rendered.contains(r#"turbo_pool_accounts{state="busy"} 1"#), "{rendered}");

        store.release("w1").await;
        let rendered = handle.render();
        assert!(rendered.contains(r#"turbo_pool_accounts{state="free"} 2"#), "{rendered}");
        assert!(rendered.contains(r#"turbo_pool_accounts{state="busy"} 0"#), "{rendered}");
    }

    #[tokio::test]
    async fn reads_original_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.json");
        tokio::fs::write(
            &path,
            r#"[{"username":"w1","password":"p1","in_use":false},{"username":"w2","password":"p2"}]"#,
        )
        .await
        .unwrap();

        let store = AccountStore::load(path).await.unwrap();
        assert_eq!(store.counts().await, (2, 2, 0));
    }

    #[tokio::test]
    async fn acquire_takes_first_free_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pool(
            &dir,
            &[ActorRecord::new("w1", "p1"), ActorRecord::new("w2", "p2")],
        )
        .await;
        let store = AccountStore::load(path).await.unwrap();

        let first = store.acquire_free().await.unwrap();
        let second = store.acquire_free().await.unwrap();
        assert_eq!(first.identity, "w1");
        assert_eq!(first.secret.expose(), "p1");
        assert_eq!(second.identity, "w2");
        assert!(store.acquire_free().await.is_none());

        store.release("w1").await;
        let again = store.acquire_free().await.unwrap();
        assert_eq!(again.identity, "w1");
    }

    #[tokio::test]
    async fn lease_is_persisted_and_release_clears_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pool(&dir, &[ActorRecord::new("w1", "p1")]).await;
        let store = AccountStore::load(path.clone()).await.unwrap();

        store.acquire_free().await.unwrap();
        let on_disk: Vec<ActorRecord> =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert!(on_disk[0].in_use);
        assert!(on_disk[0].leased_at.is_some());

        assert!(store.release("w1").await);
        let on_disk: Vec<ActorRecord> =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert!(!on_disk[0].in_use);
        assert!(on_disk[0].leased_at.is_none());
    }

    #[tokio::test]
    async fn release_is_noop_for_free_or_unknown_account() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pool(&dir, &[ActorRecord::new("w1", "p1")]).await;
        let store = AccountStore::load(path).await.unwrap();

        assert!(!store.release("w1").await);
        assert!(!store.release("ghost").await);
    }

    #[tokio::test]
    async fn load_releases_leases_left_by_crash() {
        let dir = tempfile::tempdir().unwrap();
        let mut stuck = ActorRecord::new("w1", "p1");
        stuck.in_use = true;
        stuck.leased_at = Some(1_000);
        let mut legacy = ActorRecord::new("w2", "p2");
        legacy.in_use = true;
        let path = write_pool(&dir, &[stuck, legacy]).await;

        let store = AccountStore::load(path.clone()).await.unwrap();
        assert_eq!(store.counts().await, (2, 2, 0));

        let on_disk: Vec<ActorRecord> =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert!(on_disk.iter().all(|r| !r.in_use));
    }

    #[tokio::test]
    async fn snapshot_never_contains_passwords() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_pool(&dir, &[ActorRecord::new("w1", "super-secret")]).await;
        let store = AccountStore::load(path).await.unwrap();
        store.acquire_free().await.unwrap();

        let snapshot = store.snapshot().await;
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(!json.contains("super-secret"));
        assert_eq!(snapshot[0].username, "w1");
        assert!(snapshot[0].in_use);
        assert_eq!(snapshot[0].lease_age_secs, Some(0));
    }

    #[test]
    fn release_stale_leases_counts_only_busy() {
        let mut busy = ActorRecord::new("a", "x");
        busy.in_use = true;
        let mut records = vec![busy, ActorRecord::new("b", "y")];
        assert_eq!(release_stale_leases(&mut records, now_millis()), 1);
        assert!(records.iter().all(|r| !r.in_use));
    }
}
