//! Registry storage and the check / mark-claimed operations

use std::collections::BTreeMap;
use std::path::PathBuf;

use common::persist::{load_json_or_default, write_json_atomic};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;

/// On-disk registry shape: `{"usernames": [...], "available": {name: bool}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryData {
    #[serde(default)]
    pub usernames: Vec<String>,
    #[serde(default)]
    pub available: BTreeMap<String, bool>,
}

/// Thread-safe availability registry backed by a JSON file.
pub struct Registry {
    path: PathBuf,
    data: Mutex<RegistryData>,
}

impl Registry {
    /// Load the registry, creating an empty file on cold start.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
        let data: RegistryData = load_json_or_default(&path).await;
        if !exists {
            write_json_atomic(&path, &data).await?;
        }

        info!(
            path = %path.display(),
            identifiers = data.available.len(),
            "loaded availability registry"
        );
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Whether `identifier` is currently available. Unknown identifiers are not.
    pub async fn is_available(&self, identifier: &str) -> bool {
        let data = self.data.lock().await;
        data.available.get(identifier).copied().unwrap_or(false)
    }

    /// Flip `identifier` from available to claimed and persist.
    ///
    /// Returns whether the transition happened. Already-claimed and unknown
    /// identifiers are left untouched and return `false`.
    pub async fn mark_claimed(&self, identifier: &str) -> bool {
        let mut data = self.data.lock().await;
        match data.available.get_mut(identifier) {
            Some(available) if *available => *available = false,
            _ => {
                debug!(identifier, "mark-claimed ignored, not available");
                return false;
            }
        }

        info!(identifier, "identifier marked claimed");
        if let Err(e) = write_json_atomic(&self.path, &*data).await {
            warn!(path = %self.path.display(), error = %e, "failed to persist registry");
        }
        true
    }

    /// Count identifiers as (total, available).
    pub async fn counts(&self) -> (usize, usize) {
        let data = self.data.lock().await;
        let available = data.available.values().filter(|v| **v).count();
        (data.available.len(), available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_registry(dir: &tempfile::TempDir, json: &str) -> (Registry, PathBuf) {
        let path = dir.path().join("usernames.json");
        tokio::fs::write(&path, json).await.unwrap();
        (Registry::load(path.clone()).await.unwrap(), path)
    }

    #[tokio::test]
    async fn check_reads_availability() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = test_registry(
            &dir,
            r#"{"usernames":["alpha","beta"],"available":{"alpha":true,"beta":false}}"#,
        )
        .await;

        assert!(registry.is_available("alpha").await);
        assert!(!registry.is_available("beta").await);
    }

    #[tokio::test]
    async fn unknown_identifier_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = test_registry(&dir, r#"{"available":{"alpha":true}}"#).await;

        assert!(!registry.is_available("zeta").await);
        assert!(!registry.mark_claimed("zeta").await);
    }

    #[tokio::test]
    async fn mark_claimed_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, path) = test_registry(&dir, r#"{"available":{"alpha":true}}"#).await;

        assert!(registry.mark_claimed("alpha").await);
        assert!(!registry.is_available("alpha").await);

        let before = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(!registry.mark_claimed("alpha").await);
        let after = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn claim_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, path) = test_registry(
            &dir,
            r#"{"usernames":["alpha"],"available":{"alpha":true}}"#,
        )
        .await;
        registry.mark_claimed("alpha").await;
        drop(registry);

        let reloaded = Registry::load(path).await.unwrap();
        assert!(!reloaded.is_available("alpha").await);
        assert_eq!(reloaded.counts().await, (1, 0));
    }

    #[tokio::test]
    async fn cold_start_creates_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usernames.json");

        let registry = Registry::load(path.clone()).await.unwrap();
        assert_eq!(registry.counts().await, (0, 0));
        assert!(path.exists());

        let parsed: RegistryData =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert!(parsed.usernames.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = test_registry(&dir, "not json at all").await;
        assert_eq!(registry.counts().await, (0, 0));
    }
}
