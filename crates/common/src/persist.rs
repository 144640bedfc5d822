//! Whole-file JSON persistence
//!
//! Every store in the workspace keeps its state in memory and rewrites the
//! full file on each mutation. Writes go to a temporary file in the same
//! directory and are renamed over the target, so a crash mid-write leaves the
//! previous contents intact.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Serialize `data` and atomically replace the file at `path`.
///
/// File permissions are set to 0600 on unix since pool files carry account
/// passwords.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(data)?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| Error::Config(format!("store path has no file name: {}", path.display())))?
        .to_string_lossy();
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, &json).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms).await?;
    }

    tokio::fs::rename(&tmp_path, path).await?;

    debug!(path = %path.display(), bytes = json.len(), "persisted store");
    Ok(())
}

/// Load a JSON store, falling back to `T::default()`.
///
/// A missing file is a cold start. An unreadable or corrupt file is also
/// treated as empty so the service keeps running, but it is logged at warn
/// level because the previous contents are about to be overwritten.
pub async fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let contents = match tokio::fs::read(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "store file not found, starting empty");
            return T::default();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "store file unreadable, starting empty");
            return T::default();
        }
    };

    match serde_json::from_slice(&contents) {
        Ok(value) => value,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "store file corrupt, starting empty");
            T::default()
        }
    }
}
