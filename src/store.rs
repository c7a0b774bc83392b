//! Whole-file JSON persistence shared by the cookie and history stores.

use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tracing::debug;

use crate::utils::error::Result;

/// Reads and decodes `path`; `Ok(None)` when the file does not exist.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No stored file");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let data = serde_json::from_str(&content)?;
    debug!(path = %path.display(), "JSON file loaded");
    Ok(Some(data))
}

/// Writes `data` as pretty JSON through a temp file and a rename, so a crash
/// mid-write leaves the previous contents in place.
pub async fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let json = serde_json::to_string_pretty(data)?;
    let temp_path = path.with_extension("json.tmp");
    tokio::fs::write(&temp_path, &json).await?;
    tokio::fs::rename(&temp_path, path).await?;

    debug!(path = %path.display(), "JSON file saved");
    Ok(())
}

/// Restricts `path` to its owner (Unix only).
#[cfg(unix)]
pub async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(0o600);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
pub async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
