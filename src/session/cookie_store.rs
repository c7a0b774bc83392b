use std::path::PathBuf;
use tracing::{debug, info};

use crate::models::Cookie;
use crate::store;
use crate::utils::error::SessionError;

/// Cookie files on disk, one per session profile.
#[derive(Debug, Clone)]
pub struct CookieStore {
    dir: PathBuf,
}

impl CookieStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, profile: &str) -> PathBuf {
        self.dir.join(format!("{}.cookies.json", profile))
    }

    /// An absent file is an empty cookie set; an unreadable one is an error.
    pub async fn load(&self, profile: &str) -> Result<Vec<Cookie>, SessionError> {
        let path = self.path_for(profile);
        let cookies = store::load_json::<Vec<Cookie>>(&path)
            .await
            .map_err(|e| SessionError::CookieLoadFailed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?
            .unwrap_or_default();
        debug!(profile, count = cookies.len(), "Loaded stored cookies");
        Ok(cookies)
    }

    pub async fn save(&self, profile: &str, cookies: &[Cookie]) -> Result<(), SessionError> {
        let path = self.path_for(profile);
        store::save_json(&path, &cookies)
            .await
            .map_err(|e| SessionError::PersistFailed(e.to_string()))?;
        store::restrict_permissions(&path)
            .await
            .map_err(|e| SessionError::PersistFailed(e.to_string()))?;
        debug!(profile, count = cookies.len(), "Saved cookies");
        Ok(())
    }

    pub async fn remove(&self, profile: &str) -> Result<(), SessionError> {
        let path = self.path_for(profile);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!(path = %path.display(), "Discarded stale cookie file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::PersistFailed(e.to_string())),
        }
    }
}
