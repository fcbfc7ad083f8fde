use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::session::AuthData;

/// Persisted login, so a restart keeps the session until the token expires.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<Option<AuthData>>>,
    path: Option<PathBuf>,
}

impl SessionStore {
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
            path: None,
        }
    }

    pub async fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = match read_auth(&path).await {
            Some(auth) if auth.is_expired() => {
                debug!(path = %path.display(), "discarding expired session");
                None
            }
            other => other,
        };
        Self {
            inner: Arc::new(RwLock::new(data)),
            path: Some(path),
        }
    }

    pub async fn get(&self) -> Option<AuthData> {
        self.inner
            .read()
            .await
            .as_ref()
            .filter(|auth| !auth.is_expired())
            .cloned()
    }

    pub async fn save(&self, auth: &AuthData) {
        *self.inner.write().await = Some(auth.clone());
        if let Err(e) = self.persist().await {
            let path = self.path.as_deref().unwrap_or_else(|| Path::new(""));
            warn!(error = %e, path = %path.display(), "failed to persist session");
        }
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
        if let Some(path) = &self.path {
            for file in [path.clone(), path.with_extension("json.tmp")] {
                match tokio::fs::remove_file(&file).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => warn!(error = %e, path = %file.display(), "failed to remove session file"),
                }
            }
        }
    }

    async fn persist(&self) -> Result<(), std::io::Error> {
        let Some(path) = &self.path else {
            debug!("session store is in-memory only; skipping persist");
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(&*self.inner.read().await)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await
    }
}

async fn read_auth(path: &Path) -> Option<AuthData> {
    let bytes = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice::<Option<AuthData>>(&bytes) {
        Ok(auth) => auth,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "failed to parse session, trying tmp fallback");
            let tmp = path.with_extension("json.tmp");
            let tmp_bytes = tokio::fs::read(&tmp).await.ok()?;
            serde_json::from_slice::<Option<AuthData>>(&tmp_bytes).ok().flatten()
        }
    }
}
