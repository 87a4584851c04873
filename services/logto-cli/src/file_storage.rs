//! File-backed `Storage`
//!
//! Keeps every slot in one JSON object keyed by the storage key names
//! (`idToken`, `refreshToken`, `signInSession`). Each write replaces the file
//! atomically via temp-file + rename, with 0600 permissions, so a crash never
//! leaves a torn session file and tokens are not world readable.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use logto_client::{Error, Result, Storage, StorageKey};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct FileStorage {
    path: PathBuf,
    state: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open the store at `path`. A missing file is an empty store; it is
    /// created on the first write.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let items: BTreeMap<String, String> = serde_json::from_str(&contents)
                    .map_err(|e| Error::Storage(format!("parsing {}: {e}", path.display())))?;
                info!(path = %path.display(), items = items.len(), "loaded session file");
                items
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(Error::Storage(format!("reading {}: {e}", path.display())));
            }
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn update(&self, key: StorageKey, value: Option<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        match value {
            Some(value) => next.insert(key.as_str().to_string(), value),
            None => next.remove(key.as_str()),
        };
        write_atomic(&self.path, &next).await?;
        *state = next;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get_item<'a>(
        &'a self,
        key: StorageKey,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>> {
        Box::pin(async move { Ok(self.state.lock().await.get(key.as_str()).cloned()) })
    }

    fn set_item<'a>(
        &'a self,
        key: StorageKey,
        value: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.update(key, Some(value)))
    }

    fn remove_item<'a>(
        &'a self,
        key: StorageKey,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(self.update(key, None))
    }
}

/// Write the store to disk atomically: temp file, chmod 0600, rename.
async fn write_atomic(path: &Path, items: &BTreeMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(items)
        .map_err(|e| Error::Storage(format!("serializing session file: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| Error::Storage(format!("creating {}: {e}", dir.display())))?;

    let tmp_path = dir.join(format!(".logto-session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Storage(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Storage(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Storage(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session file");
    Ok(())
}
