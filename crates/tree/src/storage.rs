//! Key/value persistence for special folder stores and refresh bookkeeping
//!
//! Values are opaque JSON. Each [`StorageScope`] is addressed separately so
//! user-level data can follow the user across workspaces while project data
//! stays with the workspace.

use crate::{Error, Result};
use async_trait::async_trait;
use fs4::tokio::AsyncFileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Environment variable overriding the global state directory
pub const STATE_DIR_ENV: &str = "TASKDECK_STATE_DIR";

/// Where a value is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageScope {
    /// Shared by every workspace of the user
    Global,
    /// Private to the current workspace
    Workspace,
}

impl std::fmt::Display for StorageScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Workspace => f.write_str("workspace"),
        }
    }
}

/// Persistence collaborator
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a value, `None` if the key was never written
    async fn get(&self, scope: StorageScope, key: &str) -> Result<Option<Value>>;

    /// Write a value
    async fn set(&self, scope: StorageScope, key: &str, value: Value) -> Result<()>;
}

/// Read and decode a value, falling back to the default on any failure
pub async fn load_or_default<T>(storage: &dyn Storage, scope: StorageScope, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match storage.get(scope, key).await {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(%scope, key, error = %e, "Discarding undecodable stored value");
                T::default()
            }
        },
        Ok(None) => T::default(),
        Err(e) => {
            warn!(%scope, key, error = %e, "Failed to read stored value");
            T::default()
        }
    }
}

/// Encode and write a value
pub async fn save<T: Serialize + ?Sized>(
    storage: &dyn Storage,
    scope: StorageScope,
    key: &str,
    value: &T,
) -> Result<()> {
    let value = serde_json::to_value(value)
        .map_err(|e| Error::serialization(format!("Failed to encode '{key}': {e}")))?;
    storage.set(scope, key, value).await
}

/// In-memory storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<(StorageScope, String), Value>>,
    failing: bool,
}

impl MemoryStorage {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every read and write fails
    #[must_use]
    pub fn failing() -> Self {
        Self {
            entries: Mutex::default(),
            failing: true,
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, scope: StorageScope, key: &str) -> Result<Option<Value>> {
        if self.failing {
            return Err(Error::storage(format!("read of '{key}' refused")));
        }
        Ok(self.entries.lock().await.get(&(scope, key.to_string())).cloned())
    }

    async fn set(&self, scope: StorageScope, key: &str, value: Value) -> Result<()> {
        if self.failing {
            return Err(Error::storage(format!("write of '{key}' refused")));
        }
        self.entries
            .lock()
            .await
            .insert((scope, key.to_string()), value);
        Ok(())
    }
}

/// One JSON object file per scope
#[derive(Debug)]
pub struct JsonFileStorage {
    global_path: PathBuf,
    workspace_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStorage {
    /// Use explicit file paths
    #[must_use]
    pub fn new(global_path: PathBuf, workspace_path: PathBuf) -> Self {
        Self {
            global_path,
            workspace_path,
            write_lock: Mutex::new(()),
        }
    }

    /// Use the default locations for a workspace root
    pub fn for_workspace(workspace_root: &Path) -> Result<Self> {
        Ok(Self::new(
            Self::default_global_path()?,
            Self::default_workspace_path(workspace_root),
        ))
    }

    /// Default global state file.
    ///
    /// `$TASKDECK_STATE_DIR/global.json` when the variable is set, otherwise
    /// `taskdeck/global.json` under the platform state (or data) directory.
    pub fn default_global_path() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(STATE_DIR_ENV)
            && !dir.is_empty()
        {
            return Ok(PathBuf::from(dir).join("global.json"));
        }
        let base = dirs::state_dir()
            .or_else(dirs::data_dir)
            .ok_or_else(|| Error::configuration("Could not determine state directory"))?;
        Ok(base.join("taskdeck").join("global.json"))
    }

    /// Default workspace state file
    #[must_use]
    pub fn default_workspace_path(workspace_root: &Path) -> PathBuf {
        workspace_root.join(".taskdeck").join("state.json")
    }

    /// File backing a scope
    #[must_use]
    pub fn path(&self, scope: StorageScope) -> &Path {
        match scope {
            StorageScope::Global => &self.global_path,
            StorageScope::Workspace => &self.workspace_path,
        }
    }

    async fn read_document(path: &Path) -> Result<Map<String, Value>> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No state file yet");
                return Ok(Map::new());
            }
            Err(e) => return Err(Error::io(e, Some(path.to_path_buf()), "read state file")),
        };
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }
        serde_json::from_str(&contents).map_err(|e| {
            Error::serialization(format!(
                "Failed to parse state file {}: {e}",
                path.display()
            ))
        })
    }

    async fn write_document(path: &Path, document: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(e, Some(parent.to_path_buf()), "create_dir_all"))?;
        }

        let contents = serde_json::to_string_pretty(document)
            .map_err(|e| Error::serialization(format!("Failed to encode state: {e}")))?;

        // Write to a temporary file first, then rename atomically
        let temp_path = path.with_extension("json.tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .await
            .map_err(|e| Error::io(e, Some(temp_path.clone()), "open"))?;

        file.lock_exclusive().map_err(|e| {
            Error::storage(format!(
                "Failed to lock {}: {e}",
                temp_path.display()
            ))
        })?;
        file.write_all(contents.as_bytes())
            .await
            .map_err(|e| Error::io(e, Some(temp_path.clone()), "write_all"))?;
        file.sync_all()
            .await
            .map_err(|e| Error::io(e, Some(temp_path.clone()), "sync_all"))?;
        drop(file);

        fs::rename(&temp_path, path)
            .await
            .map_err(|e| Error::io(e, Some(path.to_path_buf()), "rename"))?;
        Ok(())
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn get(&self, scope: StorageScope, key: &str) -> Result<Option<Value>> {
        let document = Self::read_document(self.path(scope)).await?;
        Ok(document.get(key).cloned())
    }

    async fn set(&self, scope: StorageScope, key: &str, value: Value) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.path(scope);
        let mut document = Self::read_document(path).await?;
        document.insert(key.to_string(), value);
        Self::write_document(path, &document).await?;
        debug!(%scope, key, path = %path.display(), "Persisted value");
        Ok(())
    }
}
