//! Persistence for the routing table.
//!
//! The file store writes a single JSON document keyed by scope:
//!
//! ```json
//! {
//!   "123456789": {
//!     "channel_id": "111",
//!     "categories": { "wos_accounts": "222" }
//!   }
//! }
//! ```
//!
//! Writes use an atomic temp file + fsync + rename so a crash never leaves a
//! half-written table behind.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::RoutingState;

/// Errors from loading or saving routing state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("routing store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("routing store at {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("failed to serialize routing state: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    fn file_io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable backing for a [`RoutingTable`](super::RoutingTable).
#[async_trait]
pub trait RoutingStore: Send + Sync {
    /// Load the persisted state. A store that has never been written is empty.
    async fn load(&self) -> StoreResult<RoutingState>;

    /// Replace the persisted state.
    async fn save(&self, state: &RoutingState) -> StoreResult<()>;
}

// ============================================================================
// FileRoutingStore
// ============================================================================

/// JSON file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileRoutingStore {
    path: PathBuf,
}

impl FileRoutingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RoutingStore for FileRoutingStore {
    async fn load(&self) -> StoreResult<RoutingState> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(RoutingState::default()),
            Err(e) => return Err(StoreError::file_io(&self.path, e)),
        };
        if contents.trim().is_empty() {
            return Ok(RoutingState::default());
        }
        serde_json::from_str(&contents).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            message: e.to_string(),
        })
    }

    async fn save(&self, state: &RoutingState) -> StoreResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::file_io(parent, e))?;
        }
        let data = serde_json::to_vec_pretty(state)?;
        atomic_write_file(&self.path, &data).await
    }
}

/// Write data to a temp file, fsync it, then atomically rename to the final path.
///
/// The temp file name carries a ULID so concurrent writers never share one.
async fn atomic_write_file(final_path: &Path, data: &[u8]) -> StoreResult<()> {
    let file_name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("routing");
    let temp_path = final_path.with_file_name(format!("{}.{}.tmp", file_name, ulid::Ulid::new()));

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| StoreError::file_io(&temp_path, e))?;
    file.write_all(data)
        .await
        .map_err(|e| StoreError::file_io(&temp_path, e))?;
    file.sync_all()
        .await
        .map_err(|e| StoreError::file_io(&temp_path, e))?;
    fs::rename(&temp_path, final_path)
        .await
        .map_err(|e| StoreError::file_io(final_path, e))?;
    Ok(())
}

// ============================================================================
// MemoryRoutingStore
// ============================================================================

/// In-memory store, for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryRoutingStore {
    state: Mutex<RoutingState>,
    saves: Mutex<usize>,
}

impl MemoryRoutingStore {
    pub fn new(state: RoutingState) -> Self {
        Self {
            state: Mutex::new(state),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful `save` calls so far.
    pub async fn save_count(&self) -> usize {
        *self.saves.lock().await
    }

    pub async fn current(&self) -> RoutingState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl RoutingStore for MemoryRoutingStore {
    async fn load(&self) -> StoreResult<RoutingState> {
        Ok(self.state.lock().await.clone())
    }

    async fn save(&self, state: &RoutingState) -> StoreResult<()> {
        *self.state.lock().await = state.clone();
        *self.saves.lock().await += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::ScopeRoutes;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_state() -> RoutingState {
        let mut state = RoutingState::default();
        state.scopes.insert(
            "guild-1".to_string(),
            ScopeRoutes {
                channel_id: Some("100".to_string()),
                categories: BTreeMap::from([("wos_accounts".to_string(), "200".to_string())]),
            },
        );
        state
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FileRoutingStore::new(tmp.path().join("routing.json"));
        assert!(store.load().await.unwrap().scopes.is_empty());
    }

    #[tokio::test]
    async fn save_then_load() {
        let tmp = TempDir::new().unwrap();
        let store = FileRoutingStore::new(tmp.path().join("nested/dir/routing.json"));
        store.save(&sample_state()).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, sample_state());

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"guild-1\""));
        assert!(raw.contains("\"wos_accounts\": \"200\""));
    }

    #[tokio::test]
    async fn save_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let store = FileRoutingStore::new(tmp.path().join("routing.json"));
        store.save(&sample_state()).await.unwrap();
        store.save(&RoutingState::default()).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["routing.json".to_string()]);
    }

    #[tokio::test]
    async fn malformed_file_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("routing.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = FileRoutingStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        assert!(err.to_string().contains("corrupt"));
    }

    #[tokio::test]
    async fn memory_store_counts_saves() {
        let store = MemoryRoutingStore::default();
        store.save(&sample_state()).await.unwrap();
        assert_eq!(store.save_count().await, 1);
        assert_eq!(store.load().await.unwrap(), sample_state());
    }
}
