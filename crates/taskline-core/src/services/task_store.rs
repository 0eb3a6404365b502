//! Local snapshot sink used by the sync engine.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::db::{Database, LibSqlTaskRepository, TaskRepository};
use crate::error::{Error, Result};
use crate::models::{Folder, Task};

/// Everything persisted besides the command log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalSnapshot {
    /// Server-confirmed tasks plus folded acknowledgements
    pub tasks: Vec<Task>,
    pub last_sync: Option<DateTime<Utc>>,
    pub folders: Vec<Folder>,
}

/// Durable home of the local snapshot
#[allow(async_fn_in_trait)]
pub trait TaskStore {
    async fn load_snapshot(&self) -> Result<LocalSnapshot>;

    async fn save_snapshot(&self, snapshot: &LocalSnapshot) -> Result<()>;
}

/// libSQL-backed task store
#[derive(Clone)]
pub struct LibSqlTaskStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LibSqlTaskStore {
    /// Open the store at the given filesystem path.
    ///
    /// A file that is not a database is moved aside and a fresh one is created.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local database at {} is unreadable: {}. Starting from an empty snapshot.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn is_corrupted_db_error(error: &Error) -> bool {
        let message = error.to_string().to_ascii_lowercase();
        message.contains("file is not a database") || message.contains("malformed")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };

        if db_path.exists() {
            let timestamp = Utc::now().timestamp_millis();
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));
            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            if file_name.to_string_lossy().starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale local DB file {}", path.display());
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for LibSqlTaskStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibSqlTaskStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl TaskStore for LibSqlTaskStore {
    async fn load_snapshot(&self) -> Result<LocalSnapshot> {
        let db = self.db.lock().await;
        let repo = LibSqlTaskRepository::new(db.connection());
        Ok(LocalSnapshot {
            tasks: repo.load_tasks().await?,
            last_sync: repo.load_cursor().await?,
            folders: repo.load_folders().await?,
        })
    }

    async fn save_snapshot(&self, snapshot: &LocalSnapshot) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlTaskRepository::new(db.connection());
        repo.save_snapshot(&snapshot.tasks, &snapshot.folders, snapshot.last_sync)
            .await
    }
}

/// Store kept in memory only (primarily for tests)
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    snapshot: Mutex<LocalSnapshot>,
    fail_saves: AtomicBool,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: LocalSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            fail_saves: AtomicBool::new(false),
        }
    }

    /// Make subsequent saves fail
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> LocalSnapshot {
        self.snapshot.lock().await.clone()
    }
}

impl TaskStore for MemoryTaskStore {
    async fn load_snapshot(&self) -> Result<LocalSnapshot> {
        Ok(self.snapshot().await)
    }

    async fn save_snapshot(&self, snapshot: &LocalSnapshot) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Database("snapshot save disabled".to_string()));
        }
        *self.snapshot.lock().await = snapshot.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskId;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn sample_snapshot() -> LocalSnapshot {
        let at = Utc::now();
        LocalSnapshot {
            tasks: vec![Task::new(TaskId::from("t1"), "Water plants", at)],
            last_sync: Some(at),
            folders: vec![Folder::new("f1", "Home")],
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_libsql_store_round_trip() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("nested").join("taskline.db");
        let snapshot = sample_snapshot();

        {
            let store = LibSqlTaskStore::open_path(&path).await.unwrap();
            store.save_snapshot(&snapshot).await.unwrap();
        }

        let reopened = LibSqlTaskStore::open_path(&path).await.unwrap();
        let loaded = reopened.load_snapshot().await.unwrap();
        assert_eq!(loaded.tasks.len(), 1);
        assert_eq!(loaded.tasks[0].title, "Water plants");
        assert_eq!(loaded.folders, snapshot.folders);
        assert_eq!(
            loaded.last_sync.map(|at| at.timestamp_micros()),
            snapshot.last_sync.map(|at| at.timestamp_micros())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_corrupt_database_is_moved_aside() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("taskline.db");
        std::fs::write(&path, vec![b'x'; 4096]).unwrap();

        let store = LibSqlTaskStore::open_path(&path).await.unwrap();
        assert!(store.load_snapshot().await.unwrap().tasks.is_empty());

        let quarantined = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(std::result::Result::ok)
            .any(|entry| entry.file_name().to_string_lossy().contains(".corrupt-"));
        assert!(quarantined);
    }

    #[tokio::test]
    async fn test_memory_store_save_failure() {
        let store = MemoryTaskStore::new();
        store.set_fail_saves(true);
        assert!(store.save_snapshot(&sample_snapshot()).await.is_err());
        assert_eq!(store.snapshot().await, LocalSnapshot::default());
    }
}
