//! Lock-protected task board with snapshot persistence.

use super::{BoardSnapshot, Completion, TaskBoard};
use crate::domain::{NewTask, NodeId, Task};
use crate::error::{Error, Result};
use crate::storage::{BoardStore, LoadWarning, MemoryStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tracing::{debug, error, info, warn};

/// How the board was obtained from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoadState {
    /// Loaded normally (possibly with skipped records)
    Loaded {
        /// Tasks on the board after loading
        tasks: usize,
        /// Records or edges that were skipped
        warnings: usize,
    },

    /// The store could not be read; the board started empty and will not be
    /// written back over the unreadable data
    Degraded {
        /// Why loading failed
        reason: String,
    },
}

/// Persistence health, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStatus {
    /// Backend description
    pub backend: String,

    /// Outcome of the initial load
    pub load: LoadState,

    /// Current board revision
    pub revision: u64,

    /// Last revision written successfully
    pub persisted_revision: u64,

    /// Whether in-memory state is ahead of storage
    pub dirty: bool,

    /// Error from the most recent failed save, cleared by the next success
    pub last_save_error: Option<String>,

    /// Time of the last successful save
    pub last_saved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct PersistState {
    persisted_revision: u64,
    last_save_error: Option<String>,
    last_saved_at: Option<DateTime<Utc>>,
}

/// A [`TaskBoard`] shared between concurrent callers.
///
/// Mutations run under the write lock and only do in-memory work there. The
/// snapshot they produce is written after the lock is released; a separate
/// mutex orders writes so an older snapshot never replaces a newer one.
/// Queries take the read lock and run concurrently.
///
/// A failed save leaves the in-memory mutation in place. The error is logged,
/// reported through [`SharedBoard::status`] and retried on the next mutation
/// or [`SharedBoard::flush`].
#[derive(Clone)]
pub struct SharedBoard {
    board: Arc<RwLock<TaskBoard>>,
    store: Arc<dyn BoardStore>,
    persist: Arc<Mutex<PersistState>>,
    load: LoadState,
    load_warnings: Arc<Vec<LoadWarning>>,
}

impl fmt::Debug for SharedBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBoard")
            .field("backend", &self.store.describe())
            .field("load", &self.load)
            .finish_non_exhaustive()
    }
}

impl SharedBoard {
    /// Load the board from `store`.
    ///
    /// Never fails: an unreadable store yields an empty board whose status is
    /// [`LoadState::Degraded`].
    pub async fn open(store: Arc<dyn BoardStore>, max_depth: usize) -> Self {
        match store.load().await {
            Ok(records) => {
                let (board, board_warnings) = TaskBoard::from_tasks(records.tasks, max_depth);
                let mut warnings = records.warnings;
                warnings.extend(board_warnings);
                for warning in &warnings {
                    warn!(backend = %store.describe(), "{warning}");
                }

                let load = LoadState::Loaded {
                    tasks: board.len(),
                    warnings: warnings.len(),
                };
                info!(backend = %store.describe(), tasks = board.len(), "task board loaded");
                Self::assemble(board, store, load, warnings)
            }
            Err(e) => {
                warn!(
                    backend = %store.describe(),
                    error = %e,
                    "storage unavailable, starting with an empty board"
                );
                let load = LoadState::Degraded {
                    reason: e.to_string(),
                };
                Self::assemble(TaskBoard::with_max_depth(max_depth), store, load, Vec::new())
            }
        }
    }

    /// Wrap an existing board.
    #[must_use]
    pub fn new(board: TaskBoard, store: Arc<dyn BoardStore>) -> Self {
        let load = LoadState::Loaded {
            tasks: board.len(),
            warnings: 0,
        };
        Self::assemble(board, store, load, Vec::new())
    }

    /// An empty board backed by a [`MemoryStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(TaskBoard::new(), Arc::new(MemoryStore::new()))
    }

    fn assemble(
        board: TaskBoard,
        store: Arc<dyn BoardStore>,
        load: LoadState,
        load_warnings: Vec<LoadWarning>,
    ) -> Self {
        let persisted_revision = board.revision();
        Self {
            board: Arc::new(RwLock::new(board)),
            store,
            persist: Arc::new(Mutex::new(PersistState {
                persisted_revision,
                ..PersistState::default()
            })),
            load,
            load_warnings: Arc::new(load_warnings),
        }
    }

    /// Problems found while loading.
    #[must_use]
    pub fn load_warnings(&self) -> &[LoadWarning] {
        &self.load_warnings
    }

    /// Shared read access for queries.
    pub async fn read(&self) -> RwLockReadGuard<'_, TaskBoard> {
        self.board.read().await
    }

    /// Run a mutation under the write lock, then persist the result.
    ///
    /// # Errors
    ///
    /// Returns whatever `op` returns. Save failures are not returned; see
    /// [`SharedBoard::status`].
    pub async fn mutate<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut TaskBoard) -> Result<R> + Send,
        R: Send,
    {
        let (out, snapshot) = {
            let mut board = self.board.write().await;
            let out = op(&mut board)?;
            (out, board.snapshot())
        };

        if let Err(e) = self.persist(snapshot).await {
            debug!(error = %e, "mutation kept in memory only");
        }
        Ok(out)
    }

    /// Write the current board if storage is behind.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` if the write fails or the board was
    /// never loaded.
    pub async fn flush(&self) -> Result<()> {
        let snapshot = self.board.read().await.snapshot();
        self.persist(snapshot).await
    }

    async fn persist(&self, snapshot: BoardSnapshot) -> Result<()> {
        let mut state = self.persist.lock().await;

        if let LoadState::Degraded { reason } = &self.load {
            let message = format!("not saving over unreadable storage ({reason})");
            state.last_save_error = Some(message.clone());
            return Err(Error::StorageUnavailable(message));
        }

        if snapshot.revision <= state.persisted_revision {
            return Ok(());
        }

        match self.store.save(&snapshot.tasks).await {
            Ok(()) => {
                state.persisted_revision = snapshot.revision;
                state.last_save_error = None;
                state.last_saved_at = Some(Utc::now());
                Ok(())
            }
            Err(e) => {
                error!(
                    backend = %self.store.describe(),
                    revision = snapshot.revision,
                    error = %e,
                    "failed to save task board"
                );
                state.last_save_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Persistence health.
    pub async fn status(&self) -> StorageStatus {
        let revision = self.board.read().await.revision();
        let state = self.persist.lock().await;
        StorageStatus {
            backend: self.store.describe(),
            load: self.load.clone(),
            revision,
            persisted_revision: state.persisted_revision,
            dirty: revision > state.persisted_revision,
            last_save_error: state.last_save_error.clone(),
            last_saved_at: state.last_saved_at,
        }
    }

    // ========== Mutations ==========

    /// See [`TaskBoard::create`].
    ///
    /// # Errors
    ///
    /// As [`TaskBoard::create`].
    pub async fn create(&self, new_task: NewTask) -> Result<Task> {
        self.mutate(|board| board.create(new_task)).await
    }

    /// See [`TaskBoard::claim`].
    ///
    /// # Errors
    ///
    /// As [`TaskBoard::claim`].
    pub async fn claim(&self, id: &NodeId, agent: &str) -> Result<Task> {
        self.mutate(|board| board.claim(id, agent)).await
    }

    /// See [`TaskBoard::complete`].
    ///
    /// # Errors
    ///
    /// As [`TaskBoard::complete`].
    pub async fn complete(
        &self,
        id: &NodeId,
        result: Option<serde_json::Value>,
        success: bool,
        agent: Option<&str>,
    ) -> Result<Completion> {
        self.mutate(|board| board.complete(id, result, success, agent))
            .await
    }

    /// See [`TaskBoard::release`].
    ///
    /// # Errors
    ///
    /// As [`TaskBoard::release`].
    pub async fn release(&self, id: &NodeId, agent: &str) -> Result<Task> {
        self.mutate(|board| board.release(id, agent)).await
    }

    /// See [`TaskBoard::add_dependency`].
    ///
    /// # Errors
    ///
    /// As [`TaskBoard::add_dependency`].
    pub async fn add_dependency(&self, id: &NodeId, dependency: &NodeId) -> Result<Task> {
        self.mutate(|board| board.add_dependency(id, dependency))
            .await
    }

    /// See [`TaskBoard::remove_dependency`].
    ///
    /// # Errors
    ///
    /// As [`TaskBoard::remove_dependency`].
    pub async fn remove_dependency(&self, id: &NodeId, dependency: &NodeId) -> Result<Task> {
        self.mutate(|board| board.remove_dependency(id, dependency))
            .await
    }

    /// See [`TaskBoard::delete`].
    ///
    /// # Errors
    ///
    /// As [`TaskBoard::delete`].
    pub async fn delete(&self, id: &NodeId) -> Result<Task> {
        self.mutate(|board| board.delete(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskState;
    use crate::storage::LoadedRecords;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Store whose saves can be switched to fail.
    #[derive(Default)]
    struct FlakyStore {
        failing: AtomicBool,
        saved: Mutex<Vec<Task>>,
        unreadable: bool,
    }

    #[async_trait]
    impl BoardStore for FlakyStore {
        fn describe(&self) -> String {
            "flaky".to_string()
        }

        async fn load(&self) -> Result<LoadedRecords> {
            if self.unreadable {
                return Err(Error::StorageUnavailable("disk on fire".to_string()));
            }
            Ok(LoadedRecords {
                tasks: self.saved.lock().await.clone(),
                warnings: Vec::new(),
            })
        }

        async fn save(&self, tasks: &[Task]) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::StorageUnavailable("write refused".to_string()));
            }
            *self.saved.lock().await = tasks.to_vec();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_mutation_is_persisted() {
        let store = Arc::new(FlakyStore::default());
        let shared = SharedBoard::open(store.clone(), 100).await;

        shared.create(NewTask::new("t1")).await.unwrap();

        assert_eq!(store.saved.lock().await.len(), 1);
        let status = shared.status().await;
        assert!(!status.dirty);
        assert!(status.last_saved_at.is_some());
    }

    #[tokio::test]
    async fn test_save_failure_keeps_mutation_and_is_retried() {
        let store = Arc::new(FlakyStore::default());
        let shared = SharedBoard::open(store.clone(), 100).await;

        store.failing.store(true, Ordering::SeqCst);
        let task = shared.create(NewTask::new("t1")).await.unwrap();
        assert_eq!(task.state, TaskState::Ready);

        let status = shared.status().await;
        assert!(status.dirty);
        assert_eq!(status.last_save_error.as_deref(), Some("Storage unavailable: write refused"));
        assert!(shared.read().await.get(&NodeId::new("t1")).is_some());
        assert!(shared.flush().await.is_err());

        store.failing.store(false, Ordering::SeqCst);
        shared.flush().await.unwrap();

        let status = shared.status().await;
        assert!(!status.dirty);
        assert_eq!(status.last_save_error, None);
        assert_eq!(store.saved.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_mutation_does_not_persist() {
        let store = Arc::new(FlakyStore::default());
        let shared = SharedBoard::open(store.clone(), 100).await;

        let err = shared.claim(&NodeId::new("ghost"), "agent").await.unwrap_err();

        assert!(matches!(err, Error::NodeNotFound(_)));
        assert_eq!(shared.status().await.revision, 0);
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_not_written() {
        let store = Arc::new(FlakyStore::default());
        let shared = SharedBoard::open(store.clone(), 100).await;

        shared.create(NewTask::new("t1")).await.unwrap();
        let stale = shared.read().await.snapshot();
        shared.create(NewTask::new("t2")).await.unwrap();

        shared.persist(stale).await.unwrap();

        assert_eq!(store.saved.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_store_degrades_to_empty_board() {
        let store = Arc::new(FlakyStore {
            unreadable: true,
            ..FlakyStore::default()
        });

        let shared = SharedBoard::open(store.clone(), 100).await;

        assert!(shared.read().await.is_empty());
        let status = shared.status().await;
        assert!(matches!(status.load, LoadState::Degraded { ref reason } if reason.contains("disk on fire")));

        // Mutations still work in memory but are never written back
        shared.create(NewTask::new("t1")).await.unwrap();
        assert!(store.saved.lock().await.is_empty());
        assert!(shared.status().await.dirty);
    }

    #[tokio::test]
    async fn test_reopen_restores_states() {
        let store = Arc::new(FlakyStore::default());
        let shared = SharedBoard::open(store.clone(), 100).await;
        shared.create(NewTask::new("t1")).await.unwrap();
        shared
            .create(NewTask::new("t2").with_dependencies(["t1"]))
            .await
            .unwrap();
        shared.claim(&NodeId::new("t1"), "agent").await.unwrap();

        let reopened = SharedBoard::open(store, 100).await;

        let board = reopened.read().await;
        assert_eq!(board.get(&NodeId::new("t1")).unwrap().state, TaskState::InProgress);
        assert_eq!(board.get(&NodeId::new("t2")).unwrap().state, TaskState::Pending);
        assert!(matches!(
            reopened.status().await.load,
            LoadState::Loaded { tasks: 2, warnings: 0 }
        ));
    }
}
