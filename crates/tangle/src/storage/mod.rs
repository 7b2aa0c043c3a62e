//! Persistence for the task board.
//!
//! A [`BoardStore`] loads and saves the full set of task records. The board
//! itself stays in memory; stores only see snapshots, so a slow or failing
//! backend never holds the board lock.
//!
//! Two backends are available:
//!
//! - **Memory**: keeps the last saved snapshot in process, for tests and
//!   throwaway sessions
//! - **JSONL**: one task per line in `.tangle/tasks.jsonl`, written atomically
//!
//! # Example
//!
//! ```no_run
//! use tangle::storage::{create_store, StorageBackend};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let store = create_store(StorageBackend::Jsonl(".tangle/tasks.jsonl".into()));
//!     let loaded = store.load().await?;
//!     println!("{} tasks, {} warnings", loaded.tasks.len(), loaded.warnings.len());
//!     Ok(())
//! }
//! ```

use crate::domain::{NodeId, Task};
use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;

/// Durable home for task records.
///
/// Implementations must be `Send + Sync`; the shared board calls them from
/// whichever task performed the mutation.
#[async_trait]
pub trait BoardStore: Send + Sync {
    /// Human-readable description of the backend (used in status reports).
    fn describe(&self) -> String;

    /// Read every stored task.
    ///
    /// Individually unreadable records are skipped and reported as warnings.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` if the backing store as a whole
    /// cannot be read.
    async fn load(&self) -> Result<LoadedRecords>;

    /// Replace the stored records with `tasks`.
    ///
    /// # Errors
    ///
    /// Returns `Error::StorageUnavailable` if the write fails. The previously
    /// stored records must survive a failed write.
    async fn save(&self, tasks: &[Task]) -> Result<()>;
}

/// Records read from a store, plus anything that had to be skipped.
#[derive(Debug, Clone, Default)]
pub struct LoadedRecords {
    /// Successfully parsed tasks, in stored order
    pub tasks: Vec<Task>,

    /// Problems found while reading
    pub warnings: Vec<LoadWarning>,
}

/// Non-fatal problems found while loading a board.
///
/// The affected record or edge is skipped; everything else still loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadWarning {
    /// A line could not be parsed as a task record
    MalformedRecord {
        /// 1-based line number
        line_number: usize,
        /// Parser error
        error: String,
    },

    /// A second record used an id that was already loaded
    DuplicateTask {
        /// The repeated id
        id: NodeId,
    },

    /// A dependency points at a task that is not in the store
    OrphanedDependency {
        /// The dependent task
        from: NodeId,
        /// The missing dependency
        to: NodeId,
    },

    /// A dependency would close a cycle and was dropped
    CyclicDependency {
        /// The dependent task
        from: NodeId,
        /// The dependency that closed the cycle
        to: NodeId,
    },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedRecord { line_number, error } => {
                write!(f, "skipped malformed record at line {line_number}: {error}")
            }
            Self::DuplicateTask { id } => write!(f, "skipped duplicate record for task {id}"),
            Self::OrphanedDependency { from, to } => {
                write!(f, "dropped dependency {from} -> {to}: {to} does not exist")
            }
            Self::CyclicDependency { from, to } => {
                write!(f, "dropped dependency {from} -> {to}: it would form a cycle")
            }
        }
    }
}

/// Supported storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// In-process storage (lost on exit)
    Memory,

    /// JSON Lines file at the given path
    Jsonl(PathBuf),
}

/// Create a store for the backend.
#[must_use]
pub fn create_store(backend: StorageBackend) -> Arc<dyn BoardStore> {
    match backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Jsonl(path) => Arc::new(JsonlStore::new(path)),
    }
}

/// Copy of `tasks` in canonical stored order: sorted by id, each task's
/// dependencies sorted.
pub(crate) fn canonical(tasks: &[Task]) -> Vec<Task> {
    let mut records: Vec<Task> = tasks.to_vec();
    for task in &mut records {
        task.dependencies.sort();
        task.dependencies.dedup();
    }
    records.sort_by(|a, b| a.id.cmp(&b.id));
    records
}
