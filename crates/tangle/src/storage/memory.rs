//! In-process board store.

use super::{canonical, BoardStore, LoadedRecords};
use crate::domain::Task;
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Keeps the most recently saved snapshot in memory.
///
/// Nothing survives the process, but `load` after `save` round-trips, which
/// is what tests and throwaway sessions need.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<Task>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with records.
    #[must_use]
    pub fn with_records(tasks: Vec<Task>) -> Self {
        Self {
            records: Mutex::new(tasks),
        }
    }
}

#[async_trait]
impl BoardStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn load(&self) -> Result<LoadedRecords> {
        let records = self.records.lock().await;
        Ok(LoadedRecords {
            tasks: records.clone(),
            warnings: Vec::new(),
        })
    }

    async fn save(&self, tasks: &[Task]) -> Result<()> {
        *self.records.lock().await = canonical(tasks);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{SharedBoard, TaskBoard};
    use crate::domain::{NewTask, NodeId, TaskState};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_seeded_records_are_loaded_by_shared_board() {
        let mut board = TaskBoard::new();
        board.create(NewTask::new("t1")).unwrap();
        board
            .create(NewTask::new("t2").with_dependencies(["t1"]))
            .unwrap();
        let store = Arc::new(MemoryStore::with_records(board.snapshot().tasks));

        let shared = SharedBoard::open(store.clone(), 100).await;
        shared.claim(&NodeId::new("t1"), "agent").await.unwrap();

        let saved = store.load().await.unwrap().tasks;
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].state, TaskState::InProgress);
        assert_eq!(saved[1].state, TaskState::Pending);
    }
}
