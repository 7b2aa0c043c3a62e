//! JSON Lines board store.
//!
//! Each line holds one serialized [`Task`]; dependencies are embedded in the
//! dependent's record, so a line is both a node and its outgoing edges.
//!
//! Format: one UTF-8 JSON object per line, blank lines ignored, records
//! written sorted by id with sorted dependencies so diffs stay small.
//!
//! Reads are resilient: malformed lines are skipped with a
//! [`LoadWarning::MalformedRecord`] carrying the 1-based line number instead
//! of failing the whole load. Ids are normalized with [`NodeId::parse`] on the
//! way in. Writes go to a `.tmp` sibling first, are fsynced and then renamed
//! over the target, so a crash mid-write leaves the previous file intact.

use super::{canonical, BoardStore, LoadWarning, LoadedRecords};
use crate::domain::{NodeId, Task};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

/// Board store backed by a JSONL file.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    /// Create a store for `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The data file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn write_atomic(&self, tasks: &[Task]) -> io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = self.temp_path();
        let file = File::create(&temp_path).await?;
        let mut writer = BufWriter::new(file);

        for task in canonical(tasks) {
            let json = serde_json::to_string(&task).map_err(io::Error::other)?;
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;

        tokio::fs::rename(&temp_path, &self.path).await
    }
}

/// Parse JSONL content into tasks, collecting a warning for each bad line.
pub(crate) fn parse_records(content: &str) -> LoadedRecords {
    let mut records = LoadedRecords::default();

    for (idx, line) in content.lines().enumerate() {
        let line_number = idx + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut task: Task = match serde_json::from_str(line) {
            Ok(task) => task,
            Err(e) => {
                records.warnings.push(LoadWarning::MalformedRecord {
                    line_number,
                    error: e.to_string(),
                });
                continue;
            }
        };

        match NodeId::parse(task.id.as_str()) {
            Ok(id) => task.id = id,
            Err(e) => {
                records.warnings.push(LoadWarning::MalformedRecord {
                    line_number,
                    error: e.to_string(),
                });
                continue;
            }
        }
        // Unparseable dependency ids are kept as-is and dropped later as orphans
        for dep in &mut task.dependencies {
            if let Ok(parsed) = NodeId::parse(dep.as_str()) {
                *dep = parsed;
            }
        }

        records.tasks.push(task);
    }

    records
}

#[async_trait]
impl BoardStore for JsonlStore {
    fn describe(&self) -> String {
        format!("jsonl ({})", self.path.display())
    }

    async fn load(&self) -> Result<LoadedRecords> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no data file yet, starting empty");
                return Ok(LoadedRecords::default());
            }
            Err(e) => {
                return Err(Error::StorageUnavailable(format!(
                    "cannot read {}: {e}",
                    self.path.display()
                )));
            }
        };

        let records = parse_records(&content);
        debug!(
            path = %self.path.display(),
            tasks = records.tasks.len(),
            warnings = records.warnings.len(),
            "loaded task records"
        );
        Ok(records)
    }

    async fn save(&self, tasks: &[Task]) -> Result<()> {
        self.write_atomic(tasks).await.map_err(|e| {
            Error::StorageUnavailable(format!("cannot write {}: {e}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), tasks = tasks.len(), "saved task records");
        Ok(())
    }
}
