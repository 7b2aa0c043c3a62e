//! Workspace context management for the MCP server.
//!
//! This module handles:
//! - Workspace detection (walking up to find `.tangle/`)
//! - Path canonicalization
//! - One [`Engine`] per workspace
//!
//! # Lock Ordering
//!
//! The `Context` lock is only held long enough to look up an engine. Tools
//! clone the `Arc<Engine>` and release the context before running a request,
//! so engine locks are never acquired while the context is locked.

use crate::error::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tangle::commands::init::{self, TANGLE_DIR_NAME, TangleConfig};
use tangle::engine::Engine;
use tangle::storage::StorageBackend;
use tracing::debug;

/// Maximum number of cached workspaces.
///
/// When this limit is reached, the oldest workspace is evicted from cache.
const MAX_CACHED_WORKSPACES: usize = 32;

/// Context state for the MCP server.
///
/// Manages one engine per workspace and remembers which workspace is current.
#[derive(Default)]
pub struct Context {
    /// The current active workspace root.
    current_workspace: Option<PathBuf>,

    /// Per-workspace engines (limited to [`MAX_CACHED_WORKSPACES`]).
    engines: HashMap<PathBuf, Arc<Engine>>,

    /// Per-workspace data files (`None` for in-memory boards).
    data_paths: HashMap<PathBuf, Option<PathBuf>>,

    /// Insertion order for FIFO cache eviction.
    cache_order: VecDeque<PathBuf>,
}

impl Context {
    /// Create a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the current workspace root.
    ///
    /// Canonicalizes the path, checks for a `.tangle/` directory, and opens
    /// an engine for the workspace unless one is already cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the workspace path doesn't exist, has no `.tangle/`
    /// directory, or its configuration is invalid.
    pub async fn set_workspace(&mut self, workspace_root: &Path) -> Result<WorkspaceInfo> {
        debug!(path = %workspace_root.display(), "Setting workspace");

        let canonical = workspace_root
            .canonicalize()
            .map_err(|e| Error::WorkspaceNotFound {
                path: workspace_root.display().to_string(),
                source: Some(e),
            })?;

        validate_path(&canonical)?;

        let tangle_dir = canonical.join(TANGLE_DIR_NAME);
        if !tangle_dir.is_dir() {
            debug!(path = %tangle_dir.display(), "No .tangle directory found");
            return Err(Error::NoTangleDirectory(canonical.display().to_string()));
        }

        let config_path = tangle_dir.join(init::CONFIG_FILE_NAME);
        let config = TangleConfig::load(&config_path)
            .await
            .map_err(|e| Error::ConfigLoad {
                path: config_path.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!(
            backend = %config.storage.backend,
            max_depth = config.graph.max_depth,
            "Loaded config"
        );

        let data_path = match config.to_backend(&canonical)? {
            StorageBackend::Jsonl(path) => Some(path),
            StorageBackend::Memory => None,
        };

        self.current_workspace = Some(canonical.clone());

        if self.engines.contains_key(&canonical) {
            debug!("Using cached engine");
        } else {
            debug!("Opening engine");
            while self.engines.len() >= MAX_CACHED_WORKSPACES {
                self.evict_oldest();
            }

            let engine = Engine::open(&config, &canonical).await?;
            self.engines.insert(canonical.clone(), Arc::new(engine));
            self.data_paths.insert(canonical.clone(), data_path.clone());
            self.cache_order.push_back(canonical.clone());
        }

        Ok(WorkspaceInfo {
            workspace_root: canonical,
            data_path,
        })
    }

    /// Evict the oldest cached workspace to make room for new entries.
    fn evict_oldest(&mut self) {
        if let Some(oldest) = self.cache_order.pop_front() {
            self.engines.remove(&oldest);
            self.data_paths.remove(&oldest);
            if self.current_workspace.as_ref() == Some(&oldest) {
                self.current_workspace = None;
            }
            debug!(workspace = %oldest.display(), "Evicted workspace from cache");
        }
    }

    /// Get the current workspace root.
    #[must_use]
    pub fn current_workspace(&self) -> Option<&PathBuf> {
        self.current_workspace.as_ref()
    }

    /// Get the data file for the current workspace.
    #[must_use]
    pub fn current_data_path(&self) -> Option<&PathBuf> {
        self.current_workspace
            .as_ref()
            .and_then(|ws| self.data_paths.get(ws))
            .and_then(Option::as_ref)
    }

    /// Get the engine for a specific workspace, or the current one if not
    /// specified.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No context is set and no workspace path is provided
    /// - The workspace path doesn't exist
    /// - The workspace exists but wasn't initialized via `set_workspace()`
    pub fn engine_for(&self, workspace_root: Option<&Path>) -> Result<Arc<Engine>> {
        let workspace = match workspace_root {
            Some(path) => path.canonicalize().map_err(|e| Error::WorkspaceNotFound {
                path: path.display().to_string(),
                source: Some(e),
            })?,
            None => self.current_workspace.clone().ok_or(Error::NoContext)?,
        };

        self.engines
            .get(&workspace)
            .cloned()
            .ok_or_else(|| Error::WorkspaceNotInitialized(workspace.display().to_string()))
    }

    /// Discover and set the workspace by walking up from the given directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no `.tangle/` directory is found in the path
    /// hierarchy, or if the engine cannot be opened.
    pub async fn discover_and_set_workspace(&mut self, start: &Path) -> Result<WorkspaceInfo> {
        let workspace_root = discover_workspace(start)?;
        self.set_workspace(&workspace_root).await
    }

    /// Register an engine for a workspace without touching the filesystem.
    #[cfg(test)]
    pub fn set_test_workspace(&mut self, workspace_root: PathBuf, engine: Engine) {
        self.current_workspace = Some(workspace_root.clone());
        self.data_paths.insert(workspace_root.clone(), None);
        self.engines
            .insert(workspace_root.clone(), Arc::new(engine));
        self.cache_order.push_back(workspace_root);
    }

    /// Number of cached workspaces.
    #[cfg(test)]
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.engines.len()
    }
}

/// Information about a workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceInfo {
    /// The canonical path to the workspace root.
    pub workspace_root: PathBuf,

    /// The task data file, if the board is file-backed.
    pub data_path: Option<PathBuf>,
}

/// Validate that a canonical path is usable as a workspace.
fn validate_path(path: &Path) -> Result<()> {
    if !path.is_absolute() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Workspace path must be absolute",
        )));
    }

    if path.to_string_lossy().contains('\0') {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Workspace path contains invalid characters",
        )));
    }

    if path
        .components()
        .any(|c| matches!(c, std::path::Component::ParentDir))
    {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Workspace path contains parent directory references",
        )));
    }

    Ok(())
}

/// Discover a tangle workspace by walking up from the given directory.
///
/// Returns the canonicalized workspace root (directory containing `.tangle/`).
///
/// # Errors
///
/// Returns `Error::NoTangleDirectory` if no `.tangle/` directory is found,
/// or `Error::WorkspaceNotFound` if the path cannot be canonicalized.
pub fn discover_workspace(start: &Path) -> Result<PathBuf> {
    let root = init::find_tangle_root(start)
        .ok_or_else(|| Error::NoTangleDirectory(start.display().to_string()))?;

    // Resolve symlinks (e.g. /var -> /private/var on macOS)
    root.canonicalize().map_err(|e| Error::WorkspaceNotFound {
        path: root.display().to_string(),
        source: Some(e),
    })
}
