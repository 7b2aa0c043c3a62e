//! Workspace configuration and the `init` command.
//!
//! A tangle workspace is a directory containing `.tangle/` with a
//! `config.yaml` and the task data file. Commands that need a board locate
//! the workspace by walking up from the current directory.

use crate::error::{Error, Result};
use crate::graph::DEFAULT_MAX_DEPTH;
use crate::storage::StorageBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Name of the tangle directory
pub const TANGLE_DIR_NAME: &str = ".tangle";

/// Name of the configuration file
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Name of the task data file
pub const TASKS_FILE_NAME: &str = "tasks.jsonl";

/// Name of the gitignore file within .tangle
pub const GITIGNORE_FILE_NAME: &str = ".gitignore";

/// Maximum directory depth to traverse when searching for the tangle root
pub const MAX_TRAVERSAL_DEPTH: usize = 256;

/// Configuration file structure for tangle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TangleConfig {
    /// Traversal settings
    #[serde(default)]
    pub graph: GraphConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Graph traversal section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GraphConfig {
    /// Hop limit for reachability queries
    #[serde(rename = "max-depth")]
    pub max_depth: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Storage configuration section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend type ("jsonl" or "memory")
    pub backend: String,

    /// Path to the data file, relative to the workspace root
    #[serde(rename = "data-file")]
    pub data_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "jsonl".to_string(),
            data_file: format!("{TANGLE_DIR_NAME}/{TASKS_FILE_NAME}"),
        }
    }
}

impl StorageConfig {
    /// Resolve the configured backend against the workspace root.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an unknown backend name.
    pub fn to_backend(&self, root: &Path) -> Result<StorageBackend> {
        match self.backend.as_str() {
            "jsonl" => Ok(StorageBackend::Jsonl(root.join(&self.data_file))),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(Error::Config(format!(
                "Unknown storage backend '{other}'. Valid backends: jsonl, memory"
            ))),
        }
    }
}

impl TangleConfig {
    /// Create a configuration with the given backend and depth bound.
    pub fn new(backend: &str, max_depth: usize) -> Self {
        Self {
            graph: GraphConfig { max_depth },
            storage: StorageConfig {
                backend: backend.to_string(),
                ..StorageConfig::default()
            },
        }
    }

    /// Load configuration from a file
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read and `Error::Config` if
    /// it does not parse or fails validation.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Check value ranges and the backend name.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.graph.max_depth == 0 {
            return Err(Error::Config("max-depth must be at least 1".to_string()));
        }
        validate_backend(&self.storage.backend)?;
        Ok(())
    }

    /// Resolve the storage backend against the workspace root.
    ///
    /// # Errors
    ///
    /// See [`StorageConfig::to_backend`].
    pub fn to_backend(&self, root: &Path) -> Result<StorageBackend> {
        self.storage.to_backend(root)
    }
}

impl Default for TangleConfig {
    fn default() -> Self {
        Self::new("jsonl", DEFAULT_MAX_DEPTH)
    }
}

/// Validate a storage backend name.
///
/// # Errors
///
/// Returns `Error::Config` unless the name is `jsonl` or `memory`.
pub fn validate_backend(backend: &str) -> Result<()> {
    match backend {
        "jsonl" | "memory" => Ok(()),
        other => Err(Error::Config(format!(
            "Unknown storage backend '{other}'. Valid backends: jsonl, memory"
        ))),
    }
}

/// Result of the init command
#[derive(Debug)]
pub struct InitResult {
    /// Path to the created tangle directory
    pub tangle_dir: PathBuf,
    /// Path to the created config file
    pub config_file: PathBuf,
    /// Path to the created task data file
    pub tasks_file: PathBuf,
    /// Path to the created gitignore file
    pub gitignore_file: PathBuf,
    /// The configuration that was written
    pub config: TangleConfig,
}

/// Initialize a new tangle workspace in the given directory.
///
/// # Errors
///
/// Returns an error if:
/// - The `.tangle/` directory already exists
/// - The backend or depth bound is invalid
/// - File system operations fail
pub async fn init(
    base_dir: &Path,
    backend: Option<&str>,
    max_depth: Option<usize>,
) -> Result<InitResult> {
    let config = TangleConfig::new(
        backend.unwrap_or("jsonl").trim(),
        max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
    );
    config.validate()?;

    let tangle_dir = base_dir.join(TANGLE_DIR_NAME);

    if tangle_dir.exists() {
        return Err(Error::Config(format!(
            "Tangle is already initialized in this directory. Found existing '{TANGLE_DIR_NAME}'"
        )));
    }

    fs::create_dir_all(&tangle_dir).await?;

    let config_file = tangle_dir.join(CONFIG_FILE_NAME);
    config.save(&config_file).await?;

    let tasks_file = tangle_dir.join(TASKS_FILE_NAME);
    fs::write(&tasks_file, "").await?;

    let gitignore_file = tangle_dir.join(GITIGNORE_FILE_NAME);
    let gitignore_content = "\
# Tangle scratch files
*.tmp
# tasks.jsonl should be tracked so the board is shared
";
    fs::write(&gitignore_file, gitignore_content).await?;

    tracing::info!(
        path = %tangle_dir.display(),
        backend = %config.storage.backend,
        "initialized workspace"
    );

    Ok(InitResult {
        tangle_dir,
        config_file,
        tasks_file,
        gitignore_file,
        config,
    })
}

/// Check if a directory has been initialized with tangle.
pub fn is_initialized(base_dir: &Path) -> bool {
    base_dir.join(TANGLE_DIR_NAME).is_dir()
}

/// Find the tangle root directory by searching up the directory tree.
///
/// Returns the directory containing `.tangle/`, or `None` if none is found
/// before the filesystem root or [`MAX_TRAVERSAL_DEPTH`] levels.
pub fn find_tangle_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    let mut depth = 0;

    loop {
        if is_initialized(&current) {
            return Some(current);
        }

        depth += 1;
        if depth > MAX_TRAVERSAL_DEPTH || !current.pop() {
            return None;
        }
    }
}

/// Load the configuration of the workspace rooted at `root`.
///
/// # Errors
///
/// As [`TangleConfig::load`].
pub async fn load_workspace_config(root: &Path) -> Result<TangleConfig> {
    TangleConfig::load(&root.join(TANGLE_DIR_NAME).join(CONFIG_FILE_NAME)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    // ========== TangleConfig Tests ==========

    #[test]
    fn test_config_default() {
        let config = TangleConfig::default();
        assert_eq!(config.graph.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.storage.backend, "jsonl");
        assert_eq!(config.storage.data_file, ".tangle/tasks.jsonl");
    }

    #[tokio::test]
    async fn test_config_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let original = TangleConfig::new("memory", 12);
        original.save(&config_path).await.unwrap();

        let loaded = TangleConfig::load(&config_path).await.unwrap();
        assert_eq!(original, loaded);
    }

    #[tokio::test]
    async fn test_config_yaml_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        TangleConfig::default().save(&config_path).await.unwrap();

        let content = tokio::fs::read_to_string(&config_path).await.unwrap();
        assert!(content.contains("max-depth: 100"));
        assert!(content.contains("backend: jsonl"));
        assert!(content.contains("data-file: .tangle/tasks.jsonl"));
    }

    #[tokio::test]
    async fn test_config_missing_sections_use_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        tokio::fs::write(&config_path, "graph:\n  max-depth: 7\n")
            .await
            .unwrap();

        let config = TangleConfig::load(&config_path).await.unwrap();

        assert_eq!(config.graph.max_depth, 7);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[rstest]
    #[case::zero_depth("graph:\n  max-depth: 0\n", "at least 1")]
    #[case::bad_backend("storage:\n  backend: sqlite\n  data-file: x\n", "unknown storage backend")]
    #[case::not_yaml("graph: [", "")]
    #[tokio::test]
    async fn test_config_load_rejects_invalid(#[case] content: &str, #[case] expected: &str) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        tokio::fs::write(&config_path, content).await.unwrap();

        let err = TangleConfig::load(&config_path).await.unwrap_err();

        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().to_lowercase().contains(expected));
    }

    #[test]
    fn test_to_backend_resolves_against_root() {
        let root = Path::new("/work");
        let backend = TangleConfig::default().to_backend(root).unwrap();
        assert_eq!(
            backend,
            StorageBackend::Jsonl(PathBuf::from("/work/.tangle/tasks.jsonl"))
        );

        let memory = TangleConfig::new("memory", 5).to_backend(root).unwrap();
        assert_eq!(memory, StorageBackend::Memory);
    }

    // ========== Init Command Tests ==========

    #[tokio::test]
    async fn test_init_creates_directory_structure() {
        let temp_dir = TempDir::new().unwrap();

        let result = init(temp_dir.path(), None, None).await.unwrap();

        assert!(result.tangle_dir.exists());
        assert!(result.config_file.exists());
        assert!(result.tasks_file.exists());
        assert!(result.gitignore_file.exists());
        assert_eq!(result.config, TangleConfig::default());
    }

    #[tokio::test]
    async fn test_init_with_options() {
        let temp_dir = TempDir::new().unwrap();

        let result = init(temp_dir.path(), Some("memory"), Some(20))
            .await
            .unwrap();

        let config = TangleConfig::load(&result.config_file).await.unwrap();
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.graph.max_depth, 20);
    }

    #[tokio::test]
    async fn test_init_fails_if_already_initialized() {
        let temp_dir = TempDir::new().unwrap();

        init(temp_dir.path(), None, None).await.unwrap();

        let err = init(temp_dir.path(), None, None).await.unwrap_err();
        assert!(err.to_string().to_lowercase().contains("already initialized"));
    }

    #[tokio::test]
    async fn test_init_rejects_invalid_backend() {
        let temp_dir = TempDir::new().unwrap();

        let result = init(temp_dir.path(), Some("postgres"), None).await;

        assert!(result.is_err());
        assert!(!temp_dir.path().join(TANGLE_DIR_NAME).exists());
    }

    #[tokio::test]
    async fn test_init_creates_empty_tasks_file() {
        let temp_dir = TempDir::new().unwrap();

        let result = init(temp_dir.path(), None, None).await.unwrap();

        let content = tokio::fs::read_to_string(&result.tasks_file).await.unwrap();
        assert!(content.is_empty());
    }

    // ========== Discovery Tests ==========

    #[test]
    fn test_is_initialized() {
        let temp_dir = TempDir::new().unwrap();
        assert!(!is_initialized(temp_dir.path()));

        std::fs::create_dir(temp_dir.path().join(TANGLE_DIR_NAME)).unwrap();
        assert!(is_initialized(temp_dir.path()));
    }

    #[test]
    fn test_find_tangle_root_in_parent_dir() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join(TANGLE_DIR_NAME)).unwrap();

        let sub_dir = temp_dir.path().join("sub").join("nested");
        std::fs::create_dir_all(&sub_dir).unwrap();

        let found = find_tangle_root(&sub_dir);
        assert_eq!(found, Some(temp_dir.path().to_path_buf()));
    }

    #[test]
    fn test_find_tangle_root_not_found() {
        let temp_dir = TempDir::new().unwrap();

        assert!(find_tangle_root(temp_dir.path()).is_none());
    }
}
