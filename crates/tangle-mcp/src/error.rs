//! Error types for the tangle MCP server.

use rmcp::ErrorData as McpError;
use tangle::protocol::Rejection;
use thiserror::Error;

/// Errors that can occur in the tangle MCP server.
#[derive(Debug, Error)]
pub enum Error {
    /// No workspace context has been set.
    #[error("No workspace context set. Call set_context first.")]
    NoContext,

    /// The specified workspace was not found or path is invalid.
    #[error("Workspace not found: {path}")]
    WorkspaceNotFound {
        /// The path that was not found.
        path: String,
        /// The underlying IO error, if any.
        #[source]
        source: Option<std::io::Error>,
    },

    /// Workspace exists but was not initialized via `set_context`.
    #[error("Workspace not initialized: {0}. Call set_context first.")]
    WorkspaceNotInitialized(String),

    /// Failed to discover a tangle workspace.
    #[error("No .tangle directory found in {0} or parent directories")]
    NoTangleDirectory(String),

    /// The workspace configuration could not be loaded.
    #[error("Failed to load config from {path}: {reason}")]
    ConfigLoad {
        /// Path of the config file.
        path: String,
        /// Why loading failed.
        reason: String,
    },

    /// The engine refused a request.
    #[error(transparent)]
    Engine(#[from] tangle::error::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for tangle MCP operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for McpError {
    /// Engine rejections become `invalid_params` errors carrying the
    /// structured rejection; everything else is an internal error.
    fn from(err: Error) -> Self {
        match &err {
            Error::Engine(inner) if is_caller_error(inner) => {
                let rejection = Rejection::from(inner);
                let data = serde_json::to_value(&rejection).ok();
                McpError::invalid_params(rejection.reason, data)
            }
            Error::NoContext
            | Error::WorkspaceNotFound { .. }
            | Error::WorkspaceNotInitialized(_)
            | Error::NoTangleDirectory(_) => McpError::invalid_params(err.to_string(), None),
            _ => McpError::internal_error(err.to_string(), None),
        }
    }
}

/// Whether the engine error describes a bad request rather than a failure
/// of the server itself.
fn is_caller_error(err: &tangle::error::Error) -> bool {
    use tangle::error::Error as EngineError;

    !matches!(
        err,
        EngineError::StorageUnavailable(_)
            | EngineError::Config(_)
            | EngineError::Io(_)
            | EngineError::Json(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tangle::domain::NodeId;

    #[test]
    fn test_rejection_maps_to_invalid_params_with_data() {
        let err = Error::from(tangle::error::Error::NodeNotFound(NodeId::new("ghost")));

        let mcp: McpError = err.into();

        assert_eq!(mcp.code, rmcp::model::ErrorCode::INVALID_PARAMS);
        assert_eq!(mcp.message, "Node not found: ghost");
        let data = mcp.data.unwrap();
        assert_eq!(data["error"], "node_not_found");
    }

    #[test]
    fn test_storage_failure_maps_to_internal_error() {
        let err = Error::from(tangle::error::Error::StorageUnavailable(
            "disk full".to_string(),
        ));

        let mcp: McpError = err.into();

        assert_eq!(mcp.code, rmcp::model::ErrorCode::INTERNAL_ERROR);
    }

    #[test]
    fn test_no_context_message() {
        let mcp: McpError = Error::NoContext.into();
        assert!(mcp.message.contains("set_context"));
    }
}
