//! Error types for tangle operations.
//!
//! Every error in this module is recoverable: callers receive it as a
//! structured value and may retry with different input. The `Display`
//! implementation is the reason string returned to protocol clients and names
//! the specific constraint that was violated.

use crate::domain::{NodeId, TaskLabel};
use std::io;
use thiserror::Error;

/// The error type for tangle operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A referenced node does not exist in the graph.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Adding `from -> to` would close a cycle through `path`.
    ///
    /// `path` runs from `to` back to `from`, so the rejected edge plus the
    /// path form the cycle that was prevented.
    #[error("Edge {from} -> {to} would form a cycle: {}", format_cycle(.from, .path))]
    CycleWouldForm {
        /// Source of the rejected edge
        from: NodeId,
        /// Target of the rejected edge
        to: NodeId,
        /// Existing path from `to` back to `from`
        path: Vec<NodeId>,
    },

    /// The task cannot be claimed in its current state.
    #[error("Task {id} is not ready (currently {label})")]
    NotReady {
        /// The task that was not ready
        id: NodeId,
        /// Its reported label at the time of the request
        label: TaskLabel,
    },

    /// The task is already held by an agent.
    #[error("Task {id} is already claimed by {claimant}")]
    AlreadyClaimed {
        /// The contested task
        id: NodeId,
        /// The agent currently holding the claim
        claimant: String,
    },

    /// The task is not in progress, so it cannot be completed or released.
    #[error("Task {id} is not in progress (currently {label})")]
    NotInProgress {
        /// The task that was not in progress
        id: NodeId,
        /// Its reported label at the time of the request
        label: TaskLabel,
    },

    /// Cannot delete a node that other nodes depend on.
    #[error("Cannot delete {id}: {} task(s) depend on it ({})", .dependents.len(), join_ids(.dependents))]
    HasDependents {
        /// The node that was targeted for deletion
        id: NodeId,
        /// Nodes that still depend on it
        dependents: Vec<NodeId>,
    },

    /// A node with this id already exists.
    #[error("Task already exists: {0}")]
    AlreadyExists(NodeId),

    /// The edge is already present.
    #[error("Dependency already exists: {from} -> {to}")]
    DuplicateEdge {
        /// Dependent side of the edge
        from: NodeId,
        /// Dependency side of the edge
        to: NodeId,
    },

    /// The edge to remove does not exist.
    #[error("Dependency not found: {from} -> {to}")]
    DependencyNotFound {
        /// Dependent side of the edge
        from: NodeId,
        /// Dependency side of the edge
        to: NodeId,
    },

    /// The backing store could not be read or written.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The caller passed an empty or invalid id, or omitted a required field.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Stable, machine-readable code for this error.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NodeNotFound(_) => "node_not_found",
            Self::CycleWouldForm { .. } => "cycle_would_form",
            Self::NotReady { .. } => "not_ready",
            Self::AlreadyClaimed { .. } => "already_claimed",
            Self::NotInProgress { .. } => "not_in_progress",
            Self::HasDependents { .. } => "has_dependents",
            Self::AlreadyExists(_) => "already_exists",
            Self::DuplicateEdge { .. } => "duplicate_edge",
            Self::DependencyNotFound { .. } => "dependency_not_found",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::MalformedInput(_) => "malformed_input",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
        }
    }
}

fn format_cycle(from: &NodeId, path: &[NodeId]) -> String {
    let mut parts: Vec<&str> = vec![from.as_str()];
    parts.extend(path.iter().map(NodeId::as_str));
    parts.join(" -> ")
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter().map(NodeId::as_str).collect::<Vec<_>>().join(", ")
}

/// A specialized Result type for tangle operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_the_full_loop() {
        let err = Error::CycleWouldForm {
            from: NodeId::new("t1"),
            to: NodeId::new("t2"),
            path: vec![NodeId::new("t2"), NodeId::new("t3"), NodeId::new("t1")],
        };

        assert_eq!(
            err.to_string(),
            "Edge t1 -> t2 would form a cycle: t1 -> t2 -> t3 -> t1"
        );
        assert_eq!(err.kind(), "cycle_would_form");
    }

    #[test]
    fn test_has_dependents_lists_dependents() {
        let err = Error::HasDependents {
            id: NodeId::new("base"),
            dependents: vec![NodeId::new("a"), NodeId::new("b")],
        };

        let msg = err.to_string();
        assert!(msg.contains("2 task(s)"));
        assert!(msg.contains("a, b"));
    }

    #[test]
    fn test_not_ready_reports_label() {
        let err = Error::NotReady {
            id: NodeId::new("t"),
            label: TaskLabel::Blocked,
        };
        assert_eq!(err.to_string(), "Task t is not ready (currently blocked)");
    }
}
