//! Domain types for the dependency graph engine.
//!
//! This module contains the identifiers, edge records and task types shared by
//! the graph store, the analyzers and the task board.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Default priority for new tasks when none is given.
pub const DEFAULT_PRIORITY: i64 = 0;

/// Maximum length of a node identifier.
pub const MAX_ID_LENGTH: usize = 512;

/// Opaque identifier of a node: a file path, package name or task id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new node ID without validation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a node ID from caller input, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedInput` if the id is empty after trimming or
    /// longer than [`MAX_ID_LENGTH`].
    pub fn parse(id: &str) -> Result<Self> {
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(Error::MalformedInput("node id cannot be empty".to_string()));
        }
        if trimmed.len() > MAX_ID_LENGTH {
            return Err(Error::MalformedInput(format!(
                "node id exceeds {MAX_ID_LENGTH} characters"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the ID, returning the owned string
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Relationship tag carried by typed edges (concept and task graphs).
///
/// Import and package graphs leave edges untyped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Hard dependency - the source needs the target
    DependsOn,

    /// The source implements the target
    Implements,

    /// The source generalizes the target
    Generalizes,

    /// The two endpoints conflict
    ConflictsWith,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DependsOn => "depends_on",
            Self::Implements => "implements",
            Self::Generalizes => "generalizes",
            Self::ConflictsWith => "conflicts_with",
        };
        write!(f, "{s}")
    }
}

/// A directed edge as produced by a graph builder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Source node (the dependent)
    pub from: NodeId,

    /// Target node (the dependency)
    pub to: NodeId,

    /// Optional relationship tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EdgeKind>,
}

impl Edge {
    /// Create an untyped edge.
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: None,
        }
    }

    /// Create a typed edge.
    pub fn typed(from: impl Into<NodeId>, to: impl Into<NodeId>, kind: EdgeKind) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: Some(kind),
        }
    }
}

/// Stored lifecycle state of a task.
///
/// `Blocked` is deliberately absent: it is derived at query time, see
/// [`TaskLabel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for at least one dependency to complete
    Pending,

    /// All dependencies completed and nobody holds a claim
    Ready,

    /// Claimed by an agent
    InProgress,

    /// Finished successfully
    Completed,

    /// Finished unsuccessfully
    Failed,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&TaskLabel::from(*self), f)
    }
}

/// State label reported to callers.
///
/// Mirrors [`TaskState`] and adds `Blocked`: a pending task with a failed
/// transitive dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskLabel {
    /// Waiting on incomplete dependencies
    Pending,

    /// Claimable
    Ready,

    /// Claimed by an agent
    InProgress,

    /// Finished successfully
    Completed,

    /// Finished unsuccessfully
    Failed,

    /// Pending behind a failed dependency
    Blocked,
}

impl From<TaskState> for TaskLabel {
    fn from(state: TaskState) -> Self {
        match state {
            TaskState::Pending => Self::Pending,
            TaskState::Ready => Self::Ready,
            TaskState::InProgress => Self::InProgress,
            TaskState::Completed => Self::Completed,
            TaskState::Failed => Self::Failed,
        }
    }
}

impl fmt::Display for TaskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "ready" => Ok(Self::Ready),
            "in_progress" | "in-progress" | "claimed" => Ok(Self::InProgress),
            "completed" | "done" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "blocked" => Ok(Self::Blocked),
            other => Err(Error::MalformedInput(format!(
                "unknown task state '{other}' (expected pending, ready, in_progress, completed, failed or blocked)"
            ))),
        }
    }
}

/// A unit of work on the task board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: NodeId,

    /// Free-form description
    #[serde(default)]
    pub description: String,

    /// Priority (higher = more urgent)
    #[serde(default)]
    pub priority: i64,

    /// Stored lifecycle state
    pub state: TaskState,

    /// Tasks this task waits for
    #[serde(default)]
    pub dependencies: Vec<NodeId>,

    /// Agent currently (or last) holding the claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimant: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// When the current claim was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,

    /// When the task reached a terminal state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Opaque payload recorded on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

/// Data for creating a new task
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Task id (caller-chosen)
    pub id: String,

    /// Description
    pub description: String,

    /// Priority (higher = more urgent)
    pub priority: i64,

    /// Ids of tasks this one depends on
    pub dependencies: Vec<String>,
}

impl NewTask {
    /// Create a task request with no dependencies and default priority.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            priority: DEFAULT_PRIORITY,
            ..Self::default()
        }
    }

    /// Set the dependencies.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Filter for querying tasks
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Filter by reported label
    pub label: Option<TaskLabel>,

    /// Filter by claimant
    pub claimant: Option<String>,

    /// Limit number of results
    pub limit: Option<usize>,
}

/// A task together with its derived label, as returned by queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    /// The stored task
    #[serde(flatten)]
    pub task: Task,

    /// Reported label (may be `blocked`)
    pub label: TaskLabel,

    /// Dependencies that are not yet completed
    pub waiting_on: Vec<NodeId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("a", "a")]
    #[case::trimmed("  src/lib.rs \n", "src/lib.rs")]
    fn test_parse_node_id(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(NodeId::parse(input).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case::empty("")]
    #[case::whitespace("   ")]
    fn test_parse_node_id_rejects_blank(#[case] input: &str) {
        assert!(matches!(
            NodeId::parse(input),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_parse_node_id_rejects_oversized() {
        let long = "x".repeat(MAX_ID_LENGTH + 1);
        assert!(NodeId::parse(&long).is_err());
    }

    #[test]
    fn test_task_state_serializes_snake_case() {
        let json = serde_json::to_string(&TaskState::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[rstest]
    #[case::claimed("claimed", TaskLabel::InProgress)]
    #[case::hyphen("in-progress", TaskLabel::InProgress)]
    #[case::upper("BLOCKED", TaskLabel::Blocked)]
    #[case::done("done", TaskLabel::Completed)]
    fn test_parse_label(#[case] input: &str, #[case] expected: TaskLabel) {
        assert_eq!(input.parse::<TaskLabel>().unwrap(), expected);
    }

    #[test]
    fn test_edge_kind_is_optional_on_the_wire() {
        let edge: Edge = serde_json::from_str(r#"{"from":"a","to":"b"}"#).unwrap();
        assert_eq!(edge, Edge::new("a", "b"));

        let typed: Edge =
            serde_json::from_str(r#"{"from":"a","to":"b","kind":"conflicts_with"}"#).unwrap();
        assert_eq!(typed.kind, Some(EdgeKind::ConflictsWith));
    }
}
