//! Request/response protocol for the engine.
//!
//! Every operation the engine exposes is a variant of [`Request`], tagged on
//! the wire by `action`:
//!
//! ```json
//! {"action": "claim_task", "id": "t1", "agent": "worker-1"}
//! ```
//!
//! Results come back as a [`Reply`]: either `{"ok": {"kind": ..., "data":
//! ...}}` or `{"rejected": {"error": "cycle_would_form", "reason": "..."}}`.
//! The reason names the constraint that was violated, so a caller can retry
//! with different input.

use crate::board::{BlockedTask, BoardStats, Completion, StorageStatus};
use crate::domain::{Edge, NodeId, Task, TaskLabel, TaskView};
use crate::error::Error;
use crate::graph::{
    BlastRadius, BuildReport, Cycle, FixSuggestion, GraphStats, Impact, PathOutcome,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_success() -> bool {
    true
}

/// An operation on the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    /// Replace the analysis graph with one built from the given sources.
    Build {
        /// Explicit edges
        #[serde(default)]
        edges: Vec<Edge>,
        /// `file -> imported files`
        #[serde(default)]
        imports: BTreeMap<String, Vec<String>>,
        /// `package.json`-style manifests
        #[serde(default)]
        manifests: Vec<serde_json::Value>,
        /// Ignore manifest dependencies on packages not in `manifests`
        #[serde(default)]
        internal_only: bool,
    },

    /// Cycles in the analysis graph.
    FindCycles,

    /// Fix suggestions for every cycle in the analysis graph.
    SuggestFixes,

    /// Nodes that depend on `node`, split into direct and transitive.
    BlastRadius {
        /// Target node
        node: String,
        /// Hop limit (engine default when omitted)
        #[serde(default)]
        max_depth: Option<usize>,
    },

    /// Blast radius with per-node connection counts and a severity.
    ImpactAnalysis {
        /// Target node
        node: String,
        /// Hop limit (engine default when omitted)
        #[serde(default)]
        max_depth: Option<usize>,
    },

    /// Shortest forward path between two nodes.
    FindPath {
        /// Start node
        from: String,
        /// End node
        to: String,
        /// Hop limit (engine default when omitted)
        #[serde(default)]
        max_depth: Option<usize>,
    },

    /// Dependency-respecting order of a subset of nodes.
    TopoOrder {
        /// Nodes to order
        nodes: Vec<String>,
    },

    /// Record that an existing edge was observed again.
    Strengthen {
        /// Edge source
        from: String,
        /// Edge target
        to: String,
    },

    /// Counts for the analysis graph.
    GraphStats,

    /// Add a task to the board.
    CreateTask {
        /// Task id
        id: String,
        /// Free-form description
        #[serde(default)]
        description: String,
        /// Priority (higher = more urgent)
        #[serde(default)]
        priority: i64,
        /// Ids of tasks this one waits for
        #[serde(default)]
        dependencies: Vec<String>,
    },

    /// Claim a ready task.
    ClaimTask {
        /// Task id
        id: String,
        /// Claiming agent
        agent: String,
    },

    /// Finish a claimed task.
    CompleteTask {
        /// Task id
        id: String,
        /// Opaque result payload
        #[serde(default)]
        result: Option<serde_json::Value>,
        /// `false` marks the task failed
        #[serde(default = "default_success")]
        success: bool,
        /// When given, must match the claimant
        #[serde(default)]
        agent: Option<String>,
    },

    /// Give a claimed task back to the ready pool.
    ReleaseTask {
        /// Task id
        id: String,
        /// Agent holding the claim
        agent: String,
    },

    /// Make `id` wait for `depends_on`.
    AddDependency {
        /// Dependent task
        id: String,
        /// Task to wait for
        depends_on: String,
    },

    /// Remove a dependency edge.
    RemoveDependency {
        /// Dependent task
        id: String,
        /// Task it currently waits for
        depends_on: String,
    },

    /// Remove a task nothing depends on.
    DeleteTask {
        /// Task id
        id: String,
    },

    /// One task with its label and unmet dependencies.
    ShowTask {
        /// Task id
        id: String,
    },

    /// Tasks matching a filter.
    ListTasks {
        /// Reported label
        #[serde(default)]
        label: Option<TaskLabel>,
        /// Claiming agent
        #[serde(default)]
        claimant: Option<String>,
        /// Maximum number of tasks
        #[serde(default)]
        limit: Option<usize>,
    },

    /// Claimable tasks, most urgent first.
    ReadyTasks {
        /// Maximum number of tasks
        #[serde(default)]
        limit: Option<usize>,
    },

    /// Pending tasks stuck behind a failure.
    BlockedTasks,

    /// Task counts per label.
    BoardStats,

    /// Tasks that transitively wait for `id`.
    TaskBlastRadius {
        /// Task id
        id: String,
    },

    /// Persistence health.
    StorageStatus,
}

impl Request {
    /// The wire name of this request's action.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::Build { .. } => "build",
            Self::FindCycles => "find_cycles",
            Self::SuggestFixes => "suggest_fixes",
            Self::BlastRadius { .. } => "blast_radius",
            Self::ImpactAnalysis { .. } => "impact_analysis",
            Self::FindPath { .. } => "find_path",
            Self::TopoOrder { .. } => "topo_order",
            Self::Strengthen { .. } => "strengthen",
            Self::GraphStats => "graph_stats",
            Self::CreateTask { .. } => "create_task",
            Self::ClaimTask { .. } => "claim_task",
            Self::CompleteTask { .. } => "complete_task",
            Self::ReleaseTask { .. } => "release_task",
            Self::AddDependency { .. } => "add_dependency",
            Self::RemoveDependency { .. } => "remove_dependency",
            Self::DeleteTask { .. } => "delete_task",
            Self::ShowTask { .. } => "show_task",
            Self::ListTasks { .. } => "list_tasks",
            Self::ReadyTasks { .. } => "ready_tasks",
            Self::BlockedTasks => "blocked_tasks",
            Self::BoardStats => "board_stats",
            Self::TaskBlastRadius { .. } => "task_blast_radius",
            Self::StorageStatus => "storage_status",
        }
    }

    /// Whether the request changes engine state.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Build { .. }
                | Self::Strengthen { .. }
                | Self::CreateTask { .. }
                | Self::ClaimTask { .. }
                | Self::CompleteTask { .. }
                | Self::ReleaseTask { .. }
                | Self::AddDependency { .. }
                | Self::RemoveDependency { .. }
                | Self::DeleteTask { .. }
        )
    }
}

/// Successful result of a [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Response {
    /// `build`
    Built(BuildReport),
    /// `find_cycles`
    Cycles(Vec<Cycle>),
    /// `suggest_fixes`
    Fixes(Vec<FixSuggestion>),
    /// `blast_radius` and `task_blast_radius`
    BlastRadius(BlastRadius),
    /// `impact_analysis`
    Impact(Impact),
    /// `find_path`
    Path(PathOutcome),
    /// `topo_order`
    Order(Vec<NodeId>),
    /// `strengthen`
    Strength {
        /// Edge source
        from: NodeId,
        /// Edge target
        to: NodeId,
        /// Observation count after the update
        strength: u32,
    },
    /// `graph_stats`
    GraphStats(GraphStats),
    /// Single-task mutations
    Task(Task),
    /// `complete_task`
    Completion(Completion),
    /// `show_task`
    TaskView(TaskView),
    /// `list_tasks`
    Tasks(Vec<TaskView>),
    /// `ready_tasks`
    Ready(Vec<Task>),
    /// `blocked_tasks`
    Blocked(Vec<BlockedTask>),
    /// `board_stats`
    BoardStats(BoardStats),
    /// `storage_status`
    StorageStatus(StorageStatus),
}

/// A request that was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Stable error code (see [`Error::kind`])
    pub error: String,

    /// Human-readable reason naming the violated constraint
    pub reason: String,
}

impl From<&Error> for Rejection {
    fn from(err: &Error) -> Self {
        Self {
            error: err.kind().to_string(),
            reason: err.to_string(),
        }
    }
}

/// Outcome of a request as sent back to protocol clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    /// The request succeeded
    Ok(Response),
    /// The request was refused; nothing changed
    Rejected(Rejection),
}

impl Reply {
    /// Whether the request succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

impl From<crate::error::Result<Response>> for Reply {
    fn from(result: crate::error::Result<Response>) -> Self {
        match result {
            Ok(response) => Self::Ok(response),
            Err(err) => Self::Rejected(Rejection::from(&err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn test_request_parses_tagged_action() {
        let request: Request =
            serde_json::from_value(json!({"action": "claim_task", "id": "t1", "agent": "a"}))
                .unwrap();

        assert_eq!(
            request,
            Request::ClaimTask {
                id: "t1".to_string(),
                agent: "a".to_string(),
            }
        );
        assert!(request.is_mutation());
    }

    #[test]
    fn test_unit_request_needs_only_the_tag() {
        let request: Request = serde_json::from_value(json!({"action": "find_cycles"})).unwrap();
        assert_eq!(request, Request::FindCycles);
        assert!(!request.is_mutation());
    }

    #[test]
    fn test_complete_task_defaults_to_success() {
        let request: Request =
            serde_json::from_value(json!({"action": "complete_task", "id": "t1"})).unwrap();

        match request {
            Request::CompleteTask {
                success,
                result,
                agent,
                ..
            } => {
                assert!(success);
                assert!(result.is_none());
                assert!(agent.is_none());
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn test_unknown_action_is_a_parse_error() {
        let result: Result<Request, _> = serde_json::from_value(json!({"action": "explode"}));
        assert!(result.is_err());
    }

    #[rstest]
    #[case::build(json!({"action": "build", "edges": [{"from": "a", "to": "b"}]}), "build")]
    #[case::topo(json!({"action": "topo_order", "nodes": ["a"]}), "topo_order")]
    #[case::list(json!({"action": "list_tasks", "label": "blocked"}), "list_tasks")]
    #[case::status(json!({"action": "storage_status"}), "storage_status")]
    fn test_action_name_matches_wire_tag(#[case] value: serde_json::Value, #[case] tag: &str) {
        let request: Request = serde_json::from_value(value).unwrap();
        assert_eq!(request.action(), tag);

        let back = serde_json::to_value(&request).unwrap();
        assert_eq!(back["action"], tag);
    }

    #[test]
    fn test_rejection_reply_shape() {
        let err = Error::NodeNotFound(NodeId::new("ghost"));
        let reply = Reply::from(Err(err));

        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["rejected"]["error"], "node_not_found");
        assert_eq!(value["rejected"]["reason"], "Node not found: ghost");
        assert!(!reply.is_ok());
    }

    #[test]
    fn test_ok_reply_shape() {
        let reply = Reply::Ok(Response::Order(vec![NodeId::new("a"), NodeId::new("b")]));

        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value, json!({"ok": {"kind": "order", "data": ["a", "b"]}}));
    }
}
