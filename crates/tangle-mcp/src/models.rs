//! MCP request parameters and response models.
//!
//! Parameter types derive `JsonSchema` so rmcp can publish an input schema
//! for every tool. Engine responses are returned as the protocol's own JSON,
//! so only the context tools have dedicated response types here.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tangle::domain::EdgeKind;

/// Parameters for the `set_context` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SetContextParams {
    /// Directory inside the workspace (the nearest `.tangle/` above it is used).
    pub workspace_root: String,
}

/// Parameters for tools that only need a workspace.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct WorkspaceParams {
    /// Workspace to use instead of the current context.
    #[serde(default)]
    pub workspace_root: Option<String>,
}

/// One directed edge: `from` depends on `to`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EdgeParam {
    /// Dependent node.
    pub from: String,

    /// Dependency node.
    pub to: String,

    /// Optional relationship tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EdgeKindParam>,
}

/// Relationship tag of an edge, as accepted by the tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKindParam {
    /// The source needs the target.
    DependsOn,
    /// The source implements the target.
    Implements,
    /// The source generalizes the target.
    Generalizes,
    /// The endpoints conflict.
    ConflictsWith,
}

impl From<EdgeKindParam> for EdgeKind {
    fn from(kind: EdgeKindParam) -> Self {
        match kind {
            EdgeKindParam::DependsOn => Self::DependsOn,
            EdgeKindParam::Implements => Self::Implements,
            EdgeKindParam::Generalizes => Self::Generalizes,
            EdgeKindParam::ConflictsWith => Self::ConflictsWith,
        }
    }
}

/// Parameters for the `build_graph` tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct BuildGraphParams {
    /// Explicit edges.
    #[serde(default)]
    pub edges: Vec<EdgeParam>,

    /// Map of source file to the files it imports.
    #[serde(default)]
    pub imports: BTreeMap<String, Vec<String>>,

    /// `package.json`-style manifests (objects with `name` and `dependencies`).
    #[serde(default)]
    pub manifests: Vec<serde_json::Value>,

    /// Ignore manifest dependencies on packages not among `manifests`.
    #[serde(default)]
    pub internal_only: bool,

    /// Workspace to use instead of the current context.
    #[serde(default)]
    pub workspace_root: Option<String>,
}

/// Parameters for `blast_radius` and `impact_analysis`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NodeParams {
    /// Node to analyze.
    pub node: String,

    /// Hop limit (workspace default when omitted).
    #[serde(default)]
    pub max_depth: Option<usize>,

    /// Workspace to use instead of the current context.
    #[serde(default)]
    pub workspace_root: Option<String>,
}

/// Parameters for the `find_path` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FindPathParams {
    /// Start node.
    pub from: String,

    /// End node.
    pub to: String,

    /// Hop limit (workspace default when omitted).
    #[serde(default)]
    pub max_depth: Option<usize>,

    /// Workspace to use instead of the current context.
    #[serde(default)]
    pub workspace_root: Option<String>,
}

/// Parameters for the `create_task` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CreateTaskParams {
    /// Task id (must be unique on the board).
    pub id: String,

    /// What the task is about.
    #[serde(default)]
    pub description: Option<String>,

    /// Priority, higher is more urgent (default 0).
    #[serde(default)]
    pub priority: Option<i64>,

    /// Ids of existing tasks this one waits for.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Workspace to use instead of the current context.
    #[serde(default)]
    pub workspace_root: Option<String>,
}

/// Parameters for `claim_task` and `release_task`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ClaimParams {
    /// Task id.
    pub id: String,

    /// Agent taking or giving back the claim.
    pub agent: String,

    /// Workspace to use instead of the current context.
    #[serde(default)]
    pub workspace_root: Option<String>,
}

/// Parameters for the `complete_task` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CompleteTaskParams {
    /// Task id.
    pub id: String,

    /// `false` marks the task failed; defaults to `true`.
    #[serde(default)]
    pub success: Option<bool>,

    /// Arbitrary result payload stored with the task.
    #[serde(default)]
    pub result: Option<serde_json::Value>,

    /// Agent finishing the task; must match the claimant when given.
    #[serde(default)]
    pub agent: Option<String>,

    /// Workspace to use instead of the current context.
    #[serde(default)]
    pub workspace_root: Option<String>,
}

/// Parameters for the `add_dependency` tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AddDependencyParams {
    /// Dependent task.
    pub id: String,

    /// Task it should wait for.
    pub depends_on: String,

    /// Workspace to use instead of the current context.
    #[serde(default)]
    pub workspace_root: Option<String>,
}

/// Parameters for tools addressing one task (`show_task`, `delete_task`).
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TaskIdParams {
    /// Task id.
    pub id: String,

    /// Workspace to use instead of the current context.
    #[serde(default)]
    pub workspace_root: Option<String>,
}

/// Parameters for the `ready_tasks` tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ReadyTasksParams {
    /// Maximum number of tasks to return.
    #[serde(default)]
    pub limit: Option<usize>,

    /// Workspace to use instead of the current context.
    #[serde(default)]
    pub workspace_root: Option<String>,
}

/// Response from the `set_context` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SetContextResponse {
    /// The workspace root that was set.
    pub workspace_root: String,

    /// The task data file, if the board is file-backed.
    pub data_path: Option<String>,

    /// Status message.
    pub message: String,
}

/// Response from the `where_am_i` tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WhereAmIResponse {
    /// The current workspace root, if set.
    pub workspace_root: Option<String>,

    /// The current data file, if set and file-backed.
    pub data_path: Option<String>,

    /// Whether a context is currently set.
    pub context_set: bool,
}
