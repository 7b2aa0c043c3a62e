//! MCP tool implementations.
//!
//! Every graph and task tool turns its parameters into a protocol
//! [`Request`] and runs it through the workspace's [`Engine`].

use crate::context::Context;
use crate::error::Result;
use crate::models::{
    AddDependencyParams, BuildGraphParams, ClaimParams, CompleteTaskParams, CreateTaskParams,
    FindPathParams, NodeParams, SetContextResponse, WhereAmIResponse,
};
use std::path::Path;
use std::sync::Arc;
use tangle::domain::{DEFAULT_PRIORITY, Edge};
use tangle::engine::Engine;
use tangle::protocol::{Request, Response};
use tokio::sync::RwLock;
use tracing::debug;

/// Tool implementations for the tangle MCP server.
pub struct Tools {
    context: Arc<RwLock<Context>>,
}

impl Tools {
    /// Create a new Tools instance with the given context.
    pub fn new(context: Arc<RwLock<Context>>) -> Self {
        Self { context }
    }

    /// Set the workspace context.
    ///
    /// The given directory may be anywhere inside the workspace.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or no `.tangle/` directory is
    /// found at or above it.
    pub async fn set_context(&self, workspace_root: &str) -> Result<SetContextResponse> {
        let path = Path::new(workspace_root);
        let mut context = self.context.write().await;
        let info = context.discover_and_set_workspace(path).await?;

        Ok(SetContextResponse {
            workspace_root: info.workspace_root.display().to_string(),
            data_path: info.data_path.map(|p| p.display().to_string()),
            message: "Context set successfully".to_string(),
        })
    }

    /// Get current workspace information.
    pub async fn where_am_i(&self) -> WhereAmIResponse {
        let context = self.context.read().await;

        WhereAmIResponse {
            workspace_root: context
                .current_workspace()
                .map(|p| p.display().to_string()),
            data_path: context.current_data_path().map(|p| p.display().to_string()),
            context_set: context.current_workspace().is_some(),
        }
    }

    /// Look up the engine, releasing the context lock before returning.
    async fn engine(&self, workspace_root: Option<&str>) -> Result<Arc<Engine>> {
        let context = self.context.read().await;
        context.engine_for(workspace_root.map(Path::new))
    }

    /// Run one request against a workspace engine.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set or the engine rejects the
    /// request.
    pub async fn run(&self, request: Request, workspace_root: Option<&str>) -> Result<Response> {
        let engine = self.engine(workspace_root).await?;
        debug!(action = request.action(), "running tool request");
        Ok(engine.handle(request).await?)
    }

    /// Replace the workspace's analysis graph.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set or an input is malformed.
    pub async fn build_graph(&self, params: BuildGraphParams) -> Result<Response> {
        let request = Request::Build {
            edges: params
                .edges
                .into_iter()
                .map(|e| Edge {
                    from: e.from.into(),
                    to: e.to.into(),
                    kind: e.kind.map(Into::into),
                })
                .collect(),
            imports: params.imports,
            manifests: params.manifests,
            internal_only: params.internal_only,
        };
        self.run(request, params.workspace_root.as_deref()).await
    }

    /// Nodes that depend on a node.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set or the node is unknown.
    pub async fn blast_radius(&self, params: NodeParams) -> Result<Response> {
        let request = Request::BlastRadius {
            node: params.node,
            max_depth: params.max_depth,
        };
        self.run(request, params.workspace_root.as_deref()).await
    }

    /// Blast radius with connection counts and severity.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set or the node is unknown.
    pub async fn impact_analysis(&self, params: NodeParams) -> Result<Response> {
        let request = Request::ImpactAnalysis {
            node: params.node,
            max_depth: params.max_depth,
        };
        self.run(request, params.workspace_root.as_deref()).await
    }

    /// Shortest dependency path between two nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set or an endpoint is unknown.
    pub async fn find_path(&self, params: FindPathParams) -> Result<Response> {
        let request = Request::FindPath {
            from: params.from,
            to: params.to,
            max_depth: params.max_depth,
        };
        self.run(request, params.workspace_root.as_deref()).await
    }

    /// Add a task to the board.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set, the id is taken, or a
    /// dependency is unknown.
    pub async fn create_task(&self, params: CreateTaskParams) -> Result<Response> {
        let request = Request::CreateTask {
            id: params.id,
            description: params.description.unwrap_or_default(),
            priority: params.priority.unwrap_or(DEFAULT_PRIORITY),
            dependencies: params.dependencies,
        };
        self.run(request, params.workspace_root.as_deref()).await
    }

    /// Claim a ready task.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set or the task is not ready.
    pub async fn claim_task(&self, params: ClaimParams) -> Result<Response> {
        let request = Request::ClaimTask {
            id: params.id,
            agent: params.agent,
        };
        self.run(request, params.workspace_root.as_deref()).await
    }

    /// Finish a claimed task.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set or the task is not in progress.
    pub async fn complete_task(&self, params: CompleteTaskParams) -> Result<Response> {
        let request = Request::CompleteTask {
            id: params.id,
            result: params.result,
            success: params.success.unwrap_or(true),
            agent: params.agent,
        };
        self.run(request, params.workspace_root.as_deref()).await
    }

    /// Give a claimed task back.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set or the agent does not hold the
    /// claim.
    pub async fn release_task(&self, params: ClaimParams) -> Result<Response> {
        let request = Request::ReleaseTask {
            id: params.id,
            agent: params.agent,
        };
        self.run(request, params.workspace_root.as_deref()).await
    }

    /// Make one task wait for another.
    ///
    /// # Errors
    ///
    /// Returns an error if no context is set, a task is unknown, or the edge
    /// would form a cycle.
    pub async fn add_dependency(&self, params: AddDependencyParams) -> Result<Response> {
        let request = Request::AddDependency {
            id: params.id,
            depends_on: params.depends_on,
        };
        self.run(request, params.workspace_root.as_deref()).await
    }
}
