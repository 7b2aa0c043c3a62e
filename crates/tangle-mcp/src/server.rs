//! MCP server implementation.
//!
//! This module contains the main server setup using rmcp.

use crate::context::Context;
use crate::models::{
    AddDependencyParams, BuildGraphParams, ClaimParams, CompleteTaskParams, CreateTaskParams,
    FindPathParams, NodeParams, ReadyTasksParams, SetContextParams, TaskIdParams,
    WorkspaceParams,
};
use crate::tools::Tools;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::{
    ErrorData as McpError, ServiceExt, handler::server::ServerHandler, tool, tool_handler,
    tool_router,
};
use std::sync::Arc;
use tangle::protocol::{Request, Response};
use tokio::sync::RwLock;

/// The tangle MCP server.
///
/// Provides MCP protocol handling over stdio transport.
#[derive(Clone)]
pub struct TangleMcpServer {
    /// Shared context for workspace management.
    context: Arc<RwLock<Context>>,
    /// Tool implementations.
    tools: Arc<Tools>,
    /// Tool router for MCP dispatch.
    tool_router: ToolRouter<Self>,
}

/// Wrap an engine response as tool output.
fn respond(result: crate::Result<Response>) -> Result<CallToolResult, McpError> {
    let response = result?;
    Ok(CallToolResult::success(vec![Content::json(response)?]))
}

#[tool_router]
impl TangleMcpServer {
    /// Set the workspace context for subsequent operations.
    #[tool(
        description = "Set the workspace directory for all subsequent operations. The nearest .tangle directory at or above it is used. Call this first."
    )]
    async fn set_context(
        &self,
        Parameters(params): Parameters<SetContextParams>,
    ) -> Result<CallToolResult, McpError> {
        let response = self.tools.set_context(&params.workspace_root).await?;
        Ok(CallToolResult::success(vec![Content::json(response)?]))
    }

    /// Get current workspace context information.
    #[tool(description = "Show the current workspace and task data file. Useful for debugging.")]
    async fn where_am_i(&self) -> Result<CallToolResult, McpError> {
        let response = self.tools.where_am_i().await;
        Ok(CallToolResult::success(vec![Content::json(response)?]))
    }

    /// Build the analysis graph.
    #[tool(
        description = "Replace the workspace's analysis graph with one built from explicit edges, a file-to-imports map, and/or package manifests. Edges point from dependent to dependency."
    )]
    async fn build_graph(
        &self,
        Parameters(params): Parameters<BuildGraphParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.tools.build_graph(params).await)
    }

    /// Find cycles in the analysis graph.
    #[tool(
        description = "Find dependency cycles (strongly connected components) in the analysis graph, with size, strength and risk for each."
    )]
    async fn find_cycles(
        &self,
        Parameters(params): Parameters<WorkspaceParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.tools
                .run(Request::FindCycles, params.workspace_root.as_deref())
                .await,
        )
    }

    /// Suggest fixes for cycles.
    #[tool(
        description = "For every cycle, suggest a node to extract, the weakest edges to cut, and an order to apply the fix."
    )]
    async fn suggest_fixes(
        &self,
        Parameters(params): Parameters<WorkspaceParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.tools
                .run(Request::SuggestFixes, params.workspace_root.as_deref())
                .await,
        )
    }

    /// Blast radius of a node.
    #[tool(
        description = "List every node that depends on the given node, directly or transitively, up to a hop limit."
    )]
    async fn blast_radius(
        &self,
        Parameters(params): Parameters<NodeParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.tools.blast_radius(params).await)
    }

    /// Impact analysis of a node.
    #[tool(
        description = "Like blast_radius, with each affected node's depth and connection count and an overall severity."
    )]
    async fn impact_analysis(
        &self,
        Parameters(params): Parameters<NodeParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.tools.impact_analysis(params).await)
    }

    /// Shortest path between two nodes.
    #[tool(description = "Find the shortest dependency path from one node to another.")]
    async fn find_path(
        &self,
        Parameters(params): Parameters<FindPathParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.tools.find_path(params).await)
    }

    /// Create a task.
    #[tool(
        description = "Create a task on the board, optionally depending on existing tasks. Rejected if a dependency is unknown."
    )]
    async fn create_task(
        &self,
        Parameters(params): Parameters<CreateTaskParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.tools.create_task(params).await)
    }

    /// Claim a ready task.
    #[tool(
        description = "Claim a ready task for an agent. Exactly one of several concurrent claimants succeeds."
    )]
    async fn claim_task(
        &self,
        Parameters(params): Parameters<ClaimParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.tools.claim_task(params).await)
    }

    /// Complete a claimed task.
    #[tool(
        description = "Complete (or fail, with success=false) a claimed task. Returns the dependents that became ready."
    )]
    async fn complete_task(
        &self,
        Parameters(params): Parameters<CompleteTaskParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.tools.complete_task(params).await)
    }

    /// Release a claimed task.
    #[tool(description = "Give a claimed task back so another agent can claim it.")]
    async fn release_task(
        &self,
        Parameters(params): Parameters<ClaimParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.tools.release_task(params).await)
    }

    /// Add a dependency between tasks.
    #[tool(
        description = "Make a task wait for another. Rejected with the offending path if it would form a cycle."
    )]
    async fn add_dependency(
        &self,
        Parameters(params): Parameters<AddDependencyParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.tools.add_dependency(params).await)
    }

    /// Delete a task.
    #[tool(description = "Delete a task. Rejected while other tasks depend on it.")]
    async fn delete_task(
        &self,
        Parameters(params): Parameters<TaskIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let request = Request::DeleteTask { id: params.id };
        respond(
            self.tools
                .run(request, params.workspace_root.as_deref())
                .await,
        )
    }

    /// Show one task.
    #[tool(
        description = "Show a task with its state label (including blocked) and the dependencies it is still waiting on."
    )]
    async fn show_task(
        &self,
        Parameters(params): Parameters<TaskIdParams>,
    ) -> Result<CallToolResult, McpError> {
        let request = Request::ShowTask { id: params.id };
        respond(
            self.tools
                .run(request, params.workspace_root.as_deref())
                .await,
        )
    }

    /// Ready tasks.
    #[tool(description = "List claimable tasks, highest priority first.")]
    async fn ready_tasks(
        &self,
        Parameters(params): Parameters<ReadyTasksParams>,
    ) -> Result<CallToolResult, McpError> {
        let request = Request::ReadyTasks {
            limit: params.limit,
        };
        respond(
            self.tools
                .run(request, params.workspace_root.as_deref())
                .await,
        )
    }

    /// Blocked tasks.
    #[tool(description = "List pending tasks that have a failed task among their dependencies.")]
    async fn blocked_tasks(
        &self,
        Parameters(params): Parameters<WorkspaceParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.tools
                .run(Request::BlockedTasks, params.workspace_root.as_deref())
                .await,
        )
    }

    /// Board statistics.
    #[tool(description = "Count tasks per state on the board.")]
    async fn board_stats(
        &self,
        Parameters(params): Parameters<WorkspaceParams>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.tools
                .run(Request::BoardStats, params.workspace_root.as_deref())
                .await,
        )
    }
}

impl TangleMcpServer {
    /// Create a new tangle MCP server.
    #[must_use]
    pub fn new() -> Self {
        let context = Arc::new(RwLock::new(Context::new()));
        let tools = Arc::new(Tools::new(Arc::clone(&context)));

        Self {
            context,
            tools,
            tool_router: Self::tool_router(),
        }
    }

    /// Get a reference to the context.
    #[must_use]
    pub fn context(&self) -> &Arc<RwLock<Context>> {
        &self.context
    }

    /// Serve MCP requests over stdio until the client disconnects.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to start or shuts down
    /// abnormally.
    pub async fn run(self) -> anyhow::Result<()> {
        let service = self.serve(rmcp::transport::stdio()).await?;
        service.waiting().await?;
        Ok(())
    }
}

impl Default for TangleMcpServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_handler]
impl ServerHandler for TangleMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "tangle-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Tangle MCP server for dependency graphs and task boards. Call set_context first to set the workspace."
                    .into(),
            ),
        }
    }
}
