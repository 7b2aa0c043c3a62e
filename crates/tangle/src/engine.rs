//! The engine: one analysis graph and one task board behind the protocol.
//!
//! An [`Engine`] is constructed explicitly and owned by whoever serves
//! requests (the CLI for one invocation, the MCP server per workspace). It
//! holds two independent critical sections:
//!
//! - the observational analysis graph, under a `tokio::sync::RwLock`
//! - the task board, inside a [`SharedBoard`]
//!
//! # Example
//!
//! ```
//! use tangle::engine::Engine;
//! use tangle::protocol::{Request, Response};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> tangle::error::Result<()> {
//!     let engine = Engine::in_memory();
//!     engine
//!         .handle(Request::CreateTask {
//!             id: "t1".into(),
//!             description: String::new(),
//!             priority: 0,
//!             dependencies: vec![],
//!         })
//!         .await?;
//!
//!     let response = engine.handle(Request::ReadyTasks { limit: None }).await?;
//!     assert!(matches!(response, Response::Ready(tasks) if tasks.len() == 1));
//!     Ok(())
//! }
//! ```

use crate::board::SharedBoard;
use crate::commands::init::TangleConfig;
use crate::domain::{Edge, NewTask, NodeId, TaskFilter};
use crate::error::Result;
use crate::graph::{
    self, GraphBuilder, GraphStore, ImportMap, PackageManifest, WorkspaceManifests,
};
use crate::protocol::{Reply, Request, Response};
use crate::storage::create_store;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

/// Explicitly constructed graph engine.
#[derive(Debug)]
pub struct Engine {
    graph: RwLock<GraphStore>,
    board: SharedBoard,
    max_depth: usize,
}

impl Engine {
    /// Wrap an existing board with an empty analysis graph.
    #[must_use]
    pub fn new(board: SharedBoard, max_depth: usize) -> Self {
        Self {
            graph: RwLock::new(GraphStore::observational()),
            board,
            max_depth,
        }
    }

    /// An engine whose board lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(SharedBoard::in_memory(), graph::DEFAULT_MAX_DEPTH)
    }

    /// Open the workspace rooted at `root` with the given configuration.
    ///
    /// An unreadable data file does not fail the open; the board starts
    /// empty and reports the problem through `storage_status`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configured backend is unknown.
    pub async fn open(config: &TangleConfig, root: &Path) -> Result<Self> {
        config.validate()?;
        let backend = config.to_backend(root)?;
        let store = create_store(backend);
        let board = SharedBoard::open(store, config.graph.max_depth).await;
        info!(root = %root.display(), "engine opened");
        Ok(Self::new(board, config.graph.max_depth))
    }

    /// The task board.
    #[must_use]
    pub fn board(&self) -> &SharedBoard {
        &self.board
    }

    /// Default hop limit for reachability queries.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Shared read access to the analysis graph.
    pub async fn graph(&self) -> RwLockReadGuard<'_, GraphStore> {
        self.graph.read().await
    }

    /// Replace the analysis graph.
    pub async fn replace_graph(&self, store: GraphStore) {
        *self.graph.write().await = store;
    }

    /// Run a request, turning failures into a structured rejection.
    pub async fn respond(&self, request: Request) -> Reply {
        let action = request.action();
        let reply = Reply::from(self.handle(request).await);
        if let Reply::Rejected(rejection) = &reply {
            debug!(action, error = %rejection.error, reason = %rejection.reason, "request rejected");
        }
        reply
    }

    /// Run a request.
    ///
    /// # Errors
    ///
    /// Returns the error of the underlying operation. Nothing is changed when
    /// an error is returned.
    pub async fn handle(&self, request: Request) -> Result<Response> {
        debug!(action = request.action(), "handling request");

        match request {
            Request::Build {
                edges,
                imports,
                manifests,
                internal_only,
            } => self.build(edges, imports, manifests, internal_only).await,

            Request::FindCycles => Ok(Response::Cycles(graph::find_cycles(
                &*self.graph.read().await,
            ))),

            Request::SuggestFixes => Ok(Response::Fixes(graph::suggest_fixes(
                &*self.graph.read().await,
            ))),

            Request::BlastRadius { node, max_depth } => {
                let node = NodeId::parse(&node)?;
                let depth = self.depth(max_depth);
                let radius = graph::blast_radius(&*self.graph.read().await, &node, depth)?;
                Ok(Response::BlastRadius(radius))
            }

            Request::ImpactAnalysis { node, max_depth } => {
                let node = NodeId::parse(&node)?;
                let depth = self.depth(max_depth);
                let impact = graph::impact_analysis(&*self.graph.read().await, &node, depth)?;
                Ok(Response::Impact(impact))
            }

            Request::FindPath { from, to, max_depth } => {
                let from = NodeId::parse(&from)?;
                let to = NodeId::parse(&to)?;
                let depth = self.depth(max_depth);
                let outcome = graph::find_path(&*self.graph.read().await, &from, &to, depth)?;
                Ok(Response::Path(outcome))
            }

            Request::TopoOrder { nodes } => {
                let nodes = parse_ids(&nodes)?;
                let order = graph::topo_order(&*self.graph.read().await, &nodes)?;
                Ok(Response::Order(order))
            }

            Request::Strengthen { from, to } => {
                let from = NodeId::parse(&from)?;
                let to = NodeId::parse(&to)?;
                let strength = self.graph.write().await.strengthen(&from, &to)?;
                Ok(Response::Strength { from, to, strength })
            }

            Request::GraphStats => Ok(Response::GraphStats(self.graph.read().await.stats())),

            Request::CreateTask {
                id,
                description,
                priority,
                dependencies,
            } => {
                let new_task = NewTask::new(id)
                    .with_description(description)
                    .with_priority(priority)
                    .with_dependencies(dependencies);
                Ok(Response::Task(self.board.create(new_task).await?))
            }

            Request::ClaimTask { id, agent } => {
                let id = NodeId::parse(&id)?;
                Ok(Response::Task(self.board.claim(&id, &agent).await?))
            }

            Request::CompleteTask {
                id,
                result,
                success,
                agent,
            } => {
                let id = NodeId::parse(&id)?;
                let completion = self
                    .board
                    .complete(&id, result, success, agent.as_deref())
                    .await?;
                Ok(Response::Completion(completion))
            }

            Request::ReleaseTask { id, agent } => {
                let id = NodeId::parse(&id)?;
                Ok(Response::Task(self.board.release(&id, &agent).await?))
            }

            Request::AddDependency { id, depends_on } => {
                let id = NodeId::parse(&id)?;
                let dependency = NodeId::parse(&depends_on)?;
                Ok(Response::Task(
                    self.board.add_dependency(&id, &dependency).await?,
                ))
            }

            Request::RemoveDependency { id, depends_on } => {
                let id = NodeId::parse(&id)?;
                let dependency = NodeId::parse(&depends_on)?;
                Ok(Response::Task(
                    self.board.remove_dependency(&id, &dependency).await?,
                ))
            }

            Request::DeleteTask { id } => {
                let id = NodeId::parse(&id)?;
                Ok(Response::Task(self.board.delete(&id).await?))
            }

            Request::ShowTask { id } => {
                let id = NodeId::parse(&id)?;
                Ok(Response::TaskView(self.board.read().await.view(&id)?))
            }

            Request::ListTasks {
                label,
                claimant,
                limit,
            } => {
                let filter = TaskFilter {
                    label,
                    claimant,
                    limit,
                };
                Ok(Response::Tasks(self.board.read().await.list(&filter)))
            }

            Request::ReadyTasks { limit } => {
                Ok(Response::Ready(self.board.read().await.ready(limit)))
            }

            Request::BlockedTasks => Ok(Response::Blocked(self.board.read().await.blocked())),

            Request::BoardStats => Ok(Response::BoardStats(self.board.read().await.stats())),

            Request::TaskBlastRadius { id } => {
                let id = NodeId::parse(&id)?;
                Ok(Response::BlastRadius(
                    self.board.read().await.blast_radius(&id)?,
                ))
            }

            Request::StorageStatus => Ok(Response::StorageStatus(self.board.status().await)),
        }
    }

    async fn build(
        &self,
        edges: Vec<Edge>,
        imports: BTreeMap<String, Vec<String>>,
        manifests: Vec<serde_json::Value>,
        internal_only: bool,
    ) -> Result<Response> {
        let mut builder = GraphBuilder::new();
        if !edges.is_empty() {
            builder.add_edges(edges)?;
        }
        if !imports.is_empty() {
            builder.add_source(&ImportMap::new("imports", imports))?;
        }
        if !manifests.is_empty() {
            let manifests = manifests
                .into_iter()
                .map(PackageManifest::from_value)
                .collect::<Result<Vec<_>>>()?;
            let mut workspace = WorkspaceManifests::new(manifests);
            if internal_only {
                workspace = workspace.internal_only();
            }
            builder.add_source(&workspace)?;
        }

        let (store, report) = builder.finish();
        self.replace_graph(store).await;
        info!(
            nodes = report.nodes,
            edges = report.edges,
            duplicates = report.duplicate_edges,
            "analysis graph rebuilt"
        );
        Ok(Response::Built(report))
    }

    fn depth(&self, requested: Option<usize>) -> usize {
        requested.filter(|d| *d > 0).unwrap_or(self.max_depth)
    }
}

fn parse_ids(ids: &[String]) -> Result<Vec<NodeId>> {
    ids.iter().map(|id| NodeId::parse(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskState;
    use crate::graph::{PathOutcome, Risk};
    use crate::protocol::Rejection;
    use serde_json::json;
    use tempfile::TempDir;

    fn edges(pairs: &[(&str, &str)]) -> Vec<Edge> {
        pairs.iter().map(|(f, t)| Edge::new(*f, *t)).collect()
    }

    async fn engine_with_graph(pairs: &[(&str, &str)]) -> Engine {
        let engine = Engine::in_memory();
        engine
            .handle(Request::Build {
                edges: edges(pairs),
                imports: BTreeMap::new(),
                manifests: Vec::new(),
                internal_only: false,
            })
            .await
            .unwrap();
        engine
    }

    fn create(id: &str, deps: &[&str]) -> Request {
        Request::CreateTask {
            id: id.to_string(),
            description: String::new(),
            priority: 0,
            dependencies: deps.iter().map(|d| (*d).to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_build_then_find_cycles() {
        let engine = engine_with_graph(&[("a", "b"), ("b", "c"), ("c", "a")]).await;

        let Response::Cycles(cycles) = engine.handle(Request::FindCycles).await.unwrap() else {
            panic!("expected cycles");
        };

        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].size, 3);
        assert_eq!(cycles[0].risk, Risk::Low);
    }

    #[tokio::test]
    async fn test_build_replaces_previous_graph() {
        let engine = engine_with_graph(&[("a", "b")]).await;
        engine
            .handle(Request::Build {
                edges: edges(&[("x", "y")]),
                imports: BTreeMap::new(),
                manifests: Vec::new(),
                internal_only: false,
            })
            .await
            .unwrap();

        let graph = engine.graph().await;
        assert!(!graph.contains(&NodeId::new("a")));
        assert!(graph.contains(&NodeId::new("x")));
    }

    #[tokio::test]
    async fn test_build_from_manifests() {
        let engine = Engine::in_memory();
        let response = engine
            .handle(Request::Build {
                edges: Vec::new(),
                imports: BTreeMap::new(),
                manifests: vec![
                    json!({"name": "A", "dependencies": {"B": "^1.0"}}),
                    json!({"name": "B", "dependencies": {"C": "*"}}),
                    json!({"name": "C", "devDependencies": {"jest": "29"}}),
                ],
                internal_only: true,
            })
            .await
            .unwrap();
        assert!(matches!(response, Response::Built(report) if report.edges == 2));

        let Response::BlastRadius(radius) = engine
            .handle(Request::BlastRadius {
                node: "C".into(),
                max_depth: None,
            })
            .await
            .unwrap()
        else {
            panic!("expected blast radius");
        };
        assert_eq!(radius.direct, vec![NodeId::new("B")]);
        assert_eq!(radius.transitive, vec![NodeId::new("A")]);
    }

    #[tokio::test]
    async fn test_find_path_and_missing_node() {
        let engine = engine_with_graph(&[("a", "b"), ("b", "c")]).await;

        let response = engine
            .handle(Request::FindPath {
                from: "a".into(),
                to: "c".into(),
                max_depth: None,
            })
            .await
            .unwrap();
        assert_eq!(
            response,
            Response::Path(PathOutcome::Found(vec![
                NodeId::new("a"),
                NodeId::new("b"),
                NodeId::new("c"),
            ]))
        );

        let reply = engine
            .respond(Request::BlastRadius {
                node: "ghost".into(),
                max_depth: None,
            })
            .await;
        assert!(matches!(reply, Reply::Rejected(Rejection { ref error, .. }) if error == "node_not_found"));
    }

    #[tokio::test]
    async fn test_strengthen_reports_count() {
        let engine = engine_with_graph(&[("a", "b")]).await;

        let response = engine
            .handle(Request::Strengthen {
                from: "a".into(),
                to: "b".into(),
            })
            .await
            .unwrap();

        assert!(matches!(response, Response::Strength { strength: 1, .. }));
    }

    #[tokio::test]
    async fn test_task_lifecycle_through_protocol() {
        let engine = Engine::in_memory();
        engine.handle(create("t1", &[])).await.unwrap();
        engine.handle(create("t2", &["t1"])).await.unwrap();

        engine
            .handle(Request::ClaimTask {
                id: "t1".into(),
                agent: "agent-x".into(),
            })
            .await
            .unwrap();
        let Response::Completion(completion) = engine
            .handle(Request::CompleteTask {
                id: "t1".into(),
                result: Some(json!({"ok": true})),
                success: true,
                agent: Some("agent-x".into()),
            })
            .await
            .unwrap()
        else {
            panic!("expected completion");
        };

        assert_eq!(completion.task.state, TaskState::Completed);
        assert_eq!(completion.newly_ready, vec![NodeId::new("t2")]);
    }

    #[tokio::test]
    async fn test_cycle_rejection_names_the_path() {
        let engine = Engine::in_memory();
        engine.handle(create("t1", &[])).await.unwrap();
        engine.handle(create("t2", &["t1"])).await.unwrap();

        let reply = engine
            .respond(Request::AddDependency {
                id: "t1".into(),
                depends_on: "t2".into(),
            })
            .await;

        let Reply::Rejected(rejection) = reply else {
            panic!("expected rejection");
        };
        assert_eq!(rejection.error, "cycle_would_form");
        assert!(rejection.reason.contains("t1 -> t2 -> t1"));
    }

    #[tokio::test]
    async fn test_empty_id_is_malformed() {
        let engine = Engine::in_memory();

        let reply = engine
            .respond(Request::ClaimTask {
                id: "  ".into(),
                agent: "a".into(),
            })
            .await;

        assert!(matches!(reply, Reply::Rejected(Rejection { ref error, .. }) if error == "malformed_input"));
    }

    #[tokio::test]
    async fn test_open_persists_to_workspace() {
        let temp_dir = TempDir::new().unwrap();
        let config = TangleConfig::default();

        {
            let engine = Engine::open(&config, temp_dir.path()).await.unwrap();
            engine.handle(create("t1", &[])).await.unwrap();
        }

        let engine = Engine::open(&config, temp_dir.path()).await.unwrap();
        let response = engine.handle(Request::BoardStats).await.unwrap();
        assert!(matches!(response, Response::BoardStats(stats) if stats.total == 1 && stats.ready == 1));
    }

    #[test]
    fn test_zero_depth_falls_back_to_default() {
        let engine = Engine::in_memory();
        assert_eq!(engine.depth(Some(0)), graph::DEFAULT_MAX_DEPTH);
        assert_eq!(engine.depth(Some(3)), 3);
        assert_eq!(engine.depth(None), graph::DEFAULT_MAX_DEPTH);
    }
}
