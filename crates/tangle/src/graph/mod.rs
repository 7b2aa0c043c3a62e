//! Graph storage and algorithms for dependency analysis.
//!
//! This module provides the graph store and the read-only analyses that run
//! over it:
//!
//! | Operation | Algorithm |
//! |-----------|-----------|
//! | Cycle detection | Tarjan's SCC algorithm (iterative) |
//! | Edge admission (constrained graphs) | Forward BFS from the edge target |
//! | Blast radius / impact analysis | Reverse BFS from the target node |
//! | Shortest path | Forward BFS with parent pointers |
//! | Fix order | DFS post-order over an induced subgraph |
//!
//! ## Edge Direction Convention
//!
//! Edges always point from the **dependent** to the **dependency**: if
//! `a.rs` imports `b.rs`, the edge is `a.rs -> b.rs`; if task `T2` waits for
//! `T1`, the edge is `T2 -> T1`. "Who is affected if X changes" therefore
//! walks edges in reverse.
//!
//! ## Disciplines
//!
//! - **Observational** graphs (imports, packages) accept any edge and create
//!   missing endpoints implicitly. They are analyzed, not enforced.
//! - **Constrained** graphs (task boards) require endpoints to exist and
//!   reject any edge that would close a cycle.

pub mod builder;
pub mod cycles;
pub mod reach;
mod store;

pub use builder::{
    BuildReport, EdgeList, EdgeSource, GraphBuilder, ImportMap, PackageManifest, WorkspaceManifests,
};
pub use cycles::{
    find_cycles, strongly_connected_components, suggest_fixes, would_create_cycle, Cycle,
    FixSuggestion, Risk,
};
pub use reach::{
    blast_radius, dependency_tree, find_path, impact_analysis, topo_order, BlastRadius, Impact,
    ImpactEntry, PathOutcome, Severity, DEFAULT_MAX_DEPTH,
};
pub use store::{Discipline, EdgeData, GraphStats, GraphStore, NodeData};
