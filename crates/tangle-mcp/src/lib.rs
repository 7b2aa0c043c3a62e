//! MCP server for the tangle dependency graph engine.
//!
//! This crate provides an MCP (Model Context Protocol) server that exposes
//! tangle's graph analysis and task board to AI assistants.
//!
//! # Architecture
//!
//! The server uses the `rmcp` crate for MCP protocol handling. Each workspace
//! gets its own [`tangle::engine::Engine`]; every tool builds a protocol
//! request and returns the engine's response as JSON.
//!
//! # Tools
//!
//! ## Context Management
//! - `set_context` - Set the workspace root for all operations
//! - `where_am_i` - Show current workspace context
//!
//! ## Graph Analysis
//! - `build_graph` - Replace the analysis graph from edges, imports or manifests
//! - `find_cycles` / `suggest_fixes` - Cycles and how to break them
//! - `blast_radius` / `impact_analysis` - What depends on a node
//! - `find_path` - Shortest dependency path
//!
//! ## Task Board
//! - `create_task`, `claim_task`, `complete_task`, `release_task`
//! - `add_dependency`, `delete_task`, `show_task`
//! - `ready_tasks`, `blocked_tasks`, `board_stats`

pub mod context;
pub mod error;
pub mod models;
pub mod server;
pub mod tools;

pub use error::{Error, Result};
pub use server::TangleMcpServer;
