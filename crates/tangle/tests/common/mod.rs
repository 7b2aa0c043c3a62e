//! Shared helpers for tangle integration tests.

#![allow(dead_code)]

use tangle::board::TaskBoard;
use tangle::domain::{Edge, NewTask, NodeId};
use tangle::graph::{EdgeList, GraphBuilder, GraphStore};

/// Shorthand for a node id.
pub fn id(s: &str) -> NodeId {
    NodeId::new(s)
}

/// Shorthand for a sorted list of node ids.
pub fn ids(names: &[&str]) -> Vec<NodeId> {
    names.iter().map(|n| NodeId::new(*n)).collect()
}

/// Build an observational graph from `(from, to)` pairs.
pub fn graph(edges: &[(&str, &str)]) -> GraphStore {
    let edges = edges.iter().map(|(from, to)| Edge::new(*from, *to)).collect();
    let mut builder = GraphBuilder::new();
    builder
        .add_source(&EdgeList::new("test", edges))
        .expect("edge list is valid");
    builder.finish().0
}

/// Create a board from `(id, dependencies)` pairs, in order.
pub fn board_with(tasks: &[(&str, &[&str])]) -> TaskBoard {
    let mut board = TaskBoard::new();
    for (task, deps) in tasks {
        board
            .create(NewTask::new(*task).with_dependencies(deps.iter().copied()))
            .expect("task should be created");
    }
    board
}

/// Node name used by generated graphs.
pub fn node_name(index: usize) -> String {
    format!("n{index:02}")
}
