//! Node and edge storage for a single graph instance.

use crate::domain::{EdgeKind, NodeId};
use crate::error::{Error, Result};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use serde::Serialize;
use std::collections::HashMap;

use super::cycles;

/// How a graph treats edges that would close a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Discipline {
    /// Cycles are allowed and reported by analysis. Missing endpoints are
    /// created on insertion.
    Observational,

    /// The graph must stay a DAG. Endpoints must already exist.
    Constrained,
}

/// Payload stored on each node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeData {
    /// Node identifier
    pub id: NodeId,

    /// Access-frequency reinforcement counter
    pub strength: u32,
}

/// Payload stored on each edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EdgeData {
    /// Optional relationship tag
    pub kind: Option<EdgeKind>,

    /// Access-frequency reinforcement counter
    pub strength: u32,
}

/// Summary counts for a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    /// Number of nodes
    pub nodes: usize,

    /// Number of edges
    pub edges: usize,

    /// Nodes nothing depends on
    pub roots: usize,

    /// Nodes that depend on nothing
    pub leaves: usize,

    /// Edges from a node to itself
    pub self_loops: usize,
}

/// Directed graph with forward and reverse adjacency.
///
/// Backed by petgraph's `StableDiGraph`, which keeps incoming and outgoing
/// edge lists per node so reverse lookups never scan the edge list. Node
/// indices stay valid across removals.
///
/// The store is not synchronized; callers that share it across tasks wrap it
/// in a lock (see [`crate::engine::Engine`] and [`crate::board::SharedBoard`]).
#[derive(Debug, Clone)]
pub struct GraphStore {
    discipline: Discipline,

    /// Nodes carry their id, edges carry kind and strength.
    /// Edge direction: source (dependent) -> target (dependency).
    graph: StableDiGraph<NodeData, EdgeData>,

    /// Id to index lookup. Every node in `graph` has exactly one entry.
    node_map: HashMap<NodeId, NodeIndex>,
}

impl GraphStore {
    /// Create an empty graph with the given discipline.
    #[must_use]
    pub fn new(discipline: Discipline) -> Self {
        Self {
            discipline,
            graph: StableDiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Create an empty observational graph (cycles allowed).
    #[must_use]
    pub fn observational() -> Self {
        Self::new(Discipline::Observational)
    }

    /// Create an empty constrained graph (must stay acyclic).
    #[must_use]
    pub fn constrained() -> Self {
        Self::new(Discipline::Constrained)
    }

    /// The discipline this graph enforces.
    #[must_use]
    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Add a node if it does not exist yet.
    ///
    /// Returns `true` if the node was created.
    pub fn add_node(&mut self, id: NodeId) -> bool {
        if self.node_map.contains_key(&id) {
            return false;
        }
        self.insert_node(id);
        true
    }

    fn insert_node(&mut self, id: NodeId) -> NodeIndex {
        let idx = self.graph.add_node(NodeData {
            id: id.clone(),
            strength: 0,
        });
        self.node_map.insert(id, idx);
        idx
    }

    /// Whether the node exists.
    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.node_map.contains_key(id)
    }

    /// Add a directed edge `from -> to`.
    ///
    /// Returns `false` if the edge already existed (parallel edges are merged).
    ///
    /// # Errors
    ///
    /// For constrained graphs:
    /// - `Error::NodeNotFound` if either endpoint is missing
    /// - `Error::CycleWouldForm` if `from` is reachable from `to`; nothing is
    ///   mutated in that case
    pub fn add_edge(&mut self, from: &NodeId, to: &NodeId, kind: Option<EdgeKind>) -> Result<bool> {
        let (from_idx, to_idx) = match self.discipline {
            Discipline::Observational => {
                let from_idx = self.ensure_node(from);
                let to_idx = self.ensure_node(to);
                (from_idx, to_idx)
            }
            Discipline::Constrained => {
                let from_idx = self.require(from)?;
                let to_idx = self.require(to)?;
                if self.graph.find_edge(from_idx, to_idx).is_some() {
                    return Ok(false);
                }
                // Must run before the commit below; callers hold the graph's
                // mutation lock across both.
                if let Some(path) = cycles::would_create_cycle(self, from, to) {
                    return Err(Error::CycleWouldForm {
                        from: from.clone(),
                        to: to.clone(),
                        path,
                    });
                }
                (from_idx, to_idx)
            }
        };

        if self.graph.find_edge(from_idx, to_idx).is_some() {
            return Ok(false);
        }
        self.graph
            .add_edge(from_idx, to_idx, EdgeData { kind, strength: 0 });
        Ok(true)
    }

    fn ensure_node(&mut self, id: &NodeId) -> NodeIndex {
        match self.node_map.get(id) {
            Some(&idx) => idx,
            None => self.insert_node(id.clone()),
        }
    }

    /// Remove the edge `from -> to`, returning its payload.
    ///
    /// # Errors
    ///
    /// - `Error::NodeNotFound` if either endpoint is missing
    /// - `Error::DependencyNotFound` if there is no such edge
    pub fn remove_edge(&mut self, from: &NodeId, to: &NodeId) -> Result<EdgeData> {
        let from_idx = self.require(from)?;
        let to_idx = self.require(to)?;
        let edge = self
            .graph
            .find_edge(from_idx, to_idx)
            .ok_or_else(|| Error::DependencyNotFound {
                from: from.clone(),
                to: to.clone(),
            })?;
        self.graph
            .remove_edge(edge)
            .ok_or_else(|| Error::DependencyNotFound {
                from: from.clone(),
                to: to.clone(),
            })
    }

    /// Remove a node and all its incident edges.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if the node doesn't exist.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<()> {
        let idx = self
            .node_map
            .remove(id)
            .ok_or_else(|| Error::NodeNotFound(id.clone()))?;
        self.graph.remove_node(idx);
        Ok(())
    }

    /// Drop every node and edge, keeping the discipline.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.node_map.clear();
    }

    /// Nodes this node points to (its dependencies), sorted by id.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if the node doesn't exist.
    pub fn forward(&self, id: &NodeId) -> Result<Vec<NodeId>> {
        let idx = self.require(id)?;
        Ok(self.sorted_ids(self.successors(idx)))
    }

    /// Nodes pointing at this node (its dependents), sorted by id.
    ///
    /// # Errors
    ///
    /// Returns `Error::NodeNotFound` if the node doesn't exist.
    pub fn reverse(&self, id: &NodeId) -> Result<Vec<NodeId>> {
        let idx = self.require(id)?;
        Ok(self.sorted_ids(self.predecessors(idx)))
    }

    fn sorted_ids(&self, indices: impl Iterator<Item = NodeIndex>) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = indices.map(|idx| self.id_at(idx).clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Whether the edge `from -> to` exists.
    #[must_use]
    pub fn has_edge(&self, from: &NodeId, to: &NodeId) -> bool {
        self.edge(from, to).is_some()
    }

    /// Payload of the edge `from -> to`, if present.
    #[must_use]
    pub fn edge(&self, from: &NodeId, to: &NodeId) -> Option<&EdgeData> {
        let from_idx = self.index_of(from)?;
        let to_idx = self.index_of(to)?;
        let edge = self.graph.find_edge(from_idx, to_idx)?;
        self.graph.edge_weight(edge)
    }

    /// Reinforce an edge and both endpoints, returning the new edge strength.
    ///
    /// Strength only affects ranking, never correctness.
    ///
    /// # Errors
    ///
    /// - `Error::NodeNotFound` if either endpoint is missing
    /// - `Error::DependencyNotFound` if there is no such edge
    pub fn strengthen(&mut self, from: &NodeId, to: &NodeId) -> Result<u32> {
        let from_idx = self.require(from)?;
        let to_idx = self.require(to)?;
        let edge = self
            .graph
            .find_edge(from_idx, to_idx)
            .ok_or_else(|| Error::DependencyNotFound {
                from: from.clone(),
                to: to.clone(),
            })?;

        let mut strength = 0;
        if let Some(data) = self.graph.edge_weight_mut(edge) {
            data.strength = data.strength.saturating_add(1);
            strength = data.strength;
        }
        for idx in [from_idx, to_idx] {
            if let Some(node) = self.graph.node_weight_mut(idx) {
                node.strength = node.strength.saturating_add(1);
            }
        }
        Ok(strength)
    }

    /// Reinforcement counter of a node.
    #[must_use]
    pub fn node_strength(&self, id: &NodeId) -> Option<u32> {
        let idx = self.index_of(id)?;
        self.graph.node_weight(idx).map(|node| node.strength)
    }

    /// Iterate over all node ids (index order).
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> + '_ {
        self.graph.node_indices().map(|idx| self.id_at(idx))
    }

    /// Iterate over all edges as `(from, to, payload)`.
    pub fn edges(&self) -> impl Iterator<Item = (&NodeId, &NodeId, &EdgeData)> + '_ {
        self.graph
            .edge_references()
            .map(|edge| (self.id_at(edge.source()), self.id_at(edge.target()), edge.weight()))
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    /// Summary counts.
    #[must_use]
    pub fn stats(&self) -> GraphStats {
        let mut roots = 0;
        let mut leaves = 0;
        for idx in self.graph.node_indices() {
            if self.predecessors(idx).next().is_none() {
                roots += 1;
            }
            if self.successors(idx).next().is_none() {
                leaves += 1;
            }
        }
        let self_loops = self
            .graph
            .edge_references()
            .filter(|edge| edge.source() == edge.target())
            .count();

        GraphStats {
            nodes: self.node_count(),
            edges: self.edge_count(),
            roots,
            leaves,
            self_loops,
        }
    }

    // ========== Index-level access for the analyzers ==========

    pub(crate) fn index_of(&self, id: &NodeId) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }

    pub(crate) fn require(&self, id: &NodeId) -> Result<NodeIndex> {
        self.index_of(id)
            .ok_or_else(|| Error::NodeNotFound(id.clone()))
    }

    /// Id of a live node index.
    ///
    /// Indices only come from this store, so a miss is a programming error.
    pub(crate) fn id_at(&self, idx: NodeIndex) -> &NodeId {
        &self.graph[idx].id
    }

    pub(crate) fn indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub(crate) fn successors(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(idx, Direction::Outgoing)
    }

    pub(crate) fn predecessors(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(idx, Direction::Incoming)
    }

    pub(crate) fn neighbors(
        &self,
        idx: NodeIndex,
        direction: Direction,
    ) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(idx, direction)
    }

    pub(crate) fn has_edge_between(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.graph.find_edge(from, to).is_some()
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::observational()
    }
}
