//! Reachability queries: blast radius, impact analysis, paths and orderings.
//!
//! Every traversal is iterative and bounded by a hop limit. Hitting the limit
//! marks the result as truncated rather than walking further.

use crate::domain::NodeId;
use crate::error::Result;
use petgraph::stable_graph::NodeIndex;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use super::store::GraphStore;

/// Default traversal bound in hops.
pub const DEFAULT_MAX_DEPTH: usize = 100;

/// Nodes that transitively depend on a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlastRadius {
    /// The node being changed
    pub target: NodeId,

    /// Nodes with an edge pointing at the target, sorted by id
    pub direct: Vec<NodeId>,

    /// Nodes two or more hops away, sorted by id
    pub transitive: Vec<NodeId>,

    /// Whether the hop limit cut the traversal short
    pub truncated: bool,
}

impl BlastRadius {
    /// Total number of affected nodes.
    #[must_use]
    pub fn total(&self) -> usize {
        self.direct.len() + self.transitive.len()
    }
}

/// Severity of an impact, from the number of affected nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Two or fewer affected nodes
    Low,
    /// Three to five affected nodes
    Medium,
    /// More than five affected nodes
    High,
}

impl Severity {
    /// Classify by affected node count.
    #[must_use]
    pub fn from_count(affected: usize) -> Self {
        if affected > 5 {
            Self::High
        } else if affected > 2 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        write!(f, "{s}")
    }
}

/// One affected node in an impact analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactEntry {
    /// The affected node
    pub node: NodeId,

    /// Hops from the target (1 = direct dependent)
    pub depth: usize,

    /// Edges of this node whose other endpoint is also impacted
    pub connections: usize,
}

/// Ranked impact of changing a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Impact {
    /// The node being changed
    pub target: NodeId,

    /// Affected nodes ordered by depth, then connections (most first), then id
    pub affected: Vec<ImpactEntry>,

    /// Overall severity
    pub severity: Severity,

    /// Whether the hop limit cut the traversal short
    pub truncated: bool,
}

/// Result of a path search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "path", rename_all = "snake_case")]
pub enum PathOutcome {
    /// Shortest path by edge count, both endpoints included
    Found(Vec<NodeId>),

    /// The target is unreachable
    NotFound,

    /// The hop limit was hit before the target was found
    Truncated,
}

impl PathOutcome {
    /// The path, if one was found.
    #[must_use]
    pub fn path(&self) -> Option<&[NodeId]> {
        match self {
            Self::Found(path) => Some(path),
            Self::NotFound | Self::Truncated => None,
        }
    }
}

/// Nodes reached by a bounded BFS, excluding the start.
struct Levels {
    reached: Vec<(NodeIndex, usize)>,
    truncated: bool,
}

fn bfs_levels(
    store: &GraphStore,
    start: NodeIndex,
    direction: Direction,
    max_depth: usize,
) -> Levels {
    let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
    let mut queue = VecDeque::from([(start, 0usize)]);
    let mut reached = Vec::new();
    let mut truncated = false;

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= max_depth {
            if store
                .neighbors(node, direction)
                .any(|next| !visited.contains(&next))
            {
                truncated = true;
            }
            continue;
        }
        for next in store.neighbors(node, direction) {
            if visited.insert(next) {
                reached.push((next, depth + 1));
                queue.push_back((next, depth + 1));
            }
        }
    }

    Levels { reached, truncated }
}

fn sorted_ids(store: &GraphStore, indices: impl Iterator<Item = NodeIndex>) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = indices.map(|idx| store.id_at(idx).clone()).collect();
    ids.sort();
    ids
}

/// Everything that transitively depends on `id`, split into direct and
/// transitive dependents.
///
/// # Errors
///
/// Returns `Error::NodeNotFound` if `id` is not in the graph.
pub fn blast_radius(store: &GraphStore, id: &NodeId, max_depth: usize) -> Result<BlastRadius> {
    let start = store.require(id)?;
    let levels = bfs_levels(store, start, Direction::Incoming, max_depth);

    let direct = sorted_ids(
        store,
        levels
            .reached
            .iter()
            .filter(|(_, depth)| *depth == 1)
            .map(|(idx, _)| *idx),
    );
    let transitive = sorted_ids(
        store,
        levels
            .reached
            .iter()
            .filter(|(_, depth)| *depth > 1)
            .map(|(idx, _)| *idx),
    );

    Ok(BlastRadius {
        target: id.clone(),
        direct,
        transitive,
        truncated: levels.truncated,
    })
}

/// Blast radius with per-node connection counts and a severity rating.
///
/// # Errors
///
/// Returns `Error::NodeNotFound` if `id` is not in the graph.
pub fn impact_analysis(store: &GraphStore, id: &NodeId, max_depth: usize) -> Result<Impact> {
    let start = store.require(id)?;
    let levels = bfs_levels(store, start, Direction::Incoming, max_depth);

    let mut impacted: HashSet<NodeIndex> = levels.reached.iter().map(|(idx, _)| *idx).collect();
    impacted.insert(start);

    let mut affected: Vec<ImpactEntry> = levels
        .reached
        .iter()
        .map(|&(idx, depth)| {
            let connections = [Direction::Outgoing, Direction::Incoming]
                .into_iter()
                .map(|dir| {
                    store
                        .neighbors(idx, dir)
                        .filter(|other| impacted.contains(other))
                        .count()
                })
                .sum();
            ImpactEntry {
                node: store.id_at(idx).clone(),
                depth,
                connections,
            }
        })
        .collect();

    affected.sort_by(|a, b| {
        a.depth
            .cmp(&b.depth)
            .then_with(|| b.connections.cmp(&a.connections))
            .then_with(|| a.node.cmp(&b.node))
    });

    Ok(Impact {
        target: id.clone(),
        severity: Severity::from_count(affected.len()),
        affected,
        truncated: levels.truncated,
    })
}

/// Shortest forward path from `from` to `to`.
///
/// Ties between equal-length paths go to whichever the BFS discovers first.
///
/// # Errors
///
/// Returns `Error::NodeNotFound` if either endpoint is missing.
pub fn find_path(
    store: &GraphStore,
    from: &NodeId,
    to: &NodeId,
    max_depth: usize,
) -> Result<PathOutcome> {
    let start = store.require(from)?;
    let goal = store.require(to)?;

    if start == goal {
        return Ok(PathOutcome::Found(vec![from.clone()]));
    }

    let mut parents: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
    let mut queue = VecDeque::from([(start, 0usize)]);
    let mut truncated = false;

    while let Some((node, depth)) = queue.pop_front() {
        if depth >= max_depth {
            if store.successors(node).any(|next| !visited.contains(&next)) {
                truncated = true;
            }
            continue;
        }
        for next in store.successors(node) {
            if !visited.insert(next) {
                continue;
            }
            parents.insert(next, node);
            if next == goal {
                return Ok(PathOutcome::Found(trace_back(store, &parents, start, goal)));
            }
            queue.push_back((next, depth + 1));
        }
    }

    Ok(if truncated {
        PathOutcome::Truncated
    } else {
        PathOutcome::NotFound
    })
}

/// Rebuild `start ... goal` from BFS parent pointers.
pub(crate) fn trace_back(
    store: &GraphStore,
    parents: &HashMap<NodeIndex, NodeIndex>,
    start: NodeIndex,
    goal: NodeIndex,
) -> Vec<NodeId> {
    let mut path = vec![store.id_at(goal).clone()];
    let mut current = goal;
    while current != start {
        let Some(&parent) = parents.get(&current) else {
            break;
        };
        path.push(store.id_at(parent).clone());
        current = parent;
    }
    path.reverse();
    path
}

/// Transitive dependencies of `id` with their hop distance.
///
/// Ordered by depth, then id.
///
/// # Errors
///
/// Returns `Error::NodeNotFound` if `id` is not in the graph.
pub fn dependency_tree(
    store: &GraphStore,
    id: &NodeId,
    max_depth: usize,
) -> Result<Vec<(NodeId, usize)>> {
    let start = store.require(id)?;
    let levels = bfs_levels(store, start, Direction::Outgoing, max_depth);

    let mut tree: Vec<(NodeId, usize)> = levels
        .reached
        .into_iter()
        .map(|(idx, depth)| (store.id_at(idx).clone(), depth))
        .collect();
    tree.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    Ok(tree)
}

/// Order a subset of nodes so dependencies come before their dependents.
///
/// Only edges inside the subset are considered. Edges that close a cycle are
/// ignored, so cyclic subsets still get an order.
///
/// # Errors
///
/// Returns `Error::NodeNotFound` if any id is not in the graph.
pub fn topo_order(store: &GraphStore, subset: &[NodeId]) -> Result<Vec<NodeId>> {
    let indices = subset
        .iter()
        .map(|id| store.require(id))
        .collect::<Result<Vec<_>>>()?;

    Ok(order_indices(store, &indices)
        .into_iter()
        .map(|idx| store.id_at(idx).clone())
        .collect())
}

struct OrderFrame {
    node: NodeIndex,
    successors: Vec<NodeIndex>,
    next: usize,
}

/// DFS post-order over the induced subgraph, roots and successors taken in id
/// order for a stable result.
pub(crate) fn order_indices(store: &GraphStore, subset: &[NodeIndex]) -> Vec<NodeIndex> {
    let members: HashSet<NodeIndex> = subset.iter().copied().collect();
    let by_id = |a: &NodeIndex, b: &NodeIndex| store.id_at(*a).cmp(store.id_at(*b));

    let frame = |node: NodeIndex| {
        let mut successors: Vec<NodeIndex> = store
            .successors(node)
            .filter(|s| members.contains(s))
            .collect();
        successors.sort_by(by_id);
        OrderFrame {
            node,
            successors,
            next: 0,
        }
    };

    let mut roots: Vec<NodeIndex> = members.iter().copied().collect();
    roots.sort_by(by_id);

    let mut visited: HashSet<NodeIndex> = HashSet::with_capacity(members.len());
    let mut order = Vec::with_capacity(members.len());

    for root in roots {
        if !visited.insert(root) {
            continue;
        }
        let mut frames = vec![frame(root)];
        while let Some(top) = frames.last_mut() {
            if top.next < top.successors.len() {
                let succ = top.successors[top.next];
                top.next += 1;
                if visited.insert(succ) {
                    frames.push(frame(succ));
                }
            } else {
                let node = top.node;
                frames.pop();
                order.push(node);
            }
        }
    }

    order
}
