//! Cycle detection: batch SCC analysis for observational graphs and the
//! incremental acyclicity check for constrained graphs.
//!
//! Tarjan's algorithm runs over an explicit frame stack instead of recursion,
//! so deep import chains cannot exhaust the call stack.

use crate::domain::{Edge, NodeId};
use petgraph::stable_graph::NodeIndex;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use tracing::debug;

use super::reach;
use super::store::GraphStore;

/// Risk classification of a detected cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    /// Small, sparse cycle
    Low,
    /// Mid-sized or moderately dense cycle
    Medium,
    /// Large or dense cycle
    High,
}

impl Risk {
    /// Classify a component by size and internal edge density.
    #[must_use]
    pub fn classify(size: usize, strength: f64) -> Self {
        if size > 5 || strength > 1.5 {
            Self::High
        } else if size > 3 || strength > 1.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        write!(f, "{s}")
    }
}

/// A strongly connected component reported as a cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cycle {
    /// Members, sorted by id
    pub nodes: Vec<NodeId>,

    /// Number of members
    pub size: usize,

    /// Edges with both endpoints inside the component
    pub internal_edges: usize,

    /// Internal edges divided by size
    pub strength: f64,

    /// Risk classification
    pub risk: Risk,
}

/// How to break one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixSuggestion {
    /// The cycle being addressed
    pub cycle: Cycle,

    /// Member with the fewest outgoing edges inside the cycle
    pub extract_candidate: NodeId,

    /// The candidate's intra-cycle edges; cutting them breaks the cycle
    pub edges_to_cut: Vec<Edge>,

    /// Members ordered dependencies-first
    pub fix_order: Vec<NodeId>,

    /// Human-readable advice
    pub suggestions: Vec<String>,
}

/// Per-node bookkeeping for Tarjan's algorithm.
#[derive(Debug, Clone, Copy)]
struct NodeState {
    /// Discovery order
    index: usize,
    /// Lowest discovery index reachable from this node
    low_link: usize,
    /// Whether the node is on the component stack
    on_stack: bool,
}

/// Explicit DFS frame.
#[derive(Debug)]
enum Frame {
    /// First visit: assign index and low-link
    Visit(NodeIndex),
    /// Continue scanning successors. `child` is the successor whose subtree
    /// just finished, if any.
    Resume {
        node: NodeIndex,
        successors: Vec<NodeIndex>,
        next: usize,
        child: Option<NodeIndex>,
    },
}

struct Tarjan<'a> {
    store: &'a GraphStore,
    states: HashMap<NodeIndex, NodeState>,
    counter: usize,
    stack: Vec<NodeIndex>,
    components: Vec<Vec<NodeIndex>>,
}

impl<'a> Tarjan<'a> {
    fn new(store: &'a GraphStore) -> Self {
        Self {
            store,
            states: HashMap::with_capacity(store.node_count()),
            counter: 0,
            stack: Vec::new(),
            components: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Vec<NodeIndex>> {
        let roots: Vec<NodeIndex> = self.store.indices().collect();
        for root in roots {
            if !self.states.contains_key(&root) {
                self.search(root);
            }
        }
        self.components
    }

    fn search(&mut self, root: NodeIndex) {
        let mut frames = vec![Frame::Visit(root)];

        while let Some(frame) = frames.pop() {
            match frame {
                Frame::Visit(node) => {
                    debug_assert!(
                        !self.states.contains_key(&node),
                        "tarjan visited a node twice"
                    );
                    let index = self.counter;
                    self.counter += 1;
                    self.states.insert(
                        node,
                        NodeState {
                            index,
                            low_link: index,
                            on_stack: true,
                        },
                    );
                    self.stack.push(node);

                    let successors = self.store.successors(node).collect();
                    frames.push(Frame::Resume {
                        node,
                        successors,
                        next: 0,
                        child: None,
                    });
                }
                Frame::Resume {
                    node,
                    successors,
                    mut next,
                    child,
                } => {
                    if let Some(child) = child {
                        let child_low = self.state(child).low_link;
                        self.lower(node, child_low);
                    }

                    let mut descend = None;
                    while next < successors.len() {
                        let succ = successors[next];
                        next += 1;
                        match self.states.get(&succ) {
                            None => {
                                descend = Some(succ);
                                break;
                            }
                            Some(state) if state.on_stack => {
                                let index = state.index;
                                self.lower(node, index);
                            }
                            Some(_) => {}
                        }
                    }

                    if let Some(succ) = descend {
                        frames.push(Frame::Resume {
                            node,
                            successors,
                            next,
                            child: Some(succ),
                        });
                        frames.push(Frame::Visit(succ));
                        continue;
                    }

                    self.close(node);
                }
            }
        }
    }

    fn state(&self, node: NodeIndex) -> NodeState {
        // Only called for nodes that were visited
        self.states.get(&node).copied().unwrap_or(NodeState {
            index: usize::MAX,
            low_link: usize::MAX,
            on_stack: false,
        })
    }

    fn lower(&mut self, node: NodeIndex, candidate: usize) {
        if let Some(state) = self.states.get_mut(&node) {
            state.low_link = state.low_link.min(candidate);
        }
    }

    /// Pop a finished component if `node` is its root.
    fn close(&mut self, node: NodeIndex) {
        let state = self.state(node);
        if state.low_link != state.index {
            return;
        }

        let mut component = Vec::new();
        while let Some(member) = self.stack.pop() {
            if let Some(member_state) = self.states.get_mut(&member) {
                debug_assert!(member_state.on_stack, "component member assigned twice");
                member_state.on_stack = false;
            }
            component.push(member);
            if member == node {
                break;
            }
        }
        self.components.push(component);
    }
}

fn components(store: &GraphStore) -> Vec<Vec<NodeIndex>> {
    Tarjan::new(store).run()
}

/// All strongly connected components, including trivial ones.
///
/// Each component is sorted by id and the list is sorted by first member.
#[must_use]
pub fn strongly_connected_components(store: &GraphStore) -> Vec<Vec<NodeId>> {
    let mut result: Vec<Vec<NodeId>> = components(store)
        .into_iter()
        .map(|component| {
            let mut ids: Vec<NodeId> = component
                .into_iter()
                .map(|idx| store.id_at(idx).clone())
                .collect();
            ids.sort();
            ids
        })
        .collect();
    result.sort();
    result
}

/// Find every cycle in the graph.
///
/// Components with more than one member are cycles, and so is a single node
/// with a self-loop. Results are ordered by risk (high first), then size
/// (largest first), then first member id.
#[must_use]
pub fn find_cycles(store: &GraphStore) -> Vec<Cycle> {
    let mut cycles: Vec<Cycle> = components(store)
        .into_iter()
        .filter(|component| {
            component.len() > 1 || store.has_edge_between(component[0], component[0])
        })
        .map(|component| score(store, &component))
        .collect();

    cycles.sort_by(|a, b| {
        b.risk
            .cmp(&a.risk)
            .then_with(|| b.size.cmp(&a.size))
            .then_with(|| a.nodes.first().cmp(&b.nodes.first()))
    });

    debug!(cycles = cycles.len(), nodes = store.node_count(), "cycle scan finished");
    cycles
}

fn score(store: &GraphStore, component: &[NodeIndex]) -> Cycle {
    let members: HashSet<NodeIndex> = component.iter().copied().collect();
    let internal_edges = component
        .iter()
        .map(|&idx| store.successors(idx).filter(|s| members.contains(s)).count())
        .sum::<usize>();

    let size = component.len();
    #[allow(clippy::cast_precision_loss)]
    let strength = internal_edges as f64 / size as f64;

    let mut nodes: Vec<NodeId> = component
        .iter()
        .map(|&idx| store.id_at(idx).clone())
        .collect();
    nodes.sort();

    Cycle {
        nodes,
        size,
        internal_edges,
        strength,
        risk: Risk::classify(size, strength),
    }
}

/// Suggest how to break each cycle, in the order of [`find_cycles`].
#[must_use]
pub fn suggest_fixes(store: &GraphStore) -> Vec<FixSuggestion> {
    find_cycles(store)
        .into_iter()
        .filter_map(|cycle| suggest_for(store, cycle))
        .collect()
}

fn suggest_for(store: &GraphStore, cycle: Cycle) -> Option<FixSuggestion> {
    let members: Vec<NodeIndex> = cycle
        .nodes
        .iter()
        .filter_map(|id| store.index_of(id))
        .collect();
    let member_set: HashSet<NodeIndex> = members.iter().copied().collect();

    let intra_targets = |idx: NodeIndex| -> Vec<NodeId> {
        let mut targets: Vec<NodeId> = store
            .successors(idx)
            .filter(|s| member_set.contains(s))
            .map(|s| store.id_at(s).clone())
            .collect();
        targets.sort();
        targets.dedup();
        targets
    };

    // Fewest outgoing intra-cycle edges, ties broken by lowest id
    let candidate = members
        .iter()
        .copied()
        .min_by(|&a, &b| {
            intra_targets(a)
                .len()
                .cmp(&intra_targets(b).len())
                .then_with(|| store.id_at(a).cmp(store.id_at(b)))
        })?;
    let candidate_id = store.id_at(candidate).clone();

    let edges_to_cut: Vec<Edge> = intra_targets(candidate)
        .into_iter()
        .map(|target| {
            let kind = store.edge(&candidate_id, &target).and_then(|data| data.kind);
            Edge {
                from: candidate_id.clone(),
                to: target,
                kind,
            }
        })
        .collect();

    let fix_order: Vec<NodeId> = reach::order_indices(store, &members)
        .into_iter()
        .map(|idx| store.id_at(idx).clone())
        .collect();

    let suggestions = advice(&cycle, &candidate_id, &edges_to_cut, &fix_order);

    Some(FixSuggestion {
        cycle,
        extract_candidate: candidate_id,
        edges_to_cut,
        fix_order,
        suggestions,
    })
}

fn advice(cycle: &Cycle, candidate: &NodeId, cut: &[Edge], order: &[NodeId]) -> Vec<String> {
    if cycle.size == 1 {
        return vec![format!("Remove the self-dependency of {candidate}")];
    }

    let targets = cut
        .iter()
        .map(|edge| edge.to.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let order = order
        .iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ");

    let mut out = vec![format!(
        "Break the cycle at {candidate}: remove its {} dependency edge(s) on {targets}",
        cut.len()
    )];

    match cycle.risk {
        Risk::High => {
            out.push(format!(
                "High-risk cycle of {} nodes with strength {:.2}: introduce an interface layer \
                 or merge the most tightly coupled members before refactoring further",
                cycle.size, cycle.strength
            ));
            out.push(format!(
                "Extract the code {candidate} uses from {targets} into a shared module both can depend on"
            ));
        }
        Risk::Medium => {
            out.push(format!(
                "Apply dependency inversion: have {candidate} depend on an abstraction that {targets} implement"
            ));
        }
        Risk::Low => {
            out.push(format!(
                "Move the code {candidate} needs from {targets} into {candidate} or a small shared module"
            ));
        }
    }

    out.push(format!("Refactor in this order: {order}"));
    out
}

/// Check whether adding `from -> to` would close a cycle.
///
/// Runs a forward BFS from `to`. If `from` is reachable, returns the path
/// `to ... from`; the rejected edge plus that path is the would-be cycle. A
/// self-edge returns `[from]`.
///
/// The search is bounded by the visited set only, never by depth: a truncated
/// search could admit a cycle. Returns `None` if either endpoint is missing.
#[must_use]
pub fn would_create_cycle(store: &GraphStore, from: &NodeId, to: &NodeId) -> Option<Vec<NodeId>> {
    let goal = store.index_of(from)?;
    let start = store.index_of(to)?;

    if start == goal {
        return Some(vec![to.clone()]);
    }

    let mut parents: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut visited: HashSet<NodeIndex> = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        for next in store.successors(current) {
            if !visited.insert(next) {
                continue;
            }
            parents.insert(next, current);
            if next == goal {
                return Some(reach::trace_back(store, &parents, start, goal));
            }
            queue.push_back(next);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &str)]) -> GraphStore {
        let mut store = GraphStore::observational();
        for (from, to) in edges {
            store
                .add_edge(&NodeId::new(*from), &NodeId::new(*to), None)
                .unwrap();
        }
        store
    }

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::new(*n)).collect()
    }

    #[test]
    fn test_three_node_cycle_is_low_risk() {
        let store = graph(&[("a", "b"), ("b", "c"), ("c", "a")]);

        let cycles = find_cycles(&store);

        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].nodes, ids(&["a", "b", "c"]));
        assert_eq!(cycles[0].size, 3);
        assert!((cycles[0].strength - 1.0).abs() < f64::EPSILON);
        assert_eq!(cycles[0].risk, Risk::Low);
    }

    #[test]
    fn test_acyclic_graph_has_no_cycles() {
        let store = graph(&[("a", "b"), ("b", "c"), ("a", "c")]);
        assert!(find_cycles(&store).is_empty());
    }

    #[test]
    fn test_self_loop_is_reported() {
        let store = graph(&[("a", "a"), ("a", "b")]);

        let cycles = find_cycles(&store);

        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].nodes, ids(&["a"]));
        assert_eq!(cycles[0].internal_edges, 1);
    }

    #[test]
    fn test_cycles_ordered_by_risk_then_size() {
        // Six-node ring (high) and a two-node pair (low)
        let store = graph(&[
            ("r1", "r2"),
            ("r2", "r3"),
            ("r3", "r4"),
            ("r4", "r5"),
            ("r5", "r6"),
            ("r6", "r1"),
            ("p", "q"),
            ("q", "p"),
        ]);

        let cycles = find_cycles(&store);

        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0].risk, Risk::High);
        assert_eq!(cycles[0].size, 6);
        assert_eq!(cycles[1].nodes, ids(&["p", "q"]));
    }

    #[test]
    fn test_dense_cycle_is_medium_risk() {
        // 3 nodes, 4 internal edges: strength 1.33
        let store = graph(&[("a", "b"), ("b", "c"), ("c", "a"), ("b", "a")]);

        let cycles = find_cycles(&store);

        assert_eq!(cycles[0].risk, Risk::Medium);
        assert_eq!(cycles[0].internal_edges, 4);
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let mut store = GraphStore::observational();
        let n = 50_000;
        for i in 0..n {
            store
                .add_edge(
                    &NodeId::new(format!("n{i}")),
                    &NodeId::new(format!("n{}", i + 1)),
                    None,
                )
                .unwrap();
        }
        store
            .add_edge(&NodeId::new(format!("n{n}")), &NodeId::new("n0"), None)
            .unwrap();

        let cycles = find_cycles(&store);

        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].size, n + 1);
    }

    #[test]
    fn test_suggest_fixes_picks_weakest_member() {
        // b has two intra-cycle out-edges; a and c have one each
        let store = graph(&[("a", "b"), ("b", "c"), ("c", "a"), ("b", "a")]);

        let fixes = suggest_fixes(&store);

        assert_eq!(fixes.len(), 1);
        let fix = &fixes[0];
        assert_eq!(fix.extract_candidate, NodeId::new("a"));
        assert_eq!(fix.edges_to_cut, vec![Edge::new("a", "b")]);
        assert_eq!(fix.fix_order.len(), 3);
        assert!(fix.suggestions[0].contains("Break the cycle at a"));
    }

    #[test]
    fn test_suggest_fixes_for_self_loop() {
        let store = graph(&[("x", "x")]);

        let fixes = suggest_fixes(&store);

        assert_eq!(fixes[0].extract_candidate, NodeId::new("x"));
        assert_eq!(fixes[0].suggestions, vec!["Remove the self-dependency of x"]);
    }

    #[test]
    fn test_would_create_cycle_reports_path() {
        let store = graph(&[("t2", "t3"), ("t3", "t1")]);

        let path = would_create_cycle(&store, &NodeId::new("t1"), &NodeId::new("t2"));

        assert_eq!(path, Some(ids(&["t2", "t3", "t1"])));
    }

    #[test]
    fn test_would_create_cycle_allows_safe_edge() {
        let store = graph(&[("a", "b"), ("b", "c")]);
        assert_eq!(
            would_create_cycle(&store, &NodeId::new("a"), &NodeId::new("c")),
            None
        );
    }

    #[test]
    fn test_components_include_singletons() {
        let store = graph(&[("a", "b"), ("b", "a"), ("b", "c")]);

        let sccs = strongly_connected_components(&store);

        assert_eq!(sccs, vec![ids(&["a", "b"]), ids(&["c"])]);
    }
}
