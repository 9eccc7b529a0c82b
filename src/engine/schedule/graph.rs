//! Directed graph over systems and sets, with the algorithms the schedule
//! builder needs: strongly connected components, a stable topological sort
//! and reachability analysis.
//!
//! ## Invariants
//! - Node iteration follows insertion order, and the topological sort breaks
//!   ties by insertion order. Two builds of the same configuration therefore
//!   produce the same executable.
//! - Edges are unique; adding an existing edge is a no-op.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use crate::engine::types::Signature;


/// Node of a schedule graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    /// Index into the schedule's systems.
    System(usize),
    /// Index into the schedule's sets.
    Set(usize),
}

impl NodeId {
    /// Index within its kind.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            NodeId::System(index) | NodeId::Set(index) => index,
        }
    }

    /// Returns `true` for systems.
    #[inline]
    pub fn is_system(self) -> bool {
        matches!(self, NodeId::System(_))
    }

    /// Returns `true` for sets.
    #[inline]
    pub fn is_set(self) -> bool {
        matches!(self, NodeId::Set(_))
    }
}

/// Edge direction relative to a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Edges leaving the node.
    Outgoing,
    /// Edges entering the node.
    Incoming,
}

#[derive(Clone, Debug, Default)]
struct Adjacency {
    outgoing: Vec<NodeId>,
    incoming: Vec<NodeId>,
}

/// Directed graph with insertion-ordered nodes.
#[derive(Clone, Debug, Default)]
pub struct DiGraph {
    order: Vec<NodeId>,
    adjacency: HashMap<NodeId, Adjacency>,
}

impl DiGraph {
    /// Adds `node` if absent.
    pub fn add_node(&mut self, node: NodeId) {
        if !self.adjacency.contains_key(&node) {
            self.order.push(node);
            self.adjacency.insert(node, Adjacency::default());
        }
    }

    /// Adds the edge `a -> b`, adding missing nodes.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId) {
        self.add_node(a);
        self.add_node(b);
        if self.contains_edge(a, b) {
            return;
        }
        if let Some(adjacency) = self.adjacency.get_mut(&a) {
            adjacency.outgoing.push(b);
        }
        if let Some(adjacency) = self.adjacency.get_mut(&b) {
            adjacency.incoming.push(a);
        }
    }

    /// Removes `node` and every edge touching it.
    pub fn remove_node(&mut self, node: NodeId) {
        let Some(adjacency) = self.adjacency.remove(&node) else {
            return;
        };
        for successor in adjacency.outgoing {
            if let Some(other) = self.adjacency.get_mut(&successor) {
                other.incoming.retain(|&n| n != node);
            }
        }
        for predecessor in adjacency.incoming {
            if let Some(other) = self.adjacency.get_mut(&predecessor) {
                other.outgoing.retain(|&n| n != node);
            }
        }
        self.order.retain(|&n| n != node);
    }

    /// Removes the edge `a -> b` if present.
    pub fn remove_edge(&mut self, a: NodeId, b: NodeId) {
        if let Some(adjacency) = self.adjacency.get_mut(&a) {
            adjacency.outgoing.retain(|&n| n != b);
        }
        if let Some(adjacency) = self.adjacency.get_mut(&b) {
            adjacency.incoming.retain(|&n| n != a);
        }
    }

    /// Returns `true` if `node` is in the graph.
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.adjacency.contains_key(&node)
    }

    /// Returns `true` if the edge `a -> b` exists.
    pub fn contains_edge(&self, a: NodeId, b: NodeId) -> bool {
        self.adjacency.get(&a).is_some_and(|adjacency| adjacency.outgoing.contains(&b))
    }

    /// Neighbors of `node` in `direction`, in edge insertion order.
    pub fn neighbors_directed(&self, node: NodeId, direction: Direction) -> impl Iterator<Item = NodeId> + '_ {
        let neighbors = self.adjacency.get(&node).map_or(&[][..], |adjacency| match direction {
            Direction::Outgoing => &adjacency.outgoing[..],
            Direction::Incoming => &adjacency.incoming[..],
        });
        neighbors.iter().copied()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl DoubleEndedIterator<Item = NodeId> + ExactSizeIterator + '_ {
        self.order.iter().copied()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(|adjacency| adjacency.outgoing.len()).sum()
    }

    /// Every edge, grouped by source in node order.
    pub fn all_edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.order
            .iter()
            .flat_map(move |&a| self.neighbors_directed(a, Direction::Outgoing).map(move |b| (a, b)))
    }

    /// Strongly connected components, each in discovery order.
    ///
    /// Iterative Tarjan; components come out in reverse topological order.
    pub fn strongly_connected_components(&self) -> Vec<Vec<NodeId>> {
        struct Frame {
            node: usize,
            next_successor: usize,
        }

        let position: HashMap<NodeId, usize> = self.order.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        let successors: Vec<Vec<usize>> = self
            .order
            .iter()
            .map(|&node| self.neighbors_directed(node, Direction::Outgoing).map(|n| position[&n]).collect())
            .collect();

        let n = self.order.len();
        let mut index = vec![usize::MAX; n];
        let mut lowlink = vec![0; n];
        let mut on_stack = vec![false; n];
        let mut stack = Vec::new();
        let mut components = Vec::new();
        let mut next_index = 0;

        for root in 0..n {
            if index[root] != usize::MAX {
                continue;
            }
            let mut call_stack = vec![Frame { node: root, next_successor: 0 }];
            index[root] = next_index;
            lowlink[root] = next_index;
            next_index += 1;
            stack.push(root);
            on_stack[root] = true;

            while let Some(frame) = call_stack.last_mut() {
                let v = frame.node;
                if let Some(&w) = successors[v].get(frame.next_successor) {
                    frame.next_successor += 1;
                    if index[w] == usize::MAX {
                        index[w] = next_index;
                        lowlink[w] = next_index;
                        next_index += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        call_stack.push(Frame { node: w, next_successor: 0 });
                    } else if on_stack[w] {
                        lowlink[v] = lowlink[v].min(index[w]);
                    }
                    continue;
                }

                call_stack.pop();
                if let Some(parent) = call_stack.last() {
                    lowlink[parent.node] = lowlink[parent.node].min(lowlink[v]);
                }
                if lowlink[v] == index[v] {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(self.order[w]);
                        if w == v {
                            break;
                        }
                    }
                    component.reverse();
                    components.push(component);
                }
            }
        }
        components
    }

    /// Topological order, breaking ties by insertion order.
    ///
    /// On failure returns every cycle: each strongly connected component
    /// with more than one node, and every self-loop.
    pub fn topsort(&self) -> Result<Vec<NodeId>, Vec<Vec<NodeId>>> {
        let position: HashMap<NodeId, usize> = self.order.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        let mut in_degree: Vec<usize> = self
            .order
            .iter()
            .map(|&node| self.neighbors_directed(node, Direction::Incoming).count())
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> =
            in_degree.iter().enumerate().filter(|&(_, &d)| d == 0).map(|(i, _)| Reverse(i)).collect();
        let mut sorted = Vec::with_capacity(self.order.len());

        while let Some(Reverse(i)) = ready.pop() {
            let node = self.order[i];
            sorted.push(node);
            for successor in self.neighbors_directed(node, Direction::Outgoing) {
                let j = position[&successor];
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.push(Reverse(j));
                }
            }
        }

        if sorted.len() == self.order.len() {
            return Ok(sorted);
        }

        let mut cycles: Vec<Vec<NodeId>> = self
            .strongly_connected_components()
            .into_iter()
            .filter(|component| component.len() > 1 || self.contains_edge(component[0], component[0]))
            .collect();
        cycles.sort_by_key(|component| component.iter().map(|n| position[n]).min());
        Err(cycles)
    }

    /// A closed walk through `component`, starting at its first node.
    ///
    /// `component` must be strongly connected.
    pub fn simple_cycle(&self, component: &[NodeId]) -> Vec<NodeId> {
        let Some(&start) = component.first() else {
            return Vec::new();
        };
        let members: HashSet<NodeId> = component.iter().copied().collect();
        let mut parent: HashMap<NodeId, NodeId> = HashMap::new();
        let mut queue = VecDeque::from([start]);

        while let Some(node) = queue.pop_front() {
            for next in self.neighbors_directed(node, Direction::Outgoing) {
                if next == start {
                    let mut path = vec![node];
                    let mut current = node;
                    while let Some(&previous) = parent.get(&current) {
                        path.push(previous);
                        current = previous;
                    }
                    path.reverse();
                    return path;
                }
                if members.contains(&next) && !parent.contains_key(&next) {
                    parent.insert(next, node);
                    queue.push_back(next);
                }
            }
        }
        component.to_vec()
    }
}

/// Reachability facts about a DAG, computed from its topological order.
#[derive(Debug, Default)]
pub struct CheckGraphResults {
    /// `reachable[i].has(j)` if the `j`th node in topological order is
    /// reachable from the `i`th.
    pub reachable: Vec<Signature>,
    /// Pairs joined by a path, earlier node first.
    pub connected: HashSet<(NodeId, NodeId)>,
    /// Pairs with no path either way, earlier node first.
    pub disconnected: Vec<(NodeId, NodeId)>,
    /// Edges implied by other paths.
    pub transitive_edges: Vec<(NodeId, NodeId)>,
    /// The graph without its transitive edges.
    pub transitive_reduction: DiGraph,
}

/// Computes [`CheckGraphResults`] for `graph` given one of its topological orders.
pub fn check_graph(graph: &DiGraph, topological_order: &[NodeId]) -> CheckGraphResults {
    let n = topological_order.len();
    if n == 0 {
        return CheckGraphResults::default();
    }

    let position: HashMap<NodeId, usize> =
        topological_order.iter().enumerate().map(|(i, &node)| (node, i)).collect();

    let mut reachable = vec![Signature::with_capacity(n); n];
    let mut transitive_edges = Vec::new();
    let mut transitive_reduction = DiGraph::default();
    for &node in topological_order {
        transitive_reduction.add_node(node);
    }

    for a in (0..n).rev() {
        let node_a = topological_order[a];
        let mut successors: Vec<usize> =
            graph.neighbors_directed(node_a, Direction::Outgoing).map(|node| position[&node]).collect();
        successors.sort_unstable();

        for b in successors {
            let node_b = topological_order[b];
            if reachable[a].has(b) {
                transitive_edges.push((node_a, node_b));
                continue;
            }
            transitive_reduction.add_edge(node_a, node_b);
            let (head, tail) = reachable.split_at_mut(b);
            head[a].set(b);
            head[a].union_with(&tail[0]);
        }
    }

    let mut connected = HashSet::new();
    let mut disconnected = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let pair = (topological_order[i], topological_order[j]);
            if reachable[i].has(j) {
                connected.insert(pair);
            } else {
                disconnected.push(pair);
            }
        }
    }

    CheckGraphResults { reachable, connected, disconnected, transitive_edges, transitive_reduction }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system(index: usize) -> NodeId {
        NodeId::System(index)
    }

    #[test]
    fn topsort_breaks_ties_by_insertion_order() {
        let mut graph = DiGraph::default();
        graph.add_node(system(2));
        graph.add_node(system(0));
        graph.add_node(system(1));
        graph.add_edge(system(1), system(0));

        let order = graph.topsort().unwrap();
        assert_eq!(order, vec![system(2), system(1), system(0)]);
    }

    #[test]
    fn topsort_reports_every_cycle() {
        let mut graph = DiGraph::default();
        graph.add_edge(system(0), system(1));
        graph.add_edge(system(1), system(0));
        graph.add_edge(system(2), system(2));
        graph.add_edge(system(3), system(0));

        let cycles = graph.topsort().unwrap_err();
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0].len(), 2);
        assert!(cycles[0].contains(&system(0)) && cycles[0].contains(&system(1)));
        assert_eq!(cycles[1], vec![system(2)]);
    }

    #[test]
    fn check_graph_finds_transitive_edges() {
        let mut graph = DiGraph::default();
        graph.add_edge(system(0), system(1));
        graph.add_edge(system(1), system(2));
        graph.add_edge(system(0), system(2));
        graph.add_node(system(3));

        let order = graph.topsort().unwrap();
        let results = check_graph(&graph, &order);

        assert_eq!(results.transitive_edges, vec![(system(0), system(2))]);
        assert!(!results.transitive_reduction.contains_edge(system(0), system(2)));
        assert!(results.connected.contains(&(system(0), system(2))));
        assert_eq!(results.disconnected.len(), 3);
    }

    #[test]
    fn simple_cycle_follows_edges() {
        let mut graph = DiGraph::default();
        graph.add_edge(system(0), system(2));
        graph.add_edge(system(2), system(1));
        graph.add_edge(system(1), system(0));

        let component = vec![system(0), system(1), system(2)];
        assert_eq!(graph.simple_cycle(&component), vec![system(0), system(2), system(1)]);
    }

    #[test]
    fn remove_node_drops_its_edges() {
        let mut graph = DiGraph::default();
        graph.add_edge(system(0), NodeId::Set(0));
        graph.add_edge(NodeId::Set(0), system(1));
        graph.remove_node(NodeId::Set(0));

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.neighbors_directed(system(0), Direction::Outgoing).count(), 0);
    }
}
