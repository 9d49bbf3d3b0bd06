//! The dependency graph, mutable while it is built and read-only once frozen.
//!
//! An edge `a -> b` means "a waits for b": `a` consumes something `b`
//! provides, or a transformer added the ordering explicitly.

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::addrs::Address;
use crate::error::GraphError;

use super::node::{Node, NodeKind};

/// Identifier of a node within one graph.
pub type NodeId = NodeIndex;

/// A dependency graph under construction.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    inner: StableDiGraph<Node, ()>,
}

/// A validated, acyclic graph. Nodes and edges can no longer change.
#[derive(Debug, Clone)]
pub struct FrozenGraph {
    inner: StableDiGraph<Node, ()>,
    order: Vec<NodeId>,
}

impl Graph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node and returns its id.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        self.inner.add_node(node)
    }

    /// Removes a node and every edge touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Option<Node> {
        self.inner.remove_node(id)
    }

    /// Records that `consumer` waits for `provider`.
    ///
    /// Adding the same edge twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if either id is not in the graph.
    pub fn add_dependency(&mut self, consumer: NodeId, provider: NodeId) -> Result<(), GraphError> {
        for id in [consumer, provider] {
            if !self.inner.contains_node(id) {
                return Err(GraphError::UnknownNode { id: id.index() });
            }
        }
        if !self.inner.contains_edge(consumer, provider) {
            self.inner.add_edge(consumer, provider, ());
        }
        Ok(())
    }

    /// Returns a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.inner.node_weight(id)
    }

    /// Every node id, in insertion order.
    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.inner.node_indices().collect()
    }

    /// Every node with its id.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.inner.node_indices().filter_map(|id| self.inner.node_weight(id).map(|n| (id, n)))
    }

    /// Nodes `id` waits for.
    #[must_use]
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        sorted_neighbors(&self.inner, id, Direction::Outgoing)
    }

    /// Nodes waiting for `id`.
    #[must_use]
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        sorted_neighbors(&self.inner, id, Direction::Incoming)
    }

    /// The node producing the value of `addr`, if any.
    #[must_use]
    pub fn value_provider(&self, addr: &Address) -> Option<NodeId> {
        self.nodes().find(|(_, n)| n.provides_value(addr)).map(|(id, _)| id)
    }

    /// The node of the given kind, if any.
    #[must_use]
    pub fn find_kind(&self, kind: &NodeKind) -> Option<NodeId> {
        self.nodes().find(|(_, n)| n.kind() == kind).map(|(id, _)| id)
    }

    /// Every address some node provides, in any role.
    #[must_use]
    pub fn provided_addresses(&self) -> BTreeSet<Address> {
        self.nodes()
            .flat_map(|(_, n)| n.provides().iter().map(|p| p.addr.clone()))
            .collect()
    }

    /// Removes every node not in `keep`.
    pub fn retain_nodes(&mut self, keep: &BTreeSet<NodeId>) {
        let doomed: Vec<NodeId> = self.inner.node_indices().filter(|id| !keep.contains(id)).collect();
        for id in doomed {
            self.inner.remove_node(id);
        }
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.node_count()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Validates the graph and freezes it.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Cycle`] naming every member of the first cycle
    /// found, including a node that waits for itself.
    pub fn freeze(self) -> Result<FrozenGraph, GraphError> {
        let mut cycles: Vec<Vec<String>> = tarjan_scc(&self.inner)
            .into_iter()
            .filter(|scc| scc.len() > 1 || scc.iter().any(|&id| self.inner.contains_edge(id, id)))
            .map(|scc| {
                let mut members: Vec<String> = scc.iter().filter_map(|&id| self.node(id)).map(Node::name).collect();
                members.sort();
                members
            })
            .collect();
        cycles.sort();
        if let Some(members) = cycles.into_iter().next() {
            return Err(GraphError::Cycle { members });
        }

        // Toposort lists consumers before providers; execution order is the reverse.
        let mut order = toposort(&self.inner, None).map_err(|cycle| GraphError::Cycle {
            members: self.node(cycle.node_id()).map(Node::name).into_iter().collect(),
        })?;
        order.reverse();

        Ok(FrozenGraph {
            inner: self.inner,
            order,
        })
    }
}

impl FrozenGraph {
    /// Returns a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.inner.node_weight(id)
    }

    /// Every node id, in insertion order.
    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.inner.node_indices().collect()
    }

    /// Every node with its id.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.inner.node_indices().filter_map(|id| self.inner.node_weight(id).map(|n| (id, n)))
    }

    /// Nodes `id` waits for.
    #[must_use]
    pub fn dependencies(&self, id: NodeId) -> Vec<NodeId> {
        sorted_neighbors(&self.inner, id, Direction::Outgoing)
    }

    /// Nodes waiting for `id`.
    #[must_use]
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        sorted_neighbors(&self.inner, id, Direction::Incoming)
    }

    /// A topological order: every node after all of its dependencies.
    #[must_use]
    pub fn topological_order(&self) -> &[NodeId] {
        &self.order
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.node_count()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// The same graph with every edge reversed, keeping node ids.
    ///
    /// Walking it visits dependents before their dependencies, the order
    /// objects must be destroyed in.
    #[must_use]
    pub fn reversed(&self) -> Self {
        let mut inner = self.inner.clone();
        inner.clear_edges();
        for edge in self.inner.edge_references() {
            inner.add_edge(edge.target(), edge.source(), ());
        }
        let mut order = self.order.clone();
        order.reverse();
        Self { inner, order }
    }

    /// Renders the graph in Graphviz DOT syntax, one edge per dependency.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut names: Vec<String> = self.nodes().map(|(_, n)| n.name()).collect();
        names.sort();
        let mut edges: Vec<(String, String)> = self
            .inner
            .edge_references()
            .filter_map(|e| Some((self.node(e.source())?.name(), self.node(e.target())?.name())))
            .collect();
        edges.sort();

        let mut out = String::from("digraph {\n  compound = \"true\"\n  newrank = \"true\"\n");
        for name in &names {
            let _ = writeln!(out, "  \"{name}\"");
        }
        for (from, to) in &edges {
            let _ = writeln!(out, "  \"{from}\" -> \"{to}\"");
        }
        out.push_str("}\n");
        out
    }
}

fn sorted_neighbors(graph: &StableDiGraph<Node, ()>, id: NodeId, direction: Direction) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = graph.neighbors_directed(id, direction).collect();
    ids.sort();
    ids.dedup();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::Address;

    fn var(name: &str) -> Node {
        let addr = Address::root_variable(name);
        Node::new(NodeKind::Variable(addr.clone())).providing(addr)
    }

    #[test]
    fn test_freeze_orders_dependencies_first() {
        let mut graph = Graph::new();
        let a = graph.add_node(var("a"));
        let b = graph.add_node(var("b"));
        let c = graph.add_node(var("c"));
        graph.add_dependency(a, b).expect("edge");
        graph.add_dependency(b, c).expect("edge");

        let frozen = graph.freeze().expect("acyclic");
        assert_eq!(frozen.topological_order(), &[c, b, a]);
        assert_eq!(frozen.dependencies(a), vec![b]);
        assert_eq!(frozen.dependents(c), vec![b]);
    }

    #[test]
    fn test_two_node_cycle_names_both() {
        let mut graph = Graph::new();
        let a = graph.add_node(var("a"));
        let b = graph.add_node(var("b"));
        graph.add_dependency(a, b).expect("edge");
        graph.add_dependency(b, a).expect("edge");

        let Err(GraphError::Cycle { members }) = graph.freeze() else {
            panic!("expected a cycle");
        };
        assert_eq!(members, vec!["var.a", "var.b"]);
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let mut graph = Graph::new();
        let a = graph.add_node(var("a"));
        graph.add_dependency(a, a).expect("edge");

        let Err(GraphError::Cycle { members }) = graph.freeze() else {
            panic!("expected a cycle");
        };
        assert_eq!(members, vec!["var.a"]);
    }

    #[test]
    fn test_unknown_node_rejected() {
        let mut graph = Graph::new();
        let a = graph.add_node(var("a"));
        let b = graph.add_node(var("b"));
        graph.remove_node(b);
        assert!(matches!(graph.add_dependency(a, b), Err(GraphError::UnknownNode { .. })));
    }

    #[test]
    fn test_reversed_keeps_ids() {
        let mut graph = Graph::new();
        let a = graph.add_node(var("a"));
        let b = graph.add_node(var("b"));
        graph.add_dependency(a, b).expect("edge");

        let reversed = graph.freeze().expect("acyclic").reversed();
        assert_eq!(reversed.dependencies(b), vec![a]);
        assert_eq!(reversed.topological_order(), &[a, b]);
    }

    #[test]
    fn test_dot_output_is_sorted() {
        let mut graph = Graph::new();
        let b = graph.add_node(var("b"));
        let a = graph.add_node(var("a"));
        graph.add_dependency(b, a).expect("edge");

        let dot = graph.freeze().expect("acyclic").to_dot();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("\"var.b\" -> \"var.a\""));
        assert!(dot.find("\"var.a\"").expect("a") < dot.find("\"var.b\"").expect("b"));
    }
}
