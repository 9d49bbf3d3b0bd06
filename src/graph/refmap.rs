//! Resolution of consumed addresses to the nodes providing them.

use std::collections::{BTreeMap, BTreeSet};

use crate::addrs::Address;
use crate::error::GraphError;
use crate::lang::filter_self;

use super::dag::{Graph, NodeId};
use super::node::ProvideRole;

/// Index from address to the nodes providing it.
#[derive(Debug, Default)]
pub struct ReferenceMap {
    values: BTreeMap<Address, NodeId>,
    gates: BTreeMap<Address, Vec<NodeId>>,
    gating: bool,
}

impl ReferenceMap {
    /// Indexes every address provided in `graph`.
    ///
    /// When `gating` is set, consumers of an address also wait for the
    /// nodes gating it.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::AmbiguousReference`] when two nodes both
    /// produce the value of one address.
    pub fn build(graph: &Graph, gating: bool) -> Result<Self, GraphError> {
        let mut map = Self {
            gating,
            ..Self::default()
        };
        for (id, node) in graph.nodes() {
            for provided in node.provides() {
                match provided.role {
                    ProvideRole::Value => {
                        if let Some(&first) = map.values.get(&provided.addr) {
                            return Err(GraphError::AmbiguousReference {
                                address: provided.addr.to_string(),
                                first: graph.node(first).map(|n| n.name()).unwrap_or_default(),
                                second: node.name(),
                            });
                        }
                        map.values.insert(provided.addr.clone(), id);
                    }
                    ProvideRole::Gate => map.gates.entry(provided.addr.clone()).or_default().push(id),
                }
            }
        }
        Ok(map)
    }

    /// Nodes a consumer of `addr` must wait for, or `None` if nothing
    /// produces it.
    #[must_use]
    pub fn providers_of(&self, addr: &Address) -> Option<Vec<NodeId>> {
        let value = *self.values.get(addr)?;
        let mut ids = vec![value];
        if self.gating
            && let Some(gates) = self.gates.get(addr)
        {
            ids.extend(gates.iter().copied());
        }
        Some(ids)
    }

    /// Nodes the node `id` must wait for because of what it consumes.
    ///
    /// Addresses the node provides itself are ignored, and the node never
    /// depends on itself.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UndeclaredReference`] for a consumed address
    /// nothing provides.
    pub fn dependencies_of(&self, graph: &Graph, id: NodeId) -> Result<BTreeSet<NodeId>, GraphError> {
        let node = graph.node(id).ok_or(GraphError::UnknownNode { id: id.index() })?;
        let Some(consumes) = node.consumes() else {
            return Ok(BTreeSet::new());
        };

        let consumed = node
            .provides()
            .iter()
            .fold(consumes.clone(), |addrs, own| filter_self(addrs, &own.addr));

        let mut deps = BTreeSet::new();
        for addr in &consumed {
            let providers = self.providers_of(addr).ok_or_else(|| GraphError::UndeclaredReference {
                address: addr.to_string(),
                referrer: node.name(),
            })?;
            deps.extend(providers.into_iter().filter(|&p| p != id));
        }
        Ok(deps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{Node, NodeKind};

    fn variable(name: &str, consumes: &[&str]) -> Node {
        let addr = Address::root_variable(name);
        Node::new(NodeKind::Variable(addr.clone()))
            .providing(addr)
            .consuming(consumes.iter().map(|c| Address::root_variable(*c)).collect())
    }

    #[test]
    fn test_self_reference_is_filtered() {
        let mut graph = Graph::new();
        let v = graph.add_node(variable("v", &["v"]));
        let map = ReferenceMap::build(&graph, false).expect("map");
        assert!(map.dependencies_of(&graph, v).expect("deps").is_empty());
    }

    #[test]
    fn test_undeclared_reference() {
        let mut graph = Graph::new();
        let v = graph.add_node(variable("v", &["missing"]));
        let map = ReferenceMap::build(&graph, false).expect("map");
        let err = map.dependencies_of(&graph, v).expect_err("undeclared");
        assert!(matches!(err, GraphError::UndeclaredReference { address, .. } if address == "var.missing"));
    }

    #[test]
    fn test_two_value_providers_are_ambiguous() {
        let mut graph = Graph::new();
        graph.add_node(variable("v", &[]));
        graph.add_node(variable("v", &[]));
        assert!(matches!(
            ReferenceMap::build(&graph, false),
            Err(GraphError::AmbiguousReference { .. })
        ));
    }

    #[test]
    fn test_gates_only_count_when_gating() {
        let mut graph = Graph::new();
        let v = graph.add_node(variable("v", &[]));
        let addr = Address::root_variable("v");
        let gate = graph.add_node(Node::new(NodeKind::VariableValidation(addr.clone())).gating(addr));
        let user = graph.add_node(variable("user", &["v"]));

        let plain = ReferenceMap::build(&graph, false).expect("map");
        assert_eq!(plain.dependencies_of(&graph, user).expect("deps"), BTreeSet::from([v]));

        let gated = ReferenceMap::build(&graph, true).expect("map");
        assert_eq!(gated.dependencies_of(&graph, user).expect("deps"), BTreeSet::from([v, gate]));
    }
}
