//! Nodes for objects in state that no configured resource node plans.

use std::collections::BTreeSet;
use tracing::debug;

use crate::addrs::{Address, ModulePath};
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::error::GraphError;
use crate::state::{ResourceInstanceObject, State};

use super::GraphTransformer;
use crate::graph::dag::Graph;
use crate::graph::node::{Node, NodeKind};

/// Adds one node per orphaned instance and one per deposed object.
///
/// An instance is orphaned when its resource is no longer configured. An
/// orphan waits for whatever it depended on when it was last applied, so
/// walking the reversed graph destroys it before its dependencies.
#[derive(Debug)]
pub struct OrphanTransformer<'a> {
    config: &'a Config,
    state: &'a State,
}

impl<'a> OrphanTransformer<'a> {
    /// Creates the transformer.
    #[must_use]
    pub const fn new(config: &'a Config, state: &'a State) -> Self {
        Self { config, state }
    }
}

impl GraphTransformer for OrphanTransformer<'_> {
    fn name(&self) -> &'static str {
        "orphan"
    }

    fn transform(&self, graph: &mut Graph, _diags: &mut Diagnostics) -> Result<(), GraphError> {
        let mut orphans: Vec<(NodeKind, &ResourceInstanceObject)> = Vec::new();

        for (addr, object) in &self.state.resources {
            if !addr.is_managed_instance() || self.config.resource(&addr.containing_resource()).is_some() {
                continue;
            }
            debug!("{addr} is no longer configured");
            orphans.push((
                NodeKind::Orphan {
                    instance: addr.clone(),
                    deposed: None,
                },
                object,
            ));
        }
        for deposed in &self.state.deposed {
            orphans.push((
                NodeKind::Orphan {
                    instance: deposed.addr.clone(),
                    deposed: Some(deposed.key.clone()),
                },
                &deposed.object,
            ));
        }

        for (_, object) in &orphans {
            if graph.value_provider(&object.provider).is_none() {
                graph.add_node(
                    Node::new(NodeKind::ProviderConfig(object.provider.clone()))
                        .providing(object.provider.clone())
                        .consuming(BTreeSet::new())
                        .in_module(ModulePath::root()),
                );
                debug!("Adding implicit configuration for {}", object.provider);
            }
        }

        let provided = graph.provided_addresses();
        for (kind, object) in orphans {
            let mut consumes: BTreeSet<Address> = object
                .dependencies
                .iter()
                .map(Address::containing_resource)
                .filter(|dep| provided.contains(dep))
                .collect();
            consumes.insert(object.provider.clone());

            let module = match &kind {
                NodeKind::Orphan { instance, .. } => instance.module.clone(),
                _ => ModulePath::root(),
            };
            graph.add_node(Node::new(kind).consuming(consumes).in_module(module));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::{InstanceKey, ResourceAddr};
    use crate::config::ConfigParser;
    use crate::lang::Value;

    fn instance(name: &str) -> Address {
        Address::instance(ModulePath::root(), ResourceAddr::managed("test_resource", name), InstanceKey::NoKey)
    }

    #[test]
    fn test_unconfigured_and_deposed_objects_get_nodes() {
        let config = ConfigParser::parse_str(
            r"
resources:
  - type: test_resource
    name: kept
",
        )
        .expect("config");

        let mut state = State::new();
        let provider = Address::provider("test", None);
        let object = ResourceInstanceObject::new(&Value::object([("id", Value::string("x"))]), provider);
        state.set_object(instance("kept"), object.clone());
        state.set_object(
            instance("gone"),
            object.clone().with_dependencies(BTreeSet::from([instance("kept").containing_resource()])),
        );
        state.depose(&instance("kept"));
        state.set_object(instance("kept"), object);

        let mut graph = Graph::new();
        let mut diags = Diagnostics::new();
        crate::graph::transform::ConfigTransformer::new(&config)
            .transform(&mut graph, &mut diags)
            .expect("config");
        OrphanTransformer::new(&config, &state)
            .transform(&mut graph, &mut diags)
            .expect("orphans");

        let orphans: Vec<&Node> = graph
            .nodes()
            .map(|(_, n)| n)
            .filter(|n| matches!(n.kind(), NodeKind::Orphan { .. }))
            .collect();
        assert_eq!(orphans.len(), 2);

        let gone = orphans
            .iter()
            .find(|n| n.address() == &instance("gone"))
            .expect("orphan for removed resource");
        let consumes = gone.consumes().cloned().unwrap_or_default();
        assert!(consumes.contains(&instance("kept").containing_resource()));
        assert!(consumes.contains(&Address::provider("test", None)));
    }

    #[test]
    fn test_missing_provider_is_added() {
        let config = Config::default();
        let mut state = State::new();
        state.set_object(
            instance("gone"),
            ResourceInstanceObject::new(&Value::object([("id", Value::string("x"))]), Address::provider("test", None)),
        );

        let mut graph = Graph::new();
        OrphanTransformer::new(&config, &state)
            .transform(&mut graph, &mut Diagnostics::new())
            .expect("orphans");
        assert_eq!(graph.len(), 2);
        assert!(graph.value_provider(&Address::provider("test", None)).is_some());
    }
}
