//! Edges from consumers to the nodes providing what they consume.

use tracing::debug;

use crate::diagnostics::Diagnostics;
use crate::error::GraphError;

use super::GraphTransformer;
use crate::graph::dag::Graph;
use crate::graph::refmap::ReferenceMap;

/// Connects every consumer to the providers of the addresses it reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceTransformer {
    validation_gating: bool,
}

impl ReferenceTransformer {
    /// Creates the transformer. With `validation_gating`, consumers of a
    /// validated variable also wait for its validation.
    #[must_use]
    pub const fn new(validation_gating: bool) -> Self {
        Self { validation_gating }
    }
}

impl GraphTransformer for ReferenceTransformer {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn transform(&self, graph: &mut Graph, _diags: &mut Diagnostics) -> Result<(), GraphError> {
        let map = ReferenceMap::build(graph, self.validation_gating)?;
        let mut edges = Vec::new();
        for id in graph.node_ids() {
            for dep in map.dependencies_of(graph, id)? {
                edges.push((id, dep));
            }
        }
        debug!("Adding {} reference edges", edges.len());
        for (consumer, provider) in edges {
            graph.add_dependency(consumer, provider)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::Address;
    use crate::config::ConfigParser;
    use crate::graph::node::NodeKind;
    use crate::graph::transform::{ConfigTransformer, VariableValidationTransformer};

    fn build(yaml: &str, gating: bool) -> Result<Graph, GraphError> {
        let config = ConfigParser::parse_str(yaml).expect("config");
        let mut graph = Graph::new();
        let mut diags = Diagnostics::new();
        ConfigTransformer::new(&config).transform(&mut graph, &mut diags)?;
        VariableValidationTransformer::new(&config).transform(&mut graph, &mut diags)?;
        ReferenceTransformer::new(gating).transform(&mut graph, &mut diags)?;
        Ok(graph)
    }

    const GATED: &str = r#"
variables:
  - name: v
    default: 5
    validation:
      - condition: "var.v > 0"
        error_message: "v must be positive"
locals:
  doubled: "var.v * 2"
"#;

    #[test]
    fn test_resource_waits_for_provider_and_inputs() {
        let graph = build(
            r#"
variables:
  - name: size
    default: 1
resources:
  - type: test_resource
    name: a
    config:
      size: "${var.size}"
"#,
            false,
        )
        .expect("graph");
        let resource = graph
            .nodes()
            .find(|(_, n)| matches!(n.kind(), NodeKind::Resource(_)))
            .map(|(id, _)| id)
            .expect("resource");
        let names: Vec<String> = graph
            .dependencies(resource)
            .into_iter()
            .filter_map(|id| graph.node(id).map(|n| n.name()))
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&String::from("provider.test")));
        assert!(names.contains(&String::from("var.size")));
    }

    #[test]
    fn test_gating_adds_validation_edges() {
        let addr = Address::root_variable("v");
        let local = Address::new(crate::addrs::ModulePath::root(), crate::addrs::Subject::Local("doubled".into()));

        let plain = build(GATED, false).expect("graph");
        let local_id = plain.value_provider(&local).expect("local");
        assert_eq!(plain.dependencies(local_id).len(), 1);

        let gated = build(GATED, true).expect("graph");
        let local_id = gated.value_provider(&local).expect("local");
        let validation = gated
            .find_kind(&NodeKind::VariableValidation(addr))
            .expect("validation");
        assert!(gated.dependencies(local_id).contains(&validation));
    }

    #[test]
    fn test_undeclared_reference_fails() {
        let err = build(
            r#"
locals:
  x: "var.missing"
"#,
            false,
        )
        .expect_err("undeclared");
        assert!(matches!(err, GraphError::UndeclaredReference { .. }));
    }
}
