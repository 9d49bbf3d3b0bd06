//! Pruning to the targeted nodes and what they depend on.

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::addrs::Address;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::GraphError;

use super::GraphTransformer;
use crate::graph::dag::{Graph, NodeId};
use crate::graph::node::{Node, NodeKind};

/// Keeps only the targeted nodes and their transitive dependencies.
///
/// Validation nodes of every kept variable are kept too, with their own
/// dependencies. With no targets the graph is left alone.
#[derive(Debug, Clone, Default)]
pub struct TargetsTransformer {
    targets: Vec<Address>,
}

impl TargetsTransformer {
    /// Creates the transformer.
    #[must_use]
    pub const fn new(targets: Vec<Address>) -> Self {
        Self { targets }
    }

    fn is_targeted(&self, node: &Node) -> bool {
        let own = node.address();
        self.targets.iter().any(|target| {
            target == own
                || (target.containing_resource() == own.containing_resource()
                    && matches!(node.kind(), NodeKind::Resource(_) | NodeKind::Orphan { .. }))
        })
    }
}

impl GraphTransformer for TargetsTransformer {
    fn name(&self) -> &'static str {
        "targets"
    }

    fn transform(&self, graph: &mut Graph, diags: &mut Diagnostics) -> Result<(), GraphError> {
        if self.targets.is_empty() {
            return Ok(());
        }

        let seeds: Vec<NodeId> = graph
            .nodes()
            .filter(|(_, n)| self.is_targeted(n))
            .map(|(id, _)| id)
            .collect();
        if seeds.is_empty() {
            diags.push(Diagnostic::warning(
                "Targets match nothing",
                format!(
                    "None of the targeted addresses ({}) is in the configuration or state",
                    self.targets.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
                ),
            ));
        }

        let mut keep = closure(graph, seeds);
        let validations: Vec<NodeId> = graph
            .nodes()
            .filter(|(id, n)| {
                !keep.contains(id)
                    && matches!(n.kind(), NodeKind::VariableValidation(addr)
                        if graph.find_kind(&NodeKind::Variable(addr.clone())).is_some_and(|v| keep.contains(&v)))
            })
            .map(|(id, _)| id)
            .collect();
        keep.extend(closure(graph, validations));

        debug!("Targeting keeps {} of {} nodes", keep.len(), graph.len());
        info!("Resource targeting is in effect; the plan may be incomplete");
        graph.retain_nodes(&keep);
        Ok(())
    }
}

fn closure(graph: &Graph, seeds: Vec<NodeId>) -> BTreeSet<NodeId> {
    let mut keep = BTreeSet::new();
    let mut stack = seeds;
    while let Some(id) = stack.pop() {
        if keep.insert(id) {
            stack.extend(graph.dependencies(id));
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::graph::transform::{ConfigTransformer, ReferenceTransformer, VariableValidationTransformer};

    const CONFIG: &str = r#"
variables:
  - name: size
    default: 1
    validation:
      - condition: "var.size > 0"
        error_message: "size must be positive"
  - name: unused
    default: 1
resources:
  - type: test_resource
    name: a
    config:
      size: "${var.size}"
  - type: test_resource
    name: b
"#;

    fn names(graph: &Graph) -> BTreeSet<String> {
        graph.nodes().map(|(_, n)| n.name()).collect()
    }

    #[test]
    fn test_targets_keep_dependency_closure() {
        let config = ConfigParser::parse_str(CONFIG).expect("config");
        let mut graph = Graph::new();
        let mut diags = Diagnostics::new();
        ConfigTransformer::new(&config).transform(&mut graph, &mut diags).expect("config");
        VariableValidationTransformer::new(&config)
            .transform(&mut graph, &mut diags)
            .expect("validation");
        ReferenceTransformer::new(false)
            .transform(&mut graph, &mut diags)
            .expect("references");

        let target: Address = "test_resource.a".parse().expect("address");
        TargetsTransformer::new(vec![target])
            .transform(&mut graph, &mut diags)
            .expect("targets");

        assert_eq!(
            names(&graph),
            BTreeSet::from([
                String::from("provider.test"),
                String::from("test_resource.a"),
                String::from("var.size"),
                String::from("var.size (validation)"),
            ])
        );
        assert!(diags.is_empty());
    }

    #[test]
    fn test_unmatched_targets_warn() {
        let config = ConfigParser::parse_str(CONFIG).expect("config");
        let mut graph = Graph::new();
        let mut diags = Diagnostics::new();
        ConfigTransformer::new(&config).transform(&mut graph, &mut diags).expect("config");

        let target: Address = "test_resource.zzz".parse().expect("address");
        TargetsTransformer::new(vec![target])
            .transform(&mut graph, &mut diags)
            .expect("targets");
        assert!(graph.is_empty());
        assert_eq!(diags.len(), 1);
        assert!(!diags.has_errors());
    }
}
