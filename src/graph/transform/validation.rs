//! Validation nodes for input variables.

use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::error::GraphError;
use crate::lang::{filter_self, references_in_exprs};

use super::GraphTransformer;
use crate::graph::dag::Graph;
use crate::graph::node::{Node, NodeKind};

/// Adds a validation node for every variable with validation rules.
///
/// The validation node gates the variable's address and always runs after
/// the node producing the variable's value.
#[derive(Debug)]
pub struct VariableValidationTransformer<'a> {
    config: &'a Config,
}

impl<'a> VariableValidationTransformer<'a> {
    /// Creates the transformer.
    #[must_use]
    pub const fn new(config: &'a Config) -> Self {
        Self { config }
    }
}

impl GraphTransformer for VariableValidationTransformer<'_> {
    fn name(&self) -> &'static str {
        "variable-validation"
    }

    fn transform(&self, graph: &mut Graph, diags: &mut Diagnostics) -> Result<(), GraphError> {
        for module in self.config.modules() {
            for variable in module.variables.values().filter(|v| !v.validations.is_empty()) {
                let exprs = variable.validations.iter().flat_map(|r| [&r.condition, &r.message]);
                let (consumes, problems) = references_in_exprs(exprs, &module.path);
                diags.extend(problems.with_default_subject(&variable.addr));

                let validation = graph.add_node(
                    Node::new(NodeKind::VariableValidation(variable.addr.clone()))
                        .gating(variable.addr.clone())
                        .consuming(filter_self(consumes, &variable.addr))
                        .in_module(module.path.clone()),
                );
                let value = graph
                    .find_kind(&NodeKind::Variable(variable.addr.clone()))
                    .ok_or_else(|| GraphError::UndeclaredReference {
                        address: variable.addr.to_string(),
                        referrer: format!("{} (validation)", variable.addr),
                    })?;
                graph.add_dependency(validation, value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::Address;
    use crate::config::ConfigParser;
    use crate::graph::transform::ConfigTransformer;

    #[test]
    fn test_validation_waits_for_value() {
        let config = ConfigParser::parse_str(
            r#"
variables:
  - name: v
    default: 5
    validation:
      - condition: "var.v > var.floor"
        error_message: "v must exceed ${var.floor}"
  - name: floor
    default: 0
"#,
        )
        .expect("config");

        let mut graph = Graph::new();
        let mut diags = Diagnostics::new();
        ConfigTransformer::new(&config)
            .transform(&mut graph, &mut diags)
            .expect("config");
        VariableValidationTransformer::new(&config)
            .transform(&mut graph, &mut diags)
            .expect("validation");

        let addr = Address::root_variable("v");
        let value = graph.find_kind(&NodeKind::Variable(addr.clone())).expect("value");
        let validation = graph.find_kind(&NodeKind::VariableValidation(addr.clone())).expect("validation");
        assert_eq!(graph.dependencies(validation), vec![value]);

        let node = graph.node(validation).expect("node");
        assert!(!node.provides_value(&addr));
        assert_eq!(
            node.consumes().cloned().unwrap_or_default().into_iter().collect::<Vec<_>>(),
            vec![Address::root_variable("floor")]
        );
    }
}
