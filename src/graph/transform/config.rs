//! One node per configuration block.

use std::collections::BTreeSet;
use tracing::debug;

use crate::addrs::{Address, ModulePath, Subject};
use crate::config::{Config, Module, ProviderConfig};
use crate::diagnostics::Diagnostics;
use crate::error::GraphError;
use crate::lang::{Expr, references_in_expr, references_in_exprs};

use super::GraphTransformer;
use crate::graph::dag::Graph;
use crate::graph::node::{Node, NodeKind};

/// Adds provider, variable, local, resource, output, check and action
/// nodes for every module.
#[derive(Debug)]
pub struct ConfigTransformer<'a> {
    config: &'a Config,
}

impl<'a> ConfigTransformer<'a> {
    /// Creates the transformer.
    #[must_use]
    pub const fn new(config: &'a Config) -> Self {
        Self { config }
    }

    fn add_providers(&self, graph: &mut Graph, diags: &mut Diagnostics) {
        let root = ModulePath::root();
        for provider in self.config.root.providers.values() {
            graph.add_node(provider_node(provider, diags));
        }
        for addr in self.config.provider_addrs_in_use() {
            if !self.config.root.providers.contains_key(&addr) {
                debug!("Adding implicit configuration for {addr}");
                graph.add_node(provider_node(&ProviderConfig::implicit(addr), diags).in_module(root.clone()));
            }
        }
    }

    fn add_module(&self, module: &Module, graph: &mut Graph, diags: &mut Diagnostics) {
        let path = &module.path;
        let call = self.config.module_call(path);

        for (name, variable) in &module.variables {
            let consumes = match &call {
                Some((parent, call)) => call
                    .inputs
                    .get(name)
                    .map(|input| collect(input, parent, diags))
                    .unwrap_or_default(),
                None => BTreeSet::new(),
            };
            graph.add_node(
                Node::new(NodeKind::Variable(variable.addr.clone()))
                    .providing(variable.addr.clone())
                    .consuming(consumes)
                    .in_module(path.clone()),
            );
        }

        for local in module.locals.values() {
            graph.add_node(
                Node::new(NodeKind::Local(local.addr.clone()))
                    .providing(local.addr.clone())
                    .consuming(collect(&local.expr, path, diags))
                    .in_module(path.clone()),
            );
        }

        for resource in module.resources.values() {
            let mut exprs: Vec<&Expr> = vec![&resource.config];
            exprs.extend(resource.count.iter());
            exprs.extend(
                resource
                    .lifecycle
                    .action_triggers
                    .iter()
                    .filter_map(|t| t.condition.as_ref()),
            );
            let (mut consumes, problems) = references_in_exprs(exprs, path);
            diags.extend(problems.with_default_subject(&resource.addr));
            consumes.extend(resource.depends_on.iter().map(Address::containing_resource));
            consumes.extend(
                resource
                    .lifecycle
                    .action_triggers
                    .iter()
                    .flat_map(|t| t.actions.iter().cloned()),
            );
            consumes.insert(resource.provider.clone());

            graph.add_node(
                Node::new(NodeKind::Resource(resource.addr.clone()))
                    .providing(resource.addr.clone())
                    .consuming(consumes)
                    .in_module(path.clone()),
            );
        }

        for output in module.outputs.values() {
            let mut node = Node::new(NodeKind::Output(output.addr.clone())).providing(output.addr.clone());
            if let (Some((parent, call)), Subject::Output(name)) = (&call, &output.addr.subject) {
                node = node.providing(Address::new(
                    parent.clone(),
                    Subject::ModuleCallOutput {
                        call: call.name.clone(),
                        name: name.clone(),
                    },
                ));
            }
            graph.add_node(node.consuming(collect(&output.expr, path, diags)).in_module(path.clone()));
        }

        for check in module.checks.values() {
            let exprs = check.asserts.iter().flat_map(|r| [&r.condition, &r.message]);
            let (consumes, problems) = references_in_exprs(exprs, path);
            diags.extend(problems.with_default_subject(&check.addr));
            graph.add_node(
                Node::new(NodeKind::Check(check.addr.clone()))
                    .providing(check.addr.clone())
                    .consuming(consumes)
                    .in_module(path.clone()),
            );
        }

        for action in module.actions.values() {
            let mut consumes = collect(&action.config, path, diags);
            consumes.insert(action.provider.clone());
            graph.add_node(
                Node::new(NodeKind::Action(action.addr.clone()))
                    .providing(action.addr.clone())
                    .consuming(consumes)
                    .in_module(path.clone()),
            );
        }
    }
}

impl GraphTransformer for ConfigTransformer<'_> {
    fn name(&self) -> &'static str {
        "config"
    }

    fn transform(&self, graph: &mut Graph, diags: &mut Diagnostics) -> Result<(), GraphError> {
        self.add_providers(graph, diags);
        for module in self.config.modules() {
            self.add_module(module, graph, diags);
        }
        Ok(())
    }
}

fn provider_node(provider: &ProviderConfig, diags: &mut Diagnostics) -> Node {
    let root = ModulePath::root();
    Node::new(NodeKind::ProviderConfig(provider.addr.clone()))
        .providing(provider.addr.clone())
        .consuming(collect(&provider.config, &root, diags))
        .in_module(root)
}

fn collect(expr: &Expr, module: &ModulePath, diags: &mut Diagnostics) -> BTreeSet<Address> {
    let (addrs, problems) = references_in_expr(expr, module);
    diags.extend(problems);
    addrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    const CONFIG: &str = r#"
variables:
  - name: region
    default: eu
resources:
  - type: test_resource
    name: web
    config:
      region: "${var.region}"
modules:
  - name: net
    inputs:
      cidr: var.region
    config:
      variables:
        - name: cidr
      outputs:
        - name: id
          value: var.cidr
"#;

    #[test]
    fn test_nodes_for_every_block() {
        let config = ConfigParser::parse_str(CONFIG).expect("config");
        let mut graph = Graph::new();
        let mut diags = Diagnostics::new();
        ConfigTransformer::new(&config)
            .transform(&mut graph, &mut diags)
            .expect("transform");
        assert!(diags.is_empty(), "{diags:?}");

        let names: BTreeSet<String> = graph.nodes().map(|(_, n)| n.name()).collect();
        assert!(names.contains("provider.test"));
        assert!(names.contains("var.region"));
        assert!(names.contains("test_resource.web"));
        assert!(names.contains("module.net.var.cidr"));
        assert!(names.contains("module.net.output.id"));
    }

    #[test]
    fn test_child_variable_reads_parent_scope() {
        let config = ConfigParser::parse_str(CONFIG).expect("config");
        let mut graph = Graph::new();
        ConfigTransformer::new(&config)
            .transform(&mut graph, &mut Diagnostics::new())
            .expect("transform");

        let child = graph
            .nodes()
            .find(|(_, n)| n.name() == "module.net.var.cidr")
            .map(|(_, n)| n.clone())
            .expect("child variable");
        assert_eq!(
            child.consumes().cloned().unwrap_or_default(),
            BTreeSet::from([Address::root_variable("region")])
        );

        let output = graph
            .nodes()
            .find(|(_, n)| n.name() == "module.net.output.id")
            .map(|(_, n)| n.clone())
            .expect("child output");
        assert_eq!(output.provides().len(), 2);
    }
}
