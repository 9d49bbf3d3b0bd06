//! Running transformers in order to produce a frozen graph.

use tracing::{debug, info};

use crate::addrs::Address;
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::error::GraphError;
use crate::state::State;

use super::dag::{FrozenGraph, Graph};
use super::transform::{
    ConfigTransformer, GraphTransformer, OrphanTransformer, ReferenceTransformer, TargetsTransformer,
    VariableValidationTransformer,
};

/// Options shaping the graph of one operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Consumers of a validated variable also wait for its validation.
    pub validation_gating: bool,
    /// When non-empty, only these addresses and their dependencies.
    pub targets: Vec<Address>,
}

/// A graph together with the node-level problems found building it.
#[derive(Debug)]
pub struct BuiltGraph {
    /// The frozen graph.
    pub graph: FrozenGraph,
    /// Malformed references and similar problems, attributed to nodes.
    pub diagnostics: Diagnostics,
}

/// Builds a graph by running transformers over an empty graph.
#[derive(Default)]
pub struct GraphBuilder<'a> {
    transformers: Vec<Box<dyn GraphTransformer + 'a>>,
}

impl<'a> GraphBuilder<'a> {
    /// Creates a builder with no transformers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transformers: Vec::new(),
        }
    }

    /// The standard pipeline for planning, validating and applying.
    #[must_use]
    pub fn standard(config: &'a Config, state: &'a State, options: &BuildOptions) -> Self {
        Self::new()
            .with(ConfigTransformer::new(config))
            .with(OrphanTransformer::new(config, state))
            .with(VariableValidationTransformer::new(config))
            .with(ReferenceTransformer::new(options.validation_gating))
            .with(TargetsTransformer::new(options.targets.clone()))
    }

    /// Appends a transformer.
    #[must_use]
    pub fn with(mut self, transformer: impl GraphTransformer + 'a) -> Self {
        self.transformers.push(Box::new(transformer));
        self
    }

    /// Runs every transformer in order, then freezes the result.
    ///
    /// # Errors
    ///
    /// Returns the first graph error: an undeclared or ambiguous reference,
    /// or a cycle.
    pub fn build(self) -> Result<BuiltGraph, GraphError> {
        let mut graph = Graph::new();
        let mut diagnostics = Diagnostics::new();
        for transformer in &self.transformers {
            transformer.transform(&mut graph, &mut diagnostics)?;
            debug!(
                "After {} transform: {} nodes, {} edges",
                transformer.name(),
                graph.len(),
                graph.edge_count()
            );
        }
        let graph = graph.freeze()?;
        info!("Built graph with {} nodes and {} edges", graph.len(), graph.edge_count());
        Ok(BuiltGraph { graph, diagnostics })
    }
}

impl std::fmt::Debug for GraphBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphBuilder")
            .field(
                "transformers",
                &self.transformers.iter().map(|t| t.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn build(yaml: &str) -> Result<BuiltGraph, GraphError> {
        let config = ConfigParser::parse_str(yaml).expect("config");
        let state = State::new();
        GraphBuilder::standard(&config, &state, &BuildOptions::default()).build()
    }

    #[test]
    fn test_standard_pipeline() {
        let built = build(
            r#"
variables:
  - name: v
    default: 5
checks:
  - name: positive
    assert:
      - condition: "var.v > 0"
        error_message: "v must be positive"
"#,
        )
        .expect("graph");
        assert_eq!(built.graph.len(), 2);
        assert_eq!(built.graph.edge_count(), 1);
        assert!(built.diagnostics.is_empty());
    }

    #[test]
    fn test_reference_cycle_is_reported() {
        let err = build(
            r#"
locals:
  a: "local.b"
  b: "local.a"
"#,
        )
        .expect_err("cycle");
        let GraphError::Cycle { members } = err else {
            panic!("expected a cycle, got {err}");
        };
        assert_eq!(members, vec!["local.a", "local.b"]);
    }
}
