//! Graph transformers.
//!
//! A transformer is one pass over a graph under construction. The builder
//! runs them in a fixed order: nodes first, then edges, then pruning.

mod config;
mod orphan;
mod reference;
mod targets;
mod validation;

pub use config::ConfigTransformer;
pub use orphan::OrphanTransformer;
pub use reference::ReferenceTransformer;
pub use targets::TargetsTransformer;
pub use validation::VariableValidationTransformer;

use crate::diagnostics::Diagnostics;
use crate::error::GraphError;

use super::dag::Graph;

/// One pass over a graph under construction.
pub trait GraphTransformer {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Applies the pass.
    ///
    /// Problems local to one node (a malformed reference) go to `diags`;
    /// problems that make the graph unusable are returned.
    ///
    /// # Errors
    ///
    /// Returns a graph error when the graph cannot be built.
    fn transform(&self, graph: &mut Graph, diags: &mut Diagnostics) -> Result<(), GraphError>;
}
