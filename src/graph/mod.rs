//! The dependency graph.
//!
//! This module provides:
//! - [`Node`]s described by optional capabilities rather than by type
//! - A mutable [`Graph`] that transformers populate, and its read-only
//!   [`FrozenGraph`] form
//! - The [`ReferenceMap`] that turns consumed addresses into edges
//! - The [`GraphBuilder`] running the transformer pipeline

mod builder;
mod dag;
mod node;
mod refmap;
pub mod transform;

pub use builder::{BuildOptions, BuiltGraph, GraphBuilder};
pub use dag::{FrozenGraph, Graph, NodeId};
pub use node::{Node, NodeKind, ProvideRole, Provided};
pub use refmap::ReferenceMap;
