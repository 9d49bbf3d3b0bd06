//! Concurrent, dependency-ordered execution of a frozen graph.
//!
//! The walker knows nothing about planning or applying: it schedules nodes
//! and hands each one to a [`NodeExecutor`], merging what the node produced
//! once it has completed.

mod values;
mod walker;

pub use values::WalkValues;
pub use walker::{NodeExecutor, NodeOutput, NodeState, WalkReport, Walker};
