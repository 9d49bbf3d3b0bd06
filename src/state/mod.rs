//! State management module for the plangraph engine.
//!
//! This module provides persistent state storage for the objects the engine
//! manages: their last applied attributes, provider-private data and
//! dependencies, plus root output values.

mod local;
mod store;
mod types;

pub use local::LocalStateStore;
pub use store::StateStore;
pub use types::{DeposedObject, OutputState, ResourceInstanceObject, STATE_VERSION, State};
