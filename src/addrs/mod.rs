//! Addressing for configuration entities.
//!
//! Addresses are the only cross-reference currency of the engine: a node
//! announces the addresses it provides and the addresses it consumes, and the
//! graph is wired purely by matching them.

mod address;
mod module;
mod parse;

pub use address::{Address, DeposedKey, InstanceKey, ResourceAddr, ResourceMode, Subject};
pub use module::ModulePath;
pub use parse::{parse_ref, Reference};
