//! Graph nodes and their capabilities.
//!
//! A node carries optional capability records instead of implementing a
//! capability per variant: what it provides to others, what it consumes,
//! and which module it belongs to. Graph algorithms only ever ask a node
//! for those records, never for its kind.

use std::collections::BTreeSet;

use crate::addrs::{Address, DeposedKey, ModulePath};

/// What a node is for. The executor dispatches on this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// A provider configuration.
    ProviderConfig(Address),
    /// The value of an input variable.
    Variable(Address),
    /// The validation rules of an input variable.
    VariableValidation(Address),
    /// A local value.
    Local(Address),
    /// A configured resource, expanded to its instances when executed.
    Resource(Address),
    /// An object in prior state that no configured resource node plans.
    Orphan {
        /// Instance address.
        instance: Address,
        /// Set for a deposed object.
        deposed: Option<DeposedKey>,
    },
    /// An output value.
    Output(Address),
    /// A check block.
    Check(Address),
    /// An action declaration.
    Action(Address),
}

/// How a node stands behind an address it provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProvideRole {
    /// The node produces the address's value.
    Value,
    /// The node only vouches for the value, e.g. by validating it.
    Gate,
}

/// An address a node provides.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Provided {
    /// The address.
    pub addr: Address,
    /// Value producer or gate.
    pub role: ProvideRole,
}

/// A unit of planning work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    kind: NodeKind,
    provides: Vec<Provided>,
    consumes: Option<BTreeSet<Address>>,
    module: Option<ModulePath>,
}

impl Node {
    /// Creates a node with no capabilities.
    #[must_use]
    pub const fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            provides: Vec::new(),
            consumes: None,
            module: None,
        }
    }

    /// Adds an address whose value this node produces.
    #[must_use]
    pub fn providing(mut self, addr: Address) -> Self {
        self.provides.push(Provided {
            addr,
            role: ProvideRole::Value,
        });
        self
    }

    /// Adds an address this node gates without producing it.
    #[must_use]
    pub fn gating(mut self, addr: Address) -> Self {
        self.provides.push(Provided {
            addr,
            role: ProvideRole::Gate,
        });
        self
    }

    /// Sets the addresses this node reads.
    #[must_use]
    pub fn consuming(mut self, addrs: BTreeSet<Address>) -> Self {
        self.consumes = Some(addrs);
        self
    }

    /// Sets the module the node belongs to.
    #[must_use]
    pub fn in_module(mut self, module: ModulePath) -> Self {
        self.module = Some(module);
        self
    }

    /// What the node is for.
    #[must_use]
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Addresses this node announces. Empty when it is not referenceable.
    #[must_use]
    pub fn provides(&self) -> &[Provided] {
        &self.provides
    }

    /// Addresses this node reads, if it reads anything.
    #[must_use]
    pub const fn consumes(&self) -> Option<&BTreeSet<Address>> {
        self.consumes.as_ref()
    }

    /// Module the node belongs to, if it is module-scoped.
    #[must_use]
    pub const fn module_path(&self) -> Option<&ModulePath> {
        self.module.as_ref()
    }

    /// The node's own address.
    #[must_use]
    pub const fn address(&self) -> &Address {
        match &self.kind {
            NodeKind::ProviderConfig(addr)
            | NodeKind::Variable(addr)
            | NodeKind::VariableValidation(addr)
            | NodeKind::Local(addr)
            | NodeKind::Resource(addr)
            | NodeKind::Output(addr)
            | NodeKind::Check(addr)
            | NodeKind::Action(addr)
            | NodeKind::Orphan { instance: addr, .. } => addr,
        }
    }

    /// Human-readable node name for logs and diagnostics.
    #[must_use]
    pub fn name(&self) -> String {
        match &self.kind {
            NodeKind::VariableValidation(addr) => format!("{addr} (validation)"),
            NodeKind::Orphan {
                instance,
                deposed: Some(key),
            } => format!("{instance} (deposed {key})"),
            NodeKind::Orphan { instance, deposed: None } => format!("{instance} (orphan)"),
            NodeKind::ProviderConfig(addr)
            | NodeKind::Variable(addr)
            | NodeKind::Local(addr)
            | NodeKind::Resource(addr)
            | NodeKind::Output(addr)
            | NodeKind::Check(addr)
            | NodeKind::Action(addr) => addr.to_string(),
        }
    }

    /// Returns true if this node produces the value of `addr`.
    #[must_use]
    pub fn provides_value(&self, addr: &Address) -> bool {
        self.provides
            .iter()
            .any(|p| p.role == ProvideRole::Value && &p.addr == addr)
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_are_optional() {
        let addr = Address::root_variable("v");
        let bare = Node::new(NodeKind::Variable(addr.clone()));
        assert!(bare.provides().is_empty());
        assert!(bare.consumes().is_none());
        assert!(bare.module_path().is_none());

        let full = Node::new(NodeKind::VariableValidation(addr.clone()))
            .gating(addr.clone())
            .consuming(BTreeSet::from([Address::root_variable("limit")]))
            .in_module(ModulePath::root());
        assert!(!full.provides_value(&addr));
        assert_eq!(full.provides()[0].role, ProvideRole::Gate);
        assert_eq!(full.name(), "var.v (validation)");
    }
}
