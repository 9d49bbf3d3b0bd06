//! Values produced by completed nodes, visible to the nodes after them.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::addrs::Address;
use crate::lang::Value;

/// Shared value table of one walk.
///
/// A node's values are merged only once the node has completed, so a
/// reader never sees a half-written result.
#[derive(Debug, Default)]
pub struct WalkValues {
    inner: RwLock<BTreeMap<Address, Value>>,
}

impl WalkValues {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table pre-seeded with `values`.
    #[must_use]
    pub fn with_values(values: BTreeMap<Address, Value>) -> Self {
        Self {
            inner: RwLock::new(values),
        }
    }

    /// Returns the value of `addr`.
    #[must_use]
    pub fn get(&self, addr: &Address) -> Option<Value> {
        self.inner.read().get(addr).cloned()
    }

    /// Sets the value of `addr`.
    pub fn insert(&self, addr: Address, value: Value) {
        self.inner.write().insert(addr, value);
    }

    /// Merges several values at once.
    pub fn extend(&self, values: impl IntoIterator<Item = (Address, Value)>) {
        self.inner.write().extend(values);
    }

    /// Copies the whole table.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<Address, Value> {
        self.inner.read().clone()
    }
}
