//! Concurrent accumulation of plan contributions.
//!
//! Every collection of the plan under construction has its own lock, so
//! contributions to different collections never contend. A deferred change
//! and a resource change for the same address are mutually exclusive: the
//! deferral wins regardless of arrival order.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::addrs::{Address, DeposedKey};
use crate::lang::DynamicValue;

use super::changes::{DeferredResourceInstanceChange, OutputChange, ResourceInstanceChange};
use super::checks::CheckResult;
use super::invocation::ActionInvocation;

type ObjectKey = (Address, Option<DeposedKey>);

/// One entry produced by a node for the plan.
#[derive(Debug, Clone)]
pub enum Contribution {
    /// A planned resource instance change.
    ResourceChange(ResourceInstanceChange),
    /// A change detected outside the engine since the last run.
    Drift(ResourceInstanceChange),
    /// A change withheld until a later plan.
    Deferred(DeferredResourceInstanceChange),
    /// A planned output change.
    Output(OutputChange),
    /// A check result.
    Check(CheckResult),
    /// A planned action invocation.
    Invocation(ActionInvocation),
    /// The final value of a root input variable.
    Variable {
        /// Variable name.
        name: String,
        /// Its value.
        value: DynamicValue,
    },
    /// A managed resource instance the walk is responsible for planning.
    Object(Address),
}

/// The plan under construction.
#[derive(Debug, Default)]
pub struct ChangesSync {
    resource_changes: Mutex<BTreeMap<ObjectKey, ResourceInstanceChange>>,
    drift: Mutex<BTreeMap<ObjectKey, ResourceInstanceChange>>,
    deferred: Mutex<BTreeMap<Address, DeferredResourceInstanceChange>>,
    outputs: Mutex<BTreeMap<Address, OutputChange>>,
    checks: Mutex<BTreeMap<Address, CheckResult>>,
    invocations: Mutex<Vec<ActionInvocation>>,
    variables: Mutex<BTreeMap<String, DynamicValue>>,
    objects: Mutex<BTreeSet<Address>>,
}

/// Everything the accumulator holds, taken out at sealing time.
#[derive(Debug, Default)]
pub(crate) struct Collected {
    pub(crate) resource_changes: Vec<ResourceInstanceChange>,
    pub(crate) drift: Vec<ResourceInstanceChange>,
    pub(crate) deferred: BTreeMap<Address, DeferredResourceInstanceChange>,
    pub(crate) outputs: BTreeMap<Address, OutputChange>,
    pub(crate) checks: BTreeMap<Address, CheckResult>,
    pub(crate) invocations: Vec<ActionInvocation>,
    pub(crate) variables: BTreeMap<String, DynamicValue>,
    pub(crate) objects: BTreeSet<Address>,
}

impl ChangesSync {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one contribution.
    pub fn record(&self, contribution: Contribution) {
        match contribution {
            Contribution::ResourceChange(change) => {
                let mut changes = self.resource_changes.lock();
                if change.deposed.is_none() && self.deferred.lock().contains_key(&change.addr) {
                    debug!("Ignoring change for deferred {}", change.addr);
                    return;
                }
                changes.insert(change.object_key(), change);
            }
            Contribution::Drift(change) => {
                self.drift.lock().insert(change.object_key(), change);
            }
            Contribution::Deferred(deferred) => {
                let addr = deferred.change.addr.clone();
                let mut changes = self.resource_changes.lock();
                changes.remove(&(addr.clone(), None));
                self.deferred.lock().insert(addr, deferred);
            }
            Contribution::Output(output) => {
                self.outputs.lock().insert(output.addr.clone(), output);
            }
            Contribution::Check(result) => {
                self.checks.lock().insert(result.config_addr.clone(), result);
            }
            Contribution::Invocation(invocation) => {
                self.invocations.lock().push(invocation);
            }
            Contribution::Variable { name, value } => {
                self.variables.lock().insert(name, value);
            }
            Contribution::Object(addr) => {
                self.objects.lock().insert(addr);
            }
        }
    }

    /// Records every contribution in order.
    pub fn record_all(&self, contributions: impl IntoIterator<Item = Contribution>) {
        for contribution in contributions {
            self.record(contribution);
        }
    }

    /// Returns the planned change for the current object of `addr`.
    #[must_use]
    pub fn resource_change(&self, addr: &Address) -> Option<ResourceInstanceChange> {
        self.resource_changes.lock().get(&(addr.clone(), None)).cloned()
    }

    /// Returns true if any instance of `resource` was deferred.
    #[must_use]
    pub fn is_resource_deferred(&self, resource: &Address) -> bool {
        self.deferred
            .lock()
            .keys()
            .any(|addr| &addr.containing_resource() == resource)
    }

    /// Returns true if any instance of `resource` has a change other than no-op.
    #[must_use]
    pub fn has_pending_change(&self, resource: &Address) -> bool {
        self.resource_changes
            .lock()
            .values()
            .any(|c| &c.addr.containing_resource() == resource && !c.action().is_noop())
    }

    /// Number of recorded resource changes.
    #[must_use]
    pub fn resource_change_count(&self) -> usize {
        self.resource_changes.lock().len()
    }

    /// Takes everything out, in canonical order, leaving the accumulator
    /// empty.
    pub(crate) fn take_collected(&self) -> Collected {
        let mut invocations = std::mem::take(&mut *self.invocations.lock());
        invocations.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Collected {
            resource_changes: std::mem::take(&mut *self.resource_changes.lock()).into_values().collect(),
            drift: std::mem::take(&mut *self.drift.lock()).into_values().collect(),
            deferred: std::mem::take(&mut *self.deferred.lock()),
            outputs: std::mem::take(&mut *self.outputs.lock()),
            checks: std::mem::take(&mut *self.checks.lock()),
            invocations,
            variables: std::mem::take(&mut *self.variables.lock()),
            objects: std::mem::take(&mut *self.objects.lock()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::{InstanceKey, ModulePath, ResourceAddr};
    use crate::lang::Value;
    use crate::plans::{Change, DeferredReason};
    use std::sync::Arc;

    fn instance(name: &str) -> Address {
        Address::instance(
            ModulePath::root(),
            ResourceAddr::managed("test_resource", name),
            InstanceKey::NoKey,
        )
    }

    fn create(addr: Address) -> ResourceInstanceChange {
        ResourceInstanceChange::new(
            addr,
            Address::provider("test", None),
            Change::create(DynamicValue::encode(&Value::string("x"))),
        )
    }

    #[test]
    fn test_deferral_wins_in_either_order() {
        let sync = ChangesSync::new();
        let a = instance("a");
        sync.record(Contribution::ResourceChange(create(a.clone())));
        sync.record(Contribution::Deferred(DeferredResourceInstanceChange {
            reason: DeferredReason::ResourceConfigUnknown,
            change: create(a.clone()),
        }));
        assert!(sync.resource_change(&a).is_none());

        let b = instance("b");
        sync.record(Contribution::Deferred(DeferredResourceInstanceChange {
            reason: DeferredReason::ResourceConfigUnknown,
            change: create(b.clone()),
        }));
        sync.record(Contribution::ResourceChange(create(b.clone())));
        assert!(sync.resource_change(&b).is_none());

        let collected = sync.take_collected();
        assert!(collected.resource_changes.is_empty());
        assert_eq!(collected.deferred.len(), 2);
    }

    #[test]
    fn test_concurrent_contributions() {
        let sync = Arc::new(ChangesSync::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sync = Arc::clone(&sync);
                std::thread::spawn(move || {
                    for j in 0..25 {
                        let addr = instance(&format!("r{i}_{j}"));
                        sync.record(Contribution::Object(addr.clone()));
                        sync.record(Contribution::ResourceChange(create(addr)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }
        assert_eq!(sync.resource_change_count(), 200);
    }

    #[test]
    fn test_pending_change_lookup() {
        let sync = ChangesSync::new();
        let a = instance("a");
        sync.record(Contribution::ResourceChange(create(a.clone())));
        assert!(sync.has_pending_change(&a.containing_resource()));
        assert!(!sync.is_resource_deferred(&a.containing_resource()));
    }
}
