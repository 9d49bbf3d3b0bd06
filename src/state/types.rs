//! State types for tracking managed objects.
//!
//! These types represent the recorded result of the last apply: every
//! remote object the engine manages, the outputs, and enough bookkeeping
//! (lineage, serial) to detect that a saved plan was made against another
//! state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::addrs::{Address, DeposedKey};
use crate::lang::Value;

/// Current version of the state format.
pub const STATE_VERSION: u32 = 4;

/// The complete recorded state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct State {
    /// State format version.
    pub version: u32,
    /// Identity of this state's history; never changes once created.
    pub lineage: String,
    /// Incremented on every save that changes the content.
    pub serial: u64,
    /// Current objects, by resource instance address.
    #[serde(default)]
    pub resources: BTreeMap<Address, ResourceInstanceObject>,
    /// Objects replaced by a create-before-destroy whose destroy has not
    /// happened yet.
    #[serde(default)]
    pub deposed: Vec<DeposedObject>,
    /// Root output values.
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputState>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
}

/// One remote object as recorded after apply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceInstanceObject {
    /// Object attributes.
    pub value: serde_json::Value,
    /// Provider-private data, passed back to the provider untouched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub private: Vec<u8>,
    /// Identity attributes, when the resource type has an identity schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<serde_json::Value>,
    /// Provider configuration that manages the object.
    pub provider: Address,
    /// Resources this object depended on when it was last applied.
    #[serde(default)]
    pub dependencies: BTreeSet<Address>,
    /// Whether the resource was configured with `create_before_destroy`.
    #[serde(default)]
    pub create_before_destroy: bool,
}

/// A deposed object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeposedObject {
    /// Instance address the object used to be current for.
    pub addr: Address,
    /// Deposed key.
    pub key: DeposedKey,
    /// The object.
    pub object: ResourceInstanceObject,
}

/// A recorded output value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputState {
    /// Output value.
    pub value: serde_json::Value,
    /// Whether the value is hidden in output.
    #[serde(default)]
    pub sensitive: bool,
}

impl State {
    /// Creates an empty state with a fresh lineage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            lineage: uuid::Uuid::new_v4().to_string(),
            serial: 0,
            resources: BTreeMap::new(),
            deposed: Vec::new(),
            outputs: BTreeMap::new(),
            last_updated: Utc::now(),
        }
    }

    /// Returns the current object of an instance.
    #[must_use]
    pub fn object(&self, addr: &Address) -> Option<&ResourceInstanceObject> {
        self.resources.get(addr)
    }

    /// Returns a deposed object.
    #[must_use]
    pub fn deposed_object(&self, addr: &Address, key: &DeposedKey) -> Option<&ResourceInstanceObject> {
        self.deposed
            .iter()
            .find(|d| &d.addr == addr && &d.key == key)
            .map(|d| &d.object)
    }

    /// Records or replaces the current object of an instance.
    pub fn set_object(&mut self, addr: Address, object: ResourceInstanceObject) {
        self.resources.insert(addr, object);
        self.touch();
    }

    /// Removes the current object of an instance.
    pub fn remove_object(&mut self, addr: &Address) -> Option<ResourceInstanceObject> {
        let removed = self.resources.remove(addr);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Moves the current object of an instance aside under a fresh key.
    pub fn depose(&mut self, addr: &Address) -> Option<DeposedKey> {
        let object = self.resources.remove(addr)?;
        let key = DeposedKey::generate();
        self.deposed.push(DeposedObject {
            addr: addr.clone(),
            key: key.clone(),
            object,
        });
        self.touch();
        Some(key)
    }

    /// Removes a deposed object.
    pub fn remove_deposed(&mut self, addr: &Address, key: &DeposedKey) {
        let before = self.deposed.len();
        self.deposed.retain(|d| !(&d.addr == addr && &d.key == key));
        if self.deposed.len() != before {
            self.touch();
        }
    }

    /// Current instances of `resource`, a resource address.
    pub fn instances_of<'a>(&'a self, resource: &'a Address) -> impl Iterator<Item = (&'a Address, &'a ResourceInstanceObject)> {
        self.resources
            .iter()
            .filter(move |(addr, _)| &addr.containing_resource() == resource)
    }

    /// Every managed instance with a current object.
    #[must_use]
    pub fn managed_instances(&self) -> BTreeSet<Address> {
        self.resources
            .keys()
            .filter(|addr| addr.is_managed_instance())
            .cloned()
            .collect()
    }

    /// Records a root output value.
    pub fn set_output(&mut self, name: impl Into<String>, value: &Value, sensitive: bool) {
        self.outputs.insert(
            name.into(),
            OutputState {
                value: value.to_json(),
                sensitive,
            },
        );
        self.touch();
    }

    /// Removes a root output value.
    pub fn remove_output(&mut self, name: &str) {
        if self.outputs.remove(name).is_some() {
            self.touch();
        }
    }

    /// Marks the start of a new generation of this state.
    pub fn bump_serial(&mut self) {
        self.serial += 1;
        self.touch();
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.deposed.is_empty() && self.outputs.is_empty()
    }

    /// Returns the number of recorded objects, deposed ones included.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.resources.len() + self.deposed.len()
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceInstanceObject {
    /// Creates an object from its attributes.
    #[must_use]
    pub fn new(value: &Value, provider: Address) -> Self {
        Self {
            value: value.to_json(),
            private: Vec::new(),
            identity: None,
            provider,
            dependencies: BTreeSet::new(),
            create_before_destroy: false,
        }
    }

    /// Returns the object attributes.
    #[must_use]
    pub fn value(&self) -> Value {
        Value::from_json(&self.value)
    }

    /// Returns the identity attributes, null when there are none.
    #[must_use]
    pub fn identity(&self) -> Value {
        self.identity.as_ref().map_or(Value::Null, Value::from_json)
    }

    /// Sets the provider-private data.
    #[must_use]
    pub fn with_private(mut self, private: Vec<u8>) -> Self {
        self.private = private;
        self
    }

    /// Sets the recorded dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: BTreeSet<Address>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::{InstanceKey, ModulePath, ResourceAddr};

    fn instance(name: &str, key: InstanceKey) -> Address {
        Address::instance(ModulePath::root(), ResourceAddr::managed("test_resource", name), key)
    }

    fn object(id: &str) -> ResourceInstanceObject {
        ResourceInstanceObject::new(
            &Value::object([("id", Value::string(id))]),
            Address::provider("test", None),
        )
    }

    #[test]
    fn test_new_state() {
        let state = State::new();
        assert_eq!(state.version, STATE_VERSION);
        assert_eq!(state.serial, 0);
        assert_eq!(state.lineage.len(), 36);
        assert!(state.is_empty());
    }

    #[test]
    fn test_instances_of_resource() {
        let mut state = State::new();
        state.set_object(instance("a", InstanceKey::Int(0)), object("a0"));
        state.set_object(instance("a", InstanceKey::Int(1)), object("a1"));
        state.set_object(instance("b", InstanceKey::NoKey), object("b"));

        let resource = instance("a", InstanceKey::Int(0)).containing_resource();
        assert_eq!(state.instances_of(&resource).count(), 2);
        assert_eq!(state.managed_instances().len(), 3);
    }

    #[test]
    fn test_depose_and_remove() {
        let mut state = State::new();
        let addr = instance("a", InstanceKey::NoKey);
        state.set_object(addr.clone(), object("old"));

        let key = state.depose(&addr).expect("deposed");
        assert!(state.object(&addr).is_none());
        assert_eq!(
            state.deposed_object(&addr, &key).map(|o| o.value().get_attr("id")),
            Some(Value::string("old"))
        );

        state.remove_deposed(&addr, &key);
        assert_eq!(state.object_count(), 0);
    }

    #[test]
    fn test_state_json_round_trip() {
        let mut state = State::new();
        state.set_object(instance("a", InstanceKey::NoKey), object("a"));
        state.set_output("id", &Value::string("a"), false);

        let json = serde_json::to_string(&state).expect("serialize");
        let parsed: State = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, state);
    }
}
