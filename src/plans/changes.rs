//! Per-object change records.

use serde::{Deserialize, Serialize};

use crate::addrs::{Address, DeposedKey};
use crate::lang::{AttributePath, DynamicValue};

use super::action::{Action, ActionReason, DeferredReason};

/// Import details carried by a change that adopts an existing object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Importing {
    /// Import id given in configuration.
    pub id: String,
    /// Identity of the imported object, when the provider supports identities.
    pub identity: DynamicValue,
}

/// A planned change to one object: what it is now and what it will become.
///
/// Which value slots are populated depends on the action; see
/// [`Change::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// The action to take.
    pub action: Action,
    /// Current value, null when creating.
    pub before: DynamicValue,
    /// Planned value, null when destroying.
    pub after: DynamicValue,
    /// Current identity.
    pub before_identity: DynamicValue,
    /// Planned identity.
    pub after_identity: DynamicValue,
    /// Sensitive attribute paths of `before`.
    pub before_sensitive_paths: Vec<AttributePath>,
    /// Sensitive attribute paths of `after`.
    pub after_sensitive_paths: Vec<AttributePath>,
    /// Set when the object is being imported.
    pub importing: Option<Importing>,
    /// Configuration text generated for an imported object.
    pub generated_config: String,
}

impl Change {
    fn with_values(action: Action, before: DynamicValue, after: DynamicValue) -> Self {
        Self {
            action,
            before,
            after,
            before_identity: DynamicValue::Null,
            after_identity: DynamicValue::Null,
            before_sensitive_paths: Vec::new(),
            after_sensitive_paths: Vec::new(),
            importing: None,
            generated_config: String::new(),
        }
    }

    /// A creation: nothing before, `after` afterwards.
    #[must_use]
    pub fn create(after: DynamicValue) -> Self {
        Self::with_values(Action::Create, DynamicValue::Null, after)
    }

    /// A destruction: `before` now, nothing afterwards.
    #[must_use]
    pub fn delete(before: DynamicValue) -> Self {
        Self::with_values(Action::Delete, before, DynamicValue::Null)
    }

    /// Dropping an object from state without destroying it.
    #[must_use]
    pub fn forget(before: DynamicValue) -> Self {
        Self::with_values(Action::Forget, before, DynamicValue::Null)
    }

    /// A change between two populated values: update, replace or no-op.
    #[must_use]
    pub fn transition(action: Action, before: DynamicValue, after: DynamicValue) -> Self {
        Self::with_values(action, before, after)
    }

    /// A data source read.
    #[must_use]
    pub fn read(before: DynamicValue, after: DynamicValue) -> Self {
        Self::with_values(Action::Read, before, after)
    }

    /// Sets the sensitive paths of both values.
    #[must_use]
    pub fn with_sensitive_paths(mut self, before: Vec<AttributePath>, after: Vec<AttributePath>) -> Self {
        self.before_sensitive_paths = before;
        if self.action.needs_after() {
            self.after_sensitive_paths = after;
        }
        self
    }

    /// Sets the identities of both values.
    #[must_use]
    pub fn with_identities(mut self, before: DynamicValue, after: DynamicValue) -> Self {
        self.before_identity = before;
        self.after_identity = after;
        self
    }

    /// Marks the change as an import.
    #[must_use]
    pub fn with_importing(mut self, importing: Importing) -> Self {
        self.importing = Some(importing);
        self
    }

    /// Checks that the populated value slots agree with the action.
    ///
    /// # Errors
    ///
    /// Returns a description of the first slot that is populated when it
    /// must be empty, or empty when it must be populated.
    pub fn validate(&self) -> Result<(), String> {
        let action = self.action;
        match action {
            Action::Create if !self.before.is_null() => {
                return Err(format!("{action} change must not carry a prior value"));
            }
            Action::Read => {}
            _ if action.needs_before() && self.before.is_null() => {
                return Err(format!("{action} change is missing its prior value"));
            }
            _ => {}
        }
        if action.needs_after() && self.after.is_null() {
            return Err(format!("{action} change is missing its planned value"));
        }
        if !action.needs_after() {
            if !self.after.is_null() {
                return Err(format!("{action} change must not carry a planned value"));
            }
            if !self.after_sensitive_paths.is_empty() {
                return Err(format!("{action} change must not mark planned attributes sensitive"));
            }
        }
        Ok(())
    }
}

/// A change to one resource instance object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInstanceChange {
    /// Instance address.
    pub addr: Address,
    /// Address the object had in the previous run, when it moved.
    pub prev_run_addr: Address,
    /// Set for changes to deposed objects.
    pub deposed: Option<DeposedKey>,
    /// Provider configuration managing the object.
    pub provider: Address,
    /// The change itself.
    pub change: Change,
    /// Provider-private data to hand back at apply.
    pub private: Vec<u8>,
    /// Attributes that forced a replacement.
    pub required_replace: Vec<AttributePath>,
    /// Why the action was chosen.
    pub action_reason: ActionReason,
}

impl ResourceInstanceChange {
    /// Creates a change for the current object of `addr`.
    #[must_use]
    pub fn new(addr: Address, provider: Address, change: Change) -> Self {
        Self {
            prev_run_addr: addr.clone(),
            addr,
            deposed: None,
            provider,
            change,
            private: Vec::new(),
            required_replace: Vec::new(),
            action_reason: ActionReason::None,
        }
    }

    /// Sets the reason code.
    #[must_use]
    pub const fn with_reason(mut self, reason: ActionReason) -> Self {
        self.action_reason = reason;
        self
    }

    /// Marks the change as targeting a deposed object.
    #[must_use]
    pub fn with_deposed(mut self, key: DeposedKey) -> Self {
        self.deposed = Some(key);
        self
    }

    /// Shortcut for the change's action.
    #[must_use]
    pub const fn action(&self) -> Action {
        self.change.action
    }

    /// Key identifying the object this change is about.
    #[must_use]
    pub fn object_key(&self) -> (Address, Option<DeposedKey>) {
        (self.addr.clone(), self.deposed.clone())
    }
}

/// A change that could not be planned fully yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredResourceInstanceChange {
    /// Why it was deferred.
    pub reason: DeferredReason,
    /// The partial change, possibly with unknown values.
    pub change: ResourceInstanceChange,
}

/// A planned change to an output value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChange {
    /// Output address.
    pub addr: Address,
    /// The change.
    pub change: Change,
    /// Whether the value is sensitive.
    pub sensitive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::Value;

    fn known(s: &str) -> DynamicValue {
        DynamicValue::encode(&Value::string(s))
    }

    #[test]
    fn test_constructors_satisfy_slots() {
        Change::create(known("a")).validate().expect("create");
        Change::delete(known("a")).validate().expect("delete");
        Change::forget(known("a")).validate().expect("forget");
        Change::transition(Action::Update, known("a"), known("b"))
            .validate()
            .expect("update");
        Change::read(DynamicValue::Null, DynamicValue::Unknown)
            .validate()
            .expect("read");
    }

    #[test]
    fn test_bad_slots_rejected() {
        let mut change = Change::delete(known("a"));
        change.after = known("b");
        assert!(change.validate().is_err());

        let change = Change::transition(Action::Update, DynamicValue::Null, known("b"));
        assert!(change.validate().is_err());

        let change = Change::create(DynamicValue::Null);
        assert!(change.validate().is_err());
    }

    #[test]
    fn test_delete_drops_after_sensitive_paths() {
        let change = Change::delete(known("a")).with_sensitive_paths(vec![], vec![AttributePath::attr("secret")]);
        assert!(change.after_sensitive_paths.is_empty());
        change.validate().expect("valid");
    }
}
