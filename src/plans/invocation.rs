//! Planned action invocations.

use serde::{Deserialize, Serialize};

use crate::addrs::Address;
use crate::lang::DynamicValue;

/// Lifecycle event that triggers an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerEvent {
    /// Before the resource is created.
    BeforeCreate,
    /// After the resource is created.
    AfterCreate,
    /// Before the resource is updated.
    BeforeUpdate,
    /// After the resource is updated.
    AfterUpdate,
    /// Before the resource is destroyed.
    BeforeDestroy,
    /// After the resource is destroyed.
    AfterDestroy,
}

/// What caused an action invocation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionTrigger {
    /// Resource instance whose lifecycle fired the trigger.
    pub resource: Address,
    /// The event.
    pub event: TriggerEvent,
    /// Position of the trigger block in the resource's lifecycle.
    pub trigger_index: usize,
    /// Position of the action within that trigger's list.
    pub action_index: usize,
}

/// An action that will be invoked during apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionInvocation {
    /// Action address.
    pub addr: Address,
    /// Provider configuration that runs the action.
    pub provider: Address,
    /// What fired it.
    pub trigger: ActionTrigger,
    /// Evaluated action configuration.
    pub config: DynamicValue,
}

impl TriggerEvent {
    /// Returns true for events that run before the resource change.
    #[must_use]
    pub const fn is_before(self) -> bool {
        matches!(self, Self::BeforeCreate | Self::BeforeUpdate | Self::BeforeDestroy)
    }

    /// Parses the configuration spelling of an event.
    #[must_use]
    pub fn from_config(name: &str) -> Option<Self> {
        match name {
            "before_create" => Some(Self::BeforeCreate),
            "after_create" => Some(Self::AfterCreate),
            "before_update" => Some(Self::BeforeUpdate),
            "after_update" => Some(Self::AfterUpdate),
            "before_destroy" => Some(Self::BeforeDestroy),
            "after_destroy" => Some(Self::AfterDestroy),
            _ => None,
        }
    }
}

impl ActionInvocation {
    /// Ordering key: by triggering resource, then trigger position.
    #[must_use]
    pub fn sort_key(&self) -> (&ActionTrigger, &Address) {
        (&self.trigger, &self.addr)
    }
}

impl std::fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::BeforeCreate => "before_create",
            Self::AfterCreate => "after_create",
            Self::BeforeUpdate => "before_update",
            Self::AfterUpdate => "after_update",
            Self::BeforeDestroy => "before_destroy",
            Self::AfterDestroy => "after_destroy",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_parsing() {
        assert_eq!(TriggerEvent::from_config("after_create"), Some(TriggerEvent::AfterCreate));
        assert_eq!(TriggerEvent::from_config("after_destroy"), Some(TriggerEvent::AfterDestroy));
        assert_eq!(TriggerEvent::from_config("on_delete"), None);
        assert!(TriggerEvent::BeforeUpdate.is_before());
        assert!(!TriggerEvent::AfterUpdate.is_before());
    }
}
