//! Change actions and the reason codes attached to them.

use serde::{Deserialize, Serialize};

/// What will be done to one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Nothing changes.
    NoOp,
    /// A new object is created.
    Create,
    /// A data source is read.
    Read,
    /// The object is changed in place.
    Update,
    /// The object is destroyed, then recreated.
    DeleteThenCreate,
    /// A replacement is created before the old object is destroyed.
    CreateThenDelete,
    /// The object is destroyed.
    Delete,
    /// The object is dropped from state but left in place.
    Forget,
    /// A replacement is created and the old object is dropped from state.
    CreateThenForget,
}

/// Why an action was chosen. Advisory only: apply never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionReason {
    /// No particular reason.
    #[default]
    None,
    /// Replacement was requested explicitly.
    ReplaceByRequest,
    /// The provider cannot make the change in place.
    ReplaceBecauseCannotUpdate,
    /// The configuration for the resource was removed.
    DeleteBecauseNoResourceConfig,
    /// The instance key is no longer produced by `count`.
    DeleteBecauseCountIndex,
    /// The data source configuration contains unknown values.
    ReadBecauseConfigUnknown,
    /// The data source depends on a resource with pending changes.
    ReadBecauseDependencyPending,
}

/// Why a change was deferred to a later plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferredReason {
    /// The number of instances is not known yet.
    InstanceCountUnknown,
    /// The resource configuration is not known well enough to plan.
    ResourceConfigUnknown,
    /// The provider configuration is not known yet.
    ProviderConfigUnknown,
    /// A prerequisite object does not exist yet.
    AbsentPrereq,
    /// A prerequisite change was itself deferred.
    DeferredPrereq,
}

/// Planning mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    /// Converge remote objects to the configuration.
    #[default]
    Normal,
    /// Destroy every managed object.
    Destroy,
    /// Only update state to match remote objects.
    RefreshOnly,
}

impl Action {
    /// Returns true for the replacing actions.
    #[must_use]
    pub const fn is_replace(self) -> bool {
        matches!(self, Self::DeleteThenCreate | Self::CreateThenDelete | Self::CreateThenForget)
    }

    /// Returns true if the action creates a new object.
    #[must_use]
    pub const fn creates(self) -> bool {
        matches!(
            self,
            Self::Create | Self::DeleteThenCreate | Self::CreateThenDelete | Self::CreateThenForget
        )
    }

    /// Returns true if the action destroys the current object.
    #[must_use]
    pub const fn destroys(self) -> bool {
        matches!(self, Self::Delete | Self::DeleteThenCreate | Self::CreateThenDelete)
    }

    /// Returns true if the action leaves remote objects untouched.
    #[must_use]
    pub const fn is_noop(self) -> bool {
        matches!(self, Self::NoOp)
    }

    /// Whether the `before` value slot must be populated.
    #[must_use]
    pub const fn needs_before(self) -> bool {
        !matches!(self, Self::Create | Self::Read)
    }

    /// Whether the `after` value slot must be populated.
    #[must_use]
    pub const fn needs_after(self) -> bool {
        !matches!(self, Self::Delete | Self::Forget)
    }

    /// One-character symbol used in plan output.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::NoOp => " ",
            Self::Create => "+",
            Self::Read => "<=",
            Self::Update => "~",
            Self::DeleteThenCreate => "-/+",
            Self::CreateThenDelete => "+/-",
            Self::Delete => "-",
            Self::Forget => ".",
            Self::CreateThenForget => "+/.",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::DeleteThenCreate => "replace (delete first)",
            Self::CreateThenDelete => "replace (create first)",
            Self::Delete => "delete",
            Self::Forget => "forget",
            Self::CreateThenForget => "replace (forget old)",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for DeferredReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InstanceCountUnknown => "instance count unknown",
            Self::ResourceConfigUnknown => "resource configuration unknown",
            Self::ProviderConfigUnknown => "provider configuration unknown",
            Self::AbsentPrereq => "prerequisite absent",
            Self::DeferredPrereq => "prerequisite deferred",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PlanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::Destroy => "destroy",
            Self::RefreshOnly => "refresh-only",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_requirements() {
        assert!(!Action::Create.needs_before());
        assert!(Action::Create.needs_after());
        assert!(Action::Delete.needs_before());
        assert!(!Action::Delete.needs_after());
        assert!(Action::Update.needs_before() && Action::Update.needs_after());
        assert!(!Action::Forget.needs_after());
    }

    #[test]
    fn test_classification() {
        assert!(Action::CreateThenDelete.is_replace());
        assert!(Action::CreateThenDelete.creates());
        assert!(Action::CreateThenDelete.destroys());
        assert!(!Action::CreateThenForget.destroys());
        assert!(!Action::Forget.destroys());
    }
}
