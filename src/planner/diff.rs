//! Action derivation for a single object.
//!
//! This module decides which [`Action`] takes an object from its prior
//! value to the value the provider planned, and compares values for
//! drift reporting and apply-time consistency checks.

use std::collections::BTreeSet;
use tracing::debug;

use crate::lang::{AttributePath, Value};
use crate::plans::{Action, ActionReason};

/// Everything the action of one object depends on.
#[derive(Debug, Clone, Copy)]
pub struct DiffInput<'a> {
    /// Refreshed prior value, null when the object does not exist yet.
    pub prior: &'a Value,
    /// Value the provider planned, null for a delete.
    pub planned: &'a Value,
    /// Attributes whose change cannot be made in place.
    pub requires_replace: &'a [AttributePath],
    /// The object was named in the force-replace list.
    pub replace_requested: bool,
    /// Create the replacement before destroying the old object.
    pub create_before_destroy: bool,
}

/// The derived action and the advisory reason shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionDecision {
    /// The action.
    pub action: Action,
    /// Why the action was chosen, when it is not self-evident.
    pub reason: ActionReason,
}

/// Derives the action for one object.
///
/// A null prior means create, a null plan means delete, an identical
/// plan means no-op. Anything else is an update unless a replacement is
/// required or requested.
#[must_use]
pub fn derive_action(input: &DiffInput<'_>) -> ActionDecision {
    let decision = match (input.prior.is_null(), input.planned.is_null()) {
        (true, true) => decide(Action::NoOp, ActionReason::None),
        (true, false) => decide(Action::Create, ActionReason::None),
        (false, true) => decide(Action::Delete, ActionReason::None),
        (false, false) => {
            let replace_reason = if input.replace_requested {
                Some(ActionReason::ReplaceByRequest)
            } else if input.requires_replace.is_empty() {
                None
            } else {
                Some(ActionReason::ReplaceBecauseCannotUpdate)
            };
            match replace_reason {
                Some(reason) if input.create_before_destroy => decide(Action::CreateThenDelete, reason),
                Some(reason) => decide(Action::DeleteThenCreate, reason),
                None if input.prior == input.planned => decide(Action::NoOp, ActionReason::None),
                None => decide(Action::Update, ActionReason::None),
            }
        }
    };
    debug!("Derived action {} ({:?})", decision.action, decision.reason);
    decision
}

const fn decide(action: Action, reason: ActionReason) -> ActionDecision {
    ActionDecision { action, reason }
}

/// Names of the top-level attributes that differ between two object
/// values, sorted.
#[must_use]
pub fn changed_attributes(before: &Value, after: &Value) -> Vec<String> {
    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            let names: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
            names
                .into_iter()
                .filter(|name| old.get(*name).unwrap_or(&Value::Null) != new.get(*name).unwrap_or(&Value::Null))
                .cloned()
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Returns true when `fresh` agrees with `saved` wherever `saved` is
/// known.
///
/// Unknown parts of a saved plan may become anything; every known part
/// must come out exactly the same when the plan is recomputed at apply.
#[must_use]
pub fn conforms(saved: &Value, fresh: &Value) -> bool {
    match (saved, fresh) {
        (Value::Unknown, _) => true,
        (Value::List(old), Value::List(new)) => {
            old.len() == new.len() && old.iter().zip(new).all(|(o, n)| conforms(o, n))
        }
        (Value::Object(old), Value::Object(new)) => {
            let names: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
            names.into_iter().all(|name| {
                conforms(
                    old.get(name).unwrap_or(&Value::Null),
                    new.get(name).unwrap_or(&Value::Null),
                )
            })
        }
        _ => saved == fresh,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(value: &str) -> Value {
        Value::object([("id", Value::string("abc")), ("value", Value::string(value))])
    }

    fn input<'a>(prior: &'a Value, planned: &'a Value) -> DiffInput<'a> {
        DiffInput {
            prior,
            planned,
            requires_replace: &[],
            replace_requested: false,
            create_before_destroy: false,
        }
    }

    #[test]
    fn test_basic_actions() {
        let old = object("a");
        let new = object("b");
        assert_eq!(derive_action(&input(&Value::Null, &new)).action, Action::Create);
        assert_eq!(derive_action(&input(&old, &Value::Null)).action, Action::Delete);
        assert_eq!(derive_action(&input(&old, &old.clone())).action, Action::NoOp);
        assert_eq!(derive_action(&input(&old, &new)).action, Action::Update);
    }

    #[test]
    fn test_replacement() {
        let old = object("a");
        let new = object("b");
        let paths = [AttributePath::attr("value")];

        let mut diff = input(&old, &new);
        diff.requires_replace = &paths;
        let decision = derive_action(&diff);
        assert_eq!(decision.action, Action::DeleteThenCreate);
        assert_eq!(decision.reason, ActionReason::ReplaceBecauseCannotUpdate);

        diff.create_before_destroy = true;
        assert_eq!(derive_action(&diff).action, Action::CreateThenDelete);
    }

    #[test]
    fn test_requested_replacement_of_unchanged_object() {
        let old = object("a");
        let mut diff = input(&old, &old);
        diff.replace_requested = true;
        let decision = derive_action(&diff);
        assert_eq!(decision.action, Action::DeleteThenCreate);
        assert_eq!(decision.reason, ActionReason::ReplaceByRequest);
    }

    #[test]
    fn test_changed_attributes() {
        let old = object("a");
        let new = Value::object([("id", Value::string("abc")), ("value", Value::string("b")), ("extra", Value::Bool(true))]);
        assert_eq!(changed_attributes(&old, &new), vec!["extra", "value"]);
    }

    #[test]
    fn test_conforms_ignores_unknowns() {
        let saved = Value::object([("id", Value::Unknown), ("value", Value::string("a"))]);
        assert!(conforms(&saved, &object("a")));
        assert!(!conforms(&saved, &object("b")));
        assert!(!conforms(&object("a"), &saved));
    }
}
