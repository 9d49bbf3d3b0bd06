//! The sealed plan.
//!
//! A [`Plan`] only comes into existence through [`PlanBuilder::seal`]; its
//! fields are read-only afterwards. The three flags are derived from the
//! plan's own contents, so [`Plan::verify`] can recompute them at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;

use crate::addrs::{Address, DeposedKey};
use crate::diagnostics::Diagnostics;
use crate::lang::DynamicValue;
use crate::state::StateStore;

use super::action::{Action, PlanMode};
use super::changes::{DeferredResourceInstanceChange, OutputChange, ResourceInstanceChange};
use super::checks::CheckResult;
use super::invocation::ActionInvocation;
use super::sync::ChangesSync;

/// Current plan format version. Bumped only on breaking changes.
pub const PLAN_FORMAT_VERSION: u32 = 4;

/// The four valid combinations of the applyable and complete flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Safe to apply, and covers every object.
    ApplyableComplete,
    /// Safe to apply for the subset it covers.
    ApplyableIncomplete,
    /// Must not be applied, though every object was visited.
    BlockedComplete,
    /// Must not be applied, and some objects were not visited.
    BlockedIncomplete,
}

/// Where the state the plan was made against lives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Backend {
    /// Backend kind, e.g. `local`.
    pub kind: String,
    /// Backend-specific location.
    pub path: String,
    /// Workspace name.
    pub workspace: String,
}

impl Backend {
    /// Describes `store` in the default workspace.
    #[must_use]
    pub fn of_store(store: &dyn StateStore) -> Self {
        Self {
            kind: store.backend_type().to_string(),
            path: store.location(),
            workspace: String::from("default"),
        }
    }
}

/// Inputs to sealing that do not come from node contributions.
#[derive(Debug, Clone, Default)]
pub struct PlanContext {
    /// Planning mode.
    pub mode: PlanMode,
    /// Set when the walk was stopped by an interrupt.
    pub interrupted: bool,
    /// Nodes that never ran, each with the failed node it waited on.
    pub skipped: BTreeMap<Address, Address>,
    /// Diagnostics gathered over the whole run.
    pub diagnostics: Diagnostics,
    /// Managed instances recorded in prior state.
    pub prior_objects: BTreeSet<Address>,
    /// `--target` addresses.
    pub targets: Vec<Address>,
    /// `--replace` addresses.
    pub force_replace: Vec<Address>,
    /// Recorded provider function results.
    pub function_results: BTreeMap<String, DynamicValue>,
    /// State storage descriptor.
    pub backend: Backend,
    /// Lineage of the prior state.
    pub state_lineage: String,
    /// Serial of the prior state.
    pub state_serial: u64,
    /// Fingerprint of the configuration the plan was made from.
    pub config_fingerprint: String,
}

/// A plan under construction.
#[derive(Debug, Default)]
pub struct PlanBuilder {
    changes: Arc<ChangesSync>,
}

/// A sealed, immutable plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    version: u32,
    mode: PlanMode,
    status: PlanStatus,
    applyable: bool,
    complete: bool,
    errored: bool,
    interrupted: bool,
    skipped: BTreeMap<Address, Address>,
    created_at: DateTime<Utc>,
    variable_values: BTreeMap<String, DynamicValue>,
    resource_changes: Vec<ResourceInstanceChange>,
    drift: Vec<ResourceInstanceChange>,
    deferred_changes: BTreeMap<Address, DeferredResourceInstanceChange>,
    output_changes: BTreeMap<Address, OutputChange>,
    checks: BTreeMap<Address, CheckResult>,
    action_invocations: Vec<ActionInvocation>,
    objects: BTreeSet<Address>,
    targets: Vec<Address>,
    force_replace: Vec<Address>,
    function_results: BTreeMap<String, DynamicValue>,
    backend: Backend,
    state_lineage: String,
    state_serial: u64,
    config_fingerprint: String,
    diagnostics: Diagnostics,
}

/// Counts of planned actions, for summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    /// Objects to create (including the create half of replacements).
    pub create: usize,
    /// Objects to update in place.
    pub update: usize,
    /// Objects to destroy (including the destroy half of replacements).
    pub delete: usize,
    /// Objects to forget.
    pub forget: usize,
    /// Deferred changes.
    pub deferred: usize,
}

impl PlanStatus {
    /// Derives the status from the two underlying facts.
    #[must_use]
    pub const fn from_flags(applyable: bool, complete: bool) -> Self {
        match (applyable, complete) {
            (true, true) => Self::ApplyableComplete,
            (true, false) => Self::ApplyableIncomplete,
            (false, true) => Self::BlockedComplete,
            (false, false) => Self::BlockedIncomplete,
        }
    }

    /// Returns true if the plan may be applied.
    #[must_use]
    pub const fn is_applyable(self) -> bool {
        matches!(self, Self::ApplyableComplete | Self::ApplyableIncomplete)
    }

    /// Returns true if the plan covers every object.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::ApplyableComplete | Self::BlockedComplete)
    }
}

impl PlanBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared accumulator nodes contribute to.
    #[must_use]
    pub const fn changes(&self) -> &Arc<ChangesSync> {
        &self.changes
    }

    /// Seals the plan, deriving its flags from the collected contents.
    #[must_use]
    pub fn seal(self, context: PlanContext) -> Plan {
        let collected = self.changes.take_collected();
        let mut objects = collected.objects;
        objects.extend(context.prior_objects);

        let errored = context.diagnostics.has_errors();
        let complete = is_complete(context.interrupted, &context.skipped, &objects, &collected.resource_changes);
        let applyable = !errored && !context.interrupted;

        let mut targets = context.targets;
        targets.sort();
        targets.dedup();
        let mut force_replace = context.force_replace;
        force_replace.sort();
        force_replace.dedup();

        let plan = Plan {
            version: PLAN_FORMAT_VERSION,
            mode: context.mode,
            status: PlanStatus::from_flags(applyable, complete),
            applyable,
            complete,
            errored,
            interrupted: context.interrupted,
            skipped: context.skipped,
            created_at: Utc::now(),
            variable_values: collected.variables,
            resource_changes: collected.resource_changes,
            drift: collected.drift,
            deferred_changes: collected.deferred,
            output_changes: collected.outputs,
            checks: collected.checks,
            action_invocations: collected.invocations,
            objects,
            targets,
            force_replace,
            function_results: context.function_results,
            backend: context.backend,
            state_lineage: context.state_lineage,
            state_serial: context.state_serial,
            config_fingerprint: context.config_fingerprint,
            diagnostics: context.diagnostics,
        };
        info!(
            "Plan sealed: {:?}, {} resource changes, {} deferred",
            plan.status,
            plan.resource_changes.len(),
            plan.deferred_changes.len()
        );
        plan
    }
}

/// Every node ran, and every object has exactly one change entry.
fn is_complete(
    interrupted: bool,
    skipped: &BTreeMap<Address, Address>,
    objects: &BTreeSet<Address>,
    changes: &[ResourceInstanceChange],
) -> bool {
    !interrupted && skipped.is_empty() && covers(objects, changes)
}

/// Every object has exactly one change entry for its current object.
fn covers(objects: &BTreeSet<Address>, changes: &[ResourceInstanceChange]) -> bool {
    objects.iter().all(|addr| {
        changes
            .iter()
            .filter(|c| c.deposed.is_none() && &c.addr == addr)
            .count()
            == 1
    })
}

impl Plan {
    /// Plan format version.
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    /// Planning mode.
    #[must_use]
    pub const fn mode(&self) -> PlanMode {
        self.mode
    }

    /// Combined status.
    #[must_use]
    pub const fn status(&self) -> PlanStatus {
        self.status
    }

    /// Whether the plan may be applied.
    #[must_use]
    pub const fn applyable(&self) -> bool {
        self.applyable
    }

    /// Whether every object in desired or prior state has a change entry.
    #[must_use]
    pub const fn complete(&self) -> bool {
        self.complete
    }

    /// Whether any error was reported while planning.
    #[must_use]
    pub const fn errored(&self) -> bool {
        self.errored
    }

    /// Whether planning was interrupted.
    #[must_use]
    pub const fn interrupted(&self) -> bool {
        self.interrupted
    }

    /// Nodes skipped because a node they depend on failed, with that node.
    #[must_use]
    pub const fn skipped(&self) -> &BTreeMap<Address, Address> {
        &self.skipped
    }

    /// When the plan was sealed.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Root input variable values.
    #[must_use]
    pub const fn variable_values(&self) -> &BTreeMap<String, DynamicValue> {
        &self.variable_values
    }

    /// Resource instance changes, ordered by address.
    #[must_use]
    pub fn resource_changes(&self) -> &[ResourceInstanceChange] {
        &self.resource_changes
    }

    /// Changes made outside the engine, ordered by address.
    #[must_use]
    pub fn drift(&self) -> &[ResourceInstanceChange] {
        &self.drift
    }

    /// Deferred changes by address.
    #[must_use]
    pub const fn deferred_changes(&self) -> &BTreeMap<Address, DeferredResourceInstanceChange> {
        &self.deferred_changes
    }

    /// Output changes by address.
    #[must_use]
    pub const fn output_changes(&self) -> &BTreeMap<Address, OutputChange> {
        &self.output_changes
    }

    /// Check results by configuration address.
    #[must_use]
    pub const fn checks(&self) -> &BTreeMap<Address, CheckResult> {
        &self.checks
    }

    /// Planned action invocations in trigger order.
    #[must_use]
    pub fn action_invocations(&self) -> &[ActionInvocation] {
        &self.action_invocations
    }

    /// Managed instances the plan was responsible for.
    #[must_use]
    pub const fn objects(&self) -> &BTreeSet<Address> {
        &self.objects
    }

    /// Target addresses the plan was made with.
    #[must_use]
    pub fn targets(&self) -> &[Address] {
        &self.targets
    }

    /// Force-replace addresses the plan was made with.
    #[must_use]
    pub fn force_replace(&self) -> &[Address] {
        &self.force_replace
    }

    /// Recorded provider function results.
    #[must_use]
    pub const fn function_results(&self) -> &BTreeMap<String, DynamicValue> {
        &self.function_results
    }

    /// State storage descriptor.
    #[must_use]
    pub const fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Lineage of the state the plan was made against.
    #[must_use]
    pub fn state_lineage(&self) -> &str {
        &self.state_lineage
    }

    /// Serial of the state the plan was made against.
    #[must_use]
    pub const fn state_serial(&self) -> u64 {
        self.state_serial
    }

    /// Configuration fingerprint.
    #[must_use]
    pub fn config_fingerprint(&self) -> &str {
        &self.config_fingerprint
    }

    /// Diagnostics reported while planning.
    #[must_use]
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Finds the change for one object.
    #[must_use]
    pub fn find_change(&self, addr: &Address, deposed: Option<&DeposedKey>) -> Option<&ResourceInstanceChange> {
        self.resource_changes
            .iter()
            .find(|c| &c.addr == addr && c.deposed.as_ref() == deposed)
    }

    /// Returns true if any resource change does something.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.resource_changes.iter().any(|c| !c.action().is_noop())
            || self.output_changes.values().any(|c| !c.change.action.is_noop())
            || !self.action_invocations.is_empty()
    }

    /// Counts planned actions.
    #[must_use]
    pub fn summary(&self) -> ChangeSummary {
        let mut summary = ChangeSummary {
            deferred: self.deferred_changes.len(),
            ..ChangeSummary::default()
        };
        for change in &self.resource_changes {
            let action = change.action();
            if action.creates() {
                summary.create += 1;
            }
            if action.destroys() {
                summary.delete += 1;
            }
            match action {
                Action::Update => summary.update += 1,
                Action::Forget | Action::CreateThenForget => summary.forget += 1,
                _ => {}
            }
        }
        summary
    }

    /// Recomputes every derived fact from the plan's contents.
    ///
    /// # Errors
    ///
    /// Returns a description of the first inconsistency found.
    pub fn verify(&self) -> Result<(), String> {
        for change in &self.resource_changes {
            change
                .change
                .validate()
                .map_err(|e| format!("{}: {e}", change.addr))?;
            if change.deposed.is_none() && self.deferred_changes.contains_key(&change.addr) {
                return Err(format!("{} is both planned and deferred", change.addr));
            }
        }
        for output in self.output_changes.values() {
            output.change.validate().map_err(|e| format!("{}: {e}", output.addr))?;
        }

        let errored = self.diagnostics.has_errors();
        let complete = is_complete(self.interrupted, &self.skipped, &self.objects, &self.resource_changes);
        let applyable = !errored && !self.interrupted;
        if (errored, complete, applyable) != (self.errored, self.complete, self.applyable) {
            return Err(String::from("plan flags do not match plan contents"));
        }
        if self.status != PlanStatus::from_flags(applyable, complete) {
            return Err(String::from("plan status does not match plan flags"));
        }
        Ok(())
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ApplyableComplete => "applyable",
            Self::ApplyableIncomplete => "applyable (incomplete)",
            Self::BlockedComplete => "blocked",
            Self::BlockedIncomplete => "blocked (incomplete)",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to add, {} to change, {} to destroy",
            self.create, self.update, self.delete
        )?;
        if self.forget > 0 {
            write!(f, ", {} to forget", self.forget)?;
        }
        if self.deferred > 0 {
            write!(f, ", {} deferred", self.deferred)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.has_changes() && self.deferred_changes.is_empty() {
            writeln!(f, "No changes required")?;
        } else {
            writeln!(f, "Plan ({}):", self.status)?;
            for change in self.resource_changes.iter().filter(|c| !c.action().is_noop()) {
                write!(f, "  {} {}", change.action().symbol(), change.addr)?;
                if let Some(key) = &change.deposed {
                    write!(f, " (deposed {key})")?;
                }
                writeln!(f)?;
            }
            for (addr, deferred) in &self.deferred_changes {
                writeln!(f, "  ? {addr} (deferred: {})", deferred.reason)?;
            }
        }
        write!(f, "{}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::{InstanceKey, ModulePath, ResourceAddr};
    use crate::diagnostics::Diagnostic;
    use crate::lang::Value;
    use crate::plans::{Change, Contribution, DeferredReason};

    fn instance(name: &str) -> Address {
        Address::instance(
            ModulePath::root(),
            ResourceAddr::managed("test_resource", name),
            InstanceKey::NoKey,
        )
    }

    fn change(addr: &Address, change: Change) -> ResourceInstanceChange {
        ResourceInstanceChange::new(addr.clone(), Address::provider("test", None), change)
    }

    fn known(s: &str) -> DynamicValue {
        DynamicValue::encode(&Value::string(s))
    }

    #[test]
    fn test_complete_when_every_object_has_an_entry() {
        let builder = PlanBuilder::new();
        let a = instance("a");
        let b = instance("b");
        builder.changes().record(Contribution::Object(a.clone()));
        builder
            .changes()
            .record(Contribution::ResourceChange(change(&a, Change::create(known("a")))));
        builder.changes().record(Contribution::ResourceChange(change(
            &b,
            Change::transition(Action::NoOp, known("b"), known("b")),
        )));

        let plan = builder.seal(PlanContext {
            prior_objects: BTreeSet::from([b]),
            ..PlanContext::default()
        });
        assert!(plan.complete());
        assert!(plan.applyable());
        assert!(!plan.errored());
        assert_eq!(plan.status(), PlanStatus::ApplyableComplete);
        plan.verify().expect("consistent");
    }

    #[test]
    fn test_missing_prior_entry_makes_plan_incomplete() {
        let builder = PlanBuilder::new();
        let plan = builder.seal(PlanContext {
            prior_objects: BTreeSet::from([instance("gone")]),
            ..PlanContext::default()
        });
        assert!(!plan.complete());
        assert_eq!(plan.status(), PlanStatus::ApplyableIncomplete);
    }

    #[test]
    fn test_deferral_is_incomplete_but_applyable() {
        let builder = PlanBuilder::new();
        let a = instance("a");
        builder.changes().record(Contribution::Object(a.clone()));
        builder.changes().record(Contribution::Deferred(DeferredResourceInstanceChange {
            reason: DeferredReason::ResourceConfigUnknown,
            change: change(&a, Change::create(DynamicValue::Unknown)),
        }));

        let plan = builder.seal(PlanContext::default());
        assert!(plan.deferred_changes().contains_key(&a));
        assert!(plan.find_change(&a, None).is_none());
        assert!(!plan.errored());
        assert_eq!(plan.status(), PlanStatus::ApplyableIncomplete);
    }

    #[test]
    fn test_errors_block_and_interrupt_blocks() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::error("bad", ""));
        let plan = PlanBuilder::new().seal(PlanContext {
            diagnostics,
            ..PlanContext::default()
        });
        assert!(plan.errored());
        assert_eq!(plan.status(), PlanStatus::BlockedComplete);

        let plan = PlanBuilder::new().seal(PlanContext {
            interrupted: true,
            ..PlanContext::default()
        });
        assert!(!plan.errored());
        assert!(!plan.complete());
        assert_eq!(plan.status(), PlanStatus::BlockedIncomplete);
    }

    #[test]
    fn test_skipped_node_makes_plan_incomplete() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::error("No value for required variable", ""));
        let plan = PlanBuilder::new().seal(PlanContext {
            diagnostics,
            skipped: BTreeMap::from([(instance("a"), Address::root_variable("size"))]),
            ..PlanContext::default()
        });
        assert!(!plan.complete());
        assert_eq!(plan.status(), PlanStatus::BlockedIncomplete);
        assert_eq!(plan.skipped().get(&instance("a")), Some(&Address::root_variable("size")));
        plan.verify().expect("consistent");
    }

    #[test]
    fn test_summary_counts_replacements_twice() {
        let builder = PlanBuilder::new();
        let a = instance("a");
        builder.changes().record(Contribution::ResourceChange(change(
            &a,
            Change::transition(Action::DeleteThenCreate, known("1"), known("2")),
        )));
        let plan = builder.seal(PlanContext::default());
        let summary = plan.summary();
        assert_eq!((summary.create, summary.delete, summary.update), (1, 1, 0));
        assert!(plan.has_changes());
    }
}
