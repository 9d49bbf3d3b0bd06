//! The change and plan model.
//!
//! This module provides:
//! - Per-object [`Change`] records and their resource, deferred and output forms
//! - [`ChangesSync`], the concurrent accumulator nodes contribute to
//! - The sealed [`Plan`] with its derived [`PlanStatus`]
//! - The binary plan file codec in [`planfile`]

mod action;
mod changes;
mod checks;
mod invocation;
mod plan;
pub mod planfile;
mod sync;

pub use action::{Action, ActionReason, DeferredReason, PlanMode};
pub use changes::{Change, DeferredResourceInstanceChange, Importing, OutputChange, ResourceInstanceChange};
pub use checks::{CheckKind, CheckResult, CheckStatus};
pub use invocation::{ActionInvocation, ActionTrigger, TriggerEvent};
pub use plan::{Backend, ChangeSummary, PLAN_FORMAT_VERSION, Plan, PlanBuilder, PlanContext, PlanStatus};
pub use planfile::{decode, encode, read_plan_file, write_plan_file};
pub use sync::{ChangesSync, Contribution};
