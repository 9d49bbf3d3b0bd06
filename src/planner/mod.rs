//! Planning and applying.
//!
//! The [`Planner`] ties the engine together. For each operation it builds
//! the graph, walks it with the matching node executor, and turns the
//! walk's results into a [`Plan`] or an updated [`State`].

mod diff;
mod eval;
mod executor;
mod nodes;

pub use diff::{ActionDecision, DiffInput, changed_attributes, conforms, derive_action};

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::addrs::Address;
use crate::config::{Config, ConfigHasher, EngineSettings};
use crate::diagnostics::Diagnostics;
use crate::error::{ApplyError, Result};
use crate::graph::{BuildOptions, BuiltGraph, GraphBuilder};
use crate::lang::{FunctionResults, Value};
use crate::plans::{Action, Backend, ChangesSync, Plan, PlanBuilder, PlanContext, PlanMode};
use crate::provider::ProviderRegistry;
use crate::state::{LocalStateStore, State};
use crate::walk::{WalkValues, Walker};

use eval::Evaluator;
use executor::{ApplyExecutor, ApplyPhase};
use nodes::PlanExecutor;

/// Arguments of a plan operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanOptions {
    /// Planning mode.
    pub mode: PlanMode,
    /// When non-empty, plan only these addresses and their dependencies.
    pub targets: Vec<Address>,
    /// Instances or resources to replace even if unchanged.
    pub force_replace: Vec<Address>,
    /// Values of root input variables.
    pub variables: BTreeMap<String, Value>,
}

/// Arguments given again at apply time.
///
/// Empty fields mean "as planned"; anything given must match the plan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyOptions {
    /// Target addresses.
    pub targets: Vec<Address>,
    /// Force-replace addresses.
    pub force_replace: Vec<Address>,
    /// Root input variable values.
    pub variables: BTreeMap<String, Value>,
}

/// Result of an apply.
#[derive(Debug)]
pub struct ApplyOutcome {
    /// The new state, to be persisted by the caller.
    pub state: State,
    /// Problems found while applying.
    pub diagnostics: Diagnostics,
    /// Whether every change was applied.
    pub applied: bool,
}

/// Plans and applies configurations against state.
#[derive(Clone)]
pub struct Planner {
    registry: Arc<ProviderRegistry>,
    settings: EngineSettings,
    cancel: CancellationToken,
}

impl Planner {
    /// Creates a planner using the providers in `registry`.
    #[must_use]
    pub fn new(registry: ProviderRegistry, settings: EngineSettings) -> Self {
        Self {
            registry: Arc::new(registry),
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `token` to interrupt walks.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The engine settings in use.
    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn walker(&self) -> Walker {
        Walker::new(self.settings.parallelism).with_cancellation(self.cancel.clone())
    }

    fn evaluator(&self, config: &Arc<Config>, functions: &Arc<FunctionResults>) -> Evaluator {
        Evaluator::new(Arc::clone(config), Arc::clone(&self.registry), Arc::clone(functions))
    }

    /// Builds the graph of `config` against `state`.
    ///
    /// # Errors
    ///
    /// Returns an error for undeclared references or dependency cycles.
    pub fn graph(&self, config: &Config, state: &State, targets: &[Address]) -> Result<BuiltGraph> {
        let options = BuildOptions {
            validation_gating: self.settings.validation_gating,
            targets: targets.to_vec(),
        };
        Ok(GraphBuilder::standard(config, state, &options).build()?)
    }

    /// Checks a configuration without touching state or calling providers
    /// beyond their schemas.
    ///
    /// Root input variables are treated as unknown.
    ///
    /// # Errors
    ///
    /// Returns an error when the graph cannot be built or the walk fails.
    pub async fn validate(&self, config: &Config) -> Result<Diagnostics> {
        let empty = State::new();
        let built = self.graph(config, &empty, &[])?;
        let mut diagnostics = built.diagnostics;
        if diagnostics.has_errors() {
            return Ok(diagnostics);
        }

        let config = Arc::new(config.clone());
        let executor = PlanExecutor {
            eval: self.evaluator(&config, &Arc::new(FunctionResults::new())),
            state: empty,
            sync: Arc::new(ChangesSync::new()),
            inputs: BTreeMap::new(),
            mode: PlanMode::Normal,
            force_replace: Vec::new(),
            allow_deferral: true,
            validate_only: true,
        };
        let report = self
            .walker()
            .walk(Arc::new(built.graph), Arc::new(executor), Arc::new(WalkValues::new()))
            .await?;
        diagnostics.extend(report.diagnostics);
        info!("Validation finished with {} diagnostic(s)", diagnostics.len());
        Ok(diagnostics)
    }

    /// Computes the changes that would bring remote objects in line with
    /// `config`.
    ///
    /// Problems with individual objects end up as diagnostics of an
    /// errored plan rather than as an error.
    ///
    /// # Errors
    ///
    /// Returns an error when the graph cannot be built or a node violates
    /// an internal invariant.
    pub async fn plan(&self, config: &Config, state: &State, options: &PlanOptions) -> Result<Plan> {
        info!("Planning in {} mode", options.mode);
        let built = self.graph(config, state, &options.targets)?;
        let builder = PlanBuilder::new();
        let functions = Arc::new(FunctionResults::new());
        let mut context = PlanContext {
            mode: options.mode,
            prior_objects: state.managed_instances(),
            targets: options.targets.clone(),
            force_replace: options.force_replace.clone(),
            backend: Backend::of_store(&LocalStateStore::with_state_path(&self.settings.state_path)),
            state_lineage: state.lineage.clone(),
            state_serial: state.serial,
            config_fingerprint: config.fingerprint.clone(),
            ..PlanContext::default()
        };

        let mut diagnostics = built.diagnostics;
        if diagnostics.has_errors() {
            warn!("Graph has errors; sealing an errored plan");
            context.diagnostics = diagnostics;
            return Ok(builder.seal(context));
        }

        let config = Arc::new(config.clone());
        let executor = PlanExecutor {
            eval: self.evaluator(&config, &functions),
            state: state.clone(),
            sync: Arc::clone(builder.changes()),
            inputs: options.variables.clone(),
            mode: options.mode,
            force_replace: options.force_replace.clone(),
            allow_deferral: self.settings.allow_deferral,
            validate_only: false,
        };
        let graph = Arc::new(built.graph);
        let report = self
            .walker()
            .with_sink(Arc::clone(builder.changes()))
            .walk(Arc::clone(&graph), Arc::new(executor), Arc::new(WalkValues::new()))
            .await?;
        for (skipped, cause) in &report.skipped {
            let (Some(node), Some(failed)) = (graph.node(*skipped), graph.node(*cause)) else {
                continue;
            };
            debug!("{} skipped because {} failed", node.name(), failed.name());
            context.skipped.insert(node.address().clone(), failed.address().clone());
        }

        diagnostics.extend(report.diagnostics);
        context.interrupted = report.interrupted;
        context.diagnostics = diagnostics;
        context.function_results = functions.snapshot();
        let plan = builder.seal(context);
        info!("Plan: {} ({})", plan.summary(), plan.status());
        Ok(plan)
    }

    /// Applies a plan to `state`, returning the new state.
    ///
    /// The plan is consumed: a plan is applied at most once. It must be applyable and made from this configuration and
    /// this generation of state. Changes whose object no longer looks the
    /// way the plan saw it are refused with a diagnostic.
    ///
    /// # Errors
    ///
    /// Returns an error when the plan is not applyable, is stale, or was
    /// made with different arguments, and when the graph cannot be built.
    pub async fn apply(&self, plan: Plan, config: &Config, state: State, options: &ApplyOptions) -> Result<ApplyOutcome> {
        check_applyable(&plan, config, &state, options)?;
        let inputs = plan
            .variable_values()
            .iter()
            .map(|(name, value)| value.decode().map(|v| (name.clone(), v)))
            .collect::<std::result::Result<BTreeMap<_, _>, _>>()
            .map_err(|reason| ApplyError::NotApplyable { reason })?;

        let built = self.graph(config, &state, plan.targets())?;
        let mut diagnostics = built.diagnostics;
        if diagnostics.has_errors() {
            return Ok(ApplyOutcome {
                state,
                diagnostics,
                applied: false,
            });
        }
        info!("Applying plan: {}", plan.summary());

        let reversed = Arc::new(built.graph.reversed());
        let graph = Arc::new(built.graph);
        let config = Arc::new(config.clone());
        let functions = Arc::new(FunctionResults::from_recorded(plan.function_results().clone()));
        let plan = Arc::new(plan);
        let shared = Arc::new(Mutex::new(state));
        let executor = |phase| ApplyExecutor {
            eval: self.evaluator(&config, &functions),
            plan: Arc::clone(&plan),
            state: Arc::clone(&shared),
            inputs: inputs.clone(),
            phase,
        };

        let report = self
            .walker()
            .walk(graph, Arc::new(executor(ApplyPhase::Forward)), Arc::new(WalkValues::new()))
            .await?;
        let mut interrupted = report.interrupted;
        let forward_ok = report.is_success();
        diagnostics.extend(report.diagnostics);

        if forward_ok {
            let report = self
                .walker()
                .walk(reversed, Arc::new(executor(ApplyPhase::Destroy)), Arc::new(WalkValues::new()))
                .await?;
            interrupted |= report.interrupted;
            diagnostics.extend(report.diagnostics);
        } else {
            warn!("Skipping destroys because earlier changes did not complete");
        }

        let mut state = shared.lock().clone();
        state.bump_serial();
        let applied = !interrupted && !diagnostics.has_errors();
        info!("Apply {}; state serial is now {}", if applied { "complete" } else { "incomplete" }, state.serial);
        Ok(ApplyOutcome {
            state,
            diagnostics,
            applied,
        })
    }
}

impl std::fmt::Debug for Planner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("providers", &self.registry.names().collect::<Vec<_>>())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Address lists match regardless of order and repetition.
fn same_addresses(given: &[Address], planned: &[Address]) -> bool {
    given.iter().collect::<BTreeSet<_>>() == planned.iter().collect::<BTreeSet<_>>()
}

/// Refuses plans that must not be applied to `state` with these arguments.
fn check_applyable(plan: &Plan, config: &Config, state: &State, options: &ApplyOptions) -> std::result::Result<(), ApplyError> {
    if !plan.applyable() {
        let reason = if plan.errored() {
            String::from("the plan has errors")
        } else if plan.interrupted() {
            String::from("planning was interrupted")
        } else {
            format!("the plan status is {}", plan.status())
        };
        return Err(ApplyError::NotApplyable { reason });
    }
    if !ConfigHasher::hashes_match(plan.config_fingerprint(), &config.fingerprint) {
        return Err(ApplyError::stale("the configuration changed since the plan was created"));
    }
    if plan.state_lineage() != state.lineage {
        return Err(ApplyError::stale("the plan was created for a different state"));
    }
    if plan.state_serial() != state.serial {
        return Err(ApplyError::stale(format!(
            "the state changed since the plan was created (serial {} is now {})",
            plan.state_serial(),
            state.serial
        )));
    }

    if !options.targets.is_empty() && !same_addresses(&options.targets, plan.targets()) {
        return Err(ApplyError::ArgumentMismatch {
            message: String::from("the targets differ from the ones the plan was created with"),
        });
    }
    if !options.force_replace.is_empty() && !same_addresses(&options.force_replace, plan.force_replace()) {
        return Err(ApplyError::ArgumentMismatch {
            message: String::from("the replace addresses differ from the ones the plan was created with"),
        });
    }
    for (name, value) in &options.variables {
        let planned = plan.variable_values().get(name).and_then(|v| v.decode().ok());
        if planned.as_ref() != Some(value) {
            return Err(ApplyError::ArgumentMismatch {
                message: format!("variable {name} differs from the value the plan was created with"),
            });
        }
    }

    for change in plan.resource_changes() {
        let removes = matches!(change.action(), Action::Delete | Action::Forget);
        if change.deposed.is_none() && !removes && config.resource(&change.addr.containing_resource()).is_none() {
            return Err(ApplyError::stale(format!("{} is not in the configuration", change.addr)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::{InstanceKey, ModulePath, ResourceAddr, Subject};
    use crate::config::ConfigParser;
    use crate::error::PlanGraphError;
    use crate::lang::DynamicValue;
    use crate::plans::{ActionReason, CheckStatus, DeferredReason, PlanStatus, planfile};
    use crate::provider::{ResourceStore, TestProvider};
    use crate::state::ResourceInstanceObject;

    struct Harness {
        provider: Arc<TestProvider>,
        store: Arc<ResourceStore>,
        planner: Planner,
    }

    fn harness(settings: EngineSettings) -> Harness {
        let store = Arc::new(ResourceStore::new());
        let provider = Arc::new(TestProvider::with_store(Arc::clone(&store)));
        let mut registry = ProviderRegistry::new();
        registry
            .register("test", Arc::clone(&provider) as Arc<dyn crate::provider::Provider>)
            .expect("register");
        Harness {
            provider,
            store,
            planner: Planner::new(registry, settings),
        }
    }

    fn config(yaml: &str) -> Config {
        ConfigParser::parse_str(yaml).expect("config")
    }

    fn instance(name: &str) -> Address {
        Address::instance(ModulePath::root(), ResourceAddr::managed("test_resource", name), InstanceKey::NoKey)
    }

    fn attr(state: &State, name: &str, attr: &str) -> Value {
        state.object(&instance(name)).expect("object").value().get_attr(attr)
    }

    const SINGLE: &str = r"
providers:
  - name: test
resources:
  - type: test_resource
    name: a
    config:
      value: hello
";

    async fn create(h: &Harness, yaml: &str) -> State {
        let config = config(yaml);
        let state = State::new();
        let plan = h.planner.plan(&config, &state, &PlanOptions::default()).await.expect("plan");
        let outcome = h
            .planner
            .apply(plan, &config, state, &ApplyOptions::default())
            .await
            .expect("apply");
        assert!(outcome.applied, "{:?}", outcome.diagnostics);
        outcome.state
    }

    #[tokio::test]
    async fn test_variable_validation_passes() {
        let h = harness(EngineSettings::default());
        let config = config(
            r#"
variables:
  - name: v
    type: number
    validation:
      - condition: "var.v > 0"
        error_message: "v must be positive, got ${var.v}"
"#,
        );
        let options = PlanOptions {
            variables: BTreeMap::from([(String::from("v"), Value::Number(5.0))]),
            ..PlanOptions::default()
        };
        let plan = h.planner.plan(&config, &State::new(), &options).await.expect("plan");

        let check = plan.checks().get(&Address::root_variable("v")).expect("check result");
        assert_eq!(check.status, CheckStatus::Pass);
        assert!(!plan.errored());
        assert_eq!(plan.variable_values().get("v"), Some(&DynamicValue::encode(&Value::Number(5.0))));
        assert_eq!(plan.backend().kind, "local");
    }

    #[tokio::test]
    async fn test_orphan_is_planned_for_deletion() {
        let h = harness(EngineSettings::default());
        let value = Value::object([("id", Value::string("a1")), ("value", Value::string("x"))]);
        h.store.put(h.provider.resource_key("a1"), value.clone());
        let mut state = State::new();
        state.set_object(instance("a"), ResourceInstanceObject::new(&value, Address::provider("test", None)));

        let config = config("providers:\n  - name: test\n");
        let plan = h.planner.plan(&config, &state, &PlanOptions::default()).await.expect("plan");

        let change = plan.find_change(&instance("a"), None).expect("change");
        assert_eq!(change.action(), Action::Delete);
        assert_eq!(change.action_reason, ActionReason::DeleteBecauseNoResourceConfig);
        assert!(change.change.after.is_null());
        assert!(change.change.after_sensitive_paths.is_empty());
        assert!(plan.complete());
    }

    #[tokio::test]
    async fn test_deferred_change_is_not_a_resource_change() {
        let h = harness(EngineSettings {
            allow_deferral: true,
            ..EngineSettings::default()
        });
        let config = config(
            r"
providers:
  - name: test
resources:
  - type: test_resource
    name: a
    config:
      defer: true
",
        );
        let plan = h.planner.plan(&config, &State::new(), &PlanOptions::default()).await.expect("plan");

        assert!(plan.find_change(&instance("a"), None).is_none());
        let deferred = plan.deferred_changes().get(&instance("a")).expect("deferred");
        assert_eq!(deferred.reason, DeferredReason::ResourceConfigUnknown);
        assert!(plan.applyable());
        assert!(!plan.complete());
    }

    #[tokio::test]
    async fn test_deferral_disabled_is_an_error() {
        let h = harness(EngineSettings::default());
        let config = config(
            r"
providers:
  - name: test
resources:
  - type: test_resource
    name: a
    config:
      defer: true
",
        );
        let plan = h.planner.plan(&config, &State::new(), &PlanOptions::default()).await.expect("plan");
        assert!(plan.errored());
        assert!(!plan.applyable());
    }

    #[tokio::test]
    async fn test_plan_file_apply_and_converge() {
        let h = harness(EngineSettings::default());
        let config = config(SINGLE);
        let state = State::new();
        let plan = h.planner.plan(&config, &state, &PlanOptions::default()).await.expect("plan");
        assert_eq!(plan.find_change(&instance("a"), None).map(|c| c.action()), Some(Action::Create));

        let decoded = planfile::decode(&planfile::encode(&plan).expect("encode")).expect("decode");
        assert_eq!(decoded, plan);

        let outcome = h
            .planner
            .apply(decoded, &config, state, &ApplyOptions::default())
            .await
            .expect("apply");
        assert!(outcome.applied, "{:?}", outcome.diagnostics);
        assert_eq!(outcome.state.serial, 1);
        assert_eq!(attr(&outcome.state, "a", "value"), Value::string("hello"));
        assert_eq!(h.store.keys().len(), 1);

        let replan = h
            .planner
            .plan(&config, &outcome.state, &PlanOptions::default())
            .await
            .expect("replan");
        assert_eq!(replan.find_change(&instance("a"), None).map(|c| c.action()), Some(Action::NoOp));
        assert!(!replan.has_changes());
    }

    #[tokio::test]
    async fn test_refresh_only_records_drift() {
        let h = harness(EngineSettings::default());
        let state = create(&h, SINGLE).await;
        let id = attr(&state, "a", "id").as_str().expect("id").to_string();
        let mut remote = h.store.get(&h.provider.resource_key(&id)).expect("remote");
        if let Value::Object(attrs) = &mut remote {
            attrs.insert(String::from("value"), Value::string("changed"));
        }
        h.store.put(h.provider.resource_key(&id), remote);

        let config = config(SINGLE);
        let options = PlanOptions {
            mode: PlanMode::RefreshOnly,
            ..PlanOptions::default()
        };
        let plan = h.planner.plan(&config, &state, &options).await.expect("plan");
        assert_eq!(plan.drift().len(), 1);
        assert_eq!(plan.drift()[0].action(), Action::Update);
        assert_eq!(plan.find_change(&instance("a"), None).map(|c| c.action()), Some(Action::NoOp));

        let outcome = h
            .planner
            .apply(plan, &config, state, &ApplyOptions::default())
            .await
            .expect("apply");
        assert!(outcome.applied, "{:?}", outcome.diagnostics);
        assert_eq!(attr(&outcome.state, "a", "value"), Value::string("changed"));
    }

    #[tokio::test]
    async fn test_create_before_destroy_replacement() {
        let h = harness(EngineSettings::default());
        let yaml = |immutable: &str| {
            format!(
                "providers:\n  - name: test\nresources:\n  - type: test_resource\n    name: a\n    config:\n      immutable: {immutable}\n    lifecycle:\n      create_before_destroy: true\n"
            )
        };
        let state = create(&h, &yaml("one")).await;
        let old_id = attr(&state, "a", "id");

        let config = config(&yaml("two"));
        let plan = h.planner.plan(&config, &state, &PlanOptions::default()).await.expect("plan");
        let change = plan.find_change(&instance("a"), None).expect("change");
        assert_eq!(change.action(), Action::CreateThenDelete);
        assert_eq!(change.action_reason, ActionReason::ReplaceBecauseCannotUpdate);

        let outcome = h
            .planner
            .apply(plan, &config, state, &ApplyOptions::default())
            .await
            .expect("apply");
        assert!(outcome.applied, "{:?}", outcome.diagnostics);
        assert_eq!(attr(&outcome.state, "a", "immutable"), Value::string("two"));
        assert_ne!(attr(&outcome.state, "a", "id"), old_id);
        assert!(outcome.state.deposed.is_empty());
        assert_eq!(h.store.keys().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_plan_is_refused() {
        let h = harness(EngineSettings::default());
        let state = create(&h, SINGLE).await;
        let config = config(&SINGLE.replace("hello", "bye"));
        let plan = h.planner.plan(&config, &state, &PlanOptions::default()).await.expect("plan");
        assert_eq!(plan.find_change(&instance("a"), None).map(|c| c.action()), Some(Action::Update));

        let id = attr(&state, "a", "id").as_str().expect("id").to_string();
        h.store.put(
            h.provider.resource_key(&id),
            Value::object([("id", Value::string(id.clone())), ("value", Value::string("tampered"))]),
        );
        let outcome = h
            .planner
            .apply(plan, &config, state, &ApplyOptions::default())
            .await
            .expect("apply");
        assert!(!outcome.applied);
        assert!(outcome.diagnostics.errors().any(|d| d.summary == "Saved plan is stale"));
        assert_eq!(attr(&outcome.state, "a", "value"), Value::string("hello"));
    }

    #[tokio::test]
    async fn test_plan_cannot_be_applied_twice() {
        let h = harness(EngineSettings::default());
        let config = config(SINGLE);
        let state = State::new();
        let plan = h.planner.plan(&config, &state, &PlanOptions::default()).await.expect("plan");
        let outcome = h
            .planner
            .apply(plan.clone(), &config, state, &ApplyOptions::default())
            .await
            .expect("apply");

        let err = h
            .planner
            .apply(plan, &config, outcome.state, &ApplyOptions::default())
            .await
            .expect_err("stale");
        assert!(matches!(err, PlanGraphError::Apply(ApplyError::StalePlan { .. })));
    }

    #[tokio::test]
    async fn test_apply_arguments_must_match() {
        let h = harness(EngineSettings::default());
        let config = config(SINGLE);
        let state = State::new();
        let options = PlanOptions {
            targets: vec![instance("a")],
            ..PlanOptions::default()
        };
        let plan = h.planner.plan(&config, &state, &options).await.expect("plan");

        let apply = ApplyOptions {
            targets: vec![instance("b")],
            ..ApplyOptions::default()
        };
        let err = h.planner.apply(plan, &config, state, &apply).await.expect_err("mismatch");
        assert!(matches!(err, PlanGraphError::Apply(ApplyError::ArgumentMismatch { .. })));
    }

    #[tokio::test]
    async fn test_unsorted_targets_match_at_apply() {
        let h = harness(EngineSettings::default());
        let yaml = format!("{SINGLE}  - type: test_resource\n    name: b\n    config:\n      value: world\n");
        let config = config(&yaml);
        let state = State::new();
        let targets = vec![instance("b"), instance("a"), instance("b")];
        let options = PlanOptions {
            targets: targets.clone(),
            force_replace: vec![instance("b"), instance("a")],
            ..PlanOptions::default()
        };
        let plan = h.planner.plan(&config, &state, &options).await.expect("plan");
        assert_eq!(plan.targets(), &[instance("a"), instance("b")]);

        let apply = ApplyOptions {
            targets,
            force_replace: vec![instance("b"), instance("a")],
            ..ApplyOptions::default()
        };
        let outcome = h.planner.apply(plan, &config, state, &apply).await.expect("apply");
        assert!(outcome.applied, "{:?}", outcome.diagnostics);
        assert_eq!(outcome.state.object_count(), 2);
    }

    #[tokio::test]
    async fn test_dependents_of_failed_variable_are_recorded_as_skipped() {
        let h = harness(EngineSettings::default());
        let config = config(
            r#"
providers:
  - name: test
variables:
  - name: size
    type: number
resources:
  - type: test_resource
    name: a
    config:
      value: "${var.size}"
"#,
        );
        let plan = h.planner.plan(&config, &State::new(), &PlanOptions::default()).await.expect("plan");

        assert!(plan.errored());
        assert!(!plan.complete());
        assert_eq!(plan.status(), PlanStatus::BlockedIncomplete);
        assert!(plan.resource_changes().is_empty());
        let resource = Address::new(
            ModulePath::root(),
            Subject::Resource(ResourceAddr::managed("test_resource", "a")),
        );
        assert_eq!(plan.skipped().get(&resource), Some(&Address::root_variable("size")));
        plan.verify().expect("consistent");
    }

    #[tokio::test]
    async fn test_destroy_mode_removes_everything() {
        let h = harness(EngineSettings::default());
        let state = create(&h, SINGLE).await;
        let config = config(SINGLE);
        let options = PlanOptions {
            mode: PlanMode::Destroy,
            ..PlanOptions::default()
        };
        let plan = h.planner.plan(&config, &state, &options).await.expect("plan");
        assert_eq!(plan.find_change(&instance("a"), None).map(|c| c.action()), Some(Action::Delete));

        let outcome = h
            .planner
            .apply(plan, &config, state, &ApplyOptions::default())
            .await
            .expect("apply");
        assert!(outcome.applied, "{:?}", outcome.diagnostics);
        assert_eq!(outcome.state.object_count(), 0);
        assert!(h.store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_prevent_destroy_blocks_the_plan() {
        let h = harness(EngineSettings::default());
        let yaml = "providers:\n  - name: test\nresources:\n  - type: test_resource\n    name: a\n    config:\n      value: hello\n    lifecycle:\n      prevent_destroy: true\n";
        let state = create(&h, yaml).await;
        let options = PlanOptions {
            mode: PlanMode::Destroy,
            ..PlanOptions::default()
        };
        let plan = h.planner.plan(&config(yaml), &state, &options).await.expect("plan");
        assert!(plan.errored());
        assert!(plan.diagnostics().errors().any(|d| d.summary == "Instance cannot be destroyed"));
    }

    #[tokio::test]
    async fn test_count_reduction_deletes_extra_instances() {
        let h = harness(EngineSettings::default());
        let yaml = |count: u32| {
            format!("providers:\n  - name: test\nresources:\n  - type: test_resource\n    name: a\n    count: {count}\n    config:\n      value: hello\n")
        };
        let state = create(&h, &yaml(2)).await;
        assert_eq!(state.object_count(), 2);

        let plan = h.planner.plan(&config(&yaml(1)), &state, &PlanOptions::default()).await.expect("plan");
        let dropped = Address::instance(ModulePath::root(), ResourceAddr::managed("test_resource", "a"), InstanceKey::Int(1));
        let change = plan.find_change(&dropped, None).expect("change");
        assert_eq!(change.action(), Action::Delete);
        assert_eq!(change.action_reason, ActionReason::DeleteBecauseCountIndex);
    }

    #[tokio::test]
    async fn test_validate_reports_bad_config_without_providers_calls() {
        let h = harness(EngineSettings::default());
        let config = config(
            r"
providers:
  - name: test
resources:
  - type: test_resource
    name: a
    config:
      colour: blue
",
        );
        let diagnostics = h.planner.validate(&config).await.expect("validate");
        assert!(diagnostics.has_errors());
        assert!(h.store.keys().is_empty());
    }
}
