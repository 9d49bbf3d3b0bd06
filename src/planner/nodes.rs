//! Plan-time execution of graph nodes.
//!
//! Each node reads the values of the nodes it waits for, talks to its
//! provider where needed, and returns the plan entries it produced. The
//! same executor also runs static validation, where root variables are
//! unknown and providers are never called.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::addrs::{Address, DeposedKey, InstanceKey, ResourceMode, Subject};
use crate::config::{Import, ProviderConfig, Resource};
use crate::diagnostics::Diagnostic;
use crate::error::WalkError;
use crate::graph::{Node, NodeKind};
use crate::lang::{AttributePath, DynamicValue, Value};
use crate::plans::{
    Action, ActionInvocation, ActionReason, ActionTrigger, Change, ChangesSync, Contribution, DeferredReason,
    DeferredResourceInstanceChange, Importing, OutputChange, PlanMode, ResourceInstanceChange, TriggerEvent,
};
use crate::provider::{
    ActionKind, Block, ExecutionOrder, PlanResourceChangeRequest, Provider, ProviderSchema, ReadResourceRequest,
};
use crate::state::{ResourceInstanceObject, State};
use crate::walk::{NodeExecutor, NodeOutput, WalkValues};

use super::diff::{DiffInput, derive_action};
use super::eval::{Evaluator, consumed_resources, resource_value};

/// Executes nodes while planning or validating.
pub(crate) struct PlanExecutor {
    pub(crate) eval: Evaluator,
    pub(crate) state: State,
    pub(crate) sync: Arc<ChangesSync>,
    pub(crate) inputs: BTreeMap<String, Value>,
    pub(crate) mode: PlanMode,
    pub(crate) force_replace: Vec<Address>,
    pub(crate) allow_deferral: bool,
    pub(crate) validate_only: bool,
}

/// An object planned without configuration: an orphan, an instance
/// beyond the current count, or anything in destroy and refresh-only
/// modes.
struct ExistingObject<'a> {
    instance: &'a Address,
    deposed: Option<&'a DeposedKey>,
    object: &'a ResourceInstanceObject,
    resource: Option<&'a Resource>,
    reason: ActionReason,
    forget: bool,
}

#[async_trait]
impl NodeExecutor for PlanExecutor {
    async fn execute(&self, node: &Node, values: &WalkValues) -> Result<NodeOutput, WalkError> {
        match node.kind() {
            NodeKind::ProviderConfig(addr) => Ok(self.provider(addr, values).await),
            NodeKind::Variable(addr) => Ok(self.variable(addr, values)),
            NodeKind::VariableValidation(addr) => {
                let (result, diagnostics) = self.eval.validate_variable(addr, values);
                Ok(NodeOutput {
                    contributions: vec![Contribution::Check(result)],
                    diagnostics,
                    ..NodeOutput::default()
                })
            }
            NodeKind::Local(addr) => Ok(value_or_diagnostic(addr, self.eval.local(addr, values))),
            NodeKind::Resource(addr) => self.resource(node, addr, values).await,
            NodeKind::Orphan { instance, deposed } => self.orphan(node, instance, deposed.as_ref(), values).await,
            NodeKind::Output(addr) => Ok(self.output(addr, values)),
            NodeKind::Check(addr) => {
                let (result, diagnostics) = self.eval.check_block(addr, values);
                Ok(NodeOutput {
                    contributions: vec![Contribution::Check(result)],
                    diagnostics,
                    ..NodeOutput::default()
                })
            }
            NodeKind::Action(addr) => Ok(value_or_diagnostic(addr, self.eval.action_config(addr, values))),
        }
    }
}

impl PlanExecutor {
    async fn provider(&self, addr: &Address, values: &WalkValues) -> NodeOutput {
        let config = match self.eval.provider_config(addr, values) {
            Ok(config) => config,
            Err(diag) => return NodeOutput::diagnostics(diag),
        };
        let mut out = NodeOutput::value(addr.clone(), config.clone());
        let provider = match self.eval.registry().get(ProviderConfig::type_of(addr).unwrap_or_default()) {
            Ok(provider) => provider,
            Err(err) => {
                out.diagnostics.push(Diagnostic::error("Provider not available", err.to_string()));
                return out;
            }
        };
        if self.validate_only {
            return out;
        }
        if !config.is_wholly_known() {
            info!("Configuration of {addr} is not known until apply");
            return out;
        }
        out.diagnostics.extend(provider.configure(&config).await);
        out
    }

    fn variable(&self, addr: &Address, values: &WalkValues) -> NodeOutput {
        if self.validate_only && addr.module.is_root() {
            return NodeOutput::value(addr.clone(), Value::Unknown);
        }
        match self.eval.variable(addr, &self.inputs, values) {
            Ok(value) => {
                let mut out = NodeOutput::value(addr.clone(), value.clone());
                if let (true, Subject::Variable(name)) = (addr.module.is_root(), &addr.subject) {
                    out.contributions.push(Contribution::Variable {
                        name: name.clone(),
                        value: DynamicValue::encode(&value),
                    });
                }
                out
            }
            Err(diag) => NodeOutput::diagnostics(diag),
        }
    }

    fn output(&self, addr: &Address, values: &WalkValues) -> NodeOutput {
        let (value, visible) = match self.eval.output(addr, values) {
            Ok(evaluated) => evaluated,
            Err(diag) => return NodeOutput::diagnostics(diag),
        };
        let mut out = NodeOutput {
            values: visible,
            ..NodeOutput::default()
        };
        let Subject::Output(name) = &addr.subject else {
            return out;
        };
        if self.validate_only || !addr.module.is_root() {
            return out;
        }

        let before = self
            .state
            .outputs
            .get(name)
            .map_or(Value::Null, |o| Value::from_json(&o.value));
        let after = if self.mode == PlanMode::Destroy { Value::Null } else { value };
        if let Some(change) = output_change(&before, &after) {
            let sensitive = self.eval.output_sensitive(addr);
            let change = if sensitive {
                let whole = vec![AttributePath::default()];
                change.with_sensitive_paths(whole.clone(), whole)
            } else {
                change
            };
            out.contributions.push(Contribution::Output(OutputChange {
                addr: addr.clone(),
                change,
                sensitive,
            }));
        }
        out
    }

    async fn resource(&self, node: &Node, addr: &Address, values: &WalkValues) -> Result<NodeOutput, WalkError> {
        let Some(resource) = self.eval.config().resource(addr) else {
            return Err(fatal(node, "resource is not in the configuration"));
        };
        let (provider, schema) = match self.eval.provider_for(&resource.provider) {
            Ok(found) => found,
            Err(diag) => return Ok(NodeOutput::diagnostics(diag)),
        };
        let type_name = &resource.resource.type_name;
        let is_data = resource.resource.mode == ResourceMode::Data;
        let found = if is_data {
            schema.data_sources.get(type_name)
        } else {
            schema.resource_types.get(type_name)
        };
        let Some(block) = found.map(|s| &s.block) else {
            return Ok(NodeOutput::diagnostics(Diagnostic::error(
                "Unsupported resource type",
                format!("the provider for {addr} does not support {type_name}"),
            )));
        };

        if self.validate_only {
            return Ok(self.validate_resource(resource, &schema, block, values));
        }
        if is_data {
            return Ok(self.plan_data(node, resource, provider.as_ref(), values).await);
        }
        Ok(self.plan_managed(node, resource, provider.as_ref(), block, values).await)
    }

    fn validate_resource(&self, resource: &Resource, schema: &ProviderSchema, block: &Block, values: &WalkValues) -> NodeOutput {
        let mut out = NodeOutput::value(resource.addr.clone(), Value::Unknown);
        let key = match self.eval.instance_keys(resource, values) {
            Ok(_) if resource.count.is_some() => InstanceKey::Int(0),
            Ok(_) => InstanceKey::NoKey,
            Err(diag) => {
                out.diagnostics.push(diag);
                return out;
            }
        };
        match self.eval.instance_config(resource, &key, values) {
            Ok(config @ Value::Object(_)) => {
                if let Err(problems) = block.validate_config(&config) {
                    for problem in problems {
                        out.diagnostics.push(Diagnostic::error("Invalid resource configuration", problem));
                    }
                }
            }
            Ok(_) => {}
            Err(diag) => out.diagnostics.push(diag),
        }
        for trigger in &resource.lifecycle.action_triggers {
            for action in &trigger.actions {
                for event in &trigger.events {
                    if let Err(diag) = self.check_trigger(resource, action, *event, Some(schema)) {
                        out.diagnostics.push(diag);
                    }
                }
            }
        }
        out
    }

    async fn plan_managed(
        &self,
        node: &Node,
        resource: &Resource,
        provider: &dyn Provider,
        block: &Block,
        values: &WalkValues,
    ) -> NodeOutput {
        let addr = &resource.addr;
        let mut out = NodeOutput::default();
        let prior_instances: BTreeMap<InstanceKey, &ResourceInstanceObject> = self
            .state
            .instances_of(addr)
            .filter_map(|(a, o)| a.instance_key().map(|k| (k.clone(), o)))
            .collect();
        let instance_addr = |key: &InstanceKey| Address::instance(addr.module.clone(), resource.resource.clone(), key.clone());

        if self.mode != PlanMode::Normal {
            let mut instance_values = BTreeMap::new();
            for (key, object) in &prior_instances {
                let instance = instance_addr(key);
                let existing = ExistingObject {
                    instance: &instance,
                    deposed: None,
                    object,
                    resource: Some(resource),
                    reason: ActionReason::None,
                    forget: false,
                };
                let value = self.plan_existing(&existing, provider, block, values, &mut out).await;
                instance_values.insert(key.clone(), value);
            }
            out.values.push((addr.clone(), resource_value(resource, &instance_values)));
            return out;
        }

        let keys = match self.eval.instance_keys(resource, values) {
            Ok(Some(keys)) => keys,
            Ok(None) => {
                if self.allow_deferral {
                    let instance = instance_addr(&InstanceKey::Wildcard);
                    debug!("Deferring {addr}: instance count is unknown");
                    out.contributions.push(Contribution::Object(instance.clone()));
                    out.contributions.push(deferred(
                        instance,
                        resource.provider.clone(),
                        &Value::Null,
                        DeferredReason::InstanceCountUnknown,
                    ));
                } else {
                    out.diagnostics.push(Diagnostic::error(
                        "Invalid count argument",
                        "The count value depends on values that cannot be determined until apply",
                    ));
                }
                out.values.push((addr.clone(), Value::Unknown));
                return out;
            }
            Err(diag) => {
                out.diagnostics.push(diag);
                return out;
            }
        };

        let provider_known = values.get(&resource.provider).is_none_or(|v| v.is_wholly_known());
        let upstream_deferred = consumed_resources(node)
            .iter()
            .any(|dep| self.sync.is_resource_deferred(dep));
        let defer_all = if !provider_known {
            Some(DeferredReason::ProviderConfigUnknown)
        } else if upstream_deferred {
            Some(DeferredReason::DeferredPrereq)
        } else {
            None
        };
        if let Some(reason) = defer_all {
            if !self.allow_deferral {
                out.diagnostics.push(cannot_plan_yet(addr, &resource.provider, reason));
                return out;
            }
            debug!("Deferring {addr}: {reason}");
            for key in &keys {
                let instance = instance_addr(key);
                let prior = prior_instances.get(key).map_or(Value::Null, |o| o.value());
                out.contributions.push(Contribution::Object(instance.clone()));
                out.contributions
                    .push(deferred(instance, resource.provider.clone(), &prior, reason));
            }
            out.values.push((addr.clone(), Value::Unknown));
            return out;
        }

        let mut instance_values = BTreeMap::new();
        for key in &keys {
            let instance = instance_addr(key);
            out.contributions.push(Contribution::Object(instance.clone()));
            let prior = prior_instances.get(key).copied();
            let value = self
                .plan_instance(resource, &instance, key, prior, provider, block, values, &mut out)
                .await;
            instance_values.insert(key.clone(), value);
        }

        for (key, object) in &prior_instances {
            if keys.contains(key) {
                continue;
            }
            let instance = instance_addr(key);
            let existing = ExistingObject {
                instance: &instance,
                deposed: None,
                object,
                resource: Some(resource),
                reason: ActionReason::DeleteBecauseCountIndex,
                forget: false,
            };
            self.plan_existing(&existing, provider, block, values, &mut out).await;
        }

        out.values.push((addr.clone(), resource_value(resource, &instance_values)));
        out
    }

    #[allow(clippy::too_many_arguments)]
    async fn plan_instance(
        &self,
        resource: &Resource,
        instance: &Address,
        key: &InstanceKey,
        prior_object: Option<&ResourceInstanceObject>,
        provider: &dyn Provider,
        block: &Block,
        values: &WalkValues,
        out: &mut NodeOutput,
    ) -> Value {
        let type_name = &resource.resource.type_name;
        let mut importing = None;
        let (prior, prior_private) = match prior_object {
            Some(object) => match self.refresh(instance, None, object, provider, out).await {
                Some(refreshed) => refreshed,
                None => return Value::Unknown,
            },
            None => match self.eval.config().import_for(instance) {
                Some(import) => match self.import(instance, import, type_name, provider, out).await {
                    Some(imported) => {
                        importing = Some(Importing {
                            id: import.id.clone(),
                            identity: DynamicValue::Null,
                        });
                        imported
                    }
                    None => return Value::Unknown,
                },
                None => (Value::Null, Vec::new()),
            },
        };

        let config = match self.eval.instance_config(resource, key, values) {
            Ok(config) => config,
            Err(diag) => {
                out.diagnostics.push(diag.with_subject(instance.clone()));
                return Value::Unknown;
            }
        };
        if let Value::Object(_) = &config
            && let Err(problems) = block.validate_config(&config)
        {
            for problem in problems {
                out.diagnostics
                    .push(Diagnostic::error("Invalid resource configuration", problem).with_subject(instance.clone()));
            }
            return Value::Unknown;
        }

        let request = PlanResourceChangeRequest {
            type_name: type_name.clone(),
            prior: prior.clone(),
            proposed: block.proposed_new(&prior, &config),
            config: config.clone(),
            prior_private: prior_private.clone(),
        };
        let mut response = provider.plan_resource_change(request).await;
        let failed = response.diagnostics.has_errors();
        out.diagnostics
            .extend(std::mem::take(&mut response.diagnostics).with_default_subject(instance));
        if failed {
            return Value::Unknown;
        }

        let replace_requested = self
            .force_replace
            .iter()
            .any(|target| target == instance || *target == resource.addr);
        let decision = derive_action(&DiffInput {
            prior: &prior,
            planned: &response.planned,
            requires_replace: &response.requires_replace,
            replace_requested,
            create_before_destroy: resource.lifecycle.create_before_destroy,
        });

        if decision.action.is_replace() {
            let request = PlanResourceChangeRequest {
                type_name: type_name.clone(),
                prior: Value::Null,
                proposed: block.proposed_new(&Value::Null, &config),
                config: config.clone(),
                prior_private: Vec::new(),
            };
            let fresh = provider.plan_resource_change(request).await;
            let failed = fresh.diagnostics.has_errors();
            out.diagnostics.extend(fresh.diagnostics.with_default_subject(instance));
            if failed {
                return Value::Unknown;
            }
            response.planned = fresh.planned;
            response.private = fresh.private;
            response.deferred = response.deferred.or(fresh.deferred);
        }

        if decision.action.destroys() && resource.lifecycle.prevent_destroy {
            out.diagnostics.push(prevent_destroy_error(instance, decision.action));
            return prior;
        }

        let planned = block.strip_write_only(&response.planned);
        let mut change = Change::transition(decision.action, DynamicValue::encode(&prior), DynamicValue::encode(&planned))
            .with_sensitive_paths(block.sensitive_paths(&prior), block.sensitive_paths(&planned));
        if let Some(importing) = importing {
            change = change.with_importing(importing);
        }
        let mut planned_change =
            ResourceInstanceChange::new(instance.clone(), resource.provider.clone(), change).with_reason(decision.reason);
        planned_change.private = response.private;
        planned_change.required_replace = response.requires_replace;

        if let Some(reason) = response.deferred {
            if self.allow_deferral {
                debug!("Provider deferred {instance}: {reason}");
                out.contributions.push(Contribution::Deferred(DeferredResourceInstanceChange {
                    reason,
                    change: planned_change,
                }));
            } else {
                out.diagnostics.push(deferral_not_allowed(instance, reason));
            }
            return Value::Unknown;
        }

        debug!("Planned {} for {instance}", decision.action);
        self.trigger_actions(resource, instance, decision.action, values, out);
        out.contributions.push(Contribution::ResourceChange(planned_change));
        planned
    }

    /// Plans an object the configuration no longer asks for, or, in
    /// refresh-only mode, only refreshes it. Returns the object's value.
    async fn plan_existing(
        &self,
        existing: &ExistingObject<'_>,
        provider: &dyn Provider,
        block: &Block,
        values: &WalkValues,
        out: &mut NodeOutput,
    ) -> Value {
        let ExistingObject {
            instance,
            deposed,
            object,
            resource,
            reason,
            forget,
        } = *existing;
        let record = |change: Change| {
            let mut planned = ResourceInstanceChange::new(instance.clone(), object.provider.clone(), change);
            planned.private = object.private.clone();
            match deposed {
                Some(key) => planned.with_deposed(key.clone()),
                None => planned,
            }
        };

        let Some((prior, _)) = self.refresh(instance, deposed, object, provider, out).await else {
            return object.value();
        };
        if prior.is_null() {
            debug!("{instance} no longer exists; it will be forgotten");
            let stored = object.value();
            let change = Change::forget(DynamicValue::encode(&stored)).with_sensitive_paths(block.sensitive_paths(&stored), Vec::new());
            out.contributions.push(Contribution::ResourceChange(record(change)));
            return Value::Null;
        }

        let sensitive = block.sensitive_paths(&prior);
        if self.mode == PlanMode::RefreshOnly {
            let change = Change::transition(Action::NoOp, DynamicValue::encode(&prior), DynamicValue::encode(&prior))
                .with_sensitive_paths(sensitive.clone(), sensitive);
            out.contributions.push(Contribution::ResourceChange(record(change)));
            return prior;
        }
        if forget {
            let change = Change::forget(DynamicValue::encode(&prior)).with_sensitive_paths(sensitive, Vec::new());
            out.contributions.push(Contribution::ResourceChange(record(change)));
            return prior;
        }
        if resource.is_some_and(|r| r.lifecycle.prevent_destroy) {
            out.diagnostics.push(prevent_destroy_error(instance, Action::Delete));
            return prior;
        }

        let type_name = instance.resource().map(|r| r.type_name.clone()).unwrap_or_default();
        let response = provider
            .plan_resource_change(PlanResourceChangeRequest {
                type_name,
                prior: prior.clone(),
                proposed: Value::Null,
                config: Value::Null,
                prior_private: object.private.clone(),
            })
            .await;
        let failed = response.diagnostics.has_errors();
        out.diagnostics.extend(response.diagnostics.with_default_subject(instance));
        if failed {
            return prior;
        }
        if !response.planned.is_null() {
            out.diagnostics.push(
                Diagnostic::error(
                    "Provider produced invalid plan",
                    format!("the provider planned a value for {instance}, which is being destroyed"),
                )
                .with_subject(instance.clone()),
            );
            return prior;
        }

        let change = Change::delete(DynamicValue::encode(&prior)).with_sensitive_paths(sensitive, Vec::new());
        let planned = record(change).with_reason(reason);
        match (response.deferred, deposed) {
            (Some(reason), None) if self.allow_deferral => {
                out.contributions.push(Contribution::Deferred(DeferredResourceInstanceChange {
                    reason,
                    change: planned,
                }));
            }
            (Some(reason), _) => out.diagnostics.push(deferral_not_allowed(instance, reason)),
            (None, _) => {
                debug!("Planned delete for {instance}");
                if let Some(resource) = resource {
                    self.trigger_actions(resource, instance, Action::Delete, values, out);
                }
                out.contributions.push(Contribution::ResourceChange(planned));
            }
        }
        prior
    }

    /// Reads the current remote object, recording drift when it differs
    /// from state. Returns `None` when the read failed.
    async fn refresh(
        &self,
        instance: &Address,
        deposed: Option<&DeposedKey>,
        object: &ResourceInstanceObject,
        provider: &dyn Provider,
        out: &mut NodeOutput,
    ) -> Option<(Value, Vec<u8>)> {
        let stored = object.value();
        let response = provider
            .read_resource(ReadResourceRequest {
                type_name: instance.resource().map(|r| r.type_name.clone()).unwrap_or_default(),
                prior: stored.clone(),
                private: object.private.clone(),
            })
            .await;
        let failed = response.diagnostics.has_errors();
        out.diagnostics.extend(response.diagnostics.with_default_subject(instance));
        if failed {
            return None;
        }

        if response.new_state != stored {
            info!("{instance} has changed outside of plangraph");
            let change = if response.new_state.is_null() {
                Change::delete(DynamicValue::encode(&stored))
            } else {
                Change::transition(
                    Action::Update,
                    DynamicValue::encode(&stored),
                    DynamicValue::encode(&response.new_state),
                )
            };
            let mut drift = ResourceInstanceChange::new(instance.clone(), object.provider.clone(), change);
            if let Some(key) = deposed {
                drift = drift.with_deposed(key.clone());
            }
            out.contributions.push(Contribution::Drift(drift));
        }
        Some((response.new_state, response.private))
    }

    async fn import(
        &self,
        instance: &Address,
        import: &Import,
        type_name: &str,
        provider: &dyn Provider,
        out: &mut NodeOutput,
    ) -> Option<(Value, Vec<u8>)> {
        info!("Importing {instance} from id {}", import.id);
        let response = provider.import_resource_state(type_name, &import.id).await;
        let failed = response.diagnostics.has_errors();
        out.diagnostics.extend(response.diagnostics.with_default_subject(instance));
        if failed {
            return None;
        }
        let Some(imported) = response.imported.into_iter().find(|i| i.type_name == type_name) else {
            out.diagnostics.push(
                Diagnostic::error(
                    "Import returned no object",
                    format!("importing {} did not produce a {type_name} object", import.id),
                )
                .with_subject(instance.clone()),
            );
            return None;
        };
        Some((imported.state, imported.private))
    }

    async fn plan_data(&self, node: &Node, resource: &Resource, provider: &dyn Provider, values: &WalkValues) -> NodeOutput {
        let addr = &resource.addr;
        let mut out = NodeOutput::default();
        let keys = match self.eval.instance_keys(resource, values) {
            Ok(Some(keys)) => keys,
            Ok(None) => {
                out.values.push((addr.clone(), Value::Unknown));
                return out;
            }
            Err(diag) => {
                out.diagnostics.push(diag);
                return out;
            }
        };
        let upstream = consumed_resources(node);
        let upstream_pending = upstream.iter().any(|dep| self.sync.has_pending_change(dep));
        let upstream_deferred = upstream.iter().any(|dep| self.sync.is_resource_deferred(dep));

        let mut instance_values = BTreeMap::new();
        for key in &keys {
            let instance = Address::instance(addr.module.clone(), resource.resource.clone(), key.clone());
            let config = match self.eval.instance_config(resource, key, values) {
                Ok(config) => config,
                Err(diag) => {
                    out.diagnostics.push(diag.with_subject(instance.clone()));
                    continue;
                }
            };
            let known = config.is_wholly_known();
            let read_later = |reason: ActionReason| {
                ResourceInstanceChange::new(
                    instance.clone(),
                    resource.provider.clone(),
                    Change::read(DynamicValue::Null, DynamicValue::Unknown),
                )
                .with_reason(reason)
            };

            if self.mode == PlanMode::Destroy && !known {
                instance_values.insert(key.clone(), Value::Unknown);
                continue;
            }
            if self.mode != PlanMode::Destroy && (!known || upstream_pending || upstream_deferred) {
                let deferral = if upstream_deferred {
                    Some(DeferredReason::DeferredPrereq)
                } else if !known && upstream_pending {
                    Some(DeferredReason::AbsentPrereq)
                } else {
                    None
                };
                match deferral {
                    Some(reason) if self.allow_deferral => {
                        out.contributions.push(Contribution::Deferred(DeferredResourceInstanceChange {
                            reason,
                            change: read_later(ActionReason::ReadBecauseConfigUnknown),
                        }));
                    }
                    _ if !known => {
                        out.contributions.push(Contribution::ResourceChange(read_later(
                            ActionReason::ReadBecauseConfigUnknown,
                        )));
                    }
                    _ => {
                        out.contributions.push(Contribution::ResourceChange(read_later(
                            ActionReason::ReadBecauseDependencyPending,
                        )));
                    }
                }
                debug!("{instance} will be read during apply");
                instance_values.insert(key.clone(), Value::Unknown);
                continue;
            }

            let response = provider.read_data_source(&resource.resource.type_name, &config).await;
            out.diagnostics.extend(response.diagnostics.with_default_subject(&instance));
            instance_values.insert(key.clone(), response.state);
        }
        out.values.push((addr.clone(), resource_value(resource, &instance_values)));
        out
    }

    async fn orphan(
        &self,
        node: &Node,
        instance: &Address,
        deposed: Option<&DeposedKey>,
        values: &WalkValues,
    ) -> Result<NodeOutput, WalkError> {
        let mut out = NodeOutput::default();
        if self.validate_only {
            return Ok(out);
        }
        let object = match deposed {
            Some(key) => self.state.deposed_object(instance, key),
            None => self.state.object(instance),
        }
        .ok_or_else(|| fatal(node, "object is not in state"))?;

        let (provider, schema) = match self.eval.provider_for(&object.provider) {
            Ok(found) => found,
            Err(diag) => return Ok(NodeOutput::diagnostics(diag)),
        };
        let type_name = instance.resource().map(|r| r.type_name.as_str()).unwrap_or_default();
        let Some(block) = schema.resource_types.get(type_name).map(|s| &s.block) else {
            return Ok(NodeOutput::diagnostics(Diagnostic::error(
                "Unsupported resource type",
                format!("the provider for {instance} does not support {type_name}"),
            )));
        };

        if !values.get(&object.provider).is_none_or(|v| v.is_wholly_known()) {
            if self.allow_deferral && deposed.is_none() {
                out.contributions.push(deferred(
                    instance.clone(),
                    object.provider.clone(),
                    &object.value(),
                    DeferredReason::ProviderConfigUnknown,
                ));
            } else {
                out.diagnostics.push(Diagnostic::error(
                    "Provider configuration is unknown",
                    format!("{instance} cannot be planned because {} is not known until apply", object.provider),
                ));
            }
            return Ok(out);
        }

        let forget = deposed.is_none()
            && self
                .eval
                .config()
                .removed_for(&instance.containing_resource())
                .is_some_and(|removed| !removed.destroy);
        let existing = ExistingObject {
            instance,
            deposed,
            object,
            resource: None,
            reason: if deposed.is_some() {
                ActionReason::None
            } else {
                ActionReason::DeleteBecauseNoResourceConfig
            },
            forget,
        };
        self.plan_existing(&existing, provider.as_ref(), block, values, &mut out).await;
        Ok(out)
    }

    /// Records the action invocations the planned action triggers.
    fn trigger_actions(&self, resource: &Resource, instance: &Address, action: Action, values: &WalkValues, out: &mut NodeOutput) {
        let fired: &[TriggerEvent] = match action {
            Action::Create | Action::DeleteThenCreate | Action::CreateThenDelete | Action::CreateThenForget => {
                &[TriggerEvent::BeforeCreate, TriggerEvent::AfterCreate]
            }
            Action::Update => &[TriggerEvent::BeforeUpdate, TriggerEvent::AfterUpdate],
            Action::Delete => &[TriggerEvent::BeforeDestroy, TriggerEvent::AfterDestroy],
            Action::NoOp | Action::Read | Action::Forget => return,
        };
        let count_index = match instance.instance_key() {
            Some(InstanceKey::Int(i)) => Some(*i),
            _ => None,
        };

        for (trigger_index, trigger) in resource.lifecycle.action_triggers.iter().enumerate() {
            let events: Vec<TriggerEvent> = trigger.events.iter().filter(|e| fired.contains(e)).copied().collect();
            if events.is_empty() {
                continue;
            }
            if let Some(condition) = &trigger.condition {
                match self.eval.evaluate(condition, &instance.module, values, count_index) {
                    Ok(Value::Bool(true)) => {}
                    Ok(Value::Bool(false)) => continue,
                    Ok(other) => {
                        out.diagnostics.push(
                            Diagnostic::error(
                                "Invalid action trigger condition",
                                format!("the condition must be a known bool, got {}", other.type_name()),
                            )
                            .with_subject(instance.clone()),
                        );
                        continue;
                    }
                    Err(diag) => {
                        out.diagnostics.push(diag.with_subject(instance.clone()));
                        continue;
                    }
                }
            }

            for event in events {
                for (action_index, action_addr) in trigger.actions.iter().enumerate() {
                    if let Err(diag) = self.check_trigger(resource, action_addr, event, None) {
                        out.diagnostics.push(diag.with_subject(instance.clone()));
                        continue;
                    }
                    let Some(action) = self.eval.config().action(action_addr) else {
                        continue;
                    };
                    let config = values.get(action_addr).unwrap_or(Value::Unknown);
                    out.contributions.push(Contribution::Invocation(ActionInvocation {
                        addr: action_addr.clone(),
                        provider: action.provider.clone(),
                        trigger: ActionTrigger {
                            resource: instance.clone(),
                            event,
                            trigger_index,
                            action_index,
                        },
                        config: DynamicValue::encode(&config),
                    }));
                }
            }
        }
    }

    /// Checks that an action's kind allows `event` on `resource`.
    fn check_trigger(
        &self,
        resource: &Resource,
        action_addr: &Address,
        event: TriggerEvent,
        schema: Option<&ProviderSchema>,
    ) -> Result<(), Diagnostic> {
        let action = self.eval.config().action(action_addr).ok_or_else(|| {
            Diagnostic::error(
                "Reference to undeclared action",
                format!("{action_addr} is not declared in the configuration"),
            )
        })?;
        let owned;
        let schema = match schema.filter(|_| action.provider == resource.provider) {
            Some(schema) => schema,
            None => {
                owned = self
                    .eval
                    .registry()
                    .schema(ProviderConfig::type_of(&action.provider).unwrap_or_default())
                    .map_err(|err| Diagnostic::error("Provider not available", err.to_string()))?;
                owned.as_ref()
            }
        };
        let kind = &schema
            .actions
            .get(&action.type_name)
            .ok_or_else(|| {
                Diagnostic::error(
                    "Unsupported action type",
                    format!("the provider does not support the action type {}", action.type_name),
                )
            })?
            .kind;

        if !kind.accepts_trigger(&resource.resource.type_name) {
            return Err(Diagnostic::error(
                "Invalid action trigger",
                format!(
                    "the {kind} action {action_addr} cannot be triggered by {}",
                    resource.resource.type_name
                ),
            ));
        }
        if let ActionKind::Lifecycle { executes, .. } = kind
            && (*executes == ExecutionOrder::Before) != event.is_before()
        {
            return Err(Diagnostic::error(
                "Invalid action trigger",
                format!("the lifecycle action {action_addr} cannot run on {event}"),
            ));
        }
        Ok(())
    }
}

/// The change of a root output, or `None` when it is null before and
/// after.
pub(crate) fn output_change(before: &Value, after: &Value) -> Option<Change> {
    let action = match (before.is_null(), after.is_null()) {
        (true, true) => return None,
        (true, false) => Action::Create,
        (false, true) => Action::Delete,
        (false, false) if before == after => Action::NoOp,
        (false, false) => Action::Update,
    };
    Some(Change::transition(
        action,
        DynamicValue::encode(before),
        DynamicValue::encode(after),
    ))
}

fn deferred(instance: Address, provider: Address, prior: &Value, reason: DeferredReason) -> Contribution {
    let change = if prior.is_null() {
        Change::create(DynamicValue::Unknown)
    } else {
        Change::transition(Action::Update, DynamicValue::encode(prior), DynamicValue::Unknown)
    };
    Contribution::Deferred(DeferredResourceInstanceChange {
        reason,
        change: ResourceInstanceChange::new(instance, provider, change),
    })
}

pub(crate) fn value_or_diagnostic(addr: &Address, result: Result<Value, Diagnostic>) -> NodeOutput {
    match result {
        Ok(value) => NodeOutput::value(addr.clone(), value),
        Err(diag) => NodeOutput::diagnostics(diag),
    }
}

fn prevent_destroy_error(instance: &Address, action: Action) -> Diagnostic {
    Diagnostic::error(
        "Instance cannot be destroyed",
        format!("{instance} has lifecycle.prevent_destroy set, but the plan calls for it to be destroyed ({action})"),
    )
    .with_subject(instance.clone())
}

fn cannot_plan_yet(addr: &Address, provider: &Address, reason: DeferredReason) -> Diagnostic {
    let (summary, detail) = match reason {
        DeferredReason::ProviderConfigUnknown => (
            "Provider configuration is unknown",
            format!("{addr} cannot be planned because {provider} is not known until apply"),
        ),
        DeferredReason::DeferredPrereq => (
            "Prerequisite change was deferred",
            format!("{addr} depends on a resource whose changes were deferred"),
        ),
        other => (
            "Change cannot be planned yet",
            format!("{addr} cannot be planned yet ({other}), and deferral is not enabled"),
        ),
    };
    Diagnostic::error(summary, detail).with_subject(addr.clone())
}

fn deferral_not_allowed(instance: &Address, reason: DeferredReason) -> Diagnostic {
    Diagnostic::error(
        "Provider deferred the change",
        format!("the provider cannot plan {instance} yet ({reason}), and deferral is not enabled"),
    )
    .with_subject(instance.clone())
}

pub(crate) fn fatal(node: &Node, message: impl Into<String>) -> WalkError {
    WalkError::Fatal {
        node: node.name(),
        message: message.into(),
    }
}

impl std::fmt::Debug for PlanExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanExecutor")
            .field("mode", &self.mode)
            .field("validate_only", &self.validate_only)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_change_actions() {
        let one = Value::Number(1.0);
        let two = Value::Number(2.0);
        assert!(output_change(&Value::Null, &Value::Null).is_none());
        assert_eq!(output_change(&Value::Null, &one).map(|c| c.action), Some(Action::Create));
        assert_eq!(output_change(&one, &Value::Null).map(|c| c.action), Some(Action::Delete));
        assert_eq!(output_change(&one, &one).map(|c| c.action), Some(Action::NoOp));
        assert_eq!(output_change(&one, &two).map(|c| c.action), Some(Action::Update));
        assert_eq!(output_change(&one, &Value::Unknown).map(|c| c.action), Some(Action::Update));
    }

    #[test]
    fn test_deferred_change_shape() {
        let instance: Address = "test_resource.a".parse().expect("address");
        let Contribution::Deferred(deferred) = deferred(
            instance,
            Address::provider("test", None),
            &Value::Null,
            DeferredReason::ResourceConfigUnknown,
        ) else {
            panic!("expected a deferral");
        };
        assert_eq!(deferred.change.action(), Action::Create);
        assert!(deferred.change.change.validate().is_ok());
    }

    #[test]
    fn test_cannot_plan_yet_names_the_reason() {
        let resource: Address = "test_resource.a".parse().expect("address");
        let provider = Address::provider("test", None);

        let diag = cannot_plan_yet(&resource, &provider, DeferredReason::ProviderConfigUnknown);
        assert_eq!(diag.summary, "Provider configuration is unknown");

        let diag = cannot_plan_yet(&resource, &provider, DeferredReason::DeferredPrereq);
        assert_eq!(diag.summary, "Prerequisite change was deferred");
        assert_eq!(diag.subject, Some(resource.clone()));

        let diag = cannot_plan_yet(&resource, &provider, DeferredReason::AbsentPrereq);
        assert!(diag.detail.contains("deferral is not enabled"));
    }
}
