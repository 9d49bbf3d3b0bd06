//! Apply-time execution of graph nodes.
//!
//! Apply walks the graph twice. The forward phase evaluates configuration
//! and carries out every change except destroys, in dependency order. The
//! destroy phase walks the reversed graph so that an object is destroyed
//! only after everything that depended on it.
//!
//! Every object is re-read before it is touched; a read that no longer
//! matches what the plan saw means the plan is stale and the object is
//! left alone.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::addrs::{Address, DeposedKey, InstanceKey, ResourceMode, Subject};
use crate::config::{ProviderConfig, Resource};
use crate::diagnostics::Diagnostic;
use crate::error::{ApplyError, WalkError};
use crate::graph::{Node, NodeKind};
use crate::lang::{DynamicValue, Value};
use crate::plans::{Action, Plan, ResourceInstanceChange};
use crate::provider::{ApplyResourceChangeRequest, Block, PlanResourceChangeRequest, Provider, ReadResourceRequest};
use crate::state::{ResourceInstanceObject, State};
use crate::walk::{NodeExecutor, NodeOutput, WalkValues};

use super::diff::conforms;
use super::eval::{Evaluator, consumed_resources, resource_value};
use super::nodes::{fatal, value_or_diagnostic};

/// Which half of an apply a walk performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApplyPhase {
    /// Creates, updates, replacements, reads and outputs.
    Forward,
    /// Deletes and forgets, over the reversed graph.
    Destroy,
}

/// Executes nodes while applying a plan.
pub(crate) struct ApplyExecutor {
    pub(crate) eval: Evaluator,
    pub(crate) plan: Arc<Plan>,
    pub(crate) state: Arc<Mutex<State>>,
    pub(crate) inputs: BTreeMap<String, Value>,
    pub(crate) phase: ApplyPhase,
}

/// One managed instance being converged on its planned value.
struct Target<'a> {
    resource: &'a Resource,
    instance: &'a Address,
    key: &'a InstanceKey,
    change: &'a ResourceInstanceChange,
    block: &'a Block,
    dependencies: &'a BTreeSet<Address>,
}

#[async_trait]
impl NodeExecutor for ApplyExecutor {
    async fn execute(&self, node: &Node, values: &WalkValues) -> Result<NodeOutput, WalkError> {
        if self.phase == ApplyPhase::Destroy {
            return Ok(match node.kind() {
                NodeKind::Resource(addr) => self.destroy_resource(addr).await,
                NodeKind::Orphan { instance, deposed } => self.destroy_orphan(instance, deposed.as_ref()).await,
                _ => NodeOutput::default(),
            });
        }

        match node.kind() {
            NodeKind::ProviderConfig(addr) => Ok(self.provider(addr, values).await),
            NodeKind::Variable(addr) => Ok(value_or_diagnostic(addr, self.eval.variable(addr, &self.inputs, values))),
            NodeKind::Local(addr) => Ok(value_or_diagnostic(addr, self.eval.local(addr, values))),
            NodeKind::Action(addr) => Ok(value_or_diagnostic(addr, self.eval.action_config(addr, values))),
            NodeKind::Resource(addr) => self.resource(node, addr, values).await,
            NodeKind::Output(addr) => Ok(self.output(addr, values)),
            NodeKind::VariableValidation(_) | NodeKind::Check(_) | NodeKind::Orphan { .. } => Ok(NodeOutput::default()),
        }
    }
}

impl ApplyExecutor {
    async fn provider(&self, addr: &Address, values: &WalkValues) -> NodeOutput {
        let config = match self.eval.provider_config(addr, values) {
            Ok(config) => config,
            Err(diag) => return NodeOutput::diagnostics(diag),
        };
        let mut out = NodeOutput::value(addr.clone(), config.clone());
        if !config.is_wholly_known() {
            debug!("Configuration of {addr} is still unknown; its changes were deferred");
            return out;
        }
        match self.eval.registry().get(ProviderConfig::type_of(addr).unwrap_or_default()) {
            Ok(provider) => out.diagnostics.extend(provider.configure(&config).await),
            Err(err) => out
                .diagnostics
                .push(Diagnostic::error("Provider not available", err.to_string())),
        }
        out
    }

    fn output(&self, addr: &Address, values: &WalkValues) -> NodeOutput {
        let evaluated = self.eval.output(addr, values);
        let root_name = match &addr.subject {
            Subject::Output(name) if addr.module.is_root() => Some(name),
            _ => None,
        };

        if let Some(name) = root_name
            && self
                .plan
                .output_changes()
                .get(addr)
                .is_some_and(|c| c.change.action == Action::Delete)
        {
            self.state.lock().remove_output(name);
            return NodeOutput {
                values: evaluated.map(|(_, visible)| visible).unwrap_or_default(),
                ..NodeOutput::default()
            };
        }

        let (value, visible) = match evaluated {
            Ok(evaluated) => evaluated,
            Err(diag) => return NodeOutput::diagnostics(diag),
        };
        if let Some(name) = root_name
            && value.is_wholly_known()
            && !value.is_null()
        {
            let sensitive = self.eval.output_sensitive(addr);
            self.state.lock().set_output(name.clone(), &value, sensitive);
        }
        NodeOutput {
            values: visible,
            ..NodeOutput::default()
        }
    }

    async fn resource(&self, node: &Node, addr: &Address, values: &WalkValues) -> Result<NodeOutput, WalkError> {
        let Some(resource) = self.eval.config().resource(addr) else {
            return Err(fatal(node, "resource is not in the configuration"));
        };
        let mut out = NodeOutput::default();
        let keys = match self.eval.instance_keys(resource, values) {
            Ok(Some(keys)) => keys,
            Ok(None) => {
                debug!("Instances of {addr} were deferred");
                out.values.push((addr.clone(), Value::Unknown));
                return Ok(out);
            }
            Err(diag) => {
                out.diagnostics.push(diag);
                return Ok(out);
            }
        };
        let (provider, schema) = match self.eval.provider_for(&resource.provider) {
            Ok(found) => found,
            Err(diag) => return Ok(NodeOutput::diagnostics(diag)),
        };
        let dependencies: BTreeSet<Address> = consumed_resources(node).into_iter().collect();

        let mut instance_values = BTreeMap::new();
        for key in &keys {
            let instance = Address::instance(addr.module.clone(), resource.resource.clone(), key.clone());
            let value = if resource.resource.mode == ResourceMode::Data {
                self.read_data(resource, &instance, key, provider.as_ref(), values, &mut out).await
            } else {
                let Some(block) = schema.resource_types.get(&resource.resource.type_name).map(|s| &s.block) else {
                    out.diagnostics.push(Diagnostic::error(
                        "Unsupported resource type",
                        format!("the provider for {addr} does not support {}", resource.resource.type_name),
                    ));
                    return Ok(out);
                };
                self.apply_instance(resource, &instance, key, provider.as_ref(), block, &dependencies, values, &mut out)
                    .await
            };
            if let Some(value) = value {
                instance_values.insert(key.clone(), value);
            }
        }
        out.values.push((addr.clone(), resource_value(resource, &instance_values)));
        Ok(out)
    }

    async fn read_data(
        &self,
        resource: &Resource,
        instance: &Address,
        key: &InstanceKey,
        provider: &dyn Provider,
        values: &WalkValues,
        out: &mut NodeOutput,
    ) -> Option<Value> {
        if self.plan.deferred_changes().contains_key(instance) {
            return Some(Value::Unknown);
        }
        let config = match self.eval.instance_config(resource, key, values) {
            Ok(config) => config,
            Err(diag) => {
                out.diagnostics.push(diag.with_subject(instance.clone()));
                return None;
            }
        };
        if !config.is_wholly_known() {
            out.diagnostics.push(unknown_at_apply(instance));
            return None;
        }
        let response = provider.read_data_source(&resource.resource.type_name, &config).await;
        let failed = response.diagnostics.has_errors();
        out.diagnostics.extend(response.diagnostics.with_default_subject(instance));
        if failed {
            return None;
        }
        debug!("Read {instance}");
        Some(response.state)
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_instance(
        &self,
        resource: &Resource,
        instance: &Address,
        key: &InstanceKey,
        provider: &dyn Provider,
        block: &Block,
        dependencies: &BTreeSet<Address>,
        values: &WalkValues,
        out: &mut NodeOutput,
    ) -> Option<Value> {
        let stored = self.state.lock().object(instance).map(ResourceInstanceObject::value);
        let Some(change) = self.plan.find_change(instance, None) else {
            return Some(stored.unwrap_or(Value::Unknown));
        };
        let target = Target {
            resource,
            instance,
            key,
            change,
            block,
            dependencies,
        };

        match change.action() {
            Action::Delete | Action::Forget => Some(stored.unwrap_or(Value::Null)),
            Action::Read => stored,
            Action::NoOp => {
                let (current, private) = self.current(change, provider, out).await?;
                let mut object = ResourceInstanceObject::new(&current, change.provider.clone())
                    .with_private(private)
                    .with_dependencies(dependencies.clone());
                object.create_before_destroy = resource.lifecycle.create_before_destroy;
                self.state.lock().set_object(instance.clone(), object);
                Some(current)
            }
            Action::Create | Action::Update => {
                let (current, private) = self.current(change, provider, out).await?;
                self.invoke_actions(instance, true, out).await.then_some(())?;
                let value = self.converge(&target, &current, private, provider, values, out).await?;
                self.invoke_actions(instance, false, out).await;
                Some(value)
            }
            Action::DeleteThenCreate => {
                let (current, private) = self.current(change, provider, out).await?;
                self.invoke_actions(instance, true, out).await.then_some(())?;
                let type_name = &resource.resource.type_name;
                self.destroy(instance, None, type_name, provider, &current, private, out)
                    .await
                    .then_some(())?;
                let value = self.converge(&target, &Value::Null, Vec::new(), provider, values, out).await?;
                self.invoke_actions(instance, false, out).await;
                Some(value)
            }
            Action::CreateThenDelete => {
                let (current, private) = self.current(change, provider, out).await?;
                self.invoke_actions(instance, true, out).await.then_some(())?;
                let deposed = self.state.lock().depose(instance);
                let value = self.converge(&target, &Value::Null, Vec::new(), provider, values, out).await?;
                if let Some(key) = deposed {
                    let type_name = &resource.resource.type_name;
                    if !self
                        .destroy(instance, Some(&key), type_name, provider, &current, private, out)
                        .await
                    {
                        warn!("Deposed object {key} of {instance} was kept after a failed destroy");
                    }
                }
                self.invoke_actions(instance, false, out).await;
                Some(value)
            }
            Action::CreateThenForget => {
                self.current(change, provider, out).await?;
                self.invoke_actions(instance, true, out).await.then_some(())?;
                let value = self.converge(&target, &Value::Null, Vec::new(), provider, values, out).await?;
                self.invoke_actions(instance, false, out).await;
                Some(value)
            }
        }
    }

    /// Re-plans the instance from `prior`, checks the result against the
    /// saved plan and applies it, recording the new object.
    async fn converge(
        &self,
        target: &Target<'_>,
        prior: &Value,
        prior_private: Vec<u8>,
        provider: &dyn Provider,
        values: &WalkValues,
        out: &mut NodeOutput,
    ) -> Option<Value> {
        let Target {
            resource,
            instance,
            key,
            change,
            block,
            dependencies,
        } = *target;
        let type_name = resource.resource.type_name.clone();

        let config = match self.eval.instance_config(resource, key, values) {
            Ok(config) => config,
            Err(diag) => {
                out.diagnostics.push(diag.with_subject(instance.clone()));
                return None;
            }
        };
        if !config.is_wholly_known() {
            out.diagnostics.push(unknown_at_apply(instance));
            return None;
        }
        let saved = match change.change.after.decode() {
            Ok(saved) => saved,
            Err(err) => {
                out.diagnostics
                    .push(Diagnostic::error("Invalid saved plan", err).with_subject(instance.clone()));
                return None;
            }
        };

        let planned = provider
            .plan_resource_change(PlanResourceChangeRequest {
                type_name: type_name.clone(),
                prior: prior.clone(),
                proposed: block.proposed_new(prior, &config),
                config: config.clone(),
                prior_private,
            })
            .await;
        let failed = planned.diagnostics.has_errors();
        out.diagnostics.extend(planned.diagnostics.with_default_subject(instance));
        if failed {
            return None;
        }
        if !conforms(&saved, &block.strip_write_only(&planned.planned)) {
            out.diagnostics.push(
                Diagnostic::error(
                    "Provider produced inconsistent final plan",
                    format!("the planned value of {instance} changed between plan and apply"),
                )
                .with_subject(instance.clone()),
            );
            return None;
        }

        let applied = provider
            .apply_resource_change(ApplyResourceChangeRequest {
                type_name,
                prior: prior.clone(),
                planned: planned.planned,
                config,
                private: planned.private,
            })
            .await;
        let failed = applied.diagnostics.has_errors();
        out.diagnostics.extend(applied.diagnostics.with_default_subject(instance));
        if failed {
            return None;
        }

        let mut object = ResourceInstanceObject::new(&applied.new_state, resource.provider.clone())
            .with_private(applied.private)
            .with_dependencies(dependencies.clone());
        object.create_before_destroy = resource.lifecycle.create_before_destroy;
        self.state.lock().set_object(instance.clone(), object);
        info!("Applied {} to {instance}", change.action());
        Some(applied.new_state)
    }

    /// Reads the object a change starts from and checks it is still what
    /// the plan saw. Returns the current value and private data.
    async fn current(
        &self,
        change: &ResourceInstanceChange,
        provider: &dyn Provider,
        out: &mut NodeOutput,
    ) -> Option<(Value, Vec<u8>)> {
        let instance = &change.addr;
        let before = match change.change.before.decode() {
            Ok(before) => before,
            Err(err) => {
                out.diagnostics
                    .push(Diagnostic::error("Invalid saved plan", err).with_subject(instance.clone()));
                return None;
            }
        };
        if change.change.importing.is_some() {
            return Some((before, change.private.clone()));
        }

        let stored = {
            let state = self.state.lock();
            match &change.deposed {
                Some(key) => state.deposed_object(instance, key).cloned(),
                None => state.object(instance).cloned(),
            }
        };
        let object = match stored {
            None if before.is_null() => return Some((Value::Null, Vec::new())),
            None => {
                out.diagnostics.push(stale(instance, "the object is no longer in state"));
                return None;
            }
            Some(_) if before.is_null() => {
                out.diagnostics.push(stale(instance, "the object already exists"));
                return None;
            }
            Some(object) => object,
        };

        let response = provider
            .read_resource(ReadResourceRequest {
                type_name: instance.resource().map(|r| r.type_name.clone()).unwrap_or_default(),
                prior: object.value(),
                private: object.private.clone(),
            })
            .await;
        let failed = response.diagnostics.has_errors();
        out.diagnostics.extend(response.diagnostics.with_default_subject(instance));
        if failed {
            return None;
        }
        if DynamicValue::encode(&response.new_state) != change.change.before {
            out.diagnostics
                .push(stale(instance, "the object changed since the plan was created"));
            return None;
        }
        Some((response.new_state, response.private))
    }

    /// Destroys an object and removes it from state.
    #[allow(clippy::too_many_arguments)]
    async fn destroy(
        &self,
        instance: &Address,
        deposed: Option<&DeposedKey>,
        type_name: &str,
        provider: &dyn Provider,
        prior: &Value,
        private: Vec<u8>,
        out: &mut NodeOutput,
    ) -> bool {
        let response = provider
            .apply_resource_change(ApplyResourceChangeRequest {
                type_name: type_name.to_string(),
                prior: prior.clone(),
                planned: Value::Null,
                config: Value::Null,
                private,
            })
            .await;
        let failed = response.diagnostics.has_errors();
        out.diagnostics.extend(response.diagnostics.with_default_subject(instance));
        if failed {
            return false;
        }
        self.drop_object(instance, deposed);
        match deposed {
            Some(key) => info!("Destroyed deposed object {key} of {instance}"),
            None => info!("Destroyed {instance}"),
        }
        true
    }

    fn drop_object(&self, instance: &Address, deposed: Option<&DeposedKey>) {
        let mut state = self.state.lock();
        match deposed {
            Some(key) => state.remove_deposed(instance, key),
            None => {
                state.remove_object(instance);
            }
        }
    }

    async fn destroy_resource(&self, addr: &Address) -> NodeOutput {
        let mut out = NodeOutput::default();
        let changes = self.plan.resource_changes().iter().filter(|c| {
            c.deposed.is_none()
                && matches!(c.action(), Action::Delete | Action::Forget)
                && c.addr.containing_resource() == *addr
        });
        for change in changes {
            self.remove(change, &mut out).await;
        }
        out
    }

    async fn destroy_orphan(&self, instance: &Address, deposed: Option<&DeposedKey>) -> NodeOutput {
        let mut out = NodeOutput::default();
        if let Some(change) = self.plan.find_change(instance, deposed)
            && matches!(change.action(), Action::Delete | Action::Forget)
        {
            self.remove(change, &mut out).await;
        }
        out
    }

    /// Carries out a planned delete or forget.
    async fn remove(&self, change: &ResourceInstanceChange, out: &mut NodeOutput) {
        let instance = &change.addr;
        let deposed = change.deposed.as_ref();
        if change.action() == Action::Forget {
            let exists = {
                let state = self.state.lock();
                match deposed {
                    Some(key) => state.deposed_object(instance, key).is_some(),
                    None => state.object(instance).is_some(),
                }
            };
            if exists {
                self.drop_object(instance, deposed);
                info!("Removed {instance} from state without destroying it");
            } else {
                out.diagnostics.push(stale(instance, "the object is no longer in state"));
            }
            return;
        }

        let provider = match self.eval.provider_for(&change.provider) {
            Ok((provider, _)) => provider,
            Err(diag) => {
                out.diagnostics.push(diag);
                return;
            }
        };
        let Some((current, private)) = self.current(change, provider.as_ref(), out).await else {
            return;
        };
        if !self.invoke_actions(instance, true, out).await {
            return;
        }
        let type_name = instance.resource().map(|r| r.type_name.clone()).unwrap_or_default();
        if self
            .destroy(instance, deposed, &type_name, provider.as_ref(), &current, private, out)
            .await
        {
            self.invoke_actions(instance, false, out).await;
        }
    }

    /// Runs the planned action invocations of `instance` that fire before
    /// (or after) its change. Returns false when one failed.
    async fn invoke_actions(&self, instance: &Address, before: bool, out: &mut NodeOutput) -> bool {
        let invocations = self
            .plan
            .action_invocations()
            .iter()
            .filter(|i| &i.trigger.resource == instance && i.trigger.event.is_before() == before);
        for invocation in invocations {
            let Subject::Action { type_name, .. } = &invocation.addr.subject else {
                continue;
            };
            let config = match invocation.config.decode() {
                Ok(config) => config,
                Err(err) => {
                    out.diagnostics.push(Diagnostic::error("Invalid saved plan", err));
                    return false;
                }
            };
            let provider = match self
                .eval
                .registry()
                .get(ProviderConfig::type_of(&invocation.provider).unwrap_or_default())
            {
                Ok(provider) => provider,
                Err(err) => {
                    out.diagnostics
                        .push(Diagnostic::error("Provider not available", err.to_string()));
                    return false;
                }
            };
            info!("Invoking {} ({})", invocation.addr, invocation.trigger.event);
            let diagnostics = provider.invoke_action(type_name, &config).await;
            let failed = diagnostics.has_errors();
            out.diagnostics.extend(diagnostics.with_default_subject(&invocation.addr));
            if failed {
                return false;
            }
        }
        true
    }
}

fn stale(instance: &Address, message: &str) -> Diagnostic {
    Diagnostic::error(
        "Saved plan is stale",
        ApplyError::stale(format!("{instance}: {message}")).to_string(),
    )
    .with_subject(instance.clone())
}

fn unknown_at_apply(instance: &Address) -> Diagnostic {
    Diagnostic::error(
        "Configuration is unknown during apply",
        format!("{instance} still has unknown configuration values after its dependencies were applied"),
    )
    .with_subject(instance.clone())
}
