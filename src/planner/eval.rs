//! Evaluating configuration against the values of a walk.
//!
//! Plan and apply share everything here: the scope expressions see,
//! provider function calls, variable values, custom conditions and the
//! expansion of a resource into instances.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::addrs::{Address, InstanceKey, ModulePath, Subject};
use crate::config::{Config, ProviderConfig, Resource, Rule};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::ApplyError;
use crate::graph::Node;
use crate::lang::{Expr, FunctionResults, Scope, Value, evaluate};
use crate::plans::{CheckKind, CheckResult, CheckStatus};
use crate::provider::{Provider, ProviderRegistry, ProviderSchema};
use crate::walk::WalkValues;

/// The scope of one node: values of completed nodes plus, for an
/// instance of a counted resource, its index.
pub(crate) struct NodeScope<'a> {
    module: ModulePath,
    values: &'a WalkValues,
    count_index: Option<i64>,
    evaluator: &'a Evaluator,
}

impl Scope for NodeScope<'_> {
    fn module(&self) -> &ModulePath {
        &self.module
    }

    fn lookup(&self, address: &Address) -> Option<Value> {
        self.values.get(address)
    }

    fn count_index(&self) -> Option<i64> {
        self.count_index
    }

    fn call_provider_function(&self, provider: &str, name: &str, args: &[Value]) -> Result<Value, String> {
        self.evaluator.call_function(provider, name, args)
    }
}

/// Configuration-level evaluation shared by every executor.
pub(crate) struct Evaluator {
    config: Arc<Config>,
    registry: Arc<ProviderRegistry>,
    functions: Arc<FunctionResults>,
}

impl Evaluator {
    pub(crate) const fn new(config: Arc<Config>, registry: Arc<ProviderRegistry>, functions: Arc<FunctionResults>) -> Self {
        Self {
            config,
            registry,
            functions,
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// The provider behind a provider configuration address, with its
    /// schema.
    pub(crate) fn provider_for(&self, addr: &Address) -> Result<(Arc<dyn Provider>, Arc<ProviderSchema>), Diagnostic> {
        let type_name = ProviderConfig::type_of(addr).unwrap_or_default();
        self.registry
            .get(type_name)
            .and_then(|provider| self.registry.schema(type_name).map(|schema| (provider, schema)))
            .map_err(|err| Diagnostic::error("Provider not available", err.to_string()))
    }

    pub(crate) fn evaluate(
        &self,
        expr: &Expr,
        module: &ModulePath,
        values: &WalkValues,
        count_index: Option<i64>,
    ) -> Result<Value, Diagnostic> {
        let scope = NodeScope {
            module: module.clone(),
            values,
            count_index,
            evaluator: self,
        };
        evaluate(expr, &scope)
    }

    /// Calls a provider function, checking the result against any
    /// earlier call with the same arguments.
    fn call_function(&self, provider: &str, name: &str, args: &[Value]) -> Result<Value, String> {
        if !args.iter().all(Value::is_wholly_known) {
            return Ok(Value::Unknown);
        }
        let result = self
            .registry
            .get(provider)
            .map_err(|e| e.to_string())?
            .call_function(name, args)?;
        self.functions
            .check_and_record(provider, name, args, &result)
            .map_err(|_| {
                ApplyError::FunctionResultMismatch {
                    function: format!("provider::{provider}::{name}"),
                }
                .to_string()
            })?;
        Ok(result)
    }

    /// Final value of an input variable.
    ///
    /// Root variables come from `inputs`, child module variables from the
    /// module call's argument evaluated in the parent module. Either falls
    /// back to the declared default.
    pub(crate) fn variable(
        &self,
        addr: &Address,
        inputs: &BTreeMap<String, Value>,
        values: &WalkValues,
    ) -> Result<Value, Diagnostic> {
        let (Some(variable), Subject::Variable(name)) = (self.config.variable(addr), &addr.subject) else {
            return Err(missing_config(addr));
        };
        let supplied = match self.config.module_call(&addr.module) {
            Some((parent, call)) => call
                .inputs
                .get(name)
                .map(|input| self.evaluate(input, &parent, values, None))
                .transpose()?,
            None => inputs.get(name).cloned(),
        };

        let mut value = match supplied.or_else(|| variable.default.clone()) {
            Some(value) => value,
            None => {
                return Err(Diagnostic::error(
                    "No value for required variable",
                    format!("{addr} is not set and has no default value"),
                ));
            }
        };
        if value.is_null() && !variable.nullable {
            value = variable.default.clone().filter(|d| !d.is_null()).ok_or_else(|| {
                Diagnostic::error("Required variable not set", format!("{addr} does not accept null"))
            })?;
        }
        if let Some(hint) = &variable.type_hint
            && !type_matches(hint, &value)
        {
            return Err(Diagnostic::error(
                "Invalid value for input variable",
                format!("{addr} expects a {hint} value, got {}", value.type_name()),
            ));
        }
        Ok(value)
    }

    /// Runs the validation rules of a variable.
    pub(crate) fn validate_variable(&self, addr: &Address, values: &WalkValues) -> (CheckResult, Diagnostics) {
        let rules = self.config.variable(addr).map(|v| v.validations.as_slice()).unwrap_or_default();
        self.run_rules(addr, CheckKind::InputVariable, rules, values)
    }

    /// Runs the assertions of a check block. Failures are warnings.
    pub(crate) fn check_block(&self, addr: &Address, values: &WalkValues) -> (CheckResult, Diagnostics) {
        let rules: &[Rule] = match &addr.subject {
            Subject::Check(name) => self
                .config
                .module(&addr.module)
                .and_then(|m| m.checks.get(name))
                .map(|c| c.asserts.as_slice())
                .unwrap_or_default(),
            _ => &[],
        };
        self.run_rules(addr, CheckKind::CheckBlock, rules, values)
    }

    fn run_rules(
        &self,
        addr: &Address,
        kind: CheckKind,
        rules: &[Rule],
        values: &WalkValues,
    ) -> (CheckResult, Diagnostics) {
        let mut result = CheckResult::pass(addr.clone(), kind);
        let mut diags = Diagnostics::new();
        for rule in rules {
            match self.evaluate(&rule.condition, &addr.module, values, None) {
                Ok(Value::Bool(true)) => result.record(CheckStatus::Pass, None),
                Ok(Value::Bool(false)) => {
                    let message = self.rule_message(rule, &addr.module, values);
                    let diag = match kind {
                        CheckKind::InputVariable => Diagnostic::error(
                            "Invalid value for variable",
                            format!("{message}\n\nThis was checked by the validation rule of {addr}."),
                        ),
                        CheckKind::CheckBlock => Diagnostic::warning(
                            "Check block assertion failed",
                            format!("{message}\n\nThis was checked by {addr}."),
                        ),
                    };
                    diags.push(diag.with_subject(addr.clone()));
                    result.record(CheckStatus::Fail, Some(message));
                }
                Ok(Value::Unknown) => {
                    debug!("Condition of {addr} is not known yet");
                    result.record(CheckStatus::Unknown, None);
                }
                Ok(other) => {
                    let message = format!("the condition must be a bool, got {}", other.type_name());
                    diags.push(Diagnostic::error("Invalid condition result", message.clone()).with_subject(addr.clone()));
                    result.record(CheckStatus::Error, Some(message));
                }
                Err(diag) => {
                    result.record(CheckStatus::Error, Some(diag.detail.clone()));
                    diags.push(diag.with_subject(addr.clone()));
                }
            }
        }
        (result, diags)
    }

    fn rule_message(&self, rule: &Rule, module: &ModulePath, values: &WalkValues) -> String {
        match self.evaluate(&rule.message, module, values, None) {
            Ok(Value::String(message)) => message,
            Ok(Value::Unknown) => String::from("(error message not known yet)"),
            Ok(other) => other.to_string(),
            Err(diag) => format!("(failed to evaluate error message: {})", diag.detail),
        }
    }

    /// Value of a local.
    pub(crate) fn local(&self, addr: &Address, values: &WalkValues) -> Result<Value, Diagnostic> {
        let local = match &addr.subject {
            Subject::Local(name) => self.config.module(&addr.module).and_then(|m| m.locals.get(name)),
            _ => None,
        }
        .ok_or_else(|| missing_config(addr))?;
        self.evaluate(&local.expr, &addr.module, values, None)
    }

    /// Value of an output, with every address it is visible under: its
    /// own, plus `module.<call>.<name>` in the parent for child modules.
    pub(crate) fn output(&self, addr: &Address, values: &WalkValues) -> Result<(Value, Vec<(Address, Value)>), Diagnostic> {
        let Subject::Output(name) = &addr.subject else {
            return Err(missing_config(addr));
        };
        let output = self
            .config
            .module(&addr.module)
            .and_then(|m| m.outputs.get(name))
            .ok_or_else(|| missing_config(addr))?;
        let value = self.evaluate(&output.expr, &addr.module, values, None)?;

        let mut visible = vec![(addr.clone(), value.clone())];
        if let Some((parent, call)) = self.config.module_call(&addr.module) {
            visible.push((
                Address::new(
                    parent,
                    Subject::ModuleCallOutput {
                        call: call.name.clone(),
                        name: name.clone(),
                    },
                ),
                value.clone(),
            ));
        }
        Ok((value, visible))
    }

    /// Whether an output is marked sensitive.
    pub(crate) fn output_sensitive(&self, addr: &Address) -> bool {
        match &addr.subject {
            Subject::Output(name) => self
                .config
                .module(&addr.module)
                .and_then(|m| m.outputs.get(name))
                .is_some_and(|o| o.sensitive),
            _ => false,
        }
    }

    /// Evaluated configuration of an action declaration.
    pub(crate) fn action_config(&self, addr: &Address, values: &WalkValues) -> Result<Value, Diagnostic> {
        let action = self.config.action(addr).ok_or_else(|| missing_config(addr))?;
        self.evaluate(&action.config, &addr.module, values, None)
    }

    /// Evaluated configuration of a provider. Providers without a block
    /// are configured with an empty object.
    pub(crate) fn provider_config(&self, addr: &Address, values: &WalkValues) -> Result<Value, Diagnostic> {
        let implicit;
        let provider = match self.config.provider(addr) {
            Some(provider) => provider,
            None => {
                implicit = ProviderConfig::implicit(addr.clone());
                &implicit
            }
        };
        self.evaluate(&provider.config, &ModulePath::root(), values, None)
    }

    /// Instance keys of a resource, or `None` while its count is unknown.
    pub(crate) fn instance_keys(&self, resource: &Resource, values: &WalkValues) -> Result<Option<Vec<InstanceKey>>, Diagnostic> {
        let Some(count) = &resource.count else {
            return Ok(Some(vec![InstanceKey::NoKey]));
        };
        match self.evaluate(count, &resource.addr.module, values, None)? {
            Value::Unknown => Ok(None),
            #[allow(clippy::cast_possible_truncation)]
            Value::Number(n) if n >= 0.0 && n.fract() == 0.0 => Ok(Some((0..n as i64).map(InstanceKey::Int).collect())),
            other => Err(Diagnostic::error(
                "Invalid count argument",
                format!("count must be a non-negative whole number, got {other}"),
            )),
        }
    }

    /// Evaluated configuration of one instance.
    pub(crate) fn instance_config(
        &self,
        resource: &Resource,
        key: &InstanceKey,
        values: &WalkValues,
    ) -> Result<Value, Diagnostic> {
        let count_index = match key {
            InstanceKey::Int(i) => Some(*i),
            _ => None,
        };
        self.evaluate(&resource.config, &resource.addr.module, values, count_index)
    }
}

/// The value downstream nodes see for a resource: the single instance's
/// value, or a list ordered by index for a counted resource.
pub(crate) fn resource_value(resource: &Resource, instances: &BTreeMap<InstanceKey, Value>) -> Value {
    if resource.count.is_some() {
        Value::List(
            instances
                .iter()
                .filter(|(key, _)| matches!(key, InstanceKey::Int(_)))
                .map(|(_, value)| value.clone())
                .collect(),
        )
    } else {
        instances.get(&InstanceKey::NoKey).cloned().unwrap_or(Value::Null)
    }
}

/// Resource addresses a node reads.
pub(crate) fn consumed_resources(node: &Node) -> Vec<Address> {
    node.consumes()
        .into_iter()
        .flatten()
        .filter(|addr| matches!(addr.subject, Subject::Resource(_)))
        .cloned()
        .collect()
}

fn type_matches(hint: &str, value: &Value) -> bool {
    match (hint, value) {
        (_, Value::Null | Value::Unknown) => true,
        ("string", v) => matches!(v, Value::String(_)),
        ("number", v) => matches!(v, Value::Number(_)),
        ("bool", v) => matches!(v, Value::Bool(_)),
        ("list" | "set" | "tuple", v) => matches!(v, Value::List(_)),
        ("map" | "object", v) => matches!(v, Value::Object(_)),
        _ => true,
    }
}

fn missing_config(addr: &Address) -> Diagnostic {
    Diagnostic::error("Missing configuration", format!("{addr} is not declared in the configuration"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::ResourceAddr;
    use crate::config::ConfigParser;

    fn evaluator(yaml: &str) -> Evaluator {
        let config = ConfigParser::parse_str(yaml).expect("config");
        Evaluator::new(
            Arc::new(config),
            Arc::new(ProviderRegistry::new()),
            Arc::new(FunctionResults::new()),
        )
    }

    #[test]
    fn test_root_variable_falls_back_to_default() {
        let eval = evaluator(
            r"
variables:
  - name: size
    type: number
    default: 3
  - name: name
    type: string
",
        );
        let values = WalkValues::new();
        let inputs = BTreeMap::from([(String::from("size"), Value::Number(7.0))]);
        assert_eq!(
            eval.variable(&Address::root_variable("size"), &inputs, &values).expect("size"),
            Value::Number(7.0)
        );
        assert_eq!(
            eval.variable(&Address::root_variable("size"), &BTreeMap::new(), &values).expect("default"),
            Value::Number(3.0)
        );
        let missing = eval
            .variable(&Address::root_variable("name"), &BTreeMap::new(), &values)
            .expect_err("required");
        assert_eq!(missing.summary, "No value for required variable");

        let wrong = BTreeMap::from([(String::from("size"), Value::string("big"))]);
        assert!(eval.variable(&Address::root_variable("size"), &wrong, &values).is_err());
    }

    #[test]
    fn test_child_variable_reads_parent_scope() {
        let eval = evaluator(
            r#"
locals:
  base: "40"
modules:
  - name: child
    inputs:
      size: "local.base + 2"
    config:
      variables:
        - name: size
"#,
        );
        let values = WalkValues::new();
        values.insert(
            Address::new(ModulePath::root(), Subject::Local(String::from("base"))),
            Value::Number(40.0),
        );
        let addr = Address::new(ModulePath::root().child("child"), Subject::Variable(String::from("size")));
        assert_eq!(eval.variable(&addr, &BTreeMap::new(), &values).expect("size"), Value::Number(42.0));
    }

    #[test]
    fn test_validation_rules() {
        let eval = evaluator(
            r#"
variables:
  - name: v
    validation:
      - condition: "var.v > 0"
        error_message: "v must be positive, got ${var.v}"
"#,
        );
        let addr = Address::root_variable("v");
        let values = WalkValues::new();

        values.insert(addr.clone(), Value::Number(5.0));
        let (result, diags) = eval.validate_variable(&addr, &values);
        assert_eq!(result.status, CheckStatus::Pass);
        assert!(diags.is_empty());

        values.insert(addr.clone(), Value::Number(-1.0));
        let (result, diags) = eval.validate_variable(&addr, &values);
        assert_eq!(result.status, CheckStatus::Fail);
        assert_eq!(result.failure_messages, vec!["v must be positive, got -1"]);
        assert!(diags.has_errors());

        values.insert(addr.clone(), Value::Unknown);
        let (result, diags) = eval.validate_variable(&addr, &values);
        assert_eq!(result.status, CheckStatus::Unknown);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_instance_keys() {
        let eval = evaluator(
            r#"
variables:
  - name: n
resources:
  - type: test_resource
    name: many
    count: "var.n"
  - type: test_resource
    name: one
"#,
        );
        let values = WalkValues::new();
        let many = eval
            .config()
            .resource(&Address::new(ModulePath::root(), Subject::Resource(ResourceAddr::managed("test_resource", "many"))))
            .expect("many")
            .clone();
        let one = eval
            .config()
            .resource(&Address::new(ModulePath::root(), Subject::Resource(ResourceAddr::managed("test_resource", "one"))))
            .expect("one")
            .clone();

        assert_eq!(eval.instance_keys(&one, &values).expect("one"), Some(vec![InstanceKey::NoKey]));

        values.insert(Address::root_variable("n"), Value::Number(2.0));
        assert_eq!(
            eval.instance_keys(&many, &values).expect("many"),
            Some(vec![InstanceKey::Int(0), InstanceKey::Int(1)])
        );

        values.insert(Address::root_variable("n"), Value::Unknown);
        assert_eq!(eval.instance_keys(&many, &values).expect("unknown"), None);

        values.insert(Address::root_variable("n"), Value::Number(1.5));
        assert!(eval.instance_keys(&many, &values).is_err());
    }
}
