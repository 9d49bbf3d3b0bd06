//! The typed configuration the engine works with.
//!
//! [`Config::from_spec`] lowers the raw YAML structs into per-module maps
//! keyed by address, with every expression field parsed.

use std::collections::BTreeMap;

use crate::addrs::{Address, InstanceKey, ModulePath, ResourceAddr, ResourceMode, Subject, parse_ref};
use crate::error::ConfigError;
use crate::lang::{Expr, Value, parse_expression, parse_template};
use crate::plans::TriggerEvent;

use super::spec::{
    ActionSpec, ActionTriggerSpec, CheckSpec, InfraConfig, ModeSpec, ModuleSpec, OutputSpec, ProviderSpec,
    ResourceSpec, RuleSpec, VariableSpec,
};

/// A fully lowered configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// The root module.
    pub root: Module,
    /// Import blocks.
    pub imports: Vec<Import>,
    /// Removed blocks.
    pub removed: Vec<Removed>,
    /// SHA-256 fingerprint of the source configuration.
    pub fingerprint: String,
}

/// One module's declarations.
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// Where the module sits in the tree.
    pub path: ModulePath,
    /// Provider configurations, by provider address.
    pub providers: BTreeMap<Address, ProviderConfig>,
    /// Input variables, by name.
    pub variables: BTreeMap<String, Variable>,
    /// Local values, by name.
    pub locals: BTreeMap<String, Local>,
    /// Resources, by resource address.
    pub resources: BTreeMap<Address, Resource>,
    /// Outputs, by name.
    pub outputs: BTreeMap<String, Output>,
    /// Check blocks, by name.
    pub checks: BTreeMap<String, Check>,
    /// Actions, by action address.
    pub actions: BTreeMap<Address, ActionConfig>,
    /// Child module calls, by call name.
    pub calls: BTreeMap<String, ModuleCall>,
}

/// A provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// `provider.<type>[.<alias>]`
    pub addr: Address,
    /// Provider type.
    pub type_name: String,
    /// Arguments.
    pub config: Expr,
}

/// A condition and the message reported when it is false.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Boolean condition.
    pub condition: Expr,
    /// Message template.
    pub message: Expr,
}

/// An input variable.
#[derive(Debug, Clone)]
pub struct Variable {
    /// `var.<name>` in the declaring module.
    pub addr: Address,
    /// Type hint.
    pub type_hint: Option<String>,
    /// Default value.
    pub default: Option<Value>,
    /// Hidden in output.
    pub sensitive: bool,
    /// Accepts null.
    pub nullable: bool,
    /// Validation rules.
    pub validations: Vec<Rule>,
}

/// A local value.
#[derive(Debug, Clone)]
pub struct Local {
    /// `local.<name>`
    pub addr: Address,
    /// Value expression.
    pub expr: Expr,
}

/// An action trigger attached to a resource.
#[derive(Debug, Clone)]
pub struct ActionTriggerConfig {
    /// Events that fire the trigger.
    pub events: Vec<TriggerEvent>,
    /// Actions to invoke, in order.
    pub actions: Vec<Address>,
    /// Optional guard condition.
    pub condition: Option<Expr>,
}

/// Resource lifecycle settings.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
    /// Create the replacement first.
    pub create_before_destroy: bool,
    /// Refuse to destroy.
    pub prevent_destroy: bool,
    /// Action triggers.
    pub action_triggers: Vec<ActionTriggerConfig>,
}

/// A resource or data source.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Resource address.
    pub addr: Address,
    /// Module-local resource address.
    pub resource: ResourceAddr,
    /// Provider configuration address.
    pub provider: Address,
    /// `count`, when set.
    pub count: Option<Expr>,
    /// Arguments.
    pub config: Expr,
    /// Explicit dependencies.
    pub depends_on: Vec<Address>,
    /// Lifecycle settings.
    pub lifecycle: Lifecycle,
}

/// An output value.
#[derive(Debug, Clone)]
pub struct Output {
    /// `output.<name>`
    pub addr: Address,
    /// Value expression.
    pub expr: Expr,
    /// Hidden in output.
    pub sensitive: bool,
}

/// A check block.
#[derive(Debug, Clone)]
pub struct Check {
    /// `check.<name>`
    pub addr: Address,
    /// Assertions.
    pub asserts: Vec<Rule>,
}

/// An action declaration.
#[derive(Debug, Clone)]
pub struct ActionConfig {
    /// `action.<type>.<name>`
    pub addr: Address,
    /// Action type.
    pub type_name: String,
    /// Provider configuration address.
    pub provider: Address,
    /// Arguments.
    pub config: Expr,
}

/// A child module call.
#[derive(Debug, Clone)]
pub struct ModuleCall {
    /// Call name.
    pub name: String,
    /// Input expressions, evaluated in the calling module.
    pub inputs: BTreeMap<String, Expr>,
    /// The child module.
    pub module: Module,
}

/// An import block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Target instance address.
    pub to: Address,
    /// Provider-specific id.
    pub id: String,
}

/// A removed block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    /// Resource address.
    pub from: Address,
    /// Destroy (`true`) or forget (`false`).
    pub destroy: bool,
}

/// How strings inside a YAML value are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StringMode {
    /// Literal text with `${ }` interpolation.
    Template,
    /// A bare expression.
    Expression,
}

impl Config {
    /// Lowers a parsed configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate names, malformed addresses and
    /// expression syntax errors.
    pub fn from_spec(spec: &InfraConfig, fingerprint: impl Into<String>) -> Result<Self, ConfigError> {
        let root = lower_module(spec, ModulePath::root())?;

        let mut imports = Vec::new();
        for (i, import) in spec.imports.iter().enumerate() {
            let field = format!("imports[{i}].to");
            let to = parse_address(&import.to, &field)?;
            let to = match to.subject {
                Subject::Resource(r) => Address::instance(to.module, r, InstanceKey::NoKey),
                Subject::ResourceInstance(..) => to,
                _ => return Err(ConfigError::validation("import target must be a resource instance", field)),
            };
            imports.push(Import {
                to,
                id: import.id.clone(),
            });
        }

        let mut removed = Vec::new();
        for (i, block) in spec.removed.iter().enumerate() {
            let field = format!("removed[{i}].from");
            let from = parse_address(&block.from, &field)?;
            if !matches!(from.subject, Subject::Resource(_)) {
                return Err(ConfigError::validation("removed blocks must name a resource", field));
            }
            removed.push(Removed {
                from,
                destroy: block.destroy,
            });
        }

        Ok(Self {
            root,
            imports,
            removed,
            fingerprint: fingerprint.into(),
        })
    }

    /// Every module, parents before children.
    #[must_use]
    pub fn modules(&self) -> Vec<&Module> {
        let mut out = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(module) = stack.pop() {
            out.push(module);
            stack.extend(module.calls.values().rev().map(|c| &c.module));
        }
        out
    }

    /// The module at `path`.
    #[must_use]
    pub fn module(&self, path: &ModulePath) -> Option<&Module> {
        let mut module = &self.root;
        for call in path.calls() {
            module = &module.calls.get(call)?.module;
        }
        Some(module)
    }

    /// The call that instantiates the module at `path`, with its parent path.
    #[must_use]
    pub fn module_call(&self, path: &ModulePath) -> Option<(ModulePath, &ModuleCall)> {
        let (parent, name) = path.split_last()?;
        let call = self.module(&parent)?.calls.get(name)?;
        Some((parent, call))
    }

    /// The resource declared at `addr`, a resource (not instance) address.
    #[must_use]
    pub fn resource(&self, addr: &Address) -> Option<&Resource> {
        self.module(&addr.module)?.resources.get(addr)
    }

    /// The variable declared at `addr`.
    #[must_use]
    pub fn variable(&self, addr: &Address) -> Option<&Variable> {
        match &addr.subject {
            Subject::Variable(name) => self.module(&addr.module)?.variables.get(name),
            _ => None,
        }
    }

    /// The provider configuration at `addr`.
    #[must_use]
    pub fn provider(&self, addr: &Address) -> Option<&ProviderConfig> {
        self.root.providers.get(addr)
    }

    /// The action declared at `addr`.
    #[must_use]
    pub fn action(&self, addr: &Address) -> Option<&ActionConfig> {
        self.module(&addr.module)?.actions.get(addr)
    }

    /// The import block targeting `instance`, if any.
    #[must_use]
    pub fn import_for(&self, instance: &Address) -> Option<&Import> {
        self.imports.iter().find(|i| &i.to == instance)
    }

    /// The removed block for `resource`, if any.
    #[must_use]
    pub fn removed_for(&self, resource: &Address) -> Option<&Removed> {
        self.removed.iter().find(|r| &r.from == resource)
    }

    /// Provider type names used anywhere in the configuration.
    #[must_use]
    pub fn provider_addrs_in_use(&self) -> Vec<Address> {
        let mut addrs: Vec<Address> = self
            .modules()
            .into_iter()
            .flat_map(|m| {
                m.resources
                    .values()
                    .map(|r| r.provider.clone())
                    .chain(m.actions.values().map(|a| a.provider.clone()))
            })
            .collect();
        addrs.sort();
        addrs.dedup();
        addrs
    }
}

impl Module {
    /// Number of declared entities, excluding child modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
            + self.variables.len()
            + self.locals.len()
            + self.resources.len()
            + self.outputs.len()
            + self.checks.len()
            + self.actions.len()
    }

    /// Returns true if the module declares nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.calls.is_empty()
    }
}

impl ProviderConfig {
    /// Type name of the provider configured at `addr`.
    #[must_use]
    pub fn type_of(addr: &Address) -> Option<&str> {
        match &addr.subject {
            Subject::ProviderConfig { type_name, .. } => Some(type_name),
            _ => None,
        }
    }

    /// An empty configuration for a provider that is used but not declared.
    #[must_use]
    pub fn implicit(addr: Address) -> Self {
        let type_name = Self::type_of(&addr).unwrap_or_default().to_string();
        Self {
            addr,
            type_name,
            config: Expr::Object(Vec::new()),
        }
    }
}

fn lower_module(spec: &InfraConfig, path: ModulePath) -> Result<Module, ConfigError> {
    if !path.is_root() {
        if !spec.providers.is_empty() {
            return Err(ConfigError::validation_general(format!(
                "{path}: providers can only be configured in the root module"
            )));
        }
        if !spec.imports.is_empty() || !spec.removed.is_empty() {
            return Err(ConfigError::validation_general(format!(
                "{path}: import and removed blocks are only allowed in the root module"
            )));
        }
    }

    let mut module = Module {
        path: path.clone(),
        ..Module::default()
    };

    for provider in &spec.providers {
        let lowered = lower_provider(provider)?;
        insert_unique(&mut module.providers, lowered.addr.clone(), lowered, "provider")?;
    }
    for variable in &spec.variables {
        let lowered = lower_variable(variable, &path)?;
        insert_unique(&mut module.variables, variable.name.clone(), lowered, "variable")?;
    }
    for (name, value) in &spec.locals {
        let field = format!("locals.{name}");
        let expr = yaml_to_expr(value, &field, StringMode::Expression)?;
        let addr = Address::new(path.clone(), Subject::Local(name.clone()));
        module.locals.insert(name.clone(), Local { addr, expr });
    }
    for resource in &spec.resources {
        let lowered = lower_resource(resource, &path)?;
        insert_unique(&mut module.resources, lowered.addr.clone(), lowered, "resource")?;
    }
    for output in &spec.outputs {
        let lowered = lower_output(output, &path)?;
        insert_unique(&mut module.outputs, output.name.clone(), lowered, "output")?;
    }
    for check in &spec.checks {
        let lowered = lower_check(check, &path)?;
        insert_unique(&mut module.checks, check.name.clone(), lowered, "check")?;
    }
    for action in &spec.actions {
        let lowered = lower_action(action, &path)?;
        insert_unique(&mut module.actions, lowered.addr.clone(), lowered, "action")?;
    }
    for call in &spec.modules {
        let lowered = lower_call(call, &path)?;
        insert_unique(&mut module.calls, call.name.clone(), lowered, "module")?;
    }

    Ok(module)
}

fn insert_unique<K: Ord + std::fmt::Display, V>(
    map: &mut BTreeMap<K, V>,
    key: K,
    value: V,
    kind: &str,
) -> Result<(), ConfigError> {
    if map.contains_key(&key) {
        return Err(ConfigError::DuplicateName {
            kind: kind.to_string(),
            name: key.to_string(),
        });
    }
    map.insert(key, value);
    Ok(())
}

fn lower_provider(spec: &ProviderSpec) -> Result<ProviderConfig, ConfigError> {
    let addr = Address::provider(spec.name.clone(), spec.alias.clone());
    let config = yaml_to_expr(&spec.config, &format!("{addr}.config"), StringMode::Template)?;
    Ok(ProviderConfig {
        addr,
        type_name: spec.name.clone(),
        config: empty_object_if_null(config),
    })
}

fn lower_variable(spec: &VariableSpec, module: &ModulePath) -> Result<Variable, ConfigError> {
    let addr = Address::new(module.clone(), Subject::Variable(spec.name.clone()));
    let validations = spec
        .validation
        .iter()
        .enumerate()
        .map(|(i, rule)| lower_rule(rule, &format!("{addr}.validation[{i}]")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Variable {
        addr,
        type_hint: spec.type_hint.clone(),
        default: spec.default.as_ref().map(yaml_to_value),
        sensitive: spec.sensitive,
        nullable: spec.nullable,
        validations,
    })
}

fn lower_rule(spec: &RuleSpec, field: &str) -> Result<Rule, ConfigError> {
    let condition = parse_expression(&spec.condition).map_err(|e| ConfigError::ExpressionSyntax {
        field: format!("{field}.condition"),
        message: e.to_string(),
    })?;
    let message = parse_template(&spec.error_message).map_err(|e| ConfigError::ExpressionSyntax {
        field: format!("{field}.error_message"),
        message: e.to_string(),
    })?;
    Ok(Rule { condition, message })
}

fn lower_resource(spec: &ResourceSpec, module: &ModulePath) -> Result<Resource, ConfigError> {
    let resource = match spec.mode {
        ModeSpec::Managed => ResourceAddr::managed(spec.type_name.clone(), spec.name.clone()),
        ModeSpec::Data => ResourceAddr::data(spec.type_name.clone(), spec.name.clone()),
    };
    let addr = Address::new(module.clone(), Subject::Resource(resource.clone()));
    let provider = provider_ref(spec.provider.as_deref(), resource.implied_provider(), &format!("{addr}.provider"))?;

    let count = spec
        .count
        .as_ref()
        .map(|c| yaml_to_expr(c, &format!("{addr}.count"), StringMode::Expression))
        .transpose()?;
    let config = empty_object_if_null(yaml_to_expr(&spec.config, &format!("{addr}.config"), StringMode::Template)?);

    let depends_on = spec
        .depends_on
        .iter()
        .map(|d| parse_relative(d, module, &format!("{addr}.depends_on")).map(|a| a.containing_resource()))
        .collect::<Result<Vec<_>, _>>()?;

    if resource.mode == ResourceMode::Data && !spec.lifecycle.action_triggers.is_empty() {
        return Err(ConfigError::validation(
            "data sources cannot trigger actions",
            format!("{addr}.lifecycle.action_triggers"),
        ));
    }
    let action_triggers = spec
        .lifecycle
        .action_triggers
        .iter()
        .enumerate()
        .map(|(i, t)| lower_trigger(t, module, &format!("{addr}.lifecycle.action_triggers[{i}]")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Resource {
        addr,
        resource,
        provider,
        count,
        config,
        depends_on,
        lifecycle: Lifecycle {
            create_before_destroy: spec.lifecycle.create_before_destroy,
            prevent_destroy: spec.lifecycle.prevent_destroy,
            action_triggers,
        },
    })
}

fn lower_trigger(spec: &ActionTriggerSpec, module: &ModulePath, field: &str) -> Result<ActionTriggerConfig, ConfigError> {
    let events = spec
        .events
        .iter()
        .map(|e| {
            TriggerEvent::from_config(e)
                .ok_or_else(|| ConfigError::validation(format!("unknown trigger event {e:?}"), format!("{field}.events")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let actions = spec
        .actions
        .iter()
        .map(|a| {
            let addr = parse_relative(a, module, &format!("{field}.actions"))?;
            if matches!(addr.subject, Subject::Action { .. }) {
                Ok(addr)
            } else {
                Err(ConfigError::validation(
                    format!("{a:?} is not an action reference"),
                    format!("{field}.actions"),
                ))
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    let condition = spec
        .condition
        .as_deref()
        .map(|c| {
            parse_expression(c).map_err(|e| ConfigError::ExpressionSyntax {
                field: format!("{field}.condition"),
                message: e.to_string(),
            })
        })
        .transpose()?;
    Ok(ActionTriggerConfig {
        events,
        actions,
        condition,
    })
}

fn lower_output(spec: &OutputSpec, module: &ModulePath) -> Result<Output, ConfigError> {
    let addr = Address::new(module.clone(), Subject::Output(spec.name.clone()));
    let expr = yaml_to_expr(&spec.value, &format!("{addr}.value"), StringMode::Expression)?;
    Ok(Output {
        addr,
        expr,
        sensitive: spec.sensitive,
    })
}

fn lower_check(spec: &CheckSpec, module: &ModulePath) -> Result<Check, ConfigError> {
    let addr = Address::new(module.clone(), Subject::Check(spec.name.clone()));
    let asserts = spec
        .asserts
        .iter()
        .enumerate()
        .map(|(i, rule)| lower_rule(rule, &format!("{addr}.assert[{i}]")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Check { addr, asserts })
}

fn lower_action(spec: &ActionSpec, module: &ModulePath) -> Result<ActionConfig, ConfigError> {
    let addr = Address::new(
        module.clone(),
        Subject::Action {
            type_name: spec.type_name.clone(),
            name: spec.name.clone(),
        },
    );
    let implied = spec
        .type_name
        .split_once('_')
        .map_or(spec.type_name.as_str(), |(prefix, _)| prefix);
    let provider = provider_ref(spec.provider.as_deref(), implied, &format!("{addr}.provider"))?;
    let config = empty_object_if_null(yaml_to_expr(&spec.config, &format!("{addr}.config"), StringMode::Template)?);
    Ok(ActionConfig {
        addr,
        type_name: spec.type_name.clone(),
        provider,
        config,
    })
}

fn lower_call(spec: &ModuleSpec, parent: &ModulePath) -> Result<ModuleCall, ConfigError> {
    let path = parent.child(spec.name.clone());
    let inputs = spec
        .inputs
        .iter()
        .map(|(name, value)| {
            yaml_to_expr(value, &format!("module.{}.inputs.{name}", spec.name), StringMode::Expression)
                .map(|e| (name.clone(), e))
        })
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    let module = lower_module(&spec.config, path)?;
    for name in inputs.keys() {
        if !module.variables.contains_key(name) {
            return Err(ConfigError::validation(
                format!("module {} has no variable named {name:?}", spec.name),
                format!("module.{}.inputs", spec.name),
            ));
        }
    }
    Ok(ModuleCall {
        name: spec.name.clone(),
        inputs,
        module,
    })
}

fn provider_ref(explicit: Option<&str>, implied: &str, field: &str) -> Result<Address, ConfigError> {
    let Some(text) = explicit else {
        return Ok(Address::provider(implied, None));
    };
    match text.split('.').collect::<Vec<_>>().as_slice() {
        [type_name] if !type_name.is_empty() => Ok(Address::provider(*type_name, None)),
        [type_name, alias] if !type_name.is_empty() && !alias.is_empty() => {
            Ok(Address::provider(*type_name, Some((*alias).to_string())))
        }
        _ => Err(ConfigError::validation(format!("invalid provider reference {text:?}"), field)),
    }
}

fn parse_address(text: &str, field: &str) -> Result<Address, ConfigError> {
    text.parse::<Address>()
        .map_err(|e| ConfigError::validation(e, field))
}

fn parse_relative(text: &str, module: &ModulePath, field: &str) -> Result<Address, ConfigError> {
    let expr = parse_expression(text).map_err(|e| ConfigError::ExpressionSyntax {
        field: field.to_string(),
        message: e.to_string(),
    })?;
    let Expr::Traversal(traversal) = expr else {
        return Err(ConfigError::validation(format!("{text:?} is not a reference"), field));
    };
    parse_ref(&traversal, module)
        .map(|r| r.subject)
        .map_err(|d| ConfigError::validation(d.summary, field))
}

fn empty_object_if_null(expr: Expr) -> Expr {
    match expr {
        Expr::Literal(Value::Null) => Expr::Object(Vec::new()),
        other => other,
    }
}

fn yaml_to_expr(value: &serde_yaml::Value, field: &str, mode: StringMode) -> Result<Expr, ConfigError> {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::String(s) => {
            let parsed = match mode {
                StringMode::Template => parse_template(s),
                StringMode::Expression => parse_expression(s),
            };
            parsed.map_err(|e| ConfigError::ExpressionSyntax {
                field: field.to_string(),
                message: e.to_string(),
            })
        }
        Yaml::Sequence(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| yaml_to_expr(item, &format!("{field}[{i}]"), mode))
            .collect::<Result<Vec<_>, _>>()
            .map(Expr::List),
        Yaml::Mapping(map) => map
            .iter()
            .map(|(k, v)| {
                let key = k
                    .as_str()
                    .ok_or_else(|| ConfigError::validation("object keys must be strings", field))?;
                yaml_to_expr(v, &format!("{field}.{key}"), mode).map(|e| (key.to_string(), e))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Expr::Object),
        Yaml::Tagged(_) => Err(ConfigError::validation("YAML tags are not supported", field)),
        scalar => Ok(Expr::Literal(yaml_to_value(scalar))),
    }
}

/// Converts a YAML value into a runtime value, without interpreting strings.
#[must_use]
pub fn yaml_to_value(value: &serde_yaml::Value) -> Value {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(*b),
        Yaml::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
        Yaml::String(s) => Value::String(s.clone()),
        Yaml::Sequence(items) => Value::List(items.iter().map(yaml_to_value).collect()),
        Yaml::Mapping(map) => Value::Object(
            map.iter()
                .filter_map(|(k, v)| k.as_str().map(|k| (k.to_string(), yaml_to_value(v))))
                .collect(),
        ),
        Yaml::Tagged(tagged) => yaml_to_value(&tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(yaml: &str) -> Result<Config, ConfigError> {
        let spec: InfraConfig = serde_yaml::from_str(yaml).expect("yaml");
        Config::from_spec(&spec, "fp")
    }

    #[test]
    fn test_lower_resources_and_references() {
        let config = lower(
            r#"
variables:
  - name: v
    default: 5
    validation:
      - condition: "var.v > 0"
        error_message: "v must be positive, got ${var.v}"
resources:
  - type: test_resource
    name: a
    config:
      value: "${var.v}"
    depends_on: ["test_resource.b"]
  - type: test_resource
    name: b
"#,
        )
        .expect("lower");

        let a = "test_resource.a".parse::<Address>().expect("addr");
        let resource = config.resource(&a).expect("resource");
        assert_eq!(resource.provider, Address::provider("test", None));
        assert_eq!(resource.depends_on, vec!["test_resource.b".parse::<Address>().expect("addr")]);

        let v = config.variable(&Address::root_variable("v")).expect("variable");
        assert_eq!(v.default, Some(Value::Number(5.0)));
        assert_eq!(v.validations.len(), 1);
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let err = lower(
            r"
resources:
  - type: test_resource
    name: a
  - type: test_resource
    name: a
",
        )
        .expect_err("duplicate");
        assert!(matches!(err, ConfigError::DuplicateName { .. }));
    }

    #[test]
    fn test_bad_expression_names_field() {
        let err = lower(
            r#"
outputs:
  - name: o
    value: "var.v +"
"#,
        )
        .expect_err("syntax");
        match err {
            ConfigError::ExpressionSyntax { field, .. } => assert_eq!(field, "output.o.value"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_child_module_lookup() {
        let config = lower(
            r#"
modules:
  - name: child
    inputs:
      x: "var.top"
    config:
      variables:
        - name: x
      resources:
        - type: test_resource
          name: inner
"#,
        )
        .expect("lower");
        let path = ModulePath::root().child("child");
        let (parent, call) = config.module_call(&path).expect("call");
        assert!(parent.is_root());
        assert!(call.inputs.contains_key("x"));
        assert_eq!(config.modules().len(), 2);
        let inner = "module.child.test_resource.inner".parse::<Address>().expect("addr");
        assert!(config.resource(&inner).is_some());
    }

    #[test]
    fn test_import_target_becomes_instance() {
        let config = lower(
            r#"
resources:
  - type: test_resource
    name: a
imports:
  - to: test_resource.a
    id: existing
"#,
        )
        .expect("lower");
        assert_eq!(config.imports[0].to.to_string(), "test_resource.a");
        assert!(config.imports[0].to.instance_key().is_some());
    }
}
