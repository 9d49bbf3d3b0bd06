//! Configuration specification types.
//!
//! This module defines the structs that map to the `plangraph.yaml` file.
//! They describe the desired state declaratively; expression fields are kept
//! as text here and parsed when the file is lowered into a
//! [`super::model::Config`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The root of a configuration file, and the body of an inline module.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InfraConfig {
    /// Provider configurations.
    #[serde(default)]
    pub providers: Vec<ProviderSpec>,
    /// Input variables.
    #[serde(default)]
    pub variables: Vec<VariableSpec>,
    /// Local values, by name. String values are expressions.
    #[serde(default)]
    pub locals: BTreeMap<String, serde_yaml::Value>,
    /// Managed resources and data sources.
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    /// Output values.
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
    /// Check blocks.
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
    /// Actions that resources can trigger.
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    /// Inline child modules.
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
    /// Import blocks.
    #[serde(default)]
    pub imports: Vec<ImportSpec>,
    /// Removed blocks.
    #[serde(default)]
    pub removed: Vec<RemovedSpec>,
}

/// A provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProviderSpec {
    /// Provider type, e.g. `test`.
    pub name: String,
    /// Optional alias for additional configurations of the same type.
    #[serde(default)]
    pub alias: Option<String>,
    /// Provider arguments. Strings may use `${ }` interpolation.
    #[serde(default)]
    pub config: serde_yaml::Value,
}

/// An input variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VariableSpec {
    /// Variable name.
    pub name: String,
    /// Type hint: `string`, `number`, `bool`, `list`, `map` or `any`.
    #[serde(default, rename = "type")]
    pub type_hint: Option<String>,
    /// Human description.
    #[serde(default)]
    pub description: Option<String>,
    /// Default value; a variable without one is required.
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,
    /// Whether the value is hidden in output.
    #[serde(default)]
    pub sensitive: bool,
    /// Whether null is an acceptable value.
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Validation rules.
    #[serde(default)]
    pub validation: Vec<RuleSpec>,
}

/// A condition with the message reported when it is false.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    /// Boolean expression.
    pub condition: String,
    /// Message template reported when the condition is false.
    pub error_message: String,
}

/// Whether a resource is managed or a data source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModeSpec {
    /// A managed resource.
    #[default]
    Managed,
    /// A data source.
    Data,
}

/// A resource or data source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResourceSpec {
    /// Resource type, e.g. `test_resource`.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Resource name.
    pub name: String,
    /// Managed or data.
    #[serde(default)]
    pub mode: ModeSpec,
    /// Provider configuration, `type` or `type.alias`. Implied from the
    /// resource type when absent.
    #[serde(default)]
    pub provider: Option<String>,
    /// Number of instances: a number or an expression.
    #[serde(default)]
    pub count: Option<serde_yaml::Value>,
    /// Resource arguments. Strings may use `${ }` interpolation.
    #[serde(default)]
    pub config: serde_yaml::Value,
    /// Explicit dependencies, as addresses.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Lifecycle settings.
    #[serde(default)]
    pub lifecycle: LifecycleSpec,
}

/// Resource lifecycle settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LifecycleSpec {
    /// Create the replacement before destroying the old object.
    #[serde(default)]
    pub create_before_destroy: bool,
    /// Refuse to plan a destroy.
    #[serde(default)]
    pub prevent_destroy: bool,
    /// Actions fired around this resource's changes.
    #[serde(default)]
    pub action_triggers: Vec<ActionTriggerSpec>,
}

/// One `action_triggers` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ActionTriggerSpec {
    /// Lifecycle events, e.g. `after_create`.
    pub events: Vec<String>,
    /// Action addresses, e.g. `action.test_unlinked.notify`.
    pub actions: Vec<String>,
    /// Optional expression that must be true for the trigger to fire.
    #[serde(default)]
    pub condition: Option<String>,
}

/// An output value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct OutputSpec {
    /// Output name.
    pub name: String,
    /// Value. Strings are expressions.
    pub value: serde_yaml::Value,
    /// Whether the value is hidden in output.
    #[serde(default)]
    pub sensitive: bool,
    /// Human description.
    #[serde(default)]
    pub description: Option<String>,
}

/// A check block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CheckSpec {
    /// Check name.
    pub name: String,
    /// Assertions.
    #[serde(rename = "assert")]
    pub asserts: Vec<RuleSpec>,
}

/// An action declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ActionSpec {
    /// Action type, e.g. `test_unlinked`.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Action name.
    pub name: String,
    /// Provider configuration, implied from the type when absent.
    #[serde(default)]
    pub provider: Option<String>,
    /// Action arguments. Strings may use `${ }` interpolation.
    #[serde(default)]
    pub config: serde_yaml::Value,
}

/// An inline child module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModuleSpec {
    /// Module call name.
    pub name: String,
    /// Values for the child's variables. Strings are expressions evaluated
    /// in the calling module.
    #[serde(default)]
    pub inputs: BTreeMap<String, serde_yaml::Value>,
    /// The child module's own configuration.
    #[serde(default)]
    pub config: InfraConfig,
}

/// An import block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ImportSpec {
    /// Target resource instance address.
    pub to: String,
    /// Provider-specific id of the existing object.
    pub id: String,
}

/// A removed block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RemovedSpec {
    /// Resource address that was removed from configuration.
    pub from: String,
    /// Destroy the remote objects (`true`) or only forget them.
    #[serde(default = "default_true")]
    pub destroy: bool,
}

const fn default_true() -> bool {
    true
}

impl InfraConfig {
    /// Returns true if nothing at all is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
            && self.variables.is_empty()
            && self.locals.is_empty()
            && self.resources.is_empty()
            && self.outputs.is_empty()
            && self.checks.is_empty()
            && self.actions.is_empty()
            && self.modules.is_empty()
    }

    /// Resource names, as `type.name` or `data.type.name`.
    #[must_use]
    pub fn resource_names(&self) -> Vec<String> {
        self.resources.iter().map(ResourceSpec::display_name).collect()
    }
}

impl ResourceSpec {
    /// Module-local display name.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.mode {
            ModeSpec::Managed => format!("{}.{}", self.type_name, self.name),
            ModeSpec::Data => format!("data.{}.{}", self.type_name, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let yaml = r"
variables:
  - name: v
resources:
  - type: test_resource
    name: a
";
        let config: InfraConfig = serde_yaml::from_str(yaml).expect("parse");
        assert!(config.variables[0].nullable);
        assert!(config.variables[0].default.is_none());
        assert_eq!(config.resources[0].mode, ModeSpec::Managed);
        assert!(!config.resources[0].lifecycle.create_before_destroy);
        assert_eq!(config.resource_names(), vec![String::from("test_resource.a")]);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r"
resources:
  - type: test_resource
    name: a
    colour: blue
";
        assert!(serde_yaml::from_str::<InfraConfig>(yaml).is_err());
    }
}
