//! Static validation of configuration files.
//!
//! This module checks a raw configuration before it is lowered: names,
//! duplicates, expression syntax and type hints. Errors stop the run;
//! warnings are reported and planning continues.

use crate::error::{ConfigError, PlanGraphError, Result};
use crate::lang::{parse_expression, parse_template};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{InfraConfig, RuleSpec, VariableSpec};

/// Validator for infrastructure configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Accepted variable type hints.
    known_type_hints: HashSet<String>,
}

/// Type hints accepted on variables.
const KNOWN_TYPE_HINTS: &[&str] = &["any", "bool", "list", "map", "number", "string"];

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator with the default type hints.
    #[must_use]
    pub fn new() -> Self {
        Self {
            known_type_hints: KNOWN_TYPE_HINTS.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// Validates a configuration and returns every problem found.
    #[must_use]
    pub fn check(&self, config: &InfraConfig) -> ValidationResult {
        let mut result = ValidationResult::default();
        if config.is_empty() {
            result.warnings.push(String::from("Configuration declares nothing"));
        }
        self.validate_module(config, "", &mut result);
        result
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any was found.
    pub fn validate(&self, config: &InfraConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if let Some(first_error) = result.errors.first() {
            return Err(PlanGraphError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }));
        }
        debug!("Configuration validation passed with {} warnings", result.warnings.len());
        Ok(result)
    }

    fn validate_module(&self, config: &InfraConfig, prefix: &str, result: &mut ValidationResult) {
        self.validate_variables(&config.variables, prefix, result);
        Self::validate_locals(config, prefix, result);
        Self::validate_resources(config, prefix, result);
        Self::validate_outputs(config, prefix, result);
        Self::validate_checks(config, prefix, result);
        Self::validate_actions(config, prefix, result);

        let mut seen = HashSet::new();
        for (i, module) in config.modules.iter().enumerate() {
            let field = format!("{prefix}modules[{i}]");
            check_name(&module.name, &format!("{field}.name"), "Module", result);
            if !seen.insert(module.name.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("{field}.name"),
                    message: format!("Duplicate module name: {}", module.name),
                });
            }
            for (name, value) in &module.inputs {
                check_yaml_expression(value, &format!("{field}.inputs.{name}"), result);
            }
            self.validate_module(&module.config, &format!("{field}.config."), result);
        }
    }

    /// Validates variable declarations.
    fn validate_variables(&self, variables: &[VariableSpec], prefix: &str, result: &mut ValidationResult) {
        let mut seen = HashSet::new();
        for (i, variable) in variables.iter().enumerate() {
            let field = format!("{prefix}variables[{i}]");
            check_name(&variable.name, &format!("{field}.name"), "Variable", result);
            if !seen.insert(variable.name.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("{field}.name"),
                    message: format!("Duplicate variable name: {}", variable.name),
                });
            }

            if let Some(hint) = &variable.type_hint
                && !self.known_type_hints.contains(hint)
            {
                result.errors.push(ValidationError {
                    field: format!("{field}.type"),
                    message: format!("Unknown type '{hint}'. Expected one of: {}", KNOWN_TYPE_HINTS.join(", ")),
                });
            }

            if !variable.nullable && matches!(variable.default, Some(serde_yaml::Value::Null)) {
                result.errors.push(ValidationError {
                    field: format!("{field}.default"),
                    message: format!("Variable '{}' is not nullable but defaults to null", variable.name),
                });
            }

            for (j, rule) in variable.validation.iter().enumerate() {
                check_rule(rule, &format!("{field}.validation[{j}]"), result);
            }
        }
    }

    fn validate_locals(config: &InfraConfig, prefix: &str, result: &mut ValidationResult) {
        for (name, value) in &config.locals {
            let field = format!("{prefix}locals.{name}");
            check_name(name, &field, "Local", result);
            check_yaml_expression(value, &field, result);
        }
    }

    /// Validates resource declarations.
    fn validate_resources(config: &InfraConfig, prefix: &str, result: &mut ValidationResult) {
        let mut seen = HashSet::new();
        for (i, resource) in config.resources.iter().enumerate() {
            let field = format!("{prefix}resources[{i}]");
            check_name(&resource.name, &format!("{field}.name"), "Resource", result);
            check_name(&resource.type_name, &format!("{field}.type"), "Resource type", result);
            if !resource.type_name.contains('_') && resource.provider.is_none() {
                result.warnings.push(format!(
                    "{field}.type: '{}' has no provider prefix; the whole type name is used as the provider",
                    resource.type_name
                ));
            }
            if !seen.insert(resource.display_name()) {
                result.errors.push(ValidationError {
                    field: format!("{field}.name"),
                    message: format!("Duplicate resource: {}", resource.display_name()),
                });
            }
            if let Some(count) = &resource.count {
                check_yaml_expression(count, &format!("{field}.count"), result);
            }
            check_yaml_templates(&resource.config, &format!("{field}.config"), result);
            if resource.lifecycle.prevent_destroy && resource.lifecycle.create_before_destroy {
                result.warnings.push(format!(
                    "{field}.lifecycle: prevent_destroy blocks the replacement that create_before_destroy orders"
                ));
            }
            for (j, trigger) in resource.lifecycle.action_triggers.iter().enumerate() {
                let trigger_field = format!("{field}.lifecycle.action_triggers[{j}]");
                if trigger.events.is_empty() {
                    result.errors.push(ValidationError {
                        field: format!("{trigger_field}.events"),
                        message: String::from("An action trigger needs at least one event"),
                    });
                }
                if trigger.actions.is_empty() {
                    result.errors.push(ValidationError {
                        field: format!("{trigger_field}.actions"),
                        message: String::from("An action trigger needs at least one action"),
                    });
                }
                if let Some(condition) = &trigger.condition {
                    check_expression(condition, &format!("{trigger_field}.condition"), result);
                }
            }
        }
    }

    fn validate_outputs(config: &InfraConfig, prefix: &str, result: &mut ValidationResult) {
        let mut seen = HashSet::new();
        for (i, output) in config.outputs.iter().enumerate() {
            let field = format!("{prefix}outputs[{i}]");
            check_name(&output.name, &format!("{field}.name"), "Output", result);
            if !seen.insert(output.name.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("{field}.name"),
                    message: format!("Duplicate output name: {}", output.name),
                });
            }
            check_yaml_expression(&output.value, &format!("{field}.value"), result);
        }
    }

    fn validate_checks(config: &InfraConfig, prefix: &str, result: &mut ValidationResult) {
        let mut seen = HashSet::new();
        for (i, check) in config.checks.iter().enumerate() {
            let field = format!("{prefix}checks[{i}]");
            check_name(&check.name, &format!("{field}.name"), "Check", result);
            if !seen.insert(check.name.as_str()) {
                result.errors.push(ValidationError {
                    field: format!("{field}.name"),
                    message: format!("Duplicate check name: {}", check.name),
                });
            }
            if check.asserts.is_empty() {
                result.warnings.push(format!("{field}: Check '{}' has no assertions", check.name));
            }
            for (j, rule) in check.asserts.iter().enumerate() {
                check_rule(rule, &format!("{field}.assert[{j}]"), result);
            }
        }
    }

    /// Validates action declarations and warns about actions nothing triggers.
    fn validate_actions(config: &InfraConfig, prefix: &str, result: &mut ValidationResult) {
        let triggered: HashSet<&str> = config
            .resources
            .iter()
            .flat_map(|r| r.lifecycle.action_triggers.iter())
            .flat_map(|t| t.actions.iter().map(String::as_str))
            .collect();

        let mut seen = HashSet::new();
        for (i, action) in config.actions.iter().enumerate() {
            let field = format!("{prefix}actions[{i}]");
            check_name(&action.name, &format!("{field}.name"), "Action", result);
            let address = format!("action.{}.{}", action.type_name, action.name);
            if !seen.insert(address.clone()) {
                result.errors.push(ValidationError {
                    field: format!("{field}.name"),
                    message: format!("Duplicate action: {address}"),
                });
            }
            check_yaml_templates(&action.config, &format!("{field}.config"), result);
            if !triggered.contains(address.as_str()) {
                result.warnings.push(format!("{field}: {address} is never triggered"));
            }
        }
    }
}

/// Validates that a name is an identifier: a letter or underscore followed
/// by letters, digits, underscores or hyphens.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphabetic() && first != '_' {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn check_name(name: &str, field: &str, kind: &str, result: &mut ValidationResult) {
    if name.is_empty() {
        result.errors.push(ValidationError {
            field: field.to_string(),
            message: format!("{kind} name cannot be empty"),
        });
    } else if !is_valid_name(name) {
        result.errors.push(ValidationError {
            field: field.to_string(),
            message: format!("{kind} name '{name}' is invalid. Must start with a letter or underscore."),
        });
    }
}

fn check_rule(rule: &RuleSpec, field: &str, result: &mut ValidationResult) {
    check_expression(&rule.condition, &format!("{field}.condition"), result);
    if let Err(e) = parse_template(&rule.error_message) {
        result.errors.push(ValidationError {
            field: format!("{field}.error_message"),
            message: e.to_string(),
        });
    }
}

fn check_expression(source: &str, field: &str, result: &mut ValidationResult) {
    if let Err(e) = parse_expression(source) {
        result.errors.push(ValidationError {
            field: field.to_string(),
            message: e.to_string(),
        });
    }
}

/// Checks a YAML value whose strings are expressions.
fn check_yaml_expression(value: &serde_yaml::Value, field: &str, result: &mut ValidationResult) {
    walk_strings(value, field, &mut |text, path| check_expression(text, path, result));
}

/// Checks a YAML value whose strings are templates.
fn check_yaml_templates(value: &serde_yaml::Value, field: &str, result: &mut ValidationResult) {
    walk_strings(value, field, &mut |text, path| {
        if let Err(e) = parse_template(text) {
            result.errors.push(ValidationError {
                field: path.to_string(),
                message: e.to_string(),
            });
        }
    });
}

fn walk_strings(value: &serde_yaml::Value, field: &str, visit: &mut dyn FnMut(&str, &str)) {
    match value {
        serde_yaml::Value::String(text) => visit(text, field),
        serde_yaml::Value::Sequence(items) => {
            for (i, item) in items.iter().enumerate() {
                walk_strings(item, &format!("{field}[{i}]"), visit);
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (key, item) in map {
                let key = key.as_str().map_or_else(|| format!("{key:?}"), String::from);
                walk_strings(item, &format!("{field}.{key}"), visit);
            }
        }
        serde_yaml::Value::Tagged(tagged) => walk_strings(&tagged.value, field, visit),
        serde_yaml::Value::Null | serde_yaml::Value::Bool(_) | serde_yaml::Value::Number(_) => {}
    }
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> InfraConfig {
        serde_yaml::from_str(yaml).expect("parse")
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("web"));
        assert!(is_valid_name("test_resource"));
        assert!(is_valid_name("_private"));
        assert!(is_valid_name("my-name-2"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("2web"));
        assert!(!is_valid_name("web.app"));
        assert!(!is_valid_name("-web"));
    }

    #[test]
    fn test_duplicates_and_syntax_errors() {
        let config = parse(
            r#"
variables:
  - name: v
    type: strng
    validation:
      - condition: "var.v >"
        error_message: "bad"
resources:
  - type: test_resource
    name: a
  - type: test_resource
    name: a
"#,
        );
        let result = ConfigValidator::new().check(&config);
        let fields: Vec<_> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"variables[0].type"));
        assert!(fields.contains(&"variables[0].validation[0].condition"));
        assert!(fields.contains(&"resources[1].name"));
        assert!(ConfigValidator::new().validate(&config).is_err());
    }

    #[test]
    fn test_untriggered_action_warns() {
        let config = parse(
            r"
actions:
  - type: test_unlinked
    name: notify
",
        );
        let result = ConfigValidator::new().validate(&config).expect("valid");
        assert_eq!(result.warning_count(), 1);
        assert!(result.warnings[0].contains("never triggered"));
    }

    #[test]
    fn test_nested_module_fields_are_prefixed() {
        let config = parse(
            r"
modules:
  - name: child
    config:
      outputs:
        - name: bad output
          value: 1
",
        );
        let result = ConfigValidator::new().check(&config);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors[0].field, "modules[0].config.outputs[0].name");
    }
}
