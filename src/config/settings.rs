//! Engine settings and input variables.
//!
//! Settings start from defaults and are overridden from `PLANGRAPH_*`
//! environment variables. Input variables come from `PLANGRAPH_VAR_<name>`
//! environment variables and `--var name=value` arguments, the latter
//! taking precedence.

use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::lang::Value;

use super::model::yaml_to_value;

/// Prefix of environment variables that supply input variables.
pub const VAR_ENV_PREFIX: &str = "PLANGRAPH_VAR_";

/// Default state file name.
pub const DEFAULT_STATE_FILE: &str = "plangraph.state.json";

/// Tunables of the planning engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Maximum number of nodes executing at once.
    pub parallelism: usize,
    /// Whether changes that cannot be planned yet may be deferred instead of
    /// failing the plan.
    pub allow_deferral: bool,
    /// Whether consumers of a validated variable wait for its validation.
    pub validation_gating: bool,
    /// Path of the local state file.
    pub state_path: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            parallelism: 10,
            allow_deferral: false,
            validation_gating: false,
            state_path: PathBuf::from(DEFAULT_STATE_FILE),
        }
    }
}

impl EngineSettings {
    /// Defaults overridden from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env_overrides(|name| std::env::var(name).ok());
        settings
    }

    /// Applies `PLANGRAPH_*` overrides read through `lookup`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("PLANGRAPH_PARALLELISM") {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => {
                    debug!("Overriding parallelism from env: {n}");
                    self.parallelism = n;
                }
                _ => warn!("Ignoring invalid PLANGRAPH_PARALLELISM: {raw}"),
            }
        }

        if let Some(raw) = lookup("PLANGRAPH_ALLOW_DEFERRAL") {
            match parse_flag(&raw) {
                Some(flag) => self.allow_deferral = flag,
                None => warn!("Ignoring invalid PLANGRAPH_ALLOW_DEFERRAL: {raw}"),
            }
        }

        if let Some(raw) = lookup("PLANGRAPH_VALIDATION_GATING") {
            match parse_flag(&raw) {
                Some(flag) => self.validation_gating = flag,
                None => warn!("Ignoring invalid PLANGRAPH_VALIDATION_GATING: {raw}"),
            }
        }

        if let Some(path) = lookup("PLANGRAPH_STATE_PATH")
            && !path.is_empty()
        {
            debug!("Overriding state path from env: {path}");
            self.state_path = PathBuf::from(path);
        }
    }

    /// Sets the parallelism.
    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Allows or forbids deferral.
    #[must_use]
    pub const fn with_deferral(mut self, allow: bool) -> Self {
        self.allow_deferral = allow;
        self
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parses a `name=value` argument.
///
/// The value is read as a YAML scalar or collection, so `3` is a number,
/// `true` a bool and `[a, b]` a list; anything else is a string.
///
/// # Errors
///
/// Returns an error when there is no `=` or the name is empty.
pub fn parse_var_arg(arg: &str) -> Result<(String, Value), ConfigError> {
    let Some((name, raw)) = arg.split_once('=') else {
        return Err(ConfigError::validation(
            format!("expected name=value, got {arg:?}"),
            "--var",
        ));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(ConfigError::validation("variable name cannot be empty", "--var"));
    }
    Ok((name.to_string(), parse_raw_value(raw)))
}

fn parse_raw_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }
    serde_yaml::from_str::<serde_yaml::Value>(raw)
        .map_or_else(|_| Value::String(raw.to_string()), |yaml| yaml_to_value(&yaml))
}

/// Collects root input variables from environment pairs and `--var`
/// arguments.
///
/// # Errors
///
/// Returns an error for a malformed `--var` argument.
pub fn input_variables<I>(env: I, args: &[String]) -> Result<BTreeMap<String, Value>, ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut values = BTreeMap::new();
    for (key, raw) in env {
        if let Some(name) = key.strip_prefix(VAR_ENV_PREFIX)
            && !name.is_empty()
        {
            debug!("Input variable {name} set from environment");
            values.insert(name.to_string(), parse_raw_value(&raw));
        }
    }
    for arg in args {
        let (name, value) = parse_var_arg(arg)?;
        values.insert(name, value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::default();
        assert_eq!(settings.parallelism, 10);
        assert!(!settings.allow_deferral);
        assert!(!settings.validation_gating);
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = EngineSettings::default();
        settings.apply_env_overrides(|name| match name {
            "PLANGRAPH_PARALLELISM" => Some(String::from("3")),
            "PLANGRAPH_ALLOW_DEFERRAL" => Some(String::from("yes")),
            "PLANGRAPH_VALIDATION_GATING" => Some(String::from("maybe")),
            "PLANGRAPH_STATE_PATH" => Some(String::from("/tmp/s.json")),
            _ => None,
        });
        assert_eq!(settings.parallelism, 3);
        assert!(settings.allow_deferral);
        assert!(!settings.validation_gating);
        assert_eq!(settings.state_path, PathBuf::from("/tmp/s.json"));
    }

    #[test]
    fn test_zero_parallelism_ignored() {
        let mut settings = EngineSettings::default();
        settings.apply_env_overrides(|name| (name == "PLANGRAPH_PARALLELISM").then(|| String::from("0")));
        assert_eq!(settings.parallelism, 10);
    }

    #[test]
    fn test_parse_var_arg() {
        assert_eq!(parse_var_arg("v=5").expect("ok"), (String::from("v"), Value::Number(5.0)));
        assert_eq!(
            parse_var_arg("name=hello world").expect("ok"),
            (String::from("name"), Value::string("hello world"))
        );
        assert_eq!(parse_var_arg("e=").expect("ok").1, Value::string(""));
        assert!(parse_var_arg("novalue").is_err());
        assert!(parse_var_arg("=1").is_err());
    }

    #[test]
    fn test_args_override_environment() {
        let env = vec![
            (String::from("PLANGRAPH_VAR_region"), String::from("eu")),
            (String::from("PLANGRAPH_VAR_size"), String::from("2")),
            (String::from("HOME"), String::from("/root")),
        ];
        let values = input_variables(env, &[String::from("region=us")]).expect("ok");
        assert_eq!(values.len(), 2);
        assert_eq!(values["region"], Value::string("us"));
        assert_eq!(values["size"], Value::Number(2.0));
    }
}
