//! Configuration module for the plangraph engine.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `plangraph.yaml`
//! - Lowering it into the typed [`Config`] the graph is built from
//! - Validation of configuration values
//! - Computing configuration fingerprints for change detection
//! - Engine settings and input variables

mod hash;
mod model;
mod parser;
mod settings;
mod spec;
mod validator;

pub use hash::ConfigHasher;
pub use model::{
    ActionConfig, ActionTriggerConfig, Check, Config, Import, Lifecycle, Local, Module, ModuleCall, Output,
    ProviderConfig, Removed, Resource, Rule, Variable, yaml_to_value,
};
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use settings::{DEFAULT_STATE_FILE, EngineSettings, VAR_ENV_PREFIX, input_variables, parse_var_arg};
pub use spec::{
    ActionSpec, ActionTriggerSpec, CheckSpec, ImportSpec, InfraConfig, LifecycleSpec, ModeSpec, ModuleSpec,
    OutputSpec, ProviderSpec, RemovedSpec, ResourceSpec, RuleSpec, VariableSpec,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
