//! Configuration parser for loading configuration files.
//!
//! This module handles loading configuration from YAML files, lowering it
//! into the typed [`Config`], and loading `.env` files.

use crate::error::{ConfigError, PlanGraphError, Result};
use std::path::Path;
use tracing::{debug, info};

use super::hash::ConfigHasher;
use super::model::Config;
use super::spec::InfraConfig;

/// Configuration parser for loading infrastructure configuration.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<std::path::PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads the raw configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<InfraConfig> {
        let path = path.as_ref();
        let path = self
            .base_path
            .as_ref()
            .filter(|_| path.is_relative())
            .map_or_else(|| path.to_path_buf(), |base| base.join(path));
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(PlanGraphError::Config(ConfigError::FileNotFound { path }));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            PlanGraphError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        Self::parse_yaml(&content, Some(&path))
    }

    /// Parses the raw configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(content: &str, source: Option<&Path>) -> Result<InfraConfig> {
        debug!("Parsing YAML configuration");

        let config: InfraConfig = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            PlanGraphError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed configuration with {} resources and {} modules",
            config.resources.len(),
            config.modules.len()
        );
        Ok(config)
    }

    /// Loads a file and lowers it into a typed configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or lowered.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Config> {
        let spec = self.load_file(path)?;
        Self::lower(&spec)
    }

    /// Lowers a raw configuration, recording its fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error for duplicate names, malformed addresses and
    /// expression syntax errors.
    pub fn lower(spec: &InfraConfig) -> Result<Config> {
        let fingerprint = ConfigHasher::new().hash_config(spec);
        let config = Config::from_spec(spec, fingerprint)?;
        debug!("Configuration fingerprint: {}", config.fingerprint);
        Ok(config)
    }

    /// Parses and lowers a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or cannot be lowered.
    pub fn parse_str(content: &str) -> Result<Config> {
        let spec = Self::parse_yaml(content, None)?;
        Self::lower(&spec)
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| std::path::PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                PlanGraphError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Default configuration file names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["plangraph.yaml", "plangraph.yml"];

/// Finds the configuration file in the current directory or parent directories.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<std::path::PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(PlanGraphError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}
