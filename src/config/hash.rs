//! Configuration hashing for change detection.
//!
//! This module provides deterministic hashing of configuration structures.
//! The fingerprint is recorded in every plan and re-checked before apply, so
//! a saved plan cannot be applied against a different configuration.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::spec::{InfraConfig, ModuleSpec, ResourceSpec};

/// Hasher for computing configuration hashes.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new configuration hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes a hash of the entire configuration.
    ///
    /// Resources and modules are hashed in name order, so reordering them in
    /// the file does not change the fingerprint.
    #[must_use]
    pub fn hash_config(&self, config: &InfraConfig) -> String {
        let mut hasher = Sha256::new();
        self.update_config(&mut hasher, config);
        hex::encode(hasher.finalize())
    }

    fn update_config(&self, hasher: &mut Sha256, config: &InfraConfig) {
        update_section(hasher, "providers", &config.providers);
        update_section(hasher, "variables", &config.variables);
        update_section(hasher, "locals", &config.locals);

        let mut resources: Vec<_> = config.resources.iter().collect();
        resources.sort_by_key(|r| r.display_name());
        for resource in resources {
            hasher.update(self.hash_resource(resource).as_bytes());
        }

        update_section(hasher, "outputs", &config.outputs);
        update_section(hasher, "checks", &config.checks);
        update_section(hasher, "actions", &config.actions);
        update_section(hasher, "imports", &config.imports);
        update_section(hasher, "removed", &config.removed);

        let mut modules: Vec<&ModuleSpec> = config.modules.iter().collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        for module in modules {
            hasher.update(b"module:");
            hasher.update(module.name.as_bytes());
            update_section(hasher, "inputs", &module.inputs);
            self.update_config(hasher, &module.config);
        }
    }

    /// Computes a hash for a single resource declaration.
    #[must_use]
    pub fn hash_resource(&self, resource: &ResourceSpec) -> String {
        let mut hasher = Sha256::new();
        hasher.update(resource.display_name().as_bytes());
        update_section(&mut hasher, "resource", resource);
        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        // Constant-time comparison.
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

fn update_section<T: Serialize + ?Sized>(hasher: &mut Sha256, label: &str, section: &T) {
    hasher.update(label.as_bytes());
    hasher.update(b":");
    hasher.update(serde_yaml::to_string(section).unwrap_or_default().as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::spec::{LifecycleSpec, ModeSpec};

    fn create_test_resource(name: &str) -> ResourceSpec {
        ResourceSpec {
            type_name: String::from("test_resource"),
            name: name.to_string(),
            mode: ModeSpec::Managed,
            provider: None,
            count: None,
            config: serde_yaml::Value::Null,
            depends_on: vec![],
            lifecycle: LifecycleSpec::default(),
        }
    }

    #[test]
    fn test_resource_hash_deterministic() {
        let hasher = ConfigHasher::new();
        let resource = create_test_resource("a");

        assert_eq!(hasher.hash_resource(&resource), hasher.hash_resource(&resource));
    }

    #[test]
    fn test_different_resources_different_hash() {
        let hasher = ConfigHasher::new();
        let hash1 = hasher.hash_resource(&create_test_resource("a"));
        let hash2 = hasher.hash_resource(&create_test_resource("b"));

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_resource_order_does_not_matter() {
        let hasher = ConfigHasher::new();
        let forward = InfraConfig {
            resources: vec![create_test_resource("a"), create_test_resource("b")],
            ..InfraConfig::default()
        };
        let backward = InfraConfig {
            resources: vec![create_test_resource("b"), create_test_resource("a")],
            ..InfraConfig::default()
        };
        assert_eq!(hasher.hash_config(&forward), hasher.hash_config(&backward));
    }

    #[test]
    fn test_short_hash() {
        let hasher = ConfigHasher::new();
        let short = hasher.short_hash("abcdef1234567890abcdef1234567890");

        assert_eq!(short, "abcdef12");
    }

    #[test]
    fn test_hashes_match() {
        assert!(ConfigHasher::hashes_match("abc123", "abc123"));
        assert!(!ConfigHasher::hashes_match("abc123", "abc124"));
        assert!(!ConfigHasher::hashes_match("abc123", "abc12"));
    }
}
