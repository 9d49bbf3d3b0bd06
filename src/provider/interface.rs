//! The provider interface and registry.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::diagnostics::Diagnostics;
use crate::error::ProviderError;
use crate::lang::{AttributePath, Value};
use crate::plans::DeferredReason;

use super::schema::ProviderSchema;

/// Request to refresh a managed object.
#[derive(Debug, Clone)]
pub struct ReadResourceRequest {
    /// Resource type.
    pub type_name: String,
    /// Object as last recorded.
    pub prior: Value,
    /// Provider-private data stored with the object.
    pub private: Vec<u8>,
}

/// Refreshed object.
#[derive(Debug, Clone, Default)]
pub struct ReadResourceResponse {
    /// Current remote object, or null when it no longer exists.
    pub new_state: Value,
    /// Updated private data.
    pub private: Vec<u8>,
    /// Problems reported by the provider.
    pub diagnostics: Diagnostics,
}

/// Request to plan a change to a managed object.
#[derive(Debug, Clone)]
pub struct PlanResourceChangeRequest {
    /// Resource type.
    pub type_name: String,
    /// Current object, null when creating.
    pub prior: Value,
    /// Proposed new object, null when destroying.
    pub proposed: Value,
    /// Evaluated configuration, null when destroying.
    pub config: Value,
    /// Private data stored with the prior object.
    pub prior_private: Vec<u8>,
}

/// Planned new object.
#[derive(Debug, Clone, Default)]
pub struct PlanResourceChangeResponse {
    /// Planned new object, possibly with unknown attributes.
    pub planned: Value,
    /// Attribute paths whose change cannot be made in place.
    pub requires_replace: Vec<AttributePath>,
    /// Private data to thread through to apply.
    pub private: Vec<u8>,
    /// Set when the provider cannot plan this object yet.
    pub deferred: Option<DeferredReason>,
    /// Problems reported by the provider.
    pub diagnostics: Diagnostics,
}

/// Request to carry out a planned change.
#[derive(Debug, Clone)]
pub struct ApplyResourceChangeRequest {
    /// Resource type.
    pub type_name: String,
    /// Current object, null when creating.
    pub prior: Value,
    /// Planned new object, null when destroying.
    pub planned: Value,
    /// Evaluated configuration.
    pub config: Value,
    /// Private data returned by planning.
    pub private: Vec<u8>,
}

/// Result of applying a change.
#[derive(Debug, Clone, Default)]
pub struct ApplyResourceChangeResponse {
    /// New object, fully known; null after a destroy.
    pub new_state: Value,
    /// Private data to store with the object.
    pub private: Vec<u8>,
    /// Problems reported by the provider.
    pub diagnostics: Diagnostics,
}

/// An object found by an import.
#[derive(Debug, Clone)]
pub struct ImportedResource {
    /// Resource type.
    pub type_name: String,
    /// The imported object.
    pub state: Value,
    /// Private data to store with the object.
    pub private: Vec<u8>,
}

/// Result of an import.
#[derive(Debug, Clone, Default)]
pub struct ImportResourceResponse {
    /// Objects found for the import id.
    pub imported: Vec<ImportedResource>,
    /// Problems reported by the provider.
    pub diagnostics: Diagnostics,
}

/// Result of reading a data source.
#[derive(Debug, Clone, Default)]
pub struct ReadDataSourceResponse {
    /// The data read.
    pub state: Value,
    /// Problems reported by the provider.
    pub diagnostics: Diagnostics,
}

/// A provider: the plugin that manages objects of its resource types.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the provider's schema.
    ///
    /// # Errors
    ///
    /// Returns an error when the provider's schema cannot be converted.
    fn schema(&self) -> Result<ProviderSchema, ProviderError>;

    /// Configures the provider.
    async fn configure(&self, config: &Value) -> Diagnostics;

    /// Refreshes a managed object.
    async fn read_resource(&self, request: ReadResourceRequest) -> ReadResourceResponse;

    /// Plans a change to a managed object.
    async fn plan_resource_change(&self, request: PlanResourceChangeRequest) -> PlanResourceChangeResponse;

    /// Applies a planned change.
    async fn apply_resource_change(&self, request: ApplyResourceChangeRequest) -> ApplyResourceChangeResponse;

    /// Looks up existing objects by import id.
    async fn import_resource_state(&self, type_name: &str, id: &str) -> ImportResourceResponse;

    /// Reads a data source.
    async fn read_data_source(&self, type_name: &str, config: &Value) -> ReadDataSourceResponse;

    /// Calls a provider-defined function. Functions are pure.
    ///
    /// # Errors
    ///
    /// Returns an error message for unknown functions or bad arguments.
    fn call_function(&self, name: &str, args: &[Value]) -> Result<Value, String>;

    /// Invokes an action.
    async fn invoke_action(&self, type_name: &str, config: &Value) -> Diagnostics;
}

/// Providers by provider type name, with their schemas.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, (Arc<dyn Provider>, Arc<ProviderSchema>)>,
}

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider under `name`, loading its schema.
    ///
    /// # Errors
    ///
    /// Returns an error when the provider's schema cannot be loaded.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Result<(), ProviderError> {
        let schema = provider.schema()?;
        self.providers.insert(name.into(), (provider, Arc::new(schema)));
        Ok(())
    }

    /// Returns the provider registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error when no such provider is registered.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .get(name)
            .map(|(p, _)| Arc::clone(p))
            .ok_or_else(|| ProviderError::UnknownProvider { name: name.to_string() })
    }

    /// Returns the schema of the provider registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error when no such provider is registered.
    pub fn schema(&self, name: &str) -> Result<Arc<ProviderSchema>, ProviderError> {
        self.providers
            .get(name)
            .map(|(_, s)| Arc::clone(s))
            .ok_or_else(|| ProviderError::UnknownProvider { name: name.to_string() })
    }

    /// Returns true if a provider is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered provider names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
