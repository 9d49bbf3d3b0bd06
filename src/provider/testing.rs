//! An in-memory provider.
//!
//! `TestProvider` keeps its "remote" objects in a [`ResourceStore`] that
//! can be shared between provider instances, so a plan made with one
//! instance can be applied with another and tests can inspect or tamper
//! with the remote side directly.
//!
//! Supported types:
//! - `test_resource`: `id` (computed), `value`, `secret` (sensitive),
//!   `write_only`, `immutable` (changing it forces replacement), `defer`
//!   (asks for deferral), `destroy_fail`, `create_wait_seconds`,
//!   `destroy_wait_seconds`
//! - `test_data_source`: looked up by `id`
//! - function `is_true`
//! - actions `test_unlinked`, `test_lifecycle` and `test_linked`

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::ProviderError;
use crate::lang::{AttributePath, Value};
use crate::plans::DeferredReason;

use super::convert::{WireProviderSchema, provider_schema_from_wire};
use super::interface::{
    ApplyResourceChangeRequest, ApplyResourceChangeResponse, ImportResourceResponse, ImportedResource,
    PlanResourceChangeRequest, PlanResourceChangeResponse, Provider, ReadDataSourceResponse, ReadResourceRequest,
    ReadResourceResponse,
};
use super::schema::ProviderSchema;

/// Remote objects managed by test providers, keyed by prefixed id.
#[derive(Debug, Default)]
pub struct ResourceStore {
    data: RwLock<BTreeMap<String, Value>>,
}

impl ResourceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the object stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    /// Stores an object.
    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.data.write().insert(key.into(), value);
    }

    /// Removes an object, returning it.
    pub fn delete(&self, key: &str) -> Option<Value> {
        self.data.write().remove(key)
    }

    /// Number of stored objects whose key starts with `prefix`.
    #[must_use]
    pub fn count(&self, prefix: &str) -> usize {
        self.data.read().keys().filter(|k| k.starts_with(prefix)).count()
    }

    /// Stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    /// Every stored object as one JSON object keyed by store key.
    #[must_use]
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.data
                .read()
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        )
    }

    /// Rebuilds a store from a [`snapshot`](Self::snapshot).
    ///
    /// Anything other than a JSON object yields an empty store.
    #[must_use]
    pub fn from_snapshot(snapshot: &serde_json::Value) -> Self {
        let data = snapshot
            .as_object()
            .map(|objects| {
                objects
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::from_json(value)))
                    .collect()
            })
            .unwrap_or_default();
        Self { data: RwLock::new(data) }
    }
}

/// One action invocation observed by the test provider.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokedAction {
    /// Action type.
    pub type_name: String,
    /// Evaluated action configuration.
    pub config: Value,
}

/// The in-memory provider.
#[derive(Debug, Default)]
pub struct TestProvider {
    store: Arc<ResourceStore>,
    resource_prefix: RwLock<Option<String>>,
    data_prefix: RwLock<Option<String>>,
    invocations: Mutex<Vec<InvokedAction>>,
}

impl TestProvider {
    /// Creates a provider with its own empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider backed by a shared store.
    #[must_use]
    pub fn with_store(store: Arc<ResourceStore>) -> Self {
        Self {
            store,
            ..Self::default()
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> Arc<ResourceStore> {
        Arc::clone(&self.store)
    }

    /// Store key of a managed object.
    #[must_use]
    pub fn resource_key(&self, id: &str) -> String {
        match self.resource_prefix.read().as_deref() {
            Some(prefix) => format!("{prefix}/{id}"),
            None => id.to_string(),
        }
    }

    /// Store key of a data object.
    #[must_use]
    pub fn data_key(&self, id: &str) -> String {
        match self.data_prefix.read().as_deref() {
            Some(prefix) => format!("{prefix}/{id}"),
            None => format!("data/{id}"),
        }
    }

    /// Actions invoked so far, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<InvokedAction> {
        self.invocations.lock().clone()
    }

    fn wire_schema() -> Result<WireProviderSchema, serde_json::Error> {
        serde_json::from_value(serde_json::json!({
            "provider": {
                "block": {
                    "attributes": [
                        { "name": "resource_prefix", "type": "string", "optional": true },
                        { "name": "data_prefix", "type": "string", "optional": true }
                    ]
                }
            },
            "resource_schemas": {
                "test_resource": {
                    "block": {
                        "attributes": [
                            { "name": "id", "type": "string", "optional": true, "computed": true },
                            { "name": "value", "type": "string", "optional": true },
                            { "name": "secret", "type": "string", "optional": true, "sensitive": true },
                            { "name": "write_only", "type": "string", "optional": true, "write_only": true },
                            { "name": "immutable", "type": "string", "optional": true },
                            { "name": "defer", "type": "bool", "optional": true },
                            { "name": "destroy_fail", "type": "bool", "optional": true, "computed": true },
                            { "name": "create_wait_seconds", "type": "number", "optional": true },
                            { "name": "destroy_wait_seconds", "type": "number", "optional": true }
                        ]
                    }
                }
            },
            "identity_schemas": {
                "test_resource": {
                    "version": 0,
                    "identity_attributes": [
                        { "name": "id", "type": "string", "required_for_import": true }
                    ]
                }
            },
            "data_source_schemas": {
                "test_data_source": {
                    "block": {
                        "attributes": [
                            { "name": "id", "type": "string", "required": true },
                            { "name": "value", "type": "string", "computed": true },
                            { "name": "write_only", "type": "string", "optional": true, "write_only": true }
                        ]
                    }
                }
            },
            "ephemeral_resource_schemas": {
                "test_ephemeral_resource": {
                    "block": { "attributes": [ { "name": "value", "type": "string", "computed": true } ] }
                }
            },
            "action_schemas": {
                "test_unlinked": {
                    "schema": { "block": { "attributes": [ { "name": "message", "type": "string", "optional": true } ] } },
                    "unlinked": {}
                },
                "test_lifecycle": {
                    "schema": { "block": { "attributes": [ { "name": "message", "type": "string", "optional": true } ] } },
                    "lifecycle": { "executes": "after", "linked_resource": { "type_name": "test_resource" } }
                },
                "test_linked": {
                    "schema": { "block": { "attributes": [ { "name": "message", "type": "string", "optional": true } ] } },
                    "linked": { "linked_resources": [ { "type_name": "test_resource" } ] }
                }
            },
            "functions": {
                "is_true": { "parameters": ["bool"], "return_type": "bool", "description": "Returns its argument." }
            }
        }))
    }
}

#[async_trait]
impl Provider for TestProvider {
    fn schema(&self) -> Result<ProviderSchema, ProviderError> {
        let wire = Self::wire_schema().map_err(|e| ProviderError::InvalidSchema { message: e.to_string() })?;
        provider_schema_from_wire(&wire)
    }

    async fn configure(&self, config: &Value) -> Diagnostics {
        *self.resource_prefix.write() = config.get_attr("resource_prefix").as_str().map(String::from);
        *self.data_prefix.write() = config.get_attr("data_prefix").as_str().map(String::from);
        Diagnostics::new()
    }

    async fn read_resource(&self, request: ReadResourceRequest) -> ReadResourceResponse {
        let Some(id) = request.prior.get_attr("id").as_str().map(String::from) else {
            return ReadResourceResponse {
                diagnostics: Diagnostic::error("Invalid object", "the stored object has no id").into(),
                ..ReadResourceResponse::default()
            };
        };
        ReadResourceResponse {
            new_state: self.store.get(&self.resource_key(&id)).unwrap_or(Value::Null),
            private: request.private,
            diagnostics: Diagnostics::new(),
        }
    }

    async fn plan_resource_change(&self, request: PlanResourceChangeRequest) -> PlanResourceChangeResponse {
        if request.proposed.is_null() {
            let deferred = (request.prior.get_attr("defer") == Value::Bool(true))
                .then_some(DeferredReason::ResourceConfigUnknown);
            return PlanResourceChangeResponse {
                planned: Value::Null,
                deferred,
                ..PlanResourceChangeResponse::default()
            };
        }

        let Value::Object(mut attrs) = request.proposed else {
            return PlanResourceChangeResponse {
                diagnostics: Diagnostic::error("Invalid proposed object", "expected an object").into(),
                ..PlanResourceChangeResponse::default()
            };
        };

        for computed in ["id", "destroy_fail"] {
            let slot = attrs.entry(computed.to_string()).or_insert(Value::Null);
            if slot.is_null() {
                *slot = Value::Unknown;
            }
        }
        if let Some(write_only) = attrs.get_mut("write_only") {
            *write_only = Value::Null;
        }

        let deferred = match attrs.get("defer") {
            Some(Value::Unknown | Value::Bool(true)) => Some(DeferredReason::ResourceConfigUnknown),
            _ => None,
        };

        let mut requires_replace = Vec::new();
        if !request.prior.is_null()
            && request.prior.get_attr("immutable") != attrs.get("immutable").cloned().unwrap_or(Value::Null)
        {
            requires_replace.push(AttributePath::attr("immutable"));
        }

        PlanResourceChangeResponse {
            planned: Value::Object(attrs),
            requires_replace,
            private: request.prior_private,
            deferred,
            diagnostics: Diagnostics::new(),
        }
    }

    async fn apply_resource_change(&self, request: ApplyResourceChangeRequest) -> ApplyResourceChangeResponse {
        if request.planned.is_null() {
            if request.prior.get_attr("destroy_fail") == Value::Bool(true) {
                return ApplyResourceChangeResponse {
                    new_state: request.prior,
                    diagnostics: Diagnostic::error("Failed to destroy resource", "destroy_fail is set to true").into(),
                    ..ApplyResourceChangeResponse::default()
                };
            }
            wait(&request.prior, "destroy_wait_seconds").await;
            if let Some(id) = request.prior.get_attr("id").as_str() {
                self.store.delete(&self.resource_key(id));
            }
            return ApplyResourceChangeResponse::default();
        }

        let Value::Object(mut attrs) = request.planned else {
            return ApplyResourceChangeResponse {
                diagnostics: Diagnostic::error("Invalid planned object", "expected an object").into(),
                ..ApplyResourceChangeResponse::default()
            };
        };

        let id = match attrs.get("id") {
            Some(Value::String(id)) => id.clone(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        attrs.insert(String::from("id"), Value::String(id.clone()));
        if attrs.get("destroy_fail").is_none_or(|v| !v.is_known()) {
            attrs.insert(String::from("destroy_fail"), Value::Bool(false));
        }

        let resource = Value::Object(attrs);
        wait(&resource, "create_wait_seconds").await;
        debug!(id = %id, "test provider stored object");
        self.store.put(self.resource_key(&id), resource.clone());

        ApplyResourceChangeResponse {
            new_state: resource,
            private: request.private,
            diagnostics: Diagnostics::new(),
        }
    }

    async fn import_resource_state(&self, type_name: &str, id: &str) -> ImportResourceResponse {
        match self.store.get(&self.resource_key(id)) {
            Some(state) => ImportResourceResponse {
                imported: vec![ImportedResource {
                    type_name: type_name.to_string(),
                    state,
                    private: Vec::new(),
                }],
                diagnostics: Diagnostics::new(),
            },
            None => ImportResourceResponse {
                imported: Vec::new(),
                diagnostics: Diagnostic::error(
                    "Cannot import non-existent remote object",
                    format!("{id} does not exist"),
                )
                .into(),
            },
        }
    }

    async fn read_data_source(&self, _type_name: &str, config: &Value) -> ReadDataSourceResponse {
        let Some(id) = config.get_attr("id").as_str().map(String::from) else {
            return ReadDataSourceResponse {
                state: Value::Null,
                diagnostics: Diagnostic::error("Missing id", "the data source id must be a known string").into(),
            };
        };
        match self.store.get(&self.data_key(&id)) {
            Some(Value::Object(mut attrs)) => {
                if let Some(write_only) = attrs.get_mut("write_only") {
                    *write_only = Value::Null;
                }
                ReadDataSourceResponse {
                    state: Value::Object(attrs),
                    diagnostics: Diagnostics::new(),
                }
            }
            Some(other) => ReadDataSourceResponse {
                state: other,
                diagnostics: Diagnostics::new(),
            },
            None => ReadDataSourceResponse {
                state: Value::Null,
                diagnostics: Diagnostic::error("not found", format!("{id} does not exist")).into(),
            },
        }
    }

    fn call_function(&self, name: &str, args: &[Value]) -> Result<Value, String> {
        match (name, args) {
            ("is_true", [arg]) => Ok(arg.clone()),
            ("is_true", _) => Err(String::from("is_true takes exactly one argument")),
            _ => Err(format!("unknown function {name:?}")),
        }
    }

    async fn invoke_action(&self, type_name: &str, config: &Value) -> Diagnostics {
        debug!(action = type_name, "test provider invoked action");
        self.invocations.lock().push(InvokedAction {
            type_name: type_name.to_string(),
            config: config.clone(),
        });
        Diagnostics::new()
    }
}

async fn wait(object: &Value, attr: &str) {
    if let Some(seconds) = object.get_attr(attr).as_number()
        && seconds > 0.0
    {
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_snapshot_restores_objects() {
        let store = ResourceStore::new();
        store.put("abc", Value::object([("id", Value::string("abc")), ("value", Value::string("x"))]));

        let restored = ResourceStore::from_snapshot(&store.snapshot());
        assert_eq!(restored.keys(), vec!["abc"]);
        assert_eq!(restored.get("abc"), store.get("abc"));
        assert_eq!(ResourceStore::from_snapshot(&serde_json::Value::Null).keys().len(), 0);
    }

    fn plan_request(prior: Value, proposed: Value) -> PlanResourceChangeRequest {
        PlanResourceChangeRequest {
            type_name: String::from("test_resource"),
            prior,
            config: proposed.clone(),
            proposed,
            prior_private: Vec::new(),
        }
    }

    #[test]
    fn test_schema_converts() {
        let schema = TestProvider::new().schema().expect("schema converts");
        assert!(schema.resource_types.contains_key("test_resource"));
        assert_eq!(schema.actions.len(), 3);
        let block = &schema.resource_types["test_resource"].block;
        assert!(block.attribute("secret").is_some_and(|a| a.sensitive));
        assert!(block.attribute("id").is_some_and(|a| a.computed));
    }

    #[tokio::test]
    async fn test_plan_create_marks_computed_unknown() {
        let provider = TestProvider::new();
        let resp = provider
            .plan_resource_change(plan_request(
                Value::Null,
                Value::object([("value", Value::string("a")), ("write_only", Value::string("w"))]),
            ))
            .await;
        assert_eq!(resp.planned.get_attr("id"), Value::Unknown);
        assert_eq!(resp.planned.get_attr("write_only"), Value::Null);
        assert!(resp.deferred.is_none());
        assert!(resp.requires_replace.is_empty());
    }

    #[tokio::test]
    async fn test_plan_delete_and_defer() {
        let provider = TestProvider::new();
        let resp = provider
            .plan_resource_change(plan_request(Value::object([("id", Value::string("x"))]), Value::Null))
            .await;
        assert!(resp.planned.is_null());

        let resp = provider
            .plan_resource_change(plan_request(Value::Null, Value::object([("defer", Value::Bool(true))])))
            .await;
        assert_eq!(resp.deferred, Some(DeferredReason::ResourceConfigUnknown));
    }

    #[tokio::test]
    async fn test_immutable_change_requires_replace() {
        let provider = TestProvider::new();
        let prior = Value::object([("id", Value::string("x")), ("immutable", Value::string("a"))]);
        let proposed = Value::object([("id", Value::string("x")), ("immutable", Value::string("b"))]);
        let resp = provider.plan_resource_change(plan_request(prior, proposed)).await;
        assert_eq!(resp.requires_replace, vec![AttributePath::attr("immutable")]);
    }

    #[tokio::test]
    async fn test_apply_create_read_destroy() {
        let store = Arc::new(ResourceStore::new());
        let provider = TestProvider::with_store(Arc::clone(&store));
        let created = provider
            .apply_resource_change(ApplyResourceChangeRequest {
                type_name: String::from("test_resource"),
                prior: Value::Null,
                planned: Value::object([("id", Value::Unknown), ("value", Value::string("a"))]),
                config: Value::Null,
                private: Vec::new(),
            })
            .await;
        assert!(created.diagnostics.is_empty());
        let id = created.new_state.get_attr("id");
        assert!(id.as_str().is_some());
        assert_eq!(store.count(""), 1);

        let read = provider
            .read_resource(ReadResourceRequest {
                type_name: String::from("test_resource"),
                prior: created.new_state.clone(),
                private: Vec::new(),
            })
            .await;
        assert_eq!(read.new_state, created.new_state);

        let destroyed = provider
            .apply_resource_change(ApplyResourceChangeRequest {
                type_name: String::from("test_resource"),
                prior: created.new_state,
                planned: Value::Null,
                config: Value::Null,
                private: Vec::new(),
            })
            .await;
        assert!(destroyed.new_state.is_null());
        assert_eq!(store.count(""), 0);
    }

    #[tokio::test]
    async fn test_destroy_fail() {
        let provider = TestProvider::new();
        let resp = provider
            .apply_resource_change(ApplyResourceChangeRequest {
                type_name: String::from("test_resource"),
                prior: Value::object([("id", Value::string("x")), ("destroy_fail", Value::Bool(true))]),
                planned: Value::Null,
                config: Value::Null,
                private: Vec::new(),
            })
            .await;
        assert!(resp.diagnostics.has_errors());
    }

    #[tokio::test]
    async fn test_prefixes_and_data_sources() {
        let provider = TestProvider::new();
        provider
            .configure(&Value::object([("data_prefix", Value::string("fixtures"))]))
            .await;
        provider
            .store()
            .put("fixtures/lookup", Value::object([("id", Value::string("lookup")), ("value", Value::string("v"))]));

        let found = provider
            .read_data_source("test_data_source", &Value::object([("id", Value::string("lookup"))]))
            .await;
        assert_eq!(found.state.get_attr("value"), Value::string("v"));

        let missing = provider
            .read_data_source("test_data_source", &Value::object([("id", Value::string("nope"))]))
            .await;
        assert!(missing.diagnostics.has_errors());
    }

    #[tokio::test]
    async fn test_functions_and_actions() {
        let provider = TestProvider::new();
        assert_eq!(provider.call_function("is_true", &[Value::Bool(true)]), Ok(Value::Bool(true)));
        assert!(provider.call_function("nope", &[]).is_err());

        provider.invoke_action("test_unlinked", &Value::Null).await;
        assert_eq!(provider.invocations().len(), 1);
    }
}
