//! Machine-readable rendering of provider schemas.
//!
//! The document lists, per provider, the configuration schema and every
//! resource type, data source, ephemeral resource type, identity and
//! action it supports. Empty fields are left out.

use serde::Serialize;
use std::collections::BTreeMap;

use super::convert::{nesting_to_wire, string_kind_to_wire, type_to_json};
use super::schema::{
    ActionKind, ActionSchema, Attribute, Block, ExecutionOrder, FunctionSignature, IdentitySchema, NestedBlock,
    ProviderSchema, Schema,
};

/// Version of the schema document layout.
pub const SCHEMA_FORMAT_VERSION: &str = "1.0";

/// Schemas of every registered provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSchemasJson {
    /// Document layout version.
    pub format_version: &'static str,
    /// Schemas by provider name.
    pub provider_schemas: BTreeMap<String, ProviderJson>,
}

/// Everything one provider supports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderJson {
    /// Provider configuration block.
    pub provider: SchemaJson,
    /// Managed resource types.
    pub resource_schemas: BTreeMap<String, SchemaJson>,
    /// Data sources.
    pub data_source_schemas: BTreeMap<String, SchemaJson>,
    /// Ephemeral resource types.
    pub ephemeral_resource_schemas: BTreeMap<String, SchemaJson>,
    /// Identity schemas of managed resource types.
    pub resource_identity_schemas: BTreeMap<String, IdentitySchemaJson>,
    /// Action types.
    pub action_schemas: BTreeMap<String, ActionSchemaJson>,
    /// Provider-defined functions.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub functions: BTreeMap<String, FunctionJson>,
}

/// A versioned schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaJson {
    #[serde(skip_serializing_if = "is_zero")]
    version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    block: Option<BlockJson>,
}

/// A block with its attributes and nested block types.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockJson {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, AttributeJson>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    block_types: BTreeMap<String, BlockTypeJson>,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    description_kind: &'static str,
    #[serde(skip_serializing_if = "is_false")]
    deprecated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct AttributeJson {
    #[serde(rename = "type")]
    attribute_type: serde_json::Value,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    description_kind: &'static str,
    #[serde(skip_serializing_if = "is_false")]
    deprecated: bool,
    #[serde(skip_serializing_if = "is_false")]
    required: bool,
    #[serde(skip_serializing_if = "is_false")]
    optional: bool,
    #[serde(skip_serializing_if = "is_false")]
    computed: bool,
    #[serde(skip_serializing_if = "is_false")]
    sensitive: bool,
    #[serde(skip_serializing_if = "is_false")]
    write_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct BlockTypeJson {
    nesting_mode: &'static str,
    block: BlockJson,
    #[serde(skip_serializing_if = "is_zero_u64")]
    min_items: u64,
    #[serde(skip_serializing_if = "is_zero_u64")]
    max_items: u64,
}

/// Identity attributes of a resource type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentitySchemaJson {
    version: i64,
    attributes: BTreeMap<String, IdentityAttributeJson>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct IdentityAttributeJson {
    #[serde(rename = "type")]
    identity_type: serde_json::Value,
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    #[serde(skip_serializing_if = "is_false")]
    required_for_import: bool,
    #[serde(skip_serializing_if = "is_false")]
    optional_for_import: bool,
}

/// An action's configuration and exactly one of its three shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSchemaJson {
    config_schema: BlockJson,
    #[serde(skip_serializing_if = "Option::is_none")]
    unlinked: Option<UnlinkedJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lifecycle: Option<LifecycleJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    linked: Option<LinkedJson>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct UnlinkedJson {}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct LinkedResourceJson {
    type_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct LifecycleJson {
    linked_resource: LinkedResourceJson,
    execution_order: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct LinkedJson {
    linked_resources: Vec<LinkedResourceJson>,
}

/// Signature of a provider-defined function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionJson {
    #[serde(skip_serializing_if = "String::is_empty")]
    description: String,
    parameters: Vec<serde_json::Value>,
    return_type: serde_json::Value,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(b: &bool) -> bool {
    !*b
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(n: &i64) -> bool {
    *n == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero_u64(n: &u64) -> bool {
    *n == 0
}

impl ProviderSchemasJson {
    /// Renders the schemas of `providers`, keyed by provider name.
    pub fn new<'a, I>(providers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a ProviderSchema)>,
    {
        Self {
            format_version: SCHEMA_FORMAT_VERSION,
            provider_schemas: providers
                .into_iter()
                .map(|(name, schema)| (name.to_string(), ProviderJson::from(schema)))
                .collect(),
        }
    }
}

impl From<&ProviderSchema> for ProviderJson {
    fn from(schema: &ProviderSchema) -> Self {
        let schemas = |map: &BTreeMap<String, Schema>| -> BTreeMap<String, SchemaJson> {
            map.iter().map(|(name, s)| (name.clone(), SchemaJson::from(s))).collect()
        };
        Self {
            provider: SchemaJson::from(&schema.provider),
            resource_schemas: schemas(&schema.resource_types),
            data_source_schemas: schemas(&schema.data_sources),
            ephemeral_resource_schemas: schemas(&schema.ephemeral_resource_types),
            resource_identity_schemas: schema
                .resource_identities
                .iter()
                .map(|(name, identity)| (name.clone(), IdentitySchemaJson::from(identity)))
                .collect(),
            action_schemas: schema
                .actions
                .iter()
                .map(|(name, action)| (name.clone(), ActionSchemaJson::from(action)))
                .collect(),
            functions: schema
                .functions
                .iter()
                .map(|(name, function)| (name.clone(), FunctionJson::from(function)))
                .collect(),
        }
    }
}

impl From<&Schema> for SchemaJson {
    fn from(schema: &Schema) -> Self {
        let empty = schema.block == Block::default();
        Self {
            version: schema.version,
            block: (!empty).then(|| BlockJson::from(&schema.block)),
        }
    }
}

impl From<&Block> for BlockJson {
    fn from(block: &Block) -> Self {
        Self {
            attributes: block
                .attributes
                .iter()
                .map(|a| (a.name.clone(), AttributeJson::from(a)))
                .collect(),
            block_types: block
                .block_types
                .iter()
                .map(|b| (b.type_name.clone(), BlockTypeJson::from(b)))
                .collect(),
            description: block.description.clone(),
            description_kind: string_kind_to_wire(block.description_kind),
            deprecated: block.deprecated,
        }
    }
}

impl From<&Attribute> for AttributeJson {
    fn from(attribute: &Attribute) -> Self {
        Self {
            attribute_type: attribute
                .attr_type
                .as_ref()
                .map_or(serde_json::Value::Null, type_to_json),
            description: attribute.description.clone(),
            description_kind: string_kind_to_wire(attribute.description_kind),
            deprecated: attribute.deprecated,
            required: attribute.required,
            optional: attribute.optional,
            computed: attribute.computed,
            sensitive: attribute.sensitive,
            write_only: attribute.write_only,
        }
    }
}

impl From<&NestedBlock> for BlockTypeJson {
    fn from(nested: &NestedBlock) -> Self {
        Self {
            nesting_mode: nesting_to_wire(nested.nesting),
            block: BlockJson::from(&nested.block),
            min_items: nested.min_items,
            max_items: nested.max_items,
        }
    }
}

impl From<&IdentitySchema> for IdentitySchemaJson {
    fn from(identity: &IdentitySchema) -> Self {
        Self {
            version: identity.version,
            attributes: identity
                .attributes
                .iter()
                .map(|a| {
                    let attribute = IdentityAttributeJson {
                        identity_type: a.attr_type.as_ref().map_or(serde_json::Value::Null, type_to_json),
                        description: a.description.clone(),
                        required_for_import: a.required,
                        optional_for_import: a.optional,
                    };
                    (a.name.clone(), attribute)
                })
                .collect(),
        }
    }
}

impl From<&ActionSchema> for ActionSchemaJson {
    fn from(action: &ActionSchema) -> Self {
        let mut json = Self {
            config_schema: BlockJson::from(&action.schema.block),
            unlinked: None,
            lifecycle: None,
            linked: None,
        };
        match &action.kind {
            ActionKind::Unlinked => json.unlinked = Some(UnlinkedJson {}),
            ActionKind::Lifecycle {
                executes,
                linked_resource,
            } => {
                json.lifecycle = Some(LifecycleJson {
                    linked_resource: LinkedResourceJson {
                        type_name: linked_resource.clone(),
                    },
                    execution_order: match executes {
                        ExecutionOrder::Before => "before",
                        ExecutionOrder::After => "after",
                    },
                });
            }
            ActionKind::Linked { linked_resources } => {
                json.linked = Some(LinkedJson {
                    linked_resources: linked_resources
                        .iter()
                        .map(|type_name| LinkedResourceJson {
                            type_name: type_name.clone(),
                        })
                        .collect(),
                });
            }
        }
        json
    }
}

impl From<&FunctionSignature> for FunctionJson {
    fn from(function: &FunctionSignature) -> Self {
        Self {
            description: function.description.clone(),
            parameters: function.parameters.iter().map(type_to_json).collect(),
            return_type: type_to_json(&function.return_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Provider, TestProvider};
    use serde_json::json;

    fn rendered() -> serde_json::Value {
        let schema = TestProvider::new().schema().expect("schema");
        serde_json::to_value(ProviderSchemasJson::new([("test", &schema)])).expect("serialize")
    }

    #[test]
    fn test_empty_provider_schema() {
        let json = serde_json::to_value(ProviderJson::from(&ProviderSchema::default())).expect("serialize");
        assert_eq!(
            json,
            json!({
                "provider": {},
                "resource_schemas": {},
                "data_source_schemas": {},
                "ephemeral_resource_schemas": {},
                "resource_identity_schemas": {},
                "action_schemas": {}
            })
        );
    }

    #[test]
    fn test_resource_attributes_and_identity() {
        let json = rendered();
        assert_eq!(json["format_version"], "1.0");
        let provider = &json["provider_schemas"]["test"];

        let id = &provider["resource_schemas"]["test_resource"]["block"]["attributes"]["id"];
        assert_eq!(
            id,
            &json!({ "type": "string", "description_kind": "plain", "optional": true, "computed": true })
        );
        let secret = &provider["resource_schemas"]["test_resource"]["block"]["attributes"]["secret"];
        assert_eq!(secret["sensitive"], true);
        assert_eq!(
            provider["resource_identity_schemas"]["test_resource"],
            json!({ "version": 0, "attributes": { "id": { "type": "string", "required_for_import": true } } })
        );
        assert!(provider["ephemeral_resource_schemas"]["test_ephemeral_resource"]["block"].is_object());
        assert_eq!(provider["functions"]["is_true"]["return_type"], "bool");
    }

    #[test]
    fn test_actions_carry_exactly_one_shape() {
        let json = rendered();
        let actions = &json["provider_schemas"]["test"]["action_schemas"];

        assert_eq!(actions["test_unlinked"]["unlinked"], json!({}));
        assert!(actions["test_unlinked"].get("lifecycle").is_none());
        assert_eq!(
            actions["test_lifecycle"]["lifecycle"],
            json!({ "linked_resource": { "type_name": "test_resource" }, "execution_order": "after" })
        );
        assert!(actions["test_lifecycle"].get("unlinked").is_none());
        assert_eq!(
            actions["test_linked"]["linked"],
            json!({ "linked_resources": [ { "type_name": "test_resource" } ] })
        );
        assert_eq!(
            actions["test_linked"]["config_schema"]["attributes"]["message"]["optional"],
            true
        );
    }
}
