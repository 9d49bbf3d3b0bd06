//! Conversion between wire schema messages and internal schema types.
//!
//! Wire messages are what a provider sends over its transport, here as
//! serde structs. Conversion is deterministic: attributes and nested
//! blocks are sorted by name in both directions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ProviderError;

use super::schema::{
    ActionKind, ActionSchema, Attribute, AttributeType, Block, ExecutionOrder, FunctionSignature, IdentitySchema,
    NestedBlock, NestingMode, ProviderSchema, Schema, StringKind,
};

/// Wire form of an attribute.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireAttribute {
    /// Attribute name.
    pub name: String,
    /// JSON type descriptor, e.g. `"string"` or `["list", "number"]`.
    #[serde(rename = "type")]
    pub type_json: serde_json::Value,
    /// Description.
    pub description: String,
    /// `"plain"` or `"markdown"`.
    pub description_kind: String,
    /// Required flag.
    pub required: bool,
    /// Optional flag.
    pub optional: bool,
    /// Computed flag.
    pub computed: bool,
    /// Sensitive flag.
    pub sensitive: bool,
    /// Write-only flag.
    pub write_only: bool,
    /// Deprecated flag.
    pub deprecated: bool,
}

/// Wire form of a nested block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireNestedBlock {
    /// Block type name.
    pub type_name: String,
    /// Block content.
    pub block: WireBlock,
    /// `single`, `group`, `list`, `set` or `map`.
    pub nesting: String,
    /// Minimum count.
    pub min_items: u64,
    /// Maximum count.
    pub max_items: u64,
}

/// Wire form of a block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireBlock {
    /// Attributes.
    pub attributes: Vec<WireAttribute>,
    /// Nested block types.
    pub block_types: Vec<WireNestedBlock>,
    /// Description.
    pub description: String,
    /// `"plain"` or `"markdown"`.
    pub description_kind: String,
    /// Deprecated flag.
    pub deprecated: bool,
}

/// Wire form of a versioned schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireSchema {
    /// Schema version.
    pub version: i64,
    /// Root block.
    pub block: WireBlock,
}

/// Wire form of one identity attribute.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireIdentityAttribute {
    /// Attribute name.
    pub name: String,
    /// JSON type descriptor.
    #[serde(rename = "type")]
    pub type_json: serde_json::Value,
    /// Description.
    pub description: String,
    /// Required when importing.
    pub required_for_import: bool,
    /// Optional when importing.
    pub optional_for_import: bool,
}

/// Wire form of an identity schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireIdentitySchema {
    /// Identity schema version.
    pub version: i64,
    /// Identity attributes.
    pub identity_attributes: Vec<WireIdentityAttribute>,
}

/// Wire form of a linked resource reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireLinkedResource {
    /// Resource type name.
    pub type_name: String,
}

/// Wire form of a lifecycle action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireLifecycle {
    /// `"before"` or `"after"`.
    pub executes: String,
    /// The linked resource type.
    pub linked_resource: Option<WireLinkedResource>,
}

/// Wire form of a linked action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireLinked {
    /// The linked resource types.
    pub linked_resources: Vec<WireLinkedResource>,
}

/// Wire form of an unlinked action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireUnlinked {}

/// Wire form of an action schema. Exactly one of the shape fields must be
/// set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireActionSchema {
    /// Configuration schema.
    pub schema: WireSchema,
    /// Unlinked shape.
    pub unlinked: Option<WireUnlinked>,
    /// Lifecycle shape.
    pub lifecycle: Option<WireLifecycle>,
    /// Linked shape.
    pub linked: Option<WireLinked>,
}

/// Wire form of a function signature.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireFunction {
    /// Parameter type descriptors.
    pub parameters: Vec<serde_json::Value>,
    /// Return type descriptor.
    pub return_type: serde_json::Value,
    /// Description.
    pub description: String,
}

/// Wire form of a full provider schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireProviderSchema {
    /// Provider configuration schema.
    pub provider: WireSchema,
    /// Managed resource types.
    pub resource_schemas: BTreeMap<String, WireSchema>,
    /// Resource identity schemas.
    pub identity_schemas: BTreeMap<String, WireIdentitySchema>,
    /// Data sources.
    pub data_source_schemas: BTreeMap<String, WireSchema>,
    /// Ephemeral resource types.
    pub ephemeral_resource_schemas: BTreeMap<String, WireSchema>,
    /// Action types.
    pub action_schemas: BTreeMap<String, WireActionSchema>,
    /// Functions.
    pub functions: BTreeMap<String, WireFunction>,
}

/// Converts a wire block into a schema block.
///
/// Unrecognised nesting modes are kept as [`NestingMode::Invalid`] for the
/// caller to reject.
///
/// # Errors
///
/// Returns an error when an attribute type descriptor is malformed.
pub fn block_from_wire(wire: &WireBlock) -> Result<Block, ProviderError> {
    let mut attributes = wire
        .attributes
        .iter()
        .map(|a| {
            Ok(Attribute {
                name: a.name.clone(),
                attr_type: Some(type_from_json(&a.type_json)?),
                description: a.description.clone(),
                description_kind: string_kind_from_wire(&a.description_kind),
                required: a.required,
                optional: a.optional,
                computed: a.computed,
                sensitive: a.sensitive,
                write_only: a.write_only,
                deprecated: a.deprecated,
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;
    attributes.sort_by(|a, b| a.name.cmp(&b.name));

    let mut block_types = wire
        .block_types
        .iter()
        .map(|b| {
            Ok(NestedBlock {
                type_name: b.type_name.clone(),
                block: block_from_wire(&b.block)?,
                nesting: nesting_from_wire(&b.nesting),
                min_items: b.min_items,
                max_items: b.max_items,
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;
    block_types.sort_by(|a, b| a.type_name.cmp(&b.type_name));

    Ok(Block {
        attributes,
        block_types,
        description: wire.description.clone(),
        description_kind: string_kind_from_wire(&wire.description_kind),
        deprecated: wire.deprecated,
    })
}

/// Converts a schema block into its wire form.
#[must_use]
pub fn block_to_wire(block: &Block) -> WireBlock {
    let mut attributes: Vec<WireAttribute> = block
        .attributes
        .iter()
        .map(|a| WireAttribute {
            name: a.name.clone(),
            type_json: a.attr_type.as_ref().map_or(serde_json::Value::Null, type_to_json),
            description: a.description.clone(),
            description_kind: string_kind_to_wire(a.description_kind).to_string(),
            required: a.required,
            optional: a.optional,
            computed: a.computed,
            sensitive: a.sensitive,
            write_only: a.write_only,
            deprecated: a.deprecated,
        })
        .collect();
    attributes.sort_by(|a, b| a.name.cmp(&b.name));

    let mut block_types: Vec<WireNestedBlock> = block
        .block_types
        .iter()
        .map(|b| WireNestedBlock {
            type_name: b.type_name.clone(),
            block: block_to_wire(&b.block),
            nesting: nesting_to_wire(b.nesting).to_string(),
            min_items: b.min_items,
            max_items: b.max_items,
        })
        .collect();
    block_types.sort_by(|a, b| a.type_name.cmp(&b.type_name));

    WireBlock {
        attributes,
        block_types,
        description: block.description.clone(),
        description_kind: string_kind_to_wire(block.description_kind).to_string(),
        deprecated: block.deprecated,
    }
}

/// Converts a wire schema.
///
/// # Errors
///
/// Returns an error when the block cannot be converted.
pub fn schema_from_wire(wire: &WireSchema) -> Result<Schema, ProviderError> {
    Ok(Schema {
        version: wire.version,
        block: block_from_wire(&wire.block)?,
    })
}

/// Converts a wire identity schema.
///
/// # Errors
///
/// Returns an error when an attribute type descriptor is malformed.
pub fn identity_from_wire(wire: &WireIdentitySchema) -> Result<IdentitySchema, ProviderError> {
    let mut attributes = wire
        .identity_attributes
        .iter()
        .map(|a| {
            Ok(Attribute {
                name: a.name.clone(),
                attr_type: Some(type_from_json(&a.type_json)?),
                description: a.description.clone(),
                required: a.required_for_import,
                optional: a.optional_for_import,
                ..Attribute::default()
            })
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;
    attributes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(IdentitySchema {
        version: wire.version,
        attributes,
    })
}

/// Converts a wire action schema.
///
/// # Errors
///
/// Returns an error unless exactly one shape is set, or when a lifecycle
/// action has no valid execution order or linked resource.
pub fn action_schema_from_wire(wire: &WireActionSchema) -> Result<ActionSchema, ProviderError> {
    let kind = match (&wire.unlinked, &wire.lifecycle, &wire.linked) {
        (Some(_), None, None) => ActionKind::Unlinked,
        (None, Some(lifecycle), None) => ActionKind::Lifecycle {
            executes: execution_order_from_wire(&lifecycle.executes)?,
            linked_resource: lifecycle
                .linked_resource
                .as_ref()
                .map(|r| r.type_name.clone())
                .ok_or_else(|| invalid("lifecycle action has no linked resource"))?,
        },
        (None, None, Some(linked)) => ActionKind::Linked {
            linked_resources: linked.linked_resources.iter().map(|r| r.type_name.clone()).collect(),
        },
        (None, None, None) => return Err(invalid("action schema has no type; expected unlinked, lifecycle or linked")),
        _ => return Err(invalid("action schema has more than one type")),
    };
    Ok(ActionSchema {
        schema: schema_from_wire(&wire.schema)?,
        kind,
    })
}

/// Converts an action schema into its wire form.
#[must_use]
pub fn action_schema_to_wire(action: &ActionSchema) -> WireActionSchema {
    let mut wire = WireActionSchema {
        schema: WireSchema {
            version: action.schema.version,
            block: block_to_wire(&action.schema.block),
        },
        ..WireActionSchema::default()
    };
    match &action.kind {
        ActionKind::Unlinked => wire.unlinked = Some(WireUnlinked {}),
        ActionKind::Lifecycle {
            executes,
            linked_resource,
        } => {
            wire.lifecycle = Some(WireLifecycle {
                executes: match executes {
                    ExecutionOrder::Before => String::from("before"),
                    ExecutionOrder::After => String::from("after"),
                },
                linked_resource: Some(WireLinkedResource {
                    type_name: linked_resource.clone(),
                }),
            });
        }
        ActionKind::Linked { linked_resources } => {
            wire.linked = Some(WireLinked {
                linked_resources: linked_resources
                    .iter()
                    .map(|t| WireLinkedResource { type_name: t.clone() })
                    .collect(),
            });
        }
    }
    wire
}

/// Converts a full wire provider schema.
///
/// # Errors
///
/// Returns the first conversion error encountered.
pub fn provider_schema_from_wire(wire: &WireProviderSchema) -> Result<ProviderSchema, ProviderError> {
    let schemas = |map: &BTreeMap<String, WireSchema>| {
        map.iter()
            .map(|(name, s)| Ok((name.clone(), schema_from_wire(s)?)))
            .collect::<Result<BTreeMap<_, _>, ProviderError>>()
    };

    Ok(ProviderSchema {
        provider: schema_from_wire(&wire.provider)?,
        resource_types: schemas(&wire.resource_schemas)?,
        resource_identities: wire
            .identity_schemas
            .iter()
            .map(|(name, s)| Ok((name.clone(), identity_from_wire(s)?)))
            .collect::<Result<_, ProviderError>>()?,
        data_sources: schemas(&wire.data_source_schemas)?,
        ephemeral_resource_types: schemas(&wire.ephemeral_resource_schemas)?,
        actions: wire
            .action_schemas
            .iter()
            .map(|(name, s)| {
                action_schema_from_wire(s)
                    .map(|a| (name.clone(), a))
                    .map_err(|e| invalid(&format!("action {name}: {e}")))
            })
            .collect::<Result<_, ProviderError>>()?,
        functions: wire
            .functions
            .iter()
            .map(|(name, f)| {
                Ok((
                    name.clone(),
                    FunctionSignature {
                        parameters: f.parameters.iter().map(type_from_json).collect::<Result<_, _>>()?,
                        return_type: type_from_json(&f.return_type)?,
                        description: f.description.clone(),
                    },
                ))
            })
            .collect::<Result<_, ProviderError>>()?,
    })
}

/// Parses a JSON type descriptor.
///
/// # Errors
///
/// Returns an error for descriptors that name no known type.
pub fn type_from_json(json: &serde_json::Value) -> Result<AttributeType, ProviderError> {
    use serde_json::Value as J;
    match json {
        J::String(s) => match s.as_str() {
            "string" => Ok(AttributeType::String),
            "number" => Ok(AttributeType::Number),
            "bool" => Ok(AttributeType::Bool),
            "dynamic" => Ok(AttributeType::Dynamic),
            other => Err(invalid(&format!("unknown primitive type {other:?}"))),
        },
        J::Array(parts) => match parts.as_slice() {
            [J::String(kind), element] if kind == "list" => Ok(AttributeType::List(Box::new(type_from_json(element)?))),
            [J::String(kind), element] if kind == "set" => Ok(AttributeType::Set(Box::new(type_from_json(element)?))),
            [J::String(kind), element] if kind == "map" => Ok(AttributeType::Map(Box::new(type_from_json(element)?))),
            [J::String(kind), J::Object(attrs)] if kind == "object" => Ok(AttributeType::Object(
                attrs
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), type_from_json(v)?)))
                    .collect::<Result<_, ProviderError>>()?,
            )),
            _ => Err(invalid(&format!("malformed type descriptor {json}"))),
        },
        other => Err(invalid(&format!("malformed type descriptor {other}"))),
    }
}

/// Renders a type as a JSON descriptor.
#[must_use]
pub fn type_to_json(ty: &AttributeType) -> serde_json::Value {
    match ty {
        AttributeType::String => serde_json::json!("string"),
        AttributeType::Number => serde_json::json!("number"),
        AttributeType::Bool => serde_json::json!("bool"),
        AttributeType::Dynamic => serde_json::json!("dynamic"),
        AttributeType::List(e) => serde_json::json!(["list", type_to_json(e)]),
        AttributeType::Set(e) => serde_json::json!(["set", type_to_json(e)]),
        AttributeType::Map(e) => serde_json::json!(["map", type_to_json(e)]),
        AttributeType::Object(attrs) => {
            let attrs: serde_json::Map<String, serde_json::Value> =
                attrs.iter().map(|(k, v)| (k.clone(), type_to_json(v))).collect();
            serde_json::json!(["object", attrs])
        }
    }
}

fn nesting_from_wire(nesting: &str) -> NestingMode {
    match nesting {
        "single" => NestingMode::Single,
        "group" => NestingMode::Group,
        "list" => NestingMode::List,
        "set" => NestingMode::Set,
        "map" => NestingMode::Map,
        _ => NestingMode::Invalid,
    }
}

pub(crate) const fn nesting_to_wire(nesting: NestingMode) -> &'static str {
    match nesting {
        NestingMode::Invalid => "invalid",
        NestingMode::Single => "single",
        NestingMode::Group => "group",
        NestingMode::List => "list",
        NestingMode::Set => "set",
        NestingMode::Map => "map",
    }
}

fn string_kind_from_wire(kind: &str) -> StringKind {
    if kind == "markdown" {
        StringKind::Markdown
    } else {
        StringKind::Plain
    }
}

pub(crate) const fn string_kind_to_wire(kind: StringKind) -> &'static str {
    match kind {
        StringKind::Plain => "plain",
        StringKind::Markdown => "markdown",
    }
}

fn execution_order_from_wire(order: &str) -> Result<ExecutionOrder, ProviderError> {
    match order {
        "before" => Ok(ExecutionOrder::Before),
        "after" => Ok(ExecutionOrder::After),
        other => Err(invalid(&format!(
            "invalid execution order {other:?}, expected before or after"
        ))),
    }
}

fn invalid(message: &str) -> ProviderError {
    ProviderError::InvalidSchema {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_block() -> WireBlock {
        serde_json::from_value(serde_json::json!({
            "attributes": [
                { "name": "value", "type": "string", "optional": true },
                { "name": "id", "type": "string", "computed": true },
                { "name": "tags", "type": ["map", "string"], "optional": true, "description_kind": "markdown" }
            ],
            "block_types": [
                { "type_name": "timeouts", "nesting": "single", "block": {} },
                { "type_name": "rule", "nesting": "list", "min_items": 1, "max_items": 3,
                  "block": { "attributes": [ { "name": "port", "type": "number", "required": true } ] } },
                { "type_name": "weird", "nesting": "tuple", "block": {} }
            ]
        }))
        .expect("valid wire block")
    }

    #[test]
    fn test_block_sorted_and_nesting() {
        let block = block_from_wire(&wire_block()).expect("converts");
        let names: Vec<&str> = block.attributes.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["id", "tags", "value"]);
        let nested: Vec<&str> = block.block_types.iter().map(|b| b.type_name.as_str()).collect();
        assert_eq!(nested, vec!["rule", "timeouts", "weird"]);
        assert_eq!(block.block_types[0].nesting, NestingMode::List);
        assert_eq!(block.block_types[0].max_items, 3);
        assert_eq!(block.block_types[2].nesting, NestingMode::Invalid);
        assert_eq!(
            block.attribute("tags").and_then(|a| a.attr_type.clone()),
            Some(AttributeType::Map(Box::new(AttributeType::String)))
        );
    }

    #[test]
    fn test_block_survives_wire_and_back() {
        let block = block_from_wire(&wire_block()).expect("converts");
        let again = block_from_wire(&block_to_wire(&block)).expect("converts");
        assert_eq!(block, again);
    }

    #[test]
    fn test_action_shapes_are_closed() {
        let lifecycle: WireActionSchema = serde_json::from_value(serde_json::json!({
            "lifecycle": { "executes": "after", "linked_resource": { "type_name": "test_resource" } }
        }))
        .expect("valid wire action");
        let action = action_schema_from_wire(&lifecycle).expect("converts");
        assert_eq!(
            action.kind,
            ActionKind::Lifecycle {
                executes: ExecutionOrder::After,
                linked_resource: String::from("test_resource"),
            }
        );
        let back = action_schema_from_wire(&action_schema_to_wire(&action)).expect("converts");
        assert_eq!(back, action);

        assert!(action_schema_from_wire(&WireActionSchema::default()).is_err());

        let bad_order: WireActionSchema = serde_json::from_value(serde_json::json!({
            "lifecycle": { "executes": "sometime", "linked_resource": { "type_name": "t" } }
        }))
        .expect("valid wire action");
        assert!(action_schema_from_wire(&bad_order).is_err());

        let both = WireActionSchema {
            unlinked: Some(WireUnlinked {}),
            linked: Some(WireLinked::default()),
            ..WireActionSchema::default()
        };
        assert!(action_schema_from_wire(&both).is_err());
    }

    #[test]
    fn test_type_descriptors() {
        let ty = type_from_json(&serde_json::json!(["object", { "a": "bool", "b": ["list", "number"] }]))
            .expect("valid type");
        assert_eq!(type_from_json(&type_to_json(&ty)).expect("valid type"), ty);
        assert!(type_from_json(&serde_json::json!("integer")).is_err());
        assert!(type_from_json(&serde_json::json!(["list"])).is_err());
    }
}
