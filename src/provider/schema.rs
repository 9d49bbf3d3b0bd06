//! Provider schema types.
//!
//! Schemas describe the shape of every resource type, data source and
//! action a provider supports. The planner uses them to decide which
//! attributes are computed, sensitive or write-only.

use std::collections::BTreeMap;

use crate::lang::{AttributePath, Value};

/// Type of an attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeType {
    /// String.
    String,
    /// Number.
    Number,
    /// Boolean.
    Bool,
    /// Any type, decided at runtime.
    Dynamic,
    /// List of one element type.
    List(Box<Self>),
    /// Set of one element type.
    Set(Box<Self>),
    /// Map from strings to one element type.
    Map(Box<Self>),
    /// Object with fixed attribute types.
    Object(BTreeMap<String, Self>),
}

/// Format of description text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringKind {
    /// Plain text.
    #[default]
    Plain,
    /// Markdown.
    Markdown,
}

/// One attribute of a block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Value type.
    pub attr_type: Option<AttributeType>,
    /// Human description.
    pub description: String,
    /// Description format.
    pub description_kind: StringKind,
    /// Must be set in configuration.
    pub required: bool,
    /// May be set in configuration.
    pub optional: bool,
    /// Set by the provider when not configured.
    pub computed: bool,
    /// Value must be hidden in output.
    pub sensitive: bool,
    /// Accepted in configuration but never persisted.
    pub write_only: bool,
    /// Scheduled for removal.
    pub deprecated: bool,
}

/// How a nested block repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NestingMode {
    /// Not a recognised nesting mode.
    #[default]
    Invalid,
    /// At most one block.
    Single,
    /// Exactly one block, defaulted when absent.
    Group,
    /// Ordered blocks.
    List,
    /// Unordered unique blocks.
    Set,
    /// Blocks keyed by label.
    Map,
}

/// A block type nested inside another block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedBlock {
    /// Block type name.
    pub type_name: String,
    /// Content of each block.
    pub block: Block,
    /// Repetition mode.
    pub nesting: NestingMode,
    /// Minimum number of blocks.
    pub min_items: u64,
    /// Maximum number of blocks, 0 for unlimited.
    pub max_items: u64,
}

/// A configuration block: attributes plus nested blocks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Block {
    /// Attributes, sorted by name.
    pub attributes: Vec<Attribute>,
    /// Nested block types, sorted by type name.
    pub block_types: Vec<NestedBlock>,
    /// Human description.
    pub description: String,
    /// Description format.
    pub description_kind: StringKind,
    /// Scheduled for removal.
    pub deprecated: bool,
}

/// A versioned schema.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    /// Schema version, bumped when stored objects need upgrading.
    pub version: i64,
    /// Root block.
    pub block: Block,
}

/// Schema of the identity attributes of a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdentitySchema {
    /// Identity schema version.
    pub version: i64,
    /// Identity attributes.
    pub attributes: Vec<Attribute>,
}

/// When a lifecycle action runs relative to its resource change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOrder {
    /// Before the change.
    Before,
    /// After the change.
    After,
}

/// Shape of an action. This set is closed: every action schema carries
/// exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Runs on its own, tied to no resource.
    Unlinked,
    /// Runs around changes to one linked resource type.
    Lifecycle {
        /// Before or after the change.
        executes: ExecutionOrder,
        /// The linked resource type.
        linked_resource: String,
    },
    /// Runs across several linked resource types.
    Linked {
        /// The linked resource types.
        linked_resources: Vec<String>,
    },
}

/// Schema of an action type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSchema {
    /// Configuration schema.
    pub schema: Schema,
    /// Action shape.
    pub kind: ActionKind,
}

/// Signature of a provider-defined function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    /// Parameter types, in order.
    pub parameters: Vec<AttributeType>,
    /// Return type.
    pub return_type: AttributeType,
    /// Human description.
    pub description: String,
}

/// Everything a provider supports.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderSchema {
    /// Schema of the provider configuration block.
    pub provider: Schema,
    /// Managed resource types.
    pub resource_types: BTreeMap<String, Schema>,
    /// Identity schemas of managed resource types.
    pub resource_identities: BTreeMap<String, IdentitySchema>,
    /// Data sources.
    pub data_sources: BTreeMap<String, Schema>,
    /// Ephemeral resource types.
    pub ephemeral_resource_types: BTreeMap<String, Schema>,
    /// Action types.
    pub actions: BTreeMap<String, ActionSchema>,
    /// Provider-defined functions.
    pub functions: BTreeMap<String, FunctionSignature>,
}

impl Block {
    /// Looks up an attribute by name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Paths of the sensitive top-level attributes set in `value`.
    #[must_use]
    pub fn sensitive_paths(&self, value: &Value) -> Vec<AttributePath> {
        if value.is_null() {
            return Vec::new();
        }
        self.attributes
            .iter()
            .filter(|a| a.sensitive && !value.get_attr(&a.name).is_null())
            .map(|a| AttributePath::attr(a.name.clone()))
            .collect()
    }

    /// Returns `value` with every write-only attribute set to null.
    #[must_use]
    pub fn strip_write_only(&self, value: &Value) -> Value {
        let Value::Object(attrs) = value else {
            return value.clone();
        };
        let mut attrs = attrs.clone();
        for attribute in self.attributes.iter().filter(|a| a.write_only) {
            if let Some(slot) = attrs.get_mut(&attribute.name) {
                *slot = Value::Null;
            }
        }
        Value::Object(attrs)
    }

    /// Builds the proposed new object: configured values, with computed
    /// attributes the configuration leaves null carried over from `prior`.
    #[must_use]
    pub fn proposed_new(&self, prior: &Value, config: &Value) -> Value {
        let Value::Object(configured) = config else {
            return config.clone();
        };
        let mut proposed = configured.clone();
        for attribute in &self.attributes {
            let slot = proposed.entry(attribute.name.clone()).or_insert(Value::Null);
            if attribute.computed && slot.is_null() {
                *slot = prior.get_attr(&attribute.name);
            }
        }
        Value::Object(proposed)
    }

    /// Checks a configuration object against the block: required attributes
    /// must be present and no unknown attributes may be set.
    ///
    /// # Errors
    ///
    /// Returns one message per problem.
    pub fn validate_config(&self, config: &Value) -> Result<(), Vec<String>> {
        let Value::Object(attrs) = config else {
            return Err(vec![format!("expected an object, got {}", config.type_name())]);
        };
        let mut problems = Vec::new();
        for attribute in &self.attributes {
            if attribute.required && attrs.get(&attribute.name).is_none_or(Value::is_null) {
                problems.push(format!("the attribute \"{}\" is required", attribute.name));
            }
        }
        for name in attrs.keys() {
            if self.attribute(name).is_none() && !self.block_types.iter().any(|b| &b.type_name == name) {
                problems.push(format!("an attribute named \"{name}\" is not expected here"));
            }
        }
        if problems.is_empty() { Ok(()) } else { Err(problems) }
    }
}

impl ActionKind {
    /// Returns true if a resource of `resource_type` may trigger this action.
    #[must_use]
    pub fn accepts_trigger(&self, resource_type: &str) -> bool {
        match self {
            Self::Unlinked => true,
            Self::Lifecycle { linked_resource, .. } => linked_resource == resource_type,
            Self::Linked { linked_resources } => linked_resources.iter().any(|r| r == resource_type),
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unlinked => write!(f, "unlinked"),
            Self::Lifecycle { .. } => write!(f, "lifecycle"),
            Self::Linked { .. } => write!(f, "linked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> Block {
        Block {
            attributes: vec![
                Attribute {
                    name: String::from("id"),
                    computed: true,
                    ..Attribute::default()
                },
                Attribute {
                    name: String::from("secret"),
                    optional: true,
                    sensitive: true,
                    ..Attribute::default()
                },
                Attribute {
                    name: String::from("token"),
                    optional: true,
                    write_only: true,
                    ..Attribute::default()
                },
                Attribute {
                    name: String::from("value"),
                    required: true,
                    ..Attribute::default()
                },
            ],
            ..Block::default()
        }
    }

    #[test]
    fn test_proposed_new_keeps_computed_prior() {
        let prior = Value::object([("id", Value::string("abc")), ("value", Value::string("old"))]);
        let config = Value::object([("value", Value::string("new"))]);
        let proposed = block().proposed_new(&prior, &config);
        assert_eq!(proposed.get_attr("id"), Value::string("abc"));
        assert_eq!(proposed.get_attr("value"), Value::string("new"));
        assert_eq!(proposed.get_attr("secret"), Value::Null);
    }

    #[test]
    fn test_sensitive_and_write_only() {
        let value = Value::object([
            ("secret", Value::string("s")),
            ("token", Value::string("t")),
            ("value", Value::string("v")),
        ]);
        let paths = block().sensitive_paths(&value);
        assert_eq!(paths, vec![AttributePath::attr("secret")]);
        assert!(block().sensitive_paths(&Value::Null).is_empty());
        assert_eq!(block().strip_write_only(&value).get_attr("token"), Value::Null);
    }

    #[test]
    fn test_validate_config() {
        assert!(block().validate_config(&Value::object([("value", Value::string("v"))])).is_ok());
        let problems = block()
            .validate_config(&Value::object([("bogus", Value::Bool(true))]))
            .expect_err("invalid");
        assert_eq!(problems.len(), 2);
    }

    #[test]
    fn test_action_kind_triggers() {
        let lifecycle = ActionKind::Lifecycle {
            executes: ExecutionOrder::After,
            linked_resource: String::from("test_resource"),
        };
        assert!(lifecycle.accepts_trigger("test_resource"));
        assert!(!lifecycle.accepts_trigger("other_resource"));
        assert!(ActionKind::Unlinked.accepts_trigger("anything"));
    }
}
