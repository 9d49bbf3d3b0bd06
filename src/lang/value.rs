//! Runtime values and their encoded form.
//!
//! [`Value`] is what expressions evaluate to while the engine runs.
//! [`DynamicValue`] is the opaque, encoded form stored in plans: the plan
//! model and the codec never look inside the bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved object key standing for a value that is not known until apply.
///
/// The JSON encoding has no native way to say "unknown", so a nested unknown
/// is written as `{"__unknown__": true}`. Object keys made of
/// [`KEY_ESCAPE`] characters followed by the marker get one more
/// [`KEY_ESCAPE`] when written, so the marker object only ever stands for
/// an unknown.
pub const UNKNOWN_MARKER: &str = "__unknown__";

/// Escape prefix for object keys that would collide with [`UNKNOWN_MARKER`].
pub const KEY_ESCAPE: char = '~';

/// Prefix of the deserialization error raised for values carrying no
/// encoding this build understands. The plan codec matches on it.
pub const UNRECOGNIZED_ENCODING_PREFIX: &str = "unrecognized value encoding: ";

/// A dynamically-typed configuration value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// A value that will only be known during apply.
    Unknown,
    /// Boolean.
    Bool(bool),
    /// Number.
    Number(f64),
    /// String.
    String(String),
    /// Ordered list.
    List(Vec<Self>),
    /// Object with named attributes.
    Object(BTreeMap<String, Self>),
}

/// Encoding scheme of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueEncoding {
    /// JSON text, with [`UNKNOWN_MARKER`] objects for nested unknowns.
    Json,
    /// `MessagePack`, recognised but not produced by this build.
    MsgPack,
}

/// An encoded value, opaque to the plan model.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "WireValue", try_from = "WireValue")]
pub enum DynamicValue {
    /// The null value.
    #[default]
    Null,
    /// A wholly unknown value.
    Unknown,
    /// Any other value, encoded.
    Known {
        /// Scheme the bytes are encoded with.
        encoding: ValueEncoding,
        /// Encoded bytes.
        bytes: Vec<u8>,
    },
}

/// One step of an attribute path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PathStep {
    /// Object attribute.
    Attr(String),
    /// List index.
    Index(i64),
    /// Map key.
    Key(String),
}

/// Path from the root of an object value to one of its parts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributePath(Vec<PathStep>);

/// Serialized shape of a [`DynamicValue`].
///
/// A known value may carry several encodings; readers use the first one
/// they recognise and ignore the rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireValue {
    kind: u8,
    encodings: Vec<WireEncoding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireEncoding {
    scheme: String,
    data: Vec<u8>,
}

const WIRE_NULL: u8 = 0;
const WIRE_UNKNOWN: u8 = 1;
const WIRE_KNOWN: u8 = 2;

impl Value {
    /// Creates a string value.
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Creates an object value from pairs.
    #[must_use]
    pub fn object<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Self)>,
        K: Into<String>,
    {
        Self::Object(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns true for null.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true unless this value itself is unknown.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Returns true when no part of the value is unknown.
    #[must_use]
    pub fn is_wholly_known(&self) -> bool {
        match self {
            Self::Unknown => false,
            Self::List(items) => items.iter().all(Self::is_wholly_known),
            Self::Object(attrs) => attrs.values().all(Self::is_wholly_known),
            _ => true,
        }
    }

    /// Returns an object attribute, or null when absent.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Self {
        match self {
            Self::Object(attrs) => attrs.get(name).cloned().unwrap_or(Self::Null),
            Self::Unknown => Self::Unknown,
            _ => Self::Null,
        }
    }

    /// Returns the boolean, if this is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the number, if this is one.
    #[must_use]
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Human name of the value's type, for messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Unknown => "unknown",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Object(_) => "object",
        }
    }

    /// Converts to JSON, writing nested unknowns as marker objects.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Unknown => serde_json::json!({ UNKNOWN_MARKER: true }),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(attrs) => serde_json::Value::Object(
                attrs.iter().map(|(k, v)| (escape_key(k), v.to_json())).collect(),
            ),
        }
    }

    /// Converts from JSON, recognising unknown marker objects.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(attrs) => {
                if attrs.len() == 1 && attrs.get(UNKNOWN_MARKER) == Some(&serde_json::Value::Bool(true)) {
                    return Self::Unknown;
                }
                Self::Object(attrs.iter().map(|(k, v)| (unescape_key(k), Self::from_json(v))).collect())
            }
        }
    }

    /// Collects the paths of every attribute that is not yet known.
    #[must_use]
    pub fn unknown_paths(&self) -> Vec<AttributePath> {
        let mut out = Vec::new();
        collect_unknown(self, &mut AttributePath::root(), &mut out);
        out
    }
}

fn collides_with_marker(key: &str) -> bool {
    key.trim_start_matches(KEY_ESCAPE) == UNKNOWN_MARKER
}

fn escape_key(key: &str) -> String {
    if collides_with_marker(key) {
        format!("{KEY_ESCAPE}{key}")
    } else {
        key.to_owned()
    }
}

fn unescape_key(key: &str) -> String {
    match key.strip_prefix(KEY_ESCAPE) {
        Some(rest) if collides_with_marker(rest) => rest.to_owned(),
        _ => key.to_owned(),
    }
}

fn collect_unknown(value: &Value, path: &mut AttributePath, out: &mut Vec<AttributePath>) {
    match value {
        Value::Unknown => out.push(path.clone()),
        Value::List(items) => {
            for (i, item) in items.iter().enumerate() {
                path.0.push(PathStep::Index(i64::try_from(i).unwrap_or(i64::MAX)));
                collect_unknown(item, path, out);
                path.0.pop();
            }
        }
        Value::Object(attrs) => {
            for (name, attr) in attrs {
                path.0.push(PathStep::Attr(name.clone()));
                collect_unknown(attr, path, out);
                path.0.pop();
            }
        }
        _ => {}
    }
}

impl std::fmt::Display for Value {
    /// Renders the value the way string templates see it.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Unknown => write!(f, "(known after apply)"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{n:.0}")
                } else {
                    write!(f, "{n}")
                }
            }
            Self::String(s) => write!(f, "{s}"),
            Self::List(_) | Self::Object(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl DynamicValue {
    /// Encodes a runtime value.
    #[must_use]
    pub fn encode(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Unknown => Self::Unknown,
            other => Self::Known {
                encoding: ValueEncoding::Json,
                bytes: other.to_json().to_string().into_bytes(),
            },
        }
    }

    /// Decodes back into a runtime value.
    ///
    /// # Errors
    ///
    /// Returns an error when the bytes are not valid for their encoding or
    /// the encoding cannot be decoded by this build.
    pub fn decode(&self) -> Result<Value, String> {
        match self {
            Self::Null => Ok(Value::Null),
            Self::Unknown => Ok(Value::Unknown),
            Self::Known {
                encoding: ValueEncoding::Json,
                bytes,
            } => serde_json::from_slice::<serde_json::Value>(bytes)
                .map(|json| Value::from_json(&json))
                .map_err(|e| format!("invalid JSON value: {e}")),
            Self::Known {
                encoding: ValueEncoding::MsgPack,
                ..
            } => Err(String::from("msgpack-encoded values cannot be decoded by this build")),
        }
    }

    /// Returns true for the null value.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl ValueEncoding {
    /// Scheme name used on the wire.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MsgPack => "msgpack",
        }
    }

    /// Recognises a scheme name.
    #[must_use]
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "json" => Some(Self::Json),
            "msgpack" => Some(Self::MsgPack),
            _ => None,
        }
    }
}

impl From<DynamicValue> for WireValue {
    fn from(value: DynamicValue) -> Self {
        match value {
            DynamicValue::Null => Self {
                kind: WIRE_NULL,
                encodings: Vec::new(),
            },
            DynamicValue::Unknown => Self {
                kind: WIRE_UNKNOWN,
                encodings: Vec::new(),
            },
            DynamicValue::Known { encoding, bytes } => Self {
                kind: WIRE_KNOWN,
                encodings: vec![WireEncoding {
                    scheme: encoding.scheme().to_string(),
                    data: bytes,
                }],
            },
        }
    }
}

impl TryFrom<WireValue> for DynamicValue {
    type Error = String;

    fn try_from(wire: WireValue) -> Result<Self, Self::Error> {
        match wire.kind {
            WIRE_NULL => Ok(Self::Null),
            WIRE_UNKNOWN => Ok(Self::Unknown),
            WIRE_KNOWN => {
                let schemes: Vec<String> = wire.encodings.iter().map(|e| e.scheme.clone()).collect();
                wire.encodings
                    .into_iter()
                    .find_map(|e| {
                        ValueEncoding::from_scheme(&e.scheme).map(|encoding| Self::Known {
                            encoding,
                            bytes: e.data,
                        })
                    })
                    .ok_or_else(|| format!("{UNRECOGNIZED_ENCODING_PREFIX}[{}]", schemes.join(", ")))
            }
            other => Err(format!("invalid value kind {other}")),
        }
    }
}

impl AttributePath {
    /// The empty path, naming the whole value.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// A path to a top-level attribute.
    #[must_use]
    pub fn attr(name: impl Into<String>) -> Self {
        Self(vec![PathStep::Attr(name.into())])
    }

    /// The steps of the path.
    #[must_use]
    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }
}

impl std::fmt::Display for AttributePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for step in &self.0 {
            match step {
                PathStep::Attr(name) => write!(f, ".{name}")?,
                PathStep::Index(i) => write!(f, "[{i}]")?,
                PathStep::Key(k) => write!(f, "[{k:?}]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_unknown_survives_encoding() {
        let value = Value::object([
            ("id", Value::Unknown),
            ("value", Value::string("hello")),
        ]);
        let encoded = DynamicValue::encode(&value);
        assert!(matches!(encoded, DynamicValue::Known { encoding: ValueEncoding::Json, .. }));
        assert_eq!(encoded.decode().expect("decodes"), value);
    }

    #[test]
    fn test_marker_shaped_user_object_is_not_unknown() {
        let value = Value::object([
            ("tags", Value::object([(UNKNOWN_MARKER, Value::Bool(true))])),
            ("escaped", Value::object([("~__unknown__", Value::Bool(true))])),
            ("plain", Value::object([("~name", Value::string("x"))])),
            ("id", Value::Unknown),
        ]);
        let decoded = DynamicValue::encode(&value).decode().expect("decodes");
        assert_eq!(decoded, value);
        assert_eq!(Value::from_json(&value.to_json()), value);
        assert_eq!(value.to_json()["plain"]["~name"], serde_json::json!("x"));
    }

    #[test]
    fn test_top_level_null_and_unknown_are_explicit() {
        assert_eq!(DynamicValue::encode(&Value::Null), DynamicValue::Null);
        assert_eq!(DynamicValue::encode(&Value::Unknown), DynamicValue::Unknown);
    }

    #[test]
    fn test_wire_ignores_unrecognized_schemes() {
        let wire = WireValue {
            kind: WIRE_KNOWN,
            encodings: vec![
                WireEncoding {
                    scheme: String::from("cbor"),
                    data: vec![1, 2, 3],
                },
                WireEncoding {
                    scheme: String::from("json"),
                    data: b"true".to_vec(),
                },
            ],
        };
        let value = DynamicValue::try_from(wire).expect("json is recognised");
        assert_eq!(value.decode().expect("decodes"), Value::Bool(true));
    }

    #[test]
    fn test_wire_fails_when_no_scheme_recognized() {
        let wire = WireValue {
            kind: WIRE_KNOWN,
            encodings: vec![WireEncoding {
                scheme: String::from("cbor"),
                data: vec![1],
            }],
        };
        let err = DynamicValue::try_from(wire).expect_err("nothing recognised");
        assert!(err.starts_with(UNRECOGNIZED_ENCODING_PREFIX));
    }

    #[test]
    fn test_unknown_paths() {
        let value = Value::object([
            ("id", Value::Unknown),
            ("tags", Value::List(vec![Value::string("a"), Value::Unknown])),
        ]);
        let paths: Vec<String> = value.unknown_paths().iter().map(ToString::to_string).collect();
        assert_eq!(paths, vec![".id", ".tags[1]"]);
    }

    #[test]
    fn test_number_display() {
        assert_eq!(Value::Number(5.0).to_string(), "5");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
    }
}
