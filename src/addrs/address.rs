//! Absolute addresses of configuration entities.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::module::ModulePath;

/// Whether a resource is managed or read-only data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMode {
    /// A resource whose lifecycle the engine manages.
    Managed,
    /// A data source, read but never changed.
    Data,
}

/// Module-local address of a resource (all of its instances).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceAddr {
    /// Managed or data.
    pub mode: ResourceMode,
    /// Resource type, e.g. `test_resource`.
    pub type_name: String,
    /// Resource name from the configuration.
    pub name: String,
}

/// Key distinguishing instances of one resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstanceKey {
    /// The single instance of a resource without `count`.
    NoKey,
    /// An instance selected by `count`.
    Int(i64),
    /// An instance selected by string key.
    Str(String),
    /// Stand-in for instances whose keys are not yet known.
    Wildcard,
}

/// A referenceable entity, relative to the module declaring it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subject {
    /// `var.<name>`
    Variable(String),
    /// `local.<name>`
    Local(String),
    /// `<type>.<name>` or `data.<type>.<name>`
    Resource(ResourceAddr),
    /// `<type>.<name>[key]`
    ResourceInstance(ResourceAddr, InstanceKey),
    /// `output.<name>`
    Output(String),
    /// `module.<call>.<name>`: an output of a child module seen from its parent.
    ModuleCallOutput {
        /// Module call name.
        call: String,
        /// Output name.
        name: String,
    },
    /// `check.<name>`
    Check(String),
    /// `action.<type>.<name>`
    Action {
        /// Action type.
        type_name: String,
        /// Action name.
        name: String,
    },
    /// `provider.<type>` or `provider.<type>.<alias>`
    ProviderConfig {
        /// Provider type.
        type_name: String,
        /// Optional alias.
        alias: Option<String>,
    },
    /// `count.index`
    CountIndex,
}

/// Absolute address: a subject scoped by the module that declares it.
///
/// The serialized form is the display form, except that the single instance
/// of a resource without `count` is written with an empty key (`t.n[]`) so
/// it stays distinct from the resource itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Address {
    /// Declaring module.
    pub module: ModulePath,
    /// Entity within the module.
    pub subject: Subject,
}

/// Key of a deposed object: a previous remote object kept while its
/// replacement is created.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeposedKey(String);

impl ResourceAddr {
    /// Creates a managed resource address.
    #[must_use]
    pub fn managed(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Managed,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    /// Creates a data resource address.
    #[must_use]
    pub fn data(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Data,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    /// Returns the provider type implied by the resource type prefix.
    #[must_use]
    pub fn implied_provider(&self) -> &str {
        self.type_name
            .split_once('_')
            .map_or(self.type_name.as_str(), |(prefix, _)| prefix)
    }
}

impl Address {
    /// Creates an address from its parts.
    #[must_use]
    pub const fn new(module: ModulePath, subject: Subject) -> Self {
        Self { module, subject }
    }

    /// `var.<name>` in the root module.
    #[must_use]
    pub fn root_variable(name: impl Into<String>) -> Self {
        Self::new(ModulePath::root(), Subject::Variable(name.into()))
    }

    /// Root provider configuration address.
    #[must_use]
    pub fn provider(type_name: impl Into<String>, alias: Option<String>) -> Self {
        Self::new(
            ModulePath::root(),
            Subject::ProviderConfig {
                type_name: type_name.into(),
                alias,
            },
        )
    }

    /// Instance address in `module`.
    #[must_use]
    pub const fn instance(module: ModulePath, resource: ResourceAddr, key: InstanceKey) -> Self {
        Self::new(module, Subject::ResourceInstance(resource, key))
    }

    /// Returns the resource this address belongs to, if it names a resource
    /// or one of its instances.
    #[must_use]
    pub fn resource(&self) -> Option<&ResourceAddr> {
        match &self.subject {
            Subject::Resource(r) | Subject::ResourceInstance(r, _) => Some(r),
            _ => None,
        }
    }

    /// Returns the instance key when this is an instance address.
    #[must_use]
    pub const fn instance_key(&self) -> Option<&InstanceKey> {
        match &self.subject {
            Subject::ResourceInstance(_, key) => Some(key),
            _ => None,
        }
    }

    /// Normalises an instance address to the address of its resource.
    ///
    /// Graph edges are drawn between resources, not instances.
    #[must_use]
    pub fn containing_resource(&self) -> Self {
        match &self.subject {
            Subject::ResourceInstance(r, _) => Self::new(self.module.clone(), Subject::Resource(r.clone())),
            _ => self.clone(),
        }
    }

    /// Returns the same subject in another module.
    #[must_use]
    pub fn in_module(&self, module: ModulePath) -> Self {
        Self::new(module, self.subject.clone())
    }

    /// Returns true when the address names a managed resource instance.
    #[must_use]
    pub const fn is_managed_instance(&self) -> bool {
        matches!(
            &self.subject,
            Subject::ResourceInstance(ResourceAddr { mode: ResourceMode::Managed, .. }, _)
        )
    }
}

impl DeposedKey {
    /// Generates a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let raw = uuid::Uuid::new_v4().simple().to_string();
        Self(raw.chars().take(8).collect())
    }

    /// Wraps an existing key.
    #[must_use]
    pub fn from_string(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.mode == ResourceMode::Data {
            write!(f, "data.")?;
        }
        write!(f, "{}.{}", self.type_name, self.name)
    }
}

impl std::fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoKey => Ok(()),
            Self::Int(i) => write!(f, "[{i}]"),
            Self::Str(s) => write!(f, "[{s:?}]"),
            Self::Wildcard => write!(f, "[*]"),
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Variable(name) => write!(f, "var.{name}"),
            Self::Local(name) => write!(f, "local.{name}"),
            Self::Resource(r) => write!(f, "{r}"),
            Self::ResourceInstance(r, key) => write!(f, "{r}{key}"),
            Self::Output(name) => write!(f, "output.{name}"),
            Self::ModuleCallOutput { call, name } => write!(f, "module.{call}.{name}"),
            Self::Check(name) => write!(f, "check.{name}"),
            Self::Action { type_name, name } => write!(f, "action.{type_name}.{name}"),
            Self::ProviderConfig { type_name, alias } => {
                write!(f, "provider.{type_name}")?;
                if let Some(alias) = alias {
                    write!(f, ".{alias}")?;
                }
                Ok(())
            }
            Self::CountIndex => write!(f, "count.index"),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.module.is_root() {
            write!(f, "{}", self.subject)
        } else {
            write!(f, "{}.{}", self.module, self.subject)
        }
    }
}

impl std::fmt::Display for DeposedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        match addr.instance_key() {
            Some(InstanceKey::NoKey) => format!("{addr}[]"),
            _ => addr.to_string(),
        }
    }
}

impl TryFrom<String> for Address {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for Address {
    type Err = String;

    /// Parses the display form of an absolute address.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (dotted, key) = split_instance_key(s)?;
        let parts: Vec<&str> = dotted.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(format!("invalid address {s:?}"));
        }

        // Leading module.<call> pairs belong to the module path, except for a
        // trailing module.<call>.<output> which is a module call output.
        let mut calls = Vec::new();
        let mut rest = parts.as_slice();
        while rest.len() > 3 && rest[0] == "module" {
            calls.push(rest[1].to_string());
            rest = &rest[2..];
        }
        let module = ModulePath::from_calls(calls);

        let subject = match (rest, key) {
            (["var", name], None) => Subject::Variable((*name).to_string()),
            (["local", name], None) => Subject::Local((*name).to_string()),
            (["output", name], None) => Subject::Output((*name).to_string()),
            (["check", name], None) => Subject::Check((*name).to_string()),
            (["count", "index"], None) => Subject::CountIndex,
            (["module", call, name], None) => Subject::ModuleCallOutput {
                call: (*call).to_string(),
                name: (*name).to_string(),
            },
            (["action", type_name, name], None) => Subject::Action {
                type_name: (*type_name).to_string(),
                name: (*name).to_string(),
            },
            (["provider", type_name], None) => Subject::ProviderConfig {
                type_name: (*type_name).to_string(),
                alias: None,
            },
            (["provider", type_name, alias], None) => Subject::ProviderConfig {
                type_name: (*type_name).to_string(),
                alias: Some((*alias).to_string()),
            },
            (["data", type_name, name], key) => resource_subject(ResourceAddr::data(*type_name, *name), key),
            ([type_name, name], key) => resource_subject(ResourceAddr::managed(*type_name, *name), key),
            _ => return Err(format!("invalid address {s:?}")),
        };

        Ok(Self::new(module, subject))
    }
}

fn resource_subject(resource: ResourceAddr, key: Option<InstanceKey>) -> Subject {
    match key {
        Some(key) => Subject::ResourceInstance(resource, key),
        None => Subject::Resource(resource),
    }
}

/// Splits a trailing `[key]` off an address string.
fn split_instance_key(s: &str) -> Result<(&str, Option<InstanceKey>), String> {
    let Some(open) = s.find('[') else {
        return Ok((s, None));
    };
    let inner = s[open..]
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .ok_or_else(|| format!("invalid instance key in {s:?}"))?;

    let key = if inner.is_empty() {
        InstanceKey::NoKey
    } else if inner == "*" {
        InstanceKey::Wildcard
    } else if let Some(quoted) = inner.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        InstanceKey::Str(quoted.to_string())
    } else {
        inner
            .parse::<i64>()
            .map(InstanceKey::Int)
            .map_err(|_| format!("invalid instance key in {s:?}"))?
    };
    Ok((&s[..open], Some(key)))
}
