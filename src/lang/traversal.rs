//! Static reference chains such as `var.region` or `test_resource.web[0].id`.

use super::value::Value;

/// One step after the root name of a traversal.
#[derive(Debug, Clone, PartialEq)]
pub enum TraversalStep {
    /// `.name`
    Attr(String),
    /// `[key]` with a literal key.
    Index(Value),
}

/// A root name followed by attribute and literal-index steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Traversal {
    /// The root name, e.g. `var`, `local`, or a resource type.
    pub root: String,
    /// Steps following the root.
    pub steps: Vec<TraversalStep>,
}

impl Traversal {
    /// Creates a traversal with no steps.
    #[must_use]
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            root: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends an attribute step.
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>) -> Self {
        self.steps.push(TraversalStep::Attr(name.into()));
        self
    }

    /// Appends an index step.
    #[must_use]
    pub fn index(mut self, key: Value) -> Self {
        self.steps.push(TraversalStep::Index(key));
        self
    }
}

impl TraversalStep {
    /// Returns the attribute name for attribute steps.
    #[must_use]
    pub fn as_attr(&self) -> Option<&str> {
        match self {
            Self::Attr(name) => Some(name),
            Self::Index(_) => None,
        }
    }
}

impl std::fmt::Display for Traversal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.root)?;
        for step in &self.steps {
            match step {
                TraversalStep::Attr(name) => write!(f, ".{name}")?,
                TraversalStep::Index(Value::String(s)) => write!(f, "[{s:?}]")?,
                TraversalStep::Index(key) => write!(f, "[{key}]")?,
            }
        }
        Ok(())
    }
}
