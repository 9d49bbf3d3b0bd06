//! Module paths.

use serde::{Deserialize, Serialize};

/// Path of a module in the configuration tree, as a sequence of module call
/// names. The root module has an empty path.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModulePath(Vec<String>);

impl ModulePath {
    /// The root module.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Builds a path from call names, outermost first.
    #[must_use]
    pub fn from_calls<I, S>(calls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(calls.into_iter().map(Into::into).collect())
    }

    /// Returns the path of the child module declared by `call` in this module.
    #[must_use]
    pub fn child(&self, call: impl Into<String>) -> Self {
        let mut calls = self.0.clone();
        calls.push(call.into());
        Self(calls)
    }

    /// Splits off the last call, returning the parent path and the call name.
    #[must_use]
    pub fn split_last(&self) -> Option<(Self, &str)> {
        let (last, rest) = self.0.split_last()?;
        Some((Self(rest.to_vec()), last.as_str()))
    }

    /// Returns true for the root module.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the call names, outermost first.
    #[must_use]
    pub fn calls(&self) -> &[String] {
        &self.0
    }
}

impl std::fmt::Display for ModulePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, call) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "module.{call}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_nested() {
        let path = ModulePath::root().child("net").child("subnets");
        assert_eq!(path.to_string(), "module.net.module.subnets");
        assert_eq!(ModulePath::root().to_string(), "");
    }

    #[test]
    fn test_split_last() {
        let path = ModulePath::from_calls(["a", "b"]);
        let (parent, call) = path.split_last().expect("non-root path");
        assert_eq!(parent, ModulePath::from_calls(["a"]));
        assert_eq!(call, "b");
        assert!(ModulePath::root().split_last().is_none());
    }
}
