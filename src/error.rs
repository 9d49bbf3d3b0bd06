//! Error types for the plangraph engine.
//!
//! This module provides the error hierarchy for every hard failure in the
//! planning lifecycle: configuration loading, graph construction, walking,
//! plan persistence, apply, providers and state storage.
//!
//! Problems that belong to a single graph node (a failed validation rule,
//! a provider complaint about one resource) are not errors in this sense;
//! they are [`crate::diagnostics::Diagnostic`]s attached to that node.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the plangraph engine.
#[derive(Debug, Error)]
pub enum PlanGraphError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Graph construction errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Walk (scheduling) errors.
    #[error("Walk error: {0}")]
    Walk(#[from] WalkError),

    /// Plan file encoding and decoding errors.
    #[error("Plan codec error: {0}")]
    Codec(#[from] CodecError),

    /// Apply-time errors.
    #[error("Apply error: {0}")]
    Apply(#[from] ApplyError),

    /// Provider boundary errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// An expression could not be parsed.
    #[error("Invalid expression in {field}: {message}")]
    ExpressionSyntax {
        /// Configuration field holding the expression.
        field: String,
        /// Description of the syntax problem.
        message: String,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Duplicate definition.
    #[error("Duplicate {kind} name: {name}")]
    DuplicateName {
        /// Kind of entity (variable, resource, output, ...).
        kind: String,
        /// The duplicated name.
        name: String,
    },
}

/// Errors raised while building or freezing a dependency graph.
///
/// All of these are configuration errors in the user's terms: they are
/// reported before any node executes.
#[derive(Debug, Error)]
pub enum GraphError {
    /// A node refers to an address that nothing in the graph provides.
    #[error("Reference to undeclared {address} (from {referrer})")]
    UndeclaredReference {
        /// The address nobody provides.
        address: String,
        /// Name of the node holding the reference.
        referrer: String,
    },

    /// Two nodes both claim to produce the value of one address.
    #[error("Ambiguous reference to {address}: provided by both {first} and {second}")]
    AmbiguousReference {
        /// The doubly-provided address.
        address: String,
        /// First provider's name.
        first: String,
        /// Second provider's name.
        second: String,
    },

    /// The graph contains a dependency cycle.
    #[error("Cycle: {}", members.join(", "))]
    Cycle {
        /// Names of every node taking part in the cycle.
        members: Vec<String>,
    },

    /// A node id does not belong to this graph.
    #[error("Unknown graph node: {id}")]
    UnknownNode {
        /// The offending node id.
        id: usize,
    },
}

/// Errors that abort a whole graph walk.
#[derive(Debug, Error)]
pub enum WalkError {
    /// A node hit an internal invariant violation.
    #[error("Fatal error in {node}: {message}")]
    Fatal {
        /// Name of the failing node.
        node: String,
        /// Description of the violated invariant.
        message: String,
    },

    /// A worker task panicked or was aborted.
    #[error("Worker for {node} did not finish: {message}")]
    WorkerLost {
        /// Name of the node the worker was executing.
        node: String,
        /// Join error description.
        message: String,
    },
}

/// Plan file encoding and decoding errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The input does not start with the plan file signature.
    #[error("Not a plan file: bad signature")]
    BadMagic,

    /// The input ended before the declared structure was complete.
    #[error("Plan file is truncated: {message}")]
    Truncated {
        /// What was missing.
        message: String,
    },

    /// The plan format version is not the one this codec understands.
    #[error("Plan format version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// The version this build reads and writes.
        expected: u32,
        /// The version found in the input.
        found: u32,
    },

    /// The trailing checksum does not match the content.
    #[error("Plan file checksum mismatch")]
    ChecksumMismatch,

    /// The body could not be decoded.
    #[error("Plan file is corrupt: {message}")]
    Corrupt {
        /// Decoder error description.
        message: String,
    },

    /// A stored value carries no encoding this build recognises.
    #[error("Stored value has no recognised encoding (found: {found})")]
    UnrecognizedEncoding {
        /// Encoding scheme names that were present.
        found: String,
    },

    /// The plan's derived flags disagree with its contents.
    #[error("Plan is not sealed consistently: {message}")]
    Unsealed {
        /// The inconsistency found.
        message: String,
    },

    /// The body could not be encoded.
    #[error("Failed to encode plan: {message}")]
    Encode {
        /// Encoder error description.
        message: String,
    },
}

/// Apply-time errors.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The plan is errored or was interrupted.
    #[error("Plan is not applyable: {reason}")]
    NotApplyable {
        /// Why the plan was refused.
        reason: String,
    },

    /// The plan no longer matches configuration or state.
    #[error("Saved plan is stale: {message}")]
    StalePlan {
        /// Description of the mismatch.
        message: String,
    },

    /// Apply was invoked with arguments the plan was not created with.
    #[error("Apply arguments do not match the plan: {message}")]
    ArgumentMismatch {
        /// The differing argument.
        message: String,
    },

    /// A provider function returned a different result than during planning.
    #[error("Provider function {function} returned an inconsistent result")]
    FunctionResultMismatch {
        /// Provider and function name.
        function: String,
    },
}

/// Provider boundary errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No provider is registered for the requested type.
    #[error("Unknown provider: {name}")]
    UnknownProvider {
        /// Provider type name.
        name: String,
    },

    /// A provider schema does not describe the requested type.
    #[error("Provider {provider} has no schema for {kind} {type_name}")]
    UnknownType {
        /// Provider type name.
        provider: String,
        /// Schema kind (resource, data source, action).
        kind: String,
        /// Requested type name.
        type_name: String,
    },

    /// A wire schema message could not be converted.
    #[error("Invalid provider schema: {message}")]
    InvalidSchema {
        /// Description of the conversion failure.
        message: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// The state on disk belongs to a different lineage than the one being written.
    #[error("State lineage mismatch: on disk {on_disk}, writing {writing}")]
    LineageMismatch {
        /// Lineage of the existing state file.
        on_disk: String,
        /// Lineage of the state being saved.
        writing: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Result type alias for plangraph operations.
pub type Result<T> = std::result::Result<T, PlanGraphError>;

impl PlanGraphError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error describes a problem in the user's configuration.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Graph(_))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl CodecError {
    /// Creates a corruption error with the given message.
    #[must_use]
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }
}

impl ApplyError {
    /// Creates a stale-plan error with the given message.
    #[must_use]
    pub fn stale(message: impl Into<String>) -> Self {
        Self::StalePlan {
            message: message.into(),
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_members() {
        let err = GraphError::Cycle {
            members: vec![String::from("var.a"), String::from("var.b")],
        };
        assert_eq!(err.to_string(), "Cycle: var.a, var.b");
    }

    #[test]
    fn test_configuration_error_classification() {
        let err = PlanGraphError::from(GraphError::UndeclaredReference {
            address: String::from("var.missing"),
            referrer: String::from("output.x"),
        });
        assert!(err.is_configuration_error());
        assert!(!PlanGraphError::internal("boom").is_configuration_error());
    }
}
