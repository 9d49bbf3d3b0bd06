//! Results of custom conditions: variable validations and check blocks.

use serde::{Deserialize, Serialize};

use crate::addrs::Address;

/// Outcome of evaluating a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Could not be decided because inputs are unknown.
    Unknown,
    /// Every condition held.
    Pass,
    /// At least one condition was false.
    Fail,
    /// A condition could not be evaluated.
    Error,
}

/// What kind of configuration object a check belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// `validation` rules of an input variable.
    InputVariable,
    /// A `check` block.
    CheckBlock,
}

/// Aggregated result of every condition on one configuration object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// The object the conditions belong to.
    pub config_addr: Address,
    /// Kind of object.
    pub kind: CheckKind,
    /// Combined status.
    pub status: CheckStatus,
    /// Messages of the conditions that failed.
    pub failure_messages: Vec<String>,
}

impl CheckStatus {
    /// Combines two statuses: error beats fail, fail beats unknown, unknown beats pass.
    #[must_use]
    pub const fn combine(self, other: Self) -> Self {
        match (self, other) {
            (Self::Error, _) | (_, Self::Error) => Self::Error,
            (Self::Fail, _) | (_, Self::Fail) => Self::Fail,
            (Self::Unknown, _) | (_, Self::Unknown) => Self::Unknown,
            (Self::Pass, Self::Pass) => Self::Pass,
        }
    }
}

impl CheckResult {
    /// Creates a passing result with no messages.
    #[must_use]
    pub const fn pass(config_addr: Address, kind: CheckKind) -> Self {
        Self {
            config_addr,
            kind,
            status: CheckStatus::Pass,
            failure_messages: Vec::new(),
        }
    }

    /// Folds the outcome of one more condition into this result.
    pub fn record(&mut self, status: CheckStatus, message: Option<String>) {
        self.status = self.status.combine(status);
        if let Some(message) = message
            && matches!(status, CheckStatus::Fail | CheckStatus::Error)
        {
            self.failure_messages.push(message);
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_precedence() {
        assert_eq!(CheckStatus::Pass.combine(CheckStatus::Pass), CheckStatus::Pass);
        assert_eq!(CheckStatus::Pass.combine(CheckStatus::Unknown), CheckStatus::Unknown);
        assert_eq!(CheckStatus::Unknown.combine(CheckStatus::Fail), CheckStatus::Fail);
        assert_eq!(CheckStatus::Fail.combine(CheckStatus::Error), CheckStatus::Error);
    }

    #[test]
    fn test_record_keeps_failure_messages_only() {
        let mut result = CheckResult::pass(Address::root_variable("v"), CheckKind::InputVariable);
        result.record(CheckStatus::Pass, Some(String::from("ignored")));
        result.record(CheckStatus::Fail, Some(String::from("must be positive")));
        assert_eq!(result.status, CheckStatus::Fail);
        assert_eq!(result.failure_messages, vec![String::from("must be positive")]);
    }
}
