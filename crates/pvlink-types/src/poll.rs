//! Tri-state result of one cooperative poll step.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one `execute` call on a polling operation.
///
/// `Running` means "call again"; `Success` and `Failure` are terminal
/// until the operation is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollResult {
    Running,
    Success,
    Failure,
}

impl PollResult {
    /// Returns `true` for `Success` and `Failure`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.is_running()
    }

    /// Returns `true` for `Running`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for PollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Success => f.write_str("success"),
            Self::Failure => f.write_str("failure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_predicates() {
        assert!(PollResult::Running.is_running());
        assert!(!PollResult::Running.is_terminal());
        assert!(PollResult::Success.is_terminal());
        assert!(PollResult::Failure.is_terminal());
    }

    #[test]
    fn display_lowercase() {
        assert_eq!(PollResult::Running.to_string(), "running");
        assert_eq!(PollResult::Success.to_string(), "success");
        assert_eq!(PollResult::Failure.to_string(), "failure");
    }
}
