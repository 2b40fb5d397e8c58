//! Server registry errors.
//!
//! # Error Code Convention
//!
//! All registry errors use the `REGISTRY_` prefix:
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`RegistryError::UnknownScope`] | `REGISTRY_UNKNOWN_SCOPE` | No |
//!
//! Registry errors indicate caller-side lifecycle bugs (unbalanced
//! setup/teardown), not runtime conditions to recover from.

use crate::scope::ScopeId;
use pvlink_types::ErrorCode;
use thiserror::Error;

/// Lifecycle error from the shared server registry.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Setup or teardown named a scope the registry has never seen.
    #[error("unknown scope: {scope}")]
    UnknownScope { scope: ScopeId },
}

impl ErrorCode for RegistryError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownScope { .. } => "REGISTRY_UNKNOWN_SCOPE",
        }
    }

    fn is_recoverable(&self) -> bool {
        // A caller bug; retrying the same call cannot help.
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvlink_types::assert_error_codes;

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(
            &[RegistryError::UnknownScope {
                scope: ScopeId::from("w"),
            }],
            "REGISTRY_",
        );
    }

    #[test]
    fn display_mentions_scope() {
        let err = RegistryError::UnknownScope {
            scope: ScopeId::from("workspace-9"),
        };
        assert!(err.to_string().contains("workspace-9"));
        assert!(!err.is_recoverable());
    }
}
