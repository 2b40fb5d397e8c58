//! Scope identity for shared server instances.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the logical scope (e.g. one workspace) a shared server
/// belongs to. Exactly one [`SharedServer`](crate::SharedServer) exists
/// per scope at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(String);

impl ScopeId {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScopeId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ScopeId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_from() {
        let scope = ScopeId::from("workspace-1");
        assert_eq!(scope.to_string(), "workspace-1");
        assert_eq!(scope.as_str(), "workspace-1");
        assert_eq!(scope, ScopeId::new(String::from("workspace-1")));
    }
}
