//! Adapter attribute parsing.
//!
//! Every adapter is configured through a flat set of named string
//! attributes ([`AdapterConfig`]). Parsing happens once, at `init` /
//! `setup` time, and every parse failure surfaces as a [`SetupError`]
//! whose message is prefixed with the adapter kind so an operator can
//! tell which adapter in a procedure is misconfigured.
//!
//! # Error Code Convention
//!
//! All setup errors use the `SETUP_` prefix:
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`SetupError::MissingAttribute`] | `SETUP_MISSING_ATTRIBUTE` | No |
//! | [`SetupError::AttributeClash`] | `SETUP_ATTRIBUTE_CLASH` | No |
//! | [`SetupError::InvalidType`] | `SETUP_INVALID_TYPE` | No |
//! | [`SetupError::InvalidValue`] | `SETUP_INVALID_VALUE` | No |
//! | [`SetupError::InvalidTimeout`] | `SETUP_INVALID_TIMEOUT` | No |
//! | [`SetupError::UnknownVariable`] | `SETUP_UNKNOWN_VARIABLE` | No |
//! | [`SetupError::RecordExists`] | `SETUP_RECORD_EXISTS` | No |
//! | [`SetupError::ChannelOpen`] | `SETUP_CHANNEL_OPEN` | Delegated |
//! | [`SetupError::CallFailed`] | `SETUP_CALL_FAILED` | Delegated |
//! | [`SetupError::UnknownAdapter`] | `SETUP_UNKNOWN_ADAPTER` | No |

use std::time::Duration;

use pvlink_types::{conforms, ErrorCode, TypeDesc, TypedValue};
use pvlink_wire::WireError;
use thiserror::Error;

/// Configuration error raised while setting up an adapter.
#[derive(Debug, Error)]
pub enum SetupError {
    /// A required attribute is absent.
    #[error("[{adapter}] missing required attribute '{attribute}'")]
    MissingAttribute { adapter: String, attribute: String },

    /// Mutually exclusive attribute groups were both given (or neither).
    #[error("[{adapter}] conflicting attributes: {detail}")]
    AttributeClash { adapter: String, detail: String },

    /// An attribute did not parse as a type descriptor.
    #[error("[{adapter}] invalid type in '{attribute}': {detail}")]
    InvalidType {
        adapter: String,
        attribute: String,
        detail: String,
    },

    /// An attribute did not parse as a value of the declared type.
    #[error("[{adapter}] invalid value in '{attribute}': {detail}")]
    InvalidValue {
        adapter: String,
        attribute: String,
        detail: String,
    },

    /// The timeout attribute is not a valid non-negative duration.
    #[error("[{adapter}] invalid timeout: {detail}")]
    InvalidTimeout { adapter: String, detail: String },

    /// A referenced procedure variable does not exist.
    #[error("[{adapter}] unknown variable '{name}'")]
    UnknownVariable { adapter: String, name: String },

    /// The shared server already holds a record with this name.
    #[error("[{adapter}] record already registered: '{name}'")]
    RecordExists { adapter: String, name: String },

    /// Attaching to the wire channel failed.
    #[error("[{adapter}] channel open failed: {source}")]
    ChannelOpen {
        adapter: String,
        #[source]
        source: WireError,
    },

    /// Issuing the RPC request failed.
    #[error("[{adapter}] call failed: {source}")]
    CallFailed {
        adapter: String,
        #[source]
        source: WireError,
    },

    /// No adapter is registered under this kind name.
    #[error("unknown adapter kind '{kind}'")]
    UnknownAdapter { kind: String },
}

impl ErrorCode for SetupError {
    fn code(&self) -> &'static str {
        match self {
            Self::MissingAttribute { .. } => "SETUP_MISSING_ATTRIBUTE",
            Self::AttributeClash { .. } => "SETUP_ATTRIBUTE_CLASH",
            Self::InvalidType { .. } => "SETUP_INVALID_TYPE",
            Self::InvalidValue { .. } => "SETUP_INVALID_VALUE",
            Self::InvalidTimeout { .. } => "SETUP_INVALID_TIMEOUT",
            Self::UnknownVariable { .. } => "SETUP_UNKNOWN_VARIABLE",
            Self::RecordExists { .. } => "SETUP_RECORD_EXISTS",
            Self::ChannelOpen { .. } => "SETUP_CHANNEL_OPEN",
            Self::CallFailed { .. } => "SETUP_CALL_FAILED",
            Self::UnknownAdapter { .. } => "SETUP_UNKNOWN_ADAPTER",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Follows the wire-level cause: a transient outage at init
            // time may clear on the next procedure run.
            Self::ChannelOpen { source, .. } | Self::CallFailed { source, .. } => {
                source.is_recoverable()
            }
            // Configuration mistakes; retrying the same config cannot help.
            _ => false,
        }
    }
}

/// Ordered name/value attribute set configuring one adapter instance.
///
/// Attributes keep insertion order and names are unique; [`set`](Self::set)
/// replaces an existing value in place.
#[derive(Debug, Clone, Default)]
pub struct AdapterConfig {
    attrs: Vec<(String, String)>,
}

impl AdapterConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion for tests and embedders.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Inserts or replaces an attribute, preserving first-seen order.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    /// Attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    // === typed accessors ===

    /// Returns the attribute value or [`SetupError::MissingAttribute`].
    pub fn require(&self, adapter: &str, name: &str) -> Result<&str, SetupError> {
        self.get(name).ok_or_else(|| SetupError::MissingAttribute {
            adapter: adapter.into(),
            attribute: name.into(),
        })
    }

    /// Parses the attribute as a [`TypeDesc`].
    ///
    /// The attribute is JSON: either a bare scalar name string such as
    /// `"uint32"` (with an optional `[]` suffix for arrays) or a full
    /// descriptor object.
    pub fn type_desc(&self, adapter: &str, name: &str) -> Result<TypeDesc, SetupError> {
        let raw = self.require(adapter, name)?;
        let invalid = |detail: String| SetupError::InvalidType {
            adapter: adapter.into(),
            attribute: name.into(),
            detail,
        };
        let json: serde_json::Value = serde_json::from_str(raw)
            .or_else(|_| serde_json::from_str(&format!("{{\"type\": {raw:?}}}")))
            .map_err(|e| invalid(e.to_string()))?;
        let desc = match &json {
            serde_json::Value::String(_) => {
                TypeDesc::parse(&serde_json::json!({ "type": json }))
            }
            _ => TypeDesc::parse(&json),
        }
        .ok_or_else(|| invalid("unrecognized type descriptor".into()))?;
        if desc.is_empty() {
            return Err(invalid("empty type".into()));
        }
        Ok(desc)
    }

    /// Parses the attribute as a JSON literal conforming to `ty`.
    pub fn value_literal(
        &self,
        adapter: &str,
        name: &str,
        ty: &TypeDesc,
    ) -> Result<TypedValue, SetupError> {
        let raw = self.require(adapter, name)?;
        let invalid = |detail: String| SetupError::InvalidValue {
            adapter: adapter.into(),
            attribute: name.into(),
            detail,
        };
        let body: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
        if !conforms(&body, ty) {
            return Err(invalid(format!("does not conform to {ty}")));
        }
        TypedValue::new(ty.clone(), body).map_err(|e| invalid(e.to_string()))
    }

    /// Parses the optional `timeout` attribute as seconds.
    ///
    /// Absent means unbounded (`Ok(None)`). Negative, NaN and infinite
    /// values are rejected.
    pub fn timeout(&self, adapter: &str) -> Result<Option<Duration>, SetupError> {
        let Some(raw) = self.get("timeout") else {
            return Ok(None);
        };
        let invalid = |detail: String| SetupError::InvalidTimeout {
            adapter: adapter.into(),
            detail,
        };
        let seconds: f64 = raw
            .trim()
            .parse()
            .map_err(|_| invalid(format!("not a number: '{raw}'")))?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(invalid(format!("must be a finite non-negative number, got {raw}")));
        }
        Ok(Some(Duration::from_secs_f64(seconds)))
    }

    /// Checks that exactly one attribute group is fully present.
    ///
    /// Returns the index of the satisfied group. A group counts as
    /// present when all of its attributes are set.
    pub fn exactly_one_of(&self, adapter: &str, groups: &[&[&str]]) -> Result<usize, SetupError> {
        let present: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.iter().all(|a| self.has(a)))
            .map(|(i, _)| i)
            .collect();
        let describe = || {
            groups
                .iter()
                .map(|g| g.join("+"))
                .collect::<Vec<_>>()
                .join(" or ")
        };
        match present.as_slice() {
            [one] => Ok(*one),
            [] => Err(SetupError::MissingAttribute {
                adapter: adapter.into(),
                attribute: describe(),
            }),
            _ => Err(SetupError::AttributeClash {
                adapter: adapter.into(),
                detail: format!("exactly one of {} must be given", describe()),
            }),
        }
    }
}

impl FromIterator<(String, String)> for AdapterConfig {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut config = Self::new();
        for (name, value) in iter {
            config.set(name, value);
        }
        config
    }
}
