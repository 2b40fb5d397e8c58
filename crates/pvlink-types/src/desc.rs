//! Type descriptors for declared PV types.
//!
//! A [`TypeDesc`] describes the type a caller declares for a remote
//! variable. It may be richer than the wire's native type: a struct
//! declared with the reserved metadata fields (`connected`, `timestamp`,
//! `status`, `severity`) receives side-band metadata alongside the payload.
//!
//! # Descriptor Syntax
//!
//! Declared types are configured as JSON:
//!
//! - Scalar: `{"type":"uint32"}`
//! - Array: `{"type":"float64[]"}` (element kind plus `[]` suffix)
//! - Struct: an object whose keys are field names and whose values are
//!   nested descriptors, e.g.
//!   `{"value":{"type":"uint32"},"connected":{"type":"bool"}}`
//!
//! An object containing the single key `"type"` with a string value is
//! always read as a scalar/array descriptor; every other object is a
//! struct. A struct field literally named `type` holding a bare string is
//! therefore not expressible in this syntax.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Reserved side-channel field: the payload itself.
pub const FIELD_VALUE: &str = "value";
/// Reserved side-channel field: connection state.
pub const FIELD_CONNECTED: &str = "connected";
/// Reserved side-channel field: delivery timestamp (ns since Unix epoch).
pub const FIELD_TIMESTAMP: &str = "timestamp";
/// Reserved side-channel field: wire status code.
pub const FIELD_STATUS: &str = "status";
/// Reserved side-channel field: wire alarm severity.
pub const FIELD_SEVERITY: &str = "severity";

/// Scalar kinds of the wire vocabulary.
///
/// Names are case-sensitive lowercase on the wire (`"bool"`, `"int8"`,
/// ..., `"float64"`, `"string"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
}

impl ScalarKind {
    /// Parses a wire-vocabulary name (`"uint32"`, `"bool"`, ...).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Self::Bool,
            "int8" => Self::Int8,
            "int16" => Self::Int16,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint8" => Self::UInt8,
            "uint16" => Self::UInt16,
            "uint32" => Self::UInt32,
            "uint64" => Self::UInt64,
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            "string" => Self::String,
            _ => return None,
        })
    }

    /// Returns the wire-vocabulary name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared type of a PV value.
///
/// `Empty` is the distinguished "no/unsupported type" used to signal
/// conversion failure; it is never a valid declared type for an adapter.
///
/// Struct field order is preserved and equality is order-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeDesc {
    Empty,
    Scalar(ScalarKind),
    Array(ScalarKind),
    Struct(Vec<(String, TypeDesc)>),
}

impl TypeDesc {
    /// Parses a JSON type descriptor.
    ///
    /// Returns `None` on malformed syntax (non-object, unknown scalar
    /// name, nested parse failure).
    #[must_use]
    pub fn parse(descriptor: &Value) -> Option<Self> {
        let obj = descriptor.as_object()?;

        // `{"type":"<kind>"}` / `{"type":"<kind>[]"}` — scalar or array.
        if obj.len() == 1 {
            if let Some(name) = obj.get("type").and_then(Value::as_str) {
                return match name.strip_suffix("[]") {
                    Some(elem) => ScalarKind::parse(elem).map(Self::Array),
                    None => ScalarKind::parse(name).map(Self::Scalar),
                };
            }
        }

        // Every other object is a struct; field order preserved.
        let mut fields = Vec::with_capacity(obj.len());
        for (name, sub) in obj {
            fields.push((name.clone(), Self::parse(sub)?));
        }
        Some(Self::Struct(fields))
    }

    /// Renders the JSON descriptor form of this type.
    ///
    /// `Empty` has no descriptor form and renders as `null`.
    #[must_use]
    pub fn to_descriptor(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Scalar(kind) => serde_json::json!({ "type": kind.name() }),
            Self::Array(kind) => serde_json::json!({ "type": format!("{}[]", kind.name()) }),
            Self::Struct(fields) => {
                let mut obj = serde_json::Map::new();
                for (name, sub) in fields {
                    obj.insert(name.clone(), sub.to_descriptor());
                }
                Value::Object(obj)
            }
        }
    }

    /// Returns `true` for the distinguished empty/unsupported type.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns `true` if this is a struct type.
    #[must_use]
    pub fn is_struct(&self) -> bool {
        matches!(self, Self::Struct(_))
    }

    /// Looks up a struct field's type by name. `None` for non-structs.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&TypeDesc> {
        match self {
            Self::Struct(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, t)| t),
            _ => None,
        }
    }

    /// Returns `true` if this is a struct containing the given field.
    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Canonical scalar kind of a reserved metadata field, if `name`
    /// is one of the reserved side-channel names (excluding `value`).
    #[must_use]
    pub fn metadata_kind(name: &str) -> Option<ScalarKind> {
        Some(match name {
            FIELD_CONNECTED => ScalarKind::Bool,
            FIELD_TIMESTAMP => ScalarKind::UInt64,
            FIELD_STATUS | FIELD_SEVERITY => ScalarKind::Int16,
            _ => return None,
        })
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty"),
            Self::Scalar(kind) => write!(f, "{kind}"),
            Self::Array(kind) => write!(f, "{kind}[]"),
            Self::Struct(fields) => {
                f.write_str("{")?;
                for (i, (name, sub)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {sub}")?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_scalar() {
        let ty = TypeDesc::parse(&json!({"type": "uint32"})).unwrap();
        assert_eq!(ty, TypeDesc::Scalar(ScalarKind::UInt32));
    }

    #[test]
    fn parse_array() {
        let ty = TypeDesc::parse(&json!({"type": "float64[]"})).unwrap();
        assert_eq!(ty, TypeDesc::Array(ScalarKind::Float64));
    }

    #[test]
    fn parse_struct_preserves_field_order() {
        let ty = TypeDesc::parse(&json!({
            "value": {"type": "uint32"},
            "connected": {"type": "bool"},
        }))
        .unwrap();
        let TypeDesc::Struct(fields) = &ty else {
            panic!("expected struct");
        };
        assert_eq!(fields[0].0, "value");
        assert_eq!(fields[1].0, "connected");
    }

    #[test]
    fn struct_equality_is_order_sensitive() {
        let a = TypeDesc::parse(&json!({
            "value": {"type": "uint32"},
            "connected": {"type": "bool"},
        }))
        .unwrap();
        let b = TypeDesc::parse(&json!({
            "connected": {"type": "bool"},
            "value": {"type": "uint32"},
        }))
        .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn parse_rejects_unknown_scalar() {
        assert!(TypeDesc::parse(&json!({"type": "quaternion"})).is_none());
        assert!(TypeDesc::parse(&json!({"type": "uint32[][]"})).is_none());
    }

    #[test]
    fn parse_rejects_non_object() {
        assert!(TypeDesc::parse(&json!("uint32")).is_none());
        assert!(TypeDesc::parse(&json!(7)).is_none());
        assert!(TypeDesc::parse(&json!(null)).is_none());
    }

    #[test]
    fn descriptor_round_trip() {
        let src = json!({
            "value": {"type": "float32"},
            "severity": {"type": "int16"},
        });
        let ty = TypeDesc::parse(&src).unwrap();
        assert_eq!(ty.to_descriptor(), src);
        assert_eq!(TypeDesc::parse(&ty.to_descriptor()).unwrap(), ty);
    }

    #[test]
    fn field_lookup() {
        let ty = TypeDesc::parse(&json!({
            "value": {"type": "uint32"},
            "connected": {"type": "bool"},
        }))
        .unwrap();
        assert_eq!(
            ty.field(FIELD_VALUE),
            Some(&TypeDesc::Scalar(ScalarKind::UInt32))
        );
        assert!(ty.has_field(FIELD_CONNECTED));
        assert!(!ty.has_field(FIELD_TIMESTAMP));
        assert!(TypeDesc::Scalar(ScalarKind::Bool).field(FIELD_VALUE).is_none());
    }

    #[test]
    fn metadata_kinds() {
        assert_eq!(
            TypeDesc::metadata_kind(FIELD_CONNECTED),
            Some(ScalarKind::Bool)
        );
        assert_eq!(
            TypeDesc::metadata_kind(FIELD_TIMESTAMP),
            Some(ScalarKind::UInt64)
        );
        assert_eq!(TypeDesc::metadata_kind(FIELD_STATUS), Some(ScalarKind::Int16));
        assert_eq!(
            TypeDesc::metadata_kind(FIELD_SEVERITY),
            Some(ScalarKind::Int16)
        );
        assert_eq!(TypeDesc::metadata_kind(FIELD_VALUE), None);
    }

    #[test]
    fn display_forms() {
        assert_eq!(TypeDesc::Scalar(ScalarKind::Bool).to_string(), "bool");
        assert_eq!(TypeDesc::Array(ScalarKind::Float64).to_string(), "float64[]");
        let ty = TypeDesc::Struct(vec![(
            "value".into(),
            TypeDesc::Scalar(ScalarKind::UInt32),
        )]);
        assert_eq!(ty.to_string(), "{value: uint32}");
    }
}
