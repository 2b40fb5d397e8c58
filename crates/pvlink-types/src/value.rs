//! Typed values and extended wire deliveries.
//!
//! A [`TypedValue`] pairs a JSON payload with the [`TypeDesc`] it conforms
//! to. The distinguished empty value ([`TypedValue::empty`]) is the
//! caller-visible "no value available / conversion failed" signal used
//! throughout the conversion layer instead of errors.
//!
//! An [`ExtendedValue`] is one wire delivery: the payload plus the
//! side-band metadata (connection state, timestamp, status, severity)
//! the delivering protocol attaches to it.

use crate::desc::{ScalarKind, TypeDesc};
use crate::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Error constructing a [`TypedValue`] from an arbitrary payload.
#[derive(Debug, Clone, Error)]
pub enum ValueError {
    /// Payload does not conform to the declared type.
    #[error("payload does not conform to declared type '{declared}'")]
    Mismatch {
        /// The declared type the payload was checked against.
        declared: TypeDesc,
    },
    /// The empty type is not a valid declared type for a value.
    #[error("cannot construct a value of the empty type")]
    EmptyType,
}

impl ErrorCode for ValueError {
    fn code(&self) -> &'static str {
        match self {
            Self::Mismatch { .. } => "VALUE_MISMATCH",
            Self::EmptyType => "VALUE_EMPTY_TYPE",
        }
    }

    fn is_recoverable(&self) -> bool {
        // Both indicate wrong input; retrying cannot help.
        false
    }
}

/// A JSON payload tagged with the [`TypeDesc`] it conforms to.
///
/// # Well-formedness
///
/// Constructors and the conversion layer guarantee `body` conforms to
/// `ty`. Arbitrary construction goes through [`TypedValue::new`], which
/// validates and returns `Result`.
///
/// # Example
///
/// ```
/// use pvlink_types::{ScalarKind, TypeDesc, TypedValue};
/// use serde_json::json;
///
/// let v = TypedValue::new(TypeDesc::Scalar(ScalarKind::UInt32), json!(7)).unwrap();
/// assert!(!v.is_empty());
/// assert!(TypedValue::new(TypeDesc::Scalar(ScalarKind::UInt32), json!("x")).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedValue {
    ty: TypeDesc,
    body: Value,
}

impl TypedValue {
    /// Constructs a value after validating the payload against the type.
    ///
    /// # Errors
    ///
    /// [`ValueError::EmptyType`] when `ty` is [`TypeDesc::Empty`];
    /// [`ValueError::Mismatch`] when `body` does not conform to `ty`.
    pub fn new(ty: TypeDesc, body: Value) -> Result<Self, ValueError> {
        if ty.is_empty() {
            return Err(ValueError::EmptyType);
        }
        if !conforms(&body, &ty) {
            return Err(ValueError::Mismatch { declared: ty });
        }
        Ok(Self { ty, body })
    }

    /// Constructs a value the caller has already validated.
    ///
    /// Used by the conversion layer, which produces bodies that conform
    /// by construction.
    pub(crate) fn trusted(ty: TypeDesc, body: Value) -> Self {
        debug_assert!(conforms(&body, &ty), "trusted body must conform to type");
        Self { ty, body }
    }

    /// The distinguished "no value available" value.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            ty: TypeDesc::Empty,
            body: Value::Null,
        }
    }

    /// Returns `true` for the distinguished empty value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ty.is_empty()
    }

    /// The declared type of this value.
    #[must_use]
    pub fn ty(&self) -> &TypeDesc {
        &self.ty
    }

    /// The JSON payload.
    #[must_use]
    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Looks up a struct field's payload by name. `None` for non-structs
    /// and missing fields.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.as_object()?.get(name)
    }

    /// Consumes the value, returning its parts.
    #[must_use]
    pub fn into_parts(self) -> (TypeDesc, Value) {
        (self.ty, self.body)
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("<empty>")
        } else {
            write!(f, "{} ({})", self.body, self.ty)
        }
    }
}

/// One wire delivery: payload plus side-band metadata.
///
/// Timestamps are nanoseconds since the Unix epoch. `status` and
/// `severity` carry the delivering protocol's alarm codes; `0` means
/// nominal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtendedValue {
    pub value: TypedValue,
    pub connected: bool,
    pub timestamp: u64,
    pub status: i16,
    pub severity: i16,
}

impl ExtendedValue {
    /// A nominal connected delivery with zeroed status and severity.
    #[must_use]
    pub fn connected(value: TypedValue, timestamp: u64) -> Self {
        Self {
            value,
            connected: true,
            timestamp,
            status: 0,
            severity: 0,
        }
    }

    /// A disconnect transition carrying the last-known value.
    #[must_use]
    pub fn disconnected(last: TypedValue, timestamp: u64) -> Self {
        Self {
            value: last,
            connected: false,
            timestamp,
            status: 0,
            severity: 0,
        }
    }
}

/// Checks that a JSON payload conforms to a declared type.
///
/// Conformance is strict: integers must be integral JSON numbers in the
/// kind's range, floats accept any number, strings and bools only their
/// own JSON kind. Structs require exactly the declared fields to be
/// present (surplus fields do not conform; conversion, not validation,
/// is where surplus source fields are dropped).
#[must_use]
pub fn conforms(body: &Value, ty: &TypeDesc) -> bool {
    match ty {
        TypeDesc::Empty => false,
        TypeDesc::Scalar(kind) => scalar_conforms(body, *kind),
        TypeDesc::Array(kind) => match body.as_array() {
            Some(items) => items.iter().all(|v| scalar_conforms(v, *kind)),
            None => false,
        },
        TypeDesc::Struct(fields) => match body.as_object() {
            Some(obj) => {
                obj.len() == fields.len()
                    && fields
                        .iter()
                        .all(|(name, sub)| obj.get(name).is_some_and(|v| conforms(v, sub)))
            }
            None => false,
        },
    }
}

fn scalar_conforms(body: &Value, kind: ScalarKind) -> bool {
    match kind {
        ScalarKind::Bool => body.is_boolean(),
        ScalarKind::String => body.is_string(),
        ScalarKind::Float32 | ScalarKind::Float64 => body.is_number(),
        ScalarKind::Int8 => in_signed_range(body, i8::MIN as i64, i8::MAX as i64),
        ScalarKind::Int16 => in_signed_range(body, i16::MIN as i64, i16::MAX as i64),
        ScalarKind::Int32 => in_signed_range(body, i32::MIN as i64, i32::MAX as i64),
        ScalarKind::Int64 => in_signed_range(body, i64::MIN, i64::MAX),
        ScalarKind::UInt8 => in_unsigned_range(body, u8::MAX as u64),
        ScalarKind::UInt16 => in_unsigned_range(body, u16::MAX as u64),
        ScalarKind::UInt32 => in_unsigned_range(body, u32::MAX as u64),
        ScalarKind::UInt64 => in_unsigned_range(body, u64::MAX),
    }
}

/// Extracts an integral i64 from a JSON number, including floats with a
/// zero fractional part.
pub(crate) fn integral_i64(body: &Value) -> Option<i64> {
    if let Some(i) = body.as_i64() {
        return Some(i);
    }
    let f = body.as_f64()?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Extracts an integral u64 from a JSON number.
pub(crate) fn integral_u64(body: &Value) -> Option<u64> {
    if let Some(u) = body.as_u64() {
        return Some(u);
    }
    let f = body.as_f64()?;
    if f.fract() == 0.0 && f >= 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}

fn in_signed_range(body: &Value, min: i64, max: i64) -> bool {
    integral_i64(body).is_some_and(|i| i >= min && i <= max)
}

fn in_unsigned_range(body: &Value, max: u64) -> bool {
    integral_u64(body).is_some_and(|u| u <= max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_error_codes;
    use serde_json::json;

    fn uint32() -> TypeDesc {
        TypeDesc::Scalar(ScalarKind::UInt32)
    }

    #[test]
    fn new_validates() {
        assert!(TypedValue::new(uint32(), json!(7)).is_ok());
        assert!(TypedValue::new(uint32(), json!(-1)).is_err());
        assert!(TypedValue::new(uint32(), json!("seven")).is_err());
        assert!(TypedValue::new(TypeDesc::Empty, json!(null)).is_err());
    }

    #[test]
    fn empty_is_empty() {
        let v = TypedValue::empty();
        assert!(v.is_empty());
        assert!(v.ty().is_empty());
        assert_eq!(v.to_string(), "<empty>");
    }

    #[test]
    fn struct_conformance_is_exact() {
        let ty = TypeDesc::Struct(vec![
            ("value".into(), uint32()),
            ("connected".into(), TypeDesc::Scalar(ScalarKind::Bool)),
        ]);
        assert!(conforms(&json!({"value": 7, "connected": true}), &ty));
        // Missing field
        assert!(!conforms(&json!({"value": 7}), &ty));
        // Surplus field
        assert!(!conforms(
            &json!({"value": 7, "connected": true, "extra": 1}),
            &ty
        ));
    }

    #[test]
    fn array_conformance_elementwise() {
        let ty = TypeDesc::Array(ScalarKind::Int16);
        assert!(conforms(&json!([1, -2, 3]), &ty));
        assert!(!conforms(&json!([1, "x"]), &ty));
        assert!(!conforms(&json!([40000]), &ty));
        assert!(!conforms(&json!(1), &ty));
    }

    #[test]
    fn integral_floats_conform_to_integers() {
        assert!(conforms(&json!(3.0), &TypeDesc::Scalar(ScalarKind::Int32)));
        assert!(!conforms(&json!(3.5), &TypeDesc::Scalar(ScalarKind::Int32)));
    }

    #[test]
    fn floats_accept_any_number() {
        assert!(conforms(&json!(3), &TypeDesc::Scalar(ScalarKind::Float32)));
        assert!(conforms(&json!(3.5), &TypeDesc::Scalar(ScalarKind::Float64)));
    }

    #[test]
    fn field_access() {
        let ty = TypeDesc::Struct(vec![("value".into(), uint32())]);
        let v = TypedValue::new(ty, json!({"value": 7})).unwrap();
        assert_eq!(v.field("value"), Some(&json!(7)));
        assert_eq!(v.field("missing"), None);
    }

    #[test]
    fn extended_value_constructors() {
        let v = TypedValue::new(uint32(), json!(7)).unwrap();
        let up = ExtendedValue::connected(v.clone(), 42);
        assert!(up.connected);
        assert_eq!(up.timestamp, 42);
        assert_eq!(up.status, 0);

        let down = ExtendedValue::disconnected(v, 43);
        assert!(!down.connected);
    }

    #[test]
    fn value_error_codes() {
        assert_error_codes(
            &[
                ValueError::Mismatch { declared: uint32() },
                ValueError::EmptyType,
            ],
            "VALUE_",
        );
    }
}
