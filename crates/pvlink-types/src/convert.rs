//! Typed-value conversion between wire deliveries and declared types.
//!
//! This module reconciles a value arriving from (or destined for) the
//! wire with the type a caller declared. Declared types may be richer
//! than the wire's native type: a struct with a `value` field unwraps and
//! rewraps through that field, and reserved metadata fields are
//! synthesized from the delivery's side-band on read.
//!
//! # Failure Policy
//!
//! Every conversion failure returns [`TypedValue::empty`], never an
//! error and never a panic. The empty value is how "value unavailable /
//! wrong type" is signaled up the stack; callers map it to a FAILURE
//! result plus a log entry.

use crate::desc::{ScalarKind, TypeDesc, FIELD_CONNECTED, FIELD_SEVERITY, FIELD_STATUS, FIELD_TIMESTAMP, FIELD_VALUE};
use crate::value::{integral_i64, integral_u64, ExtendedValue, TypedValue};
use serde_json::{json, Map, Value};

/// Computes the wire type behind a declared type.
///
/// - Struct with a `value` field: that field's type.
/// - Struct without a `value` field: [`TypeDesc::Empty`] (unsupported).
/// - Scalar/array: the declared type itself.
#[must_use]
pub fn channel_type(declared: &TypeDesc) -> TypeDesc {
    match declared {
        TypeDesc::Struct(_) => declared.field(FIELD_VALUE).cloned().unwrap_or(TypeDesc::Empty),
        other => other.clone(),
    }
}

/// Mirror of [`channel_type`] at the value level.
///
/// A struct value without a `value` field yields [`TypedValue::empty`].
#[must_use]
pub fn extract_payload(value: &TypedValue) -> TypedValue {
    let TypeDesc::Struct(_) = value.ty() else {
        return value.clone();
    };
    match (value.ty().field(FIELD_VALUE), value.field(FIELD_VALUE)) {
        (Some(ty), Some(body)) => TypedValue::trusted(ty.clone(), body.clone()),
        _ => TypedValue::empty(),
    }
}

/// Converts a wire delivery into a value of the declared type.
///
/// # Algorithm
///
/// 1. If the declared type has no `connected` field and the delivery
///    reports "not connected", return empty. Metadata-aware declared
///    types degrade gracefully on disconnect; metadata-unaware ones
///    deliberately do not.
/// 2. If the delivered payload's type already equals the declared type,
///    return it unchanged (fast path).
/// 3. Otherwise allocate a value of the declared type. A declared
///    `value` field receives the converted payload; without one the
///    whole payload converts directly into the result. Unconvertible
///    payloads yield empty.
/// 4. Each reserved metadata field present in the declared type is
///    populated from the delivery's side-band. Any failure yields
///    empty; partial population is never returned.
///
/// # Example
///
/// ```
/// use pvlink_types::convert::convert_to_typed;
/// use pvlink_types::{ExtendedValue, ScalarKind, TypeDesc, TypedValue};
/// use serde_json::json;
///
/// let wire = TypedValue::new(TypeDesc::Scalar(ScalarKind::UInt32), json!(7)).unwrap();
/// let declared = TypeDesc::parse(&json!({
///     "value": {"type": "uint32"},
///     "connected": {"type": "bool"},
/// }))
/// .unwrap();
///
/// let got = convert_to_typed(&ExtendedValue::connected(wire, 0), &declared);
/// assert_eq!(got.body(), &json!({"value": 7, "connected": true}));
/// ```
#[must_use]
pub fn convert_to_typed(received: &ExtendedValue, declared: &TypeDesc) -> TypedValue {
    // Step 1: metadata-unaware declared types have no way to represent
    // a disconnect; they get no value at all.
    if !declared.has_field(FIELD_CONNECTED) && !received.connected {
        return TypedValue::empty();
    }

    // Step 2: fast path.
    if received.value.ty() == declared {
        return received.value.clone();
    }

    if declared.is_empty() {
        return TypedValue::empty();
    }

    // Step 3: payload conversion.
    let body = if let Some(value_ty) = declared.field(FIELD_VALUE) {
        let Some(payload) = convert_body(received.value.body(), value_ty) else {
            return TypedValue::empty();
        };
        let mut obj = Map::new();
        obj.insert(FIELD_VALUE.to_string(), payload);
        Value::Object(obj)
    } else {
        match convert_body(received.value.body(), declared) {
            Some(body) => body,
            None => return TypedValue::empty(),
        }
    };

    // Step 4: side-band metadata. Declared struct fields that are
    // neither `value` nor reserved metadata have no source; that is a
    // conversion failure, not a field left defaulted.
    let body = match declared {
        TypeDesc::Struct(fields) => {
            let mut obj = match body {
                Value::Object(obj) => obj,
                _ => return TypedValue::empty(),
            };
            for (name, field_ty) in fields {
                if name == FIELD_VALUE {
                    continue;
                }
                let side = match name.as_str() {
                    FIELD_CONNECTED => json!(received.connected),
                    FIELD_TIMESTAMP => json!(received.timestamp),
                    FIELD_STATUS => json!(received.status),
                    FIELD_SEVERITY => json!(received.severity),
                    _ => {
                        if obj.contains_key(name) {
                            // Populated from the payload in step 3.
                            continue;
                        }
                        return TypedValue::empty();
                    }
                };
                let Some(converted) = convert_body(&side, field_ty) else {
                    return TypedValue::empty();
                };
                obj.insert(name.clone(), converted);
            }
            Value::Object(obj)
        }
        _ => body,
    };

    TypedValue::trusted(declared.clone(), body)
}

/// Wraps a bare scalar/array as a one-field struct `{ "value": x }`.
///
/// Structs pass through unchanged, which makes the operation idempotent.
/// Used before writing a bare value to a protocol whose wire convention
/// always uses a struct carrier. The empty value stays empty.
#[must_use]
pub fn pack_into_struct_if_scalar(value: &TypedValue) -> TypedValue {
    if value.is_empty() || value.ty().is_struct() {
        return value.clone();
    }
    let ty = TypeDesc::Struct(vec![(FIELD_VALUE.to_string(), value.ty().clone())]);
    let mut obj = Map::new();
    obj.insert(FIELD_VALUE.to_string(), value.body().clone());
    TypedValue::trusted(ty, Value::Object(obj))
}

/// Converts a JSON payload into the target type's representation.
///
/// Scalar rules: bool and string convert only to themselves; integers
/// accept any integral JSON number in the target range; floats accept
/// any number. Arrays convert element-wise. Structs convert field-wise
/// by name; every declared field must be present in the source, surplus
/// source fields are dropped.
fn convert_body(src: &Value, target: &TypeDesc) -> Option<Value> {
    match target {
        TypeDesc::Empty => None,
        TypeDesc::Scalar(kind) => convert_scalar(src, *kind),
        TypeDesc::Array(kind) => {
            let items = src.as_array()?;
            let converted: Option<Vec<Value>> =
                items.iter().map(|item| convert_scalar(item, *kind)).collect();
            Some(Value::Array(converted?))
        }
        TypeDesc::Struct(fields) => {
            let obj = src.as_object()?;
            let mut out = Map::new();
            for (name, sub) in fields {
                let field_src = obj.get(name)?;
                out.insert(name.clone(), convert_body(field_src, sub)?);
            }
            Some(Value::Object(out))
        }
    }
}

fn convert_scalar(src: &Value, kind: ScalarKind) -> Option<Value> {
    match kind {
        ScalarKind::Bool => src.as_bool().map(|b| json!(b)),
        ScalarKind::String => src.as_str().map(|s| json!(s)),
        ScalarKind::Float32 | ScalarKind::Float64 => src.as_f64().map(|f| json!(f)),
        ScalarKind::Int8 => signed_in_range(src, i8::MIN as i64, i8::MAX as i64),
        ScalarKind::Int16 => signed_in_range(src, i16::MIN as i64, i16::MAX as i64),
        ScalarKind::Int32 => signed_in_range(src, i32::MIN as i64, i32::MAX as i64),
        ScalarKind::Int64 => signed_in_range(src, i64::MIN, i64::MAX),
        ScalarKind::UInt8 => unsigned_in_range(src, u8::MAX as u64),
        ScalarKind::UInt16 => unsigned_in_range(src, u16::MAX as u64),
        ScalarKind::UInt32 => unsigned_in_range(src, u32::MAX as u64),
        ScalarKind::UInt64 => unsigned_in_range(src, u64::MAX),
    }
}

fn signed_in_range(src: &Value, min: i64, max: i64) -> Option<Value> {
    let i = integral_i64(src)?;
    (i >= min && i <= max).then(|| json!(i))
}

fn unsigned_in_range(src: &Value, max: u64) -> Option<Value> {
    let u = integral_u64(src)?;
    (u <= max).then(|| json!(u))
}
