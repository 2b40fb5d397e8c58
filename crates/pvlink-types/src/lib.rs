//! Core types for PVLink.
//!
//! This crate provides the value model, declared-type descriptors and
//! the typed-value conversion layer shared by every PVLink crate.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Adapter Layer                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  pvlink-adapter : instructions, engine variables, registry   │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Protocol Layer                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  pvlink-client  : channel binding (client role)              │
//! │  pvlink-server  : shared server + registry (server role)     │
//! │  pvlink-wire    : wire seams + loopback hub                  │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Type Layer                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  pvlink-types   : values, conversion, deadlines   ◄── HERE   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Value Model
//!
//! A [`TypedValue`] pairs a JSON payload with the [`TypeDesc`] it
//! conforms to. Declared types may be richer than the wire's native
//! type: struct types with a `value` field carry side-band metadata
//! (`connected`, `timestamp`, `status`, `severity`) synthesized from
//! each delivery.
//!
//! The [`convert`] module reconciles wire deliveries with declared
//! types; all conversion failure surfaces as [`TypedValue::empty`],
//! never as errors or panics.
//!
//! # Example
//!
//! ```
//! use pvlink_types::convert::convert_to_typed;
//! use pvlink_types::{ExtendedValue, TypeDesc, TypedValue};
//! use serde_json::json;
//!
//! let declared = TypeDesc::parse(&json!({
//!     "value": {"type": "uint32"},
//!     "connected": {"type": "bool"},
//! }))
//! .unwrap();
//!
//! let wire = TypedValue::new(
//!     TypeDesc::parse(&json!({"type": "uint32"})).unwrap(),
//!     json!(7),
//! )
//! .unwrap();
//!
//! let got = convert_to_typed(&ExtendedValue::connected(wire, 0), &declared);
//! assert_eq!(got.body(), &json!({"value": 7, "connected": true}));
//! ```

pub mod convert;
mod deadline;
mod desc;
mod error;
mod poll;
mod sink;
mod value;

pub use deadline::Deadline;
pub use desc::{
    ScalarKind, TypeDesc, FIELD_CONNECTED, FIELD_SEVERITY, FIELD_STATUS, FIELD_TIMESTAMP,
    FIELD_VALUE,
};
pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use poll::PollResult;
pub use sink::{NullSink, RecordingSink, SinkEvent, UpdateSink};
pub use value::{conforms, ExtendedValue, TypedValue, ValueError};
