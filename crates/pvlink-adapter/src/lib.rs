//! Engine-facing adapters for PVLink.
//!
//! This crate is the boundary between a procedure-execution engine and
//! the PVLink protocol layer. It provides two adapter families plus the
//! plumbing the engine needs to drive them:
//!
//! - **Instructions** ([`Instruction`]): one-shot polling operations
//!   with an `init` / `execute` / `halt` / `reset` lifecycle —
//!   [`ReadOp`], [`WriteOp`] and [`RpcOp`].
//! - **Variables** ([`EngineVariable`]): procedure-lifetime bindings —
//!   [`ClientVariable`], [`MonitorVariable`] and [`ServerVariable`].
//!
//! Adapters are configured through flat string attributes
//! ([`AdapterConfig`]), resolved by kind name through the explicit
//! [`AdapterRegistry`], and reach engine state only through the
//! [`VariableStore`] and [`UpdateSink`] seams of [`AdapterContext`].
//!
//! # Threading Contract
//!
//! `execute` runs on the engine's single scheduler thread and never
//! blocks; `halt` may arrive from any thread. Value deliveries and sink
//! notifications run on protocol-library threads.

mod config;
mod context;
mod ops;
mod registry;
pub mod testing;
mod vars;

pub use config::{AdapterConfig, SetupError};
pub use context::{AdapterContext, VariableStore};
pub use ops::{Instruction, ReadOp, RpcOp, WriteOp};
pub use registry::{AdapterRegistry, InstructionFactory, VariableFactory};
pub use vars::{ClientVariable, EngineVariable, MonitorVariable, ServerVariable};

pub use pvlink_types::{NullSink, RecordingSink, SinkEvent, UpdateSink};
