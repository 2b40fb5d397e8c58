//! Polling instruction adapters.
//!
//! Instructions follow a strict lifecycle driven by the hosting engine:
//!
//! ```text
//!   init ──ok──▶ execute ──Running──▶ execute ── ... ──▶ Success/Failure
//!     │                                                        │
//!     └──Err(SetupError)                    reset ◀────────────┘
//! ```
//!
//! `execute` is called from a single scheduler thread and must never
//! block. After a terminal result the instruction latches: further
//! `execute` calls return the same result until `reset`. `halt` may be
//! called from any thread and forces the next `execute` to return
//! `Failure`, releasing wire resources immediately.
//!
//! In-loop failures (timeouts, refused writes, rejected replies) are
//! logged with `tracing::warn!` and reported as `PollResult::Failure`;
//! errors are reserved for `init`.

mod read;
mod rpc;
mod write;

pub use read::ReadOp;
pub use rpc::RpcOp;
pub use write::WriteOp;

use crate::config::SetupError;
use crate::context::AdapterContext;
use pvlink_types::PollResult;

/// One engine-driven polling instruction.
pub trait Instruction: Send {
    /// Adapter kind name, used in log lines and error prefixes.
    fn name(&self) -> &str;

    /// Parses configuration and acquires wire resources.
    ///
    /// # Errors
    ///
    /// Any [`SetupError`]; the instruction must not be executed after a
    /// failed init.
    fn init(&mut self, ctx: &AdapterContext) -> Result<(), SetupError>;

    /// One non-blocking poll step.
    fn execute(&mut self, ctx: &AdapterContext) -> PollResult;

    /// Aborts from any thread. The next `execute` returns `Failure`.
    fn halt(&self);

    /// Returns to the uninitialized state, releasing all resources.
    fn reset(&mut self);
}

impl std::fmt::Debug for dyn Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instruction").field("name", &self.name()).finish()
    }
}
