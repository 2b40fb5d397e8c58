//! Long-lived variable adapters.
//!
//! A variable binds a procedure-scoped name to a remote channel or a
//! locally served record for the lifetime of a procedure run. Setup and
//! teardown bracket the run; `get_value` / `set_value` / `is_available`
//! are called freely in between and never block.

mod client;
mod server;

pub use client::{ClientVariable, MonitorVariable};
pub use server::ServerVariable;

use crate::config::SetupError;
use pvlink_types::TypedValue;

/// One procedure-lifetime variable adapter.
pub trait EngineVariable: Send {
    /// The bound channel or record name. Empty before setup.
    fn name(&self) -> &str;

    /// Parses configuration and binds the remote or served resource.
    ///
    /// # Errors
    ///
    /// Any [`SetupError`].
    fn setup(&mut self) -> Result<(), SetupError>;

    /// Latest known value; the distinguished empty value when none has
    /// arrived yet. Never blocks.
    fn get_value(&self) -> TypedValue;

    /// Writes through to the bound resource. Returns `false` when the
    /// variable is read-only, unbound or currently unavailable.
    fn set_value(&self, value: &TypedValue) -> bool;

    /// Whether the bound resource is currently reachable.
    fn is_available(&self) -> bool;

    /// Releases the binding. Idempotent.
    fn teardown(&mut self);
}
