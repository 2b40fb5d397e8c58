//! Seams toward the real wire-protocol libraries.
//!
//! The PVLink core consumes the protocol libraries only through these
//! object-safe traits. Real implementations wrap the vendor client and
//! server stacks; tests and the demo binary use the in-process
//! [`LoopbackHub`](crate::LoopbackHub).
//!
//! # Threading Contract
//!
//! Observers and write listeners are invoked from a library-internal
//! delivery thread, never from the caller's thread. Implementations of
//! the consuming side must therefore guard any state shared with the
//! delivery path.

use crate::error::WireError;
use pvlink_types::{ExtendedValue, TypeDesc, TypedValue};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Per-client wire convention for bare values.
///
/// The legacy channel protocol delivers bare scalars/arrays; the
/// structured-value protocol always carries a struct with a `value`
/// field. The binding packs before writes and extracts after deliveries
/// when the carrier is `Struct`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarCarrier {
    Bare,
    Struct,
}

/// Callback invoked on every delivery for an attached channel.
pub type ChannelObserver = Arc<dyn Fn(&ExtendedValue) + Send + Sync>;

/// Client side of a wire protocol: attaches observers to named channels.
pub trait ChannelClient: Send + Sync {
    /// The wire convention this client speaks.
    fn carrier(&self) -> ScalarCarrier;

    /// Establishes a connection to `channel` and registers `observer`
    /// for every value delivery and connect/disconnect transition.
    ///
    /// # Errors
    ///
    /// Fails when the channel name is refused outright. An attachment
    /// to a name already bound by a different client instance is NOT an
    /// error: the underlying libraries silently ignore it (known
    /// limitation) and the observer simply never fires.
    fn attach(
        &self,
        channel: &str,
        wire_type: &TypeDesc,
        observer: ChannelObserver,
    ) -> Result<Box<dyn ChannelConnection>, WireError>;
}

/// One live connection to a remote channel.
pub trait ChannelConnection: Send + Sync {
    /// Writes a value. Returns `false` when disconnected or refused;
    /// never blocks beyond the underlying library's put.
    fn put(&self, value: &TypedValue) -> bool;

    /// Current connection state.
    fn connected(&self) -> bool;

    /// Releases the connection. Idempotent; `Drop` also closes.
    fn close(&mut self);
}

impl core::fmt::Debug for dyn ChannelConnection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChannelConnection")
            .field("connected", &self.connected())
            .finish()
    }
}

/// Listener for writes arriving from remote clients of a served record.
pub type WriteListener = Arc<dyn Fn(&str, &TypedValue) + Send + Sync>;

/// Server side of a wire protocol: owns one process resource per open.
pub trait ServerBackend: Send + Sync {
    /// Opens a fresh server handle. `on_write` is invoked on an
    /// internal thread for every remote write to any of the handle's
    /// records.
    fn open(&self, on_write: WriteListener) -> Result<Box<dyn ServerHandle>, WireError>;
}

/// One underlying protocol-server process resource.
pub trait ServerHandle: Send + Sync {
    /// Registers a served record. Returns `false` on a duplicate name.
    fn add_record(&self, name: &str, initial: &TypedValue) -> bool;

    /// Starts accepting connections. Idempotent.
    fn start(&self);

    /// Stops accepting connections. Idempotent.
    fn stop(&self);

    /// Whether the server is currently accepting connections.
    fn running(&self) -> bool;

    /// Reads a record's current value.
    fn get(&self, name: &str) -> Option<TypedValue>;

    /// Local update pushed to subscribers. Returns `false` when the
    /// name is unknown or the server is not running.
    fn post(&self, name: &str, value: &TypedValue) -> bool;
}

/// RPC side of a wire protocol: calls execute on a library-internal
/// worker and are observed through a non-blocking ticket.
pub trait RpcClient: Send + Sync {
    /// Issues a call. The `timeout` is passed through to the backend;
    /// the caller's own deadline still governs how long it polls.
    fn call(
        &self,
        service: &str,
        request: &TypedValue,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn RpcTicket>, WireError>;
}

/// Pending RPC reply.
///
/// Dropping the ticket abandons interest in the result; the worker runs
/// on regardless.
pub trait RpcTicket: Send {
    /// Non-blocking completion check. `None` while pending, `Some`
    /// exactly once when the reply (or wire failure) is available.
    fn poll(&mut self) -> Option<Result<TypedValue, WireError>>;

    /// Request id correlating log lines across threads.
    fn request_id(&self) -> Uuid;
}

impl core::fmt::Debug for dyn RpcTicket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RpcTicket")
            .field("request_id", &self.request_id())
            .finish()
    }
}
