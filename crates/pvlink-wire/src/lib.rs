//! Wire-protocol seams for PVLink.
//!
//! The core never talks to a protocol library directly: it consumes the
//! narrow traits in [`traits`] and reports failures as [`WireError`].
//! The [`LoopbackHub`] is the in-process implementation of all three
//! roles (channel client, server backend, RPC client) used by tests and
//! the demo binary.
//!
//! # Roles
//!
//! ```text
//! ChannelClient ──attach──► ChannelConnection   (client role)
//! ServerBackend ──open────► ServerHandle        (server role)
//! RpcClient ─────call─────► RpcTicket           (rpc role)
//! ```
//!
//! Observers, write listeners and RPC workers all run on
//! library-internal threads; see the module docs in [`traits`] for the
//! exact threading contract.

mod error;
mod loopback;
mod traits;

pub use error::WireError;
pub use loopback::{LoopbackHub, ServiceHandler};
pub use traits::{
    ChannelClient, ChannelConnection, ChannelObserver, RpcClient, RpcTicket, ScalarCarrier,
    ServerBackend, ServerHandle, WriteListener,
};
