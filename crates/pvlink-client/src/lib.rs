//! Client-role channel binding for PVLink.
//!
//! One [`ChannelBinding`] owns one live connection to one remote
//! variable: it caches the latest converted delivery for synchronous
//! snapshot reads, forwards every delivery to an optional
//! [`UpdateSink`](pvlink_types::UpdateSink), and offers blocking wait
//! helpers for the strictly-synchronous one-shot adapters.

mod binding;

pub use binding::ChannelBinding;
