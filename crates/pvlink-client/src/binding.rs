//! One live client connection to a remote variable.
//!
//! A [`ChannelBinding`] presents a synchronous snapshot view over an
//! asynchronously-updated cache. The wire library's delivery thread
//! writes the cache through the binding's observer; any thread may read
//! it through [`snapshot`](ChannelBinding::snapshot).
//!
//! # Ownership
//!
//! The observer owns clones of the declared type, the channel name and
//! the shared cache. Nothing it touches can be torn down while the
//! connection is open, so delivery never races destruction.

use parking_lot::{Condvar, Mutex};
use pvlink_types::convert::{channel_type, convert_to_typed, extract_payload, pack_into_struct_if_scalar};
use pvlink_types::{ExtendedValue, TypeDesc, TypedValue, UpdateSink};
use pvlink_wire::{ChannelClient, ChannelConnection, ChannelObserver, ScalarCarrier, WireError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

struct CacheState {
    connected: bool,
    /// Converted result of the latest delivery. Empty when no delivery
    /// arrived yet or the latest delivery did not convert.
    last: TypedValue,
}

struct Shared {
    state: Mutex<CacheState>,
    cond: Condvar,
}

/// One live subscription to a remote channel, with a cached snapshot.
///
/// # Example
///
/// ```
/// use pvlink_client::ChannelBinding;
/// use pvlink_types::{ScalarKind, TypeDesc, TypedValue};
/// use pvlink_wire::{LoopbackHub, ScalarCarrier};
/// use serde_json::json;
/// use std::time::Duration;
///
/// let hub = LoopbackHub::new();
/// let client = hub.channel_client(ScalarCarrier::Bare);
/// let binding = ChannelBinding::open(
///     client.as_ref(),
///     "temp:water",
///     TypeDesc::Scalar(ScalarKind::Float64),
///     None,
/// )
/// .unwrap();
///
/// hub.push(
///     "temp:water",
///     TypedValue::new(TypeDesc::Scalar(ScalarKind::Float64), json!(21.5)).unwrap(),
/// );
/// assert!(binding.wait_valid_value(Duration::from_secs(2)));
/// let (value, connected) = binding.snapshot();
/// assert!(connected);
/// assert_eq!(value.body(), &json!(21.5));
/// ```
pub struct ChannelBinding {
    channel: String,
    declared: TypeDesc,
    carrier: ScalarCarrier,
    shared: Arc<Shared>,
    conn: Option<Box<dyn ChannelConnection>>,
}

impl std::fmt::Debug for ChannelBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBinding")
            .field("channel", &self.channel)
            .field("declared", &self.declared)
            .finish_non_exhaustive()
    }
}

impl ChannelBinding {
    /// Opens the underlying connection and installs the delivery
    /// observer. Every delivery is converted against `declared` before
    /// it reaches the cache and the optional `sink`.
    ///
    /// # Errors
    ///
    /// [`WireError::Rejected`] when `declared` has no usable wire type
    /// (a struct without a `value` field), or whatever the client
    /// reports for the attach itself.
    pub fn open(
        client: &dyn ChannelClient,
        channel: &str,
        declared: TypeDesc,
        sink: Option<Arc<dyn UpdateSink>>,
    ) -> Result<Self, WireError> {
        let wire_type = channel_type(&declared);
        if wire_type.is_empty() {
            return Err(WireError::Rejected {
                reason: format!(
                    "declared type '{declared}' has no usable wire type for channel '{channel}'"
                ),
            });
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(CacheState {
                connected: false,
                last: TypedValue::empty(),
            }),
            cond: Condvar::new(),
        });

        let carrier = client.carrier();
        let observer: ChannelObserver = {
            let shared = Arc::clone(&shared);
            let declared = declared.clone();
            let channel = channel.to_string();
            let sink = sink.clone();
            Arc::new(move |update: &ExtendedValue| {
                let payload = match carrier {
                    ScalarCarrier::Struct => extract_payload(&update.value),
                    ScalarCarrier::Bare => update.value.clone(),
                };
                let received = ExtendedValue {
                    value: payload,
                    ..update.clone()
                };
                let converted = convert_to_typed(&received, &declared);
                if converted.is_empty() && update.connected {
                    warn!(
                        channel = %channel,
                        declared = %declared,
                        delivered = %update.value,
                        "delivered value does not convert to the declared type"
                    );
                }
                {
                    let mut state = shared.state.lock();
                    state.connected = update.connected;
                    state.last = converted.clone();
                    shared.cond.notify_all();
                }
                if let Some(sink) = &sink {
                    sink.value_changed(&channel, &converted, update.connected);
                }
            })
        };

        let conn = client.attach(channel, &wire_type, observer)?;
        debug!(channel, declared = %declared, "channel binding opened");

        Ok(Self {
            channel: channel.to_string(),
            declared,
            carrier,
            shared,
            conn: Some(conn),
        })
    }

    /// The bound channel name.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The declared type deliveries are converted to.
    #[must_use]
    pub fn declared(&self) -> &TypeDesc {
        &self.declared
    }

    /// Most recently delivered converted value and connection state.
    /// Never blocks.
    #[must_use]
    pub fn snapshot(&self) -> (TypedValue, bool) {
        let state = self.shared.state.lock();
        (state.last.clone(), state.connected)
    }

    /// Blocks until the channel connects. Returns `false` exactly on
    /// timeout expiry; never panics.
    ///
    /// For the strictly-synchronous one-shot adapters only; polling
    /// operations use [`snapshot`](Self::snapshot) instead.
    #[must_use]
    pub fn wait_connected(&self, timeout: Duration) -> bool {
        self.wait_for(timeout, |state| state.connected)
    }

    /// Blocks until a convertible value has been delivered. Returns
    /// `false` exactly on timeout expiry; never panics.
    #[must_use]
    pub fn wait_valid_value(&self, timeout: Duration) -> bool {
        self.wait_for(timeout, |state| !state.last.is_empty())
    }

    fn wait_for(&self, timeout: Duration, predicate: impl Fn(&CacheState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !predicate(&state) {
            if self.shared.cond.wait_until(&mut state, deadline).timed_out() {
                return predicate(&state);
            }
        }
        true
    }

    /// Writes a value. For struct-carrier clients the value is packed
    /// as `{"value": x}` first. Returns `false` when not connected; no
    /// acknowledgement wait beyond the underlying put.
    #[must_use]
    pub fn write(&self, value: &TypedValue) -> bool {
        let Some(conn) = &self.conn else {
            return false;
        };
        if !conn.connected() {
            return false;
        }
        let wire_value = match self.carrier {
            ScalarCarrier::Struct => pack_into_struct_if_scalar(value),
            ScalarCarrier::Bare => value.clone(),
        };
        conn.put(&wire_value)
    }

    /// Unsubscribes and releases the connection. Idempotent; `Drop`
    /// also closes.
    pub fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close();
            debug!(channel = %self.channel, "channel binding closed");
        }
    }
}

impl Drop for ChannelBinding {
    fn drop(&mut self) {
        self.close();
    }
}
