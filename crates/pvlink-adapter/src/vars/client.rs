//! Channel-backed variables.

use std::sync::Arc;

use pvlink_client::ChannelBinding;
use pvlink_types::{TypedValue, UpdateSink};
use pvlink_wire::ChannelClient;
use tracing::debug;

use crate::config::{AdapterConfig, SetupError};
use crate::vars::EngineVariable;

/// Read/write variable bound to a remote channel.
///
/// Attributes: `channel` and `type` (both required). Every delivery is
/// converted to the declared type and forwarded to the engine's update
/// sink; `get_value` returns the cached latest conversion.
pub struct ClientVariable {
    kind: String,
    client: Arc<dyn ChannelClient>,
    config: AdapterConfig,
    sink: Arc<dyn UpdateSink>,
    channel: String,
    binding: Option<ChannelBinding>,
}

impl ClientVariable {
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        client: Arc<dyn ChannelClient>,
        config: AdapterConfig,
        sink: Arc<dyn UpdateSink>,
    ) -> Self {
        Self {
            kind: kind.into(),
            client,
            config,
            sink,
            channel: String::new(),
            binding: None,
        }
    }
}

impl EngineVariable for ClientVariable {
    fn name(&self) -> &str {
        &self.channel
    }

    fn setup(&mut self) -> Result<(), SetupError> {
        let channel = self.config.require(&self.kind, "channel")?.to_string();
        let declared = self.config.type_desc(&self.kind, "type")?;
        let binding = ChannelBinding::open(
            self.client.as_ref(),
            &channel,
            declared,
            Some(Arc::clone(&self.sink)),
        )
        .map_err(|source| SetupError::ChannelOpen {
            adapter: self.kind.clone(),
            source,
        })?;
        debug!(variable = %self.kind, channel = %channel, "variable bound");
        self.channel = channel;
        self.binding = Some(binding);
        Ok(())
    }

    fn get_value(&self) -> TypedValue {
        self.binding
            .as_ref()
            .map_or_else(TypedValue::empty, |b| b.snapshot().0)
    }

    fn set_value(&self, value: &TypedValue) -> bool {
        self.binding.as_ref().is_some_and(|b| b.write(value))
    }

    fn is_available(&self) -> bool {
        self.binding.as_ref().is_some_and(|b| b.snapshot().1)
    }

    fn teardown(&mut self) {
        if self.binding.take().is_some() {
            debug!(variable = %self.kind, channel = %self.channel, "variable released");
        }
    }
}

/// Read-only variant of [`ClientVariable`].
///
/// Identical subscription behavior; every write attempt is refused.
pub struct MonitorVariable {
    inner: ClientVariable,
}

impl MonitorVariable {
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        client: Arc<dyn ChannelClient>,
        config: AdapterConfig,
        sink: Arc<dyn UpdateSink>,
    ) -> Self {
        Self {
            inner: ClientVariable::new(kind, client, config, sink),
        }
    }
}

impl EngineVariable for MonitorVariable {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn setup(&mut self) -> Result<(), SetupError> {
        self.inner.setup()
    }

    fn get_value(&self) -> TypedValue {
        self.inner.get_value()
    }

    fn set_value(&self, _value: &TypedValue) -> bool {
        false
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }

    fn teardown(&mut self) {
        self.inner.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvlink_types::{RecordingSink, ScalarKind, TypeDesc};
    use pvlink_wire::{LoopbackHub, ScalarCarrier};
    use std::time::{Duration, Instant};

    fn uint(n: u64) -> TypedValue {
        TypedValue::new(TypeDesc::Scalar(ScalarKind::UInt64), serde_json::json!(n)).unwrap()
    }

    fn wait_until(predicate: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !predicate() {
            assert!(Instant::now() < deadline, "condition never became true");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn bound_variable(hub: &LoopbackHub, channel: &str) -> (ClientVariable, Arc<RecordingSink>) {
        let sink = RecordingSink::new();
        let config = AdapterConfig::new()
            .with("channel", channel)
            .with("type", "uint64");
        let mut var = ClientVariable::new(
            "channel-variable",
            hub.channel_client(ScalarCarrier::Bare),
            config,
            sink.clone(),
        );
        var.setup().unwrap();
        (var, sink)
    }

    #[test]
    fn tracks_deliveries_and_forwards_to_the_sink() {
        let hub = LoopbackHub::new();
        let (var, sink) = bound_variable(&hub, "temp:oven");
        assert!(var.get_value().is_empty());
        assert!(!var.is_available());

        hub.push("temp:oven", uint(250));
        wait_until(|| var.is_available());
        wait_until(|| !sink.is_empty());
        assert_eq!(var.get_value(), uint(250));
        assert_eq!(var.name(), "temp:oven");
    }

    #[test]
    fn writes_through_once_connected() {
        let hub = LoopbackHub::new();
        let (var, _sink) = bound_variable(&hub, "setpoint:oven");
        // Not connected yet; writes are refused, not queued.
        assert!(!var.set_value(&uint(1)));

        hub.push("setpoint:oven", uint(0));
        wait_until(|| var.is_available());
        assert!(var.set_value(&uint(180)));
        wait_until(|| hub.value_of("setpoint:oven") == Some(uint(180)));
    }

    #[test]
    fn monitor_refuses_writes() {
        let hub = LoopbackHub::new();
        let sink = RecordingSink::new();
        let config = AdapterConfig::new()
            .with("channel", "ro:channel")
            .with("type", "uint64");
        let mut var = MonitorVariable::new(
            "monitor-variable",
            hub.channel_client(ScalarCarrier::Bare),
            config,
            sink,
        );
        var.setup().unwrap();
        hub.push("ro:channel", uint(5));
        wait_until(|| var.is_available());

        assert!(!var.set_value(&uint(6)));
        assert_eq!(hub.value_of("ro:channel"), Some(uint(5)));
        assert_eq!(var.get_value(), uint(5));
    }

    #[test]
    fn teardown_is_idempotent() {
        let hub = LoopbackHub::new();
        let (mut var, _sink) = bound_variable(&hub, "tmp");
        var.teardown();
        var.teardown();
        assert!(var.get_value().is_empty());
        assert!(!var.is_available());
        assert!(!var.set_value(&uint(1)));
    }
}
