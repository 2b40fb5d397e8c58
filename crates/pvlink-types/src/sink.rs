//! Notification sink seam toward the engine.
//!
//! Bindings and server variables forward every converted delivery to an
//! [`UpdateSink`]. The engine installs its own implementation; tests use
//! [`RecordingSink`]. Sinks are invoked from wire-library delivery
//! threads and must be cheap and non-blocking.

use crate::value::TypedValue;
use parking_lot::Mutex;
use std::sync::Arc;

/// Receives converted value updates from a binding or server variable.
pub trait UpdateSink: Send + Sync {
    /// Called on every delivery, including connect/disconnect
    /// transitions. `source` is the channel/record name; `value` is the
    /// converted value (possibly empty when conversion failed).
    fn value_changed(&self, source: &str, value: &TypedValue, connected: bool);
}

/// Sink that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl UpdateSink for NullSink {
    fn value_changed(&self, _source: &str, _value: &TypedValue, _connected: bool) {}
}

/// One recorded sink notification.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkEvent {
    pub source: String,
    pub value: TypedValue,
    pub connected: bool,
}

/// Test sink recording every notification in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of all events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    /// Number of events recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UpdateSink for RecordingSink {
    fn value_changed(&self, source: &str, value: &TypedValue, connected: bool) {
        self.events.lock().push(SinkEvent {
            source: source.to_string(),
            value: value.clone(),
            connected,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desc::{ScalarKind, TypeDesc};
    use serde_json::json;

    #[test]
    fn recording_sink_keeps_order() {
        let sink = RecordingSink::new();
        let v = TypedValue::new(TypeDesc::Scalar(ScalarKind::UInt32), json!(1)).unwrap();
        sink.value_changed("a", &v, true);
        sink.value_changed("b", &TypedValue::empty(), false);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].source, "a");
        assert!(events[0].connected);
        assert_eq!(events[1].source, "b");
        assert!(events[1].value.is_empty());
    }

    #[test]
    fn null_sink_discards() {
        let v = TypedValue::empty();
        NullSink.value_changed("x", &v, false);
    }
}
