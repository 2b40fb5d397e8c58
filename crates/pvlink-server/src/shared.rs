//! One shared protocol-server instance for a logical scope.
//!
//! Many independently-configured published variables within one scope
//! share a single underlying server process resource. The
//! [`SharedServer`] owns the handle lazily: it is created on first
//! variable registration (or on start), started exactly once, and torn
//! down on stop. Registered entries survive a stop; a later start
//! rehydrates them into a fresh handle.
//!
//! # Locking Discipline
//!
//! The entry map is guarded by one mutex shared with the backend's
//! write-listener thread. Handle calls that can fan deliveries back out
//! (`add_record` when running, `start`, `stop`, `post`) are made with
//! the mutex released, so the delivery path can never deadlock against
//! a registration in progress.

use parking_lot::Mutex;
use pvlink_types::TypedValue;
use pvlink_wire::{ServerBackend, ServerHandle, WriteListener};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Callback invoked when a remote client writes a registered record.
pub type ChangeListener = Arc<dyn Fn(&TypedValue) + Send + Sync>;

struct Entry {
    value: TypedValue,
    on_change: Option<ChangeListener>,
}

struct Inner {
    handle: Option<Arc<dyn ServerHandle>>,
    entries: HashMap<String, Entry>,
}

/// Shared protocol server multiplexing a scope's published variables.
pub struct SharedServer {
    backend: Arc<dyn ServerBackend>,
    inner: Arc<Mutex<Inner>>,
}

impl SharedServer {
    #[must_use]
    pub fn new(backend: Arc<dyn ServerBackend>) -> Self {
        Self {
            backend,
            inner: Arc::new(Mutex::new(Inner {
                handle: None,
                entries: HashMap::new(),
            })),
        }
    }

    /// The backend write listener: fans a remote write out to the
    /// matching entry's change callback by name lookup. Writes for
    /// unregistered names are dropped.
    ///
    /// Holds only a weak reference so the handle (which owns the
    /// listener) never keeps its server alive.
    fn write_listener(inner: &Arc<Mutex<Inner>>) -> WriteListener {
        let weak: Weak<Mutex<Inner>> = Arc::downgrade(inner);
        Arc::new(move |name: &str, value: &TypedValue| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let on_change = {
                let mut guard = inner.lock();
                match guard.entries.get_mut(name) {
                    Some(entry) => {
                        entry.value = value.clone();
                        entry.on_change.clone()
                    }
                    None => {
                        debug!(record = name, "write for unregistered record dropped");
                        return;
                    }
                }
            };
            // Callback runs outside the lock.
            if let Some(on_change) = on_change {
                on_change(value);
            }
        })
    }

    fn open_handle(&self, inner: &mut Inner) -> bool {
        if inner.handle.is_some() {
            return true;
        }
        match self.backend.open(Self::write_listener(&self.inner)) {
            Ok(handle) => {
                inner.handle = Some(Arc::from(handle));
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to open server handle");
                false
            }
        }
    }

    /// Registers a published variable. Lazy-creates the underlying
    /// handle on first registration but does NOT start it. Returns
    /// `false` on a duplicate name or a backend refusal.
    pub fn add_variable(
        &self,
        name: &str,
        initial: TypedValue,
        on_change: Option<ChangeListener>,
    ) -> bool {
        let handle = {
            let mut guard = self.inner.lock();
            if guard.entries.contains_key(name) {
                return false;
            }
            if !self.open_handle(&mut guard) {
                return false;
            }
            guard.entries.insert(
                name.to_string(),
                Entry {
                    value: initial.clone(),
                    on_change,
                },
            );
            guard.handle.clone()
        };
        // Record registration outside the lock: when the server is
        // already running this delivers the initial value.
        let Some(handle) = handle else {
            return false;
        };
        if handle.add_record(name, &initial) {
            debug!(record = name, "server variable registered");
            true
        } else {
            warn!(record = name, "backend refused record registration");
            self.inner.lock().entries.remove(name);
            false
        }
    }

    /// Current value of a record. The empty value for unknown names.
    #[must_use]
    pub fn get_value(&self, name: &str) -> TypedValue {
        let (handle, cached) = {
            let guard = self.inner.lock();
            (
                guard.handle.clone(),
                guard.entries.get(name).map(|e| e.value.clone()),
            )
        };
        if let Some(handle) = handle {
            if let Some(value) = handle.get(name) {
                return value;
            }
        }
        cached.unwrap_or_else(TypedValue::empty)
    }

    /// Posts a local update to subscribers. Returns `false` when the
    /// server is not running or the name is unknown.
    #[must_use]
    pub fn set_value(&self, name: &str, value: &TypedValue) -> bool {
        let handle = {
            let guard = self.inner.lock();
            if !guard.entries.contains_key(name) {
                return false;
            }
            guard.handle.clone()
        };
        let Some(handle) = handle else {
            return false;
        };
        if !handle.post(name, value) {
            return false;
        }
        if let Some(entry) = self.inner.lock().entries.get_mut(name) {
            entry.value = value.clone();
        }
        true
    }

    /// Starts accepting connections. Idempotent. Creates the handle if
    /// needed and rehydrates all registered entries into it.
    pub fn start(&self) {
        let handle = {
            let mut guard = self.inner.lock();
            if !self.open_handle(&mut guard) {
                return;
            }
            let Some(handle) = guard.handle.clone() else {
                return;
            };
            if handle.running() {
                return;
            }
            for (name, entry) in &guard.entries {
                // Fresh handles after a stop need every record back;
                // duplicates on the original handle are refusals we
                // can ignore.
                let _ = handle.add_record(name, &entry.value);
            }
            handle
        };
        handle.start();
        debug!(records = self.len(), "shared server started");
    }

    /// Tears down the underlying handle. Idempotent. Entries remain
    /// registered; a later [`start`](Self::start) rehydrates them.
    pub fn stop(&self) {
        let handle = self.inner.lock().handle.take();
        if let Some(handle) = handle {
            handle.stop();
            debug!("shared server stopped");
        }
    }

    /// Whether the underlying handle is accepting connections.
    #[must_use]
    pub fn is_running(&self) -> bool {
        let guard = self.inner.lock();
        guard.handle.as_ref().is_some_and(|h| h.running())
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvlink_types::{ScalarKind, TypeDesc};
    use pvlink_wire::LoopbackHub;
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn uint32(v: u32) -> TypedValue {
        TypedValue::new(TypeDesc::Scalar(ScalarKind::UInt32), json!(v)).unwrap()
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn add_variable_is_lazy_and_rejects_duplicates() {
        let hub = LoopbackHub::new();
        let server = SharedServer::new(hub.server_backend());
        assert!(server.is_empty());

        assert!(server.add_variable("a", uint32(1), None));
        assert!(!server.add_variable("a", uint32(2), None));
        assert_eq!(server.len(), 1);
        // Handle created but not started.
        assert!(!server.is_running());
    }

    #[test]
    fn independent_values_per_record() {
        let hub = LoopbackHub::new();
        let server = SharedServer::new(hub.server_backend());
        server.add_variable("a", uint32(1), None);
        server.add_variable("b", uint32(2), None);
        server.start();

        assert!(server.set_value("a", &uint32(10)));
        assert!(server.set_value("b", &uint32(20)));
        assert_eq!(server.get_value("a"), uint32(10));
        assert_eq!(server.get_value("b"), uint32(20));
        assert!(server.get_value("missing").is_empty());
    }

    #[test]
    fn set_value_requires_running() {
        let hub = LoopbackHub::new();
        let server = SharedServer::new(hub.server_backend());
        server.add_variable("a", uint32(1), None);
        assert!(!server.set_value("a", &uint32(2)));

        server.start();
        assert!(server.set_value("a", &uint32(2)));
        assert!(!server.set_value("missing", &uint32(0)));

        server.stop();
        assert!(!server.set_value("a", &uint32(3)));
    }

    #[test]
    fn start_stop_idempotent_and_rehydrates() {
        let hub = LoopbackHub::new();
        let server = SharedServer::new(hub.server_backend());
        server.add_variable("a", uint32(1), None);

        server.start();
        server.start();
        assert!(server.is_running());
        assert!(server.set_value("a", &uint32(5)));

        server.stop();
        server.stop();
        assert!(!server.is_running());
        assert_eq!(server.len(), 1);

        // Entries survive the stop; a fresh handle serves them again
        // with the last value.
        server.start();
        assert!(server.is_running());
        assert_eq!(server.get_value("a"), uint32(5));
        assert!(server.set_value("a", &uint32(6)));
    }

    #[test]
    fn remote_write_fans_out_to_change_listener() {
        let hub = LoopbackHub::new();
        let server = SharedServer::new(hub.server_backend());
        let seen = Arc::new(Mutex::new(Vec::<TypedValue>::new()));
        let seen_clone = Arc::clone(&seen);
        server.add_variable(
            "a",
            uint32(1),
            Some(Arc::new(move |value| {
                seen_clone.lock().push(value.clone());
            })),
        );
        server.start();

        // A remote client write arrives through the hub.
        hub.push("a", uint32(42));
        assert!(wait_until(|| !seen.lock().is_empty()));
        assert_eq!(seen.lock()[0], uint32(42));
        assert_eq!(server.get_value("a"), uint32(42));
    }
}
