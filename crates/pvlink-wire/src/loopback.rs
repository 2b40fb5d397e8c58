//! In-process loopback implementation of the wire seams.
//!
//! [`LoopbackHub`] stands in for the real protocol libraries: one
//! process-local map of named cells serves the channel-client, server
//! and RPC roles at once. Tests and the demo binary drive every adapter
//! scenario through it without any network.
//!
//! # Delivery Model
//!
//! Observers and write listeners are never invoked on the caller's
//! thread. A dedicated named drain thread forwards deliveries from a
//! bounded channel, reproducing the "library-internal delivery thread"
//! contract of the real stacks.
//!
//! # Known Limitation (reproduced deliberately)
//!
//! Attaching a channel name that already has a live attachment from a
//! different binding is silently ignored, exactly like the real legacy
//! client library: the second observer simply never fires. The hub logs
//! the ignored attach at debug level.

use crate::error::WireError;
use crate::traits::{
    ChannelClient, ChannelConnection, ChannelObserver, RpcClient, RpcTicket, ScalarCarrier,
    ServerBackend, ServerHandle, WriteListener,
};
use parking_lot::Mutex;
use pvlink_types::{ExtendedValue, TypeDesc, TypedValue};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

/// Handler installed for a loopback RPC service.
///
/// The returned `Err` string becomes a [`WireError::Rejected`] reply.
pub type ServiceHandler = Arc<dyn Fn(&TypedValue) -> Result<TypedValue, String> + Send + Sync>;

/// Work item for the drain thread.
enum Delivery {
    Update {
        observer: ChannelObserver,
        update: ExtendedValue,
    },
    Write {
        listener: WriteListener,
        name: String,
        value: TypedValue,
    },
}

/// Server-side hookup of a served record cell.
struct ServerSlot {
    on_write: WriteListener,
    running: Arc<AtomicBool>,
}

/// One named cell: the hub's view of a channel / served record.
struct Cell {
    /// A value has been pushed or a record added; attachments to a cell
    /// that never becomes present never connect.
    present: bool,
    /// Connection loss (test hook) or a stopped server.
    severed: bool,
    value: TypedValue,
    status: i16,
    severity: i16,
    observer: Option<ChannelObserver>,
    server: Option<ServerSlot>,
}

impl Cell {
    fn new() -> Self {
        Self {
            present: false,
            severed: false,
            value: TypedValue::empty(),
            status: 0,
            severity: 0,
            observer: None,
            server: None,
        }
    }

    fn reachable(&self) -> bool {
        self.present && !self.severed
    }

    fn update(&self, connected: bool) -> ExtendedValue {
        ExtendedValue {
            value: self.value.clone(),
            connected,
            timestamp: now_ns(),
            status: self.status,
            severity: self.severity,
        }
    }
}

fn now_ns() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .map_or(0, |n| n as u64)
}

struct HubInner {
    cells: Mutex<HashMap<String, Cell>>,
    services: Mutex<HashMap<String, ServiceHandler>>,
    drain: SyncSender<Delivery>,
}

impl HubInner {
    /// Hands a delivery to the drain thread. Callers must not hold the
    /// cells lock: the send blocks when the drain queue is full.
    fn deliver(&self, delivery: Delivery) {
        if self.drain.send(delivery).is_err() {
            warn!("loopback drain thread gone, delivery dropped");
        }
    }

    fn deliver_all(&self, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            self.deliver(delivery);
        }
    }
}

/// In-memory hub implementing all three wire roles.
///
/// Cloning shares the underlying cell map.
///
/// # Example
///
/// ```
/// use pvlink_types::{ScalarKind, TypeDesc, TypedValue};
/// use pvlink_wire::{LoopbackHub, ScalarCarrier};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let hub = LoopbackHub::new();
/// let client = hub.channel_client(ScalarCarrier::Bare);
///
/// let conn = client
///     .attach(
///         "temp:water",
///         &TypeDesc::Scalar(ScalarKind::Float64),
///         Arc::new(|_update| {}),
///     )
///     .unwrap();
/// assert!(!conn.connected());
///
/// hub.push(
///     "temp:water",
///     TypedValue::new(TypeDesc::Scalar(ScalarKind::Float64), json!(21.5)).unwrap(),
/// );
/// assert!(conn.connected());
/// ```
#[derive(Clone)]
pub struct LoopbackHub {
    inner: Arc<HubInner>,
}

impl LoopbackHub {
    /// Capacity of the drain queue. Deliveries beyond it apply
    /// backpressure to the pushing side.
    const DRAIN_CAPACITY: usize = 256;

    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = std::sync::mpsc::sync_channel::<Delivery>(Self::DRAIN_CAPACITY);

        std::thread::Builder::new()
            .name("pvlink-hub-drain".into())
            .spawn(move || {
                while let Ok(delivery) = rx.recv() {
                    match delivery {
                        Delivery::Update { observer, update } => observer(&update),
                        Delivery::Write {
                            listener,
                            name,
                            value,
                        } => listener(&name, &value),
                    }
                }
            })
            .expect("failed to spawn loopback drain thread");

        Self {
            inner: Arc::new(HubInner {
                cells: Mutex::new(HashMap::new()),
                services: Mutex::new(HashMap::new()),
                drain: tx,
            }),
        }
    }

    /// A channel client speaking the given wire convention.
    #[must_use]
    pub fn channel_client(&self, carrier: ScalarCarrier) -> Arc<dyn ChannelClient> {
        Arc::new(LoopbackChannelClient {
            inner: Arc::clone(&self.inner),
            carrier,
        })
    }

    /// The server backend role of this hub.
    #[must_use]
    pub fn server_backend(&self) -> Arc<dyn ServerBackend> {
        Arc::new(LoopbackServerBackend {
            inner: Arc::clone(&self.inner),
        })
    }

    /// The RPC client role of this hub.
    #[must_use]
    pub fn rpc_client(&self) -> Arc<dyn RpcClient> {
        Arc::new(LoopbackRpcClient {
            inner: Arc::clone(&self.inner),
        })
    }

    // === Test hooks ===

    /// Simulates a remote update of `channel`. The channel becomes
    /// present (connected) if it was not. Writes to a served record are
    /// routed through the owning server's write listener as well.
    pub fn push(&self, channel: &str, value: TypedValue) {
        let mut deliveries = Vec::new();
        {
            let mut cells = self.inner.cells.lock();
            let cell = cells.entry(channel.to_string()).or_insert_with(Cell::new);
            cell.present = true;
            cell.value = value.clone();
            if !cell.severed {
                if let Some(observer) = &cell.observer {
                    deliveries.push(Delivery::Update {
                        observer: Arc::clone(observer),
                        update: cell.update(true),
                    });
                }
                if let Some(server) = &cell.server {
                    if server.running.load(Ordering::SeqCst) {
                        deliveries.push(Delivery::Write {
                            listener: Arc::clone(&server.on_write),
                            name: channel.to_string(),
                            value,
                        });
                    }
                }
            }
        }
        self.inner.deliver_all(deliveries);
    }

    /// Simulates connection loss. Observers receive a disconnect
    /// transition carrying the last-known value.
    pub fn sever(&self, channel: &str) {
        let mut deliveries = Vec::new();
        {
            let mut cells = self.inner.cells.lock();
            let cell = cells.entry(channel.to_string()).or_insert_with(Cell::new);
            if cell.severed {
                return;
            }
            cell.severed = true;
            if let Some(observer) = &cell.observer {
                deliveries.push(Delivery::Update {
                    observer: Arc::clone(observer),
                    update: cell.update(false),
                });
            }
        }
        self.inner.deliver_all(deliveries);
    }

    /// Undoes [`sever`](Self::sever). Observers receive a reconnect
    /// transition with the last-known value when one exists.
    pub fn restore(&self, channel: &str) {
        let mut deliveries = Vec::new();
        {
            let mut cells = self.inner.cells.lock();
            let Some(cell) = cells.get_mut(channel) else {
                return;
            };
            if !cell.severed {
                return;
            }
            cell.severed = false;
            if cell.present {
                if let Some(observer) = &cell.observer {
                    deliveries.push(Delivery::Update {
                        observer: Arc::clone(observer),
                        update: cell.update(true),
                    });
                }
            }
        }
        self.inner.deliver_all(deliveries);
    }

    /// Installs an RPC handler for `service`.
    pub fn register_service(&self, service: &str, handler: ServiceHandler) {
        self.inner
            .services
            .lock()
            .insert(service.to_string(), handler);
    }

    /// Current value of a cell, for test assertions.
    #[must_use]
    pub fn value_of(&self, channel: &str) -> Option<TypedValue> {
        let cells = self.inner.cells.lock();
        cells
            .get(channel)
            .filter(|c| c.present)
            .map(|c| c.value.clone())
    }
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new()
    }
}

// === Channel client role ===

struct LoopbackChannelClient {
    inner: Arc<HubInner>,
    carrier: ScalarCarrier,
}

impl ChannelClient for LoopbackChannelClient {
    fn carrier(&self) -> ScalarCarrier {
        self.carrier
    }

    fn attach(
        &self,
        channel: &str,
        wire_type: &TypeDesc,
        observer: ChannelObserver,
    ) -> Result<Box<dyn ChannelConnection>, WireError> {
        if wire_type.is_empty() {
            return Err(WireError::Rejected {
                reason: format!("channel '{channel}' attached with the empty wire type"),
            });
        }

        let attached;
        let mut initial = None;
        {
            let mut cells = self.inner.cells.lock();
            let cell = cells.entry(channel.to_string()).or_insert_with(Cell::new);
            if cell.observer.is_some() {
                // Known limitation of the real client library, reproduced:
                // the second attachment never fires.
                debug!(channel, "channel already attached by another binding, ignoring");
                attached = false;
            } else {
                cell.observer = Some(Arc::clone(&observer));
                attached = true;
                if cell.reachable() {
                    initial = Some(Delivery::Update {
                        observer,
                        update: cell.update(true),
                    });
                }
            }
        }
        if let Some(delivery) = initial {
            self.inner.deliver(delivery);
        }

        Ok(Box::new(LoopbackConnection {
            inner: Arc::clone(&self.inner),
            channel: channel.to_string(),
            attached,
            closed: false,
        }))
    }
}

struct LoopbackConnection {
    inner: Arc<HubInner>,
    channel: String,
    /// False when this attach was ignored in favor of an earlier one.
    attached: bool,
    closed: bool,
}

impl ChannelConnection for LoopbackConnection {
    fn put(&self, value: &TypedValue) -> bool {
        if !self.attached || self.closed {
            return false;
        }
        let mut deliveries = Vec::new();
        {
            let mut cells = self.inner.cells.lock();
            let Some(cell) = cells.get_mut(&self.channel) else {
                return false;
            };
            if !cell.reachable() {
                return false;
            }
            if let Some(server) = &cell.server {
                if !server.running.load(Ordering::SeqCst) {
                    return false;
                }
            }
            cell.value = value.clone();
            if let Some(observer) = &cell.observer {
                deliveries.push(Delivery::Update {
                    observer: Arc::clone(observer),
                    update: cell.update(true),
                });
            }
            if let Some(server) = &cell.server {
                deliveries.push(Delivery::Write {
                    listener: Arc::clone(&server.on_write),
                    name: self.channel.clone(),
                    value: value.clone(),
                });
            }
        }
        self.inner.deliver_all(deliveries);
        true
    }

    fn connected(&self) -> bool {
        if !self.attached || self.closed {
            return false;
        }
        let cells = self.inner.cells.lock();
        cells.get(&self.channel).is_some_and(Cell::reachable)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.attached {
            let mut cells = self.inner.cells.lock();
            if let Some(cell) = cells.get_mut(&self.channel) {
                cell.observer = None;
            }
        }
    }
}

impl Drop for LoopbackConnection {
    fn drop(&mut self) {
        self.close();
    }
}

// === Server role ===

struct LoopbackServerBackend {
    inner: Arc<HubInner>,
}

impl ServerBackend for LoopbackServerBackend {
    fn open(&self, on_write: WriteListener) -> Result<Box<dyn ServerHandle>, WireError> {
        Ok(Box::new(LoopbackServerHandle {
            inner: Arc::clone(&self.inner),
            on_write,
            running: Arc::new(AtomicBool::new(false)),
            records: Mutex::new(HashSet::new()),
        }))
    }
}

struct LoopbackServerHandle {
    inner: Arc<HubInner>,
    on_write: WriteListener,
    running: Arc<AtomicBool>,
    records: Mutex<HashSet<String>>,
}

impl ServerHandle for LoopbackServerHandle {
    fn add_record(&self, name: &str, initial: &TypedValue) -> bool {
        let running = self.running.load(Ordering::SeqCst);
        let mut initial_delivery = None;
        {
            let mut cells = self.inner.cells.lock();
            let cell = cells.entry(name.to_string()).or_insert_with(Cell::new);
            if cell.server.is_some() {
                return false;
            }
            cell.server = Some(ServerSlot {
                on_write: Arc::clone(&self.on_write),
                running: Arc::clone(&self.running),
            });
            cell.present = true;
            cell.value = initial.clone();
            // A record is only reachable while its server accepts
            // connections.
            cell.severed = !running;
            if running {
                if let Some(observer) = &cell.observer {
                    initial_delivery = Some(Delivery::Update {
                        observer: Arc::clone(observer),
                        update: cell.update(true),
                    });
                }
            }
        }
        self.records.lock().insert(name.to_string());
        if let Some(delivery) = initial_delivery {
            self.inner.deliver(delivery);
        }
        true
    }

    fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut deliveries = Vec::new();
        {
            let records = self.records.lock();
            let mut cells = self.inner.cells.lock();
            for name in records.iter() {
                if let Some(cell) = cells.get_mut(name) {
                    cell.severed = false;
                    if let Some(observer) = &cell.observer {
                        deliveries.push(Delivery::Update {
                            observer: Arc::clone(observer),
                            update: cell.update(true),
                        });
                    }
                }
            }
        }
        self.inner.deliver_all(deliveries);
    }

    fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut deliveries = Vec::new();
        {
            let records = self.records.lock();
            let mut cells = self.inner.cells.lock();
            for name in records.iter() {
                if let Some(cell) = cells.get_mut(name) {
                    cell.severed = true;
                    if let Some(observer) = &cell.observer {
                        deliveries.push(Delivery::Update {
                            observer: Arc::clone(observer),
                            update: cell.update(false),
                        });
                    }
                }
            }
        }
        self.inner.deliver_all(deliveries);
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn get(&self, name: &str) -> Option<TypedValue> {
        if !self.records.lock().contains(name) {
            return None;
        }
        let cells = self.inner.cells.lock();
        cells.get(name).map(|c| c.value.clone())
    }

    fn post(&self, name: &str, value: &TypedValue) -> bool {
        if !self.running() || !self.records.lock().contains(name) {
            return false;
        }
        let mut delivery = None;
        {
            let mut cells = self.inner.cells.lock();
            let Some(cell) = cells.get_mut(name) else {
                return false;
            };
            cell.value = value.clone();
            if let Some(observer) = &cell.observer {
                delivery = Some(Delivery::Update {
                    observer: Arc::clone(observer),
                    update: cell.update(true),
                });
            }
        }
        if let Some(delivery) = delivery {
            self.inner.deliver(delivery);
        }
        true
    }
}

impl Drop for LoopbackServerHandle {
    fn drop(&mut self) {
        self.stop();
        // Release the record slots so a rehydrated handle can re-add
        // them after a stop/start cycle.
        let records = self.records.lock();
        let mut cells = self.inner.cells.lock();
        for name in records.iter() {
            if let Some(cell) = cells.get_mut(name) {
                cell.server = None;
            }
        }
    }
}

// === RPC role ===

struct LoopbackRpcClient {
    inner: Arc<HubInner>,
}

impl RpcClient for LoopbackRpcClient {
    fn call(
        &self,
        service: &str,
        request: &TypedValue,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn RpcTicket>, WireError> {
        let handler = self
            .inner
            .services
            .lock()
            .get(service)
            .cloned()
            .ok_or_else(|| WireError::ServiceUnavailable {
                service: service.to_string(),
            })?;

        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        let request = request.clone();
        let service_name = service.to_string();

        std::thread::Builder::new()
            .name("pvlink-rpc-worker".into())
            .spawn(move || {
                debug!(request_id = %id, service = %service_name, "rpc worker running");
                let result = handler(&request).map_err(|reason| WireError::Rejected { reason });
                debug!(request_id = %id, ok = result.is_ok(), "rpc worker finished");
                // The caller may have abandoned the ticket; the reply
                // is then dropped here.
                let _ = tx.send(result);
            })
            .map_err(|e| WireError::Backend {
                message: format!("failed to spawn rpc worker: {e}"),
            })?;

        debug!(request_id = %id, service, ?timeout, "rpc call issued");
        Ok(Box::new(LoopbackRpcTicket { id, rx: Some(rx) }))
    }
}

struct LoopbackRpcTicket {
    id: Uuid,
    rx: Option<oneshot::Receiver<Result<TypedValue, WireError>>>,
}

impl RpcTicket for LoopbackRpcTicket {
    fn poll(&mut self) -> Option<Result<TypedValue, WireError>> {
        let rx = self.rx.as_mut()?;
        match rx.try_recv() {
            Ok(result) => {
                self.rx = None;
                Some(result)
            }
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                self.rx = None;
                Some(Err(WireError::Backend {
                    message: "rpc worker dropped its reply".into(),
                }))
            }
        }
    }

    fn request_id(&self) -> Uuid {
        self.id
    }
}
