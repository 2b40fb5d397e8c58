//! End-to-end adapter scenarios over the in-process loopback hub.

use std::sync::Arc;
use std::time::{Duration, Instant};

use pvlink_adapter::{
    AdapterConfig, AdapterContext, AdapterRegistry, EngineVariable, Instruction, NullSink,
    RecordingSink,
};
use pvlink_adapter::testing::MemoryStore;
use pvlink_server::{ScopeId, SharedServerRegistry};
use pvlink_types::{PollResult, ScalarKind, TypeDesc, TypedValue};
use pvlink_wire::{LoopbackHub, ScalarCarrier};

struct Rig {
    hub: LoopbackHub,
    registry: AdapterRegistry,
    servers: Arc<SharedServerRegistry>,
    scope: ScopeId,
    sink: Arc<RecordingSink>,
}

fn rig() -> Rig {
    let hub = LoopbackHub::new();
    let servers = Arc::new(SharedServerRegistry::new(hub.server_backend()));
    let scope = ScopeId::new("procedure-1");
    let sink = RecordingSink::new();
    let registry = AdapterRegistry::standard(
        hub.channel_client(ScalarCarrier::Bare),
        hub.channel_client(ScalarCarrier::Struct),
        hub.rpc_client(),
        Arc::clone(&servers),
        scope.clone(),
        sink.clone(),
    );
    Rig {
        hub,
        registry,
        servers,
        scope,
        sink,
    }
}

fn ctx(store: MemoryStore) -> AdapterContext {
    AdapterContext::new(Arc::new(store), Arc::new(NullSink))
}

fn drive(op: &mut dyn Instruction, ctx: &AdapterContext) -> PollResult {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match op.execute(ctx) {
            PollResult::Running => {
                assert!(Instant::now() < deadline, "instruction never settled");
                std::thread::sleep(Duration::from_millis(2));
            }
            terminal => return terminal,
        }
    }
}

fn wait_until(predicate: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !predicate() {
        assert!(Instant::now() < deadline, "condition never became true");
        std::thread::sleep(Duration::from_millis(2));
    }
}

fn uint(n: u64) -> TypedValue {
    TypedValue::new(TypeDesc::Scalar(ScalarKind::UInt64), serde_json::json!(n)).unwrap()
}

// A read against a channel nobody serves must fail after its timeout,
// not hang and not panic.
#[test]
fn read_from_absent_channel_times_out() {
    let rig = rig();
    let ctx = ctx(MemoryStore::new());
    let config = AdapterConfig::new()
        .with("channel", "nobody:serves:this")
        .with("type", "bool")
        .with("timeout", "0.1");
    let mut op = rig.registry.make_instruction("channel-read", config).unwrap();
    op.init(&ctx).unwrap();

    let started = Instant::now();
    assert_eq!(drive(op.as_mut(), &ctx), PollResult::Failure);
    assert!(started.elapsed() >= Duration::from_millis(100));
}

// A metadata-aware variable keeps the last value across a disconnect
// and reports the transition through its connected field.
#[test]
fn metadata_variable_degrades_on_disconnect() {
    let rig = rig();
    let config = AdapterConfig::new()
        .with("channel", "temp:water")
        .with(
            "type",
            r#"{"value": {"type": "uint64"}, "connected": {"type": "bool"}}"#,
        );
    let mut var = rig
        .registry
        .make_variable("channel-variable", config)
        .unwrap();
    var.setup().unwrap();

    rig.hub.push("temp:water", uint(7));
    wait_until(|| var.get_value().field("connected") == Some(&serde_json::json!(true)));
    assert_eq!(var.get_value().field("value"), Some(&serde_json::json!(7)));

    rig.hub.sever("temp:water");
    wait_until(|| var.get_value().field("connected") == Some(&serde_json::json!(false)));
    // The last delivered value survives the disconnect.
    assert_eq!(var.get_value().field("value"), Some(&serde_json::json!(7)));
    assert!(!var.is_available());

    rig.hub.restore("temp:water");
    wait_until(|| var.is_available());
    assert!(!rig.sink.is_empty());
}

// All server variables of one scope serve from a single shared server,
// and a remote write lands in the served value and the update sink.
#[test]
fn scope_serves_records_and_accepts_remote_writes() {
    let rig = rig();
    let mut vars = Vec::new();
    for (record, initial) in [("ctl:mode", "1"), ("ctl:rate", "2")] {
        let config = AdapterConfig::new()
            .with("channel", record)
            .with("type", "uint64")
            .with("value", initial);
        let mut var = rig
            .registry
            .make_variable("server-variable", config)
            .unwrap();
        var.setup().unwrap();
        assert!(!var.is_available());
        vars.push(var);
    }
    assert_eq!(rig.servers.get_server(&rig.scope).len(), 2);
    rig.servers.setup(&rig.scope).unwrap();
    assert!(vars.iter().all(|v| v.is_available()));

    // A remote client writes into the served record.
    let ctx = ctx(MemoryStore::new());
    let config = AdapterConfig::new()
        .with("channel", "ctl:mode")
        .with("type", "uint64")
        .with("value", "3");
    let mut write = rig
        .registry
        .make_instruction("channel-write", config)
        .unwrap();
    write.init(&ctx).unwrap();
    assert_eq!(drive(write.as_mut(), &ctx), PollResult::Success);

    let server = rig.servers.get_server(&rig.scope);
    wait_until(|| server.get_value("ctl:mode") == uint(3));
    wait_until(|| {
        rig.sink
            .events()
            .iter()
            .any(|e| e.source == "ctl:mode" && e.value == uint(3))
    });

    rig.servers.teardown(&rig.scope).unwrap();
    assert!(!rig.servers.contains(&rig.scope));
}

// Structured-value protocol: scalars travel packed in a struct on the
// wire but stay bare at the adapter surface.
#[test]
fn struct_carrier_round_trip() {
    let rig = rig();
    let ctx = ctx(MemoryStore::new().with(
        "level",
        TypedValue::new(TypeDesc::Scalar(ScalarKind::Float64), serde_json::json!(0.0)).unwrap(),
    ));

    // Seed the channel so the writer finds it connected.
    rig.hub.push(
        "pv:level",
        TypedValue::new(
            TypeDesc::Struct(vec![(
                "value".into(),
                TypeDesc::Scalar(ScalarKind::Float64),
            )]),
            serde_json::json!({ "value": 0.0 }),
        )
        .unwrap(),
    );

    let config = AdapterConfig::new()
        .with("channel", "pv:level")
        .with("type", "float64")
        .with("value", "3.5");
    let mut write = rig.registry.make_instruction("pv-write", config).unwrap();
    write.init(&ctx).unwrap();
    assert_eq!(drive(write.as_mut(), &ctx), PollResult::Success);

    // On the wire the scalar is packed.
    let on_wire = rig.hub.value_of("pv:level").unwrap();
    assert_eq!(on_wire.field("value"), Some(&serde_json::json!(3.5)));

    // Reading back through the struct carrier unpacks it again.
    let config = AdapterConfig::new()
        .with("channel", "pv:level")
        .with("outputVar", "level");
    let mut read = rig.registry.make_instruction("pv-read", config).unwrap();
    read.init(&ctx).unwrap();
    assert_eq!(drive(read.as_mut(), &ctx), PollResult::Success);
    let level = ctx.variables.fetch("level").unwrap();
    assert_eq!(level.body(), &serde_json::json!(3.5));
}

// An RPC call resolves through init/execute polling with the reply
// stored into the output variable.
#[test]
fn rpc_call_round_trip() {
    let rig = rig();
    let reply_ty = TypeDesc::Struct(vec![
        ("result".into(), TypeDesc::Scalar(ScalarKind::Int64)),
        ("sum".into(), TypeDesc::Scalar(ScalarKind::UInt64)),
    ]);
    let seed = TypedValue::new(
        reply_ty.clone(),
        serde_json::json!({ "result": 0, "sum": 0 }),
    )
    .unwrap();
    rig.hub.register_service(
        "math:sum",
        Arc::new(move |request: &TypedValue| {
            let a = request
                .field("a")
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(|| "missing 'a'".to_string())?;
            let b = request
                .field("b")
                .and_then(serde_json::Value::as_u64)
                .ok_or_else(|| "missing 'b'".to_string())?;
            TypedValue::new(
                reply_ty.clone(),
                serde_json::json!({ "result": 0, "sum": a + b }),
            )
            .map_err(|e| e.to_string())
        }),
    );

    let ctx = ctx(MemoryStore::new().with("reply", seed));
    let config = AdapterConfig::new()
        .with("service", "math:sum")
        .with("type", r#"{"a": {"type": "uint64"}, "b": {"type": "uint64"}}"#)
        .with("value", r#"{"a": 19, "b": 23}"#)
        .with("outputVar", "reply")
        .with("timeout", "5");
    let mut op = rig.registry.make_instruction("rpc-call", config).unwrap();
    op.init(&ctx).unwrap();

    assert_eq!(drive(op.as_mut(), &ctx), PollResult::Success);
    let reply = ctx.variables.fetch("reply").unwrap();
    assert_eq!(reply.field("sum"), Some(&serde_json::json!(42)));
}
