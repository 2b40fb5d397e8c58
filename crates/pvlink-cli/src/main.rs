//! PVLink demo CLI.
//!
//! Drives the full adapter stack against the in-process loopback hub,
//! so every subcommand works without any external protocol
//! infrastructure. Useful for exploring adapter configuration and for
//! end-to-end testing of the crate stack.
//!
//! The hub lives and dies with the process: `read` therefore takes a
//! `--push` seed, and `rpc` calls the built-in `demo:add` service
//! unless another one is named.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use pvlink_adapter::testing::MemoryStore;
use pvlink_adapter::{
    AdapterConfig, AdapterContext, AdapterRegistry, EngineVariable, Instruction, NullSink,
    RecordingSink,
};
use pvlink_server::{ScopeId, SharedServerRegistry};
use pvlink_types::{PollResult, ScalarKind, TypeDesc, TypedValue};
use pvlink_wire::{LoopbackHub, ScalarCarrier};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// PVLink demo CLI - adapter stack over an in-process loopback hub
#[derive(Parser, Debug)]
#[command(name = "pvlink")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the registered adapter kinds
    Kinds,

    /// Read one value from a loopback channel
    Read {
        /// Channel name
        #[arg(long)]
        channel: String,

        /// Declared type: scalar name or JSON descriptor
        #[arg(long, default_value = "uint64")]
        ty: String,

        /// Seed the channel with this JSON value before reading
        #[arg(long)]
        push: Option<String>,

        /// Timeout in seconds
        #[arg(long, default_value = "1")]
        timeout: String,

        /// Use the structured-value protocol carrier
        #[arg(long)]
        pv: bool,
    },

    /// Write one value to a loopback channel
    Write {
        /// Channel name
        #[arg(long)]
        channel: String,

        /// Declared type: scalar name or JSON descriptor
        #[arg(long, default_value = "uint64")]
        ty: String,

        /// JSON value to write
        #[arg(long)]
        value: String,

        /// Timeout in seconds
        #[arg(long, default_value = "1")]
        timeout: String,

        /// Use the structured-value protocol carrier
        #[arg(long)]
        pv: bool,
    },

    /// Call an RPC service (the built-in `demo:add` sums `a` and `b`)
    Rpc {
        /// Service name
        #[arg(long, default_value = "demo:add")]
        service: String,

        /// Request type: JSON descriptor
        #[arg(long, default_value = r#"{"a": {"type": "uint64"}, "b": {"type": "uint64"}}"#)]
        ty: String,

        /// Request value: JSON
        #[arg(long, default_value = r#"{"a": 1, "b": 2}"#)]
        value: String,

        /// Timeout in seconds
        #[arg(long, default_value = "5")]
        timeout: String,
    },

    /// Scripted end-to-end walkthrough: serve, write, read, call
    Demo,
}

/// One loopback hub with the standard adapter set wired to it.
struct Rig {
    hub: LoopbackHub,
    registry: AdapterRegistry,
    servers: Arc<SharedServerRegistry>,
    scope: ScopeId,
    sink: Arc<RecordingSink>,
}

impl Rig {
    fn new() -> Self {
        let hub = LoopbackHub::new();
        let servers = Arc::new(SharedServerRegistry::new(hub.server_backend()));
        let scope = ScopeId::new("demo");
        let sink = RecordingSink::new();
        install_demo_service(&hub);
        let registry = AdapterRegistry::standard(
            hub.channel_client(ScalarCarrier::Bare),
            hub.channel_client(ScalarCarrier::Struct),
            hub.rpc_client(),
            Arc::clone(&servers),
            scope.clone(),
            sink.clone(),
        );
        Self {
            hub,
            registry,
            servers,
            scope,
            sink,
        }
    }

    /// Polls an instruction to its terminal result.
    fn drive(&self, op: &mut dyn Instruction, ctx: &AdapterContext) -> Result<()> {
        let guard = Instant::now() + Duration::from_secs(30);
        loop {
            match op.execute(ctx) {
                PollResult::Running => {
                    if Instant::now() >= guard {
                        bail!("{} never settled", op.name());
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
                PollResult::Success => return Ok(()),
                PollResult::Failure => bail!("{} failed", op.name()),
            }
        }
    }
}

/// Registers `demo:add`: sums the request's `a` and `b` fields.
fn install_demo_service(hub: &LoopbackHub) {
    let reply_ty = TypeDesc::Struct(vec![
        ("result".into(), TypeDesc::Scalar(ScalarKind::Int64)),
        ("sum".into(), TypeDesc::Scalar(ScalarKind::UInt64)),
    ]);
    hub.register_service(
        "demo:add",
        Arc::new(move |request: &TypedValue| {
            let term = |name: &str| {
                request
                    .field(name)
                    .and_then(serde_json::Value::as_u64)
                    .ok_or_else(|| format!("missing uint field '{name}'"))
            };
            let sum = term("a")? + term("b")?;
            TypedValue::new(
                reply_ty.clone(),
                serde_json::json!({ "result": 0, "sum": sum }),
            )
            .map_err(|e| e.to_string())
        }),
    );
}

/// Parses a `--ty`/value pair through the adapter attribute layer.
fn parse_typed(ty: &str, value: &str) -> Result<TypedValue> {
    let config = AdapterConfig::new().with("type", ty).with("value", value);
    let desc = config.type_desc("cli", "type")?;
    Ok(config.value_literal("cli", "value", &desc)?)
}

fn seed_channel(rig: &Rig, channel: &str, ty: &str, value: &str, pv: bool) -> Result<()> {
    let typed = parse_typed(ty, value)?;
    let on_wire = if pv {
        pvlink_types::convert::pack_into_struct_if_scalar(&typed)
    } else {
        typed
    };
    rig.hub.push(channel, on_wire);
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let rig = Rig::new();
    let kind = |pv: bool, op: &str| {
        if pv {
            format!("pv-{op}")
        } else {
            format!("channel-{op}")
        }
    };
    match args.command {
        Command::Kinds => {
            println!("instructions:");
            for k in rig.registry.instruction_kinds() {
                println!("  {k}");
            }
            println!("variables:");
            for k in rig.registry.variable_kinds() {
                println!("  {k}");
            }
        }
        Command::Read {
            channel,
            ty,
            push,
            timeout,
            pv,
        } => {
            if let Some(value) = &push {
                seed_channel(&rig, &channel, &ty, value, pv)?;
            }
            let config = AdapterConfig::new()
                .with("channel", channel.clone())
                .with("type", ty)
                .with("timeout", timeout);
            let ctx = AdapterContext::new(Arc::new(MemoryStore::new()), Arc::new(NullSink));
            let mut op = rig.registry.make_instruction(&kind(pv, "read"), config)?;
            op.init(&ctx)?;
            rig.drive(op.as_mut(), &ctx)?;
            let on_wire = rig
                .hub
                .value_of(&channel)
                .ok_or_else(|| anyhow!("channel '{channel}' has no value"))?;
            println!("{on_wire}");
        }
        Command::Write {
            channel,
            ty,
            value,
            timeout,
            pv,
        } => {
            // A loopback channel must exist before a writer can connect.
            seed_channel(&rig, &channel, &ty, &value, pv)?;
            let config = AdapterConfig::new()
                .with("channel", channel.clone())
                .with("type", ty)
                .with("value", value)
                .with("timeout", timeout);
            let ctx = AdapterContext::new(Arc::new(MemoryStore::new()), Arc::new(NullSink));
            let mut op = rig.registry.make_instruction(&kind(pv, "write"), config)?;
            op.init(&ctx)?;
            rig.drive(op.as_mut(), &ctx)?;
            let on_wire = rig
                .hub
                .value_of(&channel)
                .ok_or_else(|| anyhow!("channel '{channel}' has no value"))?;
            println!("wrote {on_wire}");
        }
        Command::Rpc {
            service,
            ty,
            value,
            timeout,
        } => {
            let reply_seed = TypedValue::new(
                TypeDesc::Struct(vec![
                    ("result".into(), TypeDesc::Scalar(ScalarKind::Int64)),
                    ("sum".into(), TypeDesc::Scalar(ScalarKind::UInt64)),
                ]),
                serde_json::json!({ "result": 0, "sum": 0 }),
            )?;
            let store = MemoryStore::new().with("reply", reply_seed);
            let ctx = AdapterContext::new(Arc::new(store), Arc::new(NullSink));
            let config = AdapterConfig::new()
                .with("service", service)
                .with("type", ty)
                .with("value", value)
                .with("outputVar", "reply")
                .with("timeout", timeout);
            let mut op = rig.registry.make_instruction("rpc-call", config)?;
            op.init(&ctx)?;
            rig.drive(op.as_mut(), &ctx)?;
            let reply = ctx
                .variables
                .fetch("reply")
                .ok_or_else(|| anyhow!("reply variable vanished"))?;
            println!("{reply}");
        }
        Command::Demo => demo(&rig)?,
    }
    Ok(())
}

/// Scripted walkthrough exercising every adapter family once.
fn demo(rig: &Rig) -> Result<()> {
    println!("== serve ==");
    for (record, initial) in [("demo:counter", "0"), ("demo:mode", "1")] {
        let config = AdapterConfig::new()
            .with("channel", record)
            .with("type", "uint64")
            .with("value", initial);
        let mut var = rig.registry.make_variable("server-variable", config)?;
        var.setup()?;
        println!("serving {record} = {initial}");
        // The scope's shared server keeps the record alive.
        drop(var);
    }
    rig.servers.setup(&rig.scope)?;
    println!("scope '{}' started", rig.scope);

    println!("== write ==");
    let ctx = AdapterContext::new(Arc::new(MemoryStore::new()), Arc::new(NullSink));
    let config = AdapterConfig::new()
        .with("channel", "demo:counter")
        .with("type", "uint64")
        .with("value", "41")
        .with("timeout", "5");
    let mut write = rig.registry.make_instruction("channel-write", config)?;
    write.init(&ctx)?;
    rig.drive(write.as_mut(), &ctx)?;
    println!("demo:counter <- 41");

    println!("== read ==");
    let seed = TypedValue::new(
        TypeDesc::Scalar(ScalarKind::UInt64),
        serde_json::json!(0),
    )?;
    let store = MemoryStore::new().with("out", seed);
    let ctx = AdapterContext::new(Arc::new(store), Arc::new(NullSink));
    let config = AdapterConfig::new()
        .with("channel", "demo:counter")
        .with("outputVar", "out")
        .with("timeout", "5");
    let mut read = rig.registry.make_instruction("channel-read", config)?;
    read.init(&ctx)?;
    rig.drive(read.as_mut(), &ctx)?;
    let out = ctx
        .variables
        .fetch("out")
        .ok_or_else(|| anyhow!("output variable vanished"))?;
    println!("demo:counter -> {out}");

    println!("== rpc ==");
    let reply_seed = TypedValue::new(
        TypeDesc::Struct(vec![
            ("result".into(), TypeDesc::Scalar(ScalarKind::Int64)),
            ("sum".into(), TypeDesc::Scalar(ScalarKind::UInt64)),
        ]),
        serde_json::json!({ "result": 0, "sum": 0 }),
    )?;
    let store = MemoryStore::new().with("reply", reply_seed);
    let ctx = AdapterContext::new(Arc::new(store), Arc::new(NullSink));
    let config = AdapterConfig::new()
        .with("service", "demo:add")
        .with("type", r#"{"a": {"type": "uint64"}, "b": {"type": "uint64"}}"#)
        .with("value", r#"{"a": 19, "b": 23}"#)
        .with("outputVar", "reply")
        .with("timeout", "5");
    let mut rpc = rig.registry.make_instruction("rpc-call", config)?;
    rpc.init(&ctx)?;
    rig.drive(rpc.as_mut(), &ctx)?;
    let reply = ctx
        .variables
        .fetch("reply")
        .ok_or_else(|| anyhow!("reply variable vanished"))?;
    println!("demo:add -> {reply}");

    debug!(updates = rig.sink.len(), "sink events observed");
    rig.servers.teardown(&rig.scope)?;
    println!("scope '{}' stopped", rig.scope);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Terminal filter: --debug > --verbose > RUST_LOG env > default "warn"
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .init();

    run(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvlink_wire::RpcClient;

    #[test]
    fn parse_typed_accepts_scalars_and_structs() {
        let v = parse_typed("uint64", "7").unwrap();
        assert_eq!(v.body(), &serde_json::json!(7));

        let v = parse_typed(r#"{"n": {"type": "uint64"}}"#, r#"{"n": 1}"#).unwrap();
        assert_eq!(v.field("n"), Some(&serde_json::json!(1)));
    }

    #[test]
    fn parse_typed_rejects_mismatches() {
        assert!(parse_typed("uint64", "\"seven\"").is_err());
        assert!(parse_typed("not-a-type", "7").is_err());
    }

    #[test]
    fn demo_service_adds() {
        let hub = LoopbackHub::new();
        install_demo_service(&hub);
        // Exercised end to end by the demo subcommand e2e test; here we
        // only check registration happened (call does not fail at issue).
        let request = parse_typed(
            r#"{"a": {"type": "uint64"}, "b": {"type": "uint64"}}"#,
            r#"{"a": 2, "b": 3}"#,
        )
        .unwrap();
        assert!(hub.rpc_client().call("demo:add", &request, None).is_ok());
    }
}
