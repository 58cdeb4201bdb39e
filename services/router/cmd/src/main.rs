//! Overlay router binary.
//!
//! `run` starts one router instance listening on its TCP endpoint; `send`
//! injects a single data message into a running instance.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use router_routing::StrategyKind;
use router_session::{
    send_with_retry, Delivery, RetryPolicy, RouterConfig, RouterNode, TcpInbound, TcpTransport, KIND_PING,
};
use router_wire::{encode, now_millis, NodeId, WireMessage, DEFAULT_DATA_HOP_BUDGET, HEADER_KIND};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::{check_endpoints, load_nodes, load_topology, RouterSettings};
use logging::RouterLogFormatter;

/// Overlay network router
#[derive(Parser, Debug)]
#[command(name = "overlay-router", version, about = "Overlay router with static, flooding, link-state and distance-vector routing")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one router instance
    Run(RunArgs),
    /// Inject a data message into a running router
    Send(SendArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Local node id, e.g. A
    #[arg(long)]
    me: String,

    /// Routing mode: static, flooding, link-state, distance-vector
    #[arg(long, default_value = "static")]
    mode: StrategyKind,

    /// Nodes file mapping ids to [host, port]
    #[arg(long, default_value = "config/nodes.json")]
    nodes: PathBuf,

    /// Topology file mapping ids to weighted neighbors
    #[arg(long, default_value = "config/topo.json")]
    topo: PathBuf,

    /// Liveness probe period, e.g. 5s
    #[arg(long, default_value = "5s")]
    hello_period: humantime::Duration,

    /// Silence after which a neighbor is dead, e.g. 10s
    #[arg(long, default_value = "10s")]
    dead_after: humantime::Duration,

    /// Maintenance period, e.g. 1s
    #[arg(long, default_value = "1s")]
    tick: humantime::Duration,
}

#[derive(Args, Debug)]
struct SendArgs {
    /// Nodes file mapping ids to [host, port]
    #[arg(long, default_value = "config/nodes.json")]
    nodes: PathBuf,

    /// Node the message is injected at; defaults to --from
    #[arg(long)]
    entry: Option<String>,

    /// Source node id
    #[arg(long, default_value = "A")]
    from: String,

    /// Destination node id
    #[arg(long, default_value = "D")]
    to: String,

    /// Text payload
    #[arg(long, default_value = "hello")]
    text: String,

    /// Send an end-to-end ping instead of text
    #[arg(long)]
    ping: bool,

    /// Address every node
    #[arg(long)]
    broadcast: bool,

    /// Hop budget of the message
    #[arg(long, default_value_t = DEFAULT_DATA_HOP_BUDGET)]
    hop_budget: u32,
}

fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let env_filter = EnvFilter::new("warn")
        .add_directive(format!("overlay_router={}", log_level).parse()?)
        .add_directive(format!("router_session={}", log_level).parse()?)
        .add_directive(format!("router_routing={}", log_level).parse()?)
        .add_directive(format!("router_topology={}", log_level).parse()?)
        .add_directive(format!("router_wire={}", log_level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .event_format(RouterLogFormatter::new("router".to_string()))
        .init();
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Send(args) => send(args).await,
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut settings = RouterSettings {
        node_id: args.me,
        mode: args.mode,
        hello_period: args.hello_period.into(),
        dead_after: args.dead_after.into(),
        tick: args.tick.into(),
    };
    settings.apply_environment_overrides()?;

    let nodes = load_nodes(&args.nodes)?;
    let topology = load_topology(&args.topo)?;
    check_endpoints(&topology, &nodes)?;

    let me = NodeId::from(settings.node_id.as_str());
    let listen = *nodes
        .get(&me)
        .with_context(|| format!("node {me} is not listed in {:?}", args.nodes))?;

    component_info!(
        "cli",
        node = %me,
        "Starting overlay router v{} (mode={}, hello={:?}, dead_after={:?}, tick={:?})",
        env!("CARGO_PKG_VERSION"),
        settings.mode,
        settings.hello_period,
        settings.dead_after,
        settings.tick
    );

    let (listener, inbound) = TcpInbound::bind(listen)
        .await
        .with_context(|| format!("failed to listen on {listen}"))?;
    let transport = Arc::new(TcpTransport::new(nodes.into_iter().collect::<HashMap<_, _>>()));

    let mut config = RouterConfig::new(me.clone(), settings.mode, topology);
    config.hello_period = settings.hello_period;
    config.dead_after = settings.dead_after;
    config.tick = settings.tick;

    let (router, mut deliveries) = RouterNode::start(config, transport, inbound);

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for ctrl-c")?;
                component_info!("cli", node = %me, "Interrupt received");
                break;
            }
            delivery = deliveries.recv() => match delivery {
                Some(delivery) => print_delivery(&me, &delivery),
                None => break,
            },
        }
    }

    listener.close();
    router.shutdown().await;
    info!(node = %me, "Router stopped");
    Ok(())
}

fn print_delivery(me: &NodeId, delivery: &Delivery) {
    match delivery.rtt {
        Some(rtt) => component_info!(
            "app",
            node = %me,
            "PONG from {}: rtt={:.1}ms",
            delivery.from,
            rtt.as_secs_f64() * 1000.0
        ),
        None => component_info!(
            "app",
            node = %me,
            "DATA from {}: {}",
            delivery.from,
            delivery.payload
        ),
    }
}

async fn send(args: SendArgs) -> anyhow::Result<()> {
    let nodes = load_nodes(&args.nodes)?;
    let entry = NodeId::from(args.entry.as_deref().unwrap_or(&args.from));
    let to = if args.broadcast {
        NodeId::broadcast()
    } else {
        NodeId::from(args.to.as_str())
    };

    let msg = if args.ping {
        WireMessage::data(args.from.as_str(), to, args.hop_budget, json!({ "ts": now_millis() }))
            .header(HEADER_KIND, KIND_PING)
    } else {
        WireMessage::data(args.from.as_str(), to, args.hop_budget, json!({ "text": args.text }))
    };

    let transport = TcpTransport::new(nodes.into_iter().collect());
    let started = std::time::Instant::now();
    send_with_retry(&transport, &entry, encode(&msg)?, &RetryPolicy::default())
        .await
        .with_context(|| format!("failed to send through {entry}"))?;
    let elapsed: Duration = started.elapsed();

    component_info!(
        "cli",
        "Sent {} {} -> {} via {} (id={}, {:.1} ms)",
        if args.ping { "PING" } else { "DATA" },
        msg.from,
        msg.to,
        entry,
        msg.id(),
        elapsed.as_secs_f64() * 1000.0
    );
    if args.ping {
        component_warn!("cli", "The pong is reported by {}, not by this command", msg.from);
    }
    Ok(())
}
