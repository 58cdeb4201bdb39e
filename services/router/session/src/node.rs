//! Router orchestrator.
//!
//! A [`RouterNode`] owns the active [`RoutingStrategy`], the shared
//! [`RoutingTable`], neighbor liveness and the flooding forwarder, and runs
//! three loops for its lifetime:
//!
//! - **inbound**: decodes each message from the transport and dispatches it
//! - **maintenance**: once per tick runs expiry, recomputation and
//!   advertisement for the strategy and publishes changed routes
//! - **liveness**: every hello period probes all configured neighbors
//!
//! Locks are never held across a send: handlers compute their outbound
//! messages first and send them afterwards.

use crate::retry::{send_with_retry, RetryPolicy};
use crate::transport::{Inbound, Transport};
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::join_all;
use router_routing::{
    build_strategy, DropReason, Emit, Flooder, NeighborMetric, NeighborTable, Outbound, RouteSnapshot,
    RouterStats, RoutingDecision, RoutingError, RoutingStrategy, RoutingTable, StrategyConfig, StrategyKind,
    DEFAULT_DEAD_AFTER, DEFAULT_HELLO_PERIOD,
};
use router_topology::Graph;
use router_wire::{
    decode, encode, now_millis, probe_ack, MessageType, NodeId, WireMessage, DEFAULT_DATA_HOP_BUDGET,
    HEADER_KIND, HEADER_REPLY_TO,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Header `kind` of an end-to-end ping
pub const KIND_PING: &str = "ping";

/// Header `kind` of the reply to a ping
pub const KIND_PONG: &str = "pong";

/// Default maintenance period
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Default bound on joining the loops at shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Startup configuration of one router instance
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// This node
    pub node_id: NodeId,
    /// Active strategy
    pub mode: StrategyKind,
    /// Weighted adjacency of the whole overlay; this node's row is its
    /// neighbor set and configured link costs
    pub topology: Graph,
    /// Liveness probe period
    pub hello_period: Duration,
    /// Silence after which a neighbor is dead
    pub dead_after: Duration,
    /// Maintenance period
    pub tick: Duration,
    /// Send retry policy
    pub retry: RetryPolicy,
    /// Hop budget for pong replies
    pub data_hop_budget: u32,
    /// Engine tuning
    pub strategy: StrategyConfig,
    /// Bound on joining the loops at shutdown
    pub shutdown_timeout: Duration,
}

impl RouterConfig {
    /// Configuration with default timers
    pub fn new(node_id: impl Into<NodeId>, mode: StrategyKind, topology: Graph) -> Self {
        Self {
            node_id: node_id.into(),
            mode,
            topology,
            hello_period: DEFAULT_HELLO_PERIOD,
            dead_after: DEFAULT_DEAD_AFTER,
            tick: DEFAULT_TICK,
            retry: RetryPolicy::default(),
            data_hop_budget: DEFAULT_DATA_HOP_BUDGET,
            strategy: StrategyConfig::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Configured neighbors and their link costs
    pub fn neighbors(&self) -> BTreeMap<NodeId, f64> {
        self.topology.get(&self.node_id).cloned().unwrap_or_default()
    }
}

/// A data message delivered to this node
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Originating node
    pub from: NodeId,
    /// Message id
    pub id: String,
    /// Header `kind`, if any
    pub kind: Option<String>,
    /// Application payload
    pub payload: Value,
    /// End-to-end round trip, set on the pong answering our ping
    pub rtt: Option<Duration>,
}

struct Shared {
    config: RouterConfig,
    table: RoutingTable,
    neighbors: NeighborTable,
    strategy: Mutex<Box<dyn RoutingStrategy>>,
    flooder: Mutex<Flooder>,
    transport: Arc<dyn Transport>,
    deliveries: mpsc::UnboundedSender<Delivery>,
    pending_pings: DashMap<String, Instant>,
}

/// Handle to a running router instance.
///
/// Dropping the handle stops the loops at their next wakeup;
/// [`RouterNode::shutdown`] also waits for them.
pub struct RouterNode {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RouterNode {
    /// Start the three loops. Must be called within a tokio runtime.
    ///
    /// Returns the handle and the stream of locally delivered data messages.
    pub fn start(
        config: RouterConfig,
        transport: Arc<dyn Transport>,
        inbound: Inbound,
    ) -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let neighbors = config.neighbors();
        let strategy = build_strategy(config.mode, &config.node_id, &config.topology, &config.strategy);
        let (deliveries, delivery_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);

        info!(
            node = %config.node_id,
            mode = %config.mode,
            neighbors = neighbors.len(),
            "Starting router"
        );

        let shared = Arc::new(Shared {
            table: RoutingTable::new(config.node_id.clone(), neighbors.keys().cloned()),
            neighbors: NeighborTable::new(config.node_id.clone(), neighbors, config.dead_after),
            strategy: Mutex::new(strategy),
            flooder: Mutex::new(Flooder::new(config.node_id.clone())),
            transport,
            deliveries,
            pending_pings: DashMap::new(),
            config,
        });

        let tasks = vec![
            tokio::spawn(shared.clone().inbound_loop(inbound, shutdown_rx.clone())),
            tokio::spawn(shared.clone().maintenance_loop(shutdown_rx.clone())),
            tokio::spawn(shared.clone().liveness_loop(shutdown_rx)),
        ];

        (Self { shared, shutdown, tasks }, delivery_rx)
    }

    /// This node's id
    pub fn node_id(&self) -> &NodeId {
        &self.shared.config.node_id
    }

    /// Active strategy
    pub fn mode(&self) -> StrategyKind {
        self.shared.config.mode
    }

    /// Originate a data message with the full `hop_budget`.
    ///
    /// Returns `Forward("*")` when the message was flooded.
    pub async fn send_data(&self, to: impl Into<NodeId>, payload: Value, hop_budget: u32) -> RoutingDecision {
        let msg = WireMessage::data(self.node_id().clone(), to, hop_budget, payload);
        self.shared.send_originated(msg).await
    }

    /// Flood a data message to every node within `hop_budget` hops.
    /// Returns the number of copies sent.
    pub async fn broadcast(&self, payload: Value, hop_budget: u32) -> usize {
        let msg = WireMessage::data(self.node_id().clone(), NodeId::broadcast(), hop_budget, payload);
        let (_, outbound) = self.shared.originate(msg, Instant::now()).await;
        let copies = outbound.len();
        self.shared.send_all(outbound).await;
        copies
    }

    /// Send an end-to-end ping; the pong arrives as a [`Delivery`] with `rtt` set
    pub async fn ping(&self, to: impl Into<NodeId>) -> RoutingDecision {
        let msg = WireMessage::data(
            self.node_id().clone(),
            to,
            self.shared.config.data_hop_budget,
            json!({ "ts": now_millis() }),
        )
        .header(HEADER_KIND, KIND_PING);
        self.shared
            .pending_pings
            .insert(msg.id().to_string(), Instant::now());
        self.shared.send_originated(msg).await
    }

    /// Current routing table
    pub async fn routes(&self) -> RouteSnapshot {
        self.shared.table.snapshot().await
    }

    /// Routing counters
    pub async fn stats(&self) -> RouterStats {
        self.shared.table.stats().await
    }

    /// Liveness state of a neighbor
    pub fn neighbor_metric(&self, neighbor: &str) -> Option<NeighborMetric> {
        self.shared.neighbors.metric(neighbor)
    }

    /// Neighbors currently alive
    pub fn alive_neighbors(&self) -> BTreeSet<NodeId> {
        self.shared.neighbors.alive(Instant::now())
    }

    /// Stop the loops and wait for them, up to the configured bound
    pub async fn shutdown(self) {
        let RouterNode { shared, shutdown, tasks } = self;
        info!(node = %shared.config.node_id, "Shutting down router");

        let _ = shutdown.send(true);
        let aborts: Vec<_> = tasks.iter().map(|task| task.abort_handle()).collect();
        if tokio::time::timeout(shared.config.shutdown_timeout, join_all(tasks))
            .await
            .is_err()
        {
            warn!(node = %shared.config.node_id, "Router loops did not stop in time, aborting");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

impl Shared {
    fn local(&self) -> &NodeId {
        &self.config.node_id
    }

    async fn inbound_loop(self: Arc<Self>, mut inbound: Inbound, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                bytes = inbound.recv() => match bytes {
                    Some(bytes) => self.handle_bytes(bytes).await,
                    None => {
                        debug!(node = %self.local(), "Inbound stream closed");
                        break;
                    }
                },
            }
        }
        debug!(node = %self.local(), "Inbound loop stopped");
    }

    async fn maintenance_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.maintain().await {
                        warn!(node = %self.local(), "Maintenance cycle failed: {:#}", e);
                    }
                }
            }
        }
        debug!(node = %self.local(), "Maintenance loop stopped");
    }

    async fn liveness_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.hello_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => self.probe_neighbors().await,
            }
        }
        debug!(node = %self.local(), "Liveness loop stopped");
    }

    async fn maintain(&self) -> anyhow::Result<()> {
        let now = Instant::now();
        let tick = self.strategy.lock().await.tick(&self.neighbors, now)?;

        if let Some(routes) = tick.routes {
            self.publish(routes).await;
        }

        let mut outbound = Vec::new();
        for emit in tick.emits {
            match emit {
                Emit::Flood(msg) => {
                    outbound.extend(self.flooder.lock().await.originate(msg, &self.neighbors, now));
                }
                Emit::Send(send) => outbound.push(send),
            }
        }
        self.send_all(outbound).await;

        let dead_after = self.config.dead_after;
        self.pending_pings
            .retain(|_, sent| now.saturating_duration_since(*sent) <= dead_after);
        Ok(())
    }

    async fn probe_neighbors(&self) {
        let now = Instant::now();
        let expired = self.neighbors.prune_pending(now);
        if expired > 0 {
            debug!(node = %self.local(), expired, "Probes went unanswered");
        }
        self.send_all(self.neighbors.probes(now)).await;
    }

    async fn publish(&self, routes: RouteSnapshot) {
        self.table.replace(routes).await;
        self.table
            .log_dump(&format!("Routing table updated ({})", self.config.mode))
            .await;
    }

    /// Decode and dispatch one inbound message
    async fn handle_bytes(&self, bytes: Bytes) {
        let msg = match decode(&bytes) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(node = %self.local(), "Dropping malformed message: {}", e);
                self.table.record(&RoutingDecision::Drop(DropReason::Malformed));
                return;
            }
        };

        if msg.hop_budget == 0 {
            debug!(node = %self.local(), id = msg.id(), "Dropping message with no hop budget left");
            self.table
                .record(&RoutingDecision::Drop(DropReason::HopBudgetExhausted));
            return;
        }

        let now = Instant::now();
        self.neighbors.touch(msg.sender().as_str(), now);

        let outbound = match msg.msg_type {
            MessageType::Probe => self.on_probe(&msg),
            MessageType::ProbeAck => self.on_probe_ack(&msg, now).await,
            MessageType::LinkStateAdvert => self.on_link_state(&msg, now).await,
            MessageType::DistanceVectorAdvert => self.on_distance_vector(&msg, now).await,
            MessageType::Data => self.on_data(msg, now).await,
        };
        self.send_all(outbound).await;
    }

    fn on_probe(&self, msg: &WireMessage) -> Vec<Outbound> {
        if &msg.to != self.local() {
            return Vec::new();
        }
        vec![Outbound::new(msg.from.clone(), probe_ack(self.local(), msg))]
    }

    async fn on_probe_ack(&self, msg: &WireMessage, now: Instant) -> Vec<Outbound> {
        if self.neighbors.on_ack(msg, now).is_some() {
            self.strategy.lock().await.on_link_change(&msg.from);
        }
        Vec::new()
    }

    async fn on_link_state(&self, msg: &WireMessage, now: Instant) -> Vec<Outbound> {
        let result = {
            let mut strategy = self.strategy.lock().await;
            (strategy.kind() == StrategyKind::LinkState).then(|| strategy.on_receive(msg, &self.neighbors, now))
        };
        if let Some(routes) = result.and_then(|r| self.absorb(msg, r)) {
            self.publish(routes).await;
        }

        // Re-flood regardless of freshness; dedup stops the echo
        self.flooder
            .lock()
            .await
            .handle(msg, &self.neighbors, now)
            .outbound
    }

    async fn on_distance_vector(&self, msg: &WireMessage, now: Instant) -> Vec<Outbound> {
        if &msg.to != self.local() {
            return Vec::new();
        }

        let result = {
            let mut strategy = self.strategy.lock().await;
            (strategy.kind() == StrategyKind::DistanceVector)
                .then(|| strategy.on_receive(msg, &self.neighbors, now))
        };
        if let Some(routes) = result.and_then(|r| self.absorb(msg, r)) {
            self.publish(routes).await;
        }
        Vec::new()
    }

    /// Log a rejected advertisement; stale control information is routine
    fn absorb(
        &self,
        msg: &WireMessage,
        result: Result<Option<RouteSnapshot>, RoutingError>,
    ) -> Option<RouteSnapshot> {
        match result {
            Ok(routes) => routes,
            Err(e) if e.is_stale() => {
                debug!(node = %self.local(), id = msg.id(), "Ignoring stale advertisement: {}", e);
                None
            }
            Err(e) => {
                debug!(node = %self.local(), id = msg.id(), from = %msg.from, "Rejected advertisement: {}", e);
                None
            }
        }
    }

    async fn on_data(&self, msg: WireMessage, now: Instant) -> Vec<Outbound> {
        let floods = self.strategy.lock().await.floods_data();

        if floods || msg.is_broadcast() {
            let outcome = self.flooder.lock().await.handle(&msg, &self.neighbors, now);
            if outcome.duplicate {
                self.table.record(&RoutingDecision::Drop(DropReason::Duplicate));
                return Vec::new();
            }

            let mut outbound = outcome.outbound;
            if outcome.deliver {
                self.table.record(&RoutingDecision::Local);
                if let Some(reply) = self.deliver(&msg, now) {
                    outbound.extend(self.originate(reply, now).await.1);
                }
            }
            return outbound;
        }

        if &msg.to == self.local() {
            self.table.record(&RoutingDecision::Local);
            return match self.deliver(&msg, now) {
                Some(reply) => self.originate(reply, now).await.1,
                None => Vec::new(),
            };
        }

        let Some(copy) = msg.forwarded_by(self.local()) else {
            debug!(node = %self.local(), id = msg.id(), dst = %msg.to, "Hop budget exhausted");
            self.table
                .record(&RoutingDecision::Drop(DropReason::HopBudgetExhausted));
            return Vec::new();
        };

        match self.table.decide(&msg.to).await {
            RoutingDecision::Forward(hop) => {
                debug!(node = %self.local(), id = msg.id(), dst = %msg.to, next_hop = %hop, "Forwarding message");
                vec![Outbound::new(hop, copy)]
            }
            RoutingDecision::Drop(reason) => {
                warn!(node = %self.local(), id = msg.id(), dst = %msg.to, "Dropping message: {}", reason);
                Vec::new()
            }
            RoutingDecision::Local => Vec::new(),
        }
    }

    /// Hand a message to the application. Returns the pong to send when
    /// the message is a ping.
    fn deliver(&self, msg: &WireMessage, now: Instant) -> Option<WireMessage> {
        let kind = msg.headers.kind().map(str::to_string);
        let mut rtt = None;
        let mut reply = None;

        match kind.as_deref() {
            Some(KIND_PING) => {
                let pong = WireMessage::data(
                    self.local().clone(),
                    msg.from.clone(),
                    self.config.data_hop_budget,
                    json!({ "ts": msg.payload.get("ts").cloned().unwrap_or(Value::Null) }),
                )
                .header(HEADER_KIND, KIND_PONG)
                .header(HEADER_REPLY_TO, msg.id());
                reply = Some(pong);
            }
            Some(KIND_PONG) => {
                let pending = msg
                    .headers
                    .reply_to()
                    .and_then(|id| self.pending_pings.remove(id))
                    .map(|(_, sent)| now.saturating_duration_since(sent));
                // Pings injected from outside this router only carry their send time
                rtt = pending.or_else(|| {
                    msg.payload
                        .get("ts")
                        .and_then(Value::as_u64)
                        .map(|ts| Duration::from_millis(now_millis().saturating_sub(ts)))
                });
            }
            _ => {}
        }

        info!(
            node = %self.local(),
            from = %msg.from,
            id = msg.id(),
            kind = kind.as_deref().unwrap_or("data"),
            rtt_ms = rtt.map(|r: Duration| r.as_secs_f64() * 1000.0),
            "Delivered message"
        );

        let delivery = Delivery {
            from: msg.from.clone(),
            id: msg.id().to_string(),
            kind,
            payload: msg.payload.clone(),
            rtt,
        };
        if self.deliveries.send(delivery).is_err() {
            debug!(node = %self.local(), "No delivery receiver");
        }
        reply
    }

    /// Route a locally originated message: flood it, hand it to the next
    /// hop, or deliver it here
    async fn originate(&self, msg: WireMessage, now: Instant) -> (RoutingDecision, Vec<Outbound>) {
        let floods = self.strategy.lock().await.floods_data();

        if floods || msg.is_broadcast() {
            let outbound = self.flooder.lock().await.originate(msg, &self.neighbors, now);
            let decision = if outbound.is_empty() {
                RoutingDecision::Drop(DropReason::NoRoute)
            } else {
                RoutingDecision::Forward(NodeId::broadcast())
            };
            self.table.record(&decision);
            return (decision, outbound);
        }

        let decision = self.table.decide(&msg.to).await;
        let outbound = match &decision {
            RoutingDecision::Forward(hop) => vec![Outbound::new(hop.clone(), msg)],
            RoutingDecision::Local => {
                if let Some(pong) = self.deliver(&msg, now) {
                    self.deliver(&pong, now);
                }
                Vec::new()
            }
            RoutingDecision::Drop(reason) => {
                warn!(node = %self.local(), dst = %msg.to, "Cannot send: {}", reason);
                Vec::new()
            }
        };
        (decision, outbound)
    }

    async fn send_originated(&self, msg: WireMessage) -> RoutingDecision {
        let (decision, outbound) = self.originate(msg, Instant::now()).await;
        self.send_all(outbound).await;
        decision
    }

    async fn send_all(&self, outbound: Vec<Outbound>) {
        join_all(outbound.into_iter().map(|send| self.send(send))).await;
    }

    async fn send(&self, send: Outbound) {
        let bytes = match encode(&send.message) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(node = %self.local(), peer = %send.to, "Failed to encode message: {}", e);
                return;
            }
        };

        if let Err(e) = send_with_retry(self.transport.as_ref(), &send.to, bytes, &self.config.retry).await {
            warn!(
                node = %self.local(),
                peer = %send.to,
                kind = send.message.msg_type.as_str(),
                "Send failed after retries: {}",
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHub;
    use crate::transport::{TcpInbound, TcpTransport};
    use router_routing::LinkCostSource;
    use router_topology::nodes;
    use router_wire::{DistanceVectorAdvert, LinkStateAdvert};
    use std::collections::HashMap;
    use tokio::time::sleep;

    fn node(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn graph(edges: &[(&str, &str, f64)]) -> Graph {
        let mut graph = Graph::new();
        for (a, b, cost) in edges {
            graph.entry(node(a)).or_default().insert(node(b), *cost);
            graph.entry(node(b)).or_default().insert(node(a), *cost);
        }
        graph
    }

    fn line() -> Graph {
        graph(&[("A", "B", 1.0), ("B", "C", 1.0), ("C", "D", 1.0)])
    }

    struct Net {
        hub: MemoryHub,
        nodes: BTreeMap<String, RouterNode>,
        deliveries: BTreeMap<String, mpsc::UnboundedReceiver<Delivery>>,
    }

    impl Net {
        fn start(topology: &Graph, mode: StrategyKind, tweak: impl Fn(&mut RouterConfig)) -> Self {
            let hub = MemoryHub::new();
            let mut net = Net {
                hub: hub.clone(),
                nodes: BTreeMap::new(),
                deliveries: BTreeMap::new(),
            };
            for id in nodes(topology) {
                let inbound = hub.register(&id);
                let mut config = RouterConfig::new(id.clone(), mode, topology.clone());
                tweak(&mut config);
                let (router, rx) = RouterNode::start(config, Arc::new(hub.clone()), inbound);
                net.nodes.insert(id.to_string(), router);
                net.deliveries.insert(id.to_string(), rx);
            }
            net
        }

        fn node(&self, id: &str) -> &RouterNode {
            &self.nodes[id]
        }

        fn drain(&mut self, id: &str) -> Vec<Delivery> {
            let rx = self.deliveries.get_mut(id).unwrap();
            let mut got = Vec::new();
            while let Ok(delivery) = rx.try_recv() {
                got.push(delivery);
            }
            got
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_static_route_delivers_across_line() {
        let mut net = Net::start(&line(), StrategyKind::Static, |_| {});
        sleep(Duration::from_millis(100)).await;

        let decision = net
            .node("A")
            .send_data("D", json!({"text": "hello"}), DEFAULT_DATA_HOP_BUDGET)
            .await;
        assert_eq!(decision, RoutingDecision::Forward(node("B")));

        let delivery = net.deliveries.get_mut("D").unwrap().recv().await.unwrap();
        assert_eq!(delivery.from, node("A"));
        assert_eq!(delivery.payload, json!({"text": "hello"}));
        assert_eq!(delivery.rtt, None);

        assert_eq!(net.node("B").stats().await.messages_forwarded, 1);
        assert_eq!(net.node("D").stats().await.messages_local, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hop_budget_limits_table_forwarding() {
        let mut net = Net::start(&line(), StrategyKind::Static, |_| {});
        sleep(Duration::from_millis(100)).await;

        net.node("A").send_data("D", json!("short"), 2).await;
        sleep(Duration::from_millis(100)).await;

        assert!(net.drain("D").is_empty());
        let stats = net.node("C").stats().await;
        assert_eq!(stats.drop_reasons.get("hop budget exhausted"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_route_is_reported() {
        let net = Net::start(&graph(&[("A", "B", 1.0)]), StrategyKind::Static, |_| {});
        sleep(Duration::from_millis(100)).await;

        let decision = net.node("A").send_data("Z", json!(null), 4).await;
        assert_eq!(decision, RoutingDecision::Drop(DropReason::NoRoute));
        assert_eq!(
            net.node("A").stats().await.drop_reasons.get("no route to destination"),
            Some(&1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_flooding_ring_delivers_exactly_once() {
        let ring = graph(&[("A", "B", 1.0), ("B", "C", 1.0), ("C", "D", 1.0), ("D", "A", 1.0)]);
        let mut net = Net::start(&ring, StrategyKind::Flooding, |_| {});

        assert_eq!(net.node("A").broadcast(json!("hi"), 2).await, 2);
        sleep(Duration::from_millis(500)).await;

        for id in ["B", "C", "D"] {
            assert_eq!(net.drain(id).len(), 1, "node {id}");
        }
        assert!(net.drain("A").is_empty());
        assert_eq!(net.node("C").stats().await.drop_reasons.get("duplicate"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flooding_budget_one_reaches_direct_neighbors() {
        let ring = graph(&[("A", "B", 1.0), ("B", "C", 1.0), ("C", "D", 1.0), ("D", "A", 1.0)]);
        let mut net = Net::start(&ring, StrategyKind::Flooding, |_| {});

        net.node("A").broadcast(json!("hi"), 1).await;
        sleep(Duration::from_millis(500)).await;

        assert_eq!(net.drain("B").len(), 1);
        assert_eq!(net.drain("D").len(), 1);
        assert!(net.drain("C").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flooding_mode_unicast() {
        let mut net = Net::start(&line(), StrategyKind::Flooding, |_| {});

        let decision = net.node("A").send_data("D", json!("flooded"), 12).await;
        assert_eq!(decision, RoutingDecision::Forward(NodeId::broadcast()));
        sleep(Duration::from_millis(500)).await;

        assert_eq!(net.drain("D").len(), 1);
        assert!(net.drain("B").is_empty());
        assert!(net.drain("C").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_state_converges_on_line() {
        let net = Net::start(&line(), StrategyKind::LinkState, |config| {
            config.strategy.link_state.cost_source = LinkCostSource::Static;
        });
        sleep(Duration::from_secs(5)).await;

        let routes = net.node("A").routes().await;
        assert_eq!(routes[&node("D")].next_hop, Some(node("B")));
        assert_eq!(routes[&node("D")].cost, 3.0);
        assert_eq!(routes[&node("C")].next_hop, Some(node("B")));

        let routes = net.node("D").routes().await;
        assert_eq!(routes[&node("A")].next_hop, Some(node("C")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_distance_vector_converges_on_line() {
        let mut net = Net::start(&line(), StrategyKind::DistanceVector, |_| {});
        sleep(Duration::from_secs(20)).await;

        let routes = net.node("A").routes().await;
        assert_eq!(routes[&node("B")].cost, 1.0);
        assert_eq!(routes[&node("C")].cost, 2.0);
        assert_eq!(routes[&node("D")].cost, 3.0);
        assert_eq!(routes[&node("D")].next_hop, Some(node("B")));

        net.node("A").send_data("D", json!("dv"), 12).await;
        assert_eq!(net.deliveries.get_mut("D").unwrap().recv().await.unwrap().payload, json!("dv"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_distance_vector_reroutes_around_dead_neighbor() {
        let diamond = graph(&[("A", "B", 1.0), ("B", "D", 1.0), ("A", "C", 2.0), ("C", "D", 2.0)]);
        let mut net = Net::start(&diamond, StrategyKind::DistanceVector, |_| {});
        sleep(Duration::from_secs(20)).await;

        let routes = net.node("A").routes().await;
        assert_eq!(routes[&node("D")].next_hop, Some(node("B")));
        assert_eq!(routes[&node("D")].cost, 2.0);

        net.nodes.remove("B").unwrap().shutdown().await;
        net.hub.disconnect(&node("B"));
        sleep(Duration::from_secs(20)).await;

        assert!(!net.node("A").alive_neighbors().contains(&node("B")));
        let routes = net.node("A").routes().await;
        assert_eq!(routes[&node("D")].next_hop, Some(node("C")));
        assert_eq!(routes[&node("D")].cost, 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_reports_round_trip() {
        let mut net = Net::start(&line(), StrategyKind::Static, |_| {});
        sleep(Duration::from_millis(100)).await;

        assert_eq!(net.node("A").ping("C").await, RoutingDecision::Forward(node("B")));

        let ping = net.deliveries.get_mut("C").unwrap().recv().await.unwrap();
        assert_eq!(ping.kind.as_deref(), Some(KIND_PING));

        let pong = net.deliveries.get_mut("A").unwrap().recv().await.unwrap();
        assert_eq!(pong.kind.as_deref(), Some(KIND_PONG));
        assert_eq!(pong.from, node("C"));
        assert!(pong.rtt.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_injected_ping_reports_round_trip_from_timestamp() {
        let mut net = Net::start(&line(), StrategyKind::Static, |_| {});
        sleep(Duration::from_millis(100)).await;

        // Entered at A from outside, so A has no record of sending it
        let ping = WireMessage::data("A", "C", DEFAULT_DATA_HOP_BUDGET, json!({ "ts": now_millis() }))
            .header(HEADER_KIND, KIND_PING);
        net.hub.send(&node("A"), encode(&ping).unwrap()).await.unwrap();

        let pong = net.deliveries.get_mut("A").unwrap().recv().await.unwrap();
        assert_eq!(pong.kind.as_deref(), Some(KIND_PONG));
        assert_eq!(pong.from, node("C"));
        assert!(pong.rtt.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_to_self_answers_locally() {
        let mut net = Net::start(&graph(&[("A", "B", 1.0)]), StrategyKind::Static, |_| {});

        assert_eq!(net.node("A").ping("A").await, RoutingDecision::Local);

        let got = net.drain("A");
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].kind.as_deref(), Some(KIND_PING));
        assert_eq!(got[1].kind.as_deref(), Some(KIND_PONG));
        assert_eq!(got[1].rtt, Some(Duration::ZERO));
        assert!(net.drain("B").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_distance_vector_advert_published_without_tick() {
        let hub = MemoryHub::new();
        let inbound = hub.register(&node("A"));
        let _b_inbound = hub.register(&node("B"));
        let mut config = RouterConfig::new(
            "A",
            StrategyKind::DistanceVector,
            graph(&[("A", "B", 1.0), ("B", "C", 1.0)]),
        );
        config.tick = Duration::from_secs(3600);
        config.hello_period = Duration::from_secs(3600);
        let (router, _rx) = RouterNode::start(config, Arc::new(hub.clone()), inbound);

        // Only the immediate first tick has run
        sleep(Duration::from_millis(10)).await;
        let routes = router.routes().await;
        assert!(routes.get(&node("C")).and_then(|r| r.next_hop.clone()).is_none());

        let advert = DistanceVectorAdvert::new(1, BTreeMap::from([(node("B"), 0.0), (node("C"), 1.0)]))
            .into_message(&node("B"), &node("A"), 1)
            .unwrap();
        hub.send(&node("A"), encode(&advert).unwrap()).await.unwrap();
        sleep(Duration::from_millis(10)).await;

        let routes = router.routes().await;
        assert_eq!(routes[&node("C")].next_hop, Some(node("B")));
        assert_eq!(routes[&node("C")].cost, 2.0);

        router.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_any_message_counts_as_contact() {
        let hub = MemoryHub::new();
        let inbound = hub.register(&node("A"));
        let _b_inbound = hub.register(&node("B"));
        let mut config = RouterConfig::new("A", StrategyKind::Static, graph(&[("A", "B", 1.0)]));
        config.hello_period = Duration::from_secs(3600);
        let (router, _rx) = RouterNode::start(config, Arc::new(hub.clone()), inbound);

        let data = WireMessage::data("B", "A", 4, json!("hi"));
        hub.send(&node("A"), encode(&data).unwrap()).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(router.alive_neighbors().contains(&node("B")));

        sleep(Duration::from_secs(8)).await;
        let lsa = LinkStateAdvert::new(node("B"), 1, BTreeMap::from([(node("A"), 1.0)]))
            .into_message(4)
            .unwrap();
        hub.send(&node("A"), encode(&lsa).unwrap()).await.unwrap();

        // Past dead_after since the data message, but the advertisement refreshed B
        sleep(Duration::from_secs(8)).await;
        assert!(router.alive_neighbors().contains(&node("B")));

        sleep(Duration::from_secs(3)).await;
        assert!(!router.alive_neighbors().contains(&node("B")));

        router.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_measure_neighbors() {
        let net = Net::start(&line(), StrategyKind::Static, |_| {});
        sleep(Duration::from_secs(1)).await;

        let metric = net.node("B").neighbor_metric("C").unwrap();
        assert!(metric.rtt.is_some());
        assert!(metric.last_seen.is_some());
        assert_eq!(net.node("B").alive_neighbors(), BTreeSet::from([node("A"), node("C")]));
        assert!(net.node("A").neighbor_metric("C").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_and_exhausted_input_dropped() {
        let net = Net::start(&graph(&[("A", "B", 1.0)]), StrategyKind::Static, |_| {});

        net.hub.send(&node("A"), Bytes::from_static(b"not json")).await.unwrap();
        let spent = encode(&WireMessage::data("B", "A", 0, json!(null))).unwrap();
        net.hub.send(&node("A"), spent).await.unwrap();
        sleep(Duration::from_millis(100)).await;

        let stats = net.node("A").stats().await;
        assert_eq!(stats.drop_reasons.get("malformed message"), Some(&1));
        assert_eq!(stats.drop_reasons.get("hop budget exhausted"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_bounded() {
        let net = Net::start(&line(), StrategyKind::DistanceVector, |_| {});
        sleep(Duration::from_secs(2)).await;

        let started = Instant::now();
        for (_, router) in net.nodes {
            router.shutdown().await;
        }
        assert!(started.elapsed() <= DEFAULT_SHUTDOWN_TIMEOUT * 4);
    }

    #[tokio::test]
    async fn test_routers_over_tcp() {
        let topology = graph(&[("A", "B", 1.0)]);
        let (a_listener, a_inbound) = TcpInbound::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let (b_listener, b_inbound) = TcpInbound::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let transport: Arc<dyn Transport> = Arc::new(TcpTransport::new(HashMap::from([
            (node("A"), a_listener.local_addr()),
            (node("B"), b_listener.local_addr()),
        ])));

        let (a, _a_rx) = RouterNode::start(
            RouterConfig::new("A", StrategyKind::Static, topology.clone()),
            transport.clone(),
            a_inbound,
        );
        let (b, mut b_rx) = RouterNode::start(
            RouterConfig::new("B", StrategyKind::Static, topology),
            transport,
            b_inbound,
        );

        assert_eq!(
            a.send_data("B", json!({"text": "over tcp"}), 4).await,
            RoutingDecision::Forward(node("B"))
        );
        let delivery = tokio::time::timeout(Duration::from_secs(5), b_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.payload, json!({"text": "over tcp"}));

        a.shutdown().await;
        b.shutdown().await;
    }
}
