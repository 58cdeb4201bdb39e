//! Broadcast with deduplication.
//!
//! Each distinct message id is forwarded at most once per node, never back
//! to the node that delivered it, and only while its hop budget allows.

use crate::neighbor::NeighborTable;
use crate::router::Outbound;
use router_wire::{NodeId, WireMessage};
use std::collections::{HashSet, VecDeque};
use tokio::time::Instant;
use tracing::debug;

/// Default capacity of the dedup set
pub const DEFAULT_SEEN_CAPACITY: usize = 65_536;

/// What to do with a message offered to the flooder
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FloodOutcome {
    /// Id was already seen; nothing else applies
    pub duplicate: bool,
    /// Message addresses this node (directly or by broadcast)
    pub deliver: bool,
    /// Copies to send
    pub outbound: Vec<Outbound>,
}

/// Flooding forwarder state: a bounded set of seen message ids
#[derive(Debug)]
pub struct Flooder {
    local: NodeId,
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl Flooder {
    /// Create a flooder with the default dedup capacity
    pub fn new(local: NodeId) -> Self {
        Self::with_capacity(local, DEFAULT_SEEN_CAPACITY)
    }

    /// Create a flooder remembering at most `capacity` ids
    pub fn with_capacity(local: NodeId, capacity: usize) -> Self {
        Self {
            local,
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Whether `id` has been seen
    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Ids currently remembered
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Record `id`; returns false if it was already known
    fn mark_seen(&mut self, id: &str) -> bool {
        if !self.seen.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    /// Start flooding a locally originated message with its full hop budget
    pub fn originate(&mut self, msg: WireMessage, neighbors: &NeighborTable, now: Instant) -> Vec<Outbound> {
        if !self.mark_seen(msg.id()) || msg.hop_budget == 0 {
            return Vec::new();
        }

        neighbors
            .flood_targets(now)
            .into_iter()
            .map(|to| Outbound::new(to, msg.clone()))
            .collect()
    }

    /// Handle a received message
    pub fn handle(&mut self, msg: &WireMessage, neighbors: &NeighborTable, now: Instant) -> FloodOutcome {
        if !self.mark_seen(msg.id()) {
            debug!(id = msg.id(), "Dropping duplicate flooded message");
            return FloodOutcome {
                duplicate: true,
                ..FloodOutcome::default()
            };
        }

        let deliver = msg.is_for(&self.local);
        if deliver && !msg.is_broadcast() {
            return FloodOutcome {
                deliver,
                ..FloodOutcome::default()
            };
        }

        let Some(copy) = msg.forwarded_by(&self.local) else {
            return FloodOutcome {
                deliver,
                ..FloodOutcome::default()
            };
        };

        let sender = msg.sender();
        let outbound = neighbors
            .flood_targets(now)
            .into_iter()
            .filter(|n| n != &sender)
            .map(|to| Outbound::new(to, copy.clone()))
            .collect::<Vec<_>>();

        debug!(
            id = msg.id(),
            dst = %msg.to,
            copies = outbound.len(),
            hop_budget = copy.hop_budget,
            "Flooding message"
        );

        FloodOutcome {
            duplicate: false,
            deliver,
            outbound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_wire::HEADER_PREVIOUS_HOP;
    use serde_json::Value;
    use std::collections::{BTreeMap, HashMap};
    use std::time::Duration;

    fn node(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn ring() -> Vec<(NodeId, NeighborTable)> {
        let links = [("A", ["B", "D"]), ("B", ["A", "C"]), ("C", ["B", "D"]), ("D", ["C", "A"])];
        links
            .iter()
            .map(|(me, ns)| {
                let configured = ns.iter().map(|n| (node(n), 1.0)).collect::<BTreeMap<_, _>>();
                (node(me), NeighborTable::new(node(me), configured, Duration::from_secs(10)))
            })
            .collect()
    }

    /// Flood one broadcast from A around the ring; returns per-node delivery
    /// counts and per-node forward counts
    fn flood_ring(hop_budget: u32) -> (HashMap<NodeId, usize>, HashMap<NodeId, usize>) {
        let now = Instant::now();
        let tables = ring();
        let mut flooders: HashMap<NodeId, Flooder> =
            tables.iter().map(|(id, _)| (id.clone(), Flooder::new(id.clone()))).collect();
        let tables: HashMap<NodeId, NeighborTable> = tables.into_iter().collect();

        let mut delivered = HashMap::new();
        let mut forwarded = HashMap::new();

        let msg = WireMessage::data("A", NodeId::broadcast(), hop_budget, Value::Null);
        let mut queue: VecDeque<Outbound> = flooders
            .get_mut(&node("A"))
            .unwrap()
            .originate(msg, &tables[&node("A")], now)
            .into();

        while let Some(out) = queue.pop_front() {
            let flooder = flooders.get_mut(&out.to).unwrap();
            let outcome = flooder.handle(&out.message, &tables[&out.to], now);
            if outcome.deliver {
                *delivered.entry(out.to.clone()).or_insert(0) += 1;
            }
            if !outcome.outbound.is_empty() {
                *forwarded.entry(out.to.clone()).or_insert(0) += 1;
            }
            queue.extend(outcome.outbound);
        }
        (delivered, forwarded)
    }

    #[test]
    fn test_ring_budget_two_reaches_every_node_once() {
        let (delivered, forwarded) = flood_ring(2);
        for id in ["B", "C", "D"] {
            assert_eq!(delivered.get(&node(id)), Some(&1), "node {id}");
        }
        assert_eq!(delivered.get(&node("A")), None);
        assert!(forwarded.values().all(|&n| n <= 1));
    }

    #[test]
    fn test_ring_budget_one_reaches_direct_neighbors_only() {
        let (delivered, forwarded) = flood_ring(1);
        assert_eq!(delivered.get(&node("B")), Some(&1));
        assert_eq!(delivered.get(&node("D")), Some(&1));
        assert_eq!(delivered.get(&node("C")), None);
        assert!(forwarded.is_empty());
    }

    #[test]
    fn test_never_sent_back_to_sender() {
        let tables = ring();
        let (_, b_table) = &tables[1];
        let mut flooder = Flooder::new(node("B"));

        let msg = WireMessage::data("A", NodeId::broadcast(), 5, Value::Null);
        let outcome = flooder.handle(&msg, b_table, Instant::now());

        assert!(outcome.deliver);
        assert_eq!(outcome.outbound.len(), 1);
        let copy = &outcome.outbound[0];
        assert_eq!(copy.to, node("C"));
        assert_eq!(copy.message.hop_budget, 4);
        assert_eq!(copy.message.headers.get_str(HEADER_PREVIOUS_HOP), Some("B"));
        assert_eq!(copy.message.id(), msg.id());

        // Same id again is a duplicate
        assert!(flooder.handle(&msg, b_table, Instant::now()).duplicate);
    }

    #[test]
    fn test_unicast_for_self_is_delivered_not_forwarded() {
        let tables = ring();
        let (_, c_table) = &tables[2];
        let mut flooder = Flooder::new(node("C"));

        let msg = WireMessage::data("A", "C", 5, Value::Null);
        let outcome = flooder.handle(&msg, c_table, Instant::now());
        assert!(outcome.deliver);
        assert!(outcome.outbound.is_empty());

        let msg = WireMessage::data("A", "Z", 5, Value::Null);
        let outcome = flooder.handle(&msg, c_table, Instant::now());
        assert!(!outcome.deliver);
        assert_eq!(outcome.outbound.len(), 2);
    }

    #[test]
    fn test_dedup_set_is_bounded() {
        let tables = ring();
        let (_, a_table) = &tables[0];
        let mut flooder = Flooder::with_capacity(node("A"), 2);

        let first = WireMessage::data("B", "Z", 3, Value::Null);
        flooder.handle(&first, a_table, Instant::now());
        for _ in 0..2 {
            flooder.handle(&WireMessage::data("B", "Z", 3, Value::Null), a_table, Instant::now());
        }

        assert_eq!(flooder.seen_count(), 2);
        assert!(!flooder.has_seen(first.id()));
    }
}
