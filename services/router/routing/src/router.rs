//! Routing decisions, outbound sends and router statistics

use router_wire::{NodeId, WireMessage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Routing decision result for a data message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Forward to next hop
    Forward(NodeId),
    /// Deliver locally (we are the destination)
    Local,
    /// Drop the message
    Drop(DropReason),
}

/// Reason for dropping a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    /// No route to destination
    NoRoute,
    /// Hop budget exhausted
    HopBudgetExhausted,
    /// Already seen this message id
    Duplicate,
    /// Could not be decoded
    Malformed,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::NoRoute => write!(f, "no route to destination"),
            DropReason::HopBudgetExhausted => write!(f, "hop budget exhausted"),
            DropReason::Duplicate => write!(f, "duplicate"),
            DropReason::Malformed => write!(f, "malformed message"),
        }
    }
}

/// A message to hand to the transport, addressed to one direct neighbor
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    /// Neighbor to send to
    pub to: NodeId,
    /// Message to send
    pub message: WireMessage,
}

impl Outbound {
    /// Create a new outbound send
    pub fn new(to: NodeId, message: WireMessage) -> Self {
        Self { to, message }
    }
}

/// Control-plane output of a routing strategy
#[derive(Debug, Clone, PartialEq)]
pub enum Emit {
    /// Originate through the flooding forwarder
    Flood(WireMessage),
    /// Send directly to one neighbor
    Send(Outbound),
}

/// Router statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterStats {
    /// Local node ID
    pub local_node_id: NodeId,
    /// Total number of routes
    pub total_routes: usize,
    /// Routing table publications so far
    pub epoch: u64,
    /// Number of routing decisions made
    pub decisions_made: u64,
    /// Number of messages forwarded
    pub messages_forwarded: u64,
    /// Number of messages delivered locally
    pub messages_local: u64,
    /// Number of messages dropped
    pub messages_dropped: u64,
    /// Breakdown of drop reasons
    pub drop_reasons: HashMap<String, u64>,
}

impl RouterStats {
    /// Create new router statistics
    pub fn new(local_node_id: NodeId) -> Self {
        Self {
            local_node_id,
            total_routes: 0,
            epoch: 0,
            decisions_made: 0,
            messages_forwarded: 0,
            messages_local: 0,
            messages_dropped: 0,
            drop_reasons: HashMap::new(),
        }
    }
}
