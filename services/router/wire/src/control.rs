//! Control-plane message structures: liveness probes, link-state and
//! distance-vector advertisements.

use crate::error::WireError;
use crate::header::{Headers, HEADER_ORIGIN, HEADER_REPLY_TO, HEADER_SEQUENCE};
use crate::message::{MessageType, NodeId, WireMessage, PROBE_HOP_BUDGET};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Default hop budget for flooded link-state advertisements
pub const LINK_STATE_HOP_BUDGET: u32 = 16;

/// Default hop budget for distance-vector advertisements
pub const DISTANCE_VECTOR_HOP_BUDGET: u32 = 8;

/// Build a liveness probe with a fresh id
pub fn probe(from: &NodeId, to: &NodeId) -> WireMessage {
    WireMessage::new(MessageType::Probe, from.clone(), to.clone(), PROBE_HOP_BUDGET, Value::Null)
}

/// Build the ack for a probe; the ack references the probe's id
pub fn probe_ack(me: &NodeId, probe: &WireMessage) -> WireMessage {
    WireMessage::new(
        MessageType::ProbeAck,
        me.clone(),
        probe.from.clone(),
        PROBE_HOP_BUDGET,
        Value::Null,
    )
    .header(HEADER_REPLY_TO, probe.id())
}

fn expect_type(msg: &WireMessage, expected: MessageType) -> Result<(), WireError> {
    if msg.msg_type == expected {
        Ok(())
    } else {
        Err(WireError::invalid("type", format!("expected {expected}, got {}", msg.msg_type)))
    }
}

fn validate_cost(field: &'static str, cost: f64) -> Result<f64, WireError> {
    if cost.is_finite() && cost >= 0.0 {
        Ok(cost)
    } else {
        Err(WireError::invalid(field, format!("cost {cost} is not a finite non-negative number")))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LinkStatePayload {
    neighbors: BTreeMap<NodeId, f64>,
}

/// A node's snapshot of its neighbor costs, flooded network-wide
#[derive(Debug, Clone, PartialEq)]
pub struct LinkStateAdvert {
    /// Node that originated this advertisement
    pub origin: NodeId,
    /// Per-origin sequence number for freshness
    pub sequence: u64,
    /// Cost to each neighbor of the origin
    pub neighbors: BTreeMap<NodeId, f64>,
}

impl LinkStateAdvert {
    /// Create a new advertisement
    pub fn new(origin: NodeId, sequence: u64, neighbors: BTreeMap<NodeId, f64>) -> Self {
        Self {
            origin,
            sequence,
            neighbors,
        }
    }

    /// Deterministic id (`origin:sequence`) so every re-flood dedups network-wide
    pub fn message_id(&self) -> String {
        format!("{}:{}", self.origin, self.sequence)
    }

    /// Wrap into a broadcast message tagged with `{origin, sequence}`
    pub fn into_message(self, hop_budget: u32) -> Result<WireMessage, WireError> {
        let mut headers = Headers::new(self.message_id(), crate::header::now_millis());
        headers.set(HEADER_ORIGIN, self.origin.as_str());
        headers.set(HEADER_SEQUENCE, self.sequence);
        let payload = serde_json::to_value(LinkStatePayload {
            neighbors: self.neighbors,
        })?;

        Ok(WireMessage::with_headers(
            MessageType::LinkStateAdvert,
            self.origin,
            NodeId::broadcast(),
            hop_budget,
            headers,
            payload,
        ))
    }

    /// Extract from a received message
    pub fn from_message(msg: &WireMessage) -> Result<Self, WireError> {
        expect_type(msg, MessageType::LinkStateAdvert)?;
        let origin = msg
            .headers
            .origin()
            .ok_or(WireError::MissingField("headers.origin"))?;
        let sequence = msg
            .headers
            .sequence()
            .ok_or(WireError::MissingField("headers.sequence"))?;
        let payload: LinkStatePayload = serde_json::from_value(msg.payload.clone())?;
        for cost in payload.neighbors.values() {
            validate_cost("payload.neighbors", *cost)?;
        }

        Ok(Self {
            origin: NodeId::from(origin),
            sequence,
            neighbors: payload.neighbors,
        })
    }
}

/// Unreachable costs travel as JSON `null` since JSON has no infinity
#[derive(Debug, Serialize, Deserialize)]
struct DistanceVectorPayload {
    sequence: u64,
    vector: BTreeMap<NodeId, Option<f64>>,
}

/// A node's cost-to-every-destination belief, sent to one direct neighbor
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceVectorAdvert {
    /// Advertiser's sequence number
    pub sequence: u64,
    /// Cost per destination; `f64::INFINITY` means unreachable
    pub vector: BTreeMap<NodeId, f64>,
}

impl DistanceVectorAdvert {
    /// Create a new advertisement
    pub fn new(sequence: u64, vector: BTreeMap<NodeId, f64>) -> Self {
        Self { sequence, vector }
    }

    /// Wrap into a message addressed to one neighbor
    pub fn into_message(self, from: &NodeId, to: &NodeId, hop_budget: u32) -> Result<WireMessage, WireError> {
        let vector = self
            .vector
            .into_iter()
            .map(|(dst, cost)| (dst, cost.is_finite().then_some(cost)))
            .collect();
        let payload = serde_json::to_value(DistanceVectorPayload {
            sequence: self.sequence,
            vector,
        })?;

        Ok(WireMessage::new(
            MessageType::DistanceVectorAdvert,
            from.clone(),
            to.clone(),
            hop_budget,
            payload,
        )
        .header(HEADER_SEQUENCE, self.sequence))
    }

    /// Extract from a received message
    pub fn from_message(msg: &WireMessage) -> Result<Self, WireError> {
        expect_type(msg, MessageType::DistanceVectorAdvert)?;
        let payload: DistanceVectorPayload = serde_json::from_value(msg.payload.clone())?;
        let mut vector = BTreeMap::new();
        for (dst, cost) in payload.vector {
            let cost = match cost {
                Some(c) => validate_cost("payload.vector", c)?,
                None => f64::INFINITY,
            };
            vector.insert(dst, cost);
        }

        Ok(Self {
            sequence: payload.sequence,
            vector,
        })
    }
}
