//! The message envelope exchanged between routers.

use crate::error::WireError;
use crate::header::{Headers, HEADER_PREVIOUS_HOP};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Destination sentinel addressing every node
pub const BROADCAST: &str = "*";

/// Default hop budget for application data
pub const DEFAULT_DATA_HOP_BUDGET: u32 = 12;

/// Hop budget for probes and probe acks
pub const PROBE_HOP_BUDGET: u32 = 4;

/// Logical node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The broadcast sentinel
    pub fn broadcast() -> Self {
        Self(BROADCAST.to_string())
    }

    /// Whether this is the broadcast sentinel
    pub fn is_broadcast(&self) -> bool {
        self.0 == BROADCAST
    }

    /// Borrow as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Liveness probe
    Probe,
    /// Reply to a liveness probe
    ProbeAck,
    /// Flooded link-state advertisement
    LinkStateAdvert,
    /// Distance vector sent to a direct neighbor
    DistanceVectorAdvert,
    /// Application data
    Data,
}

impl MessageType {
    /// Wire name of this type
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Probe => "probe",
            MessageType::ProbeAck => "probe_ack",
            MessageType::LinkStateAdvert => "link_state_advert",
            MessageType::DistanceVectorAdvert => "distance_vector_advert",
            MessageType::Data => "data",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "probe" => Ok(MessageType::Probe),
            "probe_ack" => Ok(MessageType::ProbeAck),
            "link_state_advert" => Ok(MessageType::LinkStateAdvert),
            "distance_vector_advert" => Ok(MessageType::DistanceVectorAdvert),
            "data" => Ok(MessageType::Data),
            other => Err(WireError::UnknownType(other.to_string())),
        }
    }
}

/// Message envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireMessage {
    /// Message type
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    /// Source node
    pub from: NodeId,
    /// Destination node or [`BROADCAST`]
    pub to: NodeId,
    /// Remaining forwards permitted
    pub hop_budget: u32,
    /// Header map (always carries `id` and `timestamp`)
    pub headers: Headers,
    /// Opaque payload
    pub payload: Value,
}

impl WireMessage {
    /// Build a message with a fresh id and timestamp
    pub fn new(
        msg_type: MessageType,
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        hop_budget: u32,
        payload: Value,
    ) -> Self {
        Self::with_headers(msg_type, from, to, hop_budget, Headers::fresh(), payload)
    }

    /// Build a message around existing headers, filling `id`/`timestamp` if absent
    pub fn with_headers(
        msg_type: MessageType,
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        hop_budget: u32,
        mut headers: Headers,
        payload: Value,
    ) -> Self {
        headers.ensure_identity();
        Self {
            msg_type,
            from: from.into(),
            to: to.into(),
            hop_budget,
            headers,
            payload,
        }
    }

    /// Application data message
    pub fn data(from: impl Into<NodeId>, to: impl Into<NodeId>, hop_budget: u32, payload: Value) -> Self {
        Self::new(MessageType::Data, from, to, hop_budget, payload)
    }

    /// Builder-style header insert
    pub fn header(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.headers.set(key, value);
        self
    }

    /// Message identity
    pub fn id(&self) -> &str {
        self.headers.id()
    }

    /// Whether the destination is the broadcast sentinel
    pub fn is_broadcast(&self) -> bool {
        self.to.is_broadcast()
    }

    /// Whether this node should deliver the message locally
    pub fn is_for(&self, node: &NodeId) -> bool {
        self.is_broadcast() || &self.to == node
    }

    /// The node that transmitted this copy: `previous_hop` when forwarded, else `from`
    pub fn sender(&self) -> NodeId {
        match self.headers.previous_hop() {
            Some(hop) => NodeId::from(hop),
            None => self.from.clone(),
        }
    }

    /// Copy for an intermediate hop: budget decremented by one and
    /// `previous_hop` set to `me`. Returns `None` when the copy would carry a
    /// zero budget, which is never transmitted.
    pub fn forwarded_by(&self, me: &NodeId) -> Option<WireMessage> {
        let budget = self.hop_budget.checked_sub(1).filter(|b| *b > 0)?;
        let mut copy = self.clone();
        copy.hop_budget = budget;
        copy.headers.set(HEADER_PREVIOUS_HOP, me.as_str());
        Some(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let msg = WireMessage::data("A", "D", 12, json!({"text": "hello"}));
        assert_eq!(msg.msg_type, MessageType::Data);
        assert_eq!(msg.from, NodeId::from("A"));
        assert_eq!(msg.to.as_str(), "D");
        assert!(!msg.id().is_empty());
        assert!(msg.headers.validate().is_ok());
        assert!(msg.is_for(&NodeId::from("D")));
        assert!(!msg.is_for(&NodeId::from("B")));
    }

    #[test]
    fn test_broadcast_is_for_everyone() {
        let msg = WireMessage::data("A", NodeId::broadcast(), 3, Value::Null);
        assert!(msg.is_broadcast());
        assert!(msg.is_for(&NodeId::from("Z")));
    }

    #[test]
    fn test_forwarded_copy_decrements_budget() {
        let msg = WireMessage::data("A", "D", 3, Value::Null);
        let me = NodeId::from("B");

        let copy = msg.forwarded_by(&me).unwrap();
        assert_eq!(copy.hop_budget, 2);
        assert_eq!(copy.headers.previous_hop(), Some("B"));
        assert_eq!(copy.id(), msg.id());
        assert_eq!(copy.sender(), me);
        assert_eq!(msg.sender(), NodeId::from("A"));
    }

    #[test]
    fn test_forwarded_copy_never_reaches_zero() {
        let me = NodeId::from("B");
        assert!(WireMessage::data("A", "D", 1, Value::Null).forwarded_by(&me).is_none());
        assert!(WireMessage::data("A", "D", 0, Value::Null).forwarded_by(&me).is_none());
    }

    #[test]
    fn test_message_type_names() {
        for typ in [
            MessageType::Probe,
            MessageType::ProbeAck,
            MessageType::LinkStateAdvert,
            MessageType::DistanceVectorAdvert,
            MessageType::Data,
        ] {
            assert_eq!(typ.as_str().parse::<MessageType>().unwrap(), typ);
        }
        assert!(matches!(
            "hello".parse::<MessageType>(),
            Err(WireError::UnknownType(_))
        ));
    }
}
