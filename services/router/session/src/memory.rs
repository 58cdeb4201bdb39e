//! In-process publish/subscribe transport.
//!
//! One channel per node id. Routers sharing a [`MemoryHub`] exchange the same
//! encoded bytes they would put on a socket, which makes the hub usable both
//! as a single-process network and as the test network for multi-node
//! scenarios.

use crate::error::TransportError;
use crate::transport::{Inbound, Transport, INBOUND_CHANNEL_CAPACITY};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use router_wire::NodeId;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Shared in-memory network
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    channels: Arc<DashMap<NodeId, mpsc::Sender<Bytes>>>,
}

impl MemoryHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `node`; replaces any earlier subscription
    pub fn register(&self, node: &NodeId) -> Inbound {
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        self.channels.insert(node.clone(), tx);
        debug!(node = %node, "Registered on memory hub");
        rx
    }

    /// Remove `node`; further sends to it fail and its inbound stream ends
    pub fn disconnect(&self, node: &NodeId) -> bool {
        self.channels.remove(node).is_some()
    }

    /// Whether `node` is subscribed
    pub fn is_registered(&self, node: &NodeId) -> bool {
        self.channels.contains_key(node)
    }
}

#[async_trait]
impl Transport for MemoryHub {
    async fn send(&self, to: &NodeId, bytes: Bytes) -> Result<(), TransportError> {
        // Clone the sender out so no map guard is held while sending
        let tx = self
            .channels
            .get(to)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::UnknownPeer(to.clone()))?;

        tx.try_send(bytes).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::Unreachable(to.clone()),
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }
}
