//! Transport error types.

use router_wire::{NodeId, WireError};
use std::time::Duration;
use thiserror::Error;

/// Errors from sending bytes to a neighbor
#[derive(Error, Debug)]
pub enum TransportError {
    /// No address or channel is known for the peer
    #[error("unknown peer {0}")]
    UnknownPeer(NodeId),

    /// Peer exists but cannot take the message right now
    #[error("peer {0} unreachable")]
    Unreachable(NodeId),

    /// Send did not complete in time
    #[error("send to {peer} timed out after {after:?}")]
    Timeout {
        /// Destination
        peer: NodeId,
        /// Elapsed limit
        after: Duration,
    },

    /// Socket error
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Message could not be framed
    #[error("wire: {0}")]
    Wire(#[from] WireError),

    /// Transport shut down
    #[error("transport closed")]
    Closed,
}
