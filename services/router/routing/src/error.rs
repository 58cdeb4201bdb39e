//! Routing error types.

use router_wire::{NodeId, WireError};
use thiserror::Error;

/// Errors raised while handling control-plane input.
///
/// None of these is fatal; callers log at debug level and continue.
#[derive(Error, Debug)]
pub enum RoutingError {
    /// Control message from a node that is not a configured neighbor
    #[error("{0} is not a configured neighbor")]
    NotNeighbor(NodeId),

    /// Advertisement not newer than what is already stored
    #[error("stale advertisement from {origin}: sequence {sequence} <= stored {stored}")]
    Stale {
        /// Advertisement origin
        origin: NodeId,
        /// Received sequence
        sequence: u64,
        /// Stored sequence
        stored: u64,
    },

    /// Payload could not be interpreted
    #[error("bad payload: {0}")]
    BadPayload(#[from] WireError),

    /// Routing mode name not recognized
    #[error("unknown routing mode {0}")]
    UnknownMode(String),
}

impl RoutingError {
    /// Whether this is stale or untrusted control information rather than a
    /// malformed message
    pub fn is_stale(&self) -> bool {
        matches!(self, RoutingError::Stale { .. } | RoutingError::NotNeighbor(_))
    }
}
