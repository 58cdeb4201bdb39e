//! Wire message envelope, header map, control payloads, codec and stream
//! framing for the overlay router.
//!
//! Every message exchanged between routers is a [`WireMessage`]: a typed
//! envelope (`probe`, `probe_ack`, `link_state_advert`,
//! `distance_vector_advert`, `data`) carrying source, destination, a hop
//! budget, a [`Headers`] map and an opaque JSON payload.
//!
//! ## Wire Format
//!
//! ```text
//! {
//!   "type": "data",
//!   "from": "A",
//!   "to": "D",                 // or "*" for broadcast
//!   "hop_budget": 12,
//!   "headers": {"id": "...", "timestamp": 1700000000000, ...},
//!   "payload": {...}
//! }
//! ```
//!
//! Stream transports prefix each encoded message with a big-endian `u32`
//! length (see [`frame`]).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod control;
pub mod error;
pub mod frame;
pub mod header;
pub mod message;

// Re-export main types
pub use codec::{decode, encode};
pub use control::{
    probe, probe_ack, DistanceVectorAdvert, LinkStateAdvert, DISTANCE_VECTOR_HOP_BUDGET,
    LINK_STATE_HOP_BUDGET,
};
pub use error::WireError;
pub use frame::{encode_frame, FrameDecoder, DEFAULT_MAX_FRAME_SIZE};
pub use header::{
    fresh_id, now_millis, Headers, HEADER_ID, HEADER_KIND, HEADER_ORIGIN, HEADER_PREVIOUS_HOP,
    HEADER_REPLY_TO, HEADER_SEQUENCE, HEADER_TIMESTAMP,
};
pub use message::{
    MessageType, NodeId, WireMessage, BROADCAST, DEFAULT_DATA_HOP_BUDGET, PROBE_HOP_BUDGET,
};
