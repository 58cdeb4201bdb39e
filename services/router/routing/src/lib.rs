//! Routing table, neighbor liveness, flooding forwarder and route-computation
//! strategies for the overlay router.
//!
//! This crate provides the routing core: a shared routing table replaced as
//! whole snapshots, per-neighbor liveness and link cost, a deduplicating
//! flooding forwarder, and four interchangeable strategies (static Dijkstra,
//! flooding, link-state and distance-vector) behind [`RoutingStrategy`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod distance_vector;
pub mod error;
pub mod flooding;
pub mod link_state;
pub mod neighbor;
pub mod router;
pub mod static_routes;
pub mod strategy;
pub mod table;

pub use distance_vector::{DistanceVectorConfig, DistanceVectorEngine, DISTANCE_VECTOR_INFINITY};
pub use error::RoutingError;
pub use flooding::{FloodOutcome, Flooder, DEFAULT_SEEN_CAPACITY};
pub use link_state::{LinkStateConfig, LinkStateEngine};
pub use neighbor::*;
pub use router::*;
pub use static_routes::{FloodingStrategy, StaticStrategy};
pub use strategy::*;
pub use table::*;
