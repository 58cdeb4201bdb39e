//! Transports, retrying sender and the router orchestrator.
//!
//! This crate connects the routing core to the outside world: a transport
//! seam that only knows "send bytes to a neighbor" plus an inbound byte
//! stream, two implementations of it, and [`RouterNode`], which runs the
//! inbound, maintenance and liveness loops of one router instance.
//!
//! ## Features
//!
//! - **TCP Transport**: one connection per message, length-prefixed frames
//! - **Memory Hub**: in-process publish/subscribe network, one channel per node
//! - **Retry**: bounded attempts with backoff and a per-attempt timeout
//! - **Orchestrator**: strategy dispatch, table publication, probes, pings
//!
//! ## Example
//!
//! ```rust,no_run
//! use router_routing::StrategyKind;
//! use router_session::{MemoryHub, RouterConfig, RouterNode};
//! use router_topology::Graph;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example(topology: Graph) {
//! let hub = MemoryHub::new();
//! let inbound = hub.register(&"A".into());
//! let config = RouterConfig::new("A", StrategyKind::DistanceVector, topology);
//! let (router, mut deliveries) = RouterNode::start(config, Arc::new(hub.clone()), inbound);
//!
//! router.send_data("D", json!({"text": "hello"}), 12).await;
//! while let Some(delivery) = deliveries.recv().await {
//!     println!("{} says {}", delivery.from, delivery.payload);
//! }
//! router.shutdown().await;
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod memory;
pub mod node;
pub mod retry;
pub mod transport;

// Re-export main types
pub use error::TransportError;
pub use memory::MemoryHub;
pub use node::{
    Delivery, RouterConfig, RouterNode, DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_TICK, KIND_PING, KIND_PONG,
};
pub use retry::{send_with_retry, RetryPolicy};
pub use transport::{
    connect_tcp, listen_tcp, Inbound, TcpInbound, TcpTransport, Transport, DEFAULT_CONNECT_TIMEOUT,
};
