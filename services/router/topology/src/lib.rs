//! Weighted topology graph, shortest-path computation and link-state database.
//!
//! This crate provides the route-computation core shared by the static and
//! link-state strategies: an explicit weighted graph, a Dijkstra engine that
//! derives the next hop toward every destination, and a database of the most
//! recent link-state advertisement per origin from which the graph is rebuilt.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod graph;
pub mod link_state;
pub mod spf;

pub use graph::{insert_undirected_min, nodes, Graph};
pub use link_state::*;
pub use spf::{shortest_paths, PathResult};
