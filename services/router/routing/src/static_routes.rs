//! Strategies without a control plane: static shortest paths over the
//! configured topology, and pure flooding.

use crate::error::RoutingError;
use crate::neighbor::NeighborTable;
use crate::router::Emit;
use crate::strategy::{RoutingStrategy, StrategyKind};
use crate::table::{snapshot_from_paths, RouteSnapshot};
use router_topology::{shortest_paths, Graph};
use router_wire::{NodeId, WireMessage};
use tokio::time::Instant;
use tracing::info;

/// Dijkstra over the configured topology, computed once
#[derive(Debug)]
pub struct StaticStrategy {
    local: NodeId,
    graph: Graph,
    published: bool,
}

impl StaticStrategy {
    /// Create a static strategy over `graph`
    pub fn new(local: NodeId, graph: Graph) -> Self {
        Self {
            local,
            graph,
            published: false,
        }
    }
}

impl RoutingStrategy for StaticStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Static
    }

    fn expire(&mut self, _neighbors: &NeighborTable, _now: Instant) {}

    fn advertise(&mut self, _neighbors: &NeighborTable, _now: Instant) -> Result<Vec<Emit>, RoutingError> {
        Ok(Vec::new())
    }

    fn on_receive(
        &mut self,
        _msg: &WireMessage,
        _neighbors: &NeighborTable,
        _now: Instant,
    ) -> Result<Option<RouteSnapshot>, RoutingError> {
        Ok(None)
    }

    fn recompute(&mut self, _neighbors: &NeighborTable, _now: Instant) -> Option<RouteSnapshot> {
        if self.published {
            return None;
        }
        self.published = true;

        let result = shortest_paths(&self.graph, &self.local);
        info!(destinations = result.distances.len(), "Computed static routes");
        Some(snapshot_from_paths(&result))
    }
}

/// Flood every data message; the routing table only holds the self entry
#[derive(Debug, Default)]
pub struct FloodingStrategy {
    published: bool,
}

impl FloodingStrategy {
    /// Create a flooding strategy
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoutingStrategy for FloodingStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Flooding
    }

    fn expire(&mut self, _neighbors: &NeighborTable, _now: Instant) {}

    fn advertise(&mut self, _neighbors: &NeighborTable, _now: Instant) -> Result<Vec<Emit>, RoutingError> {
        Ok(Vec::new())
    }

    fn on_receive(
        &mut self,
        _msg: &WireMessage,
        _neighbors: &NeighborTable,
        _now: Instant,
    ) -> Result<Option<RouteSnapshot>, RoutingError> {
        Ok(None)
    }

    fn recompute(&mut self, _neighbors: &NeighborTable, _now: Instant) -> Option<RouteSnapshot> {
        (!std::mem::replace(&mut self.published, true)).then(RouteSnapshot::new)
    }

    fn floods_data(&self) -> bool {
        true
    }
}
