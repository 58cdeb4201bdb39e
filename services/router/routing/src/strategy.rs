//! The route-computation seam: one [`RoutingStrategy`] per router instance.

use crate::distance_vector::{DistanceVectorConfig, DistanceVectorEngine};
use crate::error::RoutingError;
use crate::link_state::{LinkStateConfig, LinkStateEngine};
use crate::neighbor::NeighborTable;
use crate::router::Emit;
use crate::static_routes::{FloodingStrategy, StaticStrategy};
use crate::table::RouteSnapshot;
use router_topology::Graph;
use router_wire::{NodeId, WireMessage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;

/// Available strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Dijkstra over the configured topology
    Static,
    /// Flood every data message
    Flooding,
    /// Flooded link-state advertisements plus Dijkstra
    LinkState,
    /// Distributed Bellman-Ford
    DistanceVector,
}

impl StrategyKind {
    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Static => "static",
            StrategyKind::Flooding => "flooding",
            StrategyKind::LinkState => "link-state",
            StrategyKind::DistanceVector => "distance-vector",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "static" | "dijkstra" => Ok(StrategyKind::Static),
            "flooding" | "flood" => Ok(StrategyKind::Flooding),
            "link-state" | "link_state" | "lsr" => Ok(StrategyKind::LinkState),
            "distance-vector" | "distance_vector" | "dvr" => Ok(StrategyKind::DistanceVector),
            other => Err(RoutingError::UnknownMode(other.to_string())),
        }
    }
}

/// Result of one maintenance cycle
#[derive(Debug, Default)]
pub struct Tick {
    /// Routes to publish, if they changed
    pub routes: Option<RouteSnapshot>,
    /// Control messages to send
    pub emits: Vec<Emit>,
}

/// A route-computation strategy.
///
/// Implementations are sans-IO: they never send anything themselves and
/// take the current time from the caller.
pub trait RoutingStrategy: Send {
    /// Which strategy this is
    fn kind(&self) -> StrategyKind;

    /// Drop state that is too old
    fn expire(&mut self, neighbors: &NeighborTable, now: Instant);

    /// Control messages due now
    fn advertise(&mut self, neighbors: &NeighborTable, now: Instant) -> Result<Vec<Emit>, RoutingError>;

    /// Handle a received advertisement. Returns routes to publish
    /// immediately, if any.
    fn on_receive(
        &mut self,
        msg: &WireMessage,
        neighbors: &NeighborTable,
        now: Instant,
    ) -> Result<Option<RouteSnapshot>, RoutingError>;

    /// Recompute routes; `None` when nothing changed
    fn recompute(&mut self, neighbors: &NeighborTable, now: Instant) -> Option<RouteSnapshot>;

    /// One maintenance cycle: expire, recompute, advertise
    fn tick(&mut self, neighbors: &NeighborTable, now: Instant) -> Result<Tick, RoutingError> {
        self.expire(neighbors, now);
        let routes = self.recompute(neighbors, now);
        let emits = self.advertise(neighbors, now)?;
        Ok(Tick { routes, emits })
    }

    /// Whether data messages are flooded instead of table-routed
    fn floods_data(&self) -> bool {
        false
    }

    /// A neighbor's measured cost changed
    fn on_link_change(&mut self, _neighbor: &NodeId) {}
}

/// Per-strategy tuning
#[derive(Debug, Clone, Default)]
pub struct StrategyConfig {
    /// Link-state engine settings
    pub link_state: LinkStateConfig,
    /// Distance-vector engine settings
    pub distance_vector: DistanceVectorConfig,
}

/// Build the strategy for `kind`
pub fn build_strategy(
    kind: StrategyKind,
    local: &NodeId,
    topology: &Graph,
    config: &StrategyConfig,
) -> Box<dyn RoutingStrategy> {
    match kind {
        StrategyKind::Static => Box::new(StaticStrategy::new(local.clone(), topology.clone())),
        StrategyKind::Flooding => Box::new(FloodingStrategy::new()),
        StrategyKind::LinkState => Box::new(LinkStateEngine::new(local.clone(), config.link_state.clone())),
        StrategyKind::DistanceVector => Box::new(DistanceVectorEngine::new(
            local.clone(),
            config.distance_vector.clone(),
        )),
    }
}
