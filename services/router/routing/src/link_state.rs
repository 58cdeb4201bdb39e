//! Link-state routing: originate advertisements of local neighbor costs,
//! keep the most recent advertisement per origin and run shortest paths over
//! the reconstructed topology.

use crate::error::RoutingError;
use crate::neighbor::{LinkCostSource, NeighborTable};
use crate::router::Emit;
use crate::strategy::{RoutingStrategy, StrategyKind, Tick};
use crate::table::{snapshot_from_paths, RouteSnapshot};
use router_topology::{Acceptance, LinkStateDatabase, DEFAULT_MAX_RECORD_AGE};
use router_wire::{LinkStateAdvert, NodeId, WireMessage, LINK_STATE_HOP_BUDGET};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Link-state engine configuration
#[derive(Debug, Clone)]
pub struct LinkStateConfig {
    /// Minimum spacing between advertisements
    pub min_interval: Duration,
    /// Cost difference that counts as a change
    pub change_threshold: f64,
    /// Advertise at least this often
    pub refresh_interval: Duration,
    /// Records older than this are purged
    pub max_age: Duration,
    /// Hop budget of originated advertisements
    pub hop_budget: u32,
    /// Where local link costs come from
    pub cost_source: LinkCostSource,
}

impl Default for LinkStateConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(3),
            change_threshold: 0.01,
            refresh_interval: Duration::from_secs(10),
            max_age: DEFAULT_MAX_RECORD_AGE,
            hop_budget: LINK_STATE_HOP_BUDGET,
            cost_source: LinkCostSource::Measured,
        }
    }
}

/// Link-state engine
#[derive(Debug)]
pub struct LinkStateEngine {
    config: LinkStateConfig,
    database: LinkStateDatabase,
    sequence: u64,
    last_advert: Option<Instant>,
    last_snapshot: BTreeMap<NodeId, f64>,
}

impl LinkStateEngine {
    /// Create an engine for `local`
    pub fn new(local: NodeId, config: LinkStateConfig) -> Self {
        Self {
            config,
            database: LinkStateDatabase::new(local),
            sequence: 0,
            last_advert: None,
            last_snapshot: BTreeMap::new(),
        }
    }

    /// Underlying database
    pub fn database(&self) -> &LinkStateDatabase {
        &self.database
    }

    /// Costs to alive neighbors; the very first snapshot includes every
    /// configured neighbor so convergence can start before probes complete
    fn local_snapshot(&self, neighbors: &NeighborTable, now: Instant) -> BTreeMap<NodeId, f64> {
        let bootstrap = self.sequence == 0;
        neighbors
            .neighbors()
            .filter(|n| bootstrap || neighbors.is_alive(n.as_str(), now))
            .map(|n| (n.clone(), neighbors.link_cost(n.as_str(), self.config.cost_source)))
            .collect()
    }

    fn differs(&self, current: &BTreeMap<NodeId, f64>) -> bool {
        let previous = &self.last_snapshot;
        previous.len() != current.len()
            || current.iter().any(|(n, cost)| match previous.get(n) {
                Some(old) => (old - cost).abs() > self.config.change_threshold,
                None => true,
            })
    }

    /// Snapshot to advertise now, if an advertisement is due
    fn due_snapshot(&self, neighbors: &NeighborTable, now: Instant) -> Option<BTreeMap<NodeId, f64>> {
        let Some(last) = self.last_advert else {
            return Some(self.local_snapshot(neighbors, now));
        };

        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.config.min_interval {
            return None;
        }
        let current = self.local_snapshot(neighbors, now);
        (self.differs(&current) || elapsed >= self.config.refresh_interval).then_some(current)
    }
}

impl RoutingStrategy for LinkStateEngine {
    fn kind(&self) -> StrategyKind {
        StrategyKind::LinkState
    }

    fn expire(&mut self, _neighbors: &NeighborTable, now: Instant) {
        self.database.expire(self.config.max_age, now);
    }

    fn advertise(&mut self, neighbors: &NeighborTable, now: Instant) -> Result<Vec<Emit>, RoutingError> {
        let Some(snapshot) = self.due_snapshot(neighbors, now) else {
            return Ok(Vec::new());
        };

        self.sequence += 1;
        self.last_advert = Some(now);
        self.last_snapshot = snapshot.clone();
        self.database.install_local(self.sequence, snapshot.clone(), now);

        let advert = LinkStateAdvert::new(neighbors.local().clone(), self.sequence, snapshot);
        info!(
            sequence = self.sequence,
            neighbors = advert.neighbors.len(),
            "Originating link-state advertisement"
        );
        Ok(vec![Emit::Flood(advert.into_message(self.config.hop_budget)?)])
    }

    fn on_receive(
        &mut self,
        msg: &WireMessage,
        _neighbors: &NeighborTable,
        now: Instant,
    ) -> Result<Option<RouteSnapshot>, RoutingError> {
        let advert = LinkStateAdvert::from_message(msg)?;
        match self.database.accept(&advert, now) {
            Acceptance::Accepted => Ok(None),
            Acceptance::Stale { stored } => Err(RoutingError::Stale {
                origin: advert.origin,
                sequence: advert.sequence,
                stored,
            }),
        }
    }

    fn recompute(&mut self, _neighbors: &NeighborTable, _now: Instant) -> Option<RouteSnapshot> {
        let result = self.database.compute_routes()?;
        debug!(stats = ?self.database.stats(), "Link-state database changed");
        Some(snapshot_from_paths(&result))
    }

    /// Advertise before recomputing so our own new record is included
    fn tick(&mut self, neighbors: &NeighborTable, now: Instant) -> Result<Tick, RoutingError> {
        self.expire(neighbors, now);
        let emits = self.advertise(neighbors, now)?;
        let routes = self.recompute(neighbors, now);
        Ok(Tick { routes, emits })
    }
}
