//! LinkStateDatabase implementation methods.

use super::{Acceptance, LinkStateDatabase, LinkStateRecord};
use crate::graph::{insert_undirected_min, Graph};
use crate::spf::{shortest_paths, PathResult};
use router_wire::{LinkStateAdvert, NodeId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

impl LinkStateDatabase {
    /// Create an empty database for `local`
    pub fn new(local: NodeId) -> Self {
        Self {
            local,
            records: BTreeMap::new(),
            changed: true,
        }
    }

    /// Local node ID
    pub fn local(&self) -> &NodeId {
        &self.local
    }

    /// Store our own freshly originated advertisement
    pub fn install_local(&mut self, sequence: u64, neighbor_costs: BTreeMap<NodeId, f64>, now: Instant) {
        self.records.insert(
            self.local.clone(),
            LinkStateRecord {
                sequence,
                received_at: now,
                neighbor_costs,
            },
        );
        self.changed = true;
    }

    /// Offer a received advertisement.
    ///
    /// Only a strictly greater sequence than the stored one for the same
    /// origin replaces the record.
    pub fn accept(&mut self, advert: &LinkStateAdvert, now: Instant) -> Acceptance {
        if let Some(existing) = self.records.get(&advert.origin) {
            if advert.sequence <= existing.sequence {
                debug!(
                    origin = %advert.origin,
                    sequence = advert.sequence,
                    stored = existing.sequence,
                    "Ignoring stale link-state advertisement"
                );
                return Acceptance::Stale {
                    stored: existing.sequence,
                };
            }
        }

        debug!(
            origin = %advert.origin,
            sequence = advert.sequence,
            neighbors = advert.neighbors.len(),
            "Installing link-state record"
        );
        self.records.insert(
            advert.origin.clone(),
            LinkStateRecord {
                sequence: advert.sequence,
                received_at: now,
                neighbor_costs: advert.neighbors.clone(),
            },
        );
        self.changed = true;
        Acceptance::Accepted
    }

    /// Purge records older than `max_age`; returns how many were removed
    pub fn expire(&mut self, max_age: Duration, now: Instant) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| now.saturating_duration_since(record.received_at) <= max_age);
        let removed = before - self.records.len();

        if removed > 0 {
            info!(removed, "Expired old link-state records");
            self.changed = true;
        }
        removed
    }

    /// Undirected graph of every stored record; conflicting reports for the
    /// same edge keep the smaller cost
    pub fn build_topology(&self) -> Graph {
        let mut graph = Graph::new();
        for (origin, record) in &self.records {
            graph.entry(origin.clone()).or_default();
            for (neighbor, &cost) in &record.neighbor_costs {
                insert_undirected_min(&mut graph, origin, neighbor, cost);
            }
        }
        graph
    }

    /// Recompute routes from the local node when the database changed.
    ///
    /// Clears the changed flag. Returns `None` if nothing changed since the
    /// previous computation.
    pub fn compute_routes(&mut self) -> Option<PathResult> {
        if !self.changed {
            return None;
        }
        let result = shortest_paths(&self.build_topology(), &self.local);
        self.changed = false;

        debug!(
            node = %self.local,
            destinations = result.distances.len(),
            "Computed link-state routes"
        );
        Some(result)
    }

    /// Whether routes need recomputing
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Stored record for an origin
    pub fn record(&self, origin: &str) -> Option<&LinkStateRecord> {
        self.records.get(origin)
    }

    /// Stored sequence for an origin
    pub fn sequence_of(&self, origin: &str) -> Option<u64> {
        self.records.get(origin).map(|r| r.sequence)
    }

    /// Get database statistics
    pub fn stats(&self) -> LinkStateStats {
        LinkStateStats {
            origins: self.records.len(),
            edges: self.records.values().map(|r| r.neighbor_costs.len()).sum(),
            local_sequence: self.sequence_of(self.local.as_str()),
        }
    }
}

/// Link-state database statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkStateStats {
    /// Origins with a stored record
    pub origins: usize,
    /// Directed neighbor entries across all records
    pub edges: usize,
    /// Sequence of our own stored record
    pub local_sequence: Option<u64>,
}
