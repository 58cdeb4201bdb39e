//! Link-state database: the most recent advertisement per origin, topology
//! reconstruction and route computation.

use router_wire::NodeId;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Records older than this are purged from the database
pub const DEFAULT_MAX_RECORD_AGE: Duration = Duration::from_secs(30);

/// The most recent advertisement accepted from one origin
#[derive(Debug, Clone, PartialEq)]
pub struct LinkStateRecord {
    /// Sequence number of the advertisement this record came from
    pub sequence: u64,
    /// When the record was installed locally
    pub received_at: Instant,
    /// Origin's advertised cost to each of its neighbors
    pub neighbor_costs: BTreeMap<NodeId, f64>,
}

/// Outcome of offering an advertisement to the database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Record installed; the database is marked changed
    Accepted,
    /// Sequence not newer than the stored one; nothing changed
    Stale {
        /// Sequence currently stored for the origin
        stored: u64,
    },
}

impl Acceptance {
    /// Whether the advertisement was installed
    pub fn is_accepted(&self) -> bool {
        matches!(self, Acceptance::Accepted)
    }
}

/// Link-state database
#[derive(Debug)]
pub struct LinkStateDatabase {
    /// Local node ID
    local: NodeId,
    /// Latest record per origin
    records: BTreeMap<NodeId, LinkStateRecord>,
    /// Set on any mutation, cleared when routes are recomputed
    changed: bool,
}

mod database;
pub use database::LinkStateStats;
