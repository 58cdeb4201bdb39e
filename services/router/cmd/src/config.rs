//! Configuration handling for the router binary.
//!
//! Two startup files describe the overlay: the nodes file maps node ids to
//! `[host, port]` endpoints and the topology file maps each node to its
//! weighted neighbors. Either may be JSON or YAML (chosen by extension), bare
//! or wrapped as `{"type": ..., "config": {...}}`. Timer settings come from
//! the command line and may be overridden by environment variables.

use router_routing::StrategyKind;
use router_topology::Graph;
use router_wire::NodeId;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Environment variable overriding the local node id
pub const ENV_NODE_ID: &str = "ROUTER_NODE_ID";
/// Environment variable overriding the routing mode
pub const ENV_MODE: &str = "ROUTER_MODE";
/// Environment variable overriding the probe period
pub const ENV_HELLO_PERIOD: &str = "ROUTER_HELLO_PERIOD";
/// Environment variable overriding the dead-neighbor timeout
pub const ENV_DEAD_AFTER: &str = "ROUTER_DEAD_AFTER";

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// File contents did not parse
    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// Endpoint did not resolve to a socket address
    #[error("node {node}: cannot resolve {host}:{port}")]
    Resolve { node: String, host: String, port: u16 },

    /// Link cost is negative or not a number
    #[error("invalid cost {cost} on link {from} -> {to}")]
    InvalidCost { from: String, to: String, cost: f64 },

    /// Referenced node is missing from the nodes file
    #[error("node {0} is not listed in the nodes file")]
    UnknownNode(String),

    /// Environment override is not valid
    #[error("invalid value {value:?} for {key}: {reason}")]
    Override {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Document<T> {
    Wrapped { config: T },
    Bare(T),
}

impl<T> Document<T> {
    fn into_inner(self) -> T {
        match self {
            Document::Wrapped { config } => config,
            Document::Bare(config) => config,
        }
    }
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |reason: String| ConfigError::Parse {
        path: path.to_path_buf(),
        reason,
    };

    let document: Document<T> = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?
        }
        _ => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
    };
    Ok(document.into_inner())
}

/// Load the nodes file: `{"A": ["127.0.0.1", 5001], ...}`
pub fn load_nodes(path: &Path) -> Result<BTreeMap<NodeId, SocketAddr>, ConfigError> {
    let endpoints: BTreeMap<NodeId, (String, u16)> = read_document(path)?;

    let mut nodes = BTreeMap::new();
    for (node, (host, port)) in endpoints {
        let addr = (host.as_str(), port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ConfigError::Resolve {
                node: node.to_string(),
                host: host.clone(),
                port,
            })?;
        nodes.insert(node, addr);
    }

    info!(component = "config", "Loaded {} node endpoints from {:?}", nodes.len(), path);
    Ok(nodes)
}

/// Load the topology file: `{"A": {"B": 1, "C": 2}, ...}`
pub fn load_topology(path: &Path) -> Result<Graph, ConfigError> {
    let graph: Graph = read_document(path)?;

    for (from, neighbors) in &graph {
        for (to, cost) in neighbors {
            if !cost.is_finite() || *cost < 0.0 {
                return Err(ConfigError::InvalidCost {
                    from: from.to_string(),
                    to: to.to_string(),
                    cost: *cost,
                });
            }
            let reverse = graph.get(to).and_then(|n| n.get(from));
            if reverse != Some(cost) {
                warn!(component = "config", "Link {} -> {} is not symmetric", from, to);
            }
        }
    }

    info!(component = "config", "Loaded topology with {} nodes from {:?}", graph.len(), path);
    Ok(graph)
}

/// Check that every node of the topology has an endpoint
pub fn check_endpoints(graph: &Graph, nodes: &BTreeMap<NodeId, SocketAddr>) -> Result<(), ConfigError> {
    match router_topology::nodes(graph).into_iter().find(|n| !nodes.contains_key(n)) {
        Some(missing) => Err(ConfigError::UnknownNode(missing.to_string())),
        None => Ok(()),
    }
}

/// Settings of one router instance before the files are applied
#[derive(Debug, Clone, PartialEq)]
pub struct RouterSettings {
    /// Local node id
    pub node_id: String,
    /// Routing mode
    pub mode: StrategyKind,
    /// Probe period
    pub hello_period: Duration,
    /// Dead-neighbor timeout
    pub dead_after: Duration,
    /// Maintenance period
    pub tick: Duration,
}

impl RouterSettings {
    /// Apply `ROUTER_*` environment overrides
    pub fn apply_environment_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(node_id) = lookup(ENV_NODE_ID) {
            info!(component = "config", "Node ID overridden by environment: {}", node_id);
            self.node_id = node_id;
        }

        if let Some(mode) = lookup(ENV_MODE) {
            self.mode = mode.parse().map_err(|e: router_routing::RoutingError| ConfigError::Override {
                key: ENV_MODE,
                value: mode.clone(),
                reason: e.to_string(),
            })?;
            info!(component = "config", "Mode overridden by environment: {}", self.mode);
        }

        if let Some(value) = lookup(ENV_HELLO_PERIOD) {
            self.hello_period = parse_duration(ENV_HELLO_PERIOD, value)?;
            info!(component = "config", "Hello period overridden by environment: {:?}", self.hello_period);
        }

        if let Some(value) = lookup(ENV_DEAD_AFTER) {
            self.dead_after = parse_duration(ENV_DEAD_AFTER, value)?;
            info!(component = "config", "Dead-after overridden by environment: {:?}", self.dead_after);
        }

        Ok(())
    }
}

fn parse_duration(key: &'static str, value: String) -> Result<Duration, ConfigError> {
    humantime::parse_duration(&value).map_err(|e| ConfigError::Override {
        key,
        reason: e.to_string(),
        value,
    })
}
