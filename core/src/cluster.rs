//! Cluster registry
//!
//! Tracks the known RPC endpoints ("clusters"), which one is active, and
//! persists both through an injected [`Persistence`] capability. The active
//! selection is held as a single name that must match exactly one entry, so
//! there is no per-entry flag that can drift.
//!
//! Changes to the active cluster are published on a `tokio::sync::watch`
//! channel so that connection and cache owners can react to a switch.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::rpc::validate_endpoint;
use crate::storage::Persistence;

/// Persistence key of the cluster list
pub const CLUSTERS_KEY: &str = "solana-clusters";
/// Persistence key of the active cluster name
pub const ACTIVE_CLUSTER_KEY: &str = "solana-cluster";
/// Cluster selected when nothing has been persisted
pub const DEFAULT_CLUSTER_NAME: &str = "devnet";

/// Well-known Solana networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterNetwork {
    /// Development network
    #[serde(rename = "devnet")]
    Devnet,
    /// Test network
    #[serde(rename = "testnet")]
    Testnet,
    /// Main network
    #[serde(rename = "mainnet-beta")]
    Mainnet,
}

impl ClusterNetwork {
    /// Network identifier as used by explorers and RPC providers
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterNetwork::Devnet => "devnet",
            ClusterNetwork::Testnet => "testnet",
            ClusterNetwork::Mainnet => "mainnet-beta",
        }
    }
}

impl fmt::Display for ClusterNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClusterNetwork {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "devnet" => Ok(ClusterNetwork::Devnet),
            "testnet" => Ok(ClusterNetwork::Testnet),
            "mainnet" | "mainnet-beta" => Ok(ClusterNetwork::Mainnet),
            other => Err(Error::validation(format!("Unknown network: {}", other))),
        }
    }
}

/// A cluster as stored in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Unique, user-facing name
    pub name: String,
    /// Known network, `None` for a custom endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<ClusterNetwork>,
    /// RPC endpoint URL
    pub endpoint: String,
}

impl ClusterConfig {
    /// Create a custom cluster config
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            network: None,
            endpoint: endpoint.into(),
        }
    }

    /// Attach a known network
    pub fn with_network(mut self, network: ClusterNetwork) -> Self {
        self.network = Some(network);
        self
    }
}

/// A cluster as seen by callers, with its derived active flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cluster {
    /// Unique, user-facing name
    pub name: String,
    /// Known network, `None` for a custom endpoint
    pub network: Option<ClusterNetwork>,
    /// RPC endpoint URL
    pub endpoint: String,
    /// Whether this is the active cluster
    pub active: bool,
}

impl Cluster {
    fn from_config(config: &ClusterConfig, active: bool) -> Self {
        Self {
            name: config.name.clone(),
            network: config.network,
            endpoint: config.endpoint.clone(),
            active,
        }
    }

    /// Whether this cluster points at a custom endpoint
    pub fn is_custom(&self) -> bool {
        self.network.is_none()
    }

    /// Whether this cluster is the main network
    pub fn is_mainnet(&self) -> bool {
        self.network == Some(ClusterNetwork::Mainnet)
    }
}

/// Built-in clusters available on first start
pub fn default_clusters() -> Vec<ClusterConfig> {
    vec![
        ClusterConfig::new("devnet", "https://api.devnet.solana.com")
            .with_network(ClusterNetwork::Devnet),
        ClusterConfig::new("testnet", "https://api.testnet.solana.com")
            .with_network(ClusterNetwork::Testnet),
        ClusterConfig::new("mainnet", "https://api.mainnet-beta.solana.com")
            .with_network(ClusterNetwork::Mainnet),
    ]
}

/// Registry of known clusters with exactly one active entry
pub struct ClusterRegistry {
    entries: Vec<ClusterConfig>,
    active: String,
    store: Arc<dyn Persistence>,
    changes: watch::Sender<Cluster>,
}

impl ClusterRegistry {
    /// Load the registry from persistence, falling back to the built-in clusters
    #[instrument(skip(store))]
    pub fn load(store: Arc<dyn Persistence>) -> Result<Self> {
        let persisted: Vec<ClusterConfig> = match store.load(CLUSTERS_KEY)? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::storage(format!("Corrupt cluster list: {}", e)))?,
            None => Vec::new(),
        };

        let mut entries: Vec<ClusterConfig> = Vec::with_capacity(persisted.len());
        for config in persisted {
            if entries.iter().any(|e| e.name == config.name) {
                warn!(name = %config.name, "dropping duplicate persisted cluster");
                continue;
            }
            entries.push(config);
        }
        if entries.is_empty() {
            debug!("no persisted clusters, using defaults");
            entries = default_clusters();
        }

        let persisted_active: Option<String> = match store.load(ACTIVE_CLUSTER_KEY)? {
            Some(raw) => Some(
                serde_json::from_str(&raw)
                    .map_err(|e| Error::storage(format!("Corrupt active cluster: {}", e)))?,
            ),
            None => None,
        };

        let active = persisted_active
            .filter(|name| entries.iter().any(|e| &e.name == name))
            .or_else(|| {
                entries
                    .iter()
                    .find(|e| e.name == DEFAULT_CLUSTER_NAME)
                    .map(|e| e.name.clone())
            })
            .or_else(|| entries.first().map(|e| e.name.clone()))
            .ok_or_else(|| Error::illegal_state("Cluster registry has no entries"))?;

        let current = entries
            .iter()
            .find(|e| e.name == active)
            .map(|e| Cluster::from_config(e, true))
            .ok_or_else(|| Error::illegal_state("Active cluster missing after load"))?;
        let (changes, _) = watch::channel(current);

        info!(clusters = entries.len(), active = %active, "cluster registry loaded");

        Ok(Self {
            entries,
            active,
            store,
            changes,
        })
    }

    /// All clusters in insertion order
    pub fn clusters(&self) -> Vec<Cluster> {
        self.entries
            .iter()
            .map(|e| Cluster::from_config(e, e.name == self.active))
            .collect()
    }

    /// Look up a cluster by name
    pub fn find(&self, name: &str) -> Option<Cluster> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| Cluster::from_config(e, e.name == self.active))
    }

    /// The active cluster
    pub fn active_cluster(&self) -> Result<Cluster> {
        let mut matching = self.entries.iter().filter(|e| e.name == self.active);
        match (matching.next(), matching.next()) {
            (Some(config), None) => Ok(Cluster::from_config(config, true)),
            (None, _) => Err(Error::illegal_state(format!(
                "Active cluster '{}' is not registered",
                self.active
            ))),
            (Some(_), Some(_)) => Err(Error::illegal_state(format!(
                "Active cluster '{}' is registered more than once",
                self.active
            ))),
        }
    }

    /// Make the named cluster active; a no-op when it already is
    #[instrument(skip(self))]
    pub fn set_active_cluster(&mut self, name: &str) -> Result<()> {
        if self.active == name {
            return Ok(());
        }

        let config = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| Error::precondition(format!("Cluster '{}' not found", name)))?;
        let next = Cluster::from_config(config, true);

        self.save_active(name)?;
        self.active = name.to_string();
        self.changes.send_replace(next);

        info!(cluster = %name, "active cluster changed");
        Ok(())
    }

    /// Append a new cluster after validating its name and endpoint
    #[instrument(skip(self), fields(name = %config.name))]
    pub fn add_cluster(&mut self, mut config: ClusterConfig) -> Result<()> {
        config.endpoint = config.endpoint.trim().to_string();
        if config.name.trim().is_empty() {
            return Err(Error::validation("Cluster name must not be empty"));
        }
        if self.entries.iter().any(|e| e.name == config.name) {
            return Err(Error::validation(format!(
                "Cluster '{}' already exists",
                config.name
            )));
        }
        validate_endpoint(&config.endpoint)?;

        let mut entries = self.entries.clone();
        entries.push(config);
        self.save_entries(&entries)?;
        self.entries = entries;

        info!(clusters = self.entries.len(), "cluster added");
        Ok(())
    }

    /// Remove a cluster; the active one cannot be removed
    #[instrument(skip(self))]
    pub fn remove_cluster(&mut self, name: &str) -> Result<()> {
        let index = self
            .entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| Error::precondition(format!("Cluster '{}' not found", name)))?;
        if self.active == name {
            return Err(Error::precondition(format!(
                "Cluster '{}' is active and cannot be removed",
                name
            )));
        }

        let mut entries = self.entries.clone();
        entries.remove(index);
        self.save_entries(&entries)?;
        self.entries = entries;

        info!(clusters = self.entries.len(), "cluster removed");
        Ok(())
    }

    /// Subscribe to active cluster changes
    pub fn subscribe(&self) -> watch::Receiver<Cluster> {
        self.changes.subscribe()
    }

    fn save_entries(&self, entries: &[ClusterConfig]) -> Result<()> {
        let raw = serde_json::to_string(entries)?;
        self.store.save(CLUSTERS_KEY, &raw)
    }

    fn save_active(&self, name: &str) -> Result<()> {
        let raw = serde_json::to_string(name)?;
        self.store.save(ACTIVE_CLUSTER_KEY, &raw)
    }
}

impl fmt::Debug for ClusterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterRegistry")
            .field("entries", &self.entries)
            .field("active", &self.active)
            .finish()
    }
}
