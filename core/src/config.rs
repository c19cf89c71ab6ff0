//! Configuration management for the dApp scaffold client
//!
//! Configuration is loaded from a YAML or JSON file (picked by extension),
//! with every section falling back to its defaults when absent.
//!
//! # Example
//!
//! ```no_run
//! use dapp_scaffold_core::config::{ClientConfig, CommitmentLevel};
//!
//! let config = ClientConfig::builder()
//!     .with_commitment(CommitmentLevel::Finalized)
//!     .with_rpc_timeout(10)
//!     .build();
//!
//! let config = ClientConfig::from_file("config.yaml")?;
//! # Ok::<(), dapp_scaffold_core::Error>(())
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main configuration structure for the client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// RPC connection configuration
    pub rpc: RpcSettings,
    /// Cluster registry persistence
    pub storage: StorageSettings,
    /// Block explorer links
    pub explorer: ExplorerSettings,
    /// Query cache policy
    pub cache: CacheSettings,
    /// Logging configuration
    pub logging: LoggingSettings,
}

/// RPC connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Commitment used for reads and confirmations
    pub commitment: CommitmentLevel,
}

/// Solana commitment level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentLevel {
    /// Processed commitment (least secure, fastest)
    Processed,
    /// Confirmed commitment (balanced)
    Confirmed,
    /// Finalized commitment (most secure, slowest)
    Finalized,
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding the persisted cluster registry
    pub path: PathBuf,
}

/// Explorer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerSettings {
    /// Explorer base URL, without trailing slash
    pub base_url: String,
}

/// Query cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Seconds an unobserved entry is kept before eviction
    pub gc_time_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (error, warn, info, debug, trace)
    pub level: LogLevel,
}

/// Log level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            commitment: CommitmentLevel::Confirmed,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            path: home_dir.join(".dapp-scaffold"),
        }
    }
}

impl Default for ExplorerSettings {
    fn default() -> Self {
        Self {
            base_url: "https://explorer.solana.com".to_string(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            gc_time_seconds: 300,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Load configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        serde_yaml::from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse YAML config: {}", e)))
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse JSON config: {}", e)))
    }

    /// Load configuration from a file (auto-detects format by extension)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match file_extension(path).as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            other => Err(unsupported_format(other)),
        }
    }

    /// Save configuration in the format named by the file extension
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        match file_extension(path).as_str() {
            "yaml" | "yml" => self.save_to_yaml_file(path),
            "json" => self.save_to_json_file(path),
            other => Err(unsupported_format(other)),
        }
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::config(format!("Failed to serialize config to YAML: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::config(format!("Failed to write config file: {}", e)))
    }

    /// Save configuration to a JSON file
    pub fn save_to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config to JSON: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::config(format!("Failed to write config file: {}", e)))
    }

    /// Get the request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_seconds)
    }

    /// Get the cache eviction delay as Duration
    pub fn gc_time(&self) -> Duration {
        Duration::from_secs(self.cache.gc_time_seconds)
    }
}

impl CommitmentLevel {
    /// Convert to Solana SDK commitment config
    pub fn to_solana_commitment(&self) -> solana_sdk::commitment_config::CommitmentConfig {
        match self {
            CommitmentLevel::Processed => {
                solana_sdk::commitment_config::CommitmentConfig::processed()
            }
            CommitmentLevel::Confirmed => {
                solana_sdk::commitment_config::CommitmentConfig::confirmed()
            }
            CommitmentLevel::Finalized => {
                solana_sdk::commitment_config::CommitmentConfig::finalized()
            }
        }
    }
}

impl LogLevel {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

/// Builder for ClientConfig with fluent interface
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Set the registry storage directory
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage.path = path.into();
        self
    }

    /// Set RPC timeout in seconds
    pub fn with_rpc_timeout(mut self, seconds: u64) -> Self {
        self.config.rpc.timeout_seconds = seconds;
        self
    }

    /// Set commitment level
    pub fn with_commitment(mut self, commitment: CommitmentLevel) -> Self {
        self.config.rpc.commitment = commitment;
        self
    }

    /// Set the explorer base URL
    pub fn with_explorer_url(mut self, url: impl Into<String>) -> Self {
        self.config.explorer.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the cache eviction delay in seconds
    pub fn with_gc_time(mut self, seconds: u64) -> Self {
        self.config.cache.gc_time_seconds = seconds;
        self
    }

    /// Set log level
    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}

fn unsupported_format(extension: &str) -> Error {
    Error::config(format!(
        "Unsupported config file format: {}. Supported: .yaml, .yml, .json",
        extension
    ))
}
