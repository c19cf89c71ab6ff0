//! Error types for the dApp scaffold core library
//!
//! Errors fall into four user-facing groups: bad input (`Validation`), missing
//! state (`Precondition`), network failures (`Rpc` / `SolanaRpc`) and broken
//! invariants (`IllegalState`). The remaining variants cover configuration and
//! persistence plumbing.

use std::sync::Arc;

/// Result type alias for the scaffold operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for cluster, query and mutation operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// User input rejected before any I/O
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation requires state that does not hold
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// RPC communication error
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Solana RPC-specific error
    #[error("Solana RPC error: {0}")]
    SolanaRpc(#[from] solana_client::client_error::ClientError),

    /// Invariant violated; not recoverable by the user
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Failure shared by every observer of one query fetch
    #[error("{0}")]
    Query(Arc<Error>),

    /// Persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    /// Create a new RPC error
    pub fn rpc(msg: impl Into<String>) -> Self {
        Self::Rpc(msg.into())
    }

    /// Create a new illegal state error
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// The underlying error, looking through shared query failures
    pub fn root(&self) -> &Error {
        match self {
            Self::Query(inner) => inner.root(),
            other => other,
        }
    }

    /// Check if error is a rejected user input
    pub fn is_validation(&self) -> bool {
        matches!(self.root(), Self::Validation(_))
    }

    /// Check if error is an unmet precondition
    pub fn is_precondition(&self) -> bool {
        matches!(self.root(), Self::Precondition(_))
    }

    /// Check if error came from the network layer
    pub fn is_rpc(&self) -> bool {
        matches!(self.root(), Self::Rpc(_) | Self::SolanaRpc(_))
    }

    /// Check if error is a broken invariant
    pub fn is_illegal_state(&self) -> bool {
        matches!(self.root(), Self::IllegalState(_))
    }

    /// Check if error is recoverable (manual retry may succeed)
    pub fn is_recoverable(&self) -> bool {
        self.is_rpc()
    }
}

impl From<solana_sdk::pubkey::ParsePubkeyError> for Error {
    fn from(err: solana_sdk::pubkey::ParsePubkeyError) -> Self {
        Self::Validation(format!("Invalid address: {}", err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(format!("YAML error: {}", err))
    }
}
