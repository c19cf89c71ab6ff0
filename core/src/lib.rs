//! dApp Scaffold Core Library
//!
//! Cluster management and cached account data access for Solana dApp clients.
//! The library tracks which RPC endpoint is active, persists user-added
//! endpoints, derives a connection from the active endpoint and exposes cached,
//! deduplicated reads and confirmed writes on top of it.
//!
//! # Features
//!
//! - **Cluster Registry**: built-in and custom clusters with exactly one active entry
//! - **Connection Factory**: one memoized connection per active endpoint
//! - **Account Queries**: balance, token accounts and signature history keyed by endpoint
//! - **Request Dedup**: concurrent reads of one key share a single RPC call
//! - **Mutations**: airdrop and SOL transfer with cache invalidation and notifications
//! - **Explorer Links**: cluster-aware block explorer URLs
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use dapp_scaffold_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ClientConfig::default();
//!     let store = FileStore::new(&config.storage)?;
//!     let client = DappClient::builder(config).store(Arc::new(store)).build()?;
//!
//!     client.add_cluster(ClusterConfig::new("local", "http://localhost:8899"))?;
//!     client.set_active_cluster("local")?;
//!
//!     let address: Pubkey = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM".parse()?;
//!     client
//!         .request_airdrop(AirdropRequest { address, amount_sol: 1.0 })
//!         .await?;
//!
//!     let balance = client.get_balance(&address).await?;
//!     println!("Balance: {} SOL", format_sol_balance(balance));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod account;
pub mod client;
pub mod cluster;
pub mod config;
pub mod error;
pub mod explorer;
pub mod notify;
pub mod query;
pub mod rpc;
pub mod storage;
pub mod transaction;
pub mod types;
pub mod wallet;

// Re-exports for convenience
pub use account::AccountQueries;
pub use client::{DappClient, DappClientBuilder};
pub use cluster::{Cluster, ClusterConfig, ClusterNetwork, ClusterRegistry};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use explorer::build_explorer_url;
pub use notify::{Notification, NotificationKind, NotificationSink};
pub use query::{QueryCache, QueryKey, QueryKind, QuerySnapshot, QueryStatus};
pub use rpc::{ConnectionFactory, ConnectionProvider, RpcConnection};
pub use storage::{FileStore, MemoryStore, Persistence};
pub use transaction::AccountMutations;
pub use types::{AirdropRequest, SignatureInfo, TokenAccount, TransferRequest};
pub use wallet::{KeypairWallet, WalletAdapter};

/// Prelude module for easy importing of common types
pub mod prelude {
    pub use super::{
        AirdropRequest, Cluster, ClusterConfig, ClusterNetwork, ClientConfig, DappClient, Error,
        FileStore, MemoryStore, Notification, NotificationKind, QueryKind, QueryStatus, Result,
        SignatureInfo, TokenAccount, TransferRequest, WalletAdapter,
    };
    pub use super::types::{ellipsify, format_sol_balance, lamports_to_sol, sol_to_lamports};

    // Re-export commonly used Solana types
    pub use solana_sdk::{
        pubkey::Pubkey,
        signature::{Signature, Signer},
    };
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Library name
pub const NAME: &str = "dapp-scaffold-core";
