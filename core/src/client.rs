//! Client facade
//!
//! [`DappClient`] wires the cluster registry, the connection factory, the
//! account caches and the mutation layer together and exposes the entry
//! points UI collaborators call. Every read resolves the active cluster and
//! its connection under one registry lock, so a query is always keyed by the
//! endpoint it actually runs against.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dapp_scaffold_core::{ClientConfig, DappClient, FileStore};
//!
//! # async fn run() -> dapp_scaffold_core::Result<()> {
//! let config = ClientConfig::default();
//! let store = FileStore::new(&config.storage)?;
//! let client = DappClient::builder(config).store(Arc::new(store)).build()?;
//!
//! let address = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM".parse()?;
//! let lamports = client.get_balance(&address).await?;
//! println!("{} lamports on {}", lamports, client.active_cluster()?.name);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use solana_sdk::{pubkey::Pubkey, signature::Signature};
use tokio::sync::watch;

use crate::account::AccountQueries;
use crate::cluster::{Cluster, ClusterConfig, ClusterRegistry};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::explorer::build_explorer_url;
use crate::notify::{NotificationSink, TracingNotifier};
use crate::query::{QueryKey, QueryKind};
use crate::rpc::{ConnectionFactory, ConnectionProvider, RpcConnection, SolanaConnectionProvider};
use crate::storage::{MemoryStore, Persistence};
use crate::transaction::AccountMutations;
use crate::types::{AirdropRequest, ClusterVersion, SignatureInfo, TokenAccount, TransferRequest};
use crate::wallet::{DisconnectedWallet, WalletAdapter};

/// Entry point for cluster management, account reads and mutations
pub struct DappClient {
    config: ClientConfig,
    registry: RwLock<ClusterRegistry>,
    connections: ConnectionFactory,
    queries: Arc<AccountQueries>,
    mutations: AccountMutations,
    wallet: Arc<dyn WalletAdapter>,
}

impl DappClient {
    /// Start building a client
    pub fn builder(config: ClientConfig) -> DappClientBuilder {
        DappClientBuilder::new(config)
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connected wallet
    pub fn wallet(&self) -> &dyn WalletAdapter {
        self.wallet.as_ref()
    }

    /// Account caches, for snapshots and observers
    pub fn queries(&self) -> &AccountQueries {
        &self.queries
    }

    fn registry(&self) -> RwLockReadGuard<'_, ClusterRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_mut(&self) -> RwLockWriteGuard<'_, ClusterRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    // Cluster registry

    /// All clusters in insertion order
    pub fn clusters(&self) -> Vec<Cluster> {
        self.registry().clusters()
    }

    /// The active cluster
    pub fn active_cluster(&self) -> Result<Cluster> {
        self.registry().active_cluster()
    }

    /// Make the named cluster active
    pub fn set_active_cluster(&self, name: &str) -> Result<()> {
        self.registry_mut().set_active_cluster(name)
    }

    /// Register a new cluster
    pub fn add_cluster(&self, config: ClusterConfig) -> Result<()> {
        self.registry_mut().add_cluster(config)
    }

    /// Remove an inactive cluster
    pub fn remove_cluster(&self, name: &str) -> Result<()> {
        self.registry_mut().remove_cluster(name)
    }

    /// Subscribe to active cluster changes
    pub fn subscribe(&self) -> watch::Receiver<Cluster> {
        self.registry().subscribe()
    }

    // Connection and links

    /// The active cluster together with its connection
    pub fn connection(&self) -> Result<(Cluster, Arc<dyn RpcConnection>)> {
        let registry = self.registry();
        let cluster = registry.active_cluster()?;
        let connection = self.connections.get_connection(&cluster)?;
        Ok((cluster, connection))
    }

    /// Explorer URL for `path` under the active cluster
    pub fn explorer_url(&self, path: &str) -> Result<String> {
        let cluster = self.active_cluster()?;
        Ok(build_explorer_url(
            &self.config.explorer.base_url,
            path,
            &cluster,
        ))
    }

    /// Cache key of `kind` for `address` on the active cluster
    pub fn query_key(&self, kind: QueryKind, address: &Pubkey) -> Result<QueryKey> {
        let cluster = self.active_cluster()?;
        Ok(QueryKey::new(kind, *address, cluster.endpoint))
    }

    // Account queries

    /// Balance in lamports
    pub async fn get_balance(&self, address: &Pubkey) -> Result<u64> {
        let (_, connection) = self.connection()?;
        self.queries.get_balance(connection, *address).await
    }

    /// Balance in lamports, bypassing cached data
    pub async fn refetch_balance(&self, address: &Pubkey) -> Result<u64> {
        let (_, connection) = self.connection()?;
        self.queries.refetch_balance(connection, *address).await
    }

    /// Token accounts under both token programs
    pub async fn get_token_accounts(&self, address: &Pubkey) -> Result<Vec<TokenAccount>> {
        let (_, connection) = self.connection()?;
        self.queries.get_token_accounts(connection, *address).await
    }

    /// Token accounts, bypassing cached data
    pub async fn refetch_token_accounts(&self, address: &Pubkey) -> Result<Vec<TokenAccount>> {
        let (_, connection) = self.connection()?;
        self.queries.refetch_token_accounts(connection, *address).await
    }

    /// Signature history, most recent first
    pub async fn get_signatures(&self, address: &Pubkey) -> Result<Vec<SignatureInfo>> {
        let (_, connection) = self.connection()?;
        self.queries.get_signatures(connection, *address).await
    }

    /// Signature history, bypassing cached data
    pub async fn refetch_signatures(&self, address: &Pubkey) -> Result<Vec<SignatureInfo>> {
        let (_, connection) = self.connection()?;
        self.queries.refetch_signatures(connection, *address).await
    }

    /// Version of the active cluster, failing when it does not answer
    pub async fn check_cluster(&self) -> Result<ClusterVersion> {
        let (_, connection) = self.connection()?;
        self.queries.check_cluster(connection).await
    }

    // Account mutations

    /// Request an airdrop on the active cluster
    pub async fn request_airdrop(&self, request: AirdropRequest) -> Result<Signature> {
        let (cluster, connection) = self.connection()?;
        self.mutations
            .request_airdrop(&cluster, connection, &request)
            .await
    }

    /// Transfer SOL from the connected wallet on the active cluster
    pub async fn transfer_sol(&self, request: TransferRequest) -> Result<Signature> {
        let (cluster, connection) = self.connection()?;
        self.mutations
            .transfer_sol(&cluster, connection, self.wallet.as_ref(), &request)
            .await
    }
}

impl fmt::Debug for DappClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DappClient")
            .field("registry", &*self.registry())
            .field("connections", &self.connections)
            .field("wallet", &self.wallet.connected_address())
            .finish()
    }
}

/// Builder for [`DappClient`]; every capability defaults to a working
/// implementation
pub struct DappClientBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn Persistence>>,
    provider: Option<Arc<dyn ConnectionProvider>>,
    wallet: Option<Arc<dyn WalletAdapter>>,
    notifier: Option<Arc<dyn NotificationSink>>,
}

impl DappClientBuilder {
    /// Create a builder
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            store: None,
            provider: None,
            wallet: None,
            notifier: None,
        }
    }

    /// Set the persistence backing the cluster registry (default: in memory)
    pub fn store(mut self, store: Arc<dyn Persistence>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the connection provider (default: Solana JSON-RPC)
    pub fn provider(mut self, provider: Arc<dyn ConnectionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the wallet (default: disconnected)
    pub fn wallet(mut self, wallet: Arc<dyn WalletAdapter>) -> Self {
        self.wallet = Some(wallet);
        self
    }

    /// Set the notification sink (default: log)
    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Load the registry and build the client
    pub fn build(self) -> Result<DappClient> {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(SolanaConnectionProvider::from_settings(&self.config.rpc)));
        let wallet = self.wallet.unwrap_or_else(|| Arc::new(DisconnectedWallet));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier));

        let registry = ClusterRegistry::load(store)?;
        let queries = Arc::new(AccountQueries::new(self.config.gc_time()));
        let mutations = AccountMutations::new(
            queries.clone(),
            notifier,
            self.config.explorer.base_url.clone(),
        );

        Ok(DappClient {
            config: self.config,
            registry: RwLock::new(registry),
            connections: ConnectionFactory::new(provider),
            queries,
            mutations,
            wallet,
        })
    }
}
