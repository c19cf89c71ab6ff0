//! Account query layer
//!
//! Cached reads of balance, token accounts and signature history. Every read
//! is keyed by (operation, address, endpoint of the connection it runs on), so
//! a cluster switch or a different address always lands on a different entry.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::{pubkey, pubkey::Pubkey};
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::query::{QueryCache, QueryKey, QueryKind};
use crate::rpc::RpcConnection;
use crate::types::{ClusterVersion, SignatureInfo, TokenAccount};

/// Token-2022 program id
pub const TOKEN_2022_PROGRAM_ID: Pubkey = pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// Token programs queried for token accounts, in query order
pub fn token_program_ids() -> [Pubkey; 2] {
    [spl_token::ID, TOKEN_2022_PROGRAM_ID]
}

/// Cached account reads
#[derive(Debug)]
pub struct AccountQueries {
    balances: QueryCache<u64>,
    token_accounts: QueryCache<Vec<TokenAccount>>,
    signatures: QueryCache<Vec<SignatureInfo>>,
    versions: QueryCache<ClusterVersion>,
}

impl AccountQueries {
    /// Create empty caches evicting unobserved entries after `gc_time`
    pub fn new(gc_time: Duration) -> Self {
        Self {
            balances: QueryCache::new(gc_time),
            token_accounts: QueryCache::new(gc_time),
            signatures: QueryCache::new(gc_time),
            versions: QueryCache::new(gc_time),
        }
    }

    /// Balance cache
    pub fn balances(&self) -> &QueryCache<u64> {
        &self.balances
    }

    /// Token account cache
    pub fn token_accounts(&self) -> &QueryCache<Vec<TokenAccount>> {
        &self.token_accounts
    }

    /// Signature history cache
    pub fn signatures(&self) -> &QueryCache<Vec<SignatureInfo>> {
        &self.signatures
    }

    /// Cluster version cache
    pub fn versions(&self) -> &QueryCache<ClusterVersion> {
        &self.versions
    }

    /// Balance in lamports
    pub async fn get_balance(
        &self,
        connection: Arc<dyn RpcConnection>,
        address: Pubkey,
    ) -> Result<u64> {
        self.read_balance(connection, address, false).await
    }

    /// Balance in lamports, bypassing cached data
    pub async fn refetch_balance(
        &self,
        connection: Arc<dyn RpcConnection>,
        address: Pubkey,
    ) -> Result<u64> {
        self.read_balance(connection, address, true).await
    }

    async fn read_balance(
        &self,
        connection: Arc<dyn RpcConnection>,
        address: Pubkey,
        force: bool,
    ) -> Result<u64> {
        let key = QueryKey::new(QueryKind::Balance, address, connection.endpoint());
        let fetcher = move || async move { connection.get_balance(&address).await };

        if force {
            self.balances.refetch(key, fetcher).await
        } else {
            self.balances.fetch(key, fetcher).await
        }
    }

    /// Token accounts of `address` under both token programs, concatenated in
    /// program order
    pub async fn get_token_accounts(
        &self,
        connection: Arc<dyn RpcConnection>,
        address: Pubkey,
    ) -> Result<Vec<TokenAccount>> {
        self.read_token_accounts(connection, address, false).await
    }

    /// Token accounts, bypassing cached data
    pub async fn refetch_token_accounts(
        &self,
        connection: Arc<dyn RpcConnection>,
        address: Pubkey,
    ) -> Result<Vec<TokenAccount>> {
        self.read_token_accounts(connection, address, true).await
    }

    async fn read_token_accounts(
        &self,
        connection: Arc<dyn RpcConnection>,
        address: Pubkey,
        force: bool,
    ) -> Result<Vec<TokenAccount>> {
        let key = QueryKey::new(QueryKind::TokenAccounts, address, connection.endpoint());
        let fetcher = move || async move {
            let [token, token_2022] = token_program_ids();
            let (mut accounts, extended) = futures::try_join!(
                connection.get_parsed_token_accounts_by_owner(&address, &token),
                connection.get_parsed_token_accounts_by_owner(&address, &token_2022),
            )?;
            accounts.extend(extended);

            debug!(%address, count = accounts.len(), "token accounts fetched");
            Ok(accounts)
        };

        if force {
            self.token_accounts.refetch(key, fetcher).await
        } else {
            self.token_accounts.fetch(key, fetcher).await
        }
    }

    /// Signature history, most recent first
    pub async fn get_signatures(
        &self,
        connection: Arc<dyn RpcConnection>,
        address: Pubkey,
    ) -> Result<Vec<SignatureInfo>> {
        self.read_signatures(connection, address, false).await
    }

    /// Signature history, bypassing cached data
    pub async fn refetch_signatures(
        &self,
        connection: Arc<dyn RpcConnection>,
        address: Pubkey,
    ) -> Result<Vec<SignatureInfo>> {
        self.read_signatures(connection, address, true).await
    }

    async fn read_signatures(
        &self,
        connection: Arc<dyn RpcConnection>,
        address: Pubkey,
        force: bool,
    ) -> Result<Vec<SignatureInfo>> {
        let key = QueryKey::new(QueryKind::Signatures, address, connection.endpoint());
        let fetcher = move || async move { connection.get_signatures_for_address(&address).await };

        if force {
            self.signatures.refetch(key, fetcher).await
        } else {
            self.signatures.fetch(key, fetcher).await
        }
    }

    /// Check that the endpoint answers, retrying once before failing.
    /// Always asks the endpoint; concurrent checks share one call.
    #[instrument(skip_all, fields(endpoint = %connection.endpoint()))]
    pub async fn check_cluster(&self, connection: Arc<dyn RpcConnection>) -> Result<ClusterVersion> {
        let key = QueryKey::cluster(QueryKind::Version, connection.endpoint());

        self.versions
            .refetch(key, move || async move {
                match connection.get_version().await {
                    Ok(version) => Ok(version),
                    Err(err) => {
                        warn!(error = %err, "cluster check failed, retrying");
                        connection.get_version().await
                    }
                }
            })
            .await
    }

    /// Mark the balance and signature entries of `address` on `endpoint` stale
    pub fn invalidate_account(&self, address: &Pubkey, endpoint: &str) {
        self.balances
            .invalidate(&QueryKey::new(QueryKind::Balance, *address, endpoint));
        self.signatures
            .invalidate(&QueryKey::new(QueryKind::Signatures, *address, endpoint));
    }
}
