//! RPC connection management
//!
//! This module provides:
//! - the [`RpcConnection`] capability, one handle bound to one endpoint
//! - the [`ConnectionProvider`] that builds handles from endpoint URLs
//! - a Solana implementation backed by the nonblocking `solana-client`
//! - the [`ConnectionFactory`], which memoizes the handle for the active
//!   cluster and replaces it only when the endpoint value changes
//!
//! No retries happen here; readers decide how to handle transient failures.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dapp_scaffold_core::config::RpcSettings;
//! use dapp_scaffold_core::rpc::{ConnectionFactory, SolanaConnectionProvider};
//!
//! # async fn run(cluster: dapp_scaffold_core::Cluster) -> dapp_scaffold_core::Result<()> {
//! let provider = SolanaConnectionProvider::from_settings(&RpcSettings::default());
//! let factory = ConnectionFactory::new(Arc::new(provider));
//!
//! let connection = factory.get_connection(&cluster)?;
//! let version = connection.get_version().await?;
//! println!("{} runs solana-core {}", connection.endpoint(), version.solana_core);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use solana_account_decoder::UiAccountData;
use solana_client::{
    nonblocking::rpc_client::RpcClient as SolanaRpcClient, rpc_request::TokenAccountsFilter,
};
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::Transaction,
};
use tracing::{debug, info, instrument};

use crate::cluster::Cluster;
use crate::config::RpcSettings;
use crate::error::{Error, Result};
use crate::types::{ClusterVersion, SignatureInfo, TokenAccount};

/// Check that an endpoint can back a connection: an absolute http(s) URL with a host
pub fn validate_endpoint(endpoint: &str) -> Result<url::Url> {
    let url = url::Url::parse(endpoint.trim())
        .map_err(|e| Error::validation(format!("Invalid endpoint '{}': {}", endpoint, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::validation(format!(
            "Endpoint URL must start with `http:` or `https:`, got '{}'",
            endpoint
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::validation(format!(
            "Endpoint '{}' has no host",
            endpoint
        )));
    }

    Ok(url)
}

/// A live handle bound to one RPC endpoint
#[async_trait]
pub trait RpcConnection: Send + Sync {
    /// Endpoint this handle talks to
    fn endpoint(&self) -> &str;

    /// Native balance in lamports
    async fn get_balance(&self, address: &Pubkey) -> Result<u64>;

    /// Parsed token accounts of `owner` held under one token program, in RPC order
    async fn get_parsed_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        program_id: &Pubkey,
    ) -> Result<Vec<TokenAccount>>;

    /// Signature history, most recent first
    async fn get_signatures_for_address(&self, address: &Pubkey) -> Result<Vec<SignatureInfo>>;

    /// Ask the cluster faucet to credit `lamports`
    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> Result<Signature>;

    /// Wait until the signature reaches the configured commitment; a failed
    /// transaction is an error
    async fn confirm_transaction(&self, signature: &Signature) -> Result<()>;

    /// Latest blockhash for building transactions
    async fn get_latest_blockhash(&self) -> Result<Hash>;

    /// Submit a signed transaction
    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature>;

    /// Cluster software version
    async fn get_version(&self) -> Result<ClusterVersion>;
}

/// Builds connection handles from endpoint URLs
pub trait ConnectionProvider: Send + Sync {
    /// Create a handle bound to `endpoint`
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn RpcConnection>>;
}

/// Solana JSON-RPC connection
pub struct SolanaConnection {
    client: SolanaRpcClient,
    endpoint: String,
    commitment: CommitmentConfig,
}

impl SolanaConnection {
    /// Create a connection with explicit timeout and commitment
    pub fn new(endpoint: &str, timeout: Duration, commitment: CommitmentConfig) -> Result<Self> {
        validate_endpoint(endpoint)?;

        Ok(Self {
            client: SolanaRpcClient::new_with_timeout_and_commitment(
                endpoint.to_string(),
                timeout,
                commitment,
            ),
            endpoint: endpoint.to_string(),
            commitment,
        })
    }
}

impl fmt::Debug for SolanaConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolanaConnection")
            .field("endpoint", &self.endpoint)
            .field("commitment", &self.commitment.commitment)
            .finish()
    }
}

#[async_trait]
impl RpcConnection for SolanaConnection {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64> {
        Ok(self.client.get_balance(address).await?)
    }

    async fn get_parsed_token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        program_id: &Pubkey,
    ) -> Result<Vec<TokenAccount>> {
        let keyed = self
            .client
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::ProgramId(*program_id))
            .await?;

        keyed
            .into_iter()
            .map(|keyed| {
                let pubkey: Pubkey = keyed.pubkey.parse().map_err(|e| {
                    Error::rpc(format!("Invalid token account key {}: {}", keyed.pubkey, e))
                })?;
                let parsed = match keyed.account.data {
                    UiAccountData::Json(parsed) => parsed.parsed,
                    _ => {
                        return Err(Error::rpc(format!(
                            "Token account {} was not returned in parsed form",
                            pubkey
                        )))
                    }
                };

                Ok(TokenAccount {
                    pubkey,
                    program_id: *program_id,
                    lamports: keyed.account.lamports,
                    parsed,
                })
            })
            .collect()
    }

    async fn get_signatures_for_address(&self, address: &Pubkey) -> Result<Vec<SignatureInfo>> {
        let statuses = self.client.get_signatures_for_address(address).await?;

        Ok(statuses
            .into_iter()
            .map(|status| SignatureInfo {
                signature: status.signature,
                slot: status.slot,
                block_time: status.block_time,
                err: status.err.map(|e| e.to_string()),
            })
            .collect())
    }

    async fn request_airdrop(&self, address: &Pubkey, lamports: u64) -> Result<Signature> {
        Ok(self.client.request_airdrop(address, lamports).await?)
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn confirm_transaction(&self, signature: &Signature) -> Result<()> {
        self.client
            .poll_for_signature_with_commitment(signature, self.commitment)
            .await?;

        match self
            .client
            .get_signature_status_with_commitment(signature, self.commitment)
            .await?
        {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => Err(Error::rpc(format!(
                "Transaction {} failed: {}",
                signature, err
            ))),
            None => Err(Error::rpc(format!(
                "Transaction {} was not confirmed",
                signature
            ))),
        }
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        Ok(self.client.get_latest_blockhash().await?)
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature> {
        Ok(self.client.send_transaction(transaction).await?)
    }

    async fn get_version(&self) -> Result<ClusterVersion> {
        let version = self.client.get_version().await?;
        Ok(ClusterVersion {
            solana_core: version.solana_core,
            feature_set: version.feature_set,
        })
    }
}

/// Provider of [`SolanaConnection`] handles
#[derive(Debug, Clone)]
pub struct SolanaConnectionProvider {
    timeout: Duration,
    commitment: CommitmentConfig,
}

impl SolanaConnectionProvider {
    /// Create a provider from RpcSettings
    pub fn from_settings(settings: &RpcSettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.timeout_seconds),
            commitment: settings.commitment.to_solana_commitment(),
        }
    }
}

impl Default for SolanaConnectionProvider {
    fn default() -> Self {
        Self::from_settings(&RpcSettings::default())
    }
}

impl ConnectionProvider for SolanaConnectionProvider {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn RpcConnection>> {
        let connection = SolanaConnection::new(endpoint, self.timeout, self.commitment)?;
        Ok(Arc::new(connection))
    }
}

/// Memoizes the connection for the active cluster
pub struct ConnectionFactory {
    provider: Arc<dyn ConnectionProvider>,
    current: Mutex<Option<Arc<dyn RpcConnection>>>,
}

impl ConnectionFactory {
    /// Create a factory over a provider
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self {
            provider,
            current: Mutex::new(None),
        }
    }

    /// The connection for `cluster`, recreated only when its endpoint differs
    /// from the memoized one
    pub fn get_connection(&self, cluster: &Cluster) -> Result<Arc<dyn RpcConnection>> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(connection) = current.as_ref() {
            if connection.endpoint() == cluster.endpoint {
                return Ok(connection.clone());
            }
        }

        let connection = self.provider.connect(&cluster.endpoint)?;
        match current.as_ref() {
            Some(previous) => info!(
                from = %previous.endpoint(),
                to = %cluster.endpoint,
                "connection recreated"
            ),
            None => debug!(endpoint = %cluster.endpoint, "connection created"),
        }
        *current = Some(connection.clone());

        Ok(connection)
    }
}

impl fmt::Debug for ConnectionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ConnectionFactory")
            .field("endpoint", &current.as_ref().map(|c| c.endpoint().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        inner: SolanaConnectionProvider,
        created: AtomicUsize,
    }

    impl ConnectionProvider for CountingProvider {
        fn connect(&self, endpoint: &str) -> Result<Arc<dyn RpcConnection>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            self.inner.connect(endpoint)
        }
    }

    fn cluster(name: &str, endpoint: &str) -> Cluster {
        Cluster {
            name: name.to_string(),
            network: None,
            endpoint: endpoint.to_string(),
            active: true,
        }
    }

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("https://api.devnet.solana.com").is_ok());
        assert!(validate_endpoint("http://localhost:8899").is_ok());

        assert!(validate_endpoint("localhost:8899").unwrap_err().is_validation());
        assert!(validate_endpoint("ftp://example.com").unwrap_err().is_validation());
        assert!(validate_endpoint("").unwrap_err().is_validation());
    }

    #[test]
    fn test_factory_memoizes_by_endpoint_value() -> Result<()> {
        let provider = Arc::new(CountingProvider {
            inner: SolanaConnectionProvider::default(),
            created: AtomicUsize::new(0),
        });
        let factory = ConnectionFactory::new(provider.clone());

        let first = factory.get_connection(&cluster("local", "http://localhost:8899"))?;
        // Same endpoint under a different cluster object reuses the handle
        let again = factory.get_connection(&cluster("renamed", "http://localhost:8899"))?;
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(provider.created.load(Ordering::SeqCst), 1);

        let switched = factory.get_connection(&cluster("devnet", "https://api.devnet.solana.com"))?;
        assert_eq!(switched.endpoint(), "https://api.devnet.solana.com");
        assert!(!Arc::ptr_eq(&first, &switched));
        assert_eq!(provider.created.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn test_provider_rejects_invalid_endpoint() {
        let provider = SolanaConnectionProvider::default();
        assert!(provider.connect("not a url").is_err());
    }
}
