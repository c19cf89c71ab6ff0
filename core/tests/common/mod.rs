//! In-memory collaborators for driving the client without a network

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dapp_scaffold_core::notify::ChannelNotifier;
use dapp_scaffold_core::rpc::{ConnectionProvider, RpcConnection};
use dapp_scaffold_core::types::{ClusterVersion, SignatureInfo, TokenAccount};
use dapp_scaffold_core::wallet::WalletAdapter;
use dapp_scaffold_core::{ClientConfig, DappClient, Error, MemoryStore, Notification, Result};
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Signature, transaction::Transaction};
use tokio::sync::mpsc::UnboundedReceiver;

/// RPC fake bound to one endpoint, recording every call
pub struct FakeConnection {
    endpoint: String,
    calls: Mutex<Vec<&'static str>>,
    pub balance: AtomicU64,
    pub token_accounts: Mutex<HashMap<Pubkey, Vec<TokenAccount>>>,
    pub signatures: Mutex<Vec<SignatureInfo>>,
    pub sent: Mutex<Vec<Transaction>>,
    pub fail_balance: AtomicBool,
    pub fail_airdrop: AtomicBool,
    pub fail_confirm: AtomicBool,
    pub version_failures: AtomicUsize,
}

impl FakeConnection {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            calls: Mutex::new(Vec::new()),
            balance: AtomicU64::new(0),
            token_accounts: Mutex::new(HashMap::new()),
            signatures: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            fail_balance: AtomicBool::new(false),
            fail_airdrop: AtomicBool::new(false),
            fail_confirm: AtomicBool::new(false),
            version_failures: AtomicUsize::new(0),
        }
    }

    fn record(&self, method: &'static str) {
        self.calls.lock().unwrap().push(method);
    }

    /// How many times `method` was called
    pub fn count(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| **m == method).count()
    }

    /// Total number of calls
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl RpcConnection for FakeConnection {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_balance(&self, _address: &Pubkey) -> Result<u64> {
        self.record("getBalance");
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.fail_balance.load(Ordering::SeqCst) {
            return Err(Error::rpc("node is behind"));
        }
        Ok(self.balance.load(Ordering::SeqCst))
    }

    async fn get_parsed_token_accounts_by_owner(
        &self,
        _owner: &Pubkey,
        program_id: &Pubkey,
    ) -> Result<Vec<TokenAccount>> {
        self.record("getTokenAccountsByOwner");
        let accounts = self.token_accounts.lock().unwrap();
        Ok(accounts.get(program_id).cloned().unwrap_or_default())
    }

    async fn get_signatures_for_address(&self, _address: &Pubkey) -> Result<Vec<SignatureInfo>> {
        self.record("getSignaturesForAddress");
        Ok(self.signatures.lock().unwrap().clone())
    }

    async fn request_airdrop(&self, _address: &Pubkey, lamports: u64) -> Result<Signature> {
        self.record("requestAirdrop");
        if self.fail_airdrop.load(Ordering::SeqCst) {
            return Err(Error::rpc("airdrop limit reached"));
        }
        self.balance.fetch_add(lamports, Ordering::SeqCst);
        Ok(Signature::new_unique())
    }

    async fn confirm_transaction(&self, _signature: &Signature) -> Result<()> {
        self.record("confirmTransaction");
        if self.fail_confirm.load(Ordering::SeqCst) {
            return Err(Error::rpc("transaction expired"));
        }
        Ok(())
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.record("getLatestBlockhash");
        Ok(Hash::new_unique())
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature> {
        self.record("sendTransaction");
        self.sent.lock().unwrap().push(transaction.clone());
        Ok(transaction.signatures.first().copied().unwrap_or_default())
    }

    async fn get_version(&self) -> Result<ClusterVersion> {
        self.record("getVersion");
        let remaining = self.version_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.version_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::rpc("connection refused"));
        }
        Ok(ClusterVersion {
            solana_core: "1.17.0".to_string(),
            feature_set: Some(1),
        })
    }
}

/// Provider handing out one [`FakeConnection`] per endpoint
#[derive(Default)]
pub struct FakeProvider {
    connections: Mutex<HashMap<String, Arc<FakeConnection>>>,
    pub connects: AtomicUsize,
}

impl FakeProvider {
    /// The fake behind `endpoint`, created on first use
    pub fn connection(&self, endpoint: &str) -> Arc<FakeConnection> {
        self.connections
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(FakeConnection::new(endpoint)))
            .clone()
    }
}

impl ConnectionProvider for FakeProvider {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn RpcConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.connection(endpoint))
    }
}

/// Wallet that "signs" by forwarding the transaction untouched
pub struct FakeWallet {
    pub address: Option<Pubkey>,
    pub signed: AtomicUsize,
}

impl FakeWallet {
    pub fn connected(address: Pubkey) -> Self {
        Self {
            address: Some(address),
            signed: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl WalletAdapter for FakeWallet {
    fn connected_address(&self) -> Option<Pubkey> {
        self.address
    }

    async fn sign_and_send(
        &self,
        transaction: Transaction,
        connection: &dyn RpcConnection,
    ) -> Result<Signature> {
        self.signed.fetch_add(1, Ordering::SeqCst);
        connection.send_transaction(&transaction).await?;
        Ok(Signature::new_unique())
    }
}

/// A client wired to fakes, with handles for inspecting them
pub struct Harness {
    pub client: DappClient,
    pub provider: Arc<FakeProvider>,
    pub store: Arc<MemoryStore>,
    pub wallet: Arc<FakeWallet>,
    pub notifications: UnboundedReceiver<Notification>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_wallet(FakeWallet {
            address: None,
            signed: AtomicUsize::new(0),
        })
    }

    pub fn with_wallet(wallet: FakeWallet) -> Self {
        let provider = Arc::new(FakeProvider::default());
        let store = Arc::new(MemoryStore::new());
        let wallet = Arc::new(wallet);
        let (notifier, notifications) = ChannelNotifier::new();

        let client = DappClient::builder(ClientConfig::default())
            .store(store.clone())
            .provider(provider.clone())
            .wallet(wallet.clone())
            .notifier(Arc::new(notifier))
            .build()
            .unwrap();

        Self {
            client,
            provider,
            store,
            wallet,
            notifications,
        }
    }

    /// Fake behind the active cluster
    pub fn active(&self) -> Arc<FakeConnection> {
        let endpoint = self.client.active_cluster().unwrap().endpoint;
        self.provider.connection(&endpoint)
    }
}

pub const DEVNET: &str = "https://api.devnet.solana.com";
pub const TESTNET: &str = "https://api.testnet.solana.com";
