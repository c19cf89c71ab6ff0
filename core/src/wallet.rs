//! Wallet capability
//!
//! The client never owns keys. It asks a [`WalletAdapter`] which address is
//! connected and hands it unsigned transactions to sign and submit through
//! the active connection.
//!
//! # Example
//!
//! ```no_run
//! use dapp_scaffold_core::wallet::{KeypairWallet, WalletAdapter};
//!
//! # fn run() -> dapp_scaffold_core::Result<()> {
//! let wallet = KeypairWallet::from_file("~/.config/solana/id.json")?;
//! println!("connected as {:?}", wallet.connected_address());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{read_keypair_file, Keypair, Signature, Signer},
    transaction::Transaction,
};
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::rpc::RpcConnection;

/// Signing capability of the connected wallet
#[async_trait]
pub trait WalletAdapter: Send + Sync {
    /// Address of the connected signer, `None` when disconnected
    fn connected_address(&self) -> Option<Pubkey>;

    /// Sign `transaction` (its blockhash already set) and submit it through `connection`
    async fn sign_and_send(
        &self,
        transaction: Transaction,
        connection: &dyn RpcConnection,
    ) -> Result<Signature>;
}

/// Wallet with no signer attached
#[derive(Debug, Default, Clone, Copy)]
pub struct DisconnectedWallet;

#[async_trait]
impl WalletAdapter for DisconnectedWallet {
    fn connected_address(&self) -> Option<Pubkey> {
        None
    }

    async fn sign_and_send(
        &self,
        _transaction: Transaction,
        _connection: &dyn RpcConnection,
    ) -> Result<Signature> {
        Err(Error::precondition("Wallet not connected"))
    }
}

/// Wallet signing with a local keypair
pub struct KeypairWallet {
    keypair: Keypair,
}

impl KeypairWallet {
    /// Wrap a keypair
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    /// Load a keypair file in the Solana CLI JSON format; a leading `~` is expanded
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let expanded = match path.strip_prefix("~") {
            Ok(rest) => dirs::home_dir()
                .ok_or_else(|| Error::config("Home directory not found"))?
                .join(rest),
            Err(_) => path.to_path_buf(),
        };

        let keypair = read_keypair_file(&expanded).map_err(|e| {
            Error::config(format!(
                "Failed to read keypair {}: {}",
                expanded.display(),
                e
            ))
        })?;

        Ok(Self::new(keypair))
    }

    /// Public key of the keypair
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

impl fmt::Debug for KeypairWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeypairWallet")
            .field("pubkey", &self.keypair.pubkey())
            .finish()
    }
}

#[async_trait]
impl WalletAdapter for KeypairWallet {
    fn connected_address(&self) -> Option<Pubkey> {
        Some(self.keypair.pubkey())
    }

    #[instrument(skip_all, fields(signer = %self.keypair.pubkey(), endpoint = %connection.endpoint()))]
    async fn sign_and_send(
        &self,
        mut transaction: Transaction,
        connection: &dyn RpcConnection,
    ) -> Result<Signature> {
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_sign(&[&self.keypair], blockhash)
            .map_err(|e| Error::precondition(format!("Failed to sign transaction: {}", e)))?;

        let signature = connection.send_transaction(&transaction).await?;
        debug!(%signature, "transaction submitted");
        Ok(signature)
    }
}
