//! Account mutation layer
//!
//! Airdrop and SOL transfer. Both validate their input before any I/O, wait
//! for confirmation through the connection, mark the source's balance and
//! signature entries stale on success and report the outcome to the
//! notification sink.

use std::str::FromStr;
use std::sync::Arc;

use solana_sdk::{
    message::Message, pubkey::Pubkey, signature::Signature, system_instruction,
    transaction::Transaction,
};
use tracing::{error, info, instrument};

use crate::account::AccountQueries;
use crate::cluster::Cluster;
use crate::error::{Error, Result};
use crate::explorer::build_explorer_url;
use crate::notify::{Notification, NotificationSink};
use crate::rpc::RpcConnection;
use crate::types::{sol_to_lamports, AirdropRequest, TransferRequest};
use crate::wallet::WalletAdapter;

/// Build an unsigned single-instruction SOL transfer paid by `source`
pub fn build_transfer_transaction(
    source: &Pubkey,
    destination: &Pubkey,
    lamports: u64,
    recent_blockhash: &solana_sdk::hash::Hash,
) -> Transaction {
    let instruction = system_instruction::transfer(source, destination, lamports);
    let message = Message::new_with_blockhash(&[instruction], Some(source), recent_blockhash);
    Transaction::new_unsigned(message)
}

/// Write operations against the active cluster
pub struct AccountMutations {
    queries: Arc<AccountQueries>,
    notifier: Arc<dyn NotificationSink>,
    explorer_url: String,
}

impl AccountMutations {
    /// Create the mutation layer over the query caches it invalidates
    pub fn new(
        queries: Arc<AccountQueries>,
        notifier: Arc<dyn NotificationSink>,
        explorer_url: impl Into<String>,
    ) -> Self {
        Self {
            queries,
            notifier,
            explorer_url: explorer_url.into(),
        }
    }

    /// Request an airdrop to `request.address` and wait for confirmation
    #[instrument(skip_all, fields(address = %request.address, amount = request.amount_sol))]
    pub async fn request_airdrop(
        &self,
        cluster: &Cluster,
        connection: Arc<dyn RpcConnection>,
        request: &AirdropRequest,
    ) -> Result<Signature> {
        let result = self.airdrop(cluster, connection.as_ref(), request).await;
        self.report(cluster, &result);
        result
    }

    async fn airdrop(
        &self,
        cluster: &Cluster,
        connection: &dyn RpcConnection,
        request: &AirdropRequest,
    ) -> Result<Signature> {
        let lamports = sol_to_lamports(request.amount_sol)?;
        if cluster.is_mainnet() {
            return Err(Error::precondition(format!(
                "Airdrops are not available on {}",
                cluster.name
            )));
        }

        let signature = connection.request_airdrop(&request.address, lamports).await?;
        connection.confirm_transaction(&signature).await?;

        self.queries
            .invalidate_account(&request.address, connection.endpoint());
        Ok(signature)
    }

    /// Transfer SOL from the connected wallet and wait for confirmation
    #[instrument(skip_all, fields(source = %request.source, destination = %request.destination, amount = request.amount_sol))]
    pub async fn transfer_sol(
        &self,
        cluster: &Cluster,
        connection: Arc<dyn RpcConnection>,
        wallet: &dyn WalletAdapter,
        request: &TransferRequest,
    ) -> Result<Signature> {
        let result = self.transfer(connection.as_ref(), wallet, request).await;
        self.report(cluster, &result);
        result
    }

    async fn transfer(
        &self,
        connection: &dyn RpcConnection,
        wallet: &dyn WalletAdapter,
        request: &TransferRequest,
    ) -> Result<Signature> {
        let destination = Pubkey::from_str(request.destination.trim())?;
        let lamports = sol_to_lamports(request.amount_sol)?;

        match wallet.connected_address() {
            None => return Err(Error::precondition("Wallet not connected")),
            Some(signer) if signer != request.source => {
                return Err(Error::precondition(format!(
                    "Connected wallet {} cannot sign for {}",
                    signer, request.source
                )))
            }
            Some(_) => {}
        }

        let blockhash = connection.get_latest_blockhash().await?;
        let transaction =
            build_transfer_transaction(&request.source, &destination, lamports, &blockhash);

        let signature = wallet.sign_and_send(transaction, connection).await?;
        connection.confirm_transaction(&signature).await?;

        self.queries
            .invalidate_account(&request.source, connection.endpoint());
        Ok(signature)
    }

    fn report(&self, cluster: &Cluster, result: &Result<Signature>) {
        let notification = match result {
            Ok(signature) => {
                info!(%signature, "transaction confirmed");
                let link = build_explorer_url(
                    &self.explorer_url,
                    &format!("tx/{}", signature),
                    cluster,
                );
                Notification::transaction_sent(link)
            }
            Err(err) => {
                error!(error = %err, "transaction failed");
                Notification::transaction_failed(err)
            }
        };
        self.notifier.notify(notification);
    }
}

impl std::fmt::Debug for AccountMutations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountMutations")
            .field("explorer_url", &self.explorer_url)
            .finish()
    }
}
