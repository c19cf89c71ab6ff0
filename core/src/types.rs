//! Core data types for the scaffold client
//!
//! Account views returned by the query layer, the request types accepted by
//! the mutation layer, and the small unit/display helpers the UI shares.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::error::{Error, Result};

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// A token account owned by an address, with its parsed body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAccount {
    /// Token account address
    pub pubkey: Pubkey,
    /// Token program owning the account
    pub program_id: Pubkey,
    /// Lamports held by the account
    pub lamports: u64,
    /// Parsed account body (`{"type": ..., "info": {...}}`)
    pub parsed: serde_json::Value,
}

impl TokenAccount {
    /// Mint address
    pub fn mint(&self) -> Option<&str> {
        self.parsed.pointer("/info/mint").and_then(|v| v.as_str())
    }

    /// Balance in display units
    pub fn ui_amount(&self) -> Option<f64> {
        self.parsed
            .pointer("/info/tokenAmount/uiAmount")
            .and_then(|v| v.as_f64())
    }
}

/// One entry of an address's signature history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    /// Transaction signature (base58)
    pub signature: String,
    /// Slot the transaction landed in
    pub slot: u64,
    /// Unix timestamp of the block, when known
    pub block_time: Option<i64>,
    /// Transaction error, when the transaction failed
    pub err: Option<String>,
}

impl SignatureInfo {
    /// Whether the transaction succeeded
    pub fn is_success(&self) -> bool {
        self.err.is_none()
    }
}

/// Cluster software version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterVersion {
    /// `solana-core` version string
    pub solana_core: String,
    /// Feature set identifier
    pub feature_set: Option<u32>,
}

/// Airdrop request
#[derive(Debug, Clone, PartialEq)]
pub struct AirdropRequest {
    /// Address to credit
    pub address: Pubkey,
    /// Amount in SOL
    pub amount_sol: f64,
}

/// SOL transfer request
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    /// Paying address, must be the connected wallet
    pub source: Pubkey,
    /// Destination address (base58, parsed at submission)
    pub destination: String,
    /// Amount in SOL
    pub amount_sol: f64,
}

/// Convert a positive SOL amount to lamports, rejecting zero, negative or
/// non-finite values and amounts below one lamport
pub fn sol_to_lamports(amount_sol: f64) -> Result<u64> {
    if !amount_sol.is_finite() || amount_sol <= 0.0 {
        return Err(Error::validation(format!(
            "Amount must be greater than zero, got {}",
            amount_sol
        )));
    }

    let lamports = (amount_sol * LAMPORTS_PER_SOL as f64).round();
    if lamports < 1.0 {
        return Err(Error::validation(format!(
            "Amount {} SOL is smaller than one lamport",
            amount_sol
        )));
    }
    if lamports > u64::MAX as f64 {
        return Err(Error::validation(format!("Amount {} SOL is too large", amount_sol)));
    }

    Ok(lamports as u64)
}

/// Convert lamports to SOL
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Format a lamport balance as SOL rounded to 5 decimals
pub fn format_sol_balance(lamports: u64) -> String {
    let sol = (lamports_to_sol(lamports) * 100_000.0).round() / 100_000.0;
    format!("{}", sol)
}

/// Shorten strings longer than 30 chars to `head..tail`, keeping `len` chars per side
pub fn ellipsify(text: &str, len: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() > 30 {
        let head: String = chars[..len.min(chars.len())].iter().collect();
        let tail: String = chars[chars.len().saturating_sub(len)..].iter().collect();
        format!("{}..{}", head, tail)
    } else {
        text.to_string()
    }
}
