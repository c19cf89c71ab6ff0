mod common;

use std::sync::atomic::Ordering;

use common::{Harness, DEVNET, TESTNET};
use dapp_scaffold_core::account::TOKEN_2022_PROGRAM_ID;
use dapp_scaffold_core::types::{SignatureInfo, TokenAccount};
use dapp_scaffold_core::{QueryKey, QueryKind, QueryStatus};
use serde_json::json;
use solana_sdk::pubkey::Pubkey;

fn token_account(program_id: Pubkey, mint: &str) -> TokenAccount {
    TokenAccount {
        pubkey: Pubkey::new_unique(),
        program_id,
        lamports: 2_039_280,
        parsed: json!({ "type": "account", "info": { "mint": mint } }),
    }
}

#[tokio::test]
async fn concurrent_reads_share_one_rpc_call() {
    let harness = Harness::new();
    let address = Pubkey::new_unique();
    harness.active().balance.store(42, Ordering::SeqCst);

    let (a, b) = tokio::join!(
        harness.client.get_balance(&address),
        harness.client.get_balance(&address),
    );

    assert_eq!(a.unwrap(), 42);
    assert_eq!(b.unwrap(), 42);
    assert_eq!(harness.active().count("getBalance"), 1);
}

#[tokio::test]
async fn cached_balance_is_reused_until_refetch() {
    let harness = Harness::new();
    let address = Pubkey::new_unique();
    let devnet = harness.active();
    devnet.balance.store(1, Ordering::SeqCst);

    assert_eq!(harness.client.get_balance(&address).await.unwrap(), 1);
    devnet.balance.store(2, Ordering::SeqCst);
    assert_eq!(harness.client.get_balance(&address).await.unwrap(), 1);
    assert_eq!(harness.client.refetch_balance(&address).await.unwrap(), 2);
    assert_eq!(devnet.count("getBalance"), 2);
}

#[tokio::test]
async fn cluster_switch_never_serves_old_endpoint_data() {
    let harness = Harness::new();
    let address = Pubkey::new_unique();
    harness.provider.connection(DEVNET).balance.store(100, Ordering::SeqCst);
    harness.provider.connection(TESTNET).balance.store(200, Ordering::SeqCst);

    assert_eq!(harness.client.get_balance(&address).await.unwrap(), 100);

    harness.client.set_active_cluster("testnet").unwrap();
    assert_eq!(harness.client.get_balance(&address).await.unwrap(), 200);

    assert_eq!(harness.provider.connection(TESTNET).count("getBalance"), 1);
    assert_eq!(harness.provider.connects.load(Ordering::SeqCst), 2);

    // The devnet entry is untouched by the switch
    let devnet_key = QueryKey::new(QueryKind::Balance, address, DEVNET);
    let snapshot = harness.client.queries().balances().snapshot(&devnet_key).unwrap();
    assert_eq!(snapshot.data, Some(100));
    assert!(!snapshot.is_stale);
    assert_eq!(harness.provider.connection(DEVNET).count("getBalance"), 1);
}

#[tokio::test]
async fn different_addresses_use_different_entries() {
    let harness = Harness::new();
    let first = Pubkey::new_unique();
    let second = Pubkey::new_unique();

    harness.client.get_balance(&first).await.unwrap();
    harness.client.get_balance(&second).await.unwrap();

    assert_eq!(harness.active().count("getBalance"), 2);
    assert_eq!(harness.client.queries().balances().len(), 2);
}

#[tokio::test]
async fn failed_read_surfaces_error_state() {
    let harness = Harness::new();
    let address = Pubkey::new_unique();
    harness.active().fail_balance.store(true, Ordering::SeqCst);

    let err = harness.client.get_balance(&address).await.unwrap_err();
    assert!(err.is_rpc());
    assert_eq!(err.to_string(), "RPC error: node is behind");

    let key = harness.client.query_key(QueryKind::Balance, &address).unwrap();
    let snapshot = harness.client.queries().balances().snapshot(&key).unwrap();
    assert_eq!(snapshot.status, QueryStatus::Error);
    assert_eq!(snapshot.error.as_deref(), Some("RPC error: node is behind"));

    // Manual retry recovers
    harness.active().fail_balance.store(false, Ordering::SeqCst);
    harness.client.refetch_balance(&address).await.unwrap();
    let snapshot = harness.client.queries().balances().snapshot(&key).unwrap();
    assert_eq!(snapshot.status, QueryStatus::Success);
}

#[tokio::test]
async fn token_accounts_concatenate_in_program_order() {
    let harness = Harness::new();
    let owner = Pubkey::new_unique();
    let legacy = vec![
        token_account(spl_token::ID, "mint-a"),
        token_account(spl_token::ID, "mint-b"),
    ];
    let extended = vec![token_account(TOKEN_2022_PROGRAM_ID, "mint-c")];
    {
        let devnet = harness.active();
        let mut accounts = devnet.token_accounts.lock().unwrap();
        accounts.insert(spl_token::ID, legacy.clone());
        accounts.insert(TOKEN_2022_PROGRAM_ID, extended.clone());
    }

    let accounts = harness.client.get_token_accounts(&owner).await.unwrap();

    let mints: Vec<_> = accounts.iter().filter_map(|a| a.mint()).collect();
    assert_eq!(mints, vec!["mint-a", "mint-b", "mint-c"]);
    assert_eq!(accounts[2].program_id, TOKEN_2022_PROGRAM_ID);
    assert_eq!(harness.active().count("getTokenAccountsByOwner"), 2);
}

#[tokio::test]
async fn signatures_keep_rpc_order() {
    let harness = Harness::new();
    let address = Pubkey::new_unique();
    let history = vec![
        SignatureInfo {
            signature: "newest".to_string(),
            slot: 30,
            block_time: Some(1_700_000_300),
            err: None,
        },
        SignatureInfo {
            signature: "older".to_string(),
            slot: 10,
            block_time: None,
            err: Some("InstructionError".to_string()),
        },
        SignatureInfo {
            signature: "oldest".to_string(),
            slot: 20,
            block_time: Some(1_700_000_100),
            err: None,
        },
    ];
    *harness.active().signatures.lock().unwrap() = history.clone();

    let fetched = harness.client.get_signatures(&address).await.unwrap();
    assert_eq!(fetched, history);
    assert!(!fetched[1].is_success());
}

#[tokio::test]
async fn cluster_check_retries_once() {
    let harness = Harness::new();
    let devnet = harness.active();

    devnet.version_failures.store(1, Ordering::SeqCst);
    let version = harness.client.check_cluster().await.unwrap();
    assert_eq!(version.solana_core, "1.17.0");
    assert_eq!(devnet.count("getVersion"), 2);

    devnet.version_failures.store(2, Ordering::SeqCst);
    assert!(harness.client.check_cluster().await.unwrap_err().is_rpc());
    assert_eq!(devnet.count("getVersion"), 4);
}

#[tokio::test]
async fn observed_entries_survive_garbage_collection() {
    let harness = Harness::new();
    let address = Pubkey::new_unique();
    let key = harness.client.query_key(QueryKind::Balance, &address).unwrap();

    let observer = harness.client.queries().balances().observe(key.clone());
    harness.client.get_balance(&address).await.unwrap();

    let snapshot = harness.client.queries().balances().snapshot(&key).unwrap();
    assert_eq!(snapshot.observers, 1);
    assert!(snapshot.last_fetched_at.is_some());

    drop(observer);
    let snapshot = harness.client.queries().balances().snapshot(&key).unwrap();
    assert_eq!(snapshot.observers, 0);
    assert_eq!(snapshot.data, Some(0));
}
