//! Wallet lifecycle through the request router.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use btc_vault::{Operation, Request, VaultError};
use common::*;

#[test]
fn new_bip44_wallet_returns_mnemonic() {
    let b = test_backend();
    let resp = new_wallet(&b, "test", "testnet", !SEGWIT_COMPATIBLE).unwrap();
    let mnemonic = resp.get_str("mnemonic").unwrap();
    assert_eq!(mnemonic.split_whitespace().count(), 12);
}

#[test]
fn new_bip49_wallet_returns_mnemonic() {
    let b = test_backend();
    let resp = new_wallet(&b, "segwitTest", "testnet", SEGWIT_COMPATIBLE).unwrap();
    assert!(resp.get_str("mnemonic").is_some());
}

#[test]
fn wallet_info_excludes_secrets() {
    let b = test_backend();
    let created = new_wallet(&b, "test", "testnet", SEGWIT_COMPATIBLE).unwrap();
    let mnemonic = created.get_str("mnemonic").unwrap().to_string();

    let resp = get_wallet(&b, "test").unwrap();
    assert_eq!(resp.get_str("name"), Some("test"));
    assert_eq!(resp.get_str("network"), Some("testnet"));
    assert_eq!(resp.get_str("purpose"), Some("segwit"));
    assert_eq!(resp.data["next_index"], 0);
    assert!(resp.data.get("seed").is_none());
    assert!(resp.data.get("mnemonic").is_none());

    let rendered = serde_json::to_string(&resp).unwrap();
    assert!(!rendered.contains(&mnemonic));
}

#[test]
fn wallet_info_for_unknown_wallet() {
    let b = test_backend();
    let err = get_wallet(&b, "ghost").unwrap_err();
    assert_eq!(err.to_string(), "WalletNotFoundError");
}

#[test]
fn new_wallet_without_network_fails() {
    let b = test_backend();
    let err = new_wallet(&b, "testwallet", "", !SEGWIT_COMPATIBLE).unwrap_err();
    assert_eq!(err.to_string(), "MissingNetworkError");
}

#[test]
fn new_wallet_with_invalid_network_fails() {
    let b = test_backend();
    let err = new_wallet(&b, "testwallet", "invalidnetwork", !SEGWIT_COMPATIBLE).unwrap_err();
    assert_eq!(err.to_string(), "InvalidNetworkError");
}

#[test]
fn create_existing_wallet_fails() {
    let b = test_backend();
    new_wallet(&b, "test", "testnet", !SEGWIT_COMPATIBLE).unwrap();
    let err = new_wallet(&b, "test", "testnet", !SEGWIT_COMPATIBLE).unwrap_err();
    assert_eq!(err.to_string(), "WalletAlreadyExistsError");

    // Names are unique across purposes too
    let err = new_wallet(&b, "test", "mainnet", SEGWIT_COMPATIBLE).unwrap_err();
    assert!(matches!(err, VaultError::WalletAlreadyExists));
}

#[test]
fn concurrent_creation_has_one_winner() {
    const N: usize = 8;
    let b = Arc::new(test_backend());
    let barrier = Arc::new(Barrier::new(N));

    let handles: Vec<_> = (0..N)
        .map(|_| {
            let b = Arc::clone(&b);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                new_wallet(&b, "race", "testnet", !SEGWIT_COMPATIBLE)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, VaultError::WalletAlreadyExists)));
}

#[test]
fn list_wallets() {
    let b = test_backend();
    new_wallet(&b, "b", "testnet", !SEGWIT_COMPATIBLE).unwrap();
    new_wallet(&b, "a", "mainnet", SEGWIT_COMPATIBLE).unwrap();

    let resp = b
        .handle_request(&Request::new(Operation::List, "wallet/"))
        .unwrap();
    assert_eq!(resp.data["keys"], serde_json::json!(["a", "b"]));
}

#[test]
fn wallet_name_is_required() {
    let b = test_backend();
    let err = new_wallet(&b, "", "testnet", !SEGWIT_COMPATIBLE).unwrap_err();
    assert_eq!(err.to_string(), "MissingWalletNameError");
}

#[test]
fn segwit_flag_must_be_boolean() {
    let b = test_backend();
    let err = b
        .handle_request(
            &Request::new(Operation::Update, "wallet/w")
                .with("network", "testnet")
                .with("segwit", "yes"),
        )
        .unwrap_err();
    assert!(matches!(err, VaultError::InvalidRequest(_)));
}
