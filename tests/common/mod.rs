#![allow(dead_code)]

use std::sync::Arc;

use btc_vault::{
    Backend, MemoryLeaseManager, MemoryStorage, Operation, Request, Response, TokenPolicy,
    VaultConfig, VaultResult,
};

pub const SEGWIT_COMPATIBLE: bool = true;

pub fn test_backend() -> Backend {
    backend_with(TokenPolicy::SingleUse, 3600)
}

pub fn backend_with(policy: TokenPolicy, ttl_secs: u64) -> Backend {
    let mut config = VaultConfig::default();
    config.wallet.mnemonic_words = btc_vault::MnemonicStrength::Words12;
    config.token.policy = policy;
    Backend::new(
        Arc::new(MemoryStorage::new()),
        Arc::new(MemoryLeaseManager::new(ttl_secs).expect("lease manager")),
        &config,
    )
}

pub fn new_wallet(b: &Backend, name: &str, network: &str, segwit: bool) -> VaultResult<Response> {
    b.handle_request(
        &Request::new(Operation::Update, format!("wallet/{name}"))
            .with("network", network)
            .with("segwit", segwit),
    )
}

pub fn get_wallet(b: &Backend, name: &str) -> VaultResult<Response> {
    b.handle_request(&Request::new(Operation::Read, format!("wallet/{name}")))
}

pub fn new_auth_token(b: &Backend, name: &str) -> VaultResult<Response> {
    b.handle_request(&Request::new(Operation::Read, format!("creds/{name}")))
}

pub fn new_segwit_auth_token(b: &Backend, name: &str) -> VaultResult<Response> {
    b.handle_request(&Request::new(Operation::Read, format!("segwit/creds/{name}")))
}

pub fn new_address(b: &Backend, name: &str, token: &str) -> VaultResult<Response> {
    b.handle_request(
        &Request::new(Operation::Update, format!("address/{name}")).with("token", token),
    )
}

pub fn token_of(resp: &Response) -> String {
    resp.get_str("token").expect("token in response").to_string()
}
