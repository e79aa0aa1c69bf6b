use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use zeroize::{Zeroize, Zeroizing};

use crate::backend::Context;
use crate::derivation::{self, DerivationPath, Purpose};
use crate::error::{VaultError, VaultResult};
use crate::keys;
use crate::mnemonic::{MnemonicStrength, SecureMnemonic};
use crate::network::{self, Network};
use crate::storage::{get_json, put_json, put_json_if_absent, StorageError};

pub(crate) const WALLET_PREFIX: &str = "wallet/";

/// Persisted form of a wallet. Only this record ever holds the seed.
#[derive(Serialize, Deserialize)]
struct WalletEntry {
    name: String,
    network: Network,
    purpose: Purpose,
    #[serde(default)]
    account: u32,
    seed: String,
    next_index: u32,
}

impl Drop for WalletEntry {
    fn drop(&mut self) {
        self.seed.zeroize();
    }
}

impl WalletEntry {
    fn metadata(&self) -> Wallet {
        Wallet {
            name: self.name.clone(),
            network: self.network,
            purpose: self.purpose,
            segwit: self.purpose.is_segwit(),
            account: self.account,
            next_index: self.next_index,
        }
    }
}

/// Wallet metadata safe to hand to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wallet {
    pub name: String,
    pub network: Network,
    pub purpose: Purpose,
    pub segwit: bool,
    pub account: u32,
    pub next_index: u32,
}

/// Result of a successful creation. The only place the mnemonic is exposed.
pub struct CreatedWallet {
    pub wallet: Wallet,
    pub mnemonic: Zeroizing<String>,
}

impl fmt::Debug for CreatedWallet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CreatedWallet")
            .field("wallet", &self.wallet)
            .field("mnemonic", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedAddress {
    pub address: String,
    pub index: u32,
    pub path: String,
}

pub struct WalletStore {
    strength: MnemonicStrength,
    account: u32,
    // One mutex per wallet name serializes next_address for that wallet
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WalletStore {
    pub fn new(strength: MnemonicStrength, account: u32) -> Self {
        WalletStore {
            strength,
            account,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn create(
        &self,
        ctx: &Context,
        name: &str,
        network: &str,
        purpose: Purpose,
    ) -> VaultResult<CreatedWallet> {
        if name.is_empty() {
            return Err(VaultError::MissingWalletName);
        }
        let params = network::resolve(network)?;

        let mnemonic = SecureMnemonic::generate(self.strength)?;
        let seed = mnemonic.to_seed("");
        // Refuse to persist a seed that cannot produce a master key
        derivation::master_key(&seed[..])?;

        let entry = WalletEntry {
            name: name.to_string(),
            network: params.network,
            purpose,
            account: self.account,
            seed: hex::encode(&seed[..]),
            next_index: 0,
        };

        if !put_json_if_absent(ctx.storage.as_ref(), &wallet_key(name), &entry)? {
            debug!(wallet = name, "wallet name already taken");
            return Err(VaultError::WalletAlreadyExists);
        }

        info!(
            wallet = name,
            network = %params.network,
            purpose = ?purpose,
            "wallet created"
        );

        Ok(CreatedWallet {
            wallet: entry.metadata(),
            mnemonic: mnemonic.phrase(),
        })
    }

    /// Wallet metadata, or `None` when no wallet has this name.
    pub fn find(&self, ctx: &Context, name: &str) -> VaultResult<Option<Wallet>> {
        if name.is_empty() {
            return Err(VaultError::MissingWalletName);
        }
        let entry: Option<WalletEntry> = get_json(ctx.storage.as_ref(), &wallet_key(name))?;
        Ok(entry.map(|entry| entry.metadata()))
    }

    pub fn get(&self, ctx: &Context, name: &str) -> VaultResult<Wallet> {
        self.find(ctx, name)?
            .ok_or(VaultError::WalletNotFound(Purpose::Standard))
    }

    pub fn list(&self, ctx: &Context) -> VaultResult<Vec<String>> {
        Ok(ctx
            .storage
            .list(WALLET_PREFIX)?
            .into_iter()
            .filter_map(|key| key.strip_prefix(WALLET_PREFIX).map(str::to_string))
            .collect())
    }

    /// Derives the address at the wallet's counter and advances the counter.
    ///
    /// The counter is persisted before the address is returned, so an index
    /// is never handed out twice.
    pub fn next_address(&self, ctx: &Context, name: &str) -> VaultResult<IssuedAddress> {
        if name.is_empty() {
            return Err(VaultError::MissingWalletName);
        }

        let key = wallet_key(name);
        // Only names with a stored record get a lock entry
        if ctx.storage.get(&key)?.is_none() {
            return Err(VaultError::WalletNotFound(Purpose::Standard));
        }

        let lock = self.lock_for(name)?;
        let _guard = lock.lock().map_err(|_| StorageError::Poisoned)?;

        let mut entry: WalletEntry = get_json(ctx.storage.as_ref(), &key)?
            .ok_or(VaultError::WalletNotFound(Purpose::Standard))?;

        let index = entry.next_index;
        let params = entry.network.params();
        let path =
            DerivationPath::for_purpose(entry.purpose, params.coin_type, entry.account, index)?;

        let seed =
            Zeroizing::new(hex::decode(&entry.seed).map_err(|_| StorageError::InvalidFormat)?);
        let master = derivation::master_key(&seed)?;
        let child = path.derive(&master)?;
        let address = keys::render(&child.public_key, params, entry.purpose.into());

        entry.next_index = index
            .checked_add(1)
            .ok_or(derivation::DerivationError::IndexOverflow(index))?;
        put_json(ctx.storage.as_ref(), &key, &entry)?;

        info!(wallet = name, index, "address issued");

        Ok(IssuedAddress {
            address,
            index,
            path: path.to_string(),
        })
    }

    fn lock_for(&self, name: &str) -> VaultResult<Arc<Mutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(locks.entry(name.to_string()).or_default().clone())
    }
}

fn wallet_key(name: &str) -> String {
    format!("{}{}", WALLET_PREFIX, name)
}
