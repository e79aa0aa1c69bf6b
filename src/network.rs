use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{VaultError, VaultResult};

/// Networks a wallet can be created on. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

/// Address and path parameters for one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams {
    pub network: Network,
    /// Version byte for pay-to-pubkey-hash addresses
    pub pubkey_hash_version: u8,
    /// Version byte for pay-to-script-hash addresses
    pub script_hash_version: u8,
    /// SLIP-44 coin type, used unhardened here and hardened in the path
    pub coin_type: u32,
}

const MAINNET: NetworkParams = NetworkParams {
    network: Network::Mainnet,
    pubkey_hash_version: 0x00,
    script_hash_version: 0x05,
    coin_type: 0,
};

const TESTNET: NetworkParams = NetworkParams {
    network: Network::Testnet,
    pubkey_hash_version: 0x6f,
    script_hash_version: 0xc4,
    coin_type: 1,
};

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }

    pub fn params(&self) -> &'static NetworkParams {
        match self {
            Network::Mainnet => &MAINNET,
            Network::Testnet => &TESTNET,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves a caller-supplied network identifier.
///
/// An empty identifier is reported separately from an unknown one.
pub fn resolve(identifier: &str) -> VaultResult<&'static NetworkParams> {
    match identifier {
        "" => Err(VaultError::MissingNetwork),
        "mainnet" => Ok(&MAINNET),
        "testnet" => Ok(&TESTNET),
        _ => Err(VaultError::InvalidNetwork),
    }
}
