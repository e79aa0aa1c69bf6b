use bitcoin_hashes::{hash160, Hash};
use hmac::{Hmac, Mac};
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::Zeroize;

use crate::network::NetworkParams;

pub const HARDENED_BIT: u32 = 0x8000_0000;

/// BIP32 bounds on the master seed length.
const MIN_SEED_LEN: usize = 16;
const MAX_SEED_LEN: usize = 64;

/// Index of the external (receive) chain below the account node.
const EXTERNAL_CHAIN: u32 = 0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DerivationError {
    #[error("Seed is empty")]
    EmptySeed,

    #[error("Invalid seed length: {0} bytes, expected 16 to 64")]
    InvalidSeedLength(usize),

    #[error("Seed does not produce a valid master key")]
    InvalidMasterKey,

    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("Child index {0} is outside the valid range")]
    IndexOverflow(u32),

    #[error("Derived key is invalid at child number {0}")]
    InvalidChildKey(u32),

    #[error("Maximum derivation depth exceeded")]
    DepthOverflow,

    #[error("HMAC operation failed")]
    Hmac,
}

/// Which BIP selects the path prefix and the address rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Purpose {
    /// BIP44, pay-to-pubkey-hash
    #[serde(rename = "standard")]
    Standard,
    /// BIP49, P2WPKH nested in P2SH
    #[serde(rename = "segwit")]
    SegWitCompatible,
}

impl Purpose {
    pub fn from_segwit_flag(segwit: bool) -> Self {
        if segwit {
            Purpose::SegWitCompatible
        } else {
            Purpose::Standard
        }
    }

    pub fn index(&self) -> u32 {
        match self {
            Purpose::Standard => 44,
            Purpose::SegWitCompatible => 49,
        }
    }

    pub fn is_segwit(&self) -> bool {
        matches!(self, Purpose::SegWitCompatible)
    }

    /// Prefix of the not-found sentinel for wallets of this purpose.
    pub fn error_prefix(&self) -> &'static str {
        match self {
            Purpose::Standard => "",
            Purpose::SegWitCompatible => "SegWit",
        }
    }
}

/// Represents a BIP32 extended private key
#[derive(Clone)]
pub struct ExtendedKey {
    pub private_key: SecretKey,
    pub public_key: PublicKey,
    pub chain_code: [u8; 32],
    pub depth: u8,
    pub parent_fingerprint: [u8; 4],
    pub child_number: u32,
}

impl fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ExtendedKey")
            .field("depth", &self.depth)
            .field("child_number", &self.child_number)
            .field("fingerprint", &hex::encode(self.fingerprint()))
            .finish_non_exhaustive()
    }
}

impl ExtendedKey {
    /// Creates a new master key from a seed
    pub fn from_seed(seed: &[u8]) -> Result<Self, DerivationError> {
        if seed.is_empty() {
            return Err(DerivationError::EmptySeed);
        }
        if !(MIN_SEED_LEN..=MAX_SEED_LEN).contains(&seed.len()) {
            return Err(DerivationError::InvalidSeedLength(seed.len()));
        }

        let (mut left, chain_code) = hmac_sha512(b"Bitcoin seed", &[seed])?;
        let private_key =
            SecretKey::from_slice(&left).map_err(|_| DerivationError::InvalidMasterKey);
        left.zeroize();
        let private_key = private_key?;

        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &private_key);

        Ok(ExtendedKey {
            private_key,
            public_key,
            chain_code,
            depth: 0,
            parent_fingerprint: [0u8; 4],
            child_number: 0,
        })
    }

    /// Derives a child key based on the provided index
    pub fn derive_child(&self, index: u32) -> Result<Self, DerivationError> {
        let depth = self
            .depth
            .checked_add(1)
            .ok_or(DerivationError::DepthOverflow)?;

        // Hardened children commit to the private key, normal ones to the public key
        let mut data = Vec::with_capacity(37);
        if index & HARDENED_BIT != 0 {
            data.push(0);
            data.extend_from_slice(&self.private_key.secret_bytes());
        } else {
            data.extend_from_slice(&self.public_key.serialize());
        }
        data.extend_from_slice(&index.to_be_bytes());

        let result = hmac_sha512(&self.chain_code, &[&data]);
        data.zeroize();
        let (mut left, chain_code) = result?;

        // IL must be a valid scalar and the sum must not be zero
        let tweak = Scalar::from_be_bytes(left);
        left.zeroize();
        let tweak = tweak.map_err(|_| DerivationError::InvalidChildKey(index))?;
        let private_key = self
            .private_key
            .add_tweak(&tweak)
            .map_err(|_| DerivationError::InvalidChildKey(index))?;

        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &private_key);

        Ok(ExtendedKey {
            private_key,
            public_key,
            chain_code,
            depth,
            parent_fingerprint: self.fingerprint(),
            child_number: index,
        })
    }

    /// First four bytes of HASH160 of the compressed public key
    pub fn fingerprint(&self) -> [u8; 4] {
        let hash = hash160::Hash::hash(&self.public_key.serialize());
        let mut result = [0u8; 4];
        result.copy_from_slice(&<hash160::Hash as AsRef<[u8]>>::as_ref(&hash)[0..4]);
        result
    }

    pub fn neuter(&self) -> PublicKey {
        self.public_key
    }
}

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<([u8; 32], [u8; 32]), DerivationError> {
    let mut hmac = Hmac::<Sha512>::new_from_slice(key).map_err(|_| DerivationError::Hmac)?;
    for part in parts {
        hmac.update(part);
    }
    let result = hmac.finalize().into_bytes();

    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&result[0..32]);
    right.copy_from_slice(&result[32..64]);
    Ok((left, right))
}

/// Represents a BIP32 derivation path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationPath {
    indices: Vec<u32>,
}

impl DerivationPath {
    /// `m / purpose' / coin_type' / account' / 0 / address_index`
    pub fn for_purpose(
        purpose: Purpose,
        coin_type: u32,
        account: u32,
        address_index: u32,
    ) -> Result<Self, DerivationError> {
        Ok(DerivationPath {
            indices: vec![
                hardened(purpose.index())?,
                hardened(coin_type)?,
                hardened(account)?,
                EXTERNAL_CHAIN,
                normal(address_index)?,
            ],
        })
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Derives a key following this path
    pub fn derive(&self, root: &ExtendedKey) -> Result<ExtendedKey, DerivationError> {
        let mut key = root.clone();
        for &index in &self.indices {
            key = key.derive_child(index)?;
        }
        Ok(key)
    }
}

fn hardened(index: u32) -> Result<u32, DerivationError> {
    normal(index).map(|index| index | HARDENED_BIT)
}

fn normal(index: u32) -> Result<u32, DerivationError> {
    if index & HARDENED_BIT != 0 {
        return Err(DerivationError::IndexOverflow(index));
    }
    Ok(index)
}

impl FromStr for DerivationPath {
    type Err = DerivationError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let mut components = path.split('/');
        if components.next() != Some("m") {
            return Err(DerivationError::InvalidPath(path.to_string()));
        }

        let indices = components
            .map(|component| {
                let (index_str, hardened_segment) =
                    match component.strip_suffix('\'').or_else(|| component.strip_suffix('h')) {
                        Some(stripped) => (stripped, true),
                        None => (component, false),
                    };
                let index = index_str
                    .parse::<u32>()
                    .map_err(|_| DerivationError::InvalidPath(path.to_string()))?;
                if hardened_segment {
                    hardened(index)
                } else {
                    normal(index)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DerivationPath { indices })
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("m")?;
        for index in &self.indices {
            if index & HARDENED_BIT != 0 {
                write!(f, "/{}'", index & !HARDENED_BIT)?;
            } else {
                write!(f, "/{}", index)?;
            }
        }
        Ok(())
    }
}

/// Master key for a wallet seed.
pub fn master_key(seed: &[u8]) -> Result<ExtendedKey, DerivationError> {
    ExtendedKey::from_seed(seed)
}

/// Receive-chain key at `address_index` for the given network and purpose.
pub fn derive(
    master: &ExtendedKey,
    network: &NetworkParams,
    purpose: Purpose,
    account: u32,
    address_index: u32,
) -> Result<ExtendedKey, DerivationError> {
    if master.depth != 0 {
        return Err(DerivationError::InvalidPath(format!(
            "expected a master key, got depth {}",
            master.depth
        )));
    }
    DerivationPath::for_purpose(purpose, network.coin_type, account, address_index)?.derive(master)
}
