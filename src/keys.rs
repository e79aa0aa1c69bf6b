use bitcoin_hashes::{hash160, Hash};
use secp256k1::PublicKey;
use thiserror::Error;

use crate::derivation::Purpose;
use crate::network::{Network, NetworkParams};

/// Output script an address commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    P2PKH,      // Legacy: 1... / m... n...
    P2shP2wpkh, // SegWit-compatible: 3... / 2...
}

impl From<Purpose> for ScriptType {
    fn from(purpose: Purpose) -> Self {
        match purpose {
            Purpose::Standard => ScriptType::P2PKH,
            Purpose::SegWitCompatible => ScriptType::P2shP2wpkh,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid base58check encoding")]
    InvalidEncoding,

    #[error("Invalid payload length: {0}")]
    InvalidLength(usize),

    #[error("Unknown version byte: {0:#04x}")]
    UnknownVersion(u8),
}

/// A decoded base58check address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAddress {
    pub network: Network,
    pub script_type: ScriptType,
    pub hash: [u8; 20],
}

/// Renders the address for `public_key` on `network`.
pub fn render(public_key: &PublicKey, network: &NetworkParams, script_type: ScriptType) -> String {
    let pubkey_hash = hash160::Hash::hash(&public_key.serialize());

    match script_type {
        ScriptType::P2PKH => encode(network.pubkey_hash_version, &pubkey_hash),
        ScriptType::P2shP2wpkh => {
            // Redeem script: OP_0 PUSH(20) <pubkey_hash>
            let mut redeem_script = Vec::with_capacity(22);
            redeem_script.push(0x00);
            redeem_script.push(0x14);
            redeem_script.extend_from_slice(<hash160::Hash as AsRef<[u8]>>::as_ref(&pubkey_hash));

            let script_hash = hash160::Hash::hash(&redeem_script);
            encode(network.script_hash_version, &script_hash)
        }
    }
}

fn encode(version: u8, hash: &hash160::Hash) -> String {
    let mut address_bytes = Vec::with_capacity(21);
    address_bytes.push(version);
    address_bytes.extend_from_slice(<hash160::Hash as AsRef<[u8]>>::as_ref(hash));
    bs58::encode(&address_bytes).with_check().into_string()
}

/// Decodes an address produced by [`render`], recovering its network and type.
pub fn decode(address: &str) -> Result<DecodedAddress, AddressError> {
    let bytes = bs58::decode(address)
        .with_check(None)
        .into_vec()
        .map_err(|_| AddressError::InvalidEncoding)?;
    if bytes.len() != 21 {
        return Err(AddressError::InvalidLength(bytes.len()));
    }

    let version = bytes[0];
    let (network, script_type) = [Network::Mainnet, Network::Testnet]
        .into_iter()
        .find_map(|network| {
            let params = network.params();
            if version == params.pubkey_hash_version {
                Some((network, ScriptType::P2PKH))
            } else if version == params.script_hash_version {
                Some((network, ScriptType::P2shP2wpkh))
            } else {
                None
            }
        })
        .ok_or(AddressError::UnknownVersion(version))?;

    let mut hash = [0u8; 20];
    hash.copy_from_slice(&bytes[1..]);
    Ok(DecodedAddress {
        network,
        script_type,
        hash,
    })
}
