//! HD wallet custody gated by short-lived, revocable tokens.
//!
//! Wallets are BIP39 seeds held in a [`Storage`] backend. Receive addresses
//! are derived on BIP44 (P2PKH) or BIP49 (P2SH-P2WPKH) paths, and every
//! derivation must present a token minted by the [`CredentialAuthority`] and
//! backed by a live lease.
//!
//! ```ignore
//! use btc_vault::{Backend, Operation, Request, VaultConfig};
//!
//! let backend = Backend::from_config(&VaultConfig::default())?;
//! backend.handle_request(
//!     &Request::new(Operation::Update, "wallet/hot").with("network", "testnet"),
//! )?;
//! let creds = backend.handle_request(&Request::new(Operation::Read, "creds/hot"))?;
//! let token = creds.get_str("token").unwrap_or_default();
//! let address = backend.handle_request(
//!     &Request::new(Operation::Update, "address/hot").with("token", token),
//! )?;
//! ```

pub mod backend;
pub mod config;
pub mod credential;
pub mod derivation;
pub mod error;
pub mod keys;
pub mod lease;
pub mod logging;
pub mod mnemonic;
pub mod network;
pub mod storage;
pub mod wallet;

pub use backend::{Backend, Context, LeaseInfo, Operation, Request, Response};
pub use config::VaultConfig;
pub use credential::{CredentialAuthority, IssuedCredential, TokenPolicy};
pub use derivation::{DerivationError, DerivationPath, ExtendedKey, Purpose};
pub use error::{ErrorKind, VaultError, VaultResult};
pub use keys::{AddressError, ScriptType};
pub use lease::{Lease, LeaseError, LeaseManager, MemoryLeaseManager};
pub use mnemonic::{MnemonicError, MnemonicStrength, SecureMnemonic};
pub use network::{Network, NetworkParams};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError};
pub use wallet::{CreatedWallet, IssuedAddress, Wallet, WalletStore};
