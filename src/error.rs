use thiserror::Error;

use crate::derivation::{DerivationError, Purpose};
use crate::keys::AddressError;
use crate::lease::LeaseError;
use crate::mnemonic::MnemonicError;
use crate::storage::StorageError;

pub type VaultResult<T> = std::result::Result<T, VaultError>;

/// Every failure a vault operation can surface.
///
/// The `Display` rendering of the caller-facing variants is a compatibility
/// contract: clients match on these strings byte-for-byte.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("MissingNetworkError")]
    MissingNetwork,

    #[error("InvalidNetworkError")]
    InvalidNetwork,

    #[error("WalletAlreadyExistsError")]
    WalletAlreadyExists,

    #[error("MissingWalletNameError")]
    MissingWalletName,

    #[error("MissingTokenError")]
    MissingToken,

    #[error("InvalidTokenError")]
    InvalidToken,

    #[error("{}WalletNotFoundError", .0.error_prefix())]
    WalletNotFound(Purpose),

    #[error("UnsupportedPathError")]
    UnsupportedPath(String),

    #[error("InvalidRequestError: {0}")]
    InvalidRequest(String),

    #[error("Derivation error: {0}")]
    Derivation(#[from] DerivationError),

    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    #[error("Mnemonic error: {0}")]
    Mnemonic(#[from] MnemonicError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Lease error: {0}")]
    Lease(#[from] LeaseError),
}

/// Coarse classification used by callers that branch on error class rather
/// than on the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Derivation,
    Internal,
}

impl VaultError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::MissingNetwork
            | VaultError::InvalidNetwork
            | VaultError::MissingWalletName
            | VaultError::MissingToken
            | VaultError::InvalidToken
            | VaultError::UnsupportedPath(_)
            | VaultError::InvalidRequest(_) => ErrorKind::Validation,
            VaultError::WalletAlreadyExists => ErrorKind::Conflict,
            VaultError::WalletNotFound(_) => ErrorKind::NotFound,
            VaultError::Derivation(_) | VaultError::Address(_) | VaultError::Mnemonic(_) => {
                ErrorKind::Derivation
            }
            VaultError::Storage(_) | VaultError::Lease(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_strings_are_stable() {
        assert_eq!(VaultError::MissingNetwork.to_string(), "MissingNetworkError");
        assert_eq!(VaultError::InvalidNetwork.to_string(), "InvalidNetworkError");
        assert_eq!(VaultError::WalletAlreadyExists.to_string(), "WalletAlreadyExistsError");
        assert_eq!(VaultError::MissingWalletName.to_string(), "MissingWalletNameError");
        assert_eq!(VaultError::MissingToken.to_string(), "MissingTokenError");
        assert_eq!(VaultError::InvalidToken.to_string(), "InvalidTokenError");
        assert_eq!(
            VaultError::WalletNotFound(Purpose::Standard).to_string(),
            "WalletNotFoundError"
        );
        assert_eq!(
            VaultError::WalletNotFound(Purpose::SegWitCompatible).to_string(),
            "SegWitWalletNotFoundError"
        );
    }

    #[test]
    fn kinds() {
        assert_eq!(VaultError::WalletAlreadyExists.kind(), ErrorKind::Conflict);
        assert_eq!(
            VaultError::WalletNotFound(Purpose::Standard).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(VaultError::InvalidToken.kind(), ErrorKind::Validation);
        assert_eq!(
            VaultError::Derivation(DerivationError::EmptySeed).kind(),
            ErrorKind::Derivation
        );
    }
}
