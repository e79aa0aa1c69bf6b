use bip39::Mnemonic;
use rand::rngs::OsRng;
use rand_core::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum MnemonicStrength {
    Words12,
    Words15,
    Words18,
    Words21,
    Words24,
}

impl MnemonicStrength {
    fn to_entropy_bits(self) -> usize {
        match self {
            MnemonicStrength::Words12 => 128,
            MnemonicStrength::Words15 => 160,
            MnemonicStrength::Words18 => 192,
            MnemonicStrength::Words21 => 224,
            MnemonicStrength::Words24 => 256,
        }
    }

    pub fn word_count(self) -> usize {
        self.to_entropy_bits() * 3 / 32
    }
}

impl TryFrom<usize> for MnemonicStrength {
    type Error = MnemonicError;

    fn try_from(words: usize) -> Result<Self, Self::Error> {
        match words {
            12 => Ok(MnemonicStrength::Words12),
            15 => Ok(MnemonicStrength::Words15),
            18 => Ok(MnemonicStrength::Words18),
            21 => Ok(MnemonicStrength::Words21),
            24 => Ok(MnemonicStrength::Words24),
            other => Err(MnemonicError::InvalidWordCount(other)),
        }
    }
}

impl From<MnemonicStrength> for usize {
    fn from(strength: MnemonicStrength) -> Self {
        strength.word_count()
    }
}

impl Default for MnemonicStrength {
    fn default() -> Self {
        MnemonicStrength::Words24
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MnemonicError {
    #[error("Invalid mnemonic phrase")]
    InvalidMnemonic,

    #[error("Failed to generate entropy")]
    EntropyGenerationFailed,

    #[error("Invalid word count: {0}, expected 12, 15, 18, 21 or 24")]
    InvalidWordCount(usize),
}

pub struct SecureMnemonic {
    mnemonic: Mnemonic,
}

impl SecureMnemonic {
    pub fn generate(strength: MnemonicStrength) -> Result<Self, MnemonicError> {
        let entropy = generate_entropy(strength.to_entropy_bits() / 8)?;
        let mnemonic =
            Mnemonic::from_entropy(&entropy).map_err(|_| MnemonicError::EntropyGenerationFailed)?;
        Ok(Self { mnemonic })
    }

    pub fn from_phrase(phrase: &str) -> Result<Self, MnemonicError> {
        Mnemonic::parse_normalized(phrase)
            .map(|mnemonic| Self { mnemonic })
            .map_err(|_| MnemonicError::InvalidMnemonic)
    }

    pub fn phrase(&self) -> Zeroizing<String> {
        Zeroizing::new(self.mnemonic.to_string())
    }

    pub fn to_seed(&self, passphrase: &str) -> Zeroizing<[u8; 64]> {
        Zeroizing::new(self.mnemonic.to_seed(passphrase))
    }
}

pub fn generate_entropy(byte_length: usize) -> Result<Zeroizing<Vec<u8>>, MnemonicError> {
    let mut bytes = Zeroizing::new(vec![0u8; byte_length]);
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|_| MnemonicError::EntropyGenerationFailed)?;
    Ok(bytes)
}

/// Fills a fresh buffer from the OS RNG. Used for tokens and nonces.
pub(crate) fn random_bytes<const N: usize>() -> Result<[u8; N], MnemonicError> {
    let mut bytes = [0u8; N];
    if OsRng.try_fill_bytes(&mut bytes).is_err() {
        bytes.zeroize();
        return Err(MnemonicError::EntropyGenerationFailed);
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_requested_word_count() {
        for words in [12usize, 15, 18, 21, 24] {
            let strength = MnemonicStrength::try_from(words).unwrap();
            let mnemonic = SecureMnemonic::generate(strength).unwrap();
            assert_eq!(mnemonic.phrase().split_whitespace().count(), words);
        }
    }

    #[test]
    fn generated_phrases_differ() {
        let a = SecureMnemonic::generate(MnemonicStrength::Words12).unwrap();
        let b = SecureMnemonic::generate(MnemonicStrength::Words12).unwrap();
        assert_ne!(*a.phrase(), *b.phrase());
    }

    #[test]
    fn phrase_round_trips_to_same_seed() {
        let generated = SecureMnemonic::generate(MnemonicStrength::Words24).unwrap();
        let parsed = SecureMnemonic::from_phrase(&generated.phrase()).unwrap();
        assert_eq!(*generated.to_seed(""), *parsed.to_seed(""));
    }

    #[test]
    fn rejects_bad_phrases_and_counts() {
        assert!(matches!(
            SecureMnemonic::from_phrase("abandon abandon"),
            Err(MnemonicError::InvalidMnemonic)
        ));
        assert_eq!(
            MnemonicStrength::try_from(13).unwrap_err(),
            MnemonicError::InvalidWordCount(13)
        );
    }
}
