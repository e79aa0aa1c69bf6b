//! Durable key-value storage for wallet and credential records.
//!
//! The vault only needs a handful of primitives from its backing store, the
//! important one being [`Storage::put_if_absent`], which must be an atomic
//! check-and-set. Two implementations ship with the crate: an in-memory map
//! and a directory of individually encrypted entry files.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use pbkdf2::pbkdf2_hmac;
use serde::{de::DeserializeOwned, Serialize};
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use crate::mnemonic::random_bytes;

const PBKDF2_ROUNDS: u32 = 10_000;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const SALT_FILE: &str = "storage.salt";
const ENTRY_EXT: &str = "entry";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encrypt data")]
    Encryption,

    #[error("Failed to decrypt data")]
    Decryption,

    #[error("Invalid storage format")]
    InvalidFormat,

    #[error("Failed to encode entry '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("Entry '{0}' already exists")]
    KeyExists(String),
}

/// Backing store for vault records.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Writes `value` only if `key` is vacant. Returns whether it wrote.
    fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StorageError>;

    /// Removes `key`. Returns whether an entry was removed, so that of several
    /// concurrent deleters exactly one observes `true`.
    fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Keys starting with `prefix`, sorted, with the prefix left in place.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

pub fn get_json<T: DeserializeOwned>(
    storage: &dyn Storage,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match storage.get(key)? {
        Some(raw) => {
            let raw = Zeroizing::new(raw);
            serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|source| StorageError::Serialization {
                    key: key.to_string(),
                    source,
                })
        }
        None => Ok(None),
    }
}

pub fn put_json<T: Serialize>(
    storage: &dyn Storage,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = to_json(key, value)?;
    storage.put(key, &raw)
}

pub fn put_json_if_absent<T: Serialize>(
    storage: &dyn Storage,
    key: &str,
    value: &T,
) -> Result<bool, StorageError> {
    let raw = to_json(key, value)?;
    storage.put_if_absent(key, &raw)
}

fn to_json<T: Serialize>(key: &str, value: &T) -> Result<Zeroizing<Vec<u8>>, StorageError> {
    serde_json::to_vec(value)
        .map(Zeroizing::new)
        .map_err(|source| StorageError::Serialization {
            key: key.to_string(),
            source,
        })
}

/// Process-local store. Contents are lost on drop.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, Zeroizing<Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).map(|value| value.to_vec()))
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), Zeroizing::new(value.to_vec()));
        Ok(())
    }

    fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), Zeroizing::new(value.to_vec()));
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::Poisoned)?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}

/// Directory-backed store. Every entry is sealed with AES-256-GCM under a key
/// stretched from the passphrase with PBKDF2-HMAC-SHA256.
///
/// Mutations are serialized inside the process; sharing one directory between
/// processes is not supported.
pub struct FileStorage {
    storage_dir: PathBuf,
    cipher: Aes256Gcm,
    write_lock: Mutex<()>,
}

impl FileStorage {
    pub fn open<P: AsRef<Path>>(storage_dir: P, passphrase: &str) -> Result<Self, StorageError> {
        let path = storage_dir.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let salt = Self::load_or_create_salt(&path)?;

        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), &salt, PBKDF2_ROUNDS, &mut key);
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| StorageError::Encryption);
        key.zeroize();

        Ok(FileStorage {
            storage_dir: path,
            cipher: cipher?,
            write_lock: Mutex::new(()),
        })
    }

    fn load_or_create_salt(dir: &Path) -> Result<[u8; SALT_LEN], StorageError> {
        let salt_path = dir.join(SALT_FILE);
        if salt_path.exists() {
            let data = fs::read(&salt_path)?;
            let salt: [u8; SALT_LEN] =
                data.try_into().map_err(|_| StorageError::InvalidFormat)?;
            return Ok(salt);
        }

        let salt = random_bytes::<SALT_LEN>().map_err(|_| StorageError::Encryption)?;
        let mut file = OpenOptions::new().write(true).create_new(true).open(&salt_path)?;
        file.write_all(&salt)?;
        file.sync_all()?;
        Ok(salt)
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, StorageError> {
        let nonce_bytes = random_bytes::<NONCE_LEN>().map_err(|_| StorageError::Encryption)?;
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| StorageError::Encryption)?;

        // Format for storage: nonce + ciphertext
        let mut data = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        data.extend_from_slice(&nonce_bytes);
        data.extend_from_slice(&ciphertext);
        Ok(data)
    }

    fn open_sealed(&self, data: &[u8]) -> Result<Vec<u8>, StorageError> {
        if data.len() < NONCE_LEN {
            return Err(StorageError::InvalidFormat);
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| StorageError::Decryption)
    }

    fn write_entry(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let sealed = self.seal(value)?;
        let final_path = self.get_file_path(key);
        let tmp_path = final_path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&sealed)?;
            file.sync_all()?;
        }
        fs::rename(tmp_path, final_path)?;
        Ok(())
    }

    fn get_file_path(&self, key: &str) -> PathBuf {
        self.storage_dir
            .join(format!("{}.{}", hex::encode(key.as_bytes()), ENTRY_EXT))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let file_path = self.get_file_path(key);
        let mut file = match File::open(file_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        self.open_sealed(&data).map(Some)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Poisoned)?;
        self.write_entry(key, value)
    }

    fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Poisoned)?;
        if self.get_file_path(key).exists() {
            return Ok(false);
        }
        self.write_entry(key, value)?;
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Poisoned)?;
        match fs::remove_file(self.get_file_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        for dir_entry in fs::read_dir(&self.storage_dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            let key = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| hex::decode(stem).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .ok_or(StorageError::InvalidFormat)?;
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
