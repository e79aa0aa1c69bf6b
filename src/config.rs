//! Vault configuration, loaded from TOML with environment overrides.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::credential::TokenPolicy;
use crate::derivation::HARDENED_BIT;
use crate::mnemonic::MnemonicStrength;
use crate::storage::{FileStorage, MemoryStorage, Storage};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub wallet: WalletConfig,
    pub token: TokenConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Wallet creation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Mnemonic length in words
    pub mnemonic_words: MnemonicStrength,
    /// Account index new wallets derive receive addresses under
    pub account: u32,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            mnemonic_words: MnemonicStrength::Words24,
            account: 0,
        }
    }
}

/// Credential settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub policy: TokenPolicy,
    pub ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            policy: TokenPolicy::SingleUse,
            ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    File,
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: Option<PathBuf>,
    /// Environment variable holding the file store passphrase
    pub passphrase_env: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: None,
            passphrase_env: "BTC_VAULT_PASSPHRASE".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn open(&self) -> Result<Arc<dyn Storage>> {
        match self.backend {
            StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
            StorageBackend::File => {
                let path = self
                    .path
                    .as_ref()
                    .context("storage.path is required for the file backend")?;
                let passphrase = std::env::var(&self.passphrase_env)
                    .with_context(|| format!("{} is not set", self.passphrase_env))?;
                if passphrase.is_empty() {
                    bail!("{} is empty", self.passphrase_env);
                }
                let storage = FileStorage::open(path, &passphrase)
                    .with_context(|| format!("failed to open storage at {}", path.display()))?;
                Ok(Arc::new(storage))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl VaultConfig {
    /// Reads a TOML file, then applies `BTC_VAULT_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config = Self::from_toml_str(&raw)
            .with_context(|| format!("invalid config {}", path.display()))?;
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: VaultConfig = toml::from_str(raw).context("failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("BTC_VAULT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("BTC_VAULT_LOG_FORMAT") {
            self.logging.format = match format.as_str() {
                "text" => LogFormat::Text,
                "json" => LogFormat::Json,
                other => bail!("BTC_VAULT_LOG_FORMAT: unknown format '{other}'"),
            };
        }
        if let Some(policy) = lookup("BTC_VAULT_TOKEN_POLICY") {
            self.token.policy = match policy.as_str() {
                "single_use" => TokenPolicy::SingleUse,
                "reusable_until_expiry" => TokenPolicy::ReusableUntilExpiry,
                other => bail!("BTC_VAULT_TOKEN_POLICY: unknown policy '{other}'"),
            };
        }
        if let Some(ttl) = lookup("BTC_VAULT_TOKEN_TTL_SECS") {
            self.token.ttl_secs = ttl
                .parse()
                .with_context(|| format!("BTC_VAULT_TOKEN_TTL_SECS: '{ttl}' is not a number"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.wallet.account >= HARDENED_BIT {
            bail!("wallet.account must be below {HARDENED_BIT}");
        }
        if i64::try_from(self.token.ttl_secs).is_err() {
            bail!("token.ttl_secs is out of range");
        }
        if self.storage.backend == StorageBackend::File && self.storage.path.is_none() {
            bail!("storage.path is required for the file backend");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_config_uses_defaults() {
        let config = VaultConfig::from_toml_str("").unwrap();
        assert_eq!(config.wallet.mnemonic_words, MnemonicStrength::Words24);
        assert_eq!(config.wallet.account, 0);
        assert_eq!(config.token.policy, TokenPolicy::SingleUse);
        assert_eq!(config.token.ttl_secs, 3600);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn parses_full_config() {
        let config = VaultConfig::from_toml_str(
            r#"
            [wallet]
            mnemonic_words = 12
            account = 3

            [token]
            policy = "reusable_until_expiry"
            ttl_secs = 60

            [storage]
            backend = "file"
            path = "/var/lib/btc-vault"

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.wallet.mnemonic_words, MnemonicStrength::Words12);
        assert_eq!(config.wallet.account, 3);
        assert_eq!(config.token.policy, TokenPolicy::ReusableUntilExpiry);
        assert_eq!(config.storage.path.as_deref(), Some(Path::new("/var/lib/btc-vault")));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(VaultConfig::from_toml_str("[wallet]\nmnemonic_words = 13").is_err());
        assert!(VaultConfig::from_toml_str("[token]\npolicy = \"forever\"").is_err());
        assert!(VaultConfig::from_toml_str("[wallet]\naccount = 2147483648").is_err());
        assert!(VaultConfig::from_toml_str("[storage]\nbackend = \"file\"").is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("BTC_VAULT_LOG_LEVEL", "trace"),
            ("BTC_VAULT_TOKEN_POLICY", "reusable_until_expiry"),
            ("BTC_VAULT_TOKEN_TTL_SECS", "5"),
        ]
        .into_iter()
        .collect();

        let mut config = VaultConfig::default();
        config
            .apply_env_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.token.policy, TokenPolicy::ReusableUntilExpiry);
        assert_eq!(config.token.ttl_secs, 5);

        let bad = |name: &str| (name == "BTC_VAULT_TOKEN_TTL_SECS").then(|| "soon".to_string());
        assert!(VaultConfig::default().apply_env_overrides(bad).is_err());
    }

    #[test]
    fn file_backend_opens_with_passphrase() {
        let dir = tempfile::TempDir::new().unwrap();
        let var = "BTC_VAULT_TEST_PASSPHRASE_OPEN";
        std::env::set_var(var, "hunter2");

        let config = StorageConfig {
            backend: StorageBackend::File,
            path: Some(dir.path().to_path_buf()),
            passphrase_env: var.to_string(),
        };
        let storage = config.open().unwrap();
        storage.put("wallet/a", b"1").unwrap();
        assert_eq!(storage.list("wallet/").unwrap(), vec!["wallet/a"]);

        let missing = StorageConfig {
            passphrase_env: "BTC_VAULT_TEST_PASSPHRASE_UNSET".to_string(),
            ..config
        };
        assert!(missing.open().is_err());
    }
}
