//! Request dispatch.
//!
//! A host hands the [`Backend`] plain [`Request`] values; the backend routes
//! them to the wallet store or the credential authority, passing along an
//! explicit [`Context`] that carries the storage and lease collaborators.
//!
//! | Operation | Path | Data in | Data out |
//! |-----------|------|---------|----------|
//! | update | `wallet/<name>` | `network`, `segwit` | `mnemonic` |
//! | read | `wallet/<name>` | | wallet metadata |
//! | list | `wallet/` | | `keys` |
//! | read | `creds/<name>` | | `token` + lease |
//! | read | `segwit/creds/<name>` | | `token` + lease |
//! | update | `address/<name>` | `token` | `address` |
//! | revoke | `lease/<lease_id>` | | `revoked` |
//! | tidy | `lease/` | | `removed` |

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::config::VaultConfig;
use crate::credential::{CredentialAuthority, IssuedCredential};
use crate::derivation::Purpose;
use crate::error::{VaultError, VaultResult};
use crate::lease::{Lease, LeaseManager, MemoryLeaseManager};
use crate::storage::Storage;
use crate::wallet::WalletStore;

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w(?:[\w.-]*\w)?$").expect("static regex"));

/// Collaborators every operation runs against.
#[derive(Clone)]
pub struct Context {
    pub storage: Arc<dyn Storage>,
    pub leases: Arc<dyn LeaseManager>,
}

impl Context {
    pub fn new(storage: Arc<dyn Storage>, leases: Arc<dyn LeaseManager>) -> Self {
        Context { storage, leases }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Update,
    List,
    Revoke,
    Tidy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub operation: Operation,
    pub path: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Request {
    pub fn new(operation: Operation, path: impl Into<String>) -> Self {
        Request {
            operation,
            path: path.into(),
            data: Map::new(),
        }
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.data.insert(field.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaseInfo {
    pub lease_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<&Lease> for LeaseInfo {
    fn from(lease: &Lease) -> Self {
        LeaseInfo {
            lease_id: lease.id.clone(),
            issued_at: lease.issued_at,
            expires_at: lease.expires_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Response {
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lease: Option<LeaseInfo>,
}

impl Response {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Object(data) => Response { data, lease: None },
            other => {
                let mut data = Map::new();
                data.insert("value".to_string(), other);
                Response { data, lease: None }
            }
        }
    }

    /// String field of the response data, if present.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Route<'a> {
    CreateWallet(&'a str),
    ReadWallet(&'a str),
    ListWallets,
    IssueCredential(&'a str, Purpose),
    NextAddress(&'a str),
    RevokeLease(&'a str),
    TidyLeases,
}

fn route(operation: Operation, path: &str) -> VaultResult<Route<'_>> {
    let unsupported = || VaultError::UnsupportedPath(path.to_string());

    if let Some(name) = path.strip_prefix("segwit/creds/") {
        return match operation {
            Operation::Read => Ok(Route::IssueCredential(
                wallet_name(name, path)?,
                Purpose::SegWitCompatible,
            )),
            _ => Err(unsupported()),
        };
    }
    if let Some(name) = path.strip_prefix("creds/") {
        return match operation {
            Operation::Read => {
                Ok(Route::IssueCredential(wallet_name(name, path)?, Purpose::Standard))
            }
            _ => Err(unsupported()),
        };
    }
    if let Some(name) = path.strip_prefix("wallet/") {
        return match operation {
            Operation::List if name.is_empty() => Ok(Route::ListWallets),
            Operation::Update => Ok(Route::CreateWallet(wallet_name(name, path)?)),
            Operation::Read => Ok(Route::ReadWallet(wallet_name(name, path)?)),
            _ => Err(unsupported()),
        };
    }
    if let Some(name) = path.strip_prefix("address/") {
        return match operation {
            Operation::Update => Ok(Route::NextAddress(wallet_name(name, path)?)),
            _ => Err(unsupported()),
        };
    }
    if let Some(lease_id) = path.strip_prefix("lease/") {
        return match operation {
            Operation::Revoke if !lease_id.is_empty() => Ok(Route::RevokeLease(lease_id)),
            Operation::Tidy if lease_id.is_empty() => Ok(Route::TidyLeases),
            _ => Err(unsupported()),
        };
    }
    Err(unsupported())
}

fn wallet_name<'a>(name: &'a str, path: &str) -> VaultResult<&'a str> {
    if name.is_empty() {
        return Err(VaultError::MissingWalletName);
    }
    if !NAME_RE.is_match(name) {
        return Err(VaultError::UnsupportedPath(path.to_string()));
    }
    Ok(name)
}

fn string_field<'a>(data: &'a Map<String, Value>, field: &str) -> VaultResult<&'a str> {
    match data.get(field) {
        None | Some(Value::Null) => Ok(""),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(VaultError::InvalidRequest(format!("{field} must be a string"))),
    }
}

fn bool_field(data: &Map<String, Value>, field: &str) -> VaultResult<bool> {
    match data.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(VaultError::InvalidRequest(format!("{field} must be a boolean"))),
    }
}

pub struct Backend {
    ctx: Context,
    wallets: WalletStore,
    credentials: CredentialAuthority,
}

impl Backend {
    pub fn new(
        storage: Arc<dyn Storage>,
        leases: Arc<dyn LeaseManager>,
        config: &VaultConfig,
    ) -> Self {
        Backend {
            ctx: Context::new(storage, leases),
            wallets: WalletStore::new(config.wallet.mnemonic_words, config.wallet.account),
            credentials: CredentialAuthority::new(config.token.policy),
        }
    }

    /// Opens the configured storage and an in-memory lease manager.
    pub fn from_config(config: &VaultConfig) -> anyhow::Result<Self> {
        let storage = config.storage.open()?;
        let leases = Arc::new(MemoryLeaseManager::new(config.token.ttl_secs)?);
        Ok(Backend::new(storage, leases, config))
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn wallets(&self) -> &WalletStore {
        &self.wallets
    }

    pub fn credentials(&self) -> &CredentialAuthority {
        &self.credentials
    }

    pub fn handle_request(&self, req: &Request) -> VaultResult<Response> {
        debug!(operation = ?req.operation, path = %req.path, "handling request");

        let result = self.dispatch(req);
        if let Err(e) = &result {
            debug!(path = %req.path, error = %e, "request failed");
        }
        result
    }

    fn dispatch(&self, req: &Request) -> VaultResult<Response> {
        match route(req.operation, &req.path)? {
            Route::CreateWallet(name) => {
                let network = string_field(&req.data, "network")?;
                let purpose = Purpose::from_segwit_flag(bool_field(&req.data, "segwit")?);
                let created = self.wallets.create(&self.ctx, name, network, purpose)?;
                Ok(Response::from_value(json!({ "mnemonic": created.mnemonic.as_str() })))
            }
            Route::ReadWallet(name) => {
                let wallet = self.wallets.get(&self.ctx, name)?;
                Ok(Response::from_value(json!(wallet)))
            }
            Route::ListWallets => {
                let keys = self.wallets.list(&self.ctx)?;
                Ok(Response::from_value(json!({ "keys": keys })))
            }
            Route::IssueCredential(name, purpose) => {
                let IssuedCredential { token, lease } =
                    self.credentials.issue(&self.ctx, &self.wallets, name, purpose)?;
                let mut response = Response::from_value(json!({ "token": token.as_str() }));
                response.lease = Some(LeaseInfo::from(&lease));
                Ok(response)
            }
            Route::NextAddress(name) => {
                let token = string_field(&req.data, "token")?;
                self.credentials.authorize(&self.ctx, token, name)?;
                let issued = self.wallets.next_address(&self.ctx, name)?;
                Ok(Response::from_value(json!({ "address": issued.address })))
            }
            Route::RevokeLease(lease_id) => {
                let revoked = self.credentials.revoke(&self.ctx, lease_id)?;
                Ok(Response::from_value(json!({ "revoked": revoked })))
            }
            Route::TidyLeases => {
                let removed = self.credentials.sweep(&self.ctx)?;
                Ok(Response::from_value(json!({ "removed": removed })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_known_paths() {
        assert_eq!(route(Operation::Update, "wallet/a").unwrap(), Route::CreateWallet("a"));
        assert_eq!(route(Operation::Read, "wallet/a").unwrap(), Route::ReadWallet("a"));
        assert_eq!(route(Operation::List, "wallet/").unwrap(), Route::ListWallets);
        assert_eq!(
            route(Operation::Read, "creds/a").unwrap(),
            Route::IssueCredential("a", Purpose::Standard)
        );
        assert_eq!(
            route(Operation::Read, "segwit/creds/a.b-c").unwrap(),
            Route::IssueCredential("a.b-c", Purpose::SegWitCompatible)
        );
        assert_eq!(route(Operation::Update, "address/a").unwrap(), Route::NextAddress("a"));
        assert_eq!(route(Operation::Revoke, "lease/xyz").unwrap(), Route::RevokeLease("xyz"));
        assert_eq!(route(Operation::Tidy, "lease/").unwrap(), Route::TidyLeases);
    }

    #[test]
    fn rejects_bad_paths() {
        assert!(matches!(route(Operation::Read, "creds/"), Err(VaultError::MissingWalletName)));
        assert!(matches!(route(Operation::Update, "wallet/"), Err(VaultError::MissingWalletName)));
        assert!(matches!(
            route(Operation::Update, "wallet/a/b"),
            Err(VaultError::UnsupportedPath(_))
        ));
        assert!(matches!(
            route(Operation::Update, "wallet/-a"),
            Err(VaultError::UnsupportedPath(_))
        ));
        assert!(matches!(route(Operation::Read, "address/a"), Err(VaultError::UnsupportedPath(_))));
        assert!(matches!(route(Operation::Read, "nothing/a"), Err(VaultError::UnsupportedPath(_))));
        assert!(matches!(route(Operation::Revoke, "lease/"), Err(VaultError::UnsupportedPath(_))));
        assert!(matches!(route(Operation::Tidy, "lease/x"), Err(VaultError::UnsupportedPath(_))));
    }

    #[test]
    fn field_types_are_checked() {
        let mut data = Map::new();
        data.insert("segwit".into(), json!("yes"));
        data.insert("network".into(), json!(3));
        assert!(matches!(bool_field(&data, "segwit"), Err(VaultError::InvalidRequest(_))));
        assert!(matches!(string_field(&data, "network"), Err(VaultError::InvalidRequest(_))));
        assert_eq!(string_field(&data, "token").unwrap(), "");
        assert!(!bool_field(&data, "absent").unwrap());
    }

    #[test]
    fn request_deserializes_from_json() {
        let req: Request = serde_json::from_str(
            r#"{"operation":"update","path":"wallet/w","data":{"network":"testnet","segwit":true}}"#,
        )
        .unwrap();
        assert_eq!(req.operation, Operation::Update);
        assert_eq!(req.data["segwit"], json!(true));

        let req: Request =
            serde_json::from_str(r#"{"operation":"list","path":"wallet/"}"#).unwrap();
        assert!(req.data.is_empty());
    }
}
