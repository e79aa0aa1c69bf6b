//! Ephemeral bearer tokens gating address derivation.
//!
//! Each token is backed by a lease from the [`LeaseManager`]. A token stays
//! valid while its lease is live and its record exists; after that every
//! presentation fails with `InvalidTokenError`, the same error an unknown token
//! gets, so callers cannot tell the two apart.
//!
//! [`LeaseManager`]: crate::lease::LeaseManager

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::backend::Context;
use crate::derivation::Purpose;
use crate::error::{VaultError, VaultResult};
use crate::lease::Lease;
use crate::mnemonic::random_bytes;
use crate::storage::{get_json, put_json_if_absent, StorageError};
use crate::wallet::WalletStore;

pub(crate) const CREDS_PREFIX: &str = "creds/";

const TOKEN_BYTES: usize = 32;

/// What happens to a token after it authorizes an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPolicy {
    /// The first successful use revokes the lease and deletes the credential.
    ///
    /// The token is spent once it passes validation, before the operation it
    /// gates runs. If that operation then fails, the caller needs a new token.
    #[default]
    SingleUse,
    /// The token keeps working until its lease expires or is revoked.
    ReusableUntilExpiry,
}

#[derive(Serialize, Deserialize)]
struct CredentialEntry {
    wallet_name: String,
    lease_id: String,
    token: String,
}

impl Drop for CredentialEntry {
    fn drop(&mut self) {
        self.token.zeroize();
    }
}

/// A freshly minted token and the lease backing it.
pub struct IssuedCredential {
    pub token: Zeroizing<String>,
    pub lease: Lease,
}

pub struct CredentialAuthority {
    policy: TokenPolicy,
}

impl CredentialAuthority {
    pub fn new(policy: TokenPolicy) -> Self {
        CredentialAuthority { policy }
    }

    pub fn policy(&self) -> TokenPolicy {
        self.policy
    }

    /// Mints a token for `wallet_name`, which must exist with `purpose`.
    ///
    /// Credentials whose leases have lapsed are swept first.
    pub fn issue(
        &self,
        ctx: &Context,
        wallets: &WalletStore,
        wallet_name: &str,
        purpose: Purpose,
    ) -> VaultResult<IssuedCredential> {
        match wallets.find(ctx, wallet_name)? {
            Some(wallet) if wallet.purpose == purpose => {}
            _ => return Err(VaultError::WalletNotFound(purpose)),
        }

        self.sweep(ctx)?;

        let token = Zeroizing::new(hex::encode(random_bytes::<TOKEN_BYTES>()?));
        let lease = ctx.leases.issue()?;
        let key = credential_key(&lease.id);

        let entry = CredentialEntry {
            wallet_name: wallet_name.to_string(),
            lease_id: lease.id.clone(),
            token: token.to_string(),
        };

        match put_json_if_absent(ctx.storage.as_ref(), &key, &entry) {
            Ok(true) => {}
            // The lease id already backs a stored credential, so the lease stays
            Ok(false) => {
                warn!(lease_id = %lease.id, "lease id collides with a stored credential");
                return Err(StorageError::KeyExists(key).into());
            }
            Err(e) => {
                ctx.leases.revoke(&lease.id)?;
                return Err(e.into());
            }
        }

        info!(wallet = wallet_name, lease_id = %lease.id, "credential issued");
        Ok(IssuedCredential { token, lease })
    }

    /// Deletes every credential whose lease is no longer live, then lets the
    /// lease manager forget expired leases. Returns how many credentials were
    /// removed.
    pub fn sweep(&self, ctx: &Context) -> VaultResult<usize> {
        let mut removed = 0;
        for key in ctx.storage.list(CREDS_PREFIX)? {
            let entry: CredentialEntry = match get_json(ctx.storage.as_ref(), &key)? {
                Some(entry) => entry,
                None => continue,
            };
            if !ctx.leases.is_live(&entry.lease_id)? && ctx.storage.delete(&key)? {
                removed += 1;
            }
        }
        let leases = ctx.leases.tidy()?;

        if removed > 0 || leases > 0 {
            debug!(credentials = removed, leases, "swept lapsed credentials");
        }
        Ok(removed)
    }

    /// Resolves a token to the wallet it was issued for, applying the token
    /// policy.
    pub fn validate(&self, ctx: &Context, token: &str) -> VaultResult<String> {
        self.check(ctx, token, None)
    }

    /// Like [`validate`](Self::validate), but the token must belong to
    /// `wallet_name`. A token for another wallet is rejected without being
    /// consumed.
    pub fn authorize(&self, ctx: &Context, token: &str, wallet_name: &str) -> VaultResult<()> {
        self.check(ctx, token, Some(wallet_name)).map(|_| ())
    }

    /// Revokes the lease and removes its credential. Returns whether a
    /// credential record existed.
    pub fn revoke(&self, ctx: &Context, lease_id: &str) -> VaultResult<bool> {
        ctx.leases.revoke(lease_id)?;
        let removed = ctx.storage.delete(&credential_key(lease_id))?;
        info!(lease_id, removed, "credential revoked");
        Ok(removed)
    }

    fn check(
        &self,
        ctx: &Context,
        token: &str,
        expected_wallet: Option<&str>,
    ) -> VaultResult<String> {
        if token.is_empty() {
            return Err(VaultError::MissingToken);
        }

        let (key, entry) = match find_by_token(ctx, token)? {
            Some(found) => found,
            None => {
                debug!("no credential matches presented token");
                return Err(VaultError::InvalidToken);
            }
        };

        if !ctx.leases.is_live(&entry.lease_id)? {
            ctx.storage.delete(&key)?;
            debug!(lease_id = %entry.lease_id, "credential lease no longer live");
            return Err(VaultError::InvalidToken);
        }

        if let Some(expected) = expected_wallet {
            if entry.wallet_name != expected {
                warn!(
                    lease_id = %entry.lease_id,
                    wallet = expected,
                    "token presented for a different wallet"
                );
                return Err(VaultError::InvalidToken);
            }
        }

        if self.policy == TokenPolicy::SingleUse {
            // Of several concurrent presentations only the one that deletes wins
            if !ctx.storage.delete(&key)? {
                return Err(VaultError::InvalidToken);
            }
            ctx.leases.revoke(&entry.lease_id)?;
            debug!(lease_id = %entry.lease_id, "single-use credential consumed");
        }

        Ok(entry.wallet_name.clone())
    }
}

fn find_by_token(ctx: &Context, token: &str) -> VaultResult<Option<(String, CredentialEntry)>> {
    for key in ctx.storage.list(CREDS_PREFIX)? {
        // A concurrent consumer may have removed the record since listing
        let entry: CredentialEntry = match get_json(ctx.storage.as_ref(), &key)? {
            Some(entry) => entry,
            None => continue,
        };
        if bool::from(entry.token.as_bytes().ct_eq(token.as_bytes())) {
            return Ok(Some((key, entry)));
        }
    }
    Ok(None)
}

fn credential_key(lease_id: &str) -> String {
    format!("{}{}", CREDS_PREFIX, lease_id)
}
