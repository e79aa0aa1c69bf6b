use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LeaseError {
    #[error("Lease table lock poisoned")]
    Poisoned,

    #[error("Lease TTL of {0} seconds is out of range")]
    InvalidTtl(u64),
}

/// A time-bounded grant backing one credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Lease subsystem consulted on every validation. Implementations must not
/// cache liveness across calls.
pub trait LeaseManager: Send + Sync {
    fn issue(&self) -> Result<Lease, LeaseError>;

    fn is_live(&self, lease_id: &str) -> Result<bool, LeaseError>;

    /// Revoking an unknown or already revoked lease is not an error.
    fn revoke(&self, lease_id: &str) -> Result<(), LeaseError>;

    /// Forgets leases that are past expiry. Returns how many were dropped.
    fn tidy(&self) -> Result<usize, LeaseError>;
}

/// Fixed-TTL leases held in process memory.
pub struct MemoryLeaseManager {
    ttl: Duration,
    leases: Mutex<HashMap<String, Lease>>,
}

impl MemoryLeaseManager {
    pub fn new(ttl_secs: u64) -> Result<Self, LeaseError> {
        let secs = i64::try_from(ttl_secs).map_err(|_| LeaseError::InvalidTtl(ttl_secs))?;
        let ttl = Duration::try_seconds(secs).ok_or(LeaseError::InvalidTtl(ttl_secs))?;
        Ok(Self {
            ttl,
            leases: Mutex::new(HashMap::new()),
        })
    }
}

impl LeaseManager for MemoryLeaseManager {
    fn issue(&self) -> Result<Lease, LeaseError> {
        let issued_at = Utc::now();
        let lease = Lease {
            id: Uuid::new_v4().to_string(),
            issued_at,
            expires_at: issued_at
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        let mut leases = self.leases.lock().map_err(|_| LeaseError::Poisoned)?;
        leases.insert(lease.id.clone(), lease.clone());
        Ok(lease)
    }

    fn is_live(&self, lease_id: &str) -> Result<bool, LeaseError> {
        let leases = self.leases.lock().map_err(|_| LeaseError::Poisoned)?;
        Ok(leases
            .get(lease_id)
            .map_or(false, |lease| Utc::now() < lease.expires_at))
    }

    fn revoke(&self, lease_id: &str) -> Result<(), LeaseError> {
        let mut leases = self.leases.lock().map_err(|_| LeaseError::Poisoned)?;
        leases.remove(lease_id);
        Ok(())
    }

    fn tidy(&self) -> Result<usize, LeaseError> {
        let now = Utc::now();
        let mut leases = self.leases.lock().map_err(|_| LeaseError::Poisoned)?;
        let before = leases.len();
        leases.retain(|_, lease| lease.expires_at > now);
        Ok(before - leases.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_lease_is_live_until_revoked() {
        let manager = MemoryLeaseManager::new(3600).unwrap();
        let lease = manager.issue().unwrap();
        assert!(manager.is_live(&lease.id).unwrap());
        assert_eq!(lease.expires_at - lease.issued_at, Duration::seconds(3600));

        manager.revoke(&lease.id).unwrap();
        assert!(!manager.is_live(&lease.id).unwrap());
        manager.revoke(&lease.id).unwrap();
    }

    #[test]
    fn zero_ttl_lease_is_never_live() {
        let manager = MemoryLeaseManager::new(0).unwrap();
        let lease = manager.issue().unwrap();
        assert!(!manager.is_live(&lease.id).unwrap());
        assert_eq!(manager.tidy().unwrap(), 1);
        assert_eq!(manager.tidy().unwrap(), 0);
    }

    #[test]
    fn tidy_keeps_live_leases() {
        let manager = MemoryLeaseManager::new(3600).unwrap();
        let lease = manager.issue().unwrap();
        assert_eq!(manager.tidy().unwrap(), 0);
        assert!(manager.is_live(&lease.id).unwrap());
    }

    #[test]
    fn unknown_lease_is_not_live() {
        let manager = MemoryLeaseManager::new(60).unwrap();
        assert!(!manager.is_live("no-such-lease").unwrap());
    }

    #[test]
    fn lease_ids_are_unique() {
        let manager = MemoryLeaseManager::new(60).unwrap();
        let a = manager.issue().unwrap();
        let b = manager.issue().unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn oversized_ttl_is_rejected() {
        assert!(matches!(
            MemoryLeaseManager::new(u64::MAX),
            Err(LeaseError::InvalidTtl(u64::MAX))
        ));
    }
}
