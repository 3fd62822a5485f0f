//! Per-membership lease port.
//!
//! Serializes concurrent updates of the same membership. Without a lease the
//! last write wins.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, MembershipId};

/// Proof of holding a lease; hand it back to `release`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseToken {
    pub membership_id: MembershipId,
    pub token: Uuid,
}

#[async_trait]
pub trait MembershipLease: Send + Sync {
    /// Waits for and takes the lease on `membership_id`.
    ///
    /// # Errors
    ///
    /// `LockUnavailable` if the lease cannot be obtained.
    async fn acquire(&self, membership_id: MembershipId) -> Result<LeaseToken, DomainError>;

    /// Releases a lease. Releasing a stale token is a no-op.
    async fn release(&self, token: LeaseToken) -> Result<(), DomainError>;
}
