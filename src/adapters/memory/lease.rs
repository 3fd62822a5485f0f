//! Process-local membership lease.
//!
//! One async mutex per membership id. Guards are parked under their token
//! until released; a mutex nobody holds or waits on is dropped on release.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::foundation::{DomainError, MembershipId};
use crate::ports::{LeaseToken, MembershipLease};

#[derive(Default)]
struct Leases {
    locks: HashMap<MembershipId, Arc<AsyncMutex<()>>>,
    held: HashMap<Uuid, OwnedMutexGuard<()>>,
}

#[derive(Default)]
pub struct InMemoryMembershipLease {
    leases: Mutex<Leases>,
}

impl InMemoryMembershipLease {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of leases currently held.
    pub fn held(&self) -> usize {
        self.lock().held.len()
    }

    /// Number of membership ids with a live mutex.
    pub fn tracked(&self) -> usize {
        self.lock().locks.len()
    }

    fn lock(&self) -> MutexGuard<'_, Leases> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MembershipLease for InMemoryMembershipLease {
    async fn acquire(&self, membership_id: MembershipId) -> Result<LeaseToken, DomainError> {
        let mutex = Arc::clone(self.lock().locks.entry(membership_id).or_default());
        let guard = mutex.lock_owned().await;
        let token = Uuid::new_v4();
        self.lock().held.insert(token, guard);
        Ok(LeaseToken {
            membership_id,
            token,
        })
    }

    async fn release(&self, token: LeaseToken) -> Result<(), DomainError> {
        let mut leases = self.lock();
        drop(leases.held.remove(&token.token));
        let idle = leases
            .locks
            .get(&token.membership_id)
            .map_or(false, |mutex| Arc::strong_count(mutex) == 1);
        if idle {
            leases.locks.remove(&token.membership_id);
        }
        Ok(())
    }
}
