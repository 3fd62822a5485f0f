//! In-memory catalog and contact directory.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::catalog::{MembershipType, PriceSet, StatusRule};
use crate::domain::foundation::{ContactId, DomainError, MembershipTypeId, PriceSetId};
use crate::ports::{CatalogReader, Contact, ContactDirectory};

#[derive(Default)]
struct CatalogState {
    membership_types: HashMap<MembershipTypeId, MembershipType>,
    status_rules: HashMap<MembershipTypeId, Vec<StatusRule>>,
    price_sets: HashMap<PriceSetId, PriceSet>,
}

/// Catalog seeded by tests.
#[derive(Default)]
pub struct InMemoryCatalog {
    state: Mutex<CatalogState>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a membership type with the status rules that apply to it.
    pub fn add_membership_type(&self, membership_type: MembershipType, rules: Vec<StatusRule>) {
        let mut state = self.lock();
        state.status_rules.insert(membership_type.id, rules);
        state.membership_types.insert(membership_type.id, membership_type);
    }

    pub fn add_price_set(&self, price_set: PriceSet) {
        self.lock().price_sets.insert(price_set.id, price_set);
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CatalogReader for InMemoryCatalog {
    async fn get_price_set(&self, id: PriceSetId) -> Result<Option<PriceSet>, DomainError> {
        Ok(self.lock().price_sets.get(&id).cloned())
    }

    async fn get_membership_type(
        &self,
        id: MembershipTypeId,
    ) -> Result<Option<MembershipType>, DomainError> {
        Ok(self.lock().membership_types.get(&id).cloned())
    }

    async fn list_status_rules(
        &self,
        membership_type_id: MembershipTypeId,
    ) -> Result<Vec<StatusRule>, DomainError> {
        Ok(self
            .lock()
            .status_rules
            .get(&membership_type_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Contact directory seeded by tests.
#[derive(Default)]
pub struct InMemoryContactDirectory {
    contacts: Mutex<HashMap<ContactId, Contact>>,
}

impl InMemoryContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, contact: Contact) {
        self.contacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(contact.id, contact);
    }
}

#[async_trait]
impl ContactDirectory for InMemoryContactDirectory {
    async fn get_contact(&self, id: ContactId) -> Result<Option<Contact>, DomainError> {
        Ok(self
            .contacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }
}
