//! Enrollment store port.
//!
//! A transactional record store for memberships and their funding. All
//! writes go through a `StoreTransaction`; nothing written inside one is
//! observable until `commit`, and `rollback` (or dropping the transaction)
//! discards everything.
//!
//! # Example
//!
//! ```ignore
//! let mut tx = store.begin().await?;
//! tx.insert_funding(&funding).await?;
//! tx.insert_membership(&membership).await?;
//! tx.link_membership_funding(membership.id, funding.id).await?;
//! tx.commit().await?;
//! ```

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, FundingId, MembershipId, RecurringFundingId};
use crate::domain::funding::{FundingRecord, LineItem, RecurringFundingRecord, SoftCreditEntry};
use crate::domain::membership::MembershipRecord;

#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    /// Opens a unit of work.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError>;

    async fn find_membership(&self, id: MembershipId) -> Result<Option<MembershipRecord>, DomainError>;

    async fn find_funding(&self, id: FundingId) -> Result<Option<FundingRecord>, DomainError>;

    async fn find_recurring(
        &self,
        id: RecurringFundingId,
    ) -> Result<Option<RecurringFundingRecord>, DomainError>;

    async fn line_items_for(&self, funding_id: FundingId) -> Result<Vec<LineItem>, DomainError>;

    async fn soft_credits_for(&self, funding_id: FundingId) -> Result<Vec<SoftCreditEntry>, DomainError>;

    /// Most recently created funding record linked to a membership.
    async fn latest_funding_for_membership(
        &self,
        membership_id: MembershipId,
    ) -> Result<Option<FundingRecord>, DomainError>;

    async fn memberships_for_funding(
        &self,
        funding_id: FundingId,
    ) -> Result<Vec<MembershipRecord>, DomainError>;
}

/// Writes inside one atomic unit of work.
///
/// # Errors
///
/// Every method returns `DatabaseError` on storage failure. Updates return
/// the matching `*NotFound` code when the record does not exist.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn insert_membership(&mut self, membership: &MembershipRecord) -> Result<(), DomainError>;

    async fn update_membership(&mut self, membership: &MembershipRecord) -> Result<(), DomainError>;

    async fn insert_funding(&mut self, funding: &FundingRecord) -> Result<(), DomainError>;

    async fn update_funding(&mut self, funding: &FundingRecord) -> Result<(), DomainError>;

    async fn insert_recurring(&mut self, recurring: &RecurringFundingRecord) -> Result<(), DomainError>;

    async fn update_recurring(&mut self, recurring: &RecurringFundingRecord) -> Result<(), DomainError>;

    /// Physically removes a recurring record that never became active.
    async fn delete_recurring(&mut self, id: RecurringFundingId) -> Result<(), DomainError>;

    /// Replaces the full line-item set of a funding record.
    async fn replace_line_items(
        &mut self,
        funding_id: FundingId,
        items: &[LineItem],
    ) -> Result<(), DomainError>;

    async fn insert_soft_credit(&mut self, entry: &SoftCreditEntry) -> Result<(), DomainError>;

    /// Records that `funding_id` pays for `membership_id`. Idempotent.
    async fn link_membership_funding(
        &mut self,
        membership_id: MembershipId,
        funding_id: FundingId,
    ) -> Result<(), DomainError>;

    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}
