//! Catalog reader port.
//!
//! Membership types, price sets and status rules are owned by the catalog
//! collaborator. The enrollment engine only reads them.

use async_trait::async_trait;

use crate::domain::catalog::{MembershipType, PriceSet, StatusRule};
use crate::domain::foundation::{DomainError, MembershipTypeId, PriceSetId};

#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Returns `None` if the price set does not exist.
    async fn get_price_set(&self, id: PriceSetId) -> Result<Option<PriceSet>, DomainError>;

    /// Returns `None` if the membership type does not exist.
    async fn get_membership_type(
        &self,
        id: MembershipTypeId,
    ) -> Result<Option<MembershipType>, DomainError>;

    /// Status rules applicable to a membership type, in any order; callers
    /// sort by weight.
    async fn list_status_rules(
        &self,
        membership_type_id: MembershipTypeId,
    ) -> Result<Vec<StatusRule>, DomainError>;
}
