//! Soft credits: attribution of a contribution to someone other than the payer.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ContactId, FundingId, Money, SoftCreditId, SoftCreditTypeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftCreditEntry {
    pub id: SoftCreditId,
    pub funding_id: FundingId,

    /// Contact credited (the member, when someone else paid).
    pub contact_id: ContactId,

    pub amount: Money,
    pub soft_credit_type_id: SoftCreditTypeId,
}

impl SoftCreditEntry {
    pub fn new(
        funding_id: FundingId,
        contact_id: ContactId,
        amount: Money,
        soft_credit_type_id: SoftCreditTypeId,
    ) -> Self {
        Self {
            id: SoftCreditId::new(),
            funding_id,
            contact_id,
            amount,
            soft_credit_type_id,
        }
    }
}
