//! Enrollment submission: the strongly typed request payload.
//!
//! Unknown keys are rejected at deserialization so a typo never silently
//! drops a field.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    ContactId, Currency, FinancialTypeId, MembershipId, MembershipStatusId, MembershipTypeId, Money,
    PaymentInstrumentId, PriceSetId, SoftCreditTypeId,
};
use crate::domain::funding::FundingStatus;
use crate::domain::membership::{CatalogSelection, StatusOverride};

/// How the submitted payment is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Money was received outside the system; only record it.
    RecordOnly,
    /// Charge through the gateway.
    LiveCharge,
    /// Charge through the gateway's test mode.
    TestCharge,
}

impl PaymentMode {
    pub fn is_charge(&self) -> bool {
        !matches!(self, PaymentMode::RecordOnly)
    }
}

/// Requested status override, as submitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideRequest {
    #[default]
    None,
    Indefinite,
    UntilDate,
}

/// Billing details forwarded to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillingDetails {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state_province: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,

    /// Tokenized card or bank account from the gateway's client library.
    pub payment_token: String,
}

/// Someone other than the member paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayerDetails {
    pub contact_id: ContactId,
    pub soft_credit_type_id: Option<SoftCreditTypeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentDetails {
    pub mode: PaymentMode,

    /// Amount for the direct path. The catalog path totals its line items.
    pub total_amount: Option<Money>,

    pub currency: Option<Currency>,
    pub financial_type_id: Option<FinancialTypeId>,
    pub payment_instrument_id: Option<PaymentInstrumentId>,

    /// Status of a record-only payment.
    #[serde(default = "completed")]
    pub contribution_status: FundingStatus,

    pub receive_date: Option<NaiveDate>,
    pub transaction_id: Option<String>,
    pub invoice_id: Option<String>,
    pub check_number: Option<String>,
    pub fee_amount: Option<Money>,
    pub payer: Option<PayerDetails>,
    pub billing: Option<BillingDetails>,
}

fn completed() -> FundingStatus {
    FundingStatus::Completed
}

/// One enrollment (create) or renewal/edit (update) request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnrollmentSubmission {
    /// Set to update an existing membership; absent to create.
    pub membership_id: Option<MembershipId>,

    pub contact_id: ContactId,

    /// Direct path.
    pub membership_type_id: Option<MembershipTypeId>,

    /// Catalog path.
    pub price_set_id: Option<PriceSetId>,
    #[serde(default)]
    pub catalog_selections: CatalogSelection,

    pub num_terms: Option<u32>,
    pub join_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,

    #[serde(default)]
    pub status_override: OverrideRequest,
    pub status_id: Option<MembershipStatusId>,
    pub status_override_end_date: Option<NaiveDate>,

    pub source: Option<String>,
    pub max_related: Option<u32>,

    #[serde(default)]
    pub auto_renew: bool,

    pub payment: Option<PaymentDetails>,

    #[serde(default)]
    pub send_receipt: bool,
    pub receipt_text: Option<String>,
}

impl EnrollmentSubmission {
    /// A bare direct-path submission; callers fill in the rest.
    pub fn direct(contact_id: ContactId, membership_type_id: MembershipTypeId) -> Self {
        Self {
            membership_id: None,
            contact_id,
            membership_type_id: Some(membership_type_id),
            price_set_id: None,
            catalog_selections: CatalogSelection::new(),
            num_terms: None,
            join_date: None,
            start_date: None,
            end_date: None,
            status_override: OverrideRequest::None,
            status_id: None,
            status_override_end_date: None,
            source: None,
            max_related: None,
            auto_renew: false,
            payment: None,
            send_receipt: false,
            receipt_text: None,
        }
    }

    pub fn is_update(&self) -> bool {
        self.membership_id.is_some()
    }

    pub fn uses_catalog(&self) -> bool {
        self.price_set_id.is_some()
    }

    pub fn payment_mode(&self) -> Option<PaymentMode> {
        self.payment.as_ref().map(|p| p.mode)
    }

    /// The override as it will be stored. `until_date` without a date is
    /// caught by validation; here it degrades to no override.
    pub fn resolved_override(&self) -> StatusOverride {
        match self.status_override {
            OverrideRequest::None => StatusOverride::None,
            OverrideRequest::Indefinite => StatusOverride::Indefinite,
            OverrideRequest::UntilDate => match self.status_override_end_date {
                Some(date) => StatusOverride::UntilDate(date),
                None => StatusOverride::None,
            },
        }
    }
}
