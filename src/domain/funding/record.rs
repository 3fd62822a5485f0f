//! Funding record (contribution) entity.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    ContactId, DomainError, ErrorCode, FinancialTypeId, FundingId, Money, PaymentInstrumentId,
    RecurringFundingId, StateMachine, Timestamp,
};

/// Lifecycle of a funding record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingStatus {
    /// Created but not yet paid (async payment, pay later).
    Pending,

    /// Money received.
    Completed,

    /// Charge declined or errored.
    Failed,

    /// Voided after the fact.
    Cancelled,
}

impl FundingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FundingStatus::Pending => "pending",
            FundingStatus::Completed => "completed",
            FundingStatus::Failed => "failed",
            FundingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(FundingStatus::Pending),
            "completed" => Some(FundingStatus::Completed),
            "failed" => Some(FundingStatus::Failed),
            "cancelled" => Some(FundingStatus::Cancelled),
            _ => None,
        }
    }
}

impl StateMachine for FundingStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use FundingStatus::*;
        matches!(
            (self, target),
            (Pending, Completed) | (Pending, Failed) | (Pending, Cancelled) | (Completed, Cancelled)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use FundingStatus::*;
        match self {
            Pending => vec![Completed, Failed, Cancelled],
            Completed => vec![Cancelled],
            Failed | Cancelled => vec![],
        }
    }
}

/// Card details reported by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSummary {
    pub card_type: Option<String>,

    /// Last four digits only.
    pub pan_truncation: Option<String>,
}

/// A contribution funding one or more memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRecord {
    pub id: FundingId,

    /// Who paid. Differs from the member when a soft credit is recorded.
    pub contact_id: ContactId,

    pub financial_type_id: FinancialTypeId,
    pub total_amount: Money,
    pub fee_amount: Option<Money>,
    pub status: FundingStatus,
    pub payment_instrument_id: Option<PaymentInstrumentId>,
    pub transaction_id: Option<String>,
    pub invoice_id: Option<String>,
    pub check_number: Option<String>,
    pub source: Option<String>,
    pub receive_date: Option<NaiveDate>,
    pub receipt_date: Option<NaiveDate>,
    pub is_test: bool,
    pub instrument: InstrumentSummary,
    pub recurring_funding_id: Option<RecurringFundingId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Fields supplied when a funding record is first written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFunding {
    pub contact_id: ContactId,
    pub financial_type_id: FinancialTypeId,
    pub total_amount: Money,
    pub status: FundingStatus,
    pub payment_instrument_id: Option<PaymentInstrumentId>,
    pub transaction_id: Option<String>,
    pub invoice_id: Option<String>,
    pub check_number: Option<String>,
    pub source: Option<String>,
    pub receive_date: Option<NaiveDate>,
    pub fee_amount: Option<Money>,
    pub is_test: bool,
    pub recurring_funding_id: Option<RecurringFundingId>,
}

impl FundingRecord {
    pub fn create(id: FundingId, new: NewFunding, now: Timestamp) -> Self {
        Self {
            id,
            contact_id: new.contact_id,
            financial_type_id: new.financial_type_id,
            total_amount: new.total_amount,
            fee_amount: new.fee_amount,
            status: new.status,
            payment_instrument_id: new.payment_instrument_id,
            transaction_id: new.transaction_id,
            invoice_id: new.invoice_id,
            check_number: new.check_number,
            source: new.source,
            receive_date: new.receive_date,
            receipt_date: None,
            is_test: new.is_test,
            instrument: InstrumentSummary::default(),
            recurring_funding_id: new.recurring_funding_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == FundingStatus::Completed
    }

    /// Records a completed charge.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the record is pending.
    pub fn complete(
        &mut self,
        transaction_id: Option<String>,
        instrument: InstrumentSummary,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        self.move_to(FundingStatus::Completed)?;
        if transaction_id.is_some() {
            self.transaction_id = transaction_id;
        }
        self.instrument = instrument;
        self.updated_at = now;
        Ok(())
    }

    /// Marks a declined or errored charge.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the record is pending.
    pub fn fail(&mut self, now: Timestamp) -> Result<(), DomainError> {
        self.move_to(FundingStatus::Failed)?;
        self.updated_at = now;
        Ok(())
    }

    fn move_to(&mut self, target: FundingStatus) -> Result<(), DomainError> {
        self.status = self.status.transition_to(target).map_err(|_| {
            DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!(
                    "Funding record cannot move from {} to {}",
                    self.status.as_str(),
                    target.as_str()
                ),
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Currency;

    fn pending() -> FundingRecord {
        FundingRecord::create(
            FundingId::new(),
            NewFunding {
                contact_id: ContactId::new(3),
                financial_type_id: FinancialTypeId::new(2),
                total_amount: Money::new(2500, Currency::new("USD").unwrap()),
                status: FundingStatus::Pending,
                payment_instrument_id: Some(PaymentInstrumentId::new(1)),
                transaction_id: None,
                invoice_id: Some("inv-1".into()),
                check_number: None,
                source: None,
                receive_date: None,
                fee_amount: None,
                is_test: false,
                recurring_funding_id: None,
            },
            Timestamp::now(),
        )
    }

    #[test]
    fn pending_completes_with_instrument_details() {
        let mut funding = pending();
        let instrument = InstrumentSummary {
            card_type: Some("Visa".into()),
            pan_truncation: Some("4242".into()),
        };
        funding
            .complete(Some("txn_1".into()), instrument.clone(), Timestamp::now())
            .unwrap();
        assert!(funding.is_completed());
        assert_eq!(funding.transaction_id.as_deref(), Some("txn_1"));
        assert_eq!(funding.instrument, instrument);
    }

    #[test]
    fn failed_is_terminal() {
        let mut funding = pending();
        funding.fail(Timestamp::now()).unwrap();
        let err = funding
            .complete(None, InstrumentSummary::default(), Timestamp::now())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidStateTransition);
        assert_eq!(funding.status, FundingStatus::Failed);
    }

    #[test]
    fn completed_can_only_be_cancelled() {
        assert_eq!(FundingStatus::Completed.valid_transitions(), vec![FundingStatus::Cancelled]);
        assert!(!FundingStatus::Completed.can_transition_to(&FundingStatus::Failed));
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            FundingStatus::Pending,
            FundingStatus::Completed,
            FundingStatus::Failed,
            FundingStatus::Cancelled,
        ] {
            assert_eq!(FundingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FundingStatus::parse("refunded"), None);
    }
}
