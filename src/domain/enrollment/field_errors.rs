//! Field-keyed, user-correctable validation errors.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::domain::foundation::PriceFieldId;

/// The submission field a message is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionField {
    MembershipId,
    MembershipType,
    PriceSet,
    PriceField(PriceFieldId),
    NumTerms,
    JoinDate,
    StartDate,
    EndDate,
    Status,
    StatusOverride,
    StatusOverrideEndDate,
    AutoRenew,
    RecordPayment,
    PaymentInstrument,
    TotalAmount,
    Currency,
    SoftCreditType,
    Billing,
}

impl fmt::Display for SubmissionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubmissionField::MembershipId => "membership_id",
            SubmissionField::MembershipType => "membership_type_id",
            SubmissionField::PriceSet => "price_set_id",
            SubmissionField::PriceField(id) => return write!(f, "price_{}", id),
            SubmissionField::NumTerms => "num_terms",
            SubmissionField::JoinDate => "join_date",
            SubmissionField::StartDate => "start_date",
            SubmissionField::EndDate => "end_date",
            SubmissionField::Status => "status_id",
            SubmissionField::StatusOverride => "status_override",
            SubmissionField::StatusOverrideEndDate => "status_override_end_date",
            SubmissionField::AutoRenew => "auto_renew",
            SubmissionField::RecordPayment => "record_payment",
            SubmissionField::PaymentInstrument => "payment_instrument_id",
            SubmissionField::TotalAmount => "total_amount",
            SubmissionField::Currency => "currency",
            SubmissionField::SoftCreditType => "soft_credit_type_id",
            SubmissionField::Billing => "billing",
        };
        f.write_str(name)
    }
}

/// Ordered field -> message map. The first message recorded for a field
/// wins; later ones for the same field are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(Vec<(SubmissionField, String)>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: SubmissionField, message: impl Into<String>) {
        if !self.contains(field) {
            self.0.push((field, message.into()));
        }
    }

    pub fn contains(&self, field: SubmissionField) -> bool {
        self.0.iter().any(|(f, _)| *f == field)
    }

    pub fn get(&self, field: SubmissionField) -> Option<&str> {
        self.0
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, message)| message.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SubmissionField, &str)> {
        self.0.iter().map(|(f, m)| (*f, m.as_str()))
    }

    /// `Ok(())` when empty, otherwise the collected errors.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", field, message)?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for FieldErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (field, message) in &self.0 {
            map.serialize_entry(&field.to_string(), message)?;
        }
        map.end()
    }
}
