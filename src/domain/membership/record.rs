//! Membership record entity.
//!
//! A membership record ties a contact to a membership type for a validity
//! window. Funding records are peers linked through a join table; neither
//! owns the other.
//!
//! # Invariants
//!
//! - An `UntilDate` override always carries its expiry date
//! - Without an override the status comes from the status rules (or the
//!   pending status when `skip_status_calc` is set), never from user input
//! - `start_date <= end_date` when both are present

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    ContactId, DomainError, ErrorCode, MembershipId, MembershipStatusId, MembershipTypeId,
    RecurringFundingId, Timestamp,
};

/// Manual status pin that bypasses rule evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "until", rename_all = "snake_case")]
pub enum StatusOverride {
    None,
    Indefinite,
    UntilDate(NaiveDate),
}

impl StatusOverride {
    pub fn is_set(&self) -> bool {
        !matches!(self, StatusOverride::None)
    }

    pub fn expires_on(&self) -> Option<NaiveDate> {
        match self {
            StatusOverride::UntilDate(date) => Some(*date),
            _ => None,
        }
    }
}

/// Everything needed to create or overwrite a membership record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipTerms {
    pub contact_id: ContactId,
    pub membership_type_id: MembershipTypeId,
    pub join_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status_id: MembershipStatusId,
    pub status_override: StatusOverride,
    pub skip_status_calc: bool,
    pub num_terms: u32,
    pub source: Option<String>,
    pub recurring_funding_id: Option<RecurringFundingId>,
    pub max_related: Option<u32>,
}

/// A persisted membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub id: MembershipId,
    pub contact_id: ContactId,
    pub membership_type_id: MembershipTypeId,
    pub join_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,

    /// `None` means open-ended (lifetime, or pending payment).
    pub end_date: Option<NaiveDate>,

    pub status_id: MembershipStatusId,
    pub status_override: StatusOverride,

    /// Set while payment is outstanding so scheduled status recalculation
    /// leaves the pending status alone.
    pub skip_status_calc: bool,

    /// Terms granted by the latest enrollment.
    pub num_terms: u32,

    pub source: Option<String>,
    pub recurring_funding_id: Option<RecurringFundingId>,
    pub max_related: Option<u32>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl MembershipRecord {
    /// Builds a new record from validated terms.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` if the terms break a record invariant.
    pub fn create(id: MembershipId, terms: MembershipTerms, now: Timestamp) -> Result<Self, DomainError> {
        check_terms(&terms)?;
        Ok(Self {
            id,
            contact_id: terms.contact_id,
            membership_type_id: terms.membership_type_id,
            join_date: terms.join_date,
            start_date: terms.start_date,
            end_date: terms.end_date,
            status_id: terms.status_id,
            status_override: terms.status_override,
            skip_status_calc: terms.skip_status_calc,
            num_terms: terms.num_terms,
            source: terms.source,
            recurring_funding_id: terms.recurring_funding_id,
            max_related: terms.max_related,
            created_at: now,
            updated_at: now,
        })
    }

    /// Overwrites this record with new terms, keeping identity and
    /// creation time. A recurring link is only replaced, never dropped.
    ///
    /// # Errors
    ///
    /// Returns `ValidationFailed` if the terms break a record invariant.
    pub fn apply(&mut self, terms: MembershipTerms, now: Timestamp) -> Result<(), DomainError> {
        check_terms(&terms)?;
        self.contact_id = terms.contact_id;
        self.membership_type_id = terms.membership_type_id;
        self.join_date = terms.join_date;
        self.start_date = terms.start_date;
        self.end_date = terms.end_date;
        self.status_id = terms.status_id;
        self.status_override = terms.status_override;
        self.skip_status_calc = terms.skip_status_calc;
        self.num_terms = terms.num_terms;
        if terms.source.is_some() {
            self.source = terms.source;
        }
        if terms.recurring_funding_id.is_some() {
            self.recurring_funding_id = terms.recurring_funding_id;
        }
        self.max_related = terms.max_related;
        self.updated_at = now;
        Ok(())
    }
}

fn check_terms(terms: &MembershipTerms) -> Result<(), DomainError> {
    if let (Some(start), Some(end)) = (terms.start_date, terms.end_date) {
        if end < start {
            return Err(DomainError::new(
                ErrorCode::ValidationFailed,
                "End date must be the same or later than start date.",
            )
            .with_detail("field", "end_date"));
        }
    }
    if terms.num_terms == 0 {
        return Err(DomainError::validation("num_terms", "Number of terms must be at least 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn terms() -> MembershipTerms {
        MembershipTerms {
            contact_id: ContactId::new(7),
            membership_type_id: MembershipTypeId::new(1),
            join_date: Some(d(2024, 1, 1)),
            start_date: Some(d(2024, 1, 1)),
            end_date: Some(d(2024, 12, 31)),
            status_id: MembershipStatusId::new(1),
            status_override: StatusOverride::None,
            skip_status_calc: false,
            num_terms: 1,
            source: Some("Offline signup".into()),
            recurring_funding_id: None,
            max_related: None,
        }
    }

    #[test]
    fn create_rejects_inverted_dates() {
        let mut bad = terms();
        bad.end_date = Some(d(2023, 12, 31));
        let err = MembershipRecord::create(MembershipId::new(), bad, Timestamp::now()).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    #[test]
    fn apply_keeps_identity_and_existing_recurring_link() {
        let created_at = Timestamp::now();
        let mut recurring = terms();
        let link = RecurringFundingId::new();
        recurring.recurring_funding_id = Some(link);
        let mut record = MembershipRecord::create(MembershipId::new(), recurring, created_at).unwrap();
        let id = record.id;

        let mut renewal = terms();
        renewal.end_date = Some(d(2025, 12, 31));
        renewal.source = None;
        record.apply(renewal, created_at.add_days(1)).unwrap();

        assert_eq!(record.id, id);
        assert_eq!(record.created_at, created_at);
        assert_eq!(record.end_date, Some(d(2025, 12, 31)));
        assert_eq!(record.recurring_funding_id, Some(link));
        assert_eq!(record.source.as_deref(), Some("Offline signup"));
    }

    #[test]
    fn until_date_override_exposes_expiry() {
        let pin = StatusOverride::UntilDate(d(2024, 6, 30));
        assert!(pin.is_set());
        assert_eq!(pin.expires_on(), Some(d(2024, 6, 30)));
        assert!(!StatusOverride::None.is_set());
        assert_eq!(StatusOverride::Indefinite.expires_on(), None);
    }

    #[test]
    fn override_serializes_with_expiry() {
        let json = serde_json::to_string(&StatusOverride::UntilDate(d(2024, 6, 30))).unwrap();
        assert_eq!(json, r#"{"kind":"until_date","until":"2024-06-30"}"#);
        let back: StatusOverride = serde_json::from_str(r#"{"kind":"none"}"#).unwrap();
        assert_eq!(back, StatusOverride::None);
    }
}
