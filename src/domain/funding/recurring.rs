//! Recurring funding (auto-renew agreement).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::{DurationUnit, MembershipType};
use crate::domain::foundation::{CalendarUnit, ContactId, Money, RecurringFundingId, Timestamp};

/// How often a recurring agreement charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cadence {
    pub unit: CalendarUnit,
    pub interval: u32,
}

impl Cadence {
    /// A type's duration doubles as its billing cadence. Lifetime types have
    /// nothing to renew.
    pub fn of(membership_type: &MembershipType) -> Option<Self> {
        let unit = match membership_type.duration_unit {
            DurationUnit::Day => CalendarUnit::Day,
            DurationUnit::Month => CalendarUnit::Month,
            DurationUnit::Year => CalendarUnit::Year,
            DurationUnit::Lifetime => return None,
        };
        Some(Self {
            unit,
            interval: membership_type.duration_interval.max(1),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurringStatus {
    /// Created ahead of the first charge.
    Pending,
    InProgress,
    Cancelled,
}

impl RecurringStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurringStatus::Pending => "pending",
            RecurringStatus::InProgress => "in_progress",
            RecurringStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RecurringStatus::Pending),
            "in_progress" => Some(RecurringStatus::InProgress),
            "cancelled" => Some(RecurringStatus::Cancelled),
            _ => None,
        }
    }
}

/// Schedule backing an auto-renewing payment. Runs until cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringFundingRecord {
    pub id: RecurringFundingId,
    pub contact_id: ContactId,
    pub amount: Money,
    pub cadence: Cadence,
    pub status: RecurringStatus,
    pub start_date: NaiveDate,
    pub auto_renew: bool,
    pub is_test: bool,

    /// Gateway reference once the first charge has gone through.
    pub processor_reference: Option<String>,

    pub created_at: Timestamp,
}

impl RecurringFundingRecord {
    pub fn pending(
        contact_id: ContactId,
        amount: Money,
        cadence: Cadence,
        start_date: NaiveDate,
        is_test: bool,
        now: Timestamp,
    ) -> Self {
        Self {
            id: RecurringFundingId::new(),
            contact_id,
            amount,
            cadence,
            status: RecurringStatus::Pending,
            start_date,
            auto_renew: true,
            is_test,
            processor_reference: None,
            created_at: now,
        }
    }

    /// Promotes the agreement after a completed first charge.
    pub fn activate(&mut self, processor_reference: Option<String>) {
        self.status = RecurringStatus::InProgress;
        if processor_reference.is_some() {
            self.processor_reference = processor_reference;
        }
    }
}
