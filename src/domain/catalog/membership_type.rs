//! Membership type definitions as served by the catalog.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ContactId, FinancialTypeId, MembershipTypeId, Money};

/// Unit of a membership's duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Day,
    Month,
    Year,
    Lifetime,
}

impl DurationUnit {
    pub fn is_lifetime(&self) -> bool {
        matches!(self, DurationUnit::Lifetime)
    }
}

/// A month/day pair on the calendar, e.g. "July 1st".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    pub const fn new(month: u32, day: u32) -> Self {
        Self { month, day }
    }
}

/// How a membership period is positioned on the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PeriodType {
    /// Period starts on the join (or renewal) date.
    Rolling,

    /// Period is anchored to configured calendar boundaries.
    ///
    /// For yearly types the period starts on `start` each year. Joining on
    /// or after `rollover` (measured within the current period) extends the
    /// first term by one extra period.
    Fixed {
        start: MonthDay,
        rollover: Option<MonthDay>,
    },
}

/// Whether a membership type may be paid through a recurring agreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoRenewPolicy {
    NotOffered,
    Optional,
    Required,
}

impl AutoRenewPolicy {
    pub fn allows_auto_renew(&self) -> bool {
        !matches!(self, AutoRenewPolicy::NotOffered)
    }
}

/// Catalog definition of a membership product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipType {
    pub id: MembershipTypeId,
    pub name: String,

    /// Organization the membership is "of". Two types with the same owner
    /// cannot be enrolled in one submission.
    pub owner_organization_id: ContactId,

    pub period_type: PeriodType,
    pub duration_unit: DurationUnit,
    pub duration_interval: u32,
    pub auto_renew: AutoRenewPolicy,
    pub financial_type_id: FinancialTypeId,
    pub minimum_fee: Money,

    /// Default cap on related (inherited) memberships.
    pub max_related: Option<u32>,
}

impl MembershipType {
    pub fn is_lifetime(&self) -> bool {
        self.duration_unit.is_lifetime()
    }

    pub fn is_rolling(&self) -> bool {
        matches!(self.period_type, PeriodType::Rolling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_not_offered_blocks_auto_renew() {
        assert!(!AutoRenewPolicy::NotOffered.allows_auto_renew());
        assert!(AutoRenewPolicy::Optional.allows_auto_renew());
        assert!(AutoRenewPolicy::Required.allows_auto_renew());
    }

    #[test]
    fn period_type_deserializes_tagged() {
        let fixed: PeriodType = serde_json::from_str(
            r#"{"kind":"fixed","start":{"month":1,"day":1},"rollover":{"month":10,"day":1}}"#,
        )
        .unwrap();
        assert_eq!(
            fixed,
            PeriodType::Fixed {
                start: MonthDay::new(1, 1),
                rollover: Some(MonthDay::new(10, 1)),
            }
        );
        let rolling: PeriodType = serde_json::from_str(r#"{"kind":"rolling"}"#).unwrap();
        assert_eq!(rolling, PeriodType::Rolling);
    }
}
