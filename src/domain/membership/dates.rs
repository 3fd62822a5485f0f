//! Membership period calculation.
//!
//! Turns a membership type's period rules plus the submitted join/start/end
//! dates into the effective validity window.
//!
//! - Rolling types start on the join date and run for `interval * terms`
//!   units, ending the day before the next period would begin.
//! - Fixed yearly types start on the configured month/day of the period that
//!   contains the reference date. Joining on or after the rollover day adds
//!   one extra period.
//! - Fixed monthly types start on the first of the month; the rollover day is
//!   a day-of-month.
//! - Lifetime types never compute an end date.
//!
//! Explicitly submitted start/end dates always win over computed ones.

use chrono::{Datelike, NaiveDate};
use thiserror::Error;

use crate::domain::catalog::{DurationUnit, MembershipType, MonthDay, PeriodType};
use crate::domain::foundation::{day_before, shift, CalendarUnit};

/// Date inputs for one membership type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateInputs {
    pub join_date: NaiveDate,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub num_terms: u32,
}

impl DateInputs {
    pub fn joined(join_date: NaiveDate) -> Self {
        Self {
            join_date,
            start_date: None,
            end_date: None,
            num_terms: 1,
        }
    }
}

/// Effective dates for one membership type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComputedDates {
    pub join_date: NaiveDate,
    pub start_date: NaiveDate,

    /// `None` = open-ended.
    pub end_date: Option<NaiveDate>,
}

/// Why a period could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateCalculationError {
    #[error("Membership type has an invalid period boundary {month}/{day}")]
    InvalidBoundary { month: u32, day: u32 },

    #[error("Membership dates are out of the supported calendar range")]
    OutOfRange,
}

/// Computes the effective join/start/end for `membership_type`.
///
/// Pure: the same inputs always produce the same dates.
pub fn compute_dates(
    membership_type: &MembershipType,
    inputs: DateInputs,
) -> Result<ComputedDates, DateCalculationError> {
    let terms = inputs.num_terms.max(1);
    let reference = inputs.start_date.unwrap_or(inputs.join_date);

    let unit = match membership_type.duration_unit {
        DurationUnit::Lifetime => {
            return Ok(ComputedDates {
                join_date: inputs.join_date,
                start_date: reference,
                end_date: inputs.end_date,
            });
        }
        DurationUnit::Day => CalendarUnit::Day,
        DurationUnit::Month => CalendarUnit::Month,
        DurationUnit::Year => CalendarUnit::Year,
    };
    let span = i64::from(membership_type.duration_interval.max(1)) * i64::from(terms);

    let (period_start, extra_period) = match membership_type.period_type {
        PeriodType::Rolling => (reference, false),
        PeriodType::Fixed { start, rollover } => {
            fixed_period_start(unit, start, rollover, inputs.join_date, reference)?
        }
    };

    let start_date = inputs.start_date.unwrap_or(period_start);
    let end_date = match inputs.end_date {
        Some(end) => end,
        None => {
            let span = if extra_period {
                span + i64::from(membership_type.duration_interval.max(1))
            } else {
                span
            };
            let next = shift(period_start, unit, span).ok_or(DateCalculationError::OutOfRange)?;
            day_before(next).ok_or(DateCalculationError::OutOfRange)?
        }
    };

    Ok(ComputedDates {
        join_date: inputs.join_date,
        start_date,
        end_date: Some(end_date),
    })
}

/// Start of the fixed period containing `reference`, plus whether the
/// rollover rule grants an extra period.
fn fixed_period_start(
    unit: CalendarUnit,
    start: MonthDay,
    rollover: Option<MonthDay>,
    join_date: NaiveDate,
    reference: NaiveDate,
) -> Result<(NaiveDate, bool), DateCalculationError> {
    match unit {
        CalendarUnit::Year => {
            let this_year = anchor(reference.year(), start)?;
            let period_start = if this_year > reference {
                anchor(reference.year() - 1, start)?
            } else {
                this_year
            };
            let extra = match rollover {
                Some(rollover) => {
                    let mut rollover_date = anchor(period_start.year(), rollover)?;
                    if rollover_date < period_start {
                        rollover_date = anchor(period_start.year() + 1, rollover)?;
                    }
                    join_date >= rollover_date
                }
                None => false,
            };
            Ok((period_start, extra))
        }
        CalendarUnit::Month => {
            let period_start = NaiveDate::from_ymd_opt(reference.year(), reference.month(), 1)
                .ok_or(DateCalculationError::OutOfRange)?;
            let extra = rollover.map_or(false, |r| join_date.day() >= r.day);
            Ok((period_start, extra))
        }
        CalendarUnit::Day => Ok((reference, false)),
    }
}

/// The given month/day in `year`, clamped to the month's last day
/// (a Feb 29 anchor lands on Feb 28 in common years).
fn anchor(year: i32, month_day: MonthDay) -> Result<NaiveDate, DateCalculationError> {
    let invalid = DateCalculationError::InvalidBoundary {
        month: month_day.month,
        day: month_day.day,
    };
    if !(1..=12).contains(&month_day.month) || !(1..=31).contains(&month_day.day) {
        return Err(invalid);
    }
    (1..=month_day.day)
        .rev()
        .find_map(|day| NaiveDate::from_ymd_opt(year, month_day.month, day))
        .ok_or(DateCalculationError::OutOfRange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::AutoRenewPolicy;
    use crate::domain::foundation::{ContactId, Currency, FinancialTypeId, MembershipTypeId, Money};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn membership_type(period_type: PeriodType, unit: DurationUnit, interval: u32) -> MembershipType {
        MembershipType {
            id: MembershipTypeId::new(1),
            name: "General".into(),
            owner_organization_id: ContactId::new(1),
            period_type,
            duration_unit: unit,
            duration_interval: interval,
            auto_renew: AutoRenewPolicy::NotOffered,
            financial_type_id: FinancialTypeId::new(2),
            minimum_fee: Money::new(5000, Currency::new("USD").unwrap()),
            max_related: None,
        }
    }

    #[test]
    fn rolling_monthly_three_terms() {
        let t = membership_type(PeriodType::Rolling, DurationUnit::Month, 1);
        let dates = compute_dates(
            &t,
            DateInputs {
                num_terms: 3,
                ..DateInputs::joined(d(2024, 1, 1))
            },
        )
        .unwrap();
        assert_eq!(dates.start_date, d(2024, 1, 1));
        assert_eq!(dates.end_date, Some(d(2024, 3, 31)));
    }

    #[test]
    fn rolling_uses_explicit_start() {
        let t = membership_type(PeriodType::Rolling, DurationUnit::Year, 1);
        let dates = compute_dates(
            &t,
            DateInputs {
                start_date: Some(d(2024, 3, 15)),
                ..DateInputs::joined(d(2020, 5, 1))
            },
        )
        .unwrap();
        assert_eq!(dates.join_date, d(2020, 5, 1));
        assert_eq!(dates.start_date, d(2024, 3, 15));
        assert_eq!(dates.end_date, Some(d(2025, 3, 14)));
    }

    #[test]
    fn explicit_end_wins() {
        let t = membership_type(PeriodType::Rolling, DurationUnit::Year, 1);
        let dates = compute_dates(
            &t,
            DateInputs {
                end_date: Some(d(2024, 6, 30)),
                ..DateInputs::joined(d(2024, 1, 1))
            },
        )
        .unwrap();
        assert_eq!(dates.end_date, Some(d(2024, 6, 30)));
    }

    #[test]
    fn lifetime_is_open_ended() {
        let t = membership_type(PeriodType::Rolling, DurationUnit::Lifetime, 1);
        let dates = compute_dates(&t, DateInputs::joined(d(2024, 1, 1))).unwrap();
        assert_eq!(dates.start_date, d(2024, 1, 1));
        assert_eq!(dates.end_date, None);
    }

    #[test]
    fn fixed_yearly_anchors_to_period_start() {
        let t = membership_type(
            PeriodType::Fixed {
                start: MonthDay::new(7, 1),
                rollover: None,
            },
            DurationUnit::Year,
            1,
        );
        let dates = compute_dates(&t, DateInputs::joined(d(2024, 3, 10))).unwrap();
        assert_eq!(dates.start_date, d(2023, 7, 1));
        assert_eq!(dates.end_date, Some(d(2024, 6, 30)));
    }

    #[test]
    fn fixed_yearly_rollover_adds_a_period() {
        let t = membership_type(
            PeriodType::Fixed {
                start: MonthDay::new(1, 1),
                rollover: Some(MonthDay::new(10, 1)),
            },
            DurationUnit::Year,
            1,
        );
        let before = compute_dates(&t, DateInputs::joined(d(2024, 9, 30))).unwrap();
        assert_eq!(before.start_date, d(2024, 1, 1));
        assert_eq!(before.end_date, Some(d(2024, 12, 31)));

        let after = compute_dates(&t, DateInputs::joined(d(2024, 10, 1))).unwrap();
        assert_eq!(after.start_date, d(2024, 1, 1));
        assert_eq!(after.end_date, Some(d(2025, 12, 31)));
    }

    #[test]
    fn fixed_monthly_starts_on_the_first() {
        let t = membership_type(
            PeriodType::Fixed {
                start: MonthDay::new(1, 1),
                rollover: Some(MonthDay::new(1, 20)),
            },
            DurationUnit::Month,
            1,
        );
        let early = compute_dates(&t, DateInputs::joined(d(2024, 2, 10))).unwrap();
        assert_eq!(early.start_date, d(2024, 2, 1));
        assert_eq!(early.end_date, Some(d(2024, 2, 29)));

        let late = compute_dates(&t, DateInputs::joined(d(2024, 2, 25))).unwrap();
        assert_eq!(late.end_date, Some(d(2024, 3, 31)));
    }

    #[test]
    fn leap_day_anchor_clamps() {
        assert_eq!(anchor(2023, MonthDay::new(2, 29)).unwrap(), d(2023, 2, 28));
        assert!(matches!(
            anchor(2023, MonthDay::new(13, 1)),
            Err(DateCalculationError::InvalidBoundary { .. })
        ));
    }
}
