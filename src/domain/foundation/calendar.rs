//! Calendar arithmetic on `NaiveDate`.

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Calendar unit for date offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarUnit {
    Day,
    Month,
    Year,
}

/// Shifts `date` by `amount` units; negative amounts move backwards.
///
/// Month and year arithmetic clamps to the last day of the target month
/// (Jan 31 + 1 month = Feb 28/29). Returns `None` on overflow.
pub fn shift(date: NaiveDate, unit: CalendarUnit, amount: i64) -> Option<NaiveDate> {
    let magnitude = amount.unsigned_abs();
    match unit {
        CalendarUnit::Day => {
            let days = Days::new(magnitude);
            if amount >= 0 {
                date.checked_add_days(days)
            } else {
                date.checked_sub_days(days)
            }
        }
        CalendarUnit::Month | CalendarUnit::Year => {
            let months = if unit == CalendarUnit::Year {
                magnitude.checked_mul(12)?
            } else {
                magnitude
            };
            let months = Months::new(u32::try_from(months).ok()?);
            if amount >= 0 {
                date.checked_add_months(months)
            } else {
                date.checked_sub_months(months)
            }
        }
    }
}

/// The day before `date`.
pub fn day_before(date: NaiveDate) -> Option<NaiveDate> {
    date.pred_opt()
}
