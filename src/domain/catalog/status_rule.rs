//! Membership status rules.
//!
//! Each configured status carries a date window expressed relative to a
//! membership's join/start/end dates. A membership "is" the first active
//! status (by weight) whose window contains the evaluation date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{shift, CalendarUnit, MembershipStatusId};

/// Reserved name of the status used while payment is outstanding.
pub const PENDING_STATUS_NAME: &str = "Pending";

/// Which membership date a window boundary is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAnchor {
    JoinDate,
    StartDate,
    EndDate,
}

/// Signed calendar offset applied to an anchor date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateOffset {
    pub unit: CalendarUnit,
    pub interval: i32,
}

/// One side of a status window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBoundary {
    pub anchor: RuleAnchor,
    pub offset: Option<DateOffset>,
}

impl RuleBoundary {
    pub const fn at(anchor: RuleAnchor) -> Self {
        Self {
            anchor,
            offset: None,
        }
    }

    pub const fn offset(anchor: RuleAnchor, unit: CalendarUnit, interval: i32) -> Self {
        Self {
            anchor,
            offset: Some(DateOffset { unit, interval }),
        }
    }

    /// Resolves the boundary to a concrete date, or `None` when the anchor
    /// date is absent (or the offset overflows).
    fn resolve(&self, dates: &MembershipDates) -> Option<NaiveDate> {
        let base = match self.anchor {
            RuleAnchor::JoinDate => dates.join,
            RuleAnchor::StartDate => dates.start,
            RuleAnchor::EndDate => dates.end,
        }?;
        match self.offset {
            Some(offset) => shift(base, offset.unit, i64::from(offset.interval)),
            None => Some(base),
        }
    }
}

/// The dates a status window is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipDates {
    pub join: Option<NaiveDate>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// A configured membership status and its date window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRule {
    pub status_id: MembershipStatusId,
    pub name: String,

    /// Window start (inclusive). `None` = unbounded.
    pub starts: Option<RuleBoundary>,

    /// Window end (inclusive). `None` = unbounded.
    pub ends: Option<RuleBoundary>,

    /// Whether members in this status count as current members.
    pub is_current_member: bool,

    /// Admin-only statuses are only reachable through an explicit override.
    pub is_admin: bool,

    pub is_active: bool,

    /// Evaluation priority; lower weights are tried first.
    pub weight: i32,
}

impl StatusRule {
    pub fn is_pending(&self) -> bool {
        self.name.eq_ignore_ascii_case(PENDING_STATUS_NAME)
    }

    /// Whether `as_of` falls inside this rule's window.
    ///
    /// A start boundary whose anchor date is missing never matches. An end
    /// boundary anchored on a missing end date is open-ended, which is how
    /// lifetime memberships stay current.
    pub fn window_contains(&self, dates: &MembershipDates, as_of: NaiveDate) -> bool {
        if let Some(starts) = &self.starts {
            match starts.resolve(dates) {
                Some(from) if as_of >= from => {}
                _ => return false,
            }
        }

        if let Some(ends) = &self.ends {
            match ends.resolve(dates) {
                Some(until) => {
                    if as_of > until {
                        return false;
                    }
                }
                None => {
                    let open_ended = ends.anchor == RuleAnchor::EndDate && dates.end.is_none();
                    if !open_ended {
                        return false;
                    }
                }
            }
        }

        true
    }
}
