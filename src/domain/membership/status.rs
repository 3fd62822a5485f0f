//! Status rule evaluation.

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::catalog::{MembershipDates, StatusRule};

/// No configured status covers the given dates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("There is no valid Membership Status available for selected membership dates.")]
pub struct NoApplicableStatus;

/// Returns the first active rule, in weight order, whose window contains
/// `as_of`.
///
/// Admin-only rules are skipped unless `include_admin` is set, which only
/// happens when a status override is in effect. Rules with equal weight keep
/// their configured order.
pub fn evaluate_status<'a>(
    rules: &'a [StatusRule],
    dates: &MembershipDates,
    as_of: NaiveDate,
    include_admin: bool,
) -> Result<&'a StatusRule, NoApplicableStatus> {
    let mut ordered: Vec<&StatusRule> = rules
        .iter()
        .filter(|rule| rule.is_active && (include_admin || !rule.is_admin))
        .collect();
    ordered.sort_by_key(|rule| rule.weight);

    ordered
        .into_iter()
        .find(|rule| rule.window_contains(dates, as_of))
        .ok_or(NoApplicableStatus)
}

/// The reserved pending status, if configured.
pub fn pending_status(rules: &[StatusRule]) -> Option<&StatusRule> {
    rules.iter().find(|rule| rule.is_pending())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{RuleAnchor, RuleBoundary};
    use crate::domain::foundation::{CalendarUnit, MembershipStatusId};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn rule(
        id: i64,
        name: &str,
        weight: i32,
        starts: Option<RuleBoundary>,
        ends: Option<RuleBoundary>,
    ) -> StatusRule {
        StatusRule {
            status_id: MembershipStatusId::new(id),
            name: name.into(),
            starts,
            ends,
            is_current_member: true,
            is_admin: false,
            is_active: true,
            weight,
        }
    }

    fn standard_rules() -> Vec<StatusRule> {
        let mut expired = rule(
            4,
            "Expired",
            4,
            Some(RuleBoundary::offset(RuleAnchor::EndDate, CalendarUnit::Month, 1)),
            None,
        );
        expired.is_current_member = false;
        let mut pending = rule(5, "Pending", 5, None, None);
        pending.is_admin = true;
        pending.is_current_member = false;
        vec![
            rule(
                2,
                "Current",
                2,
                Some(RuleBoundary::offset(RuleAnchor::JoinDate, CalendarUnit::Month, 3)),
                Some(RuleBoundary::at(RuleAnchor::EndDate)),
            ),
            rule(
                1,
                "New",
                1,
                Some(RuleBoundary::at(RuleAnchor::JoinDate)),
                Some(RuleBoundary::offset(RuleAnchor::JoinDate, CalendarUnit::Month, 3)),
            ),
            rule(
                3,
                "Grace",
                3,
                Some(RuleBoundary::at(RuleAnchor::EndDate)),
                Some(RuleBoundary::offset(RuleAnchor::EndDate, CalendarUnit::Month, 1)),
            ),
            expired,
            pending,
        ]
    }

    fn dates() -> MembershipDates {
        MembershipDates {
            join: Some(d(2024, 1, 1)),
            start: Some(d(2024, 1, 1)),
            end: Some(d(2024, 12, 31)),
        }
    }

    #[test]
    fn evaluates_in_weight_order() {
        let rules = standard_rules();
        let status = evaluate_status(&rules, &dates(), d(2024, 2, 1), false).unwrap();
        assert_eq!(status.name, "New");
        let status = evaluate_status(&rules, &dates(), d(2024, 6, 1), false).unwrap();
        assert_eq!(status.name, "Current");
        let status = evaluate_status(&rules, &dates(), d(2025, 1, 15), false).unwrap();
        assert_eq!(status.name, "Grace");
        let status = evaluate_status(&rules, &dates(), d(2025, 3, 1), false).unwrap();
        assert_eq!(status.name, "Expired");
    }

    #[test]
    fn admin_rules_need_override() {
        let mut rules = standard_rules();
        rules.retain(|r| r.is_admin);
        assert_eq!(
            evaluate_status(&rules, &dates(), d(2024, 2, 1), false),
            Err(NoApplicableStatus)
        );
        let status = evaluate_status(&rules, &dates(), d(2024, 2, 1), true).unwrap();
        assert_eq!(status.name, "Pending");
    }

    #[test]
    fn dates_before_any_window_have_no_status() {
        let rules = standard_rules();
        let result = evaluate_status(&rules, &dates(), d(2023, 6, 1), false);
        assert_eq!(result, Err(NoApplicableStatus));
    }

    #[test]
    fn inactive_rules_are_ignored() {
        let mut rules = standard_rules();
        rules.iter_mut().for_each(|r| r.is_active = r.name != "New");
        let status = evaluate_status(&rules, &dates(), d(2024, 2, 1), false);
        assert_eq!(status, Err(NoApplicableStatus));
    }

    #[test]
    fn finds_pending_status() {
        let rules = standard_rules();
        assert_eq!(pending_status(&rules).unwrap().status_id, MembershipStatusId::new(5));
    }
}
