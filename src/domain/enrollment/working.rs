//! Working parameters for one submission.
//!
//! Each pipeline step consumes the value and returns an enriched copy, so the
//! state a step sees is exactly what the previous steps produced.

use chrono::NaiveDate;

use crate::domain::catalog::{MembershipDates, MembershipType, PriceSet, StatusRule};
use crate::domain::foundation::{
    Currency, FundingId, MembershipStatusId, MembershipTypeId, Money, StateMachine,
    ValidationError,
};
use crate::domain::funding::{total_of, Cadence, LineItem};
use crate::domain::membership::{
    compute_dates, evaluate_status, ComputedDates, DateCalculationError, DateInputs,
    MembershipRecord, NoApplicableStatus, ResolvedSelection,
};

use super::{EnrollmentStage, EnrollmentSubmission};

/// Everything known about one selected membership type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypePlan {
    pub membership_type: MembershipType,
    pub status_rules: Vec<StatusRule>,
    pub num_terms: u32,

    /// `None` until dates are computed, or when there is no join date.
    pub dates: Option<Result<ComputedDates, DateCalculationError>>,

    /// Set once validation has passed.
    pub status_id: Option<MembershipStatusId>,
}

impl TypePlan {
    pub fn computed_dates(&self) -> Option<&ComputedDates> {
        self.dates.as_ref().and_then(|d| d.as_ref().ok())
    }

    pub fn membership_dates(&self) -> Option<MembershipDates> {
        self.computed_dates().map(|d| MembershipDates {
            join: Some(d.join_date),
            start: Some(d.start_date),
            end: d.end_date,
        })
    }

    /// Evaluates the rule-derived status for these dates.
    pub fn derive_status(&self, as_of: NaiveDate) -> Option<Result<&StatusRule, NoApplicableStatus>> {
        self.membership_dates()
            .map(|dates| evaluate_status(&self.status_rules, &dates, as_of, false))
    }
}

/// Accumulated state of one enrollment.
#[derive(Debug, Clone)]
pub struct WorkingParameters {
    pub stage: EnrollmentStage,
    pub selection: ResolvedSelection,
    pub price_set: Option<PriceSet>,

    /// One plan per selected type, ascending type id.
    pub plans: Vec<TypePlan>,

    /// Record being updated, in update mode.
    pub existing: Option<MembershipRecord>,

    /// Type whose cadence drives the recurring agreement.
    pub cadence: Option<(MembershipTypeId, Cadence)>,

    /// Id reserved for the funding record of this submission.
    pub funding_id: FundingId,
    pub line_items: Vec<LineItem>,
    pub total: Option<Money>,

    /// Money arithmetic failure while pricing (mixed currencies, overflow).
    pub pricing_error: Option<String>,
}

impl WorkingParameters {
    pub fn new(
        selection: ResolvedSelection,
        price_set: Option<PriceSet>,
        types: Vec<(MembershipType, Vec<StatusRule>)>,
        existing: Option<MembershipRecord>,
    ) -> Self {
        let mut plans: Vec<TypePlan> = types
            .into_iter()
            .map(|(membership_type, status_rules)| TypePlan {
                membership_type,
                status_rules,
                num_terms: 1,
                dates: None,
                status_id: None,
            })
            .collect();
        plans.sort_by_key(|p| p.membership_type.id);

        Self {
            stage: EnrollmentStage::Resolving,
            selection,
            price_set,
            plans,
            existing,
            cadence: None,
            funding_id: FundingId::new(),
            line_items: Vec::new(),
            total: None,
            pricing_error: None,
        }
    }

    /// Moves to `stage`.
    pub fn advance(mut self, stage: EnrollmentStage) -> Result<Self, ValidationError> {
        self.stage = self.stage.transition_to(stage)?;
        Ok(self)
    }

    pub fn plan(&self, membership_type_id: MembershipTypeId) -> Option<&TypePlan> {
        self.plans
            .iter()
            .find(|p| p.membership_type.id == membership_type_id)
    }

    /// Picks the recurring cadence when auto-renew is requested: the
    /// lowest-id selected type that allows auto-renew and has a finite
    /// duration.
    pub fn with_cadence(mut self, auto_renew: bool) -> Self {
        self.cadence = if auto_renew {
            self.plans.iter().find_map(|plan| {
                let t = &plan.membership_type;
                if t.auto_renew.allows_auto_renew() {
                    Cadence::of(t).map(|c| (t.id, c))
                } else {
                    None
                }
            })
        } else {
            None
        };
        self
    }

    /// Computes per-type dates. Term counts come from catalog line items
    /// when present, else from the submitted count, else 1.
    pub fn with_dates(mut self, submission: &EnrollmentSubmission) -> Self {
        let join_date = submission.join_date;

        for plan in &mut self.plans {
            let type_id = plan.membership_type.id;
            plan.num_terms = self
                .selection
                .types
                .terms_for(type_id)
                .or(submission.num_terms)
                .unwrap_or(1)
                .max(1);
            plan.dates = join_date.map(|join_date| {
                compute_dates(
                    &plan.membership_type,
                    DateInputs {
                        join_date,
                        start_date: submission.start_date,
                        end_date: submission.end_date,
                        num_terms: plan.num_terms,
                    },
                )
            });
        }
        self
    }

    /// Builds line items and the total. The catalog path prices every picked
    /// option; the direct path has one line per type, priced at the submitted
    /// total or the type's minimum fee.
    pub fn with_line_items(mut self, submission: &EnrollmentSubmission) -> Self {
        let funding_id = self.funding_id;
        let submitted_total = submission
            .payment
            .as_ref()
            .and_then(|p| p.total_amount.clone());

        let built: Result<Vec<LineItem>, ValidationError> = match &self.price_set {
            Some(price_set) => {
                let fallback = price_set.financial_type_id.or_else(|| {
                    self.plans
                        .first()
                        .map(|p| p.membership_type.financial_type_id)
                });
                self.selection
                    .options
                    .iter()
                    .map(|selected| match fallback {
                        Some(ft) => LineItem::from_option(funding_id, selected, ft),
                        None => Err(ValidationError::empty_field("financial_type_id")),
                    })
                    .collect()
            }
            None => self
                .plans
                .iter()
                .map(|plan| {
                    let amount = submitted_total
                        .clone()
                        .unwrap_or_else(|| plan.membership_type.minimum_fee.clone());
                    LineItem::for_membership_type(
                        funding_id,
                        &plan.membership_type,
                        amount,
                        plan.num_terms,
                    )
                })
                .collect(),
        };

        match built.and_then(|lines| total_of(&lines).map(|total| (lines, total))) {
            Ok((lines, total)) => {
                self.line_items = lines;
                self.total = match &self.price_set {
                    Some(_) => total,
                    None => submitted_total.or(total),
                };
            }
            Err(err) => {
                self.pricing_error = Some(err.to_string());
            }
        }
        self
    }

    /// Fixes each type's status once validation has passed. With an override
    /// the submitted status is used as-is; otherwise the rules decide.
    pub fn with_statuses(
        mut self,
        submission: &EnrollmentSubmission,
        as_of: NaiveDate,
    ) -> Result<Self, NoApplicableStatus> {
        let pinned = submission.resolved_override().is_set();
        for plan in &mut self.plans {
            let status_id = if pinned {
                submission.status_id
            } else {
                match plan.derive_status(as_of) {
                    Some(rule) => Some(rule?.status_id),
                    None => None,
                }
            };
            plan.status_id = status_id;
        }
        Ok(self)
    }

    /// Currency every amount in this submission is expressed in.
    pub fn currency(&self, fallback: &Currency) -> Currency {
        self.total
            .as_ref()
            .map(|t| t.currency.clone())
            .unwrap_or_else(|| fallback.clone())
    }

    pub fn type_names(&self) -> Vec<&str> {
        self.plans
            .iter()
            .map(|p| p.membership_type.name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{AutoRenewPolicy, DurationUnit, PeriodType};
    use crate::domain::foundation::{CalendarUnit, ContactId, FinancialTypeId};
    use crate::domain::membership::resolve_direct;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn usd(minor: i64) -> Money {
        Money::new(minor, Currency::new("USD").unwrap())
    }

    fn membership_type(id: i64, auto_renew: AutoRenewPolicy) -> MembershipType {
        MembershipType {
            id: MembershipTypeId::new(id),
            name: format!("Type {}", id),
            owner_organization_id: ContactId::new(id),
            period_type: PeriodType::Rolling,
            duration_unit: DurationUnit::Month,
            duration_interval: id as u32,
            auto_renew,
            financial_type_id: FinancialTypeId::new(2),
            minimum_fee: usd(1000 * id),
            max_related: None,
        }
    }

    fn params(types: Vec<MembershipType>) -> WorkingParameters {
        let mut selection = ResolvedSelection::default();
        for t in &types {
            selection.types.insert(t.id, None);
        }
        WorkingParameters::new(
            selection,
            None,
            types.into_iter().map(|t| (t, Vec::new())).collect(),
            None,
        )
    }

    #[test]
    fn lowest_eligible_type_sets_cadence() {
        let p = params(vec![
            membership_type(3, AutoRenewPolicy::Optional),
            membership_type(1, AutoRenewPolicy::NotOffered),
            membership_type(2, AutoRenewPolicy::Required),
        ])
        .with_cadence(true);
        assert_eq!(
            p.cadence,
            Some((
                MembershipTypeId::new(2),
                Cadence {
                    unit: CalendarUnit::Month,
                    interval: 2
                }
            ))
        );
    }

    #[test]
    fn no_cadence_without_auto_renew() {
        let p = params(vec![membership_type(2, AutoRenewPolicy::Required)]).with_cadence(false);
        assert_eq!(p.cadence, None);
    }

    #[test]
    fn submitted_terms_apply_to_direct_selection() {
        let t = membership_type(1, AutoRenewPolicy::NotOffered);
        let mut submission = EnrollmentSubmission::direct(ContactId::new(9), t.id);
        submission.join_date = Some(d(2024, 1, 1));
        submission.num_terms = Some(3);
        let p = WorkingParameters::new(resolve_direct(t.id, None), None, vec![(t, Vec::new())], None)
            .with_dates(&submission);
        let plan = &p.plans[0];
        assert_eq!(plan.num_terms, 3);
        assert_eq!(plan.computed_dates().unwrap().end_date, Some(d(2024, 3, 31)));
    }

    #[test]
    fn missing_join_date_leaves_dates_unset() {
        let t = membership_type(1, AutoRenewPolicy::NotOffered);
        let submission = EnrollmentSubmission::direct(ContactId::new(9), t.id);
        let p = params(vec![t]).with_dates(&submission);
        assert!(p.plans[0].dates.is_none());
    }

    #[test]
    fn direct_path_defaults_to_minimum_fee() {
        let t = membership_type(2, AutoRenewPolicy::NotOffered);
        let submission = EnrollmentSubmission::direct(ContactId::new(9), t.id);
        let p = params(vec![t]).with_line_items(&submission);
        assert_eq!(p.line_items.len(), 1);
        assert_eq!(p.total, Some(usd(2000)));
        assert_eq!(p.line_items[0].funding_id, p.funding_id);
    }

    #[test]
    fn stages_advance_in_order() {
        let p = params(vec![membership_type(1, AutoRenewPolicy::NotOffered)]);
        let p = p.advance(EnrollmentStage::Validating).unwrap();
        assert_eq!(p.stage, EnrollmentStage::Validating);
        assert!(p.advance(EnrollmentStage::Done).is_err());
    }
}
