//! Submission validation.
//!
//! Every check runs and every failure is collected before returning, so the
//! submitter sees all problems at once. Date and status checks for a type
//! stop at that type's first failure: a type with a broken date window is
//! never handed to status evaluation.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::catalog::FieldCardinality;
use crate::domain::foundation::{ContactId, Currency, MembershipTypeId, PriceFieldId};
use crate::domain::funding::FundingStatus;

use super::{
    EnrollmentSubmission, FieldErrors, OverrideRequest, PaymentMode, SubmissionField,
    WorkingParameters,
};

/// Read-only view of everything validation looks at.
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub submission: &'a EnrollmentSubmission,
    pub params: &'a WorkingParameters,
    pub today: NaiveDate,
    pub default_currency: &'a Currency,
}

/// Pure submission validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationEngine;

impl ValidationEngine {
    /// Returns all field errors; empty means valid. Never mutates anything.
    pub fn validate(&self, input: &ValidationInput<'_>) -> FieldErrors {
        let mut errors = FieldErrors::new();
        check_selection(input, &mut errors);
        check_catalog_groups(input, &mut errors);
        check_terms(input, &mut errors);
        check_override(input, &mut errors);
        check_dates_and_status(input, &mut errors);
        check_payment(input, &mut errors);
        check_auto_renew(input, &mut errors);
        errors
    }
}

fn check_selection(input: &ValidationInput<'_>, errors: &mut FieldErrors) {
    let submission = input.submission;
    let params = input.params;

    if submission.membership_type_id.is_some() && submission.price_set_id.is_some() {
        errors.add(
            SubmissionField::MembershipType,
            "Choose either a membership type or a price set, not both.",
        );
    }

    if params.selection.types.is_empty() {
        if submission.uses_catalog() {
            errors.add(SubmissionField::PriceSet, "Select at least one membership option.");
        } else {
            errors.add(SubmissionField::MembershipType, "Please select a membership type.");
        }
    }

    if submission.uses_catalog() && submission.payment.is_none() {
        errors.add(
            SubmissionField::RecordPayment,
            "Record Membership Payment is required when you use a price set.",
        );
    }

    if submission.is_update() {
        if params.existing.is_none() {
            errors.add(SubmissionField::MembershipId, "The membership to update does not exist.");
        }
        if params.selection.types.len() > 1 {
            errors.add(
                SubmissionField::MembershipType,
                "Select exactly one membership type when updating a membership.",
            );
        }
    }

    let mut by_owner: BTreeMap<ContactId, usize> = BTreeMap::new();
    for plan in &params.plans {
        *by_owner
            .entry(plan.membership_type.owner_organization_id)
            .or_default() += 1;
    }
    if by_owner.values().any(|count| *count > 1) {
        errors.add(
            SubmissionField::MembershipType,
            "Please do not select more than one membership associated with the same organization.",
        );
    }
}

fn check_catalog_groups(input: &ValidationInput<'_>, errors: &mut FieldErrors) {
    let Some(price_set) = input.params.price_set.as_ref() else {
        return;
    };

    for (field_id, choices) in &input.submission.catalog_selections {
        let exclusive = price_set
            .field(*field_id)
            .map_or(false, |f| f.cardinality == FieldCardinality::Exclusive);
        if exclusive && choices.len() > 1 {
            errors.add(
                SubmissionField::PriceField(*field_id),
                "Select at most one option in this group.",
            );
        }
    }

    let mut seen: BTreeMap<MembershipTypeId, PriceFieldId> = BTreeMap::new();
    for selected in &input.params.selection.options {
        if selected.is_enter_qty {
            continue;
        }
        let Some(type_id) = selected.option.membership_type_id else {
            continue;
        };
        if seen.insert(type_id, selected.field_id).is_some() {
            errors.add(
                SubmissionField::PriceField(selected.field_id),
                "Select at most one option associated with the same membership type.",
            );
        }
    }
}

fn check_terms(input: &ValidationInput<'_>, errors: &mut FieldErrors) {
    if input.submission.num_terms == Some(0) {
        errors.add(
            SubmissionField::NumTerms,
            "Please enter an integer for the number of terms.",
        );
    }
}

fn check_override(input: &ValidationInput<'_>, errors: &mut FieldErrors) {
    let submission = input.submission;
    if submission.status_override == OverrideRequest::None {
        return;
    }
    if submission.status_id.is_none() {
        errors.add(SubmissionField::Status, "Please enter the Membership status.");
    }
    if submission.status_override == OverrideRequest::UntilDate
        && submission.status_override_end_date.is_none()
    {
        errors.add(
            SubmissionField::StatusOverrideEndDate,
            "Please enter the Membership override end date.",
        );
    }
}

fn check_dates_and_status(input: &ValidationInput<'_>, errors: &mut FieldErrors) {
    let submission = input.submission;

    // Lifetime types take an explicit end only through the override checks below
    let term_limited = input
        .params
        .plans
        .iter()
        .any(|plan| !plan.membership_type.is_lifetime());
    if term_limited && submission.end_date.is_some() && submission.start_date.is_none() {
        errors.add(SubmissionField::StartDate, "Start date must be set if end date is set.");
    }

    if submission.join_date.is_none() {
        errors.add(SubmissionField::JoinDate, "Please enter the Member Since.");
        return;
    }

    let pinned = submission.status_override != OverrideRequest::None;

    for plan in &input.params.plans {
        let membership_type = &plan.membership_type;

        let dates = match &plan.dates {
            Some(Ok(dates)) => dates,
            Some(Err(err)) => {
                errors.add(SubmissionField::StartDate, err.to_string());
                continue;
            }
            None => continue,
        };

        if let Some(end) = dates.end_date {
            if end < dates.start_date {
                errors.add(
                    SubmissionField::EndDate,
                    "End date must be the same or later than start date.",
                );
                continue;
            }
        }

        if membership_type.is_rolling() && dates.start_date < dates.join_date {
            errors.add(
                SubmissionField::StartDate,
                "Start date must be the same or later than Member since.",
            );
            continue;
        }

        if membership_type.is_lifetime() && submission.end_date.is_some() {
            let mut lifetime_ok = true;
            if submission.status_override != OverrideRequest::Indefinite {
                errors.add(
                    SubmissionField::StatusOverride,
                    "The status override must be permanent when setting an end date on a lifetime membership.",
                );
                lifetime_ok = false;
            }
            let current = submission.status_id.map_or(true, |status_id| {
                plan.status_rules
                    .iter()
                    .find(|rule| rule.status_id == status_id)
                    .map_or(true, |rule| rule.is_current_member)
            });
            if current {
                errors.add(
                    SubmissionField::Status,
                    "A lifetime membership with an end date must have a non-current status.",
                );
                lifetime_ok = false;
            }
            if !lifetime_ok {
                continue;
            }
        }

        if !pinned {
            if let Some(Err(err)) = plan.derive_status(input.today) {
                errors.add(SubmissionField::JoinDate, err.to_string());
            }
        }
    }
}

fn check_payment(input: &ValidationInput<'_>, errors: &mut FieldErrors) {
    let Some(payment) = input.submission.payment.as_ref() else {
        return;
    };
    let params = input.params;

    if let Some(reason) = &params.pricing_error {
        errors.add(SubmissionField::TotalAmount, reason.clone());
    }

    match payment.mode {
        PaymentMode::RecordOnly => {
            if payment.payment_instrument_id.is_none() {
                errors.add(SubmissionField::PaymentInstrument, "Payment Method is a required field.");
            }
            let has_amount = params.total.as_ref().map_or(false, |t| t.is_positive());
            if !has_amount {
                errors.add(SubmissionField::TotalAmount, "Please enter the contribution.");
            }
            if payment.contribution_status == FundingStatus::Failed
                || payment.contribution_status == FundingStatus::Cancelled
            {
                errors.add(
                    SubmissionField::RecordPayment,
                    "A recorded payment must be completed or pending.",
                );
            }
        }
        PaymentMode::LiveCharge | PaymentMode::TestCharge => {
            if payment.billing.is_none() {
                errors.add(SubmissionField::Billing, "Billing details are required to charge a card.");
            }
            if params.total.as_ref().map_or(false, |t| t.minor_units < 0) {
                errors.add(SubmissionField::TotalAmount, "The amount to charge cannot be negative.");
            }
        }
    }

    let expected = payment
        .currency
        .clone()
        .unwrap_or_else(|| input.default_currency.clone());
    if let Some(total) = &params.total {
        if total.currency != expected {
            errors.add(
                SubmissionField::Currency,
                format!("Amounts are in {} but the payment is in {}.", total.currency, expected),
            );
        }
    }

    if let Some(payer) = &payment.payer {
        if payer.contact_id != input.submission.contact_id && payer.soft_credit_type_id.is_none() {
            errors.add(SubmissionField::SoftCreditType, "Please select a soft credit type.");
        }
    }
}

fn check_auto_renew(input: &ValidationInput<'_>, errors: &mut FieldErrors) {
    let submission = input.submission;
    if !submission.auto_renew {
        return;
    }
    if input.params.cadence.is_none() {
        errors.add(
            SubmissionField::AutoRenew,
            "None of the selected membership types can be renewed automatically.",
        );
    } else if !submission.payment_mode().map_or(false, |m| m.is_charge()) {
        errors.add(
            SubmissionField::AutoRenew,
            "Auto-renew requires a credit card or direct debit payment.",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{
        AutoRenewPolicy, DurationUnit, MembershipType, PeriodType, PriceField, PriceOption,
        PriceSet, RuleAnchor, RuleBoundary, StatusRule,
    };
    use crate::domain::enrollment::{PayerDetails, PaymentDetails};
    use crate::domain::foundation::{
        FinancialTypeId, MembershipStatusId, Money, PaymentInstrumentId, PriceOptionId,
        PriceSetId, SoftCreditTypeId,
    };
    use crate::domain::membership::{resolve_catalog, resolve_direct, CatalogChoice};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn usd() -> Currency {
        Currency::new("USD").unwrap()
    }

    fn rules() -> Vec<StatusRule> {
        vec![
            StatusRule {
                status_id: MembershipStatusId::new(1),
                name: "Current".into(),
                starts: Some(RuleBoundary::at(RuleAnchor::StartDate)),
                ends: Some(RuleBoundary::at(RuleAnchor::EndDate)),
                is_current_member: true,
                is_admin: false,
                is_active: true,
                weight: 1,
            },
            StatusRule {
                status_id: MembershipStatusId::new(6),
                name: "Deceased".into(),
                starts: None,
                ends: None,
                is_current_member: false,
                is_admin: true,
                is_active: true,
                weight: 6,
            },
        ]
    }

    fn membership_type(id: i64, owner: i64, unit: DurationUnit) -> MembershipType {
        MembershipType {
            id: MembershipTypeId::new(id),
            name: format!("Type {}", id),
            owner_organization_id: ContactId::new(owner),
            period_type: PeriodType::Rolling,
            duration_unit: unit,
            duration_interval: 1,
            auto_renew: AutoRenewPolicy::NotOffered,
            financial_type_id: FinancialTypeId::new(2),
            minimum_fee: Money::new(5000, usd()),
            max_related: None,
        }
    }

    fn record_payment() -> PaymentDetails {
        PaymentDetails {
            mode: PaymentMode::RecordOnly,
            total_amount: Some(Money::new(5000, usd())),
            currency: None,
            financial_type_id: None,
            payment_instrument_id: Some(PaymentInstrumentId::new(1)),
            contribution_status: FundingStatus::Completed,
            receive_date: None,
            transaction_id: None,
            invoice_id: None,
            check_number: None,
            fee_amount: None,
            payer: None,
            billing: None,
        }
    }

    fn direct(t: MembershipType, submission: &EnrollmentSubmission) -> WorkingParameters {
        WorkingParameters::new(resolve_direct(t.id, None), None, vec![(t, rules())], None)
            .with_cadence(submission.auto_renew)
            .with_dates(submission)
            .with_line_items(submission)
    }

    fn validate(submission: &EnrollmentSubmission, params: &WorkingParameters) -> FieldErrors {
        let currency = usd();
        ValidationEngine.validate(&ValidationInput {
            submission,
            params,
            today: d(2024, 2, 1),
            default_currency: &currency,
        })
    }

    fn base_submission() -> EnrollmentSubmission {
        let mut submission = EnrollmentSubmission::direct(ContactId::new(50), MembershipTypeId::new(1));
        submission.join_date = Some(d(2024, 1, 1));
        submission
    }

    #[test]
    fn valid_direct_submission_has_no_errors() {
        let submission = base_submission();
        let params = direct(membership_type(1, 100, DurationUnit::Year), &submission);
        assert!(validate(&submission, &params).is_empty());
    }

    #[test]
    fn missing_join_date_is_reported() {
        let mut submission = base_submission();
        submission.join_date = None;
        let params = direct(membership_type(1, 100, DurationUnit::Year), &submission);
        let errors = validate(&submission, &params);
        assert_eq!(errors.get(SubmissionField::JoinDate), Some("Please enter the Member Since."));
    }

    #[test]
    fn collects_independent_errors_together() {
        let mut submission = base_submission();
        submission.num_terms = Some(0);
        submission.end_date = Some(d(2024, 6, 1));
        let mut payment = record_payment();
        payment.payment_instrument_id = None;
        submission.payment = Some(payment);
        let params = direct(membership_type(1, 100, DurationUnit::Year), &submission);
        let errors = validate(&submission, &params);
        assert!(errors.contains(SubmissionField::NumTerms));
        assert!(errors.contains(SubmissionField::StartDate));
        assert!(errors.contains(SubmissionField::PaymentInstrument));
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut submission = base_submission();
        submission.start_date = Some(d(2024, 3, 1));
        submission.end_date = Some(d(2024, 2, 1));
        let params = direct(membership_type(1, 100, DurationUnit::Year), &submission);
        let errors = validate(&submission, &params);
        assert_eq!(
            errors.get(SubmissionField::EndDate),
            Some("End date must be the same or later than start date.")
        );
    }

    #[test]
    fn rolling_start_before_join_is_rejected() {
        let mut submission = base_submission();
        submission.start_date = Some(d(2023, 12, 1));
        let params = direct(membership_type(1, 100, DurationUnit::Year), &submission);
        let errors = validate(&submission, &params);
        assert_eq!(
            errors.get(SubmissionField::StartDate),
            Some("Start date must be the same or later than Member since.")
        );
    }

    #[test]
    fn no_applicable_status_is_a_join_date_error() {
        let mut submission = base_submission();
        submission.join_date = Some(d(2024, 6, 1));
        let params = direct(membership_type(1, 100, DurationUnit::Year), &submission);
        let errors = validate(&submission, &params);
        assert_eq!(
            errors.get(SubmissionField::JoinDate),
            Some("There is no valid Membership Status available for selected membership dates.")
        );
    }

    #[test]
    fn override_skips_status_evaluation() {
        let mut submission = base_submission();
        submission.join_date = Some(d(2024, 6, 1));
        submission.status_override = OverrideRequest::Indefinite;
        submission.status_id = Some(MembershipStatusId::new(1));
        let params = direct(membership_type(1, 100, DurationUnit::Year), &submission);
        assert!(validate(&submission, &params).is_empty());
    }

    #[test]
    fn lifetime_end_date_needs_permanent_non_current_override() {
        let mut submission = base_submission();
        submission.start_date = Some(d(2024, 1, 1));
        submission.end_date = Some(d(2024, 12, 31));
        submission.status_override = OverrideRequest::UntilDate;
        submission.status_override_end_date = Some(d(2024, 12, 31));
        submission.status_id = Some(MembershipStatusId::new(1));
        let params = direct(membership_type(1, 100, DurationUnit::Lifetime), &submission);
        let errors = validate(&submission, &params);
        assert!(errors.contains(SubmissionField::StatusOverride));
        assert!(errors.contains(SubmissionField::Status));

        submission.status_override = OverrideRequest::Indefinite;
        submission.status_id = Some(MembershipStatusId::new(6));
        let params = direct(membership_type(1, 100, DurationUnit::Lifetime), &submission);
        assert!(validate(&submission, &params).is_empty());
    }

    #[test]
    fn lifetime_end_date_does_not_need_a_start_date() {
        let mut submission = base_submission();
        submission.end_date = Some(d(2024, 12, 31));
        submission.status_override = OverrideRequest::Indefinite;
        submission.status_id = Some(MembershipStatusId::new(6));
        let params = direct(membership_type(1, 100, DurationUnit::Lifetime), &submission);
        assert!(validate(&submission, &params).is_empty());

        let params = direct(membership_type(1, 100, DurationUnit::Year), &submission);
        assert_eq!(
            validate(&submission, &params).get(SubmissionField::StartDate),
            Some("Start date must be set if end date is set.")
        );
    }

    #[test]
    fn type_and_price_set_are_mutually_exclusive() {
        let mut submission = base_submission();
        submission.price_set_id = Some(PriceSetId::new(1));
        submission.payment = Some(record_payment());
        let params = direct(membership_type(1, 100, DurationUnit::Year), &submission);
        assert_eq!(
            validate(&submission, &params).get(SubmissionField::MembershipType),
            Some("Choose either a membership type or a price set, not both.")
        );
    }

    #[test]
    fn charge_needs_billing_details() {
        let mut submission = base_submission();
        let mut payment = record_payment();
        payment.mode = PaymentMode::LiveCharge;
        submission.payment = Some(payment);
        let params = direct(membership_type(1, 100, DurationUnit::Year), &submission);
        let errors = validate(&submission, &params);
        assert_eq!(
            errors.get(SubmissionField::Billing),
            Some("Billing details are required to charge a card.")
        );
        assert!(!errors.contains(SubmissionField::PaymentInstrument));
    }

    #[test]
    fn payment_currency_must_match_amounts() {
        let mut submission = base_submission();
        let mut payment = record_payment();
        payment.currency = Some(Currency::new("EUR").unwrap());
        submission.payment = Some(payment);
        let params = direct(membership_type(1, 100, DurationUnit::Year), &submission);
        assert_eq!(
            validate(&submission, &params).get(SubmissionField::Currency),
            Some("Amounts are in USD but the payment is in EUR.")
        );
    }

    #[test]
    fn override_requires_status_and_until_date() {
        let mut submission = base_submission();
        submission.status_override = OverrideRequest::UntilDate;
        let params = direct(membership_type(1, 100, DurationUnit::Year), &submission);
        let errors = validate(&submission, &params);
        assert_eq!(errors.get(SubmissionField::Status), Some("Please enter the Membership status."));
        assert_eq!(
            errors.get(SubmissionField::StatusOverrideEndDate),
            Some("Please enter the Membership override end date.")
        );
    }

    #[test]
    fn record_only_requires_positive_total() {
        let mut submission = base_submission();
        let mut payment = record_payment();
        payment.total_amount = Some(Money::new(0, usd()));
        submission.payment = Some(payment);
        let params = direct(membership_type(1, 100, DurationUnit::Year), &submission);
        let errors = validate(&submission, &params);
        assert_eq!(errors.get(SubmissionField::TotalAmount), Some("Please enter the contribution."));
    }

    #[test]
    fn distinct_payer_needs_soft_credit_type() {
        let mut submission = base_submission();
        let mut payment = record_payment();
        payment.payer = Some(PayerDetails {
            contact_id: ContactId::new(77),
            soft_credit_type_id: None,
        });
        submission.payment = Some(payment.clone());
        let params = direct(membership_type(1, 100, DurationUnit::Year), &submission);
        assert!(validate(&submission, &params).contains(SubmissionField::SoftCreditType));

        payment.payer = Some(PayerDetails {
            contact_id: ContactId::new(77),
            soft_credit_type_id: Some(SoftCreditTypeId::new(1)),
        });
        submission.payment = Some(payment);
        let params = direct(membership_type(1, 100, DurationUnit::Year), &submission);
        assert!(validate(&submission, &params).is_empty());
    }

    #[test]
    fn auto_renew_needs_eligible_type() {
        let mut submission = base_submission();
        submission.auto_renew = true;
        let params = direct(membership_type(1, 100, DurationUnit::Year), &submission);
        assert_eq!(
            validate(&submission, &params).get(SubmissionField::AutoRenew),
            Some("None of the selected membership types can be renewed automatically.")
        );
    }

    fn catalog() -> PriceSet {
        let option = |id: i64, type_id: i64| PriceOption {
            id: PriceOptionId::new(id),
            label: format!("Option {}", id),
            amount: Money::new(2500, usd()),
            membership_type_id: Some(MembershipTypeId::new(type_id)),
            membership_num_terms: None,
            financial_type_id: None,
            tax_rate_basis_points: None,
        };
        PriceSet {
            id: PriceSetId::new(1),
            title: "Levels".into(),
            is_quick_config: false,
            financial_type_id: Some(FinancialTypeId::new(2)),
            fields: vec![
                PriceField {
                    id: PriceFieldId::new(10),
                    label: "Chapter".into(),
                    is_enter_qty: false,
                    cardinality: FieldCardinality::Exclusive,
                    options: vec![option(100, 1), option(101, 1)],
                },
                PriceField {
                    id: PriceFieldId::new(11),
                    label: "National".into(),
                    is_enter_qty: false,
                    cardinality: FieldCardinality::Multiple,
                    options: vec![option(110, 2)],
                },
            ],
        }
    }

    fn catalog_submission(picks: &[(i64, i64)]) -> EnrollmentSubmission {
        let mut submission = base_submission();
        submission.membership_type_id = None;
        submission.price_set_id = Some(PriceSetId::new(1));
        for (field, option) in picks {
            submission
                .catalog_selections
                .entry(PriceFieldId::new(*field))
                .or_default()
                .push(CatalogChoice::single(PriceOptionId::new(*option)));
        }
        let mut payment = record_payment();
        payment.total_amount = None;
        submission.payment = Some(payment);
        submission
    }

    fn catalog_params(
        submission: &EnrollmentSubmission,
        types: Vec<MembershipType>,
    ) -> WorkingParameters {
        let price_set = catalog();
        let selection = resolve_catalog(&price_set, &submission.catalog_selections).unwrap();
        WorkingParameters::new(
            selection,
            Some(price_set),
            types.into_iter().map(|t| (t, rules())).collect(),
            None,
        )
        .with_dates(submission)
        .with_line_items(submission)
    }

    #[test]
    fn same_organization_types_collide() {
        let submission = catalog_submission(&[(10, 100), (11, 110)]);
        let params = catalog_params(
            &submission,
            vec![
                membership_type(1, 100, DurationUnit::Year),
                membership_type(2, 100, DurationUnit::Year),
            ],
        );
        let errors = validate(&submission, &params);
        assert_eq!(
            errors.get(SubmissionField::MembershipType),
            Some("Please do not select more than one membership associated with the same organization.")
        );
    }

    #[test]
    fn exclusive_group_and_duplicate_type_are_rejected() {
        let submission = catalog_submission(&[(10, 100), (10, 101)]);
        let params = catalog_params(&submission, vec![membership_type(1, 100, DurationUnit::Year)]);
        let errors = validate(&submission, &params);
        assert_eq!(
            errors.get(SubmissionField::PriceField(PriceFieldId::new(10))),
            Some("Select at most one option in this group.")
        );
        assert_eq!(params.selection.types.len(), 1);
    }

    #[test]
    fn catalog_needs_payment() {
        let mut submission = catalog_submission(&[(11, 110)]);
        submission.payment = None;
        let params = catalog_params(&submission, vec![membership_type(2, 200, DurationUnit::Year)]);
        assert!(validate(&submission, &params).contains(SubmissionField::RecordPayment));
    }

    #[test]
    fn empty_catalog_selection_is_an_error() {
        let submission = catalog_submission(&[]);
        let params = catalog_params(&submission, vec![]);
        assert_eq!(
            validate(&submission, &params).get(SubmissionField::PriceSet),
            Some("Select at least one membership option.")
        );
    }
}
