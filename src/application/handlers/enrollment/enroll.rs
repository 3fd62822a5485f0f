//! EnrollMembershipHandler - runs one enrollment submission end to end.
//!
//! Resolving -> Validating -> Charging (optional) -> Persisting -> Notifying -> Done.
//! Validation failures write nothing. Gateway failures are compensated by the
//! `PaymentCoordinator`. Membership and funding writes share one storage
//! transaction. Receipt failures only add warnings.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::EnrollmentSettings;
use crate::domain::enrollment::{
    EnrollmentStage, EnrollmentSubmission, FieldErrors, MembershipSummary, MessageComposer,
    PaymentDetails, PaymentMode, StatusSummary, SubmissionField, ValidationEngine,
    ValidationInput, WorkingParameters,
};
use crate::domain::foundation::{
    ContactId, DomainError, ErrorCode, MembershipId, MembershipStatusId, MembershipTypeId, Money,
    RecurringFundingId, RequestContext, StateMachine,
};
use crate::domain::funding::{
    Cadence, FundingRecord, FundingStatus, LineItem, NewFunding, RecurringFundingRecord,
    SoftCreditEntry,
};
use crate::domain::membership::{
    pending_status, resolve_catalog, resolve_direct, MembershipRecord, MembershipTerms,
};
use crate::ports::{
    CatalogReader, ChargeRequest, ChargeStatus, Contact, ContactDirectory, EnrollmentStore,
    LeaseToken, MembershipLease, ReceiptRequest, ReceiptSender, RecurringTerms,
};

use super::error::EnrollmentError;
use super::payment_coordinator::{contributor, AcceptedCharge, PaymentCoordinator, PendingCharge};
use super::type_change::{plan_type_change, TypeChangeEffect};

pub const NO_RECEIPT_EMAIL: &str = "No receipt was sent because the payer has no email address.";

/// Everything an enrollment produced.
#[derive(Debug, Clone)]
pub struct EnrollmentOutcome {
    pub memberships: Vec<MembershipRecord>,

    /// Contribution written (or rewritten on type change) by this submission.
    pub funding: Option<FundingRecord>,
    pub recurring: Option<RecurringFundingRecord>,
    pub line_items: Vec<LineItem>,
    pub soft_credit: Option<SoftCreditEntry>,
    pub status_message: String,
    pub warnings: Vec<String>,
    pub receipt_sent: bool,
}

enum FundingWrite {
    Insert,
    Update,
}

/// Writes that go into the enrollment transaction.
struct PersistPlan {
    funding: Option<(FundingRecord, FundingWrite)>,
    line_items: Vec<LineItem>,
    recurring: Option<RecurringFundingRecord>,

    /// Record and whether it is new.
    memberships: Vec<(MembershipRecord, bool)>,
    soft_credit: Option<SoftCreditEntry>,
    type_change: Option<TypeChangeEffect>,
}

/// How the pending status gets forced onto the memberships.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingReason {
    /// Gateway accepted but did not settle; dates are cleared.
    ChargePending,
    /// Offline payment recorded as not yet received; dates are kept.
    PaymentNotReceived,
}

pub struct EnrollMembershipHandler {
    catalog: Arc<dyn CatalogReader>,
    contacts: Arc<dyn ContactDirectory>,
    store: Arc<dyn EnrollmentStore>,
    payments: PaymentCoordinator,
    receipts: Arc<dyn ReceiptSender>,
    lease: Arc<dyn MembershipLease>,
    settings: EnrollmentSettings,
    validator: ValidationEngine,
    composer: MessageComposer,
}

impl EnrollMembershipHandler {
    pub fn new(
        catalog: Arc<dyn CatalogReader>,
        contacts: Arc<dyn ContactDirectory>,
        store: Arc<dyn EnrollmentStore>,
        payments: PaymentCoordinator,
        receipts: Arc<dyn ReceiptSender>,
        lease: Arc<dyn MembershipLease>,
        settings: EnrollmentSettings,
    ) -> Self {
        Self {
            catalog,
            contacts,
            store,
            payments,
            receipts,
            lease,
            settings,
            validator: ValidationEngine,
            composer: MessageComposer,
        }
    }

    pub async fn handle(
        &self,
        ctx: &RequestContext,
        submission: EnrollmentSubmission,
    ) -> Result<EnrollmentOutcome, EnrollmentError> {
        let span = info_span!(
            "enroll",
            request_id = %ctx.request_id,
            contact_id = %submission.contact_id,
            update = submission.is_update(),
        );
        self.run(ctx, submission).instrument(span).await
    }

    /// Updates hold the membership lease from the first read of the stored
    /// record until the transaction commits or rolls back.
    async fn run(
        &self,
        ctx: &RequestContext,
        submission: EnrollmentSubmission,
    ) -> Result<EnrollmentOutcome, EnrollmentError> {
        let mut lease = match submission.membership_id {
            Some(id) => Some(
                self.lease
                    .acquire(id)
                    .await
                    .map_err(EnrollmentError::Collaborator)?,
            ),
            None => None,
        };
        let result = self.enroll(ctx, submission, &mut lease).await;
        self.release_lease(lease.take()).await;
        result
    }

    async fn release_lease(&self, token: Option<LeaseToken>) {
        if let Some(token) = token {
            if let Err(err) = self.lease.release(token).await {
                warn!("failed to release membership lease: {}", err);
            }
        }
    }

    async fn enroll(
        &self,
        ctx: &RequestContext,
        submission: EnrollmentSubmission,
        lease: &mut Option<LeaseToken>,
    ) -> Result<EnrollmentOutcome, EnrollmentError> {
        // 1. Resolve selections and build working parameters
        let (params, member) = self.resolve(&submission).await?;
        let params = params
            .with_cadence(submission.auto_renew)
            .with_dates(&submission)
            .with_line_items(&submission);
        let params = advance(params, EnrollmentStage::Validating)?;

        // 2. Validate; nothing has been written yet
        let errors = self.validator.validate(&ValidationInput {
            submission: &submission,
            params: &params,
            today: ctx.today,
            default_currency: &self.settings.default_currency,
        });
        if !errors.is_empty() {
            info!(errors = errors.len(), "submission rejected");
            return Err(fail(&params, EnrollmentError::Validation(errors)));
        }
        let params = params.with_statuses(&submission, ctx.today).map_err(|err| {
            let mut errors = FieldErrors::new();
            errors.add(SubmissionField::JoinDate, err.to_string());
            EnrollmentError::Validation(errors)
        })?;

        let mode = submission.payment_mode();
        let charge_needed = mode.map_or(false, |m| m.is_charge())
            && params.total.as_ref().map_or(false, |t| t.is_positive());
        let payment_not_received = mode == Some(PaymentMode::RecordOnly)
            && submission
                .payment
                .as_ref()
                .map_or(false, |p| p.contribution_status != FundingStatus::Completed)
            && !submission.resolved_override().is_set();

        // A pending charge must be persistable before money moves
        let pending_ids = if charge_needed || payment_not_received {
            match pending_statuses(&params) {
                Ok(ids) => ids,
                Err(err) => return Err(fail(&params, err)),
            }
        } else {
            Vec::new()
        };

        let source = submission.source.clone().unwrap_or_else(|| {
            self.composer.source_label(
                &params.type_names(),
                &ctx.acting_display_name,
                mode.map_or(false, |m| m.is_charge()),
            )
        });

        // 3. Charge
        let (params, accepted) = if charge_needed {
            let params = advance(params, EnrollmentStage::Charging)?;
            let pending = match self.pending_charge(ctx, &submission, &params, &source) {
                Ok(pending) => pending,
                Err(err) => return Err(fail(&params, err)),
            };
            match self.payments.charge(pending).await {
                Ok(accepted) => (params, Some(accepted)),
                Err(err) => return Err(fail(&params, err)),
            }
        } else {
            (params, None)
        };

        // 4. Persist
        let params = advance(params, EnrollmentStage::Persisting)?;
        let pending_reason = match &accepted {
            Some(a) if a.result.status == ChargeStatus::Pending => Some(PendingReason::ChargePending),
            _ if payment_not_received => Some(PendingReason::PaymentNotReceived),
            _ => None,
        };

        let plan = match self
            .persist_plan(ctx, &submission, &params, accepted, pending_reason, &pending_ids, &source)
            .await
        {
            Ok(plan) => plan,
            Err(err) => return Err(fail(&params, err)),
        };

        let persisted = self.persist(&plan).await;
        self.release_lease(lease.take()).await;
        if let Err(err) = persisted {
            error!(
                funding_id = %params.funding_id,
                transaction_id = plan
                    .funding
                    .as_ref()
                    .and_then(|(f, _)| f.transaction_id.as_deref())
                    .unwrap_or(""),
                "enrollment rolled back: {}",
                err
            );
            return Err(fail(&params, EnrollmentError::Transaction(err)));
        }

        // 5. Notify
        let params = advance(params, EnrollmentStage::Notifying)?;
        let PersistPlan {
            funding,
            line_items,
            recurring,
            memberships,
            soft_credit,
            type_change,
        } = plan;
        let memberships: Vec<MembershipRecord> = memberships.into_iter().map(|(m, _)| m).collect();
        let mut warnings = Vec::new();

        let (mut funding, line_items) = match (funding, type_change) {
            (Some((funding, _)), effect) => {
                if let Some(effect) = effect {
                    warnings.extend(effect.warnings);
                }
                (Some(funding), line_items)
            }
            (None, Some(effect)) => {
                warnings.extend(effect.warnings);
                match effect.replacement {
                    Some(lines) => (Some(effect.funding), lines),
                    None => (None, Vec::new()),
                }
            }
            (None, None) => (None, Vec::new()),
        };

        let mut receipt_to = None;
        if let Some(funding) = funding.as_mut() {
            if submission.send_receipt && funding.is_completed() {
                let context = receipt_context(&member, funding, &memberships, &line_items, &params, &submission);
                receipt_to = self
                    .send_receipt(ctx, &submission, &member, funding, context, &mut warnings)
                    .await;
            }
        }

        let summaries: Vec<MembershipSummary> = memberships
            .iter()
            .map(|m| MembershipSummary {
                type_name: type_name(&params, m.membership_type_id),
                end_date: m.end_date,
            })
            .collect();
        let status_message = self.composer.status_message(&StatusSummary {
            member_name: &member.display_name,
            memberships: &summaries,
            is_update: submission.is_update(),
            payment_pending: funding
                .as_ref()
                .map_or(false, |f| f.status == FundingStatus::Pending),
            receipt_sent_to: receipt_to.as_deref(),
            warnings: &warnings,
        });

        let params = advance(params, EnrollmentStage::Done)?;
        info!(
            memberships = memberships.len(),
            funding_id = %params.funding_id,
            warnings = warnings.len(),
            "enrollment complete"
        );

        Ok(EnrollmentOutcome {
            memberships,
            funding,
            recurring,
            line_items,
            soft_credit,
            status_message,
            warnings,
            receipt_sent: receipt_to.is_some(),
        })
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Resolution
    // ════════════════════════════════════════════════════════════════════════════

    async fn resolve(
        &self,
        submission: &EnrollmentSubmission,
    ) -> Result<(WorkingParameters, Contact), EnrollmentError> {
        let mut errors = FieldErrors::new();

        let (selection, price_set) = match submission.price_set_id {
            Some(price_set_id) => {
                let price_set = self
                    .catalog
                    .get_price_set(price_set_id)
                    .await
                    .map_err(EnrollmentError::Collaborator)?;
                let Some(price_set) = price_set else {
                    errors.add(SubmissionField::PriceSet, "The selected price set does not exist.");
                    return Err(errors.into());
                };
                match resolve_catalog(&price_set, &submission.catalog_selections) {
                    Ok(selection) => (selection, Some(price_set)),
                    Err(err) => {
                        let field = err
                            .field_id()
                            .map(SubmissionField::PriceField)
                            .unwrap_or(SubmissionField::PriceSet);
                        errors.add(field, err.to_string());
                        return Err(errors.into());
                    }
                }
            }
            None => (
                submission
                    .membership_type_id
                    .map(|id| resolve_direct(id, submission.num_terms))
                    .unwrap_or_default(),
                None,
            ),
        };

        let mut types = Vec::with_capacity(selection.types.len());
        for type_id in selection.types.type_ids() {
            let membership_type = self
                .catalog
                .get_membership_type(type_id)
                .await
                .map_err(EnrollmentError::Collaborator)?;
            match membership_type {
                Some(membership_type) => {
                    let rules = self
                        .catalog
                        .list_status_rules(type_id)
                        .await
                        .map_err(EnrollmentError::Collaborator)?;
                    types.push((membership_type, rules));
                }
                None => errors.add(
                    SubmissionField::MembershipType,
                    "The selected membership type does not exist.",
                ),
            }
        }
        errors.into_result()?;

        let existing = match submission.membership_id {
            Some(id) => self
                .store
                .find_membership(id)
                .await
                .map_err(EnrollmentError::Collaborator)?,
            None => None,
        };

        let member = self
            .contacts
            .get_contact(submission.contact_id)
            .await
            .map_err(EnrollmentError::Collaborator)?
            .ok_or_else(|| {
                EnrollmentError::Collaborator(DomainError::new(
                    ErrorCode::ContactNotFound,
                    format!("Contact {} not found", submission.contact_id),
                ))
            })?;

        debug!(types = types.len(), catalog = price_set.is_some(), "selection resolved");
        Ok((WorkingParameters::new(selection, price_set, types, existing), member))
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Funding
    // ════════════════════════════════════════════════════════════════════════════

    fn new_funding(
        &self,
        ctx: &RequestContext,
        submission: &EnrollmentSubmission,
        payment: &PaymentDetails,
        params: &WorkingParameters,
        status: FundingStatus,
        recurring_funding_id: Option<RecurringFundingId>,
        source: &str,
    ) -> Result<FundingRecord, EnrollmentError> {
        let total_amount = params
            .total
            .clone()
            .unwrap_or_else(|| Money::zero(params.currency(&self.settings.default_currency)));
        let financial_type_id = payment
            .financial_type_id
            .or_else(|| params.line_items.first().map(|l| l.financial_type_id))
            .or_else(|| params.plans.first().map(|p| p.membership_type.financial_type_id))
            .ok_or_else(|| EnrollmentError::internal("No financial type available for the contribution"))?;

        Ok(FundingRecord::create(
            params.funding_id,
            NewFunding {
                contact_id: payer_id(submission),
                financial_type_id,
                total_amount,
                status,
                payment_instrument_id: payment.payment_instrument_id,
                transaction_id: payment.transaction_id.clone(),
                invoice_id: Some(
                    payment
                        .invoice_id
                        .clone()
                        .unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
                ),
                check_number: payment.check_number.clone(),
                source: Some(source.to_string()),
                receive_date: Some(payment.receive_date.unwrap_or(ctx.today)),
                fee_amount: payment.fee_amount.clone(),
                is_test: payment.mode == PaymentMode::TestCharge,
                recurring_funding_id,
            },
            ctx.received_at,
        ))
    }

    fn pending_charge(
        &self,
        ctx: &RequestContext,
        submission: &EnrollmentSubmission,
        params: &WorkingParameters,
        source: &str,
    ) -> Result<PendingCharge, EnrollmentError> {
        let payment = submission
            .payment
            .as_ref()
            .ok_or_else(|| EnrollmentError::internal("Charge requested without payment details"))?;
        let billing = payment
            .billing
            .as_ref()
            .ok_or_else(|| EnrollmentError::internal("Charge requested without billing details"))?;
        let amount = params
            .total
            .clone()
            .ok_or_else(|| EnrollmentError::internal("Charge requested without an amount"))?;
        let is_test = payment.mode == PaymentMode::TestCharge;
        let payer = payer_id(submission);

        let recurring = params.cadence.map(|(type_id, cadence)| {
            let start_date = params
                .plan(type_id)
                .and_then(|p| p.computed_dates())
                .map(|d| d.start_date)
                .unwrap_or(ctx.today);
            RecurringFundingRecord::pending(payer, amount.clone(), cadence, start_date, is_test, ctx.received_at)
        });

        let funding = self.new_funding(
            ctx,
            submission,
            payment,
            params,
            FundingStatus::Pending,
            recurring.as_ref().map(|r| r.id),
            source,
        )?;

        let request = ChargeRequest {
            funding_id: funding.id,
            invoice_id: funding.invoice_id.clone().unwrap_or_default(),
            amount,
            description: params.type_names().join(", "),
            contributor: contributor(payer, billing),
            payment_token: billing.payment_token.clone(),
            is_test,
            recurring: recurring.as_ref().map(|r| RecurringTerms {
                recurring_funding_id: r.id,
                cadence: r.cadence,
            }),
        };

        Ok(PendingCharge {
            funding,
            line_items: params.line_items.clone(),
            recurring,
            request,
            received_at: ctx.received_at,
        })
    }

    /// Settles the funding side: an accepted charge updates the staged
    /// records, a recorded payment (or a free charge) inserts a new one.
    fn settle_funding(
        &self,
        ctx: &RequestContext,
        submission: &EnrollmentSubmission,
        params: &WorkingParameters,
        accepted: Option<AcceptedCharge>,
        source: &str,
    ) -> Result<(Option<(FundingRecord, FundingWrite)>, Option<RecurringFundingRecord>), EnrollmentError> {
        match accepted {
            Some(AcceptedCharge {
                mut funding,
                mut recurring,
                result,
            }) => {
                match result.status {
                    ChargeStatus::Completed => {
                        funding
                            .complete(result.transaction_id.clone(), result.instrument.clone(), ctx.received_at)
                            .map_err(EnrollmentError::Internal)?;
                        if let Some(recurring) = recurring.as_mut() {
                            recurring.activate(result.processor_reference.clone());
                        }
                    }
                    ChargeStatus::Pending => {
                        if result.transaction_id.is_some() {
                            funding.transaction_id = result.transaction_id.clone();
                        }
                        funding.instrument = result.instrument.clone();
                        funding.updated_at = ctx.received_at;
                        if let Some(recurring) = recurring.as_mut() {
                            if result.processor_reference.is_some() {
                                recurring.processor_reference = result.processor_reference.clone();
                            }
                        }
                    }
                }
                if result.fee_amount.is_some() {
                    funding.fee_amount = result.fee_amount;
                }
                Ok((Some((funding, FundingWrite::Update)), recurring))
            }
            None => match &submission.payment {
                Some(payment) => {
                    // A zero-amount charge never reaches the gateway
                    let status = if payment.mode.is_charge() {
                        FundingStatus::Completed
                    } else {
                        payment.contribution_status
                    };
                    let funding = self.new_funding(ctx, submission, payment, params, status, None, source)?;
                    Ok((Some((funding, FundingWrite::Insert)), None))
                }
                None => Ok((None, None)),
            },
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Persistence
    // ════════════════════════════════════════════════════════════════════════════

    #[allow(clippy::too_many_arguments)]
    async fn persist_plan(
        &self,
        ctx: &RequestContext,
        submission: &EnrollmentSubmission,
        params: &WorkingParameters,
        accepted: Option<AcceptedCharge>,
        pending_reason: Option<PendingReason>,
        pending_ids: &[(MembershipTypeId, MembershipStatusId)],
        source: &str,
    ) -> Result<PersistPlan, EnrollmentError> {
        let (funding, recurring) = self.settle_funding(ctx, submission, params, accepted, source)?;

        let mut memberships = Vec::with_capacity(params.plans.len());
        for plan in &params.plans {
            let membership_type = &plan.membership_type;
            let (join_date, start_date, end_date) = match plan.computed_dates() {
                Some(d) => (Some(d.join_date), Some(d.start_date), d.end_date),
                None => (submission.join_date, submission.start_date, submission.end_date),
            };
            let (status_id, start_date, end_date) = match pending_reason {
                Some(reason) => {
                    let pending = pending_ids
                        .iter()
                        .find(|(id, _)| *id == membership_type.id)
                        .map(|(_, status)| *status)
                        .ok_or_else(|| EnrollmentError::internal("Pending status was not resolved"))?;
                    if reason == PendingReason::ChargePending {
                        (pending, None, None)
                    } else {
                        (pending, start_date, end_date)
                    }
                }
                None => {
                    let status = plan.status_id.ok_or_else(|| {
                        EnrollmentError::internal(format!(
                            "No status derived for membership type {}",
                            membership_type.id
                        ))
                    })?;
                    (status, start_date, end_date)
                }
            };
            let recurring_funding_id = recurring
                .as_ref()
                .filter(|_| {
                    membership_type.auto_renew.allows_auto_renew()
                        && Cadence::of(membership_type).is_some()
                })
                .map(|r| r.id);

            let terms = MembershipTerms {
                contact_id: submission.contact_id,
                membership_type_id: membership_type.id,
                join_date,
                start_date,
                end_date,
                status_id,
                status_override: submission.resolved_override(),
                skip_status_calc: pending_reason.is_some(),
                num_terms: plan.num_terms,
                source: if params.existing.is_some() {
                    submission.source.clone()
                } else {
                    Some(source.to_string())
                },
                recurring_funding_id,
                max_related: submission.max_related.or(membership_type.max_related),
            };

            let record = match &params.existing {
                Some(existing) => {
                    let mut record = existing.clone();
                    record
                        .apply(terms, ctx.received_at)
                        .map_err(EnrollmentError::Internal)?;
                    (record, false)
                }
                None => (
                    MembershipRecord::create(MembershipId::new(), terms, ctx.received_at)
                        .map_err(EnrollmentError::Internal)?,
                    true,
                ),
            };
            memberships.push(record);
        }

        let soft_credit = match (&funding, submission.payment.as_ref().and_then(|p| p.payer.as_ref())) {
            (Some((funding, _)), Some(payer)) if payer.contact_id != submission.contact_id => {
                payer.soft_credit_type_id.map(|type_id| {
                    SoftCreditEntry::new(funding.id, submission.contact_id, funding.total_amount.clone(), type_id)
                })
            }
            _ => None,
        };

        let type_change = self.type_change(ctx, submission, params).await?;

        Ok(PersistPlan {
            funding,
            line_items: params.line_items.clone(),
            recurring,
            memberships,
            soft_credit,
            type_change,
        })
    }

    async fn type_change(
        &self,
        ctx: &RequestContext,
        submission: &EnrollmentSubmission,
        params: &WorkingParameters,
    ) -> Result<Option<TypeChangeEffect>, EnrollmentError> {
        let (Some(existing), Some(plan)) = (&params.existing, params.plans.first()) else {
            return Ok(None);
        };
        if existing.membership_type_id == plan.membership_type.id {
            return Ok(None);
        }

        let funding = self
            .store
            .latest_funding_for_membership(existing.id)
            .await
            .map_err(EnrollmentError::Transaction)?;
        let Some(funding) = funding else {
            return Ok(None);
        };
        let lines = self
            .store
            .line_items_for(funding.id)
            .await
            .map_err(EnrollmentError::Transaction)?;

        let recompute = self.settings.update_contribution_on_type_change && submission.payment.is_none();
        debug!(
            funding_id = %funding.id,
            from = %existing.membership_type_id,
            to = %plan.membership_type.id,
            recompute,
            "membership type changed"
        );
        plan_type_change(
            funding,
            &lines,
            &plan.membership_type,
            plan.num_terms,
            params.price_set.as_ref(),
            recompute,
            ctx.received_at,
        )
        .map(Some)
        .map_err(|err| EnrollmentError::internal(err.to_string()))
    }

    async fn persist(&self, plan: &PersistPlan) -> Result<(), DomainError> {
        let mut tx = self.store.begin().await?;
        let written = async {
            if let Some(recurring) = &plan.recurring {
                tx.update_recurring(recurring).await?;
            }
            if let Some((funding, write)) = &plan.funding {
                match write {
                    FundingWrite::Insert => {
                        tx.insert_funding(funding).await?;
                        tx.replace_line_items(funding.id, &plan.line_items).await?;
                    }
                    FundingWrite::Update => tx.update_funding(funding).await?,
                }
            }
            for (membership, is_new) in &plan.memberships {
                if *is_new {
                    tx.insert_membership(membership).await?;
                } else {
                    tx.update_membership(membership).await?;
                }
                if let Some((funding, _)) = &plan.funding {
                    tx.link_membership_funding(membership.id, funding.id).await?;
                }
            }
            if let Some(entry) = &plan.soft_credit {
                tx.insert_soft_credit(entry).await?;
            }
            if let Some(effect) = &plan.type_change {
                if let Some(lines) = &effect.replacement {
                    tx.replace_line_items(effect.funding.id, lines).await?;
                    tx.update_funding(&effect.funding).await?;
                }
            }
            Ok::<(), DomainError>(())
        }
        .await;

        match written {
            Ok(()) => tx.commit().await,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!("rollback of enrollment failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Notification
    // ════════════════════════════════════════════════════════════════════════════

    /// Returns the address the receipt went to. Failures become warnings.
    async fn send_receipt(
        &self,
        ctx: &RequestContext,
        submission: &EnrollmentSubmission,
        member: &Contact,
        funding: &mut FundingRecord,
        context: serde_json::Value,
        warnings: &mut Vec<String>,
    ) -> Option<String> {
        let payer = payer_id(submission);
        let recipient = if payer == member.id {
            Some(member.clone())
        } else {
            match self.contacts.get_contact(payer).await {
                Ok(contact) => contact,
                Err(err) => {
                    warn!(payer = %payer, "payer lookup for receipt failed: {}", err);
                    None
                }
            }
        };
        let billing_email = submission
            .payment
            .as_ref()
            .and_then(|p| p.billing.as_ref())
            .and_then(|b| b.email.clone());
        let (recipient_name, email) = match recipient {
            Some(contact) => (contact.display_name, contact.email.or(billing_email)),
            None => (member.display_name.clone(), billing_email),
        };
        let Some(email) = email else {
            warnings.push(NO_RECEIPT_EMAIL.to_string());
            return None;
        };

        let request = ReceiptRequest {
            template_key: self.settings.receipt_template_key.clone(),
            recipient_name,
            recipient_email: email.clone(),
            context,
        };
        match self.receipts.send_receipt(request).await {
            Ok(()) => {
                funding.receipt_date = Some(ctx.today);
                funding.updated_at = ctx.received_at;
                if let Err(err) = self.record_receipt_date(funding).await {
                    warn!(funding_id = %funding.id, "receipt sent but receipt date not saved: {}", err);
                }
                info!(funding_id = %funding.id, "receipt sent");
                Some(email)
            }
            Err(err) => {
                warn!(funding_id = %funding.id, "receipt dispatch failed: {}", err);
                warnings.push(format!("The receipt could not be sent: {}", err.message()));
                None
            }
        }
    }

    async fn record_receipt_date(&self, funding: &FundingRecord) -> Result<(), DomainError> {
        let mut tx = self.store.begin().await?;
        match tx.update_funding(funding).await {
            Ok(()) => tx.commit().await,
            Err(err) => {
                tx.rollback().await?;
                Err(err)
            }
        }
    }
}

fn advance(params: WorkingParameters, stage: EnrollmentStage) -> Result<WorkingParameters, EnrollmentError> {
    let from = params.stage;
    let params = params
        .advance(stage)
        .map_err(|err| EnrollmentError::internal(err.to_string()))?;
    debug!(from = %from, stage = %stage, funding_id = %params.funding_id, "enrollment stage");
    Ok(params)
}

fn fail(params: &WorkingParameters, err: EnrollmentError) -> EnrollmentError {
    match params.stage.transition_to(EnrollmentStage::Failed) {
        Ok(stage) => debug!(from = %params.stage, stage = %stage, "enrollment stage: {}", err),
        Err(_) => warn!(stage = %params.stage, "enrollment failed after completion: {}", err),
    }
    err
}

fn payer_id(submission: &EnrollmentSubmission) -> ContactId {
    submission
        .payment
        .as_ref()
        .and_then(|p| p.payer.as_ref())
        .map(|p| p.contact_id)
        .unwrap_or(submission.contact_id)
}

fn pending_statuses(
    params: &WorkingParameters,
) -> Result<Vec<(MembershipTypeId, MembershipStatusId)>, EnrollmentError> {
    params
        .plans
        .iter()
        .map(|plan| {
            pending_status(&plan.status_rules)
                .map(|rule| (plan.membership_type.id, rule.status_id))
                .ok_or_else(|| {
                    EnrollmentError::Collaborator(DomainError::new(
                        ErrorCode::InternalError,
                        format!(
                            "No Pending membership status is configured for {}",
                            plan.membership_type.name
                        ),
                    ))
                })
        })
        .collect()
}

fn type_name(params: &WorkingParameters, membership_type_id: MembershipTypeId) -> String {
    params
        .plan(membership_type_id)
        .map(|p| p.membership_type.name.clone())
        .unwrap_or_default()
}

fn receipt_context(
    member: &Contact,
    funding: &FundingRecord,
    memberships: &[MembershipRecord],
    line_items: &[LineItem],
    params: &WorkingParameters,
    submission: &EnrollmentSubmission,
) -> serde_json::Value {
    json!({
        "member_name": member.display_name,
        "receipt_text": submission.receipt_text,
        "memberships": memberships
            .iter()
            .map(|m| json!({
                "membership_type": type_name(params, m.membership_type_id),
                "join_date": m.join_date,
                "start_date": m.start_date,
                "end_date": m.end_date,
            }))
            .collect::<Vec<_>>(),
        "line_items": line_items
            .iter()
            .map(|l| json!({
                "label": l.label,
                "quantity": l.quantity,
                "line_total": l.line_total.to_string(),
                "tax_amount": l.tax_amount.to_string(),
            }))
            .collect::<Vec<_>>(),
        "total_amount": funding.total_amount.to_string(),
        "receive_date": funding.receive_date,
        "transaction_id": funding.transaction_id,
        "invoice_id": funding.invoice_id,
        "is_test": funding.is_test,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::gateway::MockChargeGateway;
    use crate::adapters::memory::{
        InMemoryCatalog, InMemoryContactDirectory, InMemoryEnrollmentStore, InMemoryMembershipLease,
        RecordingReceiptSender, StoreOperation,
    };
    use crate::domain::catalog::{
        AutoRenewPolicy, DurationUnit, MembershipType, PeriodType, RuleAnchor, RuleBoundary,
        StatusRule, PENDING_STATUS_NAME,
    };
    use crate::domain::enrollment::{BillingDetails, OverrideRequest, PayerDetails};
    use crate::domain::foundation::{
        CalendarUnit, Currency, FinancialTypeId, PaymentInstrumentId, SoftCreditTypeId,
    };
    use crate::domain::funding::InstrumentSummary;
    use crate::ports::{ChargeResult, GatewayError};
    use chrono::NaiveDate;
    use std::time::Duration;

    // ════════════════════════════════════════════════════════════════════════════
    // Fixtures
    // ════════════════════════════════════════════════════════════════════════════

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn usd(minor: i64) -> Money {
        Money::new(minor, Currency::new("USD").unwrap())
    }

    fn general() -> MembershipType {
        MembershipType {
            id: MembershipTypeId::new(1),
            name: "General".to_string(),
            owner_organization_id: ContactId::new(100),
            period_type: PeriodType::Rolling,
            duration_unit: DurationUnit::Year,
            duration_interval: 1,
            auto_renew: AutoRenewPolicy::Optional,
            financial_type_id: FinancialTypeId::new(2),
            minimum_fee: usd(5000),
            max_related: Some(2),
        }
    }

    fn student() -> MembershipType {
        MembershipType {
            id: MembershipTypeId::new(2),
            name: "Student".to_string(),
            owner_organization_id: ContactId::new(100),
            minimum_fee: usd(2500),
            max_related: None,
            ..general()
        }
    }

    fn rules() -> Vec<StatusRule> {
        vec![
            StatusRule {
                status_id: MembershipStatusId::new(1),
                name: "New".to_string(),
                starts: Some(RuleBoundary::at(RuleAnchor::JoinDate)),
                ends: Some(RuleBoundary::offset(RuleAnchor::JoinDate, CalendarUnit::Month, 3)),
                is_current_member: true,
                is_admin: false,
                is_active: true,
                weight: 1,
            },
            StatusRule {
                status_id: MembershipStatusId::new(2),
                name: "Current".to_string(),
                starts: Some(RuleBoundary::at(RuleAnchor::StartDate)),
                ends: Some(RuleBoundary::at(RuleAnchor::EndDate)),
                is_current_member: true,
                is_admin: false,
                is_active: true,
                weight: 2,
            },
            StatusRule {
                status_id: MembershipStatusId::new(5),
                name: PENDING_STATUS_NAME.to_string(),
                starts: None,
                ends: None,
                is_current_member: false,
                is_admin: true,
                is_active: true,
                weight: 5,
            },
        ]
    }

    struct Harness {
        store: Arc<InMemoryEnrollmentStore>,
        gateway: Arc<MockChargeGateway>,
        receipts: Arc<RecordingReceiptSender>,
        lease: Arc<InMemoryMembershipLease>,
        handler: EnrollMembershipHandler,
    }

    fn harness() -> Harness {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.add_membership_type(general(), rules());
        catalog.add_membership_type(student(), rules());
        let contacts = Arc::new(InMemoryContactDirectory::new());
        contacts.add(Contact {
            id: ContactId::new(7),
            display_name: "Ada Lovelace".to_string(),
            email: Some("ada@example.org".to_string()),
        });
        contacts.add(Contact {
            id: ContactId::new(8),
            display_name: "Charles Babbage".to_string(),
            email: Some("charles@example.org".to_string()),
        });
        let store = Arc::new(InMemoryEnrollmentStore::new());
        let gateway = Arc::new(MockChargeGateway::new());
        let receipts = Arc::new(RecordingReceiptSender::new());
        let lease = Arc::new(InMemoryMembershipLease::new());
        let payments = PaymentCoordinator::new(gateway.clone(), store.clone(), Duration::from_secs(1));
        let handler = EnrollMembershipHandler::new(
            catalog,
            contacts,
            store.clone(),
            payments,
            receipts.clone(),
            lease.clone(),
            EnrollmentSettings::default(),
        );
        Harness {
            store,
            gateway,
            receipts,
            lease,
            handler,
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Some(ContactId::new(1)), "Front Desk").with_today(d(2024, 1, 15))
    }

    fn record_only(total: i64) -> PaymentDetails {
        PaymentDetails {
            mode: PaymentMode::RecordOnly,
            total_amount: Some(usd(total)),
            currency: None,
            financial_type_id: None,
            payment_instrument_id: Some(PaymentInstrumentId::new(4)),
            contribution_status: FundingStatus::Completed,
            receive_date: None,
            transaction_id: None,
            invoice_id: None,
            check_number: Some("1042".to_string()),
            fee_amount: None,
            payer: None,
            billing: None,
        }
    }

    fn live_charge(total: i64) -> PaymentDetails {
        PaymentDetails {
            mode: PaymentMode::LiveCharge,
            payment_instrument_id: Some(PaymentInstrumentId::new(1)),
            check_number: None,
            billing: Some(BillingDetails {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: Some("ada@example.org".to_string()),
                street_address: None,
                city: None,
                state_province: None,
                postal_code: None,
                country: None,
                payment_token: "tok_visa".to_string(),
            }),
            ..record_only(total)
        }
    }

    fn submission(payment: Option<PaymentDetails>) -> EnrollmentSubmission {
        let mut submission = EnrollmentSubmission::direct(ContactId::new(7), MembershipTypeId::new(1));
        submission.join_date = Some(d(2024, 1, 15));
        submission.payment = payment;
        submission
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn record_only_payment_creates_membership_and_funding() {
        let h = harness();
        let mut sub = submission(Some(record_only(5000)));
        sub.send_receipt = true;

        let outcome = h.handler.handle(&ctx(), sub).await.unwrap();

        assert_eq!(outcome.memberships.len(), 1);
        let membership = &outcome.memberships[0];
        assert_eq!(membership.start_date, Some(d(2024, 1, 15)));
        assert_eq!(membership.end_date, Some(d(2025, 1, 14)));
        assert_eq!(membership.status_id, MembershipStatusId::new(1));
        assert_eq!(membership.max_related, Some(2));
        let funding = outcome.funding.unwrap();
        assert_eq!(funding.status, FundingStatus::Completed);
        assert_eq!(funding.total_amount, usd(5000));
        assert_eq!(funding.receipt_date, Some(d(2024, 1, 15)));
        assert_eq!(
            funding.source.as_deref(),
            Some("General Membership: Offline signup (by Front Desk)")
        );
        assert!(outcome.receipt_sent);
        assert_eq!(h.receipts.sent().len(), 1);
        assert!(outcome
            .status_message
            .starts_with("General membership for Ada Lovelace has been added."));
        assert_eq!(
            h.store.memberships_for_funding(funding.id).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn validation_failure_writes_nothing() {
        let h = harness();
        let mut sub = submission(Some(record_only(5000)));
        sub.join_date = None;

        let err = h.handler.handle(&ctx(), sub).await.unwrap_err();

        let errors = err.field_errors().unwrap();
        assert_eq!(errors.get(SubmissionField::JoinDate), Some("Please enter the Member Since."));
        assert!(h.store.memberships().is_empty());
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_membership_type_is_a_field_error() {
        let h = harness();
        let mut sub = submission(None);
        sub.membership_type_id = Some(MembershipTypeId::new(99));

        let err = h.handler.handle(&ctx(), sub).await.unwrap_err();

        assert!(err
            .field_errors()
            .unwrap()
            .contains(SubmissionField::MembershipType));
    }

    #[tokio::test]
    async fn completed_charge_activates_recurring_agreement() {
        let h = harness();
        h.gateway.push_result(ChargeResult {
            status: ChargeStatus::Completed,
            transaction_id: Some("txn_42".to_string()),
            instrument: InstrumentSummary {
                card_type: Some("Visa".to_string()),
                pan_truncation: Some("4242".to_string()),
            },
            fee_amount: Some(usd(175)),
            processor_reference: Some("sub_9".to_string()),
        });
        let mut sub = submission(Some(live_charge(5000)));
        sub.auto_renew = true;

        let outcome = h.handler.handle(&ctx(), sub).await.unwrap();

        let funding = outcome.funding.unwrap();
        assert_eq!(funding.status, FundingStatus::Completed);
        assert_eq!(funding.transaction_id.as_deref(), Some("txn_42"));
        assert_eq!(funding.instrument.pan_truncation.as_deref(), Some("4242"));
        assert_eq!(funding.fee_amount, Some(usd(175)));
        let recurring = outcome.recurring.unwrap();
        assert_eq!(recurring.processor_reference.as_deref(), Some("sub_9"));
        assert_eq!(outcome.memberships[0].recurring_funding_id, Some(recurring.id));
        let stored = h.store.find_recurring(recurring.id).await.unwrap().unwrap();
        assert_eq!(stored.status, recurring.status);
        assert_eq!(h.gateway.calls()[0].recurring.map(|r| r.recurring_funding_id), Some(recurring.id));
    }

    #[tokio::test]
    async fn zero_amount_charge_skips_gateway() {
        let h = harness();
        let sub = submission(Some(live_charge(0)));

        let outcome = h.handler.handle(&ctx(), sub).await.unwrap();

        assert!(h.gateway.calls().is_empty());
        assert_eq!(outcome.funding.unwrap().status, FundingStatus::Completed);
    }

    #[tokio::test]
    async fn unreceived_offline_payment_leaves_membership_pending() {
        let h = harness();
        let mut payment = record_only(5000);
        payment.contribution_status = FundingStatus::Pending;

        let outcome = h.handler.handle(&ctx(), submission(Some(payment))).await.unwrap();

        let membership = &outcome.memberships[0];
        assert_eq!(membership.status_id, MembershipStatusId::new(5));
        assert!(membership.skip_status_calc);
        assert_eq!(membership.end_date, Some(d(2025, 1, 14)));
        assert!(outcome.status_message.contains("pending"));
    }

    #[tokio::test]
    async fn distinct_payer_gets_soft_credit() {
        let h = harness();
        let mut payment = record_only(5000);
        payment.payer = Some(PayerDetails {
            contact_id: ContactId::new(8),
            soft_credit_type_id: Some(SoftCreditTypeId::new(3)),
        });
        let mut sub = submission(Some(payment));
        sub.send_receipt = true;

        let outcome = h.handler.handle(&ctx(), sub).await.unwrap();

        let funding = outcome.funding.unwrap();
        assert_eq!(funding.contact_id, ContactId::new(8));
        let credit = outcome.soft_credit.unwrap();
        assert_eq!(credit.contact_id, ContactId::new(7));
        assert_eq!(h.store.soft_credits_for(funding.id).await.unwrap().len(), 1);
        assert_eq!(h.receipts.sent()[0].recipient_email, "charles@example.org");
    }

    #[tokio::test]
    async fn storage_failure_rolls_back_everything() {
        let h = harness();
        h.store.fail_on(StoreOperation::LinkMembershipFunding);

        let err = h
            .handler
            .handle(&ctx(), submission(Some(record_only(5000))))
            .await
            .unwrap_err();

        assert!(matches!(err, EnrollmentError::Transaction(_)));
        assert!(h.store.memberships().is_empty());
        assert!(h.store.fundings().is_empty());
    }

    #[tokio::test]
    async fn receipt_failure_is_a_warning() {
        let h = harness();
        h.receipts.fail_with("mail server unavailable");
        let mut sub = submission(Some(record_only(5000)));
        sub.send_receipt = true;

        let outcome = h.handler.handle(&ctx(), sub).await.unwrap();

        assert!(!outcome.receipt_sent);
        assert_eq!(outcome.memberships.len(), 1);
        assert!(outcome.warnings[0].contains("mail server unavailable"));
        assert_eq!(outcome.funding.unwrap().receipt_date, None);
    }

    #[tokio::test]
    async fn update_overwrites_existing_membership() {
        let h = harness();
        let created = h
            .handler
            .handle(&ctx(), submission(Some(record_only(5000))))
            .await
            .unwrap();
        let id = created.memberships[0].id;

        let mut update = submission(None);
        update.membership_id = Some(id);
        update.status_override = OverrideRequest::Indefinite;
        update.status_id = Some(MembershipStatusId::new(2));

        let outcome = h.handler.handle(&ctx(), update).await.unwrap();

        assert_eq!(outcome.memberships[0].id, id);
        assert_eq!(h.store.memberships().len(), 1);
        let stored = h.store.find_membership(id).await.unwrap().unwrap();
        assert_eq!(stored.status_id, MembershipStatusId::new(2));
        assert!(stored.status_override.is_set());
        assert!(outcome.status_message.starts_with("Membership for Ada Lovelace has been updated."));
    }

    #[tokio::test]
    async fn type_change_rewrites_linked_contribution() {
        let h = harness();
        let created = h
            .handler
            .handle(&ctx(), submission(Some(record_only(5000))))
            .await
            .unwrap();
        let id = created.memberships[0].id;
        let funding_id = created.funding.unwrap().id;

        let mut update = submission(None);
        update.membership_id = Some(id);
        update.membership_type_id = Some(MembershipTypeId::new(2));

        let outcome = h.handler.handle(&ctx(), update).await.unwrap();

        assert!(outcome
            .warnings
            .contains(&"Associated contribution is updated on membership type change.".to_string()));
        let lines = h.store.line_items_for(funding_id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].membership_type_id, Some(MembershipTypeId::new(2)));
        let funding = h.store.find_funding(funding_id).await.unwrap().unwrap();
        assert_eq!(funding.total_amount, usd(2500));
    }

    #[tokio::test]
    async fn update_without_join_date_is_rejected() {
        let h = harness();
        let created = h
            .handler
            .handle(&ctx(), submission(Some(record_only(5000))))
            .await
            .unwrap();
        let id = created.memberships[0].id;

        let mut update = submission(None);
        update.membership_id = Some(id);
        update.join_date = None;

        let err = h.handler.handle(&ctx(), update).await.unwrap_err();

        assert_eq!(
            err.field_errors().unwrap().get(SubmissionField::JoinDate),
            Some("Please enter the Member Since.")
        );
        assert_eq!(h.lease.held(), 0);
    }

    #[tokio::test]
    async fn update_reads_membership_under_lease() {
        let h = harness();
        let created = h
            .handler
            .handle(&ctx(), submission(Some(record_only(5000))))
            .await
            .unwrap();
        let id = created.memberships[0].id;
        let funding_id = created.funding.unwrap().id;

        // Another writer holds the lease and moves the record to Student.
        let held = h.lease.acquire(id).await.unwrap();
        let mut update = submission(None);
        update.membership_id = Some(id);
        update.membership_type_id = Some(MembershipTypeId::new(2));

        let concurrent_writer = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let mut changed = h.store.find_membership(id).await.unwrap().unwrap();
            changed.membership_type_id = MembershipTypeId::new(2);
            h.store.seed_membership(changed);
            h.lease.release(held).await.unwrap();
        };
        let request_ctx = ctx();
        let (outcome, ()) = tokio::join!(h.handler.handle(&request_ctx, update), concurrent_writer);
        let outcome = outcome.unwrap();

        // The update saw Student already in place, so the contribution stays as is.
        assert!(outcome.warnings.is_empty());
        let lines = h.store.line_items_for(funding_id).await.unwrap();
        assert_eq!(lines[0].membership_type_id, Some(MembershipTypeId::new(1)));
        assert_eq!(h.lease.held(), 0);
    }

    #[tokio::test]
    async fn failed_update_releases_lease() {
        let h = harness();
        let created = h
            .handler
            .handle(&ctx(), submission(Some(record_only(5000))))
            .await
            .unwrap();
        let id = created.memberships[0].id;
        h.store.fail_on(StoreOperation::UpdateMembership);

        let mut update = submission(None);
        update.membership_id = Some(id);
        let err = h.handler.handle(&ctx(), update).await.unwrap_err();

        assert!(matches!(err, EnrollmentError::Transaction(_)));
        assert_eq!(h.lease.held(), 0);
        assert_eq!(h.lease.tracked(), 0);
    }

    #[tokio::test]
    async fn missing_pending_status_blocks_charge() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let without_pending: Vec<StatusRule> =
            rules().into_iter().filter(|r| !r.is_pending()).collect();
        catalog.add_membership_type(general(), without_pending);
        let contacts = Arc::new(InMemoryContactDirectory::new());
        contacts.add(Contact {
            id: ContactId::new(7),
            display_name: "Ada Lovelace".to_string(),
            email: None,
        });
        let store = Arc::new(InMemoryEnrollmentStore::new());
        let gateway = Arc::new(MockChargeGateway::new());
        gateway.push_error(GatewayError::card_declined("should not be called"));
        let handler = EnrollMembershipHandler::new(
            catalog,
            contacts,
            store.clone(),
            PaymentCoordinator::new(gateway.clone(), store.clone(), Duration::from_secs(1)),
            Arc::new(RecordingReceiptSender::new()),
            Arc::new(InMemoryMembershipLease::new()),
            EnrollmentSettings::default(),
        );

        let err = handler
            .handle(&ctx(), submission(Some(live_charge(5000))))
            .await
            .unwrap_err();

        assert!(matches!(err, EnrollmentError::Collaborator(_)));
        assert!(gateway.calls().is_empty());
    }
}
