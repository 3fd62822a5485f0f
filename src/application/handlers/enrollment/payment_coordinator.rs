//! PaymentCoordinator - runs a gateway charge and compensates on failure.
//!
//! The gateway cannot join a storage transaction, so the pending funding
//! record (and the pending recurring agreement, for auto-renew) are committed
//! on their own before the charge. A decline, transport error, or timeout
//! then marks the funding failed and deletes the recurring agreement.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::domain::enrollment::BillingDetails;
use crate::domain::foundation::{ContactId, DomainError, Timestamp};
use crate::domain::funding::{FundingRecord, LineItem, RecurringFundingRecord};
use crate::ports::{
    ChargeGateway, ChargeRequest, ChargeResult, Contributor, EnrollmentStore, GatewayError,
};

use super::error::EnrollmentError;

/// Records staged before the gateway is called.
#[derive(Debug, Clone)]
pub struct PendingCharge {
    /// Funding record in `pending` status.
    pub funding: FundingRecord,
    pub line_items: Vec<LineItem>,
    pub recurring: Option<RecurringFundingRecord>,
    pub request: ChargeRequest,

    /// Submission time; failure writes are stamped with it too.
    pub received_at: Timestamp,
}

/// A charge the gateway accepted. Records are still pending in storage;
/// the enrollment transaction settles them.
#[derive(Debug, Clone)]
pub struct AcceptedCharge {
    pub funding: FundingRecord,
    pub recurring: Option<RecurringFundingRecord>,
    pub result: ChargeResult,
}

pub struct PaymentCoordinator {
    gateway: Arc<dyn ChargeGateway>,
    store: Arc<dyn EnrollmentStore>,
    timeout: Duration,
}

impl PaymentCoordinator {
    pub fn new(
        gateway: Arc<dyn ChargeGateway>,
        store: Arc<dyn EnrollmentStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            store,
            timeout,
        }
    }

    /// Stages the pending records, charges, and compensates on failure.
    ///
    /// # Errors
    ///
    /// - `Transaction` if the pending records cannot be staged (no charge
    ///   is attempted)
    /// - `Gateway` if the charge failed or timed out (after compensation)
    pub async fn charge(&self, pending: PendingCharge) -> Result<AcceptedCharge, EnrollmentError> {
        let PendingCharge {
            mut funding,
            line_items,
            recurring,
            request,
            received_at,
        } = pending;

        self.stage(&funding, &line_items, recurring.as_ref())
            .await
            .map_err(EnrollmentError::Transaction)?;

        debug!(
            funding_id = %funding.id,
            amount = %request.amount,
            recurring = recurring.is_some(),
            "charging gateway"
        );

        let outcome = match tokio::time::timeout(self.timeout, self.gateway.charge(request)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::timeout(self.timeout.as_secs())),
        };

        match outcome {
            Ok(result) => {
                info!(
                    funding_id = %funding.id,
                    transaction_id = result.transaction_id.as_deref().unwrap_or(""),
                    status = ?result.status,
                    "gateway accepted charge"
                );
                Ok(AcceptedCharge {
                    funding,
                    recurring,
                    result,
                })
            }
            Err(err) => {
                warn!(funding_id = %funding.id, code = %err.code, "charge failed: {}", err.message);
                self.compensate(&mut funding, recurring.as_ref(), received_at).await;
                Err(err.into())
            }
        }
    }

    async fn stage(
        &self,
        funding: &FundingRecord,
        line_items: &[LineItem],
        recurring: Option<&RecurringFundingRecord>,
    ) -> Result<(), DomainError> {
        let mut tx = self.store.begin().await?;
        let staged = async {
            if let Some(recurring) = recurring {
                tx.insert_recurring(recurring).await?;
            }
            tx.insert_funding(funding).await?;
            tx.replace_line_items(funding.id, line_items).await?;
            Ok::<(), DomainError>(())
        }
        .await;

        match staged {
            Ok(()) => tx.commit().await,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    error!(funding_id = %funding.id, "rollback of staged charge failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    /// Best effort: failures here leave a pending funding record behind and
    /// are logged for operator follow-up.
    async fn compensate(
        &self,
        funding: &mut FundingRecord,
        recurring: Option<&RecurringFundingRecord>,
        at: Timestamp,
    ) {
        if let Err(err) = funding.fail(at) {
            error!(funding_id = %funding.id, "cannot mark funding failed: {}", err);
            return;
        }

        let result = async {
            let mut tx = self.store.begin().await?;
            tx.update_funding(funding).await?;
            if let Some(recurring) = recurring {
                tx.delete_recurring(recurring.id).await?;
            }
            tx.commit().await
        }
        .await;

        match result {
            Ok(()) => debug!(funding_id = %funding.id, "compensated failed charge"),
            Err(err) => error!(
                funding_id = %funding.id,
                recurring_funding_id = ?recurring.map(|r| r.id),
                "compensation for failed charge did not complete: {}",
                err
            ),
        }
    }
}

/// Gateway-facing view of the person paying.
pub fn contributor(contact_id: ContactId, billing: &BillingDetails) -> Contributor {
    Contributor {
        contact_id,
        first_name: billing.first_name.clone(),
        last_name: billing.last_name.clone(),
        email: billing.email.clone(),
        street_address: billing.street_address.clone(),
        city: billing.city.clone(),
        state_province: billing.state_province.clone(),
        postal_code: billing.postal_code.clone(),
        country: billing.country.clone(),
    }
}
