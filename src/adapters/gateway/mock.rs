//! Scripted charge gateway for tests.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::funding::InstrumentSummary;
use crate::ports::{ChargeGateway, ChargeRequest, ChargeResult, ChargeStatus, GatewayError};

#[derive(Default)]
struct MockState {
    /// Scripted outcomes, consumed in order.
    outcomes: VecDeque<Result<ChargeResult, GatewayError>>,
    calls: Vec<ChargeRequest>,
}

/// Mock charge gateway.
///
/// Returns scripted outcomes in order; once the script runs out every
/// charge completes with a generated transaction id.
///
/// # Example
///
/// ```ignore
/// let gateway = MockChargeGateway::new();
/// gateway.push_error(GatewayError::card_declined("Test decline"));
/// // ... run the charge, then
/// assert_eq!(gateway.calls().len(), 1);
/// ```
#[derive(Default)]
pub struct MockChargeGateway {
    state: Mutex<MockState>,
    delay: Option<Duration>,
}

impl MockChargeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_result(&self, result: ChargeResult) {
        self.lock().outcomes.push_back(Ok(result));
    }

    pub fn push_error(&self, error: GatewayError) {
        self.lock().outcomes.push_back(Err(error));
    }

    /// Requests received so far.
    pub fn calls(&self) -> Vec<ChargeRequest> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ChargeGateway for MockChargeGateway {
    async fn charge(&self, request: ChargeRequest) -> Result<ChargeResult, GatewayError> {
        let outcome = {
            let mut state = self.lock();
            let n = state.calls.len() + 1;
            state.calls.push(request);
            state.outcomes.pop_front().unwrap_or_else(|| {
                Ok(ChargeResult {
                    status: ChargeStatus::Completed,
                    transaction_id: Some(format!("mock_txn_{}", n)),
                    instrument: InstrumentSummary::default(),
                    fee_amount: None,
                    processor_reference: None,
                })
            })
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}
