//! Receipt sender that records instead of delivering.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{ReceiptRequest, ReceiptSender};

#[derive(Default)]
struct Outbox {
    sent: Vec<ReceiptRequest>,
    failure: Option<String>,
}

/// Captures receipts for assertions. `fail_with` makes every send fail.
#[derive(Default)]
pub struct RecordingReceiptSender {
    outbox: Mutex<Outbox>,
}

impl RecordingReceiptSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        self.lock().failure = Some(message.into());
    }

    pub fn sent(&self) -> Vec<ReceiptRequest> {
        self.lock().sent.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Outbox> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ReceiptSender for RecordingReceiptSender {
    async fn send_receipt(&self, request: ReceiptRequest) -> Result<(), DomainError> {
        let mut outbox = self.lock();
        if let Some(message) = &outbox.failure {
            return Err(DomainError::new(ErrorCode::ExternalServiceError, message.clone()));
        }
        debug!(template = %request.template_key, to = %request.recipient_email, "receipt recorded");
        outbox.sent.push(request);
        Ok(())
    }
}
