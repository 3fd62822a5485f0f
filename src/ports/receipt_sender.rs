//! Receipt delivery port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::DomainError;

/// A templated receipt to deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptRequest {
    pub template_key: String,
    pub recipient_name: String,
    pub recipient_email: String,

    /// Values available to the template.
    pub context: serde_json::Value,
}

#[async_trait]
pub trait ReceiptSender: Send + Sync {
    /// Delivers a receipt. Failures are reported to the submitter as
    /// warnings and never undo the enrollment.
    async fn send_receipt(&self, request: ReceiptRequest) -> Result<(), DomainError>;
}
