//! Contact directory port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ContactId, DomainError};

/// The parts of a contact enrollment cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub display_name: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Returns `None` if no such contact exists.
    async fn get_contact(&self, id: ContactId) -> Result<Option<Contact>, DomainError>;
}
