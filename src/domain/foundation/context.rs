//! Per-request context threaded explicitly through every operation.

use chrono::NaiveDate;
use uuid::Uuid;

use super::{ContactId, Timestamp};

/// Who is acting, and when.
///
/// Replaces ambient session lookups: handlers receive the context as an
/// argument and never consult global state for the current user or date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Correlates log lines for a single submission.
    pub request_id: Uuid,

    /// Staff member submitting the enrollment, if known.
    pub acting_contact_id: Option<ContactId>,

    /// Display name of the staff member, used in source labels.
    pub acting_display_name: String,

    /// "Today" for status evaluation and receive dates.
    pub today: NaiveDate,

    /// When the request was received.
    pub received_at: Timestamp,
}

impl RequestContext {
    pub fn new(acting_contact_id: Option<ContactId>, acting_display_name: impl Into<String>) -> Self {
        let received_at = Timestamp::now();
        Self {
            request_id: Uuid::new_v4(),
            acting_contact_id,
            acting_display_name: acting_display_name.into(),
            today: received_at.date(),
            received_at,
        }
    }

    /// Pins "today" to a fixed date. Status evaluation is date dependent,
    /// so tests and back-dated batch entry use this.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }
}
