//! User-facing status summaries.

use chrono::NaiveDate;

/// One membership line of a summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipSummary {
    pub type_name: String,
    pub end_date: Option<NaiveDate>,
}

/// What happened, as far as the submitter needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary<'a> {
    pub member_name: &'a str,
    pub memberships: &'a [MembershipSummary],
    pub is_update: bool,
    pub payment_pending: bool,
    pub receipt_sent_to: Option<&'a str>,
    pub warnings: &'a [String],
}

/// Formats enrollment summaries and funding source labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageComposer;

impl MessageComposer {
    pub fn status_message(&self, summary: &StatusSummary<'_>) -> String {
        let latest_end = summary
            .memberships
            .iter()
            .filter_map(|m| m.end_date)
            .max();

        let mut sentences = Vec::new();
        if summary.is_update {
            sentences.push(format!("Membership for {} has been updated.", summary.member_name));
            if let Some(end) = latest_end {
                sentences.push(format!("The membership End Date is {}.", format_date(end)));
            }
        } else {
            let names: Vec<&str> = summary
                .memberships
                .iter()
                .map(|m| m.type_name.as_str())
                .collect();
            sentences.push(format!(
                "{} membership for {} has been added.",
                names.join(", "),
                summary.member_name
            ));
            if let Some(end) = latest_end {
                sentences.push(format!("The new membership End Date is {}.", format_date(end)));
            }
        }

        if summary.payment_pending {
            sentences.push(
                "The payment is pending; the membership stays pending until it completes.".to_string(),
            );
        }
        if let Some(recipient) = summary.receipt_sent_to {
            sentences.push(format!(
                "A membership confirmation and receipt has been sent to {}.",
                recipient
            ));
        }
        sentences.extend(summary.warnings.iter().cloned());

        sentences.join(" ")
    }

    /// Source label stored on the funding record and memberships.
    pub fn source_label(&self, type_names: &[&str], acting_name: &str, charged: bool) -> String {
        let labels = type_names.join(", ");
        if charged {
            format!(
                "{} Membership Signup: Credit card or direct debit (by {})",
                labels, acting_name
            )
        } else {
            format!("{} Membership: Offline signup (by {})", labels, acting_name)
        }
    }
}

/// "March 31, 2024".
pub fn format_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}
