//! Contribution adjustments when an updated membership changes type.

use crate::domain::catalog::{MembershipType, PriceSet};
use crate::domain::foundation::{Timestamp, ValidationError};
use crate::domain::funding::{total_of, FundingRecord, LineItem};
use crate::domain::membership::SelectedOption;

pub const RECURRING_NOT_UPDATED: &str =
    "Associated recurring contribution cannot be updated on membership type change.";
pub const CONTRIBUTION_UPDATED: &str = "Associated contribution is updated on membership type change.";
pub const FINANCIAL_TYPE_DIFFERS: &str = "The financial types associated with the old and new membership types are different. You may want to edit the contribution associated with this membership to adjust its financial type.";
pub const COST_DIFFERS: &str = "The cost of the old and new membership types are different. You may want to edit the contribution associated with this membership to adjust its amount.";

/// What a type change does to the linked contribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeChangeEffect {
    /// Funding record with its total recomputed, when lines were replaced.
    pub funding: FundingRecord,

    /// New line-item set; `None` leaves the stored lines alone.
    pub replacement: Option<Vec<LineItem>>,

    pub warnings: Vec<String>,
}

/// Works out the effect of moving a membership to `new_type`.
///
/// With `recompute` set, the contribution's lines are replaced by a single
/// line for the new type: the price set's option for it when one exists,
/// otherwise the type's minimum fee. Contributions backing a recurring
/// agreement are never rewritten. Mismatch warnings compare the new type
/// against the contribution's last line as it will be stored.
pub fn plan_type_change(
    mut funding: FundingRecord,
    current_lines: &[LineItem],
    new_type: &MembershipType,
    num_terms: u32,
    price_set: Option<&PriceSet>,
    recompute: bool,
    now: Timestamp,
) -> Result<TypeChangeEffect, ValidationError> {
    let mut warnings = Vec::new();

    let replacement = if !recompute {
        None
    } else if funding.recurring_funding_id.is_some() {
        warnings.push(RECURRING_NOT_UPDATED.to_string());
        None
    } else {
        let catalog_option = price_set.and_then(|ps| ps.option_for_membership_type(new_type.id));
        let line = match catalog_option {
            Some((field, option)) => LineItem::from_option(
                funding.id,
                &SelectedOption {
                    field_id: field.id,
                    field_label: field.label.clone(),
                    is_enter_qty: field.is_enter_qty,
                    option: option.clone(),
                    quantity: 1,
                },
                new_type.financial_type_id,
            )?,
            None => LineItem::for_membership_type(
                funding.id,
                new_type,
                new_type.minimum_fee.clone(),
                num_terms,
            )?,
        };
        let lines = vec![line];
        if let Some(total) = total_of(&lines)? {
            funding.total_amount = total;
            funding.updated_at = now;
        }
        warnings.push(CONTRIBUTION_UPDATED.to_string());
        Some(lines)
    };

    let latest = match &replacement {
        Some(lines) => lines.last(),
        None => current_lines.last(),
    };
    if let Some(line) = latest {
        if line.financial_type_id != new_type.financial_type_id {
            warnings.push(FINANCIAL_TYPE_DIFFERS.to_string());
        }
        if line.line_total != new_type.minimum_fee {
            warnings.push(COST_DIFFERS.to_string());
        }
    }

    Ok(TypeChangeEffect {
        funding,
        replacement,
        warnings,
    })
}
