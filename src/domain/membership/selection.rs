//! Selection resolution.
//!
//! Converts what the submitter picked (a single membership type, or options
//! from a priced catalog) into the canonical set of membership types to
//! enroll plus the priced options that become line items.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::catalog::{PriceField, PriceOption, PriceSet};
use crate::domain::foundation::{MembershipTypeId, PriceFieldId, PriceOptionId};

/// One option picked within a catalog field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogChoice {
    pub option_id: PriceOptionId,
    #[serde(default = "one")]
    pub quantity: u32,
}

fn one() -> u32 {
    1
}

impl CatalogChoice {
    pub fn single(option_id: PriceOptionId) -> Self {
        Self {
            option_id,
            quantity: 1,
        }
    }
}

/// Catalog picks keyed by field.
pub type CatalogSelection = BTreeMap<PriceFieldId, Vec<CatalogChoice>>;

/// Membership types chosen for one submission, each with an optional term
/// count. Keys are unique; iteration is in ascending type id order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipTypeSelection(BTreeMap<MembershipTypeId, Option<u32>>);

impl MembershipTypeSelection {
    pub fn single(membership_type_id: MembershipTypeId, num_terms: Option<u32>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(membership_type_id, num_terms);
        Self(map)
    }

    /// Adds a type. An already-present type keeps its first term count.
    pub fn insert(&mut self, membership_type_id: MembershipTypeId, num_terms: Option<u32>) {
        self.0.entry(membership_type_id).or_insert(num_terms);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, membership_type_id: MembershipTypeId) -> bool {
        self.0.contains_key(&membership_type_id)
    }

    pub fn terms_for(&self, membership_type_id: MembershipTypeId) -> Option<u32> {
        self.0.get(&membership_type_id).copied().flatten()
    }

    pub fn type_ids(&self) -> impl Iterator<Item = MembershipTypeId> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MembershipTypeId, Option<u32>)> + '_ {
        self.0.iter().map(|(id, terms)| (*id, *terms))
    }
}

/// A catalog option the submitter picked, resolved against the price set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedOption {
    pub field_id: PriceFieldId,
    pub field_label: String,
    pub is_enter_qty: bool,
    pub option: PriceOption,
    pub quantity: u32,
}

/// Output of resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSelection {
    pub types: MembershipTypeSelection,

    /// Every picked catalog option, in field order. Empty on the direct path.
    pub options: Vec<SelectedOption>,
}

/// The submitted choices could not be matched to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("Price field {0} does not belong to the selected price set")]
    UnknownField(PriceFieldId),

    #[error("Option {option} is not available in price field {field}")]
    UnknownOption {
        field: PriceFieldId,
        option: PriceOptionId,
    },

    #[error("Quantity for option {0} must be at least 1")]
    ZeroQuantity(PriceOptionId),
}

impl SelectionError {
    pub fn field_id(&self) -> Option<PriceFieldId> {
        match self {
            SelectionError::UnknownField(field) => Some(*field),
            SelectionError::UnknownOption { field, .. } => Some(*field),
            SelectionError::ZeroQuantity(_) => None,
        }
    }
}

/// Resolves a direct pick.
pub fn resolve_direct(membership_type_id: MembershipTypeId, num_terms: Option<u32>) -> ResolvedSelection {
    ResolvedSelection {
        types: MembershipTypeSelection::single(membership_type_id, num_terms),
        options: Vec::new(),
    }
}

/// Resolves catalog picks against `price_set`.
///
/// Options on "enter quantity" fields become line items but never select a
/// membership type. Several options naming the same type collapse into one
/// entry. Nothing picked resolves to an empty selection; deciding that this
/// is an error is left to validation.
pub fn resolve_catalog(
    price_set: &PriceSet,
    picks: &CatalogSelection,
) -> Result<ResolvedSelection, SelectionError> {
    let mut resolved = ResolvedSelection::default();

    for (field_id, choices) in picks {
        let field = price_set
            .field(*field_id)
            .ok_or(SelectionError::UnknownField(*field_id))?;

        for choice in choices {
            let option = lookup_option(field, choice.option_id)?;
            if choice.quantity == 0 {
                return Err(SelectionError::ZeroQuantity(choice.option_id));
            }

            if !field.is_enter_qty {
                if let Some(membership_type_id) = option.membership_type_id {
                    resolved
                        .types
                        .insert(membership_type_id, option.membership_num_terms);
                }
            }

            resolved.options.push(SelectedOption {
                field_id: field.id,
                field_label: field.label.clone(),
                is_enter_qty: field.is_enter_qty,
                option: option.clone(),
                quantity: choice.quantity,
            });
        }
    }

    Ok(resolved)
}

fn lookup_option(field: &PriceField, option_id: PriceOptionId) -> Result<&PriceOption, SelectionError> {
    field.option(option_id).ok_or(SelectionError::UnknownOption {
        field: field.id,
        option: option_id,
    })
}
