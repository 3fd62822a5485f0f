//! Priced catalog (price set) definitions.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{
    FinancialTypeId, MembershipTypeId, Money, PriceFieldId, PriceOptionId, PriceSetId,
};

/// A selectable, priced option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceOption {
    pub id: PriceOptionId,
    pub label: String,
    pub amount: Money,

    /// Membership type this option enrolls into, if any.
    pub membership_type_id: Option<MembershipTypeId>,

    /// Number of terms granted per unit of this option.
    pub membership_num_terms: Option<u32>,

    pub financial_type_id: Option<FinancialTypeId>,

    /// Sales tax rate in basis points (825 = 8.25%).
    pub tax_rate_basis_points: Option<u32>,
}

/// How many options of a field may be chosen at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCardinality {
    /// Radio/select: at most one option (a mutually-exclusive group).
    Exclusive,
    /// Checkboxes: any number of options.
    Multiple,
}

/// A field within a price set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceField {
    pub id: PriceFieldId,
    pub label: String,

    /// "Enter quantity" fields contribute a line item but never select a
    /// membership type.
    pub is_enter_qty: bool,

    pub cardinality: FieldCardinality,
    pub options: Vec<PriceOption>,
}

impl PriceField {
    pub fn option(&self, id: PriceOptionId) -> Option<&PriceOption> {
        self.options.iter().find(|o| o.id == id)
    }
}

/// A configured catalog of priced fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSet {
    pub id: PriceSetId,
    pub title: String,

    /// Quick-config sets back the plain "membership type + amount" form.
    pub is_quick_config: bool,

    pub financial_type_id: Option<FinancialTypeId>,
    pub fields: Vec<PriceField>,
}

impl PriceSet {
    pub fn field(&self, id: PriceFieldId) -> Option<&PriceField> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// First option (in field order) that enrolls into the given type.
    pub fn option_for_membership_type(
        &self,
        membership_type_id: MembershipTypeId,
    ) -> Option<(&PriceField, &PriceOption)> {
        self.fields.iter().find_map(|field| {
            field
                .options
                .iter()
                .find(|o| o.membership_type_id == Some(membership_type_id))
                .map(|o| (field, o))
        })
    }
}
