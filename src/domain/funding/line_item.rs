//! Line items: the priced components of a funding record.

use serde::{Deserialize, Serialize};

use crate::domain::catalog::MembershipType;
use crate::domain::foundation::{
    FinancialTypeId, FundingId, LineItemId, MembershipTypeId, Money, PriceFieldId, PriceOptionId,
    ValidationError,
};
use crate::domain::membership::SelectedOption;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub funding_id: FundingId,
    pub price_field_id: Option<PriceFieldId>,
    pub price_option_id: Option<PriceOptionId>,
    pub label: String,
    pub quantity: u32,
    pub unit_amount: Money,

    /// `unit_amount * quantity`, before tax.
    pub line_total: Money,

    pub tax_rate_basis_points: Option<u32>,
    pub tax_amount: Money,
    pub financial_type_id: FinancialTypeId,

    /// Type this line funds; `None` for non-membership items.
    pub membership_type_id: Option<MembershipTypeId>,
    pub membership_num_terms: Option<u32>,
}

impl LineItem {
    /// Line for a picked catalog option. Falls back to `default_financial_type`
    /// when the option has none of its own.
    pub fn from_option(
        funding_id: FundingId,
        selected: &SelectedOption,
        default_financial_type: FinancialTypeId,
    ) -> Result<Self, ValidationError> {
        let option = &selected.option;
        Self::priced(
            funding_id,
            PricedLine {
                price_field_id: Some(selected.field_id),
                price_option_id: Some(option.id),
                label: option.label.clone(),
                quantity: selected.quantity,
                unit_amount: option.amount.clone(),
                tax_rate_basis_points: option.tax_rate_basis_points,
                financial_type_id: option.financial_type_id.unwrap_or(default_financial_type),
                membership_type_id: if selected.is_enter_qty {
                    None
                } else {
                    option.membership_type_id
                },
                membership_num_terms: option.membership_num_terms,
            },
        )
    }

    /// Line for a membership type enrolled without a catalog.
    pub fn for_membership_type(
        funding_id: FundingId,
        membership_type: &MembershipType,
        amount: Money,
        num_terms: u32,
    ) -> Result<Self, ValidationError> {
        Self::priced(
            funding_id,
            PricedLine {
                price_field_id: None,
                price_option_id: None,
                label: membership_type.name.clone(),
                quantity: 1,
                unit_amount: amount,
                tax_rate_basis_points: None,
                financial_type_id: membership_type.financial_type_id,
                membership_type_id: Some(membership_type.id),
                membership_num_terms: Some(num_terms),
            },
        )
    }

    fn priced(funding_id: FundingId, line: PricedLine) -> Result<Self, ValidationError> {
        let line_total = line.unit_amount.times(line.quantity)?;
        let tax_amount = match line.tax_rate_basis_points {
            Some(rate) => line_total.apply_basis_points(rate)?,
            None => Money::zero(line_total.currency.clone()),
        };
        Ok(Self {
            id: LineItemId::new(),
            funding_id,
            price_field_id: line.price_field_id,
            price_option_id: line.price_option_id,
            label: line.label,
            quantity: line.quantity,
            unit_amount: line.unit_amount,
            line_total,
            tax_rate_basis_points: line.tax_rate_basis_points,
            tax_amount,
            financial_type_id: line.financial_type_id,
            membership_type_id: line.membership_type_id,
            membership_num_terms: line.membership_num_terms,
        })
    }

    /// Line total plus tax.
    pub fn gross(&self) -> Result<Money, ValidationError> {
        self.line_total.checked_add(&self.tax_amount)
    }
}

struct PricedLine {
    price_field_id: Option<PriceFieldId>,
    price_option_id: Option<PriceOptionId>,
    label: String,
    quantity: u32,
    unit_amount: Money,
    tax_rate_basis_points: Option<u32>,
    financial_type_id: FinancialTypeId,
    membership_type_id: Option<MembershipTypeId>,
    membership_num_terms: Option<u32>,
}

/// Sum of gross line amounts. `None` for an empty set.
pub fn total_of(lines: &[LineItem]) -> Result<Option<Money>, ValidationError> {
    let mut total: Option<Money> = None;
    for line in lines {
        let gross = line.gross()?;
        total = Some(match total {
            Some(sum) => sum.checked_add(&gross)?,
            None => gross,
        });
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::PriceOption;
    use crate::domain::foundation::Currency;

    fn usd(minor: i64) -> Money {
        Money::new(minor, Currency::new("USD").unwrap())
    }

    fn selected(amount: i64, quantity: u32, tax: Option<u32>) -> SelectedOption {
        SelectedOption {
            field_id: PriceFieldId::new(10),
            field_label: "Level".into(),
            is_enter_qty: false,
            option: PriceOption {
                id: PriceOptionId::new(100),
                label: "Gold".into(),
                amount: usd(amount),
                membership_type_id: Some(MembershipTypeId::new(1)),
                membership_num_terms: Some(1),
                financial_type_id: None,
                tax_rate_basis_points: tax,
            },
            quantity,
        }
    }

    #[test]
    fn option_line_applies_quantity_and_tax() {
        let line = LineItem::from_option(FundingId::new(), &selected(1001, 2, Some(825)), FinancialTypeId::new(2))
            .unwrap();
        assert_eq!(line.line_total, usd(2002));
        // 8.25% of 20.02 = 1.65165 -> 1.65
        assert_eq!(line.tax_amount, usd(165));
        assert_eq!(line.gross().unwrap(), usd(2167));
        assert_eq!(line.financial_type_id, FinancialTypeId::new(2));
    }

    #[test]
    fn totals_sum_gross_amounts() {
        let funding_id = FundingId::new();
        let lines = vec![
            LineItem::from_option(funding_id, &selected(2500, 1, None), FinancialTypeId::new(2)).unwrap(),
            LineItem::from_option(funding_id, &selected(1000, 1, Some(1000)), FinancialTypeId::new(2))
                .unwrap(),
        ];
        assert_eq!(total_of(&lines).unwrap(), Some(usd(3600)));
        assert_eq!(total_of(&[]).unwrap(), None);
    }

    #[test]
    fn enter_quantity_lines_do_not_fund_a_type() {
        let mut extra = selected(500, 3, None);
        extra.is_enter_qty = true;
        let line = LineItem::from_option(FundingId::new(), &extra, FinancialTypeId::new(2)).unwrap();
        assert_eq!(line.membership_type_id, None);
        assert_eq!(line.line_total, usd(1500));
    }
}
