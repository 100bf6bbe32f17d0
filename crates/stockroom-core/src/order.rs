//! # Order Math
//!
//! Line items, order-level discount and totals, plus the item diff recorded
//! when an order is edited.
//!
//! ## Calculation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  For each line:                                                         │
//! │    effective  = sales_price - round(sales_price × line_discount)        │
//! │    line_total = effective × quantity                                    │
//! │    profit     = effective - cost           (per unit)                   │
//! │                                                                         │
//! │  Order:                                                                 │
//! │    subtotal   = Σ line_total                                            │
//! │    discount   = min(subtotal, pct of subtotal | fixed amount)           │
//! │    total      = subtotal - discount                                     │
//! │    profit     = Σ profit × quantity - discount                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Worked Example
//! ```text
//! Line 1: 100.00 × 2, 10% off  → 90.00 × 2 = 180.00
//! Line 2:  50.00 × 1,  0% off  → 50.00 × 1 =  50.00
//!                                 subtotal  = 230.00
//! Order discount 5%              → −11.50
//!                                 total     = 218.50
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Rate};
use crate::types::{OrderDiscount, OrderItem, OrderLineInput, Product};
use crate::validation::{out_of_money_range, ValidationResult};

// =============================================================================
// Line Items
// =============================================================================

/// Builds an order line from the product's current state.
///
/// Price, cost, name and sorting code are copied; the line never looks at
/// the product again.
pub fn build_item(product: &Product, line: &OrderLineInput) -> ValidationResult<OrderItem> {
    let sales_price = product.sales_price();
    let cost = product.pricing.cost();
    let effective = sales_price
        .apply_discount(Rate::from_bps(line.discount_bps))
        .ok_or_else(|| out_of_money_range("effective_price_cents"))?;
    let profit = effective
        .checked_sub(cost)
        .ok_or_else(|| out_of_money_range("profit_at_time_cents"))?;
    let line_total = effective
        .checked_mul(line.quantity)
        .ok_or_else(|| out_of_money_range("line_total_cents"))?;

    Ok(OrderItem {
        product_id: product.id.clone(),
        product_name: product.display_name(),
        sorting_code: product.sorting_code.clone(),
        quantity: line.quantity,
        sales_price_at_time_cents: sales_price.cents(),
        cost_at_time_cents: cost.cents(),
        discount_bps: line.discount_bps,
        effective_price_cents: effective.cents(),
        profit_at_time_cents: profit.cents(),
        line_total_cents: line_total.cents(),
    })
}

/// Advisory check that the product currently has enough stock for a line.
///
/// Nothing is reserved; mark-paid checks again inside its transaction.
pub fn check_available(product: &Product, quantity: i64) -> CoreResult<()> {
    if product.stock_quantity < quantity {
        return Err(CoreError::InsufficientStock {
            product: product.display_name(),
            available: product.stock_quantity,
            requested: quantity,
        });
    }
    Ok(())
}

// =============================================================================
// Totals
// =============================================================================

/// Totals of an order, all in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderTotals {
    pub subtotal_cents: i64,
    pub discount_amount_cents: i64,
    pub total_sales_price_cents: i64,
    pub total_profit_cents: i64,
}

impl OrderTotals {
    /// Computes totals for a set of lines and an order-level discount.
    ///
    /// ## Errors
    /// `OutOfRange` when a sum leaves the `i64` range.
    ///
    /// ```rust
    /// use stockroom_core::order::OrderTotals;
    /// use stockroom_core::types::OrderDiscount;
    ///
    /// let totals = OrderTotals::compute(&[], &OrderDiscount::Fixed { amount_cents: 500 }).unwrap();
    /// assert_eq!(totals.total_sales_price_cents, 0); // discount clamped to the subtotal
    /// ```
    pub fn compute(items: &[OrderItem], discount: &OrderDiscount) -> ValidationResult<Self> {
        let subtotal = Money::checked_sum(items.iter().map(OrderItem::line_total))
            .ok_or_else(|| out_of_money_range("subtotal_cents"))?;
        let gross_profit = items
            .iter()
            .map(OrderItem::line_profit)
            .try_fold(Money::zero(), |acc, profit| acc.checked_add(profit?))
            .ok_or_else(|| out_of_money_range("total_profit_cents"))?;

        let discount_amount = match discount {
            OrderDiscount::None => Some(Money::zero()),
            OrderDiscount::Percentage { rate_bps } => subtotal.percentage(Rate::from_bps(*rate_bps)),
            OrderDiscount::Fixed { amount_cents } => Some(Money::from_cents(*amount_cents)),
        }
        .ok_or_else(|| out_of_money_range("discount_amount_cents"))?
        .min(subtotal);

        let total = subtotal
            .checked_sub(discount_amount)
            .ok_or_else(|| out_of_money_range("total_sales_price_cents"))?;
        let profit = gross_profit
            .checked_sub(discount_amount)
            .ok_or_else(|| out_of_money_range("total_profit_cents"))?;

        Ok(OrderTotals {
            subtotal_cents: subtotal.cents(),
            discount_amount_cents: discount_amount.cents(),
            total_sales_price_cents: total.cents(),
            total_profit_cents: profit.cents(),
        })
    }
}

// =============================================================================
// Item Diff
// =============================================================================

/// A line present before and after an edit whose quantity or discount moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemChange {
    pub product_id: String,
    pub product_name: String,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub discount_bps_before: u32,
    pub discount_bps_after: u32,
}

/// Change summary between two item lists, keyed by product id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ItemDiff {
    pub added: Vec<OrderItem>,
    pub removed: Vec<OrderItem>,
    pub modified: Vec<ItemChange>,
}

impl ItemDiff {
    /// Diffs `before` against `after`. Output keeps the order of the input lists.
    pub fn between(before: &[OrderItem], after: &[OrderItem]) -> Self {
        let find = |items: &[OrderItem], id: &str| items.iter().position(|i| i.product_id == id);

        let added = after
            .iter()
            .filter(|item| find(before, &item.product_id).is_none())
            .cloned()
            .collect();

        let removed = before
            .iter()
            .filter(|item| find(after, &item.product_id).is_none())
            .cloned()
            .collect();

        let modified = after
            .iter()
            .filter_map(|new| {
                let old = &before[find(before, &new.product_id)?];
                (old.quantity != new.quantity || old.discount_bps != new.discount_bps).then(|| {
                    ItemChange {
                        product_id: new.product_id.clone(),
                        product_name: new.product_name.clone(),
                        quantity_before: old.quantity,
                        quantity_after: new.quantity,
                        discount_bps_before: old.discount_bps,
                        discount_bps_after: new.discount_bps,
                    }
                })
            })
            .collect();

        ItemDiff {
            added,
            removed,
            modified,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::pricing::compute_pricing;
    use crate::validation::MAX_MONEY_CENTS;
    use crate::MAX_ITEM_QUANTITY;
    use chrono::Utc;

    fn product(id: &str, cost: i64, markup: i64, stock: i64) -> Product {
        Product {
            id: id.to_string(),
            brand: "Acme".to_string(),
            name: id.to_string(),
            volume: None,
            sorting_code: format!("ACME-{}", id.to_uppercase()),
            description: None,
            stock_quantity: stock,
            pricing: compute_pricing(Money::from_cents(cost), None, Some(Money::from_cents(markup)))
                .unwrap(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn line(product_id: &str, quantity: i64, discount_bps: u32) -> OrderLineInput {
        OrderLineInput {
            product_id: product_id.to_string(),
            quantity,
            discount_bps,
        }
    }

    #[test]
    fn test_worked_example() {
        let a = product("a", 6000, 4000, 10); // sells at 100.00
        let b = product("b", 3000, 2000, 10); // sells at 50.00

        let items = vec![
            build_item(&a, &line("a", 2, 1000)).unwrap(),
            build_item(&b, &line("b", 1, 0)).unwrap(),
        ];
        assert_eq!(items[0].effective_price_cents, 9000);
        assert_eq!(items[0].line_total_cents, 18000);

        let totals =
            OrderTotals::compute(&items, &OrderDiscount::Percentage { rate_bps: 500 }).unwrap();
        assert_eq!(totals.subtotal_cents, 23000);
        assert_eq!(totals.discount_amount_cents, 1150);
        assert_eq!(totals.total_sales_price_cents, 21850);
        // (90 - 60) × 2 + (50 - 30) × 1 - 11.50
        assert_eq!(totals.total_profit_cents, 6000 + 2000 - 1150);
    }

    #[test]
    fn test_fixed_discount_is_clamped() {
        let a = product("a", 100, 100, 10);
        let items = vec![build_item(&a, &line("a", 1, 0)).unwrap()];
        let totals =
            OrderTotals::compute(&items, &OrderDiscount::Fixed { amount_cents: 10_000 }).unwrap();
        assert_eq!(totals.discount_amount_cents, 200);
        assert_eq!(totals.total_sales_price_cents, 0);
        assert_eq!(totals.total_profit_cents, -100);
    }

    #[test]
    fn test_snapshot_does_not_follow_product() {
        let mut a = product("a", 1000, 500, 10);
        let item = build_item(&a, &line("a", 1, 0)).unwrap();
        a.pricing = compute_pricing(Money::from_cents(9999), None, Some(Money::from_cents(1))).unwrap();
        assert_eq!(item.sales_price_at_time_cents, 1500);
        assert_eq!(item.cost_at_time_cents, 1000);
    }

    #[test]
    fn test_largest_accepted_line() {
        let max = product("max", MAX_MONEY_CENTS, MAX_MONEY_CENTS, MAX_ITEM_QUANTITY);
        let item = build_item(&max, &line("max", MAX_ITEM_QUANTITY, 0)).unwrap();
        assert_eq!(item.line_total_cents, 2 * MAX_MONEY_CENTS * MAX_ITEM_QUANTITY);

        let items = vec![item.clone(), item];
        let totals = OrderTotals::compute(
            &items,
            &OrderDiscount::Fixed {
                amount_cents: MAX_MONEY_CENTS,
            },
        )
        .unwrap();
        assert_eq!(totals.subtotal_cents, 4 * MAX_MONEY_CENTS * MAX_ITEM_QUANTITY);
        assert_eq!(totals.discount_amount_cents, MAX_MONEY_CENTS);
        assert_eq!(
            totals.total_sales_price_cents,
            totals.subtotal_cents - MAX_MONEY_CENTS
        );
    }

    #[test]
    fn test_overflowing_totals_rejected() {
        let a = product("a", 100, 100, 10);
        let mut item = build_item(&a, &line("a", 1, 0)).unwrap();
        item.line_total_cents = i64::MAX;
        item.profit_at_time_cents = i64::MAX;

        let err = OrderTotals::compute(&[item.clone(), item], &OrderDiscount::None).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { .. }));

        let mut wide = a.clone();
        wide.pricing.sales_price_cents = i64::MAX / 2;
        let err = build_item(&wide, &line("a", 3, 0)).unwrap_err();
        assert_eq!(err, out_of_money_range("line_total_cents"));
    }

    #[test]
    fn test_check_available() {
        let a = product("a", 100, 100, 3);
        assert!(check_available(&a, 3).is_ok());
        match check_available(&a, 4).unwrap_err() {
            CoreError::InsufficientStock {
                available,
                requested,
                ..
            } => {
                assert_eq!(available, 3);
                assert_eq!(requested, 4);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_item_diff() {
        let a = product("a", 100, 100, 10);
        let b = product("b", 100, 100, 10);
        let c = product("c", 100, 100, 10);

        let build = |p: &Product, qty| build_item(p, &line(&p.id, qty, 0)).unwrap();
        let before = vec![build(&a, 1), build(&b, 1)];
        let after = vec![build(&b, 3), build(&c, 1)];

        let diff = ItemDiff::between(&before, &after);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].product_id, "c");
        assert_eq!(diff.removed[0].product_id, "a");
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].quantity_before, 1);
        assert_eq!(diff.modified[0].quantity_after, 3);

        assert!(ItemDiff::between(&before, &before).is_empty());
    }
}
