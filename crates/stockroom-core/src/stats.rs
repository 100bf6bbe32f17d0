//! # Dashboard Statistics
//!
//! Revenue and profit per day plus best-selling products, computed from paid
//! orders only. Pending orders have not moved stock and are not revenue yet.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::Order;

/// Totals for one UTC calendar day of `order_date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DailyStat {
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub revenue_cents: i64,
    pub profit_cents: i64,
    pub order_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TopProduct {
    pub product_id: String,
    /// Name on the most recent line seen for this product.
    pub product_name: String,
    pub quantity: i64,
    /// Σ line totals (before the order-level discount).
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DashboardStats {
    /// Oldest day first.
    pub daily: Vec<DailyStat>,
    /// Highest quantity first.
    pub top_products: Vec<TopProduct>,
    pub total_revenue_cents: i64,
    pub total_profit_cents: i64,
    pub paid_orders: u32,
    pub pending_orders: u32,
}

impl DashboardStats {
    /// Aggregates a full order list. Ties in the top list break on product id.
    ///
    /// Sums saturate at the `i64` bounds.
    pub fn compute(orders: &[Order], top_limit: usize) -> Self {
        let mut daily: BTreeMap<NaiveDate, DailyStat> = BTreeMap::new();
        let mut products: HashMap<&str, TopProduct> = HashMap::new();
        let mut stats = DashboardStats::default();

        for order in orders {
            if !order.is_paid() {
                stats.pending_orders += 1;
                continue;
            }
            stats.paid_orders += 1;
            stats.total_revenue_cents =
                stats.total_revenue_cents.saturating_add(order.total_sales_price_cents);
            stats.total_profit_cents =
                stats.total_profit_cents.saturating_add(order.total_profit_cents);

            let date = order.order_date.date_naive();
            let day = daily.entry(date).or_insert_with(|| DailyStat {
                date,
                revenue_cents: 0,
                profit_cents: 0,
                order_count: 0,
            });
            day.revenue_cents = day.revenue_cents.saturating_add(order.total_sales_price_cents);
            day.profit_cents = day.profit_cents.saturating_add(order.total_profit_cents);
            day.order_count += 1;

            for item in &order.items {
                let top = products
                    .entry(item.product_id.as_str())
                    .or_insert_with(|| TopProduct {
                        product_id: item.product_id.clone(),
                        product_name: item.product_name.clone(),
                        quantity: 0,
                        revenue_cents: 0,
                    });
                top.product_name = item.product_name.clone();
                top.quantity = top.quantity.saturating_add(item.quantity);
                top.revenue_cents = top.revenue_cents.saturating_add(item.line_total_cents);
            }
        }

        let mut top: Vec<TopProduct> = products.into_values().collect();
        top.sort_by(|a, b| {
            b.quantity
                .cmp(&a.quantity)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        top.truncate(top_limit);

        stats.daily = daily.into_values().collect();
        stats.top_products = top;
        stats
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
