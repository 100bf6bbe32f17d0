//! # Dashboard
//!
//! Feeds the full order list to [`DashboardStats::compute`].

use std::sync::Arc;

use crate::error::EngineResult;
use stockroom_core::stats::DashboardStats;
use stockroom_core::TOP_PRODUCTS_LIMIT;
use stockroom_db::{DocumentStore, OrderRepository};

#[derive(Clone)]
pub struct Dashboard {
    orders: OrderRepository,
}

impl Dashboard {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Dashboard {
            orders: OrderRepository::new(store),
        }
    }

    pub async fn stats(&self) -> EngineResult<DashboardStats> {
        let orders = self.orders.list().await?;
        Ok(DashboardStats::compute(&orders, TOP_PRODUCTS_LIMIT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::StockLedger;
    use crate::orders::OrderService;
    use crate::products::ProductService;
    use stockroom_core::{OrderDiscount, OrderInput, OrderLineInput, ProductInput};
    use stockroom_db::{Database, DbConfig};

    #[tokio::test]
    async fn test_counts_paid_orders_only() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = db.store();
        let product = ProductService::new(store.clone())
            .create(ProductInput {
                brand: "Acme".to_string(),
                name: "Soap".to_string(),
                volume: None,
                description: None,
                stock_quantity: 10,
                cost_cents: 100,
                markup_bps: None,
                markup_amount_cents: Some(100),
            })
            .await
            .unwrap();

        let orders = OrderService::new(store.clone());
        let input = |quantity| OrderInput {
            customer_name: "Jane".to_string(),
            customer_address: None,
            items: vec![OrderLineInput {
                product_id: product.id.clone(),
                quantity,
                discount_bps: 0,
            }],
            discount: OrderDiscount::None,
        };
        let paid = orders.create(input(3)).await.unwrap();
        orders.create(input(1)).await.unwrap();
        StockLedger::new(store.clone()).mark_paid(&paid.id).await.unwrap();

        let stats = Dashboard::new(store).stats().await.unwrap();
        assert_eq!(stats.paid_orders, 1);
        assert_eq!(stats.pending_orders, 1);
        assert_eq!(stats.total_revenue_cents, 600);
        assert_eq!(stats.total_profit_cents, 300);
        assert_eq!(stats.daily.len(), 1);
        assert_eq!(stats.top_products[0].quantity, 3);
    }
}
