//! # Stock Ledger
//!
//! The mark-paid transition: the only operation that moves stock.
//!
//! ## Mark-Paid Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  run_transaction(MarkPaid)                         retried on conflict  │
//! │                                                                         │
//! │  1. read order ─────────────── missing ──► NotFound                    │
//! │                 ─────────────── Paid    ──► Conflict                    │
//! │  2. sum demand per product                                              │
//! │  3. read every product ─────── missing ──► NotFound                    │
//! │  4. stock < demand ──────────────────────► InsufficientStock           │
//! │  5. buffer: product.stock -= demand   (each product)                   │
//! │             order.status = Paid, paid_at = now                          │
//! │             activity entry                                              │
//! │  6. commit ── version changed under us ──► WriteConflict → retry (1)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Steps 1 to 5 only buffer; an error anywhere means nothing was written.
//! Two payments racing for the same product cannot both commit against the
//! same stock version, so stock never goes negative.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::activity::Activity;
use crate::error::{EngineError, EngineResult};
use stockroom_core::order::check_available;
use stockroom_core::validation::validate_id;
use stockroom_core::{ActivityAction, CoreError, EntityType, Order, PaymentStatus, Product};
use stockroom_db::{run_transaction, Collection, DocumentStore, Transaction, TransactionWork};

/// Stock movement recorded with a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockMovement {
    pub product_id: String,
    pub quantity: i64,
    pub stock_before: i64,
    pub stock_after: i64,
}

#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn DocumentStore>,
}

impl StockLedger {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        StockLedger { store }
    }

    /// Marks an order Paid and deducts its stock, atomically.
    ///
    /// ## Errors
    /// - `NotFound` for a missing order or product
    /// - `Conflict` when the order is already Paid
    /// - `InsufficientStock` naming the first product that cannot cover its demand
    /// - `RetriesExhausted` (code `CONFLICT`) when contention outlasts the retry budget
    pub async fn mark_paid(&self, order_id: &str) -> EngineResult<Order> {
        validate_id("id", order_id)?;
        let work = MarkPaid {
            order_id: order_id.to_string(),
        };
        let order = run_transaction(self.store.as_ref(), &work).await?;
        info!(
            order_id,
            total = %order.total_sales_price(),
            "Order marked paid"
        );
        Ok(order)
    }
}

struct MarkPaid {
    order_id: String,
}

impl MarkPaid {
    /// Quantity per product, in first-appearance order.
    fn demand(order: &Order) -> Vec<(String, i64)> {
        let mut demand: Vec<(String, i64)> = Vec::new();
        for item in &order.items {
            match demand.iter_mut().find(|(id, _)| *id == item.product_id) {
                Some((_, qty)) => *qty += item.quantity,
                None => demand.push((item.product_id.clone(), item.quantity)),
            }
        }
        demand
    }
}

#[async_trait]
impl TransactionWork for MarkPaid {
    type Output = Order;
    type Error = EngineError;

    async fn run(&self, tx: &mut dyn Transaction) -> EngineResult<Order> {
        let mut order: Order = tx
            .read_as(Collection::Orders, &self.order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", &self.order_id))?;

        if order.is_paid() {
            return Err(CoreError::conflict("Order", &self.order_id, "order is already paid").into());
        }

        let mut products = Vec::new();
        for (product_id, quantity) in Self::demand(&order) {
            let product: Product = tx
                .read_as(Collection::Products, &product_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Product", &product_id))?;
            products.push((product, quantity));
        }

        for (product, quantity) in &products {
            check_available(product, *quantity)?;
        }

        let now = Utc::now();
        let mut movements = Vec::with_capacity(products.len());
        for (mut product, quantity) in products {
            let stock_before = product.stock_quantity;
            product.stock_quantity -= quantity;
            product.updated_at = now;
            tx.write_as(Collection::Products, &product.id, &product)?;

            movements.push(StockMovement {
                product_id: product.id,
                quantity,
                stock_before,
                stock_after: stock_before - quantity,
            });
        }

        order.payment_status = PaymentStatus::Paid;
        order.paid_at = Some(now);
        order.updated_at = now;
        tx.write_as(Collection::Orders, &order.id, &order)?;

        Activity::new(ActivityAction::Update, EntityType::Order)
            .entity(&order.id)
            .describe(format!(
                "Marked order for {} as paid ({})",
                order.customer_name,
                order.total_sales_price()
            ))
            .data(json!({
                "payment_status": order.payment_status,
                "paid_at": now,
                "stock": movements,
            }))
            .write_in(tx, now)?;

        Ok(order)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::orders::OrderService;
    use crate::products::ProductService;
    use stockroom_core::{OrderDiscount, OrderInput, OrderLineInput, ProductInput, ProductPatch};
    use stockroom_db::{ActivityLogRepository, Database, DbConfig};

    struct Fixture {
        store: Arc<dyn DocumentStore>,
        products: ProductService,
        orders: OrderService,
        ledger: StockLedger,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = db.store();
        Fixture {
            products: ProductService::new(store.clone()),
            orders: OrderService::new(store.clone()),
            ledger: StockLedger::new(store.clone()),
            store,
        }
    }

    async fn product(f: &Fixture, name: &str, stock: i64) -> Product {
        f.products
            .create(ProductInput {
                brand: "Acme".to_string(),
                name: name.to_string(),
                volume: None,
                description: None,
                stock_quantity: stock,
                cost_cents: 500,
                markup_bps: Some(5000),
                markup_amount_cents: None,
            })
            .await
            .unwrap()
    }

    async fn order(f: &Fixture, lines: &[(&str, i64)]) -> Order {
        f.orders
            .create(OrderInput {
                customer_name: "Jane".to_string(),
                customer_address: None,
                items: lines
                    .iter()
                    .map(|(id, qty)| OrderLineInput {
                        product_id: id.to_string(),
                        quantity: *qty,
                        discount_bps: 0,
                    })
                    .collect(),
                discount: OrderDiscount::None,
            })
            .await
            .unwrap()
    }

    async fn log_len(f: &Fixture) -> usize {
        ActivityLogRepository::new(f.store.clone()).all().await.unwrap().len()
    }

    #[tokio::test]
    async fn test_mark_paid_deducts_stock() {
        let f = fixture().await;
        let soap = product(&f, "Soap", 5).await;
        let oil = product(&f, "Oil", 2).await;
        let o = order(&f, &[(&soap.id, 3), (&oil.id, 2)]).await;

        let paid = f.ledger.mark_paid(&o.id).await.unwrap();
        assert!(paid.is_paid());
        assert!(paid.paid_at.is_some());
        assert_eq!(paid.items, o.items);
        assert_eq!(paid.total_sales_price_cents, o.total_sales_price_cents);

        assert_eq!(f.products.get(&soap.id).await.unwrap().stock_quantity, 2);
        assert_eq!(f.products.get(&oil.id).await.unwrap().stock_quantity, 0);
        assert!(f.orders.get(&o.id).await.unwrap().is_paid());
    }

    #[tokio::test]
    async fn test_double_mark_paid_conflicts_without_writes() {
        let f = fixture().await;
        let soap = product(&f, "Soap", 5).await;
        let o = order(&f, &[(&soap.id, 1)]).await;
        f.ledger.mark_paid(&o.id).await.unwrap();

        let entries_before = log_len(&f).await;
        let version_before = f.store.get(Collection::Orders, &o.id).await.unwrap().unwrap().version;

        let err = f.ledger.mark_paid(&o.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert!(matches!(err, EngineError::Core(CoreError::Conflict { .. })));

        assert_eq!(f.products.get(&soap.id).await.unwrap().stock_quantity, 4);
        assert_eq!(log_len(&f).await, entries_before);
        let version_after = f.store.get(Collection::Orders, &o.id).await.unwrap().unwrap().version;
        assert_eq!(version_after, version_before);
    }

    #[tokio::test]
    async fn test_insufficient_stock_aborts_everything() {
        let f = fixture().await;
        let soap = product(&f, "Soap", 5).await;
        let oil = product(&f, "Oil", 2).await;
        let o = order(&f, &[(&soap.id, 1), (&oil.id, 2)]).await;

        // stock drops after the order was created
        f.products
            .update(
                &oil.id,
                ProductPatch {
                    stock_quantity: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = f.ledger.mark_paid(&o.id).await.unwrap_err();
        match err {
            EngineError::Core(CoreError::InsufficientStock {
                product,
                available,
                requested,
            }) => {
                assert_eq!(product, "Acme Oil");
                assert_eq!(available, 1);
                assert_eq!(requested, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(f.products.get(&soap.id).await.unwrap().stock_quantity, 5);
        assert_eq!(f.products.get(&oil.id).await.unwrap().stock_quantity, 1);
        assert!(!f.orders.get(&o.id).await.unwrap().is_paid());
    }

    #[tokio::test]
    async fn test_missing_product_is_not_found() {
        let f = fixture().await;
        let soap = product(&f, "Soap", 5).await;
        let o = order(&f, &[(&soap.id, 1)]).await;
        f.products.delete(&soap.id).await.unwrap();

        let err = f.ledger.mark_paid(&o.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(!f.orders.get(&o.id).await.unwrap().is_paid());

        let err = f.ledger.mark_paid("missing").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_concurrent_payments_never_oversell() {
        let f = fixture().await;
        let soap = product(&f, "Soap", 3).await;
        let oil = product(&f, "Oil", 10).await;

        let mut ids = Vec::new();
        for _ in 0..4 {
            ids.push(order(&f, &[(&soap.id, 1), (&oil.id, 2)]).await.id);
        }

        let mut handles = Vec::new();
        for id in ids {
            let ledger = f.ledger.clone();
            handles.push(tokio::spawn(async move { ledger.mark_paid(&id).await }));
        }

        let mut paid = 0;
        let mut short = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => paid += 1,
                Err(EngineError::Core(CoreError::InsufficientStock { .. })) => short += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(paid, 3);
        assert_eq!(short, 1);
        assert_eq!(f.products.get(&soap.id).await.unwrap().stock_quantity, 0);
        assert_eq!(f.products.get(&oil.id).await.unwrap().stock_quantity, 4);
    }

    #[test]
    fn test_demand_is_summed_per_product() {
        let mut order: Order = serde_json::from_value(json!({
            "id": "o", "customer_name": "c", "customer_address": null,
            "order_date": "2026-01-01T00:00:00Z", "payment_status": "pending",
            "items": [], "discount": { "type": "none" },
            "subtotal_cents": 0, "discount_amount_cents": 0,
            "total_sales_price_cents": 0, "total_profit_cents": 0,
            "created_at": "2026-01-01T00:00:00Z", "updated_at": "2026-01-01T00:00:00Z",
            "paid_at": null, "restored_at": null
        }))
        .unwrap();
        let item = json!({
            "product_id": "a", "product_name": "A", "sorting_code": "A", "quantity": 2,
            "sales_price_at_time_cents": 100, "cost_at_time_cents": 50, "discount_bps": 0,
            "effective_price_cents": 100, "profit_at_time_cents": 50, "line_total_cents": 200
        });
        order.items.push(serde_json::from_value(item.clone()).unwrap());
        let mut b: stockroom_core::OrderItem = serde_json::from_value(item.clone()).unwrap();
        b.product_id = "b".to_string();
        order.items.push(b);
        order.items.push(serde_json::from_value(item).unwrap());

        assert_eq!(
            MarkPaid::demand(&order),
            vec![("a".to_string(), 4), ("b".to_string(), 2)]
        );
    }
}
