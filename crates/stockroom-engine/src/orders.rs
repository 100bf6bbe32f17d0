//! # Order Service
//!
//! Builds orders from current product prices and drives them to the recycle
//! bin. Payment lives in [`crate::ledger`].
//!
//! ## Order State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   create() ──► ┌─────────┐  mark_paid()  ┌──────┐                       │
//! │                │ Pending │──────────────►│ Paid │                       │
//! │   update() ──► └────┬────┘  (ledger)     └──┬───┘                       │
//! │   (items rebuilt)   │                       │  update() ──► Conflict    │
//! │                     │ delete()              │ delete()                  │
//! │                     ▼                       ▼                           │
//! │               ┌──────────────────────────────────┐                      │
//! │               │ Recycle bin (50 days)            │──► restore() = new id│
//! │               └──────────────────────────────────┘                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Creating or editing an order checks stock but reserves nothing; only
//! payment deducts.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::activity::Activity;
use crate::error::{EngineError, EngineResult, ErrorResponse};
use stockroom_core::order::{build_item, check_available, ItemDiff, OrderTotals};
use stockroom_core::validation::{
    normalize_optional, validate_id, validate_order_input, validate_required,
    MAX_CUSTOMER_FIELD_LEN,
};
use stockroom_core::{
    ActivityAction, CoreError, EntityType, Order, OrderDiscount, OrderInput, OrderItem,
    OrderLineInput, PaymentStatus, RecycleBinEntry, RECYCLE_BIN_TTL_DAYS,
};
use stockroom_db::{
    run_transaction, Collection, DbError, DocumentStore, OrderRepository, ProductRepository,
    Transaction, TransactionWork,
};

/// Result of deleting one id of a bulk delete.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub id: String,
    pub deleted: bool,
    pub recycle_entry_id: Option<String>,
    pub error: Option<ErrorResponse>,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn DocumentStore>,
    orders: OrderRepository,
    products: ProductRepository,
}

impl OrderService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        OrderService {
            orders: OrderRepository::new(store.clone()),
            products: ProductRepository::new(store.clone()),
            store,
        }
    }

    /// Orders, newest first.
    pub async fn list(&self) -> EngineResult<Vec<Order>> {
        Ok(self.orders.list().await?)
    }

    pub async fn get(&self, id: &str) -> EngineResult<Order> {
        validate_id("id", id)?;
        self.orders
            .get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", id).into())
    }

    /// Creates a Pending order.
    ///
    /// ## Errors
    /// - `ValidationError` for a blank customer name, no lines, or a bad line
    /// - `NotFound` when a line names a missing product
    /// - `InsufficientStock` when a product cannot currently cover its line
    pub async fn create(&self, input: OrderInput) -> EngineResult<Order> {
        let (customer_name, customer_address) = validate_customer(&input)?;
        let items = self.build_items(&input.items).await?;
        let totals = OrderTotals::compute(&items, &input.discount)?;

        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4().to_string(),
            customer_name,
            customer_address,
            order_date: now,
            payment_status: PaymentStatus::Pending,
            items,
            discount: input.discount,
            subtotal_cents: totals.subtotal_cents,
            discount_amount_cents: totals.discount_amount_cents,
            total_sales_price_cents: totals.total_sales_price_cents,
            total_profit_cents: totals.total_profit_cents,
            created_at: now,
            updated_at: now,
            paid_at: None,
            restored_at: None,
        };

        let order = run_transaction(self.store.as_ref(), &InsertOrder { order }).await?;
        info!(
            id = %order.id,
            items = order.items.len(),
            total = %order.total_sales_price(),
            "Order created"
        );
        Ok(order)
    }

    /// Rebuilds a Pending order's lines and totals from the payload.
    ///
    /// The item list is replaced, not merged. The activity entry carries the
    /// added, removed and modified lines.
    ///
    /// ## Errors
    /// Same as [`create`](Self::create), plus `NotFound` for a missing order
    /// and `Conflict` for a Paid one.
    pub async fn update(&self, id: &str, input: OrderInput) -> EngineResult<Order> {
        validate_id("id", id)?;
        let (customer_name, customer_address) = validate_customer(&input)?;
        let items = self.build_items(&input.items).await?;

        let work = ReviseOrder {
            id: id.to_string(),
            customer_name,
            customer_address,
            totals: OrderTotals::compute(&items, &input.discount)?,
            items,
            discount: input.discount,
        };
        let order = run_transaction(self.store.as_ref(), &work).await?;
        debug!(id, total = %order.total_sales_price(), "Order updated");
        Ok(order)
    }

    /// Moves an order into the recycle bin.
    pub async fn delete(&self, id: &str) -> EngineResult<RecycleBinEntry> {
        validate_id("id", id)?;
        let work = RecycleOrder { id: id.to_string() };
        let entry = run_transaction(self.store.as_ref(), &work).await?;
        info!(
            order_id = id,
            entry_id = %entry.id,
            expires_at = %entry.expires_at,
            "Order moved to recycle bin"
        );
        Ok(entry)
    }

    /// Deletes each id independently; one failure does not undo the others.
    pub async fn delete_many(&self, ids: &[String]) -> Vec<DeleteOutcome> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = match self.delete(id).await {
                Ok(entry) => DeleteOutcome {
                    id: id.clone(),
                    deleted: true,
                    recycle_entry_id: Some(entry.id),
                    error: None,
                },
                Err(err) => {
                    warn!(id = %id, error = %err, "Bulk delete skipped order");
                    DeleteOutcome {
                        id: id.clone(),
                        deleted: false,
                        recycle_entry_id: None,
                        error: Some(ErrorResponse::from(&err)),
                    }
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Snapshots every line from the product as it is now.
    async fn build_items(&self, lines: &[OrderLineInput]) -> EngineResult<Vec<OrderItem>> {
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let product = self
                .products
                .get(&line.product_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Product", &line.product_id))?;
            check_available(&product, line.quantity)?;
            items.push(build_item(&product, line)?);
        }
        Ok(items)
    }
}

/// Validates the payload and returns the trimmed customer fields.
fn validate_customer(input: &OrderInput) -> EngineResult<(String, Option<String>)> {
    validate_order_input(input)?;
    let name = validate_required("customer_name", &input.customer_name, MAX_CUSTOMER_FIELD_LEN)?;
    let address = normalize_optional(
        "customer_address",
        input.customer_address.as_deref(),
        MAX_CUSTOMER_FIELD_LEN,
    )?;
    Ok((name, address))
}

// =============================================================================
// Transactions
// =============================================================================

struct InsertOrder {
    order: Order,
}

#[async_trait]
impl TransactionWork for InsertOrder {
    type Output = Order;
    type Error = EngineError;

    async fn run(&self, tx: &mut dyn Transaction) -> EngineResult<Order> {
        let order = &self.order;
        // read as absent so the commit refuses an id taken meanwhile
        if tx.read(Collection::Orders, &order.id).await?.is_some() {
            return Err(DbError::duplicate("orders.id", order.id.as_str()).into());
        }

        tx.write_as(Collection::Orders, &order.id, order)?;
        Activity::new(ActivityAction::Create, EntityType::Order)
            .entity(&order.id)
            .describe(format!(
                "Created order for {} ({})",
                order.customer_name,
                order.total_sales_price()
            ))
            .data(serde_json::to_value(order)?)
            .write_in(tx, order.created_at)?;

        Ok(order.clone())
    }
}

struct ReviseOrder {
    id: String,
    customer_name: String,
    customer_address: Option<String>,
    items: Vec<OrderItem>,
    discount: OrderDiscount,
    totals: OrderTotals,
}

#[async_trait]
impl TransactionWork for ReviseOrder {
    type Output = Order;
    type Error = EngineError;

    async fn run(&self, tx: &mut dyn Transaction) -> EngineResult<Order> {
        let mut order: Order = tx
            .read_as(Collection::Orders, &self.id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", &self.id))?;

        if order.is_paid() {
            return Err(CoreError::conflict("Order", &self.id, "paid orders cannot be edited").into());
        }

        let changes = ItemDiff::between(&order.items, &self.items);
        let before = OrderTotals {
            subtotal_cents: order.subtotal_cents,
            discount_amount_cents: order.discount_amount_cents,
            total_sales_price_cents: order.total_sales_price_cents,
            total_profit_cents: order.total_profit_cents,
        };

        let now = Utc::now();
        order.customer_name = self.customer_name.clone();
        order.customer_address = self.customer_address.clone();
        order.items = self.items.clone();
        order.discount = self.discount;
        order.subtotal_cents = self.totals.subtotal_cents;
        order.discount_amount_cents = self.totals.discount_amount_cents;
        order.total_sales_price_cents = self.totals.total_sales_price_cents;
        order.total_profit_cents = self.totals.total_profit_cents;
        order.updated_at = now;

        tx.write_as(Collection::Orders, &order.id, &order)?;
        Activity::new(ActivityAction::Update, EntityType::Order)
            .entity(&order.id)
            .describe(format!(
                "Updated order for {}: {} added, {} removed, {} modified",
                order.customer_name,
                changes.added.len(),
                changes.removed.len(),
                changes.modified.len()
            ))
            .data(json!({
                "changes": changes,
                "totals": { "before": before, "after": self.totals },
            }))
            .write_in(tx, now)?;

        Ok(order)
    }
}

struct RecycleOrder {
    id: String,
}

#[async_trait]
impl TransactionWork for RecycleOrder {
    type Output = RecycleBinEntry;
    type Error = EngineError;

    async fn run(&self, tx: &mut dyn Transaction) -> EngineResult<RecycleBinEntry> {
        let order: Order = tx
            .read_as(Collection::Orders, &self.id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", &self.id))?;

        let now = Utc::now();
        let entry = RecycleBinEntry {
            id: Uuid::new_v4().to_string(),
            original_id: order.id.clone(),
            entity_type: EntityType::Order,
            deleted_at: now,
            expires_at: now + Duration::days(RECYCLE_BIN_TTL_DAYS),
            snapshot: serde_json::to_value(&order)?,
        };

        tx.write_as(Collection::RecycleBin, &entry.id, &entry)?;
        tx.delete(Collection::Orders, &order.id);
        Activity::new(ActivityAction::Delete, EntityType::Order)
            .entity(&order.id)
            .describe(format!("Moved order for {} to the recycle bin", order.customer_name))
            .data(json!({
                "recycle_entry_id": entry.id,
                "expires_at": entry.expires_at,
                "total_sales_price_cents": order.total_sales_price_cents,
            }))
            .write_in(tx, now)?;

        Ok(entry)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
