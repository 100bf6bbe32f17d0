//! # Engine
//!
//! Executes a decoded [`Command`] against the services.
//!
//! ```text
//! Command::decode(verb, path, payload)       (stockroom-core)
//!        │
//!        ▼
//! Engine::dispatch(command) ─┬─► ProductService
//!                            ├─► OrderService
//!                            ├─► StockLedger        (MarkPaid)
//!                            ├─► RecycleBin
//!                            ├─► Dashboard
//!                            └─► ActivityLog
//!        │
//!        ▼
//! serde_json::Value response
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::activity::{ActivityLog, DEFAULT_ACTIVITY_LIMIT};
use crate::dashboard::Dashboard;
use crate::error::EngineResult;
use crate::ledger::StockLedger;
use crate::live::{LiveQuery, Subscription};
use crate::orders::OrderService;
use crate::products::ProductService;
use crate::recycle_bin::RecycleBin;
use stockroom_core::Command;
use stockroom_db::DocumentStore;

/// Every service over one store.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn DocumentStore>,
    products: ProductService,
    orders: OrderService,
    ledger: StockLedger,
    recycle_bin: RecycleBin,
    dashboard: Dashboard,
    activity: ActivityLog,
}

impl Engine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Engine {
            products: ProductService::new(store.clone()),
            orders: OrderService::new(store.clone()),
            ledger: StockLedger::new(store.clone()),
            recycle_bin: RecycleBin::new(store.clone()),
            dashboard: Dashboard::new(store.clone()),
            activity: ActivityLog::new(store.clone()),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn products(&self) -> &ProductService {
        &self.products
    }

    pub fn orders(&self) -> &OrderService {
        &self.orders
    }

    pub fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    pub fn recycle_bin(&self) -> &RecycleBin {
        &self.recycle_bin
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    /// Runs one command and serializes its result.
    ///
    /// Creates and restores answer with the new document, so the response
    /// always carries the assigned `id` at the top level.
    pub async fn dispatch(&self, command: Command) -> EngineResult<Value> {
        debug!(kind = command.kind(), path = %command.path(), "Dispatching command");

        match command {
            Command::ListProducts => respond(&self.products.list().await?),
            Command::GetProduct { id } => respond(&self.products.get(&id).await?),
            Command::CreateProduct { input } => respond(&self.products.create(input).await?),
            Command::UpdateProduct { id, patch } => {
                respond(&self.products.update(&id, patch).await?)
            }
            Command::DeleteProduct { id } => respond(&self.products.delete(&id).await?),

            Command::ListOrders => respond(&self.orders.list().await?),
            Command::GetOrder { id } => respond(&self.orders.get(&id).await?),
            Command::CreateOrder { input } => respond(&self.orders.create(input).await?),
            Command::UpdateOrder { id, input } => respond(&self.orders.update(&id, input).await?),
            Command::MarkPaid { id } => respond(&self.ledger.mark_paid(&id).await?),
            Command::DeleteOrder { id } => respond(&self.orders.delete(&id).await?),
            Command::DeleteOrders { ids } => respond(&self.orders.delete_many(&ids).await),

            Command::DashboardStats => respond(&self.dashboard.stats().await?),

            Command::ListRecycleBin => respond(&self.recycle_bin.list().await?),
            Command::GetRecycleEntry { id } => respond(&self.recycle_bin.get(&id).await?),
            Command::RestoreRecycleEntry { id } => respond(&self.recycle_bin.restore(&id).await?),
            Command::PurgeRecycleEntry { id } => respond(&self.recycle_bin.purge(&id).await?),
            Command::SweepRecycleBin => respond(&self.recycle_bin.sweep().await?),

            Command::ListActivity { limit } => respond(
                &self
                    .activity
                    .recent(limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT))
                    .await?,
            ),
        }
    }

    /// Attaches a live query. The first `next()` yields the current snapshot.
    pub fn subscribe(&self, query: LiveQuery) -> Subscription {
        Subscription::new(self.clone(), query)
    }
}

fn respond<T: Serialize>(value: &T) -> EngineResult<Value> {
    Ok(serde_json::to_value(value)?)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;
    use stockroom_core::{ActivityAction, Method};
    use stockroom_db::{ActivityLogRepository, Database, DbConfig};

    async fn engine() -> Engine {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        Engine::new(db.store())
    }

    async fn call(engine: &Engine, method: Method, path: &str, payload: Option<Value>) -> EngineResult<Value> {
        engine
            .dispatch(Command::decode(method, path, payload).unwrap())
            .await
    }

    async fn log_len(engine: &Engine) -> usize {
        ActivityLogRepository::new(engine.store().clone())
            .all()
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_full_order_flow_over_paths() {
        let engine = engine().await;

        let a = call(
            &engine,
            Method::Post,
            "/products",
            Some(json!({ "brand": "Acme", "name": "Soap", "stock_quantity": 5,
                         "cost_cents": 6000, "markup_amount_cents": 4000 })),
        )
        .await
        .unwrap();
        let b = call(
            &engine,
            Method::Post,
            "/products",
            Some(json!({ "brand": "Acme", "name": "Oil", "stock_quantity": 5,
                         "cost_cents": 3000, "markup_amount_cents": 2000 })),
        )
        .await
        .unwrap();
        assert_eq!(a["sales_price_cents"], json!(10000));

        let order = call(
            &engine,
            Method::Post,
            "/orders",
            Some(json!({
                "customer_name": "Jane",
                "items": [
                    { "product_id": a["id"], "quantity": 2, "discount_bps": 1000 },
                    { "product_id": b["id"], "quantity": 1 }
                ],
                "discount": { "type": "percentage", "rate_bps": 500 }
            })),
        )
        .await
        .unwrap();
        assert_eq!(order["subtotal_cents"], json!(23000));
        assert_eq!(order["discount_amount_cents"], json!(1150));
        assert_eq!(order["total_sales_price_cents"], json!(21850));
        assert_eq!(order["payment_status"], json!("pending"));

        let path = format!("/orders/{}", order["id"].as_str().unwrap());
        let paid = call(&engine, Method::Put, &path, Some(json!({ "action": "mark_paid" })))
            .await
            .unwrap();
        assert_eq!(paid["payment_status"], json!("paid"));

        let product = call(&engine, Method::Get, &format!("/products/{}", a["id"].as_str().unwrap()), None)
            .await
            .unwrap();
        assert_eq!(product["stock_quantity"], json!(3));

        let stats = call(&engine, Method::Get, "/dashboard-stats", None).await.unwrap();
        assert_eq!(stats["total_revenue_cents"], json!(21850));
        assert_eq!(stats["top_products"][0]["quantity"], json!(2));

        let err = call(&engine, Method::Put, &path, Some(json!({ "action": "mark_paid" })))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn test_every_mutation_logs_once() {
        let engine = engine().await;

        let product = call(
            &engine,
            Method::Post,
            "/products",
            Some(json!({ "brand": "Acme", "name": "Soap", "stock_quantity": 5,
                         "cost_cents": 100, "markup_bps": 5000 })),
        )
        .await
        .unwrap();
        assert_eq!(log_len(&engine).await, 1);

        let pid = product["id"].as_str().unwrap();
        call(&engine, Method::Put, &format!("/products/{pid}"), Some(json!({ "cost_cents": 200 })))
            .await
            .unwrap();
        assert_eq!(log_len(&engine).await, 2);

        let order = call(
            &engine,
            Method::Post,
            "/orders",
            Some(json!({ "customer_name": "Jane", "items": [{ "product_id": pid, "quantity": 1 }] })),
        )
        .await
        .unwrap();
        assert_eq!(log_len(&engine).await, 3);

        let oid = order["id"].as_str().unwrap();
        call(
            &engine,
            Method::Put,
            &format!("/orders/{oid}"),
            Some(json!({ "customer_name": "Jane", "items": [{ "product_id": pid, "quantity": 2 }] })),
        )
        .await
        .unwrap();
        assert_eq!(log_len(&engine).await, 4);

        let entry = call(&engine, Method::Delete, &format!("/orders/{oid}"), None)
            .await
            .unwrap();
        assert_eq!(log_len(&engine).await, 5);

        let eid = entry["id"].as_str().unwrap();
        let restored = call(&engine, Method::Post, &format!("/recycle-bin/{eid}/restore"), None)
            .await
            .unwrap();
        assert_eq!(log_len(&engine).await, 6);
        assert_ne!(restored["id"], order["id"]);

        // reads do not log
        call(&engine, Method::Get, "/orders", None).await.unwrap();
        call(&engine, Method::Get, "/recycle-bin", None).await.unwrap();
        assert_eq!(log_len(&engine).await, 6);

        // an empty sweep writes nothing
        let report = call(&engine, Method::Post, "/recycle-bin/sweep", None).await.unwrap();
        assert_eq!(report["removed"], json!(0));
        assert_eq!(log_len(&engine).await, 6);

        call(&engine, Method::Delete, &format!("/products/{pid}"), None)
            .await
            .unwrap();
        let log = call(&engine, Method::Get, "/activity-log?limit=2", None).await.unwrap();
        assert_eq!(log.as_array().unwrap().len(), 2);
        assert_eq!(
            log[0]["action"],
            serde_json::to_value(ActivityAction::Delete).unwrap()
        );
    }

    /// Makes every activity-log write fail inside the commit that carries it.
    const REJECT_ACTIVITY_WRITES: &str = r#"
        CREATE TRIGGER reject_activity BEFORE INSERT ON documents
        WHEN NEW.collection = 'activity_log'
        BEGIN
            SELECT RAISE(ABORT, 'activity log unavailable');
        END
    "#;

    #[tokio::test]
    async fn test_failed_log_write_leaves_no_change() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = Engine::new(db.store());

        let product = call(
            &engine,
            Method::Post,
            "/products",
            Some(json!({ "brand": "Acme", "name": "Soap", "stock_quantity": 5,
                         "cost_cents": 100, "markup_bps": 5000 })),
        )
        .await
        .unwrap();
        let pid = product["id"].as_str().unwrap().to_string();
        let order = call(
            &engine,
            Method::Post,
            "/orders",
            Some(json!({ "customer_name": "Jane", "items": [{ "product_id": pid, "quantity": 1 }] })),
        )
        .await
        .unwrap();
        call(&engine, Method::Delete, &format!("/orders/{}", order["id"].as_str().unwrap()), None)
            .await
            .unwrap();
        let expired_at = engine.recycle_bin().list().await.unwrap()[0].expires_at
            + chrono::Duration::seconds(1);
        assert_eq!(log_len(&engine).await, 3);

        sqlx::query(REJECT_ACTIVITY_WRITES)
            .execute(db.pool())
            .await
            .unwrap();

        let err = call(
            &engine,
            Method::Post,
            "/products",
            Some(json!({ "brand": "Acme", "name": "Oil", "stock_quantity": 5,
                         "cost_cents": 100, "markup_bps": 5000 })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatabaseError);
        assert!(!err.is_transient());
        assert_eq!(engine.products().list().await.unwrap().len(), 1);

        let err = call(
            &engine,
            Method::Post,
            "/orders",
            Some(json!({ "customer_name": "Jim", "items": [{ "product_id": pid, "quantity": 1 }] })),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DatabaseError);
        assert!(engine.orders().list().await.unwrap().is_empty());

        assert!(call(&engine, Method::Delete, &format!("/products/{pid}"), None)
            .await
            .is_err());
        assert!(engine.products().get(&pid).await.is_ok());

        assert!(engine.recycle_bin().sweep_at(expired_at).await.is_err());
        assert_eq!(engine.recycle_bin().list().await.unwrap().len(), 1);

        assert_eq!(log_len(&engine).await, 3);
    }

    #[tokio::test]
    async fn test_bulk_delete_over_path() {
        let engine = engine().await;
        let outcomes = call(
            &engine,
            Method::Delete,
            "/orders",
            Some(json!({ "ids": ["nope"] })),
        )
        .await
        .unwrap();
        assert_eq!(outcomes[0]["deleted"], json!(false));
        assert_eq!(outcomes[0]["error"]["code"], json!("NOT_FOUND"));
    }
}
