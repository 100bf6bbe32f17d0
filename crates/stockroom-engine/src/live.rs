//! # Live Queries
//!
//! Push-based equivalents of the read paths.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  engine.subscribe(LiveQuery::Orders)                                   │
//! │       │                                                                 │
//! │       ├──► next() ── current snapshot, immediately                     │
//! │       │                                                                 │
//! │       │    commit touches `orders` ──► broadcast(Collection::Orders)   │
//! │       │                                        │                        │
//! │       └──► next() ◄── full recompute ◄─────────┘                       │
//! │                                                                         │
//! │  Changes to other collections are skipped. A subscriber that fell      │
//! │  behind the feed recomputes once instead of replaying what it missed.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Dropping the [`Subscription`] detaches it; writes in flight are unaffected.

use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::engine::Engine;
use crate::error::EngineResult;
use stockroom_core::Command;
use stockroom_db::Collection;

/// A read that can be watched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveQuery {
    Products,
    Product(String),
    Orders,
    Order(String),
    DashboardStats,
    RecycleBin,
}

impl LiveQuery {
    /// The read command that produces a snapshot.
    pub fn command(&self) -> Command {
        match self {
            LiveQuery::Products => Command::ListProducts,
            LiveQuery::Product(id) => Command::GetProduct { id: id.clone() },
            LiveQuery::Orders => Command::ListOrders,
            LiveQuery::Order(id) => Command::GetOrder { id: id.clone() },
            LiveQuery::DashboardStats => Command::DashboardStats,
            LiveQuery::RecycleBin => Command::ListRecycleBin,
        }
    }

    pub fn depends_on(&self, collection: Collection) -> bool {
        match self {
            LiveQuery::Products | LiveQuery::Product(_) => collection == Collection::Products,
            LiveQuery::Orders | LiveQuery::Order(_) | LiveQuery::DashboardStats => {
                collection == Collection::Orders
            }
            LiveQuery::RecycleBin => collection == Collection::RecycleBin,
        }
    }
}

/// A live query attached to the change feed.
pub struct Subscription {
    query: LiveQuery,
    engine: Engine,
    changes: broadcast::Receiver<Collection>,
    primed: bool,
}

impl Subscription {
    pub(crate) fn new(engine: Engine, query: LiveQuery) -> Self {
        Subscription {
            changes: engine.store().changes(),
            query,
            engine,
            primed: false,
        }
    }

    pub fn query(&self) -> &LiveQuery {
        &self.query
    }

    /// Waits for the next snapshot.
    ///
    /// The first call returns at once. Returns `None` once the change feed
    /// has closed.
    pub async fn next(&mut self) -> Option<EngineResult<Value>> {
        if !self.primed {
            self.primed = true;
            return Some(self.snapshot().await);
        }

        loop {
            match self.changes.recv().await {
                Ok(collection) if self.query.depends_on(collection) => {
                    return Some(self.snapshot().await);
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, query = ?self.query, "Live query lagged, recomputing");
                    return Some(self.snapshot().await);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    async fn snapshot(&self) -> EngineResult<Value> {
        self.engine.dispatch(self.query.command()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stockroom_core::{Method, OrderDiscount, OrderInput, OrderLineInput, ProductInput};
    use stockroom_db::{Database, DbConfig};

    #[tokio::test]
    async fn test_orders_subscription_recomputes_on_order_changes() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = Engine::new(db.store());

        let mut orders = engine.subscribe(LiveQuery::Orders);
        assert_eq!(orders.next().await.unwrap().unwrap(), json!([]));

        let product = engine
            .products()
            .create(ProductInput {
                brand: "Acme".to_string(),
                name: "Soap".to_string(),
                volume: None,
                description: None,
                stock_quantity: 5,
                cost_cents: 100,
                markup_bps: Some(1000),
                markup_amount_cents: None,
            })
            .await
            .unwrap();
        let order = engine
            .orders()
            .create(OrderInput {
                customer_name: "Jane".to_string(),
                customer_address: None,
                items: vec![OrderLineInput {
                    product_id: product.id.clone(),
                    quantity: 1,
                    discount_bps: 0,
                }],
                discount: OrderDiscount::None,
            })
            .await
            .unwrap();

        // product and activity-log changes are skipped
        let snapshot = orders.next().await.unwrap().unwrap();
        assert_eq!(snapshot[0]["id"], json!(order.id));
    }

    #[tokio::test]
    async fn test_single_product_subscription() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let engine = Engine::new(db.store());
        let created = engine
            .dispatch(
                Command::decode(
                    Method::Post,
                    "/products",
                    Some(json!({
                        "brand": "Acme", "name": "Oil", "stock_quantity": 2,
                        "cost_cents": 1000, "markup_amount_cents": 250
                    })),
                )
                .unwrap(),
            )
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let mut sub = engine.subscribe(LiveQuery::Product(id.clone()));
        assert_eq!(sub.next().await.unwrap().unwrap()["stock_quantity"], json!(2));

        engine
            .dispatch(Command::UpdateProduct {
                id,
                patch: stockroom_core::ProductPatch {
                    stock_quantity: Some(7),
                    ..Default::default()
                },
            })
            .await
            .unwrap();
        assert_eq!(sub.next().await.unwrap().unwrap()["stock_quantity"], json!(7));
    }

    #[test]
    fn test_dependencies() {
        assert!(LiveQuery::DashboardStats.depends_on(Collection::Orders));
        assert!(!LiveQuery::DashboardStats.depends_on(Collection::ActivityLog));
        assert!(LiveQuery::Product("p".into()).depends_on(Collection::Products));
        assert!(!LiveQuery::RecycleBin.depends_on(Collection::Orders));
    }
}
