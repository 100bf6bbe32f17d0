//! # Order Repository
//!
//! Order documents in the `orders` collection.

use std::sync::Arc;

use crate::error::DbResult;
use crate::repository::{fetch, fetch_all};
use crate::store::{Collection, DocumentStore};
use stockroom_core::Order;

#[derive(Clone)]
pub struct OrderRepository {
    store: Arc<dyn DocumentStore>,
}

impl OrderRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        OrderRepository { store }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Order>> {
        fetch(self.store.as_ref(), Collection::Orders, id).await
    }

    /// All orders, newest `order_date` first.
    pub async fn list(&self) -> DbResult<Vec<Order>> {
        let mut orders: Vec<Order> = fetch_all(self.store.as_ref(), Collection::Orders).await?;
        orders.sort_by(|a, b| {
            b.order_date
                .cmp(&a.order_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(orders)
    }
}
