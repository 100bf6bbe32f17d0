//! # Product Repository
//!
//! Product documents in the `products` collection.

use std::sync::Arc;

use crate::error::DbResult;
use crate::repository::{fetch, fetch_all};
use crate::store::{Collection, DocumentStore};
use stockroom_core::Product;

/// Repository for product documents.
#[derive(Clone)]
pub struct ProductRepository {
    store: Arc<dyn DocumentStore>,
}

impl ProductRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        ProductRepository { store }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<Product>> {
        fetch(self.store.as_ref(), Collection::Products, id).await
    }

    /// All products ordered by sorting code, then id.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let mut products: Vec<Product> = fetch_all(self.store.as_ref(), Collection::Products).await?;
        products.sort_by(|a, b| {
            a.sorting_code
                .cmp(&b.sorting_code)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(products)
    }
}
