//! # Repository Module
//!
//! Typed reads of the document collections, plus the offline queue table.
//! Document writes run as a [`crate::store::TransactionWork`].
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Service (stockroom-engine)                                            │
//! │       │                                                                 │
//! │       │  ProductRepository::new(store).get("p-1")                      │
//! │       ▼                                                                 │
//! │  Typed repositories (Product, Order, RecycleBinEntry, ...)             │
//! │       │  serde_json::Value ⇄ domain type                                │
//! │       ▼                                                                 │
//! │  dyn DocumentStore  ──►  SQLite `documents` table                      │
//! │                                                                         │
//! │  OfflineQueueRepository ──► SQLite `offline_queue` table (direct SQL)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`products::ProductRepository`] - Product documents
//! - [`orders::OrderRepository`] - Order documents
//! - [`recycle_bin::RecycleBinRepository`] - Soft-deleted documents
//! - [`activity_log::ActivityLogRepository`] - Append-only audit trail
//! - [`offline_queue::OfflineQueueRepository`] - Pending offline mutations

pub mod activity_log;
pub mod offline_queue;
pub mod orders;
pub mod products;
pub mod recycle_bin;

use serde::de::DeserializeOwned;

use crate::error::DbResult;
use crate::store::{Collection, DocumentStore};

pub(crate) async fn fetch<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: Collection,
    id: &str,
) -> DbResult<Option<T>> {
    store
        .get(collection, id)
        .await?
        .map(|doc| doc.decode())
        .transpose()
}

pub(crate) async fn fetch_all<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: Collection,
) -> DbResult<Vec<T>> {
    store
        .list(collection)
        .await?
        .iter()
        .map(|doc| doc.decode())
        .collect()
}
