//! # stockroom-db: Document Store for Stockroom
//!
//! SQLite-backed collections of JSON documents, optimistic transactions and
//! the durable offline queue.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Data Flow                              │
//! │                                                                         │
//! │  stockroom-engine (OrderService, StockLedger, ...)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 stockroom-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │ DocumentStore │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  Transaction  │    │  (embedded)  │  │   │
//! │  │   │               │    │  (store.rs)   │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ Repositories  │    │ 001_docs     │  │   │
//! │  │   │ change feed   │    │ OfflineQueue  │    │ 002_queue    │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database file (WAL)                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`store`] - `DocumentStore` / `Transaction` capability and the SQLite adapter
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Typed repositories per collection, offline queue
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockroom_db::{Database, DbConfig, ProductRepository};
//!
//! let db = Database::new(DbConfig::new("stockroom.db")).await?;
//! let products = ProductRepository::new(db.store()).list().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, DEFAULT_TRANSACTION_ATTEMPTS};
pub use store::{
    run_transaction, Collection, Document, DocumentStore, SqliteStore, Transaction, TransactionWork,
};

pub use repository::activity_log::ActivityLogRepository;
pub use repository::offline_queue::{OfflineQueueEntry, OfflineQueueRepository};
pub use repository::orders::OrderRepository;
pub use repository::products::ProductRepository;
pub use repository::recycle_bin::RecycleBinRepository;
