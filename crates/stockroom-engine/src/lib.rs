//! # stockroom-engine: Order / Inventory Services
//!
//! Everything a decoded [`Command`](stockroom_core::Command) can do, written
//! against the [`DocumentStore`](stockroom_db::DocumentStore) capability.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Data Flow                              │
//! │                                                                         │
//! │  stockroom-sync (ConnectivityGate, OfflineQueue)                       │
//! │       │  forwards or replays a Command                                  │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 stockroom-engine (THIS CRATE)                   │   │
//! │  │                                                                 │   │
//! │  │   Engine::dispatch ──► ProductService   OrderService            │   │
//! │  │                        StockLedger      RecycleBin              │   │
//! │  │                        Dashboard        ActivityLog             │   │
//! │  │                                                                 │   │
//! │  │   Engine::subscribe ─► Subscription (live queries)              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  stockroom-db (documents, optimistic transactions)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transactions
//! Mark-paid must be atomic and runs through `run_transaction`. Edits,
//! deletes, restores and purges use the same mechanism so their activity
//! entry commits together with the change. Creates and the sweep are plain
//! writes followed by a log append.

pub mod activity;
pub mod dashboard;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod live;
pub mod orders;
pub mod products;
pub mod recycle_bin;

pub use activity::{Activity, ActivityLog, DEFAULT_ACTIVITY_LIMIT};
pub use dashboard::Dashboard;
pub use engine::Engine;
pub use error::{EngineError, EngineResult, ErrorCode, ErrorResponse};
pub use ledger::{StockLedger, StockMovement};
pub use live::{LiveQuery, Subscription};
pub use orders::{DeleteOutcome, OrderService};
pub use products::ProductService;
pub use recycle_bin::{RecycleBin, SweepReport};
