//! # stockroom-sync: Online/Offline Boundary for Stockroom
//!
//! Gives the client the illusion of synchronous writes while the store is
//! unreachable, and converges once it is back.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Layer Architecture                          │
//! │                                                                         │
//! │   UI call (verb, path, payload)                                        │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                         OfflineQueue                             │  │
//! │  │                                                                  │  │
//! │  │  reads ────────────────────────────────────► Engine::dispatch   │  │
//! │  │  mutations ── ConnectivityGate online & queue empty? ──┬── yes ─┘  │
//! │  │                                                        └── no ──┐  │
//! │  │                                   offline_queue table (FIFO) ◄──┘  │
//! │  └────────────────────────────────────────┬─────────────────────────┘  │
//! │                                           │                            │
//! │  ┌────────────────────────────────────────▼─────────────────────────┐  │
//! │  │ ReplayWorker: gate online ─► replay head first ─► remap temp ids │  │
//! │  │               failure ─► head stays, exponential backoff          │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - Store/queue paths and replay backoff (TOML + env)
//! - [`error`] - Sync error types
//! - [`gate`] - `ConnectivityGate`
//! - [`queue`] - `OfflineQueue` routing and replay
//! - [`worker`] - `ReplayWorker` background task

pub mod config;
pub mod error;
pub mod gate;
pub mod queue;
pub mod worker;

pub use config::{QueueSettings, ReplaySettings, StoreSettings, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use gate::{ConnectionState, ConnectivityGate};
pub use queue::{OfflineQueue, ReplayReport, TEMP_ID_PREFIX};
pub use worker::{ReplayWorker, ReplayWorkerHandle};
