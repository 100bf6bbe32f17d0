//! # stockroom-core: Pure Business Logic for Stockroom
//!
//! Everything that decides a number or a state transition lives here, as
//! pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Architecture                           │
//! │                                                                         │
//! │  UI ──► verb + path + payload                                           │
//! │                │                                                        │
//! │                ▼                                                        │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │             ★ stockroom-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │ command │ │ pricing │ │  order  │ │  stats  │ │  types  │  │   │
//! │  │   │ decode  │ │ markup  │ │ lines,  │ │ revenue │ │ Product │  │   │
//! │  │   │ routes  │ │ profit  │ │ totals  │ │ by day  │ │ Order   │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                │                                                        │
//! │                ▼                                                        │
//! │  stockroom-engine (services) ──► stockroom-db (document store)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Order, RecycleBinEntry, ...)
//! - [`money`] - Integer money and basis-point rates
//! - [`pricing`] - Cost + markup → sales price and profit
//! - [`order`] - Line items, order-level discount, totals, item diff
//! - [`command`] - Verb + path decoding into a tagged command
//! - [`stats`] - Dashboard aggregation
//! - [`validation`] - Field rules
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use stockroom_core::money::{Money, Rate};
//! use stockroom_core::pricing::compute_pricing;
//!
//! let pricing = compute_pricing(Money::from_cents(1000), Some(Rate::from_bps(2500)), None).unwrap();
//! assert_eq!(pricing.sales_price_cents, 1250);
//! assert_eq!(pricing.profit_cents, 250);
//! ```

pub mod command;
pub mod error;
pub mod money;
pub mod order;
pub mod pricing;
pub mod stats;
pub mod types;
pub mod validation;

pub use command::{Command, Method};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, Rate};
pub use types::*;

/// Days a deleted order stays restorable.
///
/// Fixed at deletion time and never extended; not configurable per entry.
pub const RECYCLE_BIN_TTL_DAYS: i64 = 50;

/// Maximum quantity of a single order line.
pub const MAX_ITEM_QUANTITY: i64 = 100_000;

/// Number of entries in the dashboard's top-products list.
pub const TOP_PRODUCTS_LIMIT: usize = 5;
