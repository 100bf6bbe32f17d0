//! # Domain Types
//!
//! Core domain types used throughout Stockroom.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Order      │   │   OrderItem     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  product_id     │       │
//! │  │  sorting_code   │   │  customer_name  │   │  quantity       │       │
//! │  │  stock_quantity │   │  payment_status │   │  *_at_time      │       │
//! │  │  pricing ───────┼─┐ │  items ─────────┼──►│  (snapshots)    │       │
//! │  └─────────────────┘ │ │  discount       │   └─────────────────┘       │
//! │                      │ └─────────────────┘                              │
//! │  ┌─────────────────┐ │ ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Pricing      │◄┘ │ RecycleBinEntry │   │ActivityLogEntry │       │
//! │  │  cost, markup   │   │  snapshot       │   │  action         │       │
//! │  │  sales, profit  │   │  expires_at     │   │  entity_type    │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stored documents are these structs serialized with serde. Money fields are
//! integer cents (`*_cents`), percentages are basis points (`*_bps`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::money::{Money, Rate};

// =============================================================================
// Pricing
// =============================================================================

/// Which markup field is authoritative for a product revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MarkupMode {
    /// Markup is a percentage of cost.
    Percentage,
    /// Markup is a fixed amount on top of cost.
    Amount,
}

/// Derived pricing of a product.
///
/// Produced only by [`crate::pricing::compute_pricing`]; never edited field
/// by field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Pricing {
    /// Cost of production in cents.
    pub cost_cents: i64,

    pub markup_mode: MarkupMode,

    /// Markup percentage in basis points. 0 when `markup_mode` is Amount.
    pub markup_bps: u32,

    /// Markup actually applied on top of cost, in cents.
    pub markup_amount_cents: i64,

    /// `cost + markup`.
    pub sales_price_cents: i64,

    /// `sales_price - cost`.
    pub profit_cents: i64,
}

impl Pricing {
    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    #[inline]
    pub fn sales_price(&self) -> Money {
        Money::from_cents(self.sales_price_cents)
    }

    #[inline]
    pub fn markup_rate(&self) -> Rate {
        Rate::from_bps(self.markup_bps)
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product available for ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub brand: String,

    /// Product name segment (without brand or volume).
    pub name: String,

    /// Volume/size segment, e.g. "500ml".
    pub volume: Option<String>,

    /// Derived from brand/name/volume, e.g. "ACME-OLIVE-OIL-500ML".
    pub sorting_code: String,

    pub description: Option<String>,

    /// Units on hand. Never negative.
    pub stock_quantity: i64,

    #[serde(flatten)]
    pub pricing: Pricing,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Human-readable name: brand, name and volume joined by spaces.
    pub fn display_name(&self) -> String {
        match &self.volume {
            Some(volume) if !volume.trim().is_empty() => {
                format!("{} {} {}", self.brand, self.name, volume)
            }
            _ => format!("{} {}", self.brand, self.name),
        }
    }

    #[inline]
    pub fn sales_price(&self) -> Money {
        self.pricing.sales_price()
    }
}

// =============================================================================
// Payment Status
// =============================================================================

/// Order payment state. `Pending → Paid` is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
}

// =============================================================================
// Order Discount
// =============================================================================

/// Order-level discount, applied to the subtotal after line discounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderDiscount {
    #[default]
    None,
    /// Percentage of the subtotal.
    Percentage { rate_bps: u32 },
    /// Fixed amount off the subtotal.
    Fixed { amount_cents: i64 },
}

// =============================================================================
// Order Item
// =============================================================================

/// A line of an order.
///
/// Every `*_at_time` field is copied from the product when the line is
/// built; later product edits never reach an existing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderItem {
    pub product_id: String,
    /// Product display name at order time (frozen).
    pub product_name: String,
    /// Sorting code at order time (frozen).
    pub sorting_code: String,
    pub quantity: i64,
    /// Unit sales price before the line discount (frozen).
    pub sales_price_at_time_cents: i64,
    /// Unit cost at order time (frozen).
    pub cost_at_time_cents: i64,
    /// Line discount in basis points (0..=10000).
    pub discount_bps: u32,
    /// `sales_price × (1 - discount)`.
    pub effective_price_cents: i64,
    /// `effective_price - cost`, per unit.
    pub profit_at_time_cents: i64,
    /// `effective_price × quantity`.
    pub line_total_cents: i64,
}

impl OrderItem {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }

    /// Profit of the whole line, `None` on overflow.
    #[inline]
    pub fn line_profit(&self) -> Option<Money> {
        Money::from_cents(self.profit_at_time_cents).checked_mul(self.quantity)
    }
}

// =============================================================================
// Order
// =============================================================================

/// A customer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub customer_name: String,
    pub customer_address: Option<String>,
    #[ts(as = "String")]
    pub order_date: DateTime<Utc>,
    pub payment_status: PaymentStatus,
    pub items: Vec<OrderItem>,
    pub discount: OrderDiscount,
    /// Σ line totals, before the order discount.
    pub subtotal_cents: i64,
    /// Order discount actually taken off (clamped to the subtotal).
    pub discount_amount_cents: i64,
    /// Net of the order discount.
    pub total_sales_price_cents: i64,
    /// Net of the order discount.
    pub total_profit_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
    /// Set when the order came back from the recycle bin.
    #[ts(as = "Option<String>")]
    pub restored_at: Option<DateTime<Utc>>,
}

impl Order {
    #[inline]
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    #[inline]
    pub fn total_sales_price(&self) -> Money {
        Money::from_cents(self.total_sales_price_cents)
    }
}

// =============================================================================
// Recycle Bin
// =============================================================================

/// Kind of document held by a recycle-bin entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Product,
    Order,
    RecycleBin,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Product => "product",
            EntityType::Order => "order",
            EntityType::RecycleBin => "recycle_bin",
        }
    }
}

/// A soft-deleted document awaiting restore, purge or expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecycleBinEntry {
    pub id: String,
    /// Id the document had while live.
    pub original_id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[ts(as = "String")]
    pub deleted_at: DateTime<Utc>,
    /// `deleted_at + RECYCLE_BIN_TTL_DAYS`, fixed at deletion.
    #[ts(as = "String")]
    pub expires_at: DateTime<Utc>,
    /// Full document as it was when deleted.
    pub snapshot: Value,
}

impl RecycleBinEntry {
    /// True once `expires_at` is strictly in the past.
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

// =============================================================================
// Activity Log
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    Create,
    Update,
    Delete,
    PermanentDelete,
    Restore,
    AutoCleanup,
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ActivityLogEntry {
    pub id: String,
    pub action: ActivityAction,
    pub entity_type: EntityType,
    pub entity_id: Option<String>,
    pub description: String,
    /// Structured payload (snapshot, diff, counts) per entity type.
    pub data: Option<Value>,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Inputs
// =============================================================================

/// One requested order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderLineInput {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub discount_bps: u32,
}

/// Payload of order create and edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderInput {
    pub customer_name: String,
    #[serde(default)]
    pub customer_address: Option<String>,
    #[serde(default)]
    pub items: Vec<OrderLineInput>,
    #[serde(default)]
    pub discount: OrderDiscount,
}

/// Payload of product create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductInput {
    pub brand: String,
    pub name: String,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stock_quantity: i64,
    pub cost_cents: i64,
    #[serde(default)]
    pub markup_bps: Option<u32>,
    #[serde(default)]
    pub markup_amount_cents: Option<i64>,
}

/// Partial product update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductPatch {
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub cost_cents: Option<i64>,
    #[serde(default)]
    pub markup_bps: Option<u32>,
    #[serde(default)]
    pub markup_amount_cents: Option<i64>,
}

impl ProductPatch {
    /// True when the patch touches a field that feeds pricing.
    pub fn touches_pricing(&self) -> bool {
        self.cost_cents.is_some() || self.markup_bps.is_some() || self.markup_amount_cents.is_some()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payment_status_default() {
        assert_eq!(PaymentStatus::default(), PaymentStatus::Pending);
        assert_eq!(serde_json::to_value(PaymentStatus::Paid).unwrap(), json!("paid"));
    }

    #[test]
    fn test_order_discount_wire_format() {
        let discount: OrderDiscount =
            serde_json::from_value(json!({"type": "percentage", "rate_bps": 500})).unwrap();
        assert_eq!(discount, OrderDiscount::Percentage { rate_bps: 500 });

        let none: OrderDiscount = serde_json::from_value(json!({"type": "none"})).unwrap();
        assert_eq!(none, OrderDiscount::None);
    }

    #[test]
    fn test_product_pricing_is_flattened() {
        let product = Product {
            id: "p-1".into(),
            brand: "Acme".into(),
            name: "Olive Oil".into(),
            volume: Some("500ml".into()),
            sorting_code: "ACME-OLIVE-OIL-500ML".into(),
            description: None,
            stock_quantity: 4,
            pricing: Pricing {
                cost_cents: 1000,
                markup_mode: MarkupMode::Percentage,
                markup_bps: 2500,
                markup_amount_cents: 250,
                sales_price_cents: 1250,
                profit_cents: 250,
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let value = serde_json::to_value(&product).unwrap();
        assert_eq!(value["sales_price_cents"], json!(1250));
        assert!(value.get("pricing").is_none());

        let back: Product = serde_json::from_value(value).unwrap();
        assert_eq!(back, product);
        assert_eq!(back.display_name(), "Acme Olive Oil 500ml");
    }

    #[test]
    fn test_recycle_entry_type_field() {
        let now = Utc::now();
        let entry = RecycleBinEntry {
            id: "r-1".into(),
            original_id: "o-1".into(),
            entity_type: EntityType::Order,
            deleted_at: now,
            expires_at: now,
            snapshot: json!({}),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], json!("order"));
        assert!(!entry.is_expired(now));
        assert!(entry.is_expired(now + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_patch_touches_pricing() {
        assert!(!ProductPatch::default().touches_pricing());
        let patch = ProductPatch {
            markup_amount_cents: Some(100),
            ..Default::default()
        };
        assert!(patch.touches_pricing());
    }
}
