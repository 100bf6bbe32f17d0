//! # Validation Module
//!
//! Field rules applied before any write.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Command decoding (command.rs)                                │
//! │  ├── Route exists, payload deserializes                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Required text, lengths                                            │
//! │  ├── Quantities, discounts, money ranges                               │
//! │  └── Order shape (non-empty, no duplicate products)                    │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Services (stockroom-engine)                                  │
//! │  └── Existence, stock, payment status                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockroom_core::validation::{validate_quantity, validate_segment};
//!
//! validate_segment("brand", "Acme").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::money::{Money, Rate, BPS_PER_WHOLE};
use crate::types::{OrderDiscount, OrderInput};
use crate::MAX_ITEM_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of a product name segment.
pub const MAX_SEGMENT_LEN: usize = 200;

/// Maximum length of customer name and address.
pub const MAX_CUSTOMER_FIELD_LEN: usize = 500;

/// Largest cost, markup amount or fixed discount accepted (1 000 000 000.00).
///
/// Together with [`MAX_MARKUP_BPS`] and `MAX_ITEM_QUANTITY` this keeps a
/// single line total well inside `i64`.
pub const MAX_MONEY_CENTS: i64 = 100_000_000_000;

/// Largest markup percentage accepted (10 000%).
pub const MAX_MARKUP_BPS: u32 = 1_000_000;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a required text field and returns it trimmed.
///
/// ## Example
/// ```rust
/// use stockroom_core::validation::validate_required;
///
/// assert_eq!(validate_required("customer_name", "  Jane ", 100).unwrap(), "Jane");
/// assert!(validate_required("customer_name", "   ", 100).is_err());
/// ```
pub fn validate_required(field: &str, value: &str, max: usize) -> ValidationResult<String> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(value.to_string())
}

/// Validates a product identity segment (brand, name).
pub fn validate_segment(field: &str, value: &str) -> ValidationResult<String> {
    validate_required(field, value, MAX_SEGMENT_LEN)
}

/// Trims an optional text field; blank becomes `None`.
pub fn normalize_optional(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> ValidationResult<Option<String>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.chars().count() > max => Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        }),
        Some(v) => Ok(Some(v.to_string())),
    }
}

/// Derives the sorting code from a product's identity segments.
///
/// Every word of brand, name and volume (in that order) is stripped to its
/// alphanumeric characters, uppercased and joined with `-`.
///
/// ```rust
/// use stockroom_core::validation::sorting_code;
///
/// assert_eq!(sorting_code("Acme", "Extra Virgin Olive-Oil", Some("500 ml")), "ACME-EXTRA-VIRGIN-OLIVEOIL-500-ML");
/// ```
pub fn sorting_code(brand: &str, name: &str, volume: Option<&str>) -> String {
    [Some(brand), Some(name), volume]
        .into_iter()
        .flatten()
        .flat_map(str::split_whitespace)
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_uppercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a stock level (zero allowed).
pub fn validate_stock(qty: i64) -> ValidationResult<()> {
    if qty < 0 {
        return Err(ValidationError::OutOfRange {
            field: "stock_quantity".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates that a money amount is not negative.
pub fn validate_non_negative(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates an input money amount: not negative, at most [`MAX_MONEY_CENTS`].
pub fn validate_amount(field: &str, amount: Money) -> ValidationResult<()> {
    validate_non_negative(field, amount)?;
    if amount.cents() > MAX_MONEY_CENTS {
        return Err(out_of_money_range(field));
    }
    Ok(())
}

/// Validates a markup percentage against [`MAX_MARKUP_BPS`].
pub fn validate_markup(rate: Rate) -> ValidationResult<()> {
    if rate.bps() > MAX_MARKUP_BPS {
        return Err(ValidationError::OutOfRange {
            field: "markup_bps".to_string(),
            min: 0,
            max: i64::from(MAX_MARKUP_BPS),
        });
    }
    Ok(())
}

/// Error for a money computation that left the accepted range.
pub fn out_of_money_range(field: &str) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: MAX_MONEY_CENTS,
    }
}

/// Validates a discount in basis points (0% to 100%).
pub fn validate_discount_bps(field: &str, bps: u32) -> ValidationResult<()> {
    if bps > BPS_PER_WHOLE {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: BPS_PER_WHOLE as i64,
        });
    }
    Ok(())
}

/// Validates an order-level discount.
pub fn validate_order_discount(discount: &OrderDiscount) -> ValidationResult<()> {
    match discount {
        OrderDiscount::None => Ok(()),
        OrderDiscount::Percentage { rate_bps } => validate_discount_bps("discount.rate_bps", *rate_bps),
        OrderDiscount::Fixed { amount_cents } => {
            validate_amount("discount.amount_cents", Money::from_cents(*amount_cents))
        }
    }
}

// =============================================================================
// Order Validators
// =============================================================================

/// Validates the shape of an order payload before any product is looked up.
///
/// ## Rules
/// - Customer name required
/// - At least one line
/// - Every line: product id present, quantity in range, discount ≤ 100%
/// - A product appears at most once
pub fn validate_order_input(input: &OrderInput) -> ValidationResult<()> {
    validate_required("customer_name", &input.customer_name, MAX_CUSTOMER_FIELD_LEN)?;
    normalize_optional(
        "customer_address",
        input.customer_address.as_deref(),
        MAX_CUSTOMER_FIELD_LEN,
    )?;

    if input.items.is_empty() {
        return Err(ValidationError::EmptyOrder);
    }

    let mut seen = HashSet::new();
    for line in &input.items {
        if line.product_id.trim().is_empty() {
            return Err(ValidationError::required("product_id"));
        }
        validate_quantity(line.quantity)?;
        validate_discount_bps("discount_bps", line.discount_bps)?;

        if !seen.insert(line.product_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "product_id".to_string(),
                value: line.product_id.clone(),
            });
        }
    }

    validate_order_discount(&input.discount)
}

/// Validates a document id taken from a path.
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
