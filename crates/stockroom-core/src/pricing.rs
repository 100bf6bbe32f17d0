//! # Pricing Engine
//!
//! Cost + markup → sales price and profit.
//!
//! ```text
//! cost ──┬──────────────────────────────────────────► sales_price = cost + markup
//!        │                                                  │
//!        └─► markup = amount            (amount given)      ▼
//!            markup = cost × pct / 100  (otherwise)      profit = sales_price - cost
//! ```
//!
//! A fixed amount always wins over a percentage; the stored percentage is
//! then 0 so the active mode is unambiguous.

use crate::error::ValidationError;
use crate::money::{Money, Rate};
use crate::types::{MarkupMode, Pricing};
use crate::validation::{out_of_money_range, validate_amount, validate_markup, ValidationResult};

/// Computes the derived pricing of a product.
///
/// ## Errors
/// - `MarkupRequired` when neither `markup` nor `amount` is given
/// - `MustBePositive` when cost or amount is negative
/// - `OutOfRange` when cost or amount exceeds `MAX_MONEY_CENTS` or the
///   percentage exceeds `MAX_MARKUP_BPS`
///
/// ## Example
/// ```rust
/// use stockroom_core::money::Money;
/// use stockroom_core::pricing::compute_pricing;
/// use stockroom_core::types::MarkupMode;
///
/// let pricing = compute_pricing(Money::from_cents(800), None, Some(Money::from_cents(300))).unwrap();
/// assert_eq!(pricing.sales_price_cents, 1100);
/// assert_eq!(pricing.markup_mode, MarkupMode::Amount);
/// ```
pub fn compute_pricing(
    cost: Money,
    markup: Option<Rate>,
    amount: Option<Money>,
) -> ValidationResult<Pricing> {
    validate_amount("cost_cents", cost)?;

    let (mode, markup_bps, applied) = match (amount, markup) {
        (Some(amount), _) => {
            validate_amount("markup_amount_cents", amount)?;
            (MarkupMode::Amount, 0, amount)
        }
        (None, Some(rate)) => {
            validate_markup(rate)?;
            let applied = cost
                .percentage(rate)
                .ok_or_else(|| out_of_money_range("markup_amount_cents"))?;
            (MarkupMode::Percentage, rate.bps(), applied)
        }
        (None, None) => return Err(ValidationError::MarkupRequired),
    };

    let sales_price = cost
        .checked_add(applied)
        .ok_or_else(|| out_of_money_range("sales_price_cents"))?;
    Ok(Pricing {
        cost_cents: cost.cents(),
        markup_mode: mode,
        markup_bps,
        markup_amount_cents: applied.cents(),
        sales_price_cents: sales_price.cents(),
        profit_cents: applied.cents(),
    })
}

/// Re-prices an existing revision after a partial edit.
///
/// Fields the edit leaves out keep their current value. When the edit names
/// no markup field at all the current markup mode is kept: a percentage is
/// re-applied to the new cost, a fixed amount stays as it was.
pub fn reprice(
    current: &Pricing,
    cost: Option<Money>,
    markup: Option<Rate>,
    amount: Option<Money>,
) -> ValidationResult<Pricing> {
    let cost = cost.unwrap_or_else(|| current.cost());

    if markup.is_some() || amount.is_some() {
        return compute_pricing(cost, markup, amount);
    }

    match current.markup_mode {
        MarkupMode::Percentage => compute_pricing(cost, Some(current.markup_rate()), None),
        MarkupMode::Amount => compute_pricing(
            cost,
            None,
            Some(Money::from_cents(current.markup_amount_cents)),
        ),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
