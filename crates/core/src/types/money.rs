//! Decimal money helpers.
//!
//! Prices and order totals are `NUMERIC(10,2)` columns, so every amount we
//! compute is rounded to cents before it is written back.

use rust_decimal::{Decimal, RoundingStrategy};

/// Errors from money arithmetic.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// Line quantities must be at least one.
    #[error("quantity must be positive (got {0})")]
    NonPositiveQuantity(i32),
    /// Prices cannot be negative.
    #[error("price cannot be negative (got {0})")]
    NegativePrice(Decimal),
    /// The result does not fit in a decimal.
    #[error("amount overflow")]
    Overflow,
}

/// Round an amount to cents, half away from zero.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Total for one order line: `unit_price * quantity`, rounded to cents.
///
/// # Errors
///
/// Returns [`MoneyError`] for non-positive quantities, negative prices or
/// overflow.
pub fn line_total(unit_price: Decimal, quantity: i32) -> Result<Decimal, MoneyError> {
    if quantity <= 0 {
        return Err(MoneyError::NonPositiveQuantity(quantity));
    }
    if unit_price.is_sign_negative() && !unit_price.is_zero() {
        return Err(MoneyError::NegativePrice(unit_price));
    }
    unit_price
        .checked_mul(Decimal::from(quantity))
        .map(round_money)
        .ok_or(MoneyError::Overflow)
}
