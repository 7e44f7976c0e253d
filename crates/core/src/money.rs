//! Monetary amounts.
//!
//! Balances and amounts are arbitrary-precision signed decimals
//! (`rust_decimal::Decimal`); floating point never touches a stored value.

pub use rust_decimal::Decimal;

use crate::error::{DomainError, DomainResult};

/// Rejects a zero amount; a zero change would produce a ledger row with no effect.
pub fn ensure_non_zero(amount: Decimal) -> DomainResult<Decimal> {
    if amount.is_zero() {
        return Err(DomainError::validation("amount must be non-zero"));
    }
    Ok(amount)
}

/// Negative amounts are debits, positive amounts are credits.
pub fn is_debit(amount: Decimal) -> bool {
    amount.is_sign_negative() && !amount.is_zero()
}

/// Display form with at least two fractional digits (log lines and messages only).
pub fn format_amount(amount: Decimal) -> String {
    if amount.scale() >= 2 {
        amount.to_string()
    } else {
        let mut padded = amount;
        padded.rescale(2);
        padded.to_string()
    }
}
