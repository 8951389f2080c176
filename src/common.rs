/// Common types and utilities shared across handlers and services
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::errors::ServiceError;

/// Rounds a monetary amount to two decimal places, midpoint away from zero.
///
/// All stored and reported amounts in the system go through this helper so
/// that 1.005 becomes 1.01 rather than the banker's-rounding 1.00.
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Converts a major-unit amount (PLN) into minor units (grosz) for the
/// payment gateway wire format.
///
/// The amount is rounded to two decimals first, so the scaled value is always
/// integral. Fails only when the value does not fit an `i64`.
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    let scaled = round2(amount) * Decimal::ONE_HUNDRED;
    scaled.to_i64().ok_or_else(|| {
        ServiceError::ValidationError(format!("amount {} out of range for minor units", amount))
    })
}

/// Splits a gross amount into (net, vat) for a given VAT rate.
///
/// Net is derived first as `round2(gross / (1 + rate))`; VAT is the exact
/// remainder, so `net + vat == gross` holds for every line.
pub fn split_vat(gross: Decimal, vat_rate: Decimal) -> (Decimal, Decimal) {
    let net = round2(gross / (Decimal::ONE + vat_rate));
    let vat = gross - net;
    (net, vat)
}
