//! Money Conversion Module
//!
//! All balances and fees are stored as `u64` minor units (cents). This module
//! is the only place that turns minor units into the decimal strings
//! shown to people, and the only place fee percentages are applied.

use rust_decimal::prelude::*;

use crate::core_types::{BPS_DENOMINATOR, Bps, MinorUnits};

/// Decimal places of the settlement currency
pub const CURRENCY_DECIMALS: u32 = 2;

/// Format minor units for display: `12345` → `"123.45"`
pub fn format_amount(value: MinorUnits) -> String {
    let decimal_value = Decimal::from(value) / Decimal::from(10u64.pow(CURRENCY_DECIMALS));
    format!("{:.prec$}", decimal_value, prec = CURRENCY_DECIMALS as usize)
}

/// `amount * bps / 10_000`, rounded down. Widened to u128 so large amounts
/// cannot overflow mid-computation.
pub fn apply_bps(amount: MinorUnits, bps: Bps) -> MinorUnits {
    let fee = u128::from(amount) * u128::from(bps) / u128::from(BPS_DENOMINATOR);
    // bps <= 10_000 keeps the result <= amount
    u64::try_from(fee).unwrap_or(amount)
}
