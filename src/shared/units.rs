//! Pure conversion between human-readable decimal strings and fixed-point
//! on-chain integers.
//!
//! Parsing goes through `rust_decimal::Decimal`, scaling and formatting use
//! exact `U256` integer arithmetic. No async, no network calls.

use std::str::FromStr;

use alloy_primitives::U256;
use rust_decimal::Decimal;

use crate::error::InputError;

/// Number of characters a balance is cut to for display.
pub const DISPLAY_WIDTH: usize = 10;

/// `10^exp` as a `U256`.
pub fn pow10(exp: u32) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// Parse a user-entered decimal amount into a fixed-point integer.
///
/// # Conversion math
///
/// ```text
/// raw = amount * 10^decimals
/// ```
///
/// Rejects empty, non-numeric, non-positive input and amounts with more
/// fractional digits than the token supports.
pub fn parse_units(input: &str, decimals: u8) -> Result<U256, InputError> {
    let trimmed = input.trim();

    // 1. Validate shape
    if trimmed.is_empty() {
        return Err(InputError::EmptyAmount);
    }
    let value = Decimal::from_str(trimmed)
        .map_err(|_| InputError::InvalidAmount(trimmed.to_string()))?;
    if value <= Decimal::ZERO {
        return Err(InputError::NonPositiveAmount(trimmed.to_string()));
    }

    // 2. Validate precision
    let value = value.normalize();
    if value.scale() > decimals as u32 {
        return Err(InputError::TooPrecise {
            input: trimmed.to_string(),
            decimals,
        });
    }

    // 3. Scale
    let mantissa = U256::from(value.mantissa().unsigned_abs());
    mantissa
        .checked_mul(pow10(decimals as u32 - value.scale()))
        .ok_or_else(|| InputError::Overflow(trimmed.to_string()))
}

/// Format a fixed-point integer with full precision, trimming trailing zeros.
///
/// Whole values print without a fractional part (`1000000000000000000` with
/// 18 decimals is `"1"`).
pub fn format_units(value: U256, decimals: u8) -> String {
    let (int, frac) = split_digits(value, decimals as usize);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        int
    } else {
        format!("{}.{}", int, frac)
    }
}

/// Format a fixed-point integer with exactly `places` fractional digits,
/// truncating any further digits.
pub fn format_truncated(value: U256, decimals: u8, places: usize) -> String {
    let (int, frac) = split_digits(value, decimals as usize);
    if places == 0 {
        return int;
    }
    let mut frac: String = frac.chars().take(places).collect();
    while frac.len() < places {
        frac.push('0');
    }
    format!("{}.{}", int, frac)
}

/// Display convention for balances and sale totals: the full-precision value
/// cut to [`DISPLAY_WIDTH`] characters, `"0"` when unknown.
pub fn display_balance(value: Option<U256>, decimals: u8) -> String {
    match value {
        Some(v) => format_units(v, decimals)
            .chars()
            .take(DISPLAY_WIDTH)
            .collect(),
        None => "0".to_string(),
    }
}

fn split_digits(value: U256, decimals: usize) -> (String, String) {
    let digits = value.to_string();
    if digits.len() > decimals {
        let (int, frac) = digits.split_at(digits.len() - decimals);
        (int.to_string(), frac.to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = decimals))
    }
}
