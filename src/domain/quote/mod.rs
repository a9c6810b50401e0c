//! Quote domain: estimated token output for an entered amount.
//!
//! ```text
//! estimated = amount / (unit_price / 10^d)
//!           = amount_raw / unit_price          (both d-decimal fixed point)
//! ```
//!
//! Computed in `U256` integer arithmetic and truncated to
//! [`QUOTE_DISPLAY_PLACES`] fractional digits so the entitlement is never
//! overstated.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::shared::units::{self, pow10};

/// Fractional digits shown for an estimate.
pub const QUOTE_DISPLAY_PLACES: usize = 4;

/// A derived estimate. Recomputed on every amount or price change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub input_amount: String,
    pub estimated_tokens: String,
}

impl Quote {
    pub fn is_zero(&self) -> bool {
        self.estimated_tokens == "0"
    }
}

/// Estimate the tokens bought with `amount` at `unit_price`, both in a
/// payment currency of `decimals` places.
///
/// Total over its domain: an empty, non-numeric or non-positive amount, an
/// unknown price, or a zero price all yield `"0"`.
pub fn quote(amount: &str, unit_price: Option<U256>, decimals: u8) -> Quote {
    Quote {
        input_amount: amount.to_string(),
        estimated_tokens: estimate(amount, unit_price, decimals)
            .unwrap_or_else(|| "0".to_string()),
    }
}

fn estimate(amount: &str, unit_price: Option<U256>, decimals: u8) -> Option<String> {
    let price = unit_price.filter(|p| !p.is_zero())?;
    let amount_raw = units::parse_units(amount, decimals).ok()?;

    // tokens * 10^places, truncated
    let scaled = amount_raw
        .checked_mul(pow10(QUOTE_DISPLAY_PLACES as u32))?
        .checked_div(price)?;

    Some(units::format_truncated(
        scaled,
        QUOTE_DISPLAY_PLACES as u8,
        QUOTE_DISPLAY_PLACES,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(wei: u64) -> Option<U256> {
        Some(U256::from(wei))
    }

    #[test]
    fn test_native_scenario() {
        // 10 / 0.01 = 1000
        let q = quote("10", price(10_000_000_000_000_000), 18);
        assert_eq!(q.estimated_tokens, "1000.0000");
        assert_eq!(q.input_amount, "10");
    }

    #[test]
    fn test_truncates_instead_of_rounding() {
        // 2 / 3 = 0.66666… → 0.6666
        let q = quote("2", Some(U256::from(3u64) * pow10(18)), 18);
        assert_eq!(q.estimated_tokens, "0.6666");
    }

    #[test]
    fn test_fractional_amount() {
        // 0.5 / 0.25 = 2
        let q = quote("0.5", price(250_000_000_000_000_000), 18);
        assert_eq!(q.estimated_tokens, "2.0000");
    }

    #[test]
    fn test_six_decimal_payment_currency() {
        // 5 / 0.1 = 50, price 0.1 in 6-decimal units
        let q = quote("5", price(100_000), 6);
        assert_eq!(q.estimated_tokens, "50.0000");
        // too precise for 6 places
        assert!(quote("0.0000001", price(100_000), 6).is_zero());
    }

    #[test]
    fn test_invalid_amounts_quote_zero() {
        for input in ["", "   ", "abc", "0", "-3", "0.0", "1..2"] {
            let q = quote(input, price(10_000_000_000_000_000), 18);
            assert_eq!(q.estimated_tokens, "0", "input {input:?}");
            assert!(q.is_zero());
        }
    }

    #[test]
    fn test_unknown_price_quotes_zero() {
        assert_eq!(quote("10", None, 18).estimated_tokens, "0");
    }

    #[test]
    fn test_zero_price_quotes_zero() {
        assert_eq!(quote("10", Some(U256::ZERO), 18).estimated_tokens, "0");
    }
}
