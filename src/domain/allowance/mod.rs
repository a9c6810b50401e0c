//! Allowance gate: does a stable purchase need an approval first?

use alloy_primitives::U256;

use crate::shared::units;

/// Whether spending `amount` of a `decimals`-place token requires an
/// approval, given the allowance the sale contract currently holds.
///
/// True when the scaled amount exceeds the allowance, or when the allowance
/// is not known yet. An amount that cannot be parsed is never submitted, so
/// it conservatively reports `true` as well.
pub fn needs_approval(amount: &str, allowance: Option<U256>, decimals: u8) -> bool {
    match units::parse_units(amount, decimals) {
        Ok(raw) => needs_approval_scaled(raw, allowance),
        Err(_) => true,
    }
}

/// [`needs_approval`] for an amount already in fixed-point form.
pub fn needs_approval_scaled(amount: U256, allowance: Option<U256>) -> bool {
    match allowance {
        Some(granted) => amount > granted,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::units::pow10;

    fn ether(n: u64) -> U256 {
        U256::from(n) * pow10(18)
    }

    #[test]
    fn test_zero_allowance_needs_approval() {
        assert!(needs_approval("5", Some(U256::ZERO), 18));
    }

    #[test]
    fn test_boundary_equal_does_not_need_approval() {
        assert!(!needs_approval("5", Some(ether(5)), 18));
        assert!(needs_approval("5.000000000000000001", Some(ether(5)), 18));
    }

    #[test]
    fn test_larger_allowance_skips_approval() {
        assert!(!needs_approval("5", Some(ether(100)), 18));
    }

    #[test]
    fn test_unknown_allowance_needs_approval() {
        assert!(needs_approval("5", None, 18));
        assert!(needs_approval_scaled(U256::from(1), None));
    }

    #[test]
    fn test_amount_scales_with_token_decimals() {
        // 5 units of a 6-decimal token
        assert!(!needs_approval("5", Some(U256::from(5_000_000u64)), 6));
        assert!(needs_approval("5.000001", Some(U256::from(5_000_000u64)), 6));
        assert!(needs_approval("5", Some(U256::from(5_000_000u64)), 18));
    }

    #[test]
    fn test_gate_matches_comparison_across_grid() {
        let amounts = [1u64, 5, 9, 10, 11, 1_000];
        let allowances = [0u64, 1, 5, 10, 1_000, 5_000];
        for a in amounts {
            for g in allowances {
                assert_eq!(
                    needs_approval(&a.to_string(), Some(ether(g)), 18),
                    a > g,
                    "amount {a} allowance {g}"
                );
            }
        }
    }
}
