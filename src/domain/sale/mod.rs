//! Sale domain: on-chain sale state and the reader that keeps it fresh.

pub mod client;
pub mod wire;

use std::collections::BTreeSet;

use alloy_primitives::U256;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::units;

pub use client::{ChainReader, RefreshHandle};

// ─── SaleField ───────────────────────────────────────────────────────────────

/// A scalar the reader can fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleField {
    EndTime,
    UnitPriceNative,
    UnitPriceStable,
    TotalSold,
    Paused,
    StableAllowance,
    NativeBalance,
    StableBalance,
    ProjectTokenBalance,
}

impl SaleField {
    pub const ALL: [SaleField; 9] = [
        SaleField::EndTime,
        SaleField::UnitPriceNative,
        SaleField::UnitPriceStable,
        SaleField::TotalSold,
        SaleField::Paused,
        SaleField::StableAllowance,
        SaleField::NativeBalance,
        SaleField::StableBalance,
        SaleField::ProjectTokenBalance,
    ];

    /// Contract function (or RPC method) backing this field.
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleField::EndTime => "endTime",
            SaleField::UnitPriceNative => "tokenPriceBNB",
            SaleField::UnitPriceStable => "tokenPriceUSDT",
            SaleField::TotalSold => "totalTokensSold",
            SaleField::Paused => "paused",
            SaleField::StableAllowance => "allowance",
            SaleField::NativeBalance => "eth_getBalance",
            SaleField::StableBalance => "balanceOf(stable)",
            SaleField::ProjectTokenBalance => "balanceOf(project)",
        }
    }
}

impl std::fmt::Display for SaleField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded read result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Uint(U256),
    Bool(bool),
}

impl FieldValue {
    pub fn as_uint(&self) -> Option<U256> {
        match self {
            FieldValue::Uint(v) => Some(*v),
            FieldValue::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            FieldValue::Uint(_) => None,
        }
    }
}

// ─── ChainSnapshot ───────────────────────────────────────────────────────────

/// Everything the panels derive their state from.
///
/// Never mutated in place: [`ChainSnapshot::with`] returns a new value that
/// supersedes this one. `None` means the field has not been read yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChainSnapshot {
    pub sale_deadline: Option<DateTime<Utc>>,
    pub unit_price_native: Option<U256>,
    pub unit_price_stable: Option<U256>,
    pub total_sold: Option<U256>,
    pub paused: Option<bool>,
    pub stable_allowance: Option<U256>,
    pub native_balance: Option<U256>,
    pub stable_balance: Option<U256>,
    pub project_token_balance: Option<U256>,
    /// Fields whose latest read failed; their values above are the last good ones.
    pub stale: BTreeSet<SaleField>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ChainSnapshot {
    /// A copy with `field` set to a freshly read `value`.
    pub fn with(&self, field: SaleField, value: FieldValue) -> Self {
        let mut next = self.clone();
        next.stale.remove(&field);
        match (field, value) {
            (SaleField::Paused, FieldValue::Bool(b)) => next.paused = Some(b),
            (SaleField::EndTime, FieldValue::Uint(v)) => next.sale_deadline = deadline_from(v),
            (SaleField::UnitPriceNative, FieldValue::Uint(v)) => next.unit_price_native = Some(v),
            (SaleField::UnitPriceStable, FieldValue::Uint(v)) => next.unit_price_stable = Some(v),
            (SaleField::TotalSold, FieldValue::Uint(v)) => next.total_sold = Some(v),
            (SaleField::StableAllowance, FieldValue::Uint(v)) => next.stable_allowance = Some(v),
            (SaleField::NativeBalance, FieldValue::Uint(v)) => next.native_balance = Some(v),
            (SaleField::StableBalance, FieldValue::Uint(v)) => next.stable_balance = Some(v),
            (SaleField::ProjectTokenBalance, FieldValue::Uint(v)) => {
                next.project_token_balance = Some(v)
            }
            (field, value) => {
                tracing::warn!(%field, ?value, "Ignoring value of unexpected type");
                return self.clone();
            }
        }
        next
    }

    /// A copy marking `field` as stale, keeping its last good value.
    pub fn with_stale(&self, field: SaleField) -> Self {
        let mut next = self.clone();
        next.stale.insert(field);
        next
    }

    pub fn is_stale(&self, field: SaleField) -> bool {
        self.stale.contains(&field)
    }

    /// Sale state at `now`.
    pub fn status(&self, now: DateTime<Utc>) -> SaleStatus {
        match (self.paused, self.sale_deadline) {
            (Some(true), _) => SaleStatus::Paused,
            (_, Some(deadline)) if now >= deadline => SaleStatus::Ended,
            (Some(false), _) => SaleStatus::Active,
            (None, _) => SaleStatus::Unknown,
        }
    }

    /// Total sold, cut for display.
    pub fn total_sold_display(&self, decimals: u8) -> String {
        units::display_balance(self.total_sold, decimals)
    }

    /// Balances for display. The native coin always has
    /// [`NATIVE_DECIMALS`](crate::network::NATIVE_DECIMALS) places; the two
    /// tokens have `decimals`.
    pub fn balances(&self, decimals: u8) -> Balances {
        Balances {
            native: units::display_balance(self.native_balance, crate::network::NATIVE_DECIMALS),
            stable: units::display_balance(self.stable_balance, decimals),
            project_token: units::display_balance(self.project_token_balance, decimals),
        }
    }
}

/// The contract stores the deadline as unix seconds.
fn deadline_from(raw: U256) -> Option<DateTime<Utc>> {
    let secs = u64::try_from(raw).ok()?;
    Utc.timestamp_opt(i64::try_from(secs).ok()?, 0).single()
}

// ─── SaleStatus / Balances ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SaleStatus {
    /// Not read yet.
    Unknown,
    Active,
    Paused,
    Ended,
}

/// User balances formatted for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Balances {
    pub native: String,
    pub stable: String,
    pub project_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_with_returns_new_snapshot() {
        let empty = ChainSnapshot::default();
        let next = empty.with(SaleField::TotalSold, FieldValue::Uint(U256::from(7)));
        assert_eq!(empty.total_sold, None);
        assert_eq!(next.total_sold, Some(U256::from(7)));
    }

    #[test]
    fn test_stale_keeps_last_good_value() {
        let snap = ChainSnapshot::default()
            .with(SaleField::StableAllowance, FieldValue::Uint(U256::from(5)))
            .with_stale(SaleField::StableAllowance);
        assert_eq!(snap.stable_allowance, Some(U256::from(5)));
        assert!(snap.is_stale(SaleField::StableAllowance));

        let fresh = snap.with(SaleField::StableAllowance, FieldValue::Uint(U256::from(6)));
        assert!(!fresh.is_stale(SaleField::StableAllowance));
    }

    #[test]
    fn test_deadline_decoded_from_unix_seconds() {
        let snap = ChainSnapshot::default()
            .with(SaleField::EndTime, FieldValue::Uint(U256::from(1_700_000_000u64)));
        assert_eq!(snap.sale_deadline.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_mismatched_value_type_is_ignored() {
        let snap = ChainSnapshot::default().with(SaleField::Paused, FieldValue::Uint(U256::from(1)));
        assert_eq!(snap.paused, None);
    }

    #[test]
    fn test_status() {
        let now = Utc::now();
        let base = ChainSnapshot {
            sale_deadline: Some(now + Duration::hours(1)),
            ..Default::default()
        };
        assert_eq!(base.status(now), SaleStatus::Unknown);

        let active = base.with(SaleField::Paused, FieldValue::Bool(false));
        assert_eq!(active.status(now), SaleStatus::Active);
        assert_eq!(active.status(now + Duration::hours(2)), SaleStatus::Ended);

        let paused = base.with(SaleField::Paused, FieldValue::Bool(true));
        assert_eq!(paused.status(now), SaleStatus::Paused);
    }

    #[test]
    fn test_display_defaults_to_zero() {
        let snap = ChainSnapshot::default();
        assert_eq!(snap.total_sold_display(18), "0");
        assert_eq!(snap.balances(18).project_token, "0");
    }
}
