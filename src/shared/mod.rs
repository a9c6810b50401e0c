//! Shared newtypes and utilities used across all domain modules.

pub mod units;

pub use units::{display_balance, format_truncated, format_units, parse_units};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::InputError;

// ─── PaymentMethod ───────────────────────────────────────────────────────────

/// How the buyer pays. Each method gets its own purchase panel and session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// The chain's native coin, attached as transaction value.
    Native,
    /// The stablecoin, pulled by the sale contract after an approval.
    Stable,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 2] = [PaymentMethod::Native, PaymentMethod::Stable];

    /// Whether purchases with this method go through the allowance gate.
    pub fn requires_allowance(&self) -> bool {
        matches!(self, PaymentMethod::Stable)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Native => write!(f, "native"),
            PaymentMethod::Stable => write!(f, "stable"),
        }
    }
}

// ─── Referrer ────────────────────────────────────────────────────────────────

/// Optional referrer credited for a purchase.
///
/// Serializes as the address hex string, or `null` when absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Referrer(Option<Address>);

impl Referrer {
    pub const NONE: Referrer = Referrer(None);

    pub fn new(address: Address) -> Self {
        if address.is_zero() {
            Self(None)
        } else {
            Self(Some(address))
        }
    }

    /// Parse the referrer field as typed by the user. Blank means none.
    pub fn parse(input: &str) -> Result<Self, InputError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::NONE);
        }
        Address::from_str(trimmed)
            .map(Self::new)
            .map_err(|_| InputError::InvalidReferrer(trimmed.to_string()))
    }

    pub fn address(&self) -> Option<Address> {
        self.0
    }

    /// The address passed to the contract: the zero address when absent.
    pub fn as_address(&self) -> Address {
        self.0.unwrap_or(Address::ZERO)
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }
}

impl From<Option<Address>> for Referrer {
    fn from(address: Option<Address>) -> Self {
        address.map(Self::new).unwrap_or_default()
    }
}

impl std::fmt::Display for Referrer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_address())
    }
}
