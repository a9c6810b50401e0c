//! Operation domain: state-mutating requests and their finality.

pub mod client;

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use serde::{Deserialize, Serialize};

use crate::chain::TransactionRequest;
use crate::config::SaleConfig;
use crate::domain::sale::wire::{IERC20, ITokenSale};
use crate::shared::Referrer;

pub use client::{OperationTracker, PendingOperation};

// ─── OperationKind ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    ApproveSpend,
    BuyWithNative,
    BuyWithStable,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::ApproveSpend => write!(f, "Approval"),
            OperationKind::BuyWithNative => write!(f, "Native purchase"),
            OperationKind::BuyWithStable => write!(f, "Stable purchase"),
        }
    }
}

// ─── OperationStatus ─────────────────────────────────────────────────────────

/// Terminal status of an accepted operation. Resolved exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationStatus {
    Confirmed,
    Reverted,
    /// No final status within the timeout. The operation may still execute.
    TimedOut,
}

impl OperationStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationStatus::Confirmed)
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Confirmed => write!(f, "confirmed"),
            OperationStatus::Reverted => write!(f, "reverted"),
            OperationStatus::TimedOut => write!(f, "timed out"),
        }
    }
}

// ─── OperationHandle ─────────────────────────────────────────────────────────

/// Identifies a submitted operation (its transaction hash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationHandle(B256);

impl OperationHandle {
    pub fn new(hash: B256) -> Self {
        Self(hash)
    }

    pub fn tx_hash(&self) -> B256 {
        self.0
    }
}

impl std::fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── OperationRequest ────────────────────────────────────────────────────────

/// A mutating call, built by the purchase orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub kind: OperationKind,
    /// Fixed-point amount spent (or approved).
    pub amount: U256,
    pub referrer: Referrer,
    /// Native coin attached to the call.
    pub payable_value: Option<U256>,
}

impl OperationRequest {
    /// Let the sale contract pull `amount` stablecoins.
    pub fn approve(amount: U256) -> Self {
        Self {
            kind: OperationKind::ApproveSpend,
            amount,
            referrer: Referrer::NONE,
            payable_value: None,
        }
    }

    /// Buy with the native coin; the amount travels as transaction value.
    pub fn buy_with_native(amount: U256, referrer: Referrer) -> Self {
        Self {
            kind: OperationKind::BuyWithNative,
            amount,
            referrer,
            payable_value: Some(amount),
        }
    }

    /// Buy with stablecoins; the amount travels as a call argument.
    pub fn buy_with_stable(amount: U256, referrer: Referrer) -> Self {
        Self {
            kind: OperationKind::BuyWithStable,
            amount,
            referrer,
            payable_value: None,
        }
    }

    /// Encode into a transaction sent from `from`.
    pub fn to_transaction(&self, from: Address, config: &SaleConfig) -> TransactionRequest {
        let (to, data) = match self.kind {
            OperationKind::ApproveSpend => (
                config.stable_token,
                IERC20::approveCall {
                    spender: config.sale_contract,
                    value: self.amount,
                }
                .abi_encode(),
            ),
            OperationKind::BuyWithNative => (
                config.sale_contract,
                ITokenSale::buyWithBNBCall {
                    referrer: self.referrer.as_address(),
                }
                .abi_encode(),
            ),
            OperationKind::BuyWithStable => (
                config.sale_contract,
                ITokenSale::buyWithUSDTCall {
                    usdtAmount: self.amount,
                    referrer: self.referrer.as_address(),
                }
                .abi_encode(),
            ),
        };

        TransactionRequest {
            from,
            to,
            data: Bytes::from(data),
            value: self.payable_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const BUYER: Address = address!("00000000000000000000000000000000000000b0");

    #[test]
    fn test_approve_targets_stable_token() {
        let config = SaleConfig::default();
        let tx = OperationRequest::approve(U256::from(5)).to_transaction(BUYER, &config);
        assert_eq!(tx.to, config.stable_token);
        assert_eq!(tx.value, None);

        let decoded = IERC20::approveCall::abi_decode(&tx.data, true).unwrap();
        assert_eq!(decoded.spender, config.sale_contract);
        assert_eq!(decoded.value, U256::from(5));
    }

    #[test]
    fn test_native_buy_attaches_value() {
        let config = SaleConfig::default();
        let tx = OperationRequest::buy_with_native(U256::from(9), Referrer::NONE)
            .to_transaction(BUYER, &config);
        assert_eq!(tx.to, config.sale_contract);
        assert_eq!(tx.value, Some(U256::from(9)));

        let decoded = ITokenSale::buyWithBNBCall::abi_decode(&tx.data, true).unwrap();
        assert_eq!(decoded.referrer, Address::ZERO);
    }

    #[test]
    fn test_stable_buy_passes_amount_and_referrer() {
        let config = SaleConfig::default();
        let referrer = Referrer::new(BUYER);
        let tx = OperationRequest::buy_with_stable(U256::from(7), referrer)
            .to_transaction(BUYER, &config);
        assert_eq!(tx.value, None);

        let decoded = ITokenSale::buyWithUSDTCall::abi_decode(&tx.data, true).unwrap();
        assert_eq!(decoded.usdtAmount, U256::from(7));
        assert_eq!(decoded.referrer, BUYER);
    }
}
