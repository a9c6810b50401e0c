//! Process-wide, immutable sale configuration.
//!
//! Built once (through [`crate::client::SaleClientBuilder`] or deserialized
//! from the app's own config source) and shared as `Arc<SaleConfig>`.

use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::network;
use crate::rpc::retry::RetryConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SaleConfig {
    pub sale_contract: Address,
    pub project_token: Address,
    pub stable_token: Address,
    /// Networks the sale may be used on. The first entry is the one the
    /// wallet is asked to switch to.
    pub allowed_chain_ids: Vec<u64>,
    /// Decimals of the stable and project tokens.
    pub token_decimals: u8,
    /// Retry budget for each view-only read.
    pub read_retry: RetryConfig,
    /// Per-attempt timeout for view-only reads.
    pub read_timeout: Duration,
    pub receipt_poll_interval: Duration,
    /// How long to wait for a receipt before reporting `TimedOut`.
    pub operation_timeout: Duration,
    /// Fixed snapshot refresh interval, if any.
    pub refresh_interval: Option<Duration>,
    /// Approval rounds attempted before a stable purchase gives up.
    pub max_approval_cycles: u32,
}

impl Default for SaleConfig {
    fn default() -> Self {
        Self {
            sale_contract: network::SALE_CONTRACT_ADDRESS,
            project_token: network::PROJECT_TOKEN_ADDRESS,
            stable_token: network::STABLE_TOKEN_ADDRESS,
            allowed_chain_ids: network::ALLOWED_CHAIN_IDS.to_vec(),
            token_decimals: network::TOKEN_DECIMALS,
            read_retry: RetryConfig {
                max_retries: 2,
                ..RetryConfig::idempotent()
            },
            read_timeout: Duration::from_secs(5),
            receipt_poll_interval: Duration::from_secs(2),
            operation_timeout: Duration::from_secs(180),
            refresh_interval: None,
            max_approval_cycles: 3,
        }
    }
}

impl SaleConfig {
    /// The network offered as the recovery target when the wallet is
    /// connected elsewhere.
    pub fn production_chain_id(&self) -> u64 {
        self.allowed_chain_ids
            .first()
            .copied()
            .unwrap_or(network::BSC_CHAIN_ID)
    }

    pub fn is_allowed_chain(&self, chain_id: u64) -> bool {
        self.allowed_chain_ids.contains(&chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allows_bsc_and_testnet_only() {
        let config = SaleConfig::default();
        assert!(config.is_allowed_chain(56));
        assert!(config.is_allowed_chain(97));
        assert!(!config.is_allowed_chain(1));
        assert_eq!(config.production_chain_id(), 56);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: SaleConfig =
            serde_json::from_str(r#"{ "allowed_chain_ids": [97], "max_approval_cycles": 1 }"#)
                .unwrap();
        assert_eq!(config.production_chain_id(), 97);
        assert_eq!(config.max_approval_cycles, 1);
        assert_eq!(config.sale_contract, network::SALE_CONTRACT_ADDRESS);
    }
}
