//! Network constants for the token sale.

use alloy_primitives::{address, Address};

/// BNB Smart Chain mainnet.
pub const BSC_CHAIN_ID: u64 = 56;

/// BNB Smart Chain testnet.
pub const BSC_TESTNET_CHAIN_ID: u64 = 97;

/// Chains the sale may be used on, production first.
pub const ALLOWED_CHAIN_IDS: [u64; 2] = [BSC_CHAIN_ID, BSC_TESTNET_CHAIN_ID];

/// Default JSON-RPC endpoint for mainnet.
pub const DEFAULT_RPC_URL: &str = "https://bsc-dataseed.bnbchain.org";

/// Default JSON-RPC endpoint for testnet.
pub const DEFAULT_TESTNET_RPC_URL: &str = "https://data-seed-prebsc-1-s1.bnbchain.org:8545";

/// Sale contract deployment.
pub const SALE_CONTRACT_ADDRESS: Address = address!("Bc8829bc74799B374932D5391836Fc9a1870245a");

/// Token being sold.
pub const PROJECT_TOKEN_ADDRESS: Address = address!("b46B161d67889cA2172E3f6b3DAA024D9be3f3F3");

/// Stablecoin accepted as payment.
pub const STABLE_TOKEN_ADDRESS: Address = address!("9D4aee992DBe30c26AB883E4E8E269111813767d");

/// Sentinel meaning "no referrer".
pub const ZERO_ADDRESS: Address = Address::ZERO;

/// Default decimals of the stable and project tokens.
pub const TOKEN_DECIMALS: u8 = 18;

/// Decimals of the native coin (BNB). Not configurable.
pub const NATIVE_DECIMALS: u8 = 18;
