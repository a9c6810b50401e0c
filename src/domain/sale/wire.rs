//! Contract interfaces: the sale contract and the ERC-20 tokens.
//!
//! Call structs produced here are ABI-encoded for `eth_call` /
//! `eth_sendTransaction`; return structs decode the raw output.

use alloy_sol_types::sol;

sol! {
    interface ITokenSale {
        function buyWithBNB(address referrer) external payable;
        function buyWithUSDT(uint256 usdtAmount, address referrer) external;
        function endTime() external view returns (uint256);
        function tokenPriceBNB() external view returns (uint256);
        function tokenPriceUSDT() external view returns (uint256);
        function totalTokensSold() external view returns (uint256);
        function paused() external view returns (bool);
    }

    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, U256};
    use alloy_sol_types::SolCall;

    #[test]
    fn test_selectors_match_deployed_abi() {
        // keccak256("approve(address,uint256)")[..4]
        assert_eq!(IERC20::approveCall::SELECTOR, [0x09, 0x5e, 0xa7, 0xb3]);
        // keccak256("balanceOf(address)")[..4]
        assert_eq!(IERC20::balanceOfCall::SELECTOR, [0x70, 0xa0, 0x82, 0x31]);
        // keccak256("allowance(address,address)")[..4]
        assert_eq!(IERC20::allowanceCall::SELECTOR, [0xdd, 0x62, 0xed, 0x3e]);
    }

    #[test]
    fn test_buy_with_stable_encodes_amount_then_referrer() {
        let call = ITokenSale::buyWithUSDTCall {
            usdtAmount: U256::from(5u64),
            referrer: Address::ZERO,
        };
        let data = call.abi_encode();
        assert_eq!(data.len(), 4 + 32 + 32);
        assert_eq!(data[4 + 31], 5);
        assert!(data[4 + 32..].iter().all(|b| *b == 0));
    }
}
