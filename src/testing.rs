//! In-memory chain for tests.
//!
//! [`MockChain`] implements [`ChainRead`] and [`ChainWrite`] against a small
//! model of the sale contract and its two tokens. Transactions take effect
//! when their receipt is first observed, which lets tests check what was
//! read before and after an operation became final.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use alloy_primitives::{address, Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use chrono::{DateTime, Utc};

use crate::chain::{ChainRead, ChainWrite, Receipt, TransactionRequest};
use crate::config::SaleConfig;
use crate::domain::sale::wire::{IERC20, ITokenSale};
use crate::error::RpcError;
use crate::network;
use crate::shared::units::pow10;

/// Account the mock wallet exposes by default.
pub const BUYER: Address = address!("00000000000000000000000000000000000000b0");

/// What happens to the next transaction sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Mined successfully with its normal effects.
    Confirm,
    /// Mined with status 0, no effects.
    Revert,
    /// Accepted but never mined.
    Pending,
    /// Refused by the wallet with a JSON-RPC error.
    Reject { code: i64, message: String },
    /// Mined successfully, but the allowance afterwards reads as the given
    /// value (a node lagging behind, or a token that grants less).
    ConfirmWithAllowance(U256),
}

/// Everything the mock observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    View { to: Address, selector: [u8; 4] },
    Balance { owner: Address },
    Sent { hash: B256, tx: TransactionRequest },
    Mined { hash: B256, success: bool },
    SwitchChain { chain_id: u64 },
}

#[derive(Debug)]
struct PendingTx {
    tx: TransactionRequest,
    outcome: SendOutcome,
}

#[derive(Debug)]
struct MockState {
    chain_id: u64,
    accounts: Vec<Address>,
    sale: Address,
    project_token: Address,
    stable_token: Address,

    end_time: U256,
    price_native: U256,
    price_stable: U256,
    total_sold: U256,
    paused: bool,

    allowance: U256,
    native_balance: U256,
    stable_balance: U256,
    project_balance: U256,

    outcomes: VecDeque<SendOutcome>,
    in_flight: HashMap<B256, PendingTx>,
    mined: HashMap<B256, Receipt>,
    failing: HashSet<[u8; 4]>,
    flaky: HashMap<[u8; 4], u32>,
    stalled: HashSet<[u8; 4]>,
    reject_switch: bool,
    nonce: u64,
    log: Vec<ChainEvent>,
}

/// Shared handle to an in-memory chain. Clones see the same state.
#[derive(Debug, Clone)]
pub struct MockChain {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new(&SaleConfig::default())
    }
}

impl MockChain {
    /// A connected testnet wallet with stablecoins and native coin, no
    /// allowance, a sale ending in one day.
    pub fn new(config: &SaleConfig) -> Self {
        let end_time = Utc::now().timestamp() + 86_400;
        let state = MockState {
            chain_id: network::BSC_TESTNET_CHAIN_ID,
            accounts: vec![BUYER],
            sale: config.sale_contract,
            project_token: config.project_token,
            stable_token: config.stable_token,
            end_time: U256::from(end_time.max(0) as u64),
            price_native: pow10(16),
            price_stable: pow10(17),
            total_sold: U256::ZERO,
            paused: false,
            allowance: U256::ZERO,
            native_balance: U256::from(10) * pow10(18),
            stable_balance: U256::from(1000) * pow10(18),
            project_balance: U256::ZERO,
            outcomes: VecDeque::new(),
            in_flight: HashMap::new(),
            mined: HashMap::new(),
            failing: HashSet::new(),
            flaky: HashMap::new(),
            stalled: HashSet::new(),
            reject_switch: false,
            nonce: 0,
            log: Vec::new(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Setup ────────────────────────────────────────────────────────────

    pub fn set_chain_id(&self, chain_id: u64) -> &Self {
        self.lock().chain_id = chain_id;
        self
    }

    /// No accounts exposed, as if the wallet were locked.
    pub fn disconnect(&self) -> &Self {
        self.lock().accounts.clear();
        self
    }

    pub fn set_allowance(&self, value: U256) -> &Self {
        self.lock().allowance = value;
        self
    }

    pub fn set_prices(&self, native: U256, stable: U256) -> &Self {
        let mut s = self.lock();
        s.price_native = native;
        s.price_stable = stable;
        drop(s);
        self
    }

    pub fn set_end_time(&self, deadline: DateTime<Utc>) -> &Self {
        self.lock().end_time = U256::from(deadline.timestamp().max(0) as u64);
        self
    }

    pub fn set_paused(&self, paused: bool) -> &Self {
        self.lock().paused = paused;
        self
    }

    pub fn set_total_sold(&self, value: U256) -> &Self {
        self.lock().total_sold = value;
        self
    }

    /// Queue the outcome of the next sent transaction. Unqueued sends confirm.
    pub fn push_outcome(&self, outcome: SendOutcome) -> &Self {
        self.lock().outcomes.push_back(outcome);
        self
    }

    /// Make every view call with `selector` fail until [`heal`](Self::heal).
    pub fn fail_view(&self, selector: [u8; 4]) -> &Self {
        self.lock().failing.insert(selector);
        self
    }

    /// Make the next `times` view calls with `selector` fail with a 503.
    pub fn fail_view_times(&self, selector: [u8; 4], times: u32) -> &Self {
        self.lock().flaky.insert(selector, times);
        self
    }

    /// Make view calls with `selector` hang until [`heal`](Self::heal).
    /// Calls already hanging stay hung.
    pub fn stall_view(&self, selector: [u8; 4]) -> &Self {
        self.lock().stalled.insert(selector);
        self
    }

    pub fn heal(&self) -> &Self {
        let mut s = self.lock();
        s.failing.clear();
        s.flaky.clear();
        s.stalled.clear();
        drop(s);
        self
    }

    pub fn reject_switch(&self, reject: bool) -> &Self {
        self.lock().reject_switch = reject;
        self
    }

    // ── Inspection ───────────────────────────────────────────────────────

    pub fn events(&self) -> Vec<ChainEvent> {
        self.lock().log.clone()
    }

    /// Transactions accepted so far.
    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.lock()
            .log
            .iter()
            .filter_map(|e| match e {
                ChainEvent::Sent { tx, .. } => Some(tx.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn allowance(&self) -> U256 {
        self.lock().allowance
    }

    /// View calls made so far with `selector`, failed ones included.
    pub fn view_count(&self, selector: [u8; 4]) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|e| matches!(e, ChainEvent::View { selector: s, .. } if *s == selector))
            .count()
    }

    pub fn project_balance(&self) -> U256 {
        self.lock().project_balance
    }

    pub fn chain_id_now(&self) -> u64 {
        self.lock().chain_id
    }
}

impl MockState {
    fn view(&mut self, to: Address, data: &[u8]) -> Result<Bytes, RpcError> {
        let selector: [u8; 4] = data
            .get(..4)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| RpcError::InvalidResponse("call data too short".into()))?;
        self.log.push(ChainEvent::View { to, selector });

        if self.failing.contains(&selector) {
            return Err(RpcError::JsonRpc {
                code: -32000,
                message: "header not found".into(),
            });
        }
        if let Some(left) = self.flaky.get_mut(&selector).filter(|left| **left > 0) {
            *left -= 1;
            return Err(RpcError::ServerError {
                status: 503,
                body: "service unavailable".into(),
            });
        }

        let value = if to == self.sale {
            match selector {
                ITokenSale::endTimeCall::SELECTOR => self.end_time,
                ITokenSale::tokenPriceBNBCall::SELECTOR => self.price_native,
                ITokenSale::tokenPriceUSDTCall::SELECTOR => self.price_stable,
                ITokenSale::totalTokensSoldCall::SELECTOR => self.total_sold,
                ITokenSale::pausedCall::SELECTOR => U256::from(self.paused as u8),
                _ => return Err(execution_reverted()),
            }
        } else if to == self.stable_token || to == self.project_token {
            match selector {
                IERC20::allowanceCall::SELECTOR if to == self.stable_token => {
                    let call = IERC20::allowanceCall::abi_decode(data, true)
                        .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;
                    if call.spender == self.sale {
                        self.allowance
                    } else {
                        U256::ZERO
                    }
                }
                IERC20::balanceOfCall::SELECTOR => {
                    let call = IERC20::balanceOfCall::abi_decode(data, true)
                        .map_err(|e| RpcError::InvalidResponse(e.to_string()))?;
                    if !self.accounts.contains(&call.owner) {
                        U256::ZERO
                    } else if to == self.stable_token {
                        self.stable_balance
                    } else {
                        self.project_balance
                    }
                }
                _ => return Err(execution_reverted()),
            }
        } else {
            // no code at the address
            return Ok(Bytes::new());
        };

        Ok(Bytes::from(value.to_be_bytes::<32>().to_vec()))
    }

    fn send(&mut self, tx: TransactionRequest) -> Result<B256, RpcError> {
        let outcome = self.outcomes.pop_front().unwrap_or(SendOutcome::Confirm);
        if let SendOutcome::Reject { code, message } = outcome {
            return Err(RpcError::JsonRpc { code, message });
        }

        self.nonce += 1;
        let hash = B256::left_padding_from(&self.nonce.to_be_bytes());
        self.log.push(ChainEvent::Sent {
            hash,
            tx: tx.clone(),
        });
        self.in_flight.insert(hash, PendingTx { tx, outcome });
        Ok(hash)
    }

    fn receipt(&mut self, hash: B256) -> Option<Receipt> {
        if let Some(receipt) = self.mined.get(&hash) {
            return Some(*receipt);
        }
        if self.in_flight.get(&hash)?.outcome == SendOutcome::Pending {
            return None;
        }
        let pending = self.in_flight.remove(&hash)?;

        let success = match &pending.outcome {
            SendOutcome::Pending | SendOutcome::Revert | SendOutcome::Reject { .. } => false,
            SendOutcome::Confirm => self.apply(&pending.tx),
            SendOutcome::ConfirmWithAllowance(value) => {
                let success = self.apply(&pending.tx);
                self.allowance = *value;
                success
            }
        };

        let receipt = Receipt {
            transaction_hash: hash,
            block_number: Some(self.nonce),
            success,
        };
        self.mined.insert(hash, receipt);
        self.log.push(ChainEvent::Mined { hash, success });
        Some(receipt)
    }

    /// Execute a mined transaction. `false` when the contract would revert.
    fn apply(&mut self, tx: &TransactionRequest) -> bool {
        let data = tx.data.as_ref();
        let one = pow10(18);

        if tx.to == self.stable_token {
            let Ok(call) = IERC20::approveCall::abi_decode(data, true) else {
                return false;
            };
            if call.spender == self.sale {
                self.allowance = call.value;
            }
            return true;
        }
        if tx.to != self.sale || self.paused {
            return false;
        }

        if let Ok(_call) = ITokenSale::buyWithBNBCall::abi_decode(data, true) {
            let value = tx.value.unwrap_or_default();
            if value.is_zero() || value > self.native_balance || self.price_native.is_zero() {
                return false;
            }
            let tokens = value * one / self.price_native;
            self.native_balance -= value;
            self.project_balance += tokens;
            self.total_sold += tokens;
            return true;
        }

        if let Ok(call) = ITokenSale::buyWithUSDTCall::abi_decode(data, true) {
            let amount = call.usdtAmount;
            if amount > self.allowance || amount > self.stable_balance || self.price_stable.is_zero() {
                return false;
            }
            let tokens = amount * one / self.price_stable;
            self.allowance -= amount;
            self.stable_balance -= amount;
            self.project_balance += tokens;
            self.total_sold += tokens;
            return true;
        }

        false
    }
}

fn execution_reverted() -> RpcError {
    RpcError::JsonRpc {
        code: 3,
        message: "execution reverted".into(),
    }
}

impl ChainRead for MockChain {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        Ok(self.lock().chain_id)
    }

    async fn accounts(&self) -> Result<Vec<Address>, RpcError> {
        Ok(self.lock().accounts.clone())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError> {
        let selector: Option<[u8; 4]> = data.get(..4).and_then(|s| s.try_into().ok());
        if let Some(selector) = selector.filter(|s| self.lock().stalled.contains(s)) {
            self.lock().log.push(ChainEvent::View { to, selector });
            futures_util::future::pending::<()>().await;
        }
        self.lock().view(to, &data)
    }

    async fn balance(&self, owner: Address) -> Result<U256, RpcError> {
        let mut s = self.lock();
        s.log.push(ChainEvent::Balance { owner });
        if s.accounts.contains(&owner) {
            Ok(s.native_balance)
        } else {
            Ok(U256::ZERO)
        }
    }
}

impl ChainWrite for MockChain {
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256, RpcError> {
        self.lock().send(tx)
    }

    async fn receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError> {
        Ok(self.lock().receipt(hash))
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), RpcError> {
        let mut s = self.lock();
        if s.reject_switch {
            return Err(RpcError::JsonRpc {
                code: RpcError::USER_REJECTED,
                message: "User rejected the request.".into(),
            });
        }
        s.chain_id = chain_id;
        s.log.push(ChainEvent::SwitchChain { chain_id });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::operation::OperationRequest;
    use crate::shared::Referrer;

    #[tokio::test]
    async fn test_views_decode_as_uint() {
        let chain = MockChain::default();
        let config = SaleConfig::default();
        let raw = chain
            .call(
                config.sale_contract,
                Bytes::from(ITokenSale::tokenPriceBNBCall {}.abi_encode()),
            )
            .await
            .unwrap();
        let out = ITokenSale::tokenPriceBNBCall::abi_decode_returns(&raw, true).unwrap();
        assert_eq!(out._0, pow10(16));
    }

    #[tokio::test]
    async fn test_approve_takes_effect_when_mined() {
        let chain = MockChain::default();
        let config = SaleConfig::default();
        let tx = OperationRequest::approve(U256::from(5)).to_transaction(BUYER, &config);

        let hash = chain.send_transaction(tx).await.unwrap();
        assert_eq!(chain.allowance(), U256::ZERO);

        let receipt = chain.receipt(hash).await.unwrap().unwrap();
        assert!(receipt.success);
        assert_eq!(chain.allowance(), U256::from(5));
    }

    #[tokio::test]
    async fn test_stable_buy_without_allowance_reverts() {
        let chain = MockChain::default();
        let config = SaleConfig::default();
        let tx = OperationRequest::buy_with_stable(pow10(18), Referrer::NONE)
            .to_transaction(BUYER, &config);

        let hash = chain.send_transaction(tx).await.unwrap();
        let receipt = chain.receipt(hash).await.unwrap().unwrap();
        assert!(!receipt.success);
        assert_eq!(chain.project_balance(), U256::ZERO);
    }

    #[tokio::test]
    async fn test_rejected_send_is_not_logged() {
        let chain = MockChain::default();
        chain.push_outcome(SendOutcome::Reject {
            code: 4001,
            message: "denied".into(),
        });
        let tx = OperationRequest::approve(U256::from(1)).to_transaction(BUYER, &SaleConfig::default());
        let err = chain.send_transaction(tx).await.unwrap_err();
        assert!(matches!(err, RpcError::JsonRpc { code: 4001, .. }));
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn test_flaky_view_fails_then_recovers() {
        let chain = MockChain::default();
        let config = SaleConfig::default();
        let selector = ITokenSale::pausedCall::SELECTOR;
        chain.fail_view_times(selector, 2);
        let data = Bytes::from(ITokenSale::pausedCall {}.abi_encode());

        for _ in 0..2 {
            let err = chain.call(config.sale_contract, data.clone()).await.unwrap_err();
            assert!(err.is_transient());
        }
        assert!(chain.call(config.sale_contract, data).await.is_ok());
        assert_eq!(chain.view_count(selector), 3);
    }
}
