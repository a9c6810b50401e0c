//! The seam between the SDK and the remote chain.
//!
//! Everything above this module only talks to [`ChainRead`] / [`ChainWrite`].
//! [`crate::rpc::RpcClient`] implements both over JSON-RPC; tests use an
//! in-memory implementation.

use std::future::Future;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// A state-mutating transaction, signed and sent by the connected wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    /// Native coin attached to the call, for payable functions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

/// Final outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    /// `true` when the receipt status is 1.
    pub success: bool,
}

/// View-only access to the chain and the connected wallet.
pub trait ChainRead: Send + Sync + 'static {
    /// Id of the network the wallet is connected to.
    fn chain_id(&self) -> impl Future<Output = Result<u64, RpcError>> + Send;

    /// Accounts exposed by the wallet. Empty when not connected.
    fn accounts(&self) -> impl Future<Output = Result<Vec<Address>, RpcError>> + Send;

    /// Execute a view call and return the raw ABI-encoded output.
    fn call(&self, to: Address, data: Bytes)
        -> impl Future<Output = Result<Bytes, RpcError>> + Send;

    /// Native coin balance of `owner`.
    fn balance(&self, owner: Address) -> impl Future<Output = Result<U256, RpcError>> + Send;
}

/// State-mutating access. Implementations must never resend a transaction.
pub trait ChainWrite: ChainRead {
    /// Hand a transaction to the wallet. Resolves once the network accepted it.
    fn send_transaction(
        &self,
        tx: TransactionRequest,
    ) -> impl Future<Output = Result<B256, RpcError>> + Send;

    /// Receipt of a transaction, `None` while it is not yet mined.
    fn receipt(&self, hash: B256) -> impl Future<Output = Result<Option<Receipt>, RpcError>> + Send;

    /// Ask the wallet to switch to another network.
    fn switch_chain(&self, chain_id: u64) -> impl Future<Output = Result<(), RpcError>> + Send;
}
