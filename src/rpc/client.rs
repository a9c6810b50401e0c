//! Low-level JSON-RPC client: `RpcClient`.
//!
//! One method per `eth_*` call the SDK needs. Each call carries its own
//! retry policy: view-only calls may be retried, transactions never are.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use super::retry::{with_retry, RetryPolicy};
use super::wire::{CallRequest, JsonRpcRequest, JsonRpcResponse, ReceiptWire, SwitchChainParams};
use crate::chain::{ChainRead, ChainWrite, Receipt, TransactionRequest};
use crate::error::RpcError;

/// JSON-RPC client for an EVM node or wallet bridge.
///
/// Transactions are signed by whatever sits behind the endpoint; this client
/// never touches keys.
pub struct RpcClient {
    url: String,
    client: Client,
    next_id: Arc<AtomicU64>,
    /// Policy for `eth_call` / `eth_getBalance`. `None` by default since
    /// [`ChainReader`](crate::domain::sale::ChainReader) retries those itself.
    view_retry: RetryPolicy,
}

impl RpcClient {
    pub fn new(url: &str) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()?;

        Ok(Self {
            url: url.to_string(),
            client,
            next_id: Arc::new(AtomicU64::new(1)),
            view_retry: RetryPolicy::None,
        })
    }

    /// Retry view calls at the transport level too.
    pub fn with_view_retry(mut self, policy: RetryPolicy) -> Self {
        self.view_retry = policy;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    // ── Wallet ───────────────────────────────────────────────────────────

    pub async fn eth_chain_id(&self) -> Result<u64, RpcError> {
        let id: U64 = self
            .request("eth_chainId", json!([]), RetryPolicy::Idempotent)
            .await?;
        Ok(id.to::<u64>())
    }

    pub async fn eth_accounts(&self) -> Result<Vec<Address>, RpcError> {
        self.request("eth_accounts", json!([]), RetryPolicy::Idempotent)
            .await
    }

    pub async fn wallet_switch_ethereum_chain(&self, chain_id: u64) -> Result<(), RpcError> {
        let params = [SwitchChainParams {
            chain_id: U64::from(chain_id),
        }];
        let _: serde_json::Value = self
            .request("wallet_switchEthereumChain", params, RetryPolicy::None)
            .await?;
        Ok(())
    }

    // ── Views ────────────────────────────────────────────────────────────

    pub async fn eth_call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError> {
        let call = CallRequest { to, data };
        let params = json!([call, "latest"]);
        self.request("eth_call", params, self.view_retry.clone())
            .await
    }

    pub async fn eth_get_balance(&self, owner: Address) -> Result<U256, RpcError> {
        self.request("eth_getBalance", json!([owner, "latest"]), self.view_retry.clone())
            .await
    }

    // ── Transactions ─────────────────────────────────────────────────────

    /// Never retried: a resend could execute the purchase twice.
    pub async fn eth_send_transaction(&self, tx: &TransactionRequest) -> Result<B256, RpcError> {
        self.request("eth_sendTransaction", [tx], RetryPolicy::None)
            .await
    }

    pub async fn eth_get_transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError> {
        let wire: Option<ReceiptWire> = self
            .request("eth_getTransactionReceipt", [hash], RetryPolicy::Idempotent)
            .await?;
        Ok(wire.map(Receipt::from))
    }

    // ── Internal request methods ─────────────────────────────────────────

    async fn request<T: DeserializeOwned, P: Serialize>(
        &self,
        method: &str,
        params: P,
        retry: RetryPolicy,
    ) -> Result<T, RpcError> {
        match retry.config() {
            None => self.do_request(method, &params).await,
            Some(config) => {
                let params = &params;
                with_retry(&config, method, || self.do_request(method, params)).await
            }
        }
    }

    async fn do_request<T: DeserializeOwned, P: Serialize>(
        &self,
        method: &str,
        params: &P,
    ) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = JsonRpcRequest::new(id, method, params);

        let resp = self.client.post(&self.url).json(&body).send().await?;
        let status = resp.status();

        if status.is_success() {
            let envelope = resp.json::<JsonRpcResponse>().await?;
            return envelope.into_result();
        }

        let status_code = status.as_u16();
        let retry_after_ms = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs * 1000);
        let body_text = resp.text().await.unwrap_or_default();

        match status_code {
            429 => Err(RpcError::RateLimited { retry_after_ms }),
            _ => Err(RpcError::ServerError {
                status: status_code,
                body: body_text,
            }),
        }
    }
}

impl Clone for RpcClient {
    fn clone(&self) -> Self {
        Self {
            url: self.url.clone(),
            client: self.client.clone(),
            next_id: self.next_id.clone(),
            view_retry: self.view_retry.clone(),
        }
    }
}

impl ChainRead for RpcClient {
    async fn chain_id(&self) -> Result<u64, RpcError> {
        self.eth_chain_id().await
    }

    async fn accounts(&self) -> Result<Vec<Address>, RpcError> {
        self.eth_accounts().await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError> {
        self.eth_call(to, data).await
    }

    async fn balance(&self, owner: Address) -> Result<U256, RpcError> {
        self.eth_get_balance(owner).await
    }
}

impl ChainWrite for RpcClient {
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<B256, RpcError> {
        self.eth_send_transaction(&tx).await
    }

    async fn receipt(&self, hash: B256) -> Result<Option<Receipt>, RpcError> {
        self.eth_get_transaction_receipt(hash).await
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), RpcError> {
        self.wallet_switch_ethereum_chain(chain_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_keeps_url() {
        let client = RpcClient::new(crate::network::DEFAULT_TESTNET_RPC_URL).unwrap();
        assert_eq!(client.url(), crate::network::DEFAULT_TESTNET_RPC_URL);
    }

    #[test]
    fn test_request_ids_are_shared_across_clones() {
        let client = RpcClient::new("http://localhost:8545").unwrap();
        let clone = client.clone();
        client.next_id.fetch_add(1, Ordering::Relaxed);
        assert_eq!(clone.next_id.load(Ordering::Relaxed), 2);
    }
}
