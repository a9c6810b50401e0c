//! JSON-RPC 2.0 envelopes and the raw shapes of `eth_*` results.

use alloy_primitives::{Address, Bytes, B256, U64};
use serde::{Deserialize, Serialize};

use crate::chain::Receipt;
use crate::error::RpcError;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a, P> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: P,
}

impl<'a, P: Serialize> JsonRpcRequest<'a, P> {
    pub fn new(id: u64, method: &'a str, params: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method,
            params,
        }
    }
}

/// Response envelope. `result` stays raw so a `null` result can be told
/// apart from a missing one by the caller's target type.
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(default)]
    pub error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl From<JsonRpcErrorObject> for RpcError {
    fn from(e: JsonRpcErrorObject) -> Self {
        // Revert reasons usually travel in `data`.
        let message = match e.data {
            Some(serde_json::Value::String(data)) if !data.is_empty() => {
                format!("{} ({})", e.message, data)
            }
            _ => e.message,
        };
        RpcError::JsonRpc {
            code: e.code,
            message,
        }
    }
}

impl JsonRpcResponse {
    /// Decode the result into `T`, surfacing the error object if present.
    pub fn into_result<T: serde::de::DeserializeOwned>(self) -> Result<T, RpcError> {
        if let Some(error) = self.error {
            return Err(error.into());
        }
        serde_json::from_value(self.result).map_err(|e| RpcError::InvalidResponse(e.to_string()))
    }
}

/// `eth_call` target.
#[derive(Debug, Serialize)]
pub struct CallRequest {
    pub to: Address,
    pub data: Bytes,
}

/// `wallet_switchEthereumChain` parameter.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchChainParams {
    pub chain_id: U64,
}

/// Subset of `eth_getTransactionReceipt` we care about.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptWire {
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_number: Option<U64>,
    /// `0x1` success, `0x0` reverted. Pre-Byzantium receipts have none.
    #[serde(default)]
    pub status: Option<U64>,
}

impl From<ReceiptWire> for Receipt {
    fn from(w: ReceiptWire) -> Self {
        Receipt {
            transaction_hash: w.transaction_hash,
            block_number: w.block_number.map(|n| n.to::<u64>()),
            success: w.status.map(|s| s == U64::from(1)).unwrap_or(false),
        }
    }
}
