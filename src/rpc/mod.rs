//! JSON-RPC transport: `RpcClient` with per-method retry policies.

pub mod retry;

#[cfg(feature = "rpc")]
pub mod client;
#[cfg(feature = "rpc")]
pub mod wire;

#[cfg(feature = "rpc")]
pub use client::RpcClient;
pub use retry::{RetryConfig, RetryPolicy};
