//! Unified SDK error types.
//!
//! Every failure is scoped to a single read, operation or purchase session.
//! Nothing here is fatal to the process.

use thiserror::Error;

use crate::domain::operation::{OperationKind, OperationStatus};
use crate::domain::purchase::TransitionError;

/// Top-level SDK error.
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    #[error("Submission rejected: {0}")]
    Submission(#[from] SubmissionError),

    #[error("{kind} {status}: {reason}")]
    OperationFailure {
        kind: OperationKind,
        status: OperationStatus,
        reason: String,
    },

    #[error("Wrong network (chain id {chain_id})")]
    WrongNetwork { chain_id: u64 },

    #[error("Wallet not connected")]
    NotConnected,

    #[error("No network switch needed")]
    NoSwitchNeeded,

    /// The purchase session refused an action in its current phase.
    #[error("Session refused: {0}")]
    Transition(#[from] TransitionError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl SdkError {
    /// Whether the failure came from a network-side outcome rather than local
    /// validation. Sessions stay re-submittable in both cases.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            SdkError::Read(_)
                | SdkError::Submission(_)
                | SdkError::OperationFailure { .. }
                | SdkError::Rpc(_)
        )
    }
}

/// An amount or referrer the user typed that can never be submitted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Amount is empty")]
    EmptyAmount,

    #[error("Invalid amount '{0}'")]
    InvalidAmount(String),

    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(String),

    #[error("Amount '{input}' has more than {decimals} fractional digits")]
    TooPrecise { input: String, decimals: u8 },

    #[error("Amount '{0}' overflows the token representation")]
    Overflow(String),

    #[error("Invalid referrer address '{0}'")]
    InvalidReferrer(String),
}

/// A view-only query that failed after its retries were exhausted.
#[derive(Error, Debug)]
#[error("Failed to read {field}: {source}")]
pub struct ReadError {
    pub field: String,
    #[source]
    pub source: RpcError,
}

/// A mutating operation refused before the network accepted it.
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("User rejected the request")]
    UserRejected,

    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("{0}")]
    Rejected(String),

    #[error("Transport failure: {0}")]
    Transport(#[source] RpcError),
}

/// JSON-RPC transport errors.
#[derive(Error, Debug)]
pub enum RpcError {
    #[cfg(feature = "rpc")]
    #[error("Request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Server error {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("Rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl RpcError {
    /// EIP-1193 code for a request the wallet user declined.
    pub const USER_REJECTED: i64 = 4001;

    /// Transient failures worth another attempt on idempotent calls.
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::ServerError { status, .. } => matches!(status, 502..=504),
            RpcError::RateLimited { .. } | RpcError::Timeout => true,
            // -32005: limit exceeded, -32603: internal error on most nodes
            RpcError::JsonRpc { code, .. } => matches!(code, -32005 | -32603),
            #[cfg(feature = "rpc")]
            RpcError::Reqwest(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}

impl From<RpcError> for SubmissionError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::JsonRpc { code, .. } if code == RpcError::USER_REJECTED => {
                SubmissionError::UserRejected
            }
            RpcError::JsonRpc { code: -32602, message } => SubmissionError::Malformed(message),
            RpcError::JsonRpc { message, .. } => SubmissionError::Rejected(message),
            other => SubmissionError::Transport(other),
        }
    }
}
