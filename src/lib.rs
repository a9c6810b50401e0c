//! # Token Sale SDK
//!
//! Client-side orchestration for buying a project token from an on-chain
//! sale contract, paying with the native coin or a stablecoin.
//!
//! ## Architecture
//!
//! The SDK is organized in layers:
//!
//! 1. **Core**: fixed-point units, quotes, the allowance gate, the purchase
//!    state machine and countdown math. Pure, no I/O.
//! 2. **Chain seam**: the [`chain::ChainRead`] / [`chain::ChainWrite`] traits
//!    every sub-client talks through.
//! 3. **JSON-RPC**: `RpcClient` implementing the seam, with per-method retry
//!    policies (feature `rpc`).
//! 4. **High-level client**: `SaleClient` with nested sub-clients for the
//!    network guard, the chain reader, operations and purchases.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use token_sale_sdk::prelude::*;
//!
//! let client = SaleClient::connect_rpc("http://localhost:8545")?;
//! client.connect().await?;
//!
//! let panel = client.purchases().panel(PaymentMethod::Stable).await;
//! let outcome = client
//!     .purchases()
//!     .submit(PaymentMethod::Stable, "5", "")
//!     .await?;
//! ```
//!
//! ## Features
//!
//! | Feature | Default | Description |
//! | --- | --- | --- |
//! | `rpc` | yes | JSON-RPC transport over `reqwest`. |
//! | `testing` | yes | In-memory [`testing::MockChain`]. |

// ── Layer 1: Core ────────────────────────────────────────────────────────────

/// Fixed-point units, payment methods, referrers.
pub mod shared;

/// Domain modules (vertical slices): types, wire ABI, state, sub-clients.
pub mod domain;

/// Unified SDK error types.
pub mod error;

/// Chain ids, RPC URLs and deployed addresses.
pub mod network;

/// Immutable sale configuration.
pub mod config;

// ── Layer 2: Chain seam ──────────────────────────────────────────────────────

pub mod chain;

// ── Layer 3: JSON-RPC ────────────────────────────────────────────────────────

/// JSON-RPC client and retry policies.
pub mod rpc;

// ── Layer 4: High-Level Client ───────────────────────────────────────────────

/// `SaleClient`, the primary entry point.
pub mod client;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    // Shared
    pub use crate::shared::{PaymentMethod, Referrer};

    // Domain types
    pub use crate::domain::countdown::{Countdown, CountdownClock};
    pub use crate::domain::network::{ConnectionStatus, NetworkGuard, SwitchRequest};
    pub use crate::domain::operation::{
        OperationHandle, OperationKind, OperationRequest, OperationStatus, OperationTracker,
        PendingOperation,
    };
    pub use crate::domain::purchase::{
        PanelView, PurchaseEvent, PurchaseOrchestrator, PurchaseOutcome, PurchasePhase,
        PurchaseSession, TransitionError,
    };
    pub use crate::domain::quote::Quote;
    pub use crate::domain::sale::{Balances, ChainReader, ChainSnapshot, SaleField, SaleStatus};

    // Errors
    pub use crate::error::{InputError, SdkError};

    // Chain seam + config
    pub use crate::chain::{ChainRead, ChainWrite};
    pub use crate::config::SaleConfig;

    // Client
    pub use crate::client::{SaleClient, SaleClientBuilder};
    #[cfg(feature = "rpc")]
    pub use crate::rpc::RpcClient;
    pub use crate::rpc::{RetryConfig, RetryPolicy};
}
