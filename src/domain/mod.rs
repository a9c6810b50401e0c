//! Domain modules organized as vertical slices.
//!
//! Pure decision logic lives in `mod.rs` (quote, allowance gate, session
//! state machine, countdown math). Modules that talk to the chain add a
//! `client.rs` with the sub-client, and `wire.rs` holds the contract ABI.

pub mod allowance;
pub mod countdown;
pub mod network;
pub mod operation;
pub mod purchase;
pub mod quote;
pub mod sale;
