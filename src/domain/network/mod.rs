//! Network guard: is the wallet connected, and to an allowed network?
//!
//! Every read and write in the SDK is conditioned on [`ConnectionStatus::Ready`].

use std::sync::Arc;

use alloy_primitives::Address;
use serde::Serialize;
use tokio::sync::watch;

use crate::chain::{ChainRead, ChainWrite};
use crate::config::SaleConfig;
use crate::error::SdkError;

/// Classification of the current wallet connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Unconnected,
    /// Connected, but to a network outside the allowed set.
    WrongNetwork { chain_id: u64 },
    Ready { chain_id: u64, account: Address },
}

impl ConnectionStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionStatus::Ready { .. })
    }

    pub fn account(&self) -> Option<Address> {
        match self {
            ConnectionStatus::Ready { account, .. } => Some(*account),
            _ => None,
        }
    }
}

/// Classify a connection from the wallet's accounts and chain id.
pub fn classify(accounts: &[Address], chain_id: u64, allowed: &[u64]) -> ConnectionStatus {
    match accounts.first() {
        None => ConnectionStatus::Unconnected,
        Some(_) if !allowed.contains(&chain_id) => ConnectionStatus::WrongNetwork { chain_id },
        Some(account) => ConnectionStatus::Ready {
            chain_id,
            account: *account,
        },
    }
}

/// The one recovery action offered on a wrong network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SwitchRequest {
    pub chain_id: u64,
}

/// Tracks the connection status and gates everything else on it.
pub struct NetworkGuard<C> {
    chain: Arc<C>,
    config: Arc<SaleConfig>,
    status: watch::Sender<ConnectionStatus>,
}

impl<C> NetworkGuard<C> {
    pub fn new(chain: Arc<C>, config: Arc<SaleConfig>) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Unconnected);
        Self {
            chain,
            config,
            status,
        }
    }

    /// Last known status.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// The chain id and account to act with, or the error blocking all
    /// reads and writes.
    pub fn ensure_ready(&self) -> Result<(u64, Address), SdkError> {
        match self.status() {
            ConnectionStatus::Ready { chain_id, account } => Ok((chain_id, account)),
            ConnectionStatus::WrongNetwork { chain_id } => Err(SdkError::WrongNetwork { chain_id }),
            ConnectionStatus::Unconnected => Err(SdkError::NotConnected),
        }
    }

    /// The recovery action, only offered while on a wrong network.
    pub fn switch_request(&self) -> Option<SwitchRequest> {
        match self.status() {
            ConnectionStatus::WrongNetwork { .. } => Some(SwitchRequest {
                chain_id: self.config.production_chain_id(),
            }),
            _ => None,
        }
    }

    /// Mark the wallet as disconnected.
    pub fn disconnect(&self) {
        self.publish(ConnectionStatus::Unconnected);
    }

    fn publish(&self, next: ConnectionStatus) {
        let previous = self.status.send_replace(next);
        if previous != next {
            tracing::info!(?previous, ?next, "Connection status changed");
        }
    }
}

impl<C: ChainRead> NetworkGuard<C> {
    /// Query the wallet and reclassify the connection.
    pub async fn refresh(&self) -> Result<ConnectionStatus, SdkError> {
        let accounts = self.chain.accounts().await?;
        let status = if accounts.is_empty() {
            ConnectionStatus::Unconnected
        } else {
            let chain_id = self.chain.chain_id().await?;
            classify(&accounts, chain_id, &self.config.allowed_chain_ids)
        };
        self.publish(status);
        Ok(status)
    }
}

impl<C: ChainWrite> NetworkGuard<C> {
    /// Ask the wallet to switch to the production network, then reclassify.
    pub async fn switch_network(&self) -> Result<ConnectionStatus, SdkError> {
        let request = self
            .switch_request()
            .ok_or(SdkError::NoSwitchNeeded)?;
        tracing::info!(chain_id = request.chain_id, "Requesting network switch");
        self.chain.switch_chain(request.chain_id).await?;
        self.refresh().await
    }
}
