//! High-level client: `SaleClient` with nested sub-client accessors.
//!
//! Each domain has its own sub-client in `domain/<name>/client.rs`.
//! This module keeps the builder, the shared configuration, and accessor
//! methods.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;

use crate::chain::{ChainRead, ChainWrite};
use crate::config::SaleConfig;
use crate::domain::countdown::CountdownClock;
use crate::domain::network::{ConnectionStatus, NetworkGuard};
use crate::domain::operation::OperationTracker;
use crate::domain::purchase::PurchaseOrchestrator;
use crate::domain::sale::{ChainReader, RefreshHandle};
use crate::error::SdkError;
use crate::rpc::retry::RetryConfig;

#[cfg(feature = "rpc")]
use crate::rpc::RpcClient;

/// Largest decimals a fixed-point amount can carry in a `U256`.
const MAX_DECIMALS: u8 = 77;

/// The primary entry point for the sale SDK.
///
/// Provides nested sub-client accessors:
/// `client.network()`, `client.reader()`, `client.purchases()`.
pub struct SaleClient<C> {
    chain: Arc<C>,
    config: Arc<SaleConfig>,
    guard: Arc<NetworkGuard<C>>,
    reader: Arc<ChainReader<C>>,
    tracker: Arc<OperationTracker<C>>,
    purchases: PurchaseOrchestrator<C>,
}

impl SaleClient<()> {
    pub fn builder() -> SaleClientBuilder {
        SaleClientBuilder::default()
    }
}

#[cfg(feature = "rpc")]
impl SaleClient<RpcClient> {
    /// Client over a JSON-RPC endpoint with the default configuration.
    pub fn connect_rpc(url: &str) -> Result<Self, SdkError> {
        SaleClientBuilder::default().build_rpc(url)
    }
}

impl<C: ChainWrite> SaleClient<C> {
    // ── Sub-client accessors ─────────────────────────────────────────────

    pub fn network(&self) -> &NetworkGuard<C> {
        &self.guard
    }

    pub fn reader(&self) -> &Arc<ChainReader<C>> {
        &self.reader
    }

    pub fn operations(&self) -> &OperationTracker<C> {
        &self.tracker
    }

    pub fn purchases(&self) -> &PurchaseOrchestrator<C> {
        &self.purchases
    }

    pub fn config(&self) -> &SaleConfig {
        &self.config
    }

    pub fn chain(&self) -> &Arc<C> {
        &self.chain
    }

    /// Start a countdown keyed off the reader's snapshots.
    ///
    /// Must be called from within a tokio runtime. The clock stops when the
    /// returned value is dropped.
    pub fn countdown(&self) -> CountdownClock {
        CountdownClock::start(self.reader.subscribe())
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Classify the wallet connection and, when ready, read the sale state.
    pub async fn connect(&self) -> Result<ConnectionStatus, SdkError> {
        let status = self.guard.refresh().await?;
        if status.is_ready() {
            self.reader.refresh().await?;
        }
        Ok(status)
    }

    /// The connected account, if the network is ready.
    pub fn account(&self) -> Option<Address> {
        self.guard.status().account()
    }

    /// Start the periodic snapshot refresh configured by
    /// [`SaleClientBuilder::refresh_interval`]. `None` when not configured.
    pub fn auto_refresh(&self) -> Option<RefreshHandle> {
        self.config
            .refresh_interval
            .map(|every| self.reader.spawn_refresh_loop(every))
    }
}

impl<C> Clone for SaleClient<C> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            config: self.config.clone(),
            guard: self.guard.clone(),
            reader: self.reader.clone(),
            tracker: self.tracker.clone(),
            purchases: self.purchases.clone(),
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════════
// Builder
// ═════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct SaleClientBuilder {
    config: SaleConfig,
}

impl SaleClientBuilder {
    /// Start from a complete configuration, e.g. one deserialized by the app.
    pub fn config(mut self, config: SaleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sale_contract(mut self, address: Address) -> Self {
        self.config.sale_contract = address;
        self
    }

    pub fn project_token(mut self, address: Address) -> Self {
        self.config.project_token = address;
        self
    }

    pub fn stable_token(mut self, address: Address) -> Self {
        self.config.stable_token = address;
        self
    }

    /// Networks the sale may be used on, production first.
    pub fn allowed_chain_ids(mut self, ids: Vec<u64>) -> Self {
        self.config.allowed_chain_ids = ids;
        self
    }

    pub fn token_decimals(mut self, decimals: u8) -> Self {
        self.config.token_decimals = decimals;
        self
    }

    pub fn read_retry(mut self, retry: RetryConfig) -> Self {
        self.config.read_retry = retry;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.config.receipt_poll_interval = interval;
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.operation_timeout = timeout;
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.config.refresh_interval = Some(interval);
        self
    }

    pub fn max_approval_cycles(mut self, cycles: u32) -> Self {
        self.config.max_approval_cycles = cycles;
        self
    }

    fn validate(&self) -> Result<(), SdkError> {
        let c = &self.config;
        if c.allowed_chain_ids.is_empty() {
            return Err(SdkError::Other("At least one allowed chain id is required".into()));
        }
        if c.token_decimals > MAX_DECIMALS {
            return Err(SdkError::Other(format!(
                "Token decimals {} exceed {}",
                c.token_decimals, MAX_DECIMALS
            )));
        }
        if c.max_approval_cycles == 0 {
            return Err(SdkError::Other("max_approval_cycles must be at least 1".into()));
        }
        if c.operation_timeout.is_zero() || c.receipt_poll_interval.is_zero() {
            return Err(SdkError::Other("Operation timeouts must be non-zero".into()));
        }
        Ok(())
    }

    pub fn build<C: ChainRead + ChainWrite>(self, chain: C) -> Result<SaleClient<C>, SdkError> {
        self.validate()?;

        let chain = Arc::new(chain);
        let config = Arc::new(self.config);
        let guard = Arc::new(NetworkGuard::new(Arc::clone(&chain), Arc::clone(&config)));
        let reader = Arc::new(ChainReader::new(
            Arc::clone(&chain),
            Arc::clone(&guard),
            Arc::clone(&config),
        ));
        let tracker = Arc::new(OperationTracker::new(
            Arc::clone(&chain),
            Arc::clone(&guard),
            Arc::clone(&config),
        ));
        let purchases = PurchaseOrchestrator::new(
            Arc::clone(&reader),
            Arc::clone(&tracker),
            Arc::clone(&guard),
            Arc::clone(&config),
        );

        Ok(SaleClient {
            chain,
            config,
            guard,
            reader,
            tracker,
            purchases,
        })
    }

    #[cfg(feature = "rpc")]
    pub fn build_rpc(self, url: &str) -> Result<SaleClient<RpcClient>, SdkError> {
        let chain = RpcClient::new(url)?;
        self.build(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChain;

    #[test]
    fn test_build_rejects_empty_chain_list() {
        let result = SaleClient::builder()
            .allowed_chain_ids(Vec::new())
            .build(MockChain::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_build_rejects_zero_approval_cycles() {
        let result = SaleClient::builder()
            .max_approval_cycles(0)
            .build(MockChain::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_overrides_defaults() {
        let client = SaleClient::builder()
            .allowed_chain_ids(vec![97])
            .operation_timeout(Duration::from_secs(30))
            .build(MockChain::default())
            .unwrap();
        assert_eq!(client.config().allowed_chain_ids, vec![97]);
        assert_eq!(client.config().operation_timeout, Duration::from_secs(30));
        assert_eq!(client.config().max_approval_cycles, 3);
    }

    #[tokio::test]
    async fn test_connect_reads_snapshot_when_ready() {
        let client = SaleClient::builder().build(MockChain::default()).unwrap();
        let status = client.connect().await.unwrap();
        assert!(status.is_ready());
        assert!(client.reader().snapshot().unit_price_native.is_some());
    }

    #[tokio::test]
    async fn test_connect_skips_reads_on_wrong_network() {
        let chain = MockChain::default();
        chain.set_chain_id(1);
        let client = SaleClient::builder().build(chain.clone()).unwrap();

        let status = client.connect().await.unwrap();
        assert_eq!(status, ConnectionStatus::WrongNetwork { chain_id: 1 });
        assert!(client.reader().snapshot().unit_price_native.is_none());
        assert!(chain.events().is_empty());
    }
}
