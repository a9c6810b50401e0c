//! Chain reader: view-only queries, the published snapshot, refresh loop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;
use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::wire::{IERC20, ITokenSale};
use super::{ChainSnapshot, FieldValue, SaleField};
use crate::chain::ChainRead;
use crate::config::SaleConfig;
use crate::domain::network::NetworkGuard;
use crate::error::{ReadError, RpcError, SdkError};
use crate::rpc::retry::with_retry;

/// Reads sale state and publishes it as immutable [`ChainSnapshot`]s.
///
/// A failed read never blanks a field: the previous value stays in place and
/// the field is marked stale until the next successful read.
///
/// Every batch of reads takes a sequence number when it is issued. A field
/// only accepts results newer than the last one applied to it, so a slow
/// refresh never overwrites a value read after it started.
pub struct ChainReader<C> {
    chain: Arc<C>,
    guard: Arc<NetworkGuard<C>>,
    config: Arc<SaleConfig>,
    snapshot: watch::Sender<Arc<ChainSnapshot>>,
    next_seq: AtomicU64,
    /// Sequence of the last result applied per field.
    applied: Mutex<BTreeMap<SaleField, u64>>,
}

impl<C: ChainRead> ChainReader<C> {
    pub fn new(chain: Arc<C>, guard: Arc<NetworkGuard<C>>, config: Arc<SaleConfig>) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(ChainSnapshot::default()));
        Self {
            chain,
            guard,
            config,
            snapshot,
            next_seq: AtomicU64::new(1),
            applied: Mutex::new(BTreeMap::new()),
        }
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<ChainSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Watch snapshot replacements.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ChainSnapshot>> {
        self.snapshot.subscribe()
    }

    /// Read one field, retrying transient failures.
    ///
    /// Does not touch the published snapshot.
    pub async fn read(&self, field: SaleField) -> Result<FieldValue, SdkError> {
        let (_, account) = self.guard.ensure_ready()?;
        Ok(self.read_for(field, account).await?)
    }

    /// Read every field and publish the result.
    ///
    /// Fields that fail keep their last good value and are marked stale.
    pub async fn refresh(&self) -> Result<Arc<ChainSnapshot>, SdkError> {
        let (_, account) = self.guard.ensure_ready()?;
        let seq = self.issue();

        let results = join_all(
            SaleField::ALL
                .iter()
                .map(|field| async move { (*field, self.read_for(*field, account).await) }),
        )
        .await;

        let failed = self.apply(seq, &results);
        tracing::debug!(seq, failed, "Snapshot refreshed");
        Ok(self.snapshot())
    }

    /// Re-read the stable allowance the sale contract holds for the account.
    ///
    /// On success the value is published and returned. On failure the
    /// snapshot keeps its last value and the error is returned, since the
    /// caller is deciding on a fresh value.
    pub async fn refresh_allowance(&self) -> Result<U256, SdkError> {
        let (_, account) = self.guard.ensure_ready()?;
        let field = SaleField::StableAllowance;
        let seq = self.issue();

        let results = [(field, self.read_for(field, account).await)];
        self.apply(seq, &results);

        let [(_, result)] = results;
        match result {
            Ok(value) => value.as_uint().ok_or_else(|| {
                SdkError::Other(format!("{} returned a non-integer value", field))
            }),
            Err(e) => {
                tracing::warn!(error = %e, "Allowance re-read failed");
                Err(e.into())
            }
        }
    }

    fn issue(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Merge the results of read batch `seq` into a new snapshot.
    ///
    /// Fields that already hold a newer result are left alone. Returns the
    /// number of failed reads that were applied.
    fn apply(&self, seq: u64, results: &[(SaleField, Result<FieldValue, ReadError>)]) -> usize {
        let mut failed = 0usize;
        self.snapshot.send_modify(|current| {
            let mut applied = self.applied.lock().unwrap_or_else(|e| e.into_inner());
            let mut next = (**current).clone();
            for (field, result) in results {
                let last = applied.entry(*field).or_default();
                if *last > seq {
                    tracing::debug!(%field, seq, newer = *last, "Dropping superseded read");
                    continue;
                }
                *last = seq;
                next = match result {
                    Ok(value) => next.with(*field, *value),
                    Err(e) => {
                        failed += 1;
                        tracing::warn!(%field, error = %e, "Read failed, keeping last value");
                        next.with_stale(*field)
                    }
                };
            }
            next.updated_at = Some(Utc::now());
            *current = Arc::new(next);
        });
        failed
    }

    async fn read_for(&self, field: SaleField, account: Address) -> Result<FieldValue, ReadError> {
        let timeout = self.config.read_timeout;
        with_retry(&self.config.read_retry, field.as_str(), || async move {
            tokio::time::timeout(timeout, self.fetch_once(field, account))
                .await
                .unwrap_or(Err(RpcError::Timeout))
        })
        .await
        .map_err(|source| ReadError {
            field: field.to_string(),
            source,
        })
    }

    async fn fetch_once(&self, field: SaleField, account: Address) -> Result<FieldValue, RpcError> {
        let sale = self.config.sale_contract;
        match field {
            SaleField::NativeBalance => Ok(FieldValue::Uint(self.chain.balance(account).await?)),
            SaleField::Paused => {
                let out = self.view(sale, ITokenSale::pausedCall {}).await?;
                Ok(FieldValue::Bool(out._0))
            }
            SaleField::EndTime => {
                let out = self.view(sale, ITokenSale::endTimeCall {}).await?;
                Ok(FieldValue::Uint(out._0))
            }
            SaleField::UnitPriceNative => {
                let out = self.view(sale, ITokenSale::tokenPriceBNBCall {}).await?;
                Ok(FieldValue::Uint(out._0))
            }
            SaleField::UnitPriceStable => {
                let out = self.view(sale, ITokenSale::tokenPriceUSDTCall {}).await?;
                Ok(FieldValue::Uint(out._0))
            }
            SaleField::TotalSold => {
                let out = self.view(sale, ITokenSale::totalTokensSoldCall {}).await?;
                Ok(FieldValue::Uint(out._0))
            }
            SaleField::StableAllowance => {
                let call = IERC20::allowanceCall {
                    owner: account,
                    spender: sale,
                };
                let out = self.view(self.config.stable_token, call).await?;
                Ok(FieldValue::Uint(out._0))
            }
            SaleField::StableBalance => {
                let call = IERC20::balanceOfCall { owner: account };
                let out = self.view(self.config.stable_token, call).await?;
                Ok(FieldValue::Uint(out._0))
            }
            SaleField::ProjectTokenBalance => {
                let call = IERC20::balanceOfCall { owner: account };
                let out = self.view(self.config.project_token, call).await?;
                Ok(FieldValue::Uint(out._0))
            }
        }
    }

    async fn view<T: SolCall>(&self, to: Address, call: T) -> Result<T::Return, RpcError> {
        let raw = self
            .chain
            .call(to, Bytes::from(call.abi_encode()))
            .await?;
        T::abi_decode_returns(&raw, true).map_err(|e| RpcError::InvalidResponse(e.to_string()))
    }
}

impl<C: ChainRead> ChainReader<C> {
    /// Refresh the snapshot every `every` until the returned handle is dropped.
    pub fn spawn_refresh_loop(self: &Arc<Self>, every: Duration) -> RefreshHandle {
        let reader = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = reader.refresh().await {
                    tracing::debug!(error = %e, "Scheduled refresh skipped");
                }
            }
        });
        RefreshHandle { handle }
    }
}

/// Handle to a running refresh loop. Dropping it stops the loop.
pub struct RefreshHandle {
    handle: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stop the loop now.
    pub fn cancel(self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::retry::RetryConfig;
    use crate::shared::units::pow10;
    use crate::testing::MockChain;
    use tokio::sync::{oneshot, Notify};
    use tokio_test::{assert_err, assert_ok};

    fn config() -> SaleConfig {
        SaleConfig {
            read_retry: RetryConfig {
                max_retries: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                backoff_factor: 2.0,
                jitter: false,
                retryable_statuses: vec![503],
            },
            read_timeout: Duration::from_millis(50),
            ..SaleConfig::default()
        }
    }

    async fn reader<C: ChainRead>(chain: Arc<C>) -> Arc<ChainReader<C>> {
        let config = Arc::new(config());
        let guard = Arc::new(NetworkGuard::new(Arc::clone(&chain), Arc::clone(&config)));
        assert_ok!(guard.refresh().await);
        Arc::new(ChainReader::new(chain, guard, config))
    }

    /// Lets one allowance read observe the chain, then holds its result
    /// until released.
    struct HeldChain {
        inner: MockChain,
        hold: std::sync::Mutex<Option<oneshot::Receiver<()>>>,
        parked: Notify,
    }

    impl HeldChain {
        fn new(inner: MockChain) -> Self {
            Self {
                inner,
                hold: std::sync::Mutex::new(None),
                parked: Notify::new(),
            }
        }

        fn hold_next_allowance(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            *self.hold.lock().unwrap() = Some(rx);
            tx
        }
    }

    impl ChainRead for HeldChain {
        async fn chain_id(&self) -> Result<u64, RpcError> {
            self.inner.chain_id().await
        }

        async fn accounts(&self) -> Result<Vec<Address>, RpcError> {
            self.inner.accounts().await
        }

        async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, RpcError> {
            let is_allowance = data.starts_with(&IERC20::allowanceCall::SELECTOR);
            let result = self.inner.call(to, data).await;
            let held = if is_allowance {
                self.hold.lock().unwrap().take()
            } else {
                None
            };
            if let Some(release) = held {
                self.parked.notify_one();
                let _ = release.await;
            }
            result
        }

        async fn balance(&self, owner: Address) -> Result<U256, RpcError> {
            self.inner.balance(owner).await
        }
    }

    #[tokio::test]
    async fn test_slow_refresh_does_not_overwrite_newer_allowance() {
        let mock = MockChain::default();
        mock.set_allowance(U256::from(5) * pow10(18));
        let chain = Arc::new(HeldChain::new(mock.clone()));
        let reader = reader(Arc::clone(&chain)).await;

        let release = chain.hold_next_allowance();
        let scheduled = tokio::spawn({
            let reader = Arc::clone(&reader);
            async move { reader.refresh().await }
        });
        chain.parked.notified().await;

        // revoked while the scheduled refresh still holds the old value
        mock.set_allowance(U256::ZERO);
        assert_eq!(assert_ok!(reader.refresh_allowance().await), U256::ZERO);

        release.send(()).unwrap();
        assert_ok!(scheduled.await.unwrap());

        let snapshot = reader.snapshot();
        assert_eq!(snapshot.stable_allowance, Some(U256::ZERO));
        assert!(!snapshot.is_stale(SaleField::StableAllowance));
        // the rest of the slow refresh still lands
        assert_eq!(snapshot.unit_price_native, Some(pow10(16)));
    }

    #[tokio::test]
    async fn test_transient_failures_recover_within_budget() {
        let chain = MockChain::default();
        let selector = ITokenSale::tokenPriceBNBCall::SELECTOR;
        chain.fail_view_times(selector, 2);
        let reader = reader(Arc::new(chain.clone())).await;

        let snapshot = assert_ok!(reader.refresh().await);
        assert_eq!(snapshot.unit_price_native, Some(pow10(16)));
        assert!(snapshot.stale.is_empty());
        assert_eq!(chain.view_count(selector), 3);
    }

    #[tokio::test]
    async fn test_exhausted_budget_surfaces_read_error() {
        let chain = MockChain::default();
        let selector = ITokenSale::pausedCall::SELECTOR;
        chain.fail_view_times(selector, 10);
        let reader = reader(Arc::new(chain.clone())).await;

        let err = assert_err!(reader.read(SaleField::Paused).await);
        match err {
            SdkError::Read(ReadError { field, source }) => {
                assert_eq!(field, "paused");
                assert!(matches!(source, RpcError::MaxRetriesExceeded { attempts: 3, .. }));
            }
            other => panic!("expected read error, got {other:?}"),
        }
        assert_eq!(chain.view_count(selector), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_read_times_out_per_attempt() {
        let chain = MockChain::default();
        let selector = ITokenSale::endTimeCall::SELECTOR;
        let reader = reader(Arc::new(chain.clone())).await;
        assert_ok!(reader.refresh().await);
        let deadline = reader.snapshot().sale_deadline;
        assert!(deadline.is_some());

        chain.stall_view(selector);
        let started = tokio::time::Instant::now();
        let err = assert_err!(reader.read(SaleField::EndTime).await);
        match err {
            SdkError::Read(ReadError {
                source: RpcError::MaxRetriesExceeded { attempts, last_error },
                ..
            }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last_error, RpcError::Timeout.to_string());
            }
            other => panic!("expected timed out read, got {other:?}"),
        }
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert_eq!(chain.view_count(selector), 4);

        // a stalled field keeps its value and goes stale
        let snapshot = assert_ok!(reader.refresh().await);
        assert_eq!(snapshot.sale_deadline, deadline);
        assert!(snapshot.is_stale(SaleField::EndTime));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_refresh_loop() {
        let chain = MockChain::default();
        let reader = reader(Arc::new(chain.clone())).await;
        let selector = ITokenSale::totalTokensSoldCall::SELECTOR;

        let handle = reader.spawn_refresh_loop(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(handle.is_running());
        let reads = chain.view_count(selector);
        assert!(reads >= 2, "reads: {reads}");

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(chain.view_count(selector), reads);
    }
}
