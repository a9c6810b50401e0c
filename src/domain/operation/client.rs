//! Operation tracker: submit once, then watch for finality.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use super::{OperationHandle, OperationKind, OperationRequest, OperationStatus};
use crate::chain::ChainWrite;
use crate::config::SaleConfig;
use crate::domain::network::NetworkGuard;
use crate::error::{InputError, SdkError, SubmissionError};

/// Submits mutating operations and resolves each to a terminal status.
///
/// Nothing is ever resent: a retry is a fresh, user-initiated submission.
pub struct OperationTracker<C> {
    chain: Arc<C>,
    guard: Arc<NetworkGuard<C>>,
    config: Arc<SaleConfig>,
}

impl<C: ChainWrite> OperationTracker<C> {
    pub fn new(chain: Arc<C>, guard: Arc<NetworkGuard<C>>, config: Arc<SaleConfig>) -> Self {
        Self {
            chain,
            guard,
            config,
        }
    }

    /// Hand `request` to the wallet.
    ///
    /// Fails with [`SdkError::Submission`] when the request is refused before
    /// the network accepts it. Once accepted, the returned
    /// [`PendingOperation`] resolves exactly once.
    pub async fn submit(&self, request: OperationRequest) -> Result<PendingOperation, SdkError> {
        if request.amount.is_zero() {
            return Err(InputError::NonPositiveAmount("0".to_string()).into());
        }
        let (_, account) = self.guard.ensure_ready()?;

        let tx = request.to_transaction(account, &self.config);
        let hash = self
            .chain
            .send_transaction(tx)
            .await
            .map_err(SubmissionError::from)?;
        let handle = OperationHandle::new(hash);

        tracing::info!(kind = %request.kind, tx = %handle, "Operation submitted");

        let (tx, rx) = oneshot::channel();
        tokio::spawn(watch_finality(
            Arc::clone(&self.chain),
            handle,
            request.kind,
            self.config.receipt_poll_interval,
            self.config.operation_timeout,
            tx,
        ));

        Ok(PendingOperation {
            handle,
            kind: request.kind,
            timeout: self.config.operation_timeout,
            completion: rx,
        })
    }
}

/// Poll for a receipt until one appears or `timeout` elapses.
///
/// Receipt lookups that fail are treated as "not yet known" and polled again.
async fn watch_finality<C: ChainWrite>(
    chain: Arc<C>,
    handle: OperationHandle,
    kind: OperationKind,
    poll_interval: Duration,
    timeout: Duration,
    completion: oneshot::Sender<OperationStatus>,
) {
    let poll = async {
        loop {
            match chain.receipt(handle.tx_hash()).await {
                Ok(Some(receipt)) if receipt.success => return OperationStatus::Confirmed,
                Ok(Some(_)) => return OperationStatus::Reverted,
                Ok(None) => {}
                Err(e) => tracing::debug!(tx = %handle, error = %e, "Receipt lookup failed"),
            }
            tokio::time::sleep(poll_interval).await;
        }
    };

    let status = tokio::time::timeout(timeout, poll)
        .await
        .unwrap_or(OperationStatus::TimedOut);

    match status {
        OperationStatus::Confirmed => tracing::info!(%kind, tx = %handle, "Operation confirmed"),
        _ => tracing::warn!(%kind, tx = %handle, %status, "Operation did not confirm"),
    }

    if completion.send(status).is_err() {
        tracing::debug!(tx = %handle, "Nobody waiting for operation result");
    }
}

/// An accepted operation awaiting its terminal status.
///
/// Dropping it detaches: the operation continues on chain, nobody acts on
/// its result.
#[derive(Debug)]
pub struct PendingOperation {
    handle: OperationHandle,
    kind: OperationKind,
    timeout: Duration,
    completion: oneshot::Receiver<OperationStatus>,
}

impl PendingOperation {
    pub fn handle(&self) -> OperationHandle {
        self.handle
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Wait for the terminal status.
    pub async fn wait(self) -> OperationStatus {
        // The watcher only goes away without sending if its task was torn
        // down, in which case the outcome is as unknown as a timeout.
        self.completion.await.unwrap_or(OperationStatus::TimedOut)
    }

    /// Wait, mapping anything but `Confirmed` to [`SdkError::OperationFailure`].
    pub async fn confirmed(self) -> Result<OperationHandle, SdkError> {
        let (handle, kind, timeout) = (self.handle, self.kind, self.timeout);
        match self.wait().await {
            OperationStatus::Confirmed => Ok(handle),
            status => Err(SdkError::OperationFailure {
                kind,
                status,
                reason: failure_reason(handle, status, timeout),
            }),
        }
    }
}

/// User-facing explanation for a failed operation.
pub fn failure_reason(handle: OperationHandle, status: OperationStatus, timeout: Duration) -> String {
    match status {
        OperationStatus::Confirmed => String::new(),
        OperationStatus::Reverted => format!("transaction {} reverted on chain", handle),
        OperationStatus::TimedOut => format!(
            "transaction {} not final after {}s; it may still execute",
            handle,
            timeout.as_secs()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Referrer;
    use crate::testing::{MockChain, SendOutcome, BUYER};
    use alloy_primitives::U256;
    use tokio_test::{assert_err, assert_ok};

    async fn tracker(chain: &MockChain) -> OperationTracker<MockChain> {
        let config = Arc::new(SaleConfig {
            receipt_poll_interval: Duration::from_millis(5),
            operation_timeout: Duration::from_secs(1),
            ..SaleConfig::default()
        });
        let chain = Arc::new(chain.clone());
        let guard = Arc::new(NetworkGuard::new(Arc::clone(&chain), Arc::clone(&config)));
        assert_ok!(guard.refresh().await);
        OperationTracker::new(chain, guard, config)
    }

    #[tokio::test]
    async fn test_confirmed_operation_resolves_once() {
        let chain = MockChain::default();
        let tracker = tracker(&chain).await;

        let pending = assert_ok!(tracker.submit(OperationRequest::approve(U256::from(5))).await);
        assert_eq!(pending.kind(), OperationKind::ApproveSpend);
        let handle = pending.handle();
        assert_eq!(assert_ok!(pending.confirmed().await), handle);
        assert_eq!(chain.sent()[0].from, BUYER);
    }

    #[tokio::test]
    async fn test_zero_amount_is_rejected_before_sending() {
        let chain = MockChain::default();
        let tracker = tracker(&chain).await;

        let result = tracker
            .submit(OperationRequest::buy_with_native(U256::ZERO, Referrer::NONE))
            .await;
        assert!(matches!(result, Err(SdkError::Input(_))));
        assert!(chain.sent().is_empty());
    }

    #[tokio::test]
    async fn test_reverted_status() {
        let chain = MockChain::default();
        chain.push_outcome(SendOutcome::Revert);
        let tracker = tracker(&chain).await;

        let pending = assert_ok!(tracker.submit(OperationRequest::approve(U256::from(1))).await);
        assert_eq!(pending.wait().await, OperationStatus::Reverted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmined_operation_times_out() {
        let chain = MockChain::default();
        chain.push_outcome(SendOutcome::Pending);
        let tracker = tracker(&chain).await;

        let pending = assert_ok!(tracker.submit(OperationRequest::approve(U256::from(1))).await);
        let err = assert_err!(pending.confirmed().await);
        match err {
            SdkError::OperationFailure { status, reason, .. } => {
                assert_eq!(status, OperationStatus::TimedOut);
                assert!(reason.contains("may still execute"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_not_ready_blocks_submission() {
        let chain = MockChain::default();
        let tracker = tracker(&chain).await;
        tracker.guard.disconnect();

        let result = tracker.submit(OperationRequest::approve(U256::from(1))).await;
        assert!(matches!(result, Err(SdkError::NotConnected)));
        assert!(chain.sent().is_empty());
    }
}
