//! Retry policies for chain requests.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RpcError;

/// Retry policy for a chain request.
#[derive(Debug, Clone, Default)]
pub enum RetryPolicy {
    /// No retries. Used for state-mutating requests, which are never resent.
    #[default]
    None,
    /// Retry on transport failures, 502/503/504 and transient node errors,
    /// with backoff on 429. Default for view-only requests.
    Idempotent,
    /// User-provided retry logic.
    Custom(RetryConfig),
}

impl RetryPolicy {
    /// Resolve to a concrete config, `None` meaning a single attempt.
    pub fn config(&self) -> Option<RetryConfig> {
        match self {
            RetryPolicy::None => None,
            RetryPolicy::Idempotent => Some(RetryConfig::idempotent()),
            RetryPolicy::Custom(c) => Some(c.clone()),
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not counting the initial request).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,
    /// Whether to add jitter to the delay.
    pub jitter: bool,
    /// HTTP status codes that trigger a retry.
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: true,
            retryable_statuses: vec![502, 503, 504],
        }
    }
}

impl RetryConfig {
    /// The default config for view-only requests.
    pub fn idempotent() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: true,
            retryable_statuses: vec![429, 502, 503, 504],
        }
    }

    /// Calculate delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);

        let final_ms = if self.jitter {
            let jitter_range = capped * 0.25;
            let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Duration::from_millis(final_ms as u64)
    }

    fn should_retry(&self, error: &RpcError) -> bool {
        match error {
            RpcError::ServerError { status, .. } => self.retryable_statuses.contains(status),
            other => other.is_transient(),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// retry budget in `config` is spent.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut op: F,
) -> Result<T, RpcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if let RpcError::RateLimited {
                    retry_after_ms: Some(ms),
                } = &e
                {
                    futures_timer::Delay::new(Duration::from_millis(*ms)).await;
                }

                if config.should_retry(&e) && attempt < config.max_retries {
                    let delay = config.delay_for_attempt(attempt);
                    tracing::debug!(
                        attempt = attempt + 1,
                        max = config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying {}: {}",
                        label,
                        e
                    );
                    futures_timer::Delay::new(delay).await;
                    last_error = Some(e);
                } else if attempt > 0 && config.should_retry(&e) {
                    last_error = Some(e);
                } else {
                    return Err(e);
                }
            }
        }
    }

    Err(RpcError::MaxRetriesExceeded {
        attempts: config.max_retries + 1,
        last_error: last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_factor: 1.0,
            jitter: false,
            retryable_statuses: vec![502, 503, 504],
        }
    }

    #[test]
    fn test_retry_policy_default_is_none() {
        assert!(matches!(RetryPolicy::default(), RetryPolicy::None));
        assert!(RetryPolicy::None.config().is_none());
    }

    #[test]
    fn test_retry_config_idempotent_includes_429() {
        let config = RetryConfig::idempotent();
        assert!(config.retryable_statuses.contains(&429));
        assert!(config.retryable_statuses.contains(&502));
        assert!(config.retryable_statuses.contains(&503));
        assert!(config.retryable_statuses.contains(&504));
    }

    #[test]
    fn test_retry_config_delay_for_attempt_no_jitter() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(100),
            jitter: false,
            ..RetryConfig::default()
        };
        assert_eq!(config.delay_for_attempt(0).as_millis(), 100);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 200);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 400);
    }

    #[test]
    fn test_retry_config_delay_caps_at_max() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(2000),
            backoff_factor: 10.0,
            jitter: false,
            retryable_statuses: vec![],
        };
        assert_eq!(config.delay_for_attempt(3).as_millis(), 2000);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_config(3), "endTime", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(RpcError::Timeout)
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_config(3), "paused", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(RpcError::JsonRpc {
                    code: 3,
                    message: "execution reverted".into(),
                })
            }
        })
        .await;
        assert!(matches!(result, Err(RpcError::JsonRpc { code: 3, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&fast_config(2), "totalTokensSold", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RpcError::Timeout) }
        })
        .await;
        assert!(matches!(
            result,
            Err(RpcError::MaxRetriesExceeded { attempts: 3, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
