//! Background ticker keyed off the snapshot's deadline.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{tick, Countdown};
use crate::domain::sale::ChainSnapshot;

const TICK: Duration = Duration::from_secs(1);

/// Publishes a [`Countdown`] once per second.
///
/// The value is `None` until the deadline has been read. A new deadline
/// restarts the ticker; once the countdown reaches zero it stops ticking
/// and waits for the deadline to change. Dropping the clock stops the task,
/// as does closing the snapshot source.
pub struct CountdownClock {
    state: watch::Receiver<Option<Countdown>>,
    handle: JoinHandle<()>,
}

impl CountdownClock {
    pub fn start(source: watch::Receiver<Arc<ChainSnapshot>>) -> Self {
        Self::start_with_clock(source, Utc::now)
    }

    /// Like [`start`](Self::start), reading wall-clock time from `now`.
    pub fn start_with_clock<F>(source: watch::Receiver<Arc<ChainSnapshot>>, now: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        let (tx, state) = watch::channel(None);
        let handle = tokio::spawn(run(source, tx, now));
        Self { state, handle }
    }

    /// The latest countdown, `None` while the deadline is unknown.
    pub fn current(&self) -> Option<Countdown> {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Countdown>> {
        self.state.clone()
    }

    /// Whether the ticker task is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for CountdownClock {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run<F>(
    mut source: watch::Receiver<Arc<ChainSnapshot>>,
    tx: watch::Sender<Option<Countdown>>,
    now: F,
) where
    F: Fn() -> DateTime<Utc>,
{
    let mut deadline = source.borrow_and_update().sale_deadline;

    loop {
        let Some(current) = deadline else {
            tx.send_replace(None);
            match next_deadline(&mut source, deadline).await {
                Some(next) => {
                    deadline = next;
                    continue;
                }
                None => return,
            }
        };

        tracing::debug!(deadline = %current, "Countdown started");
        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let countdown = tick(current, now());
                    tx.send_if_modified(|value| {
                        let changed = *value != Some(countdown);
                        *value = Some(countdown);
                        changed
                    });
                    if countdown.is_zero() {
                        tracing::debug!("Countdown reached zero");
                        break;
                    }
                }
                next = next_deadline(&mut source, deadline) => match next {
                    Some(next) => {
                        deadline = next;
                        break;
                    }
                    None => return,
                },
            }
        }

        // Expired: hold at zero until a different deadline arrives.
        if deadline == Some(current) {
            match next_deadline(&mut source, deadline).await {
                Some(next) => deadline = next,
                None => return,
            }
        }
    }
}

/// Wait for a snapshot whose deadline differs from `current`.
///
/// `None` once the source is closed.
async fn next_deadline(
    source: &mut watch::Receiver<Arc<ChainSnapshot>>,
    current: Option<DateTime<Utc>>,
) -> Option<Option<DateTime<Utc>>> {
    loop {
        source.changed().await.ok()?;
        let next = source.borrow_and_update().sale_deadline;
        if next != current {
            return Some(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sale::{FieldValue, SaleField};
    use alloy_primitives::U256;
    use tokio::time::Instant;

    /// Wall clock that advances with tokio's paused clock.
    fn paused_clock(base: DateTime<Utc>) -> impl Fn() -> DateTime<Utc> + Send + Sync + 'static {
        let start = Instant::now();
        move || base + chrono::Duration::from_std(start.elapsed()).unwrap()
    }

    fn with_deadline(deadline: DateTime<Utc>) -> Arc<ChainSnapshot> {
        Arc::new(ChainSnapshot::default().with(
            SaleField::EndTime,
            FieldValue::Uint(U256::from(deadline.timestamp() as u64)),
        ))
    }

    fn base() -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000, 0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_deadline_publishes_none() {
        let (_tx, rx) = watch::channel(Arc::new(ChainSnapshot::default()));
        let clock = CountdownClock::start_with_clock(rx, paused_clock(base()));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(clock.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_down_each_second() {
        let (_tx, rx) = watch::channel(with_deadline(base() + chrono::Duration::seconds(3661)));
        let clock = CountdownClock::start_with_clock(rx, paused_clock(base()));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(clock.current().map(|c| c.total_secs()), Some(3661));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(clock.current().map(|c| c.total_secs()), Some(3659));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stays_at_zero_after_deadline() {
        let (_tx, rx) = watch::channel(with_deadline(base() + chrono::Duration::seconds(2)));
        let clock = CountdownClock::start_with_clock(rx, paused_clock(base()));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(clock.current(), Some(Countdown::ZERO));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(clock.current(), Some(Countdown::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_on_new_deadline() {
        let (tx, rx) = watch::channel(with_deadline(base() + chrono::Duration::seconds(1)));
        let clock = CountdownClock::start_with_clock(rx, paused_clock(base()));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(clock.current(), Some(Countdown::ZERO));

        tx.send_replace(with_deadline(base() + chrono::Duration::seconds(3 + 120)));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(clock.current().map(|c| c.minutes), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_source_closes() {
        let (tx, rx) = watch::channel(with_deadline(base() + chrono::Duration::seconds(600)));
        let clock = CountdownClock::start_with_clock(rx, paused_clock(base()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(clock.is_running());

        drop(tx);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!clock.is_running());
    }
}
