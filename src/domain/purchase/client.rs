//! Purchase orchestrator: runs a session through approval and purchase.
//!
//! Each step is an explicit await: an approval's success is observed, then
//! the allowance is re-read, and only then is the gate checked again and a
//! purchase request built. Nothing is inferred from callback timing.

use std::sync::Arc;

use alloy_primitives::U256;
use async_lock::Mutex;
use futures_util::Stream;
use tokio::sync::broadcast;

use super::state::{PurchaseSession, SessionInput, TransitionError};
use super::{PanelView, PurchaseEvent, PurchaseOutcome, PurchasePhase};
use crate::chain::ChainWrite;
use crate::config::SaleConfig;
use crate::domain::allowance;
use crate::domain::network::NetworkGuard;
use crate::domain::operation::{OperationRequest, OperationTracker};
use crate::domain::sale::ChainReader;
use crate::error::SdkError;
use crate::network;
use crate::shared::{PaymentMethod, Referrer};

const EVENT_CAPACITY: usize = 256;

/// Drives one purchase session per payment method.
pub struct PurchaseOrchestrator<C> {
    reader: Arc<ChainReader<C>>,
    tracker: Arc<OperationTracker<C>>,
    guard: Arc<NetworkGuard<C>>,
    config: Arc<SaleConfig>,
    native: Arc<Mutex<PurchaseSession>>,
    stable: Arc<Mutex<PurchaseSession>>,
    events: broadcast::Sender<PurchaseEvent>,
}

impl<C> Clone for PurchaseOrchestrator<C> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
            tracker: self.tracker.clone(),
            guard: self.guard.clone(),
            config: self.config.clone(),
            native: self.native.clone(),
            stable: self.stable.clone(),
            events: self.events.clone(),
        }
    }
}

impl<C: ChainWrite> PurchaseOrchestrator<C> {
    pub fn new(
        reader: Arc<ChainReader<C>>,
        tracker: Arc<OperationTracker<C>>,
        guard: Arc<NetworkGuard<C>>,
        config: Arc<SaleConfig>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let native = PurchaseSession::new(PaymentMethod::Native, network::NATIVE_DECIMALS);
        let stable = PurchaseSession::new(PaymentMethod::Stable, config.token_decimals);
        Self {
            reader,
            tracker,
            guard,
            config,
            native: Arc::new(Mutex::new(native)),
            stable: Arc::new(Mutex::new(stable)),
            events,
        }
    }

    // ── Observation ──────────────────────────────────────────────────────

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<PurchaseEvent> {
        self.events.subscribe()
    }

    /// Stream of session events. Lagging consumers skip what they missed.
    pub fn events(&self) -> impl Stream<Item = PurchaseEvent> + Send + 'static {
        let mut rx = self.events.subscribe();
        async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Purchase event consumer lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    /// Current phase of a panel's session.
    pub async fn phase(&self, method: PaymentMethod) -> PurchasePhase {
        self.session(method).lock().await.phase()
    }

    /// A copy of a panel's session.
    pub async fn session_state(&self, method: PaymentMethod) -> PurchaseSession {
        self.session(method).lock().await.clone()
    }

    /// Derived panel state against the latest snapshot.
    pub async fn panel(&self, method: PaymentMethod) -> PanelView {
        let snapshot = self.reader.snapshot();
        let session = self.session(method).lock().await;
        PanelView::derive(&session, &snapshot)
    }

    // ── User actions ─────────────────────────────────────────────────────

    /// The user edited the amount field. Resets a terminal session to `Idle`.
    pub async fn edit_amount(&self, method: PaymentMethod, input: &str) -> Result<PurchasePhase, SdkError> {
        let mut session = self.session(method).lock().await;
        let before = session.phase();
        match session.edit_amount(input) {
            Ok(phase) => {
                if phase != before {
                    self.emit_phase(&session);
                }
                Ok(phase)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stop acting on a panel's in-flight result, e.g. the panel was closed.
    ///
    /// Operations already accepted by the network are not cancelled.
    pub async fn detach(&self, method: PaymentMethod) {
        let mut session = self.session(method).lock().await;
        if session.apply(SessionInput::Reset).is_ok() {
            tracing::info!(%method, "Purchase session detached");
            self.emit_phase(&session);
        }
    }

    /// Buy with `method`, approving first when the stable allowance is short.
    ///
    /// Returns [`PurchaseOutcome::AlreadyPending`] without dispatching anything
    /// when a run is in flight for this panel.
    pub async fn submit(
        &self,
        method: PaymentMethod,
        amount: &str,
        referrer: &str,
    ) -> Result<PurchaseOutcome, SdkError> {
        self.guard.ensure_ready()?;
        let referrer = Referrer::parse(referrer)?;
        let session = self.session(method);

        let (generation, raw_amount) = {
            let mut s = session.lock().await;
            match s.apply(SessionInput::Submit {
                amount: amount.to_string(),
                referrer,
            }) {
                Ok(_) => self.emit_phase(&s),
                Err(TransitionError::Busy(phase)) => {
                    tracing::debug!(%method, %phase, "Submit ignored, run in flight");
                    return Ok(PurchaseOutcome::AlreadyPending);
                }
                Err(TransitionError::Input(e)) => {
                    self.emit_phase(&s);
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
            let Some(raw) = s.amount() else {
                return Err(TransitionError::Invalid {
                    from: s.phase(),
                    input: "submit",
                }
                .into());
            };
            (s.generation(), raw)
        };

        tracing::info!(%method, %amount, %referrer, "Purchase started");
        self.run(session, method, generation, raw_amount, referrer)
            .await
    }

    // ── Pipeline ─────────────────────────────────────────────────────────

    async fn run(
        &self,
        session: &Mutex<PurchaseSession>,
        method: PaymentMethod,
        generation: u64,
        amount: U256,
        referrer: Referrer,
    ) -> Result<PurchaseOutcome, SdkError> {
        let mut approvals = 0u32;
        let mut granted = match method {
            PaymentMethod::Native => None,
            PaymentMethod::Stable => self.current_allowance().await,
        };

        // Validating
        loop {
            let needs_approval =
                method.requires_allowance() && allowance::needs_approval_scaled(amount, granted);

            if needs_approval && approvals >= self.config.max_approval_cycles {
                let reason = format!(
                    "allowance still below the requested amount after {} approval(s)",
                    approvals
                );
                return self.fail(session, generation, SdkError::Other(reason)).await;
            }

            if !self
                .advance(session, generation, SessionInput::Route { needs_approval })
                .await?
            {
                return Ok(PurchaseOutcome::Detached);
            }
            if !needs_approval {
                break;
            }

            // ApprovalPending: approve exactly the requested spend
            approvals += 1;
            let pending = match self.tracker.submit(OperationRequest::approve(amount)).await {
                Ok(pending) => pending,
                Err(e) => return self.fail(session, generation, e).await,
            };
            self.emit(PurchaseEvent::OperationSubmitted {
                method,
                kind: pending.kind(),
                handle: pending.handle(),
            });

            // 1. the approval's success is observed
            if let Err(e) = pending.confirmed().await {
                return self.fail(session, generation, e).await;
            }
            if !self
                .advance(session, generation, SessionInput::ApprovalConfirmed)
                .await?
            {
                return Ok(PurchaseOutcome::Detached);
            }

            // 2. then the allowance is re-read
            granted = match self.reader.refresh_allowance().await {
                Ok(value) => Some(value),
                Err(e) => return self.fail(session, generation, e).await,
            };

            // 3. only then is the gate checked again
            if !self
                .advance(session, generation, SessionInput::Revalidate)
                .await?
            {
                return Ok(PurchaseOutcome::Detached);
            }
        }

        // PurchasePending
        let request = match method {
            PaymentMethod::Native => OperationRequest::buy_with_native(amount, referrer),
            PaymentMethod::Stable => OperationRequest::buy_with_stable(amount, referrer),
        };
        let pending = match self.tracker.submit(request).await {
            Ok(pending) => pending,
            Err(e) => return self.fail(session, generation, e).await,
        };
        self.emit(PurchaseEvent::OperationSubmitted {
            method,
            kind: pending.kind(),
            handle: pending.handle(),
        });

        let handle = match pending.confirmed().await {
            Ok(handle) => handle,
            Err(e) => return self.fail(session, generation, e).await,
        };
        if !self
            .advance(session, generation, SessionInput::PurchaseConfirmed)
            .await?
        {
            return Ok(PurchaseOutcome::Detached);
        }

        // balances and sale totals moved
        if let Err(e) = self.reader.refresh().await {
            tracing::warn!(error = %e, "Post-purchase refresh failed");
        }

        Ok(PurchaseOutcome::Confirmed { handle, approvals })
    }

    /// A fresh allowance read. `None` (approval required) when it fails:
    /// the snapshot's last value may be stale.
    async fn current_allowance(&self) -> Option<U256> {
        match self.reader.refresh_allowance().await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(error = %e, "Allowance unknown, approving first");
                None
            }
        }
    }

    /// Apply `input` if the session still belongs to this run.
    ///
    /// Returns `false` once the session was reset under the run.
    async fn advance(
        &self,
        session: &Mutex<PurchaseSession>,
        generation: u64,
        input: SessionInput,
    ) -> Result<bool, SdkError> {
        let mut s = session.lock().await;
        if s.generation() != generation {
            tracing::info!(method = %s.method(), "Run detached, dropping result");
            return Ok(false);
        }
        s.apply(input)?;
        tracing::info!(method = %s.method(), phase = %s.phase(), "Purchase phase");
        self.emit_phase(&s);
        Ok(true)
    }

    /// Move the session to `Failed` with `error`'s message and surface it.
    async fn fail(
        &self,
        session: &Mutex<PurchaseSession>,
        generation: u64,
        error: SdkError,
    ) -> Result<PurchaseOutcome, SdkError> {
        let reason = error.to_string();
        if !self
            .advance(session, generation, SessionInput::Fail { reason })
            .await?
        {
            return Ok(PurchaseOutcome::Detached);
        }
        tracing::warn!(error = %error, "Purchase failed");
        Err(error)
    }

    fn session(&self, method: PaymentMethod) -> &Mutex<PurchaseSession> {
        match method {
            PaymentMethod::Native => &self.native,
            PaymentMethod::Stable => &self.stable,
        }
    }

    fn emit_phase(&self, session: &PurchaseSession) {
        self.emit(PurchaseEvent::PhaseChanged {
            method: session.method(),
            phase: session.phase(),
            detail: session.failure().map(str::to_string),
        });
    }

    fn emit(&self, event: PurchaseEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}
