//! Purchase domain: per-panel sessions, events, derived panel state.

pub mod client;
pub mod state;

use serde::Serialize;

use crate::domain::allowance;
use crate::domain::operation::{OperationHandle, OperationKind};
use crate::domain::quote::{self, Quote};
use crate::domain::sale::ChainSnapshot;
use crate::shared::PaymentMethod;

pub use client::PurchaseOrchestrator;
pub use state::{PurchaseSession, SessionInput, TransitionError};

// ─── PurchasePhase ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PurchasePhase {
    Idle,
    Validating,
    ApprovalPending,
    ApprovalConfirmed,
    PurchasePending,
    PurchaseConfirmed,
    Failed,
}

impl PurchasePhase {
    /// A run owns the session; submitting again is a no-op.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            PurchasePhase::Validating
                | PurchasePhase::ApprovalPending
                | PurchasePhase::ApprovalConfirmed
                | PurchasePhase::PurchasePending
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PurchasePhase::PurchaseConfirmed | PurchasePhase::Failed)
    }
}

impl std::fmt::Display for PurchasePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

// ─── PurchaseEvent ───────────────────────────────────────────────────────────

/// Published by the orchestrator on every state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PurchaseEvent {
    PhaseChanged {
        method: PaymentMethod,
        phase: PurchasePhase,
        /// Failure reason when `phase` is `Failed`.
        detail: Option<String>,
    },
    OperationSubmitted {
        method: PaymentMethod,
        kind: OperationKind,
        handle: OperationHandle,
    },
}

impl PurchaseEvent {
    pub fn method(&self) -> PaymentMethod {
        match self {
            PurchaseEvent::PhaseChanged { method, .. }
            | PurchaseEvent::OperationSubmitted { method, .. } => *method,
        }
    }

    /// One-line notification for the user, if this event warrants one.
    pub fn notification(&self) -> Option<String> {
        match self {
            PurchaseEvent::OperationSubmitted {
                kind: OperationKind::ApproveSpend,
                ..
            } => Some("Approval in progress…".to_string()),
            PurchaseEvent::OperationSubmitted { .. } => Some("Transaction sent…".to_string()),
            PurchaseEvent::PhaseChanged { phase, detail, .. } => match phase {
                PurchasePhase::ApprovalConfirmed => Some("Approval successful!".to_string()),
                PurchasePhase::PurchaseConfirmed => Some("Purchase successful!".to_string()),
                PurchasePhase::Failed => detail.clone(),
                _ => None,
            },
        }
    }
}

// ─── PurchaseOutcome ─────────────────────────────────────────────────────────

/// How a call to [`PurchaseOrchestrator::submit`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// The purchase confirmed, after `approvals` approval rounds.
    Confirmed {
        handle: OperationHandle,
        approvals: u32,
    },
    /// A run was already in flight; nothing was dispatched.
    AlreadyPending,
    /// The session was reset while the run was in flight; its result was
    /// not acted on.
    Detached,
}

// ─── PanelView ───────────────────────────────────────────────────────────────

/// Everything a purchase panel shows, derived from its session and the
/// latest snapshot. Recompute on every session event or snapshot change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelView {
    pub method: PaymentMethod,
    pub phase: PurchasePhase,
    pub amount_input: String,
    pub quote: Quote,
    /// Whether the panel offers "approve" instead of "buy".
    pub needs_approval: bool,
    pub can_submit: bool,
    pub failure: Option<String>,
}

impl PanelView {
    pub fn derive(session: &PurchaseSession, snapshot: &ChainSnapshot) -> Self {
        let method = session.method();
        let decimals = session.decimals();
        let amount = session.amount_input();
        let price = match method {
            PaymentMethod::Native => snapshot.unit_price_native,
            PaymentMethod::Stable => snapshot.unit_price_stable,
        };
        let needs_approval = method.requires_allowance()
            && allowance::needs_approval(amount, snapshot.stable_allowance, decimals);

        Self {
            method,
            phase: session.phase(),
            amount_input: amount.to_string(),
            quote: quote::quote(amount, price, decimals),
            needs_approval,
            can_submit: !session.phase().is_in_flight() && !amount.trim().is_empty(),
            failure: session.failure().map(str::to_string),
        }
    }
}
