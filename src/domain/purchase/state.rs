//! Purchase session state machine: app-owned, no I/O.
//!
//! ```text
//! Idle → Validating → (ApprovalPending → ApprovalConfirmed → Validating)* →
//!        PurchasePending → PurchaseConfirmed
//! ApprovalPending | PurchasePending | Validating → Failed
//! any → Idle (reset)
//! ```
//!
//! The orchestrator drives a session by feeding it [`SessionInput`]s; the
//! session only decides whether a transition is legal and what it keeps.

use std::fmt;

use alloy_primitives::U256;

use super::PurchasePhase;
use crate::error::InputError;
use crate::shared::{units, PaymentMethod, Referrer};

/// Events that move a session between phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    /// The user pressed buy (or approve).
    Submit { amount: String, referrer: Referrer },
    /// Result of the allowance gate for the current amount.
    Route { needs_approval: bool },
    /// The approval operation reached `Confirmed`.
    ApprovalConfirmed,
    /// The allowance was re-read after an approval; check the gate again.
    Revalidate,
    /// The purchase operation reached `Confirmed`.
    PurchaseConfirmed,
    /// Something failed; `reason` is shown verbatim.
    Fail { reason: String },
    /// Back to `Idle`, abandoning any in-flight run.
    Reset,
}

impl SessionInput {
    fn name(&self) -> &'static str {
        match self {
            SessionInput::Submit { .. } => "submit",
            SessionInput::Route { .. } => "route",
            SessionInput::ApprovalConfirmed => "approval_confirmed",
            SessionInput::Revalidate => "revalidate",
            SessionInput::PurchaseConfirmed => "purchase_confirmed",
            SessionInput::Fail { .. } => "fail",
            SessionInput::Reset => "reset",
        }
    }
}

/// Why a [`SessionInput`] was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// A run is in flight; submitting again has no effect.
    Busy(PurchasePhase),
    /// The entered amount can never be submitted. The session is `Idle`.
    Input(InputError),
    /// The input makes no sense in the current phase.
    Invalid {
        from: PurchasePhase,
        input: &'static str,
    },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::Busy(phase) => write!(f, "Session busy ({})", phase),
            TransitionError::Input(e) => write!(f, "{}", e),
            TransitionError::Invalid { from, input } => {
                write!(f, "Cannot apply '{}' in phase {}", input, from)
            }
        }
    }
}

impl std::error::Error for TransitionError {}

/// One payment panel's purchase state.
#[derive(Debug, Clone)]
pub struct PurchaseSession {
    method: PaymentMethod,
    decimals: u8,
    phase: PurchasePhase,
    amount_input: String,
    amount: Option<U256>,
    referrer: Referrer,
    failure: Option<String>,
    approval_cycles: u32,
    /// Bumped on every reset so an in-flight run can tell it was abandoned.
    generation: u64,
}

impl PurchaseSession {
    pub fn new(method: PaymentMethod, decimals: u8) -> Self {
        Self {
            method,
            decimals,
            phase: PurchasePhase::Idle,
            amount_input: String::new(),
            amount: None,
            referrer: Referrer::NONE,
            failure: None,
            approval_cycles: 0,
            generation: 0,
        }
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }

    /// Fractional places of the currency this session pays in.
    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn phase(&self) -> PurchasePhase {
        self.phase
    }

    /// The amount field as the user typed it.
    pub fn amount_input(&self) -> &str {
        &self.amount_input
    }

    /// The validated fixed-point amount of the current run.
    pub fn amount(&self) -> Option<U256> {
        self.amount
    }

    pub fn referrer(&self) -> Referrer {
        self.referrer
    }

    /// Reason of the last failure, while in `Failed`.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn approval_cycles(&self) -> u32 {
        self.approval_cycles
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The user edited the amount field.
    ///
    /// After a terminal outcome this resets the session. While a run is in
    /// flight the field is locked.
    pub fn edit_amount(&mut self, input: &str) -> Result<PurchasePhase, TransitionError> {
        if self.phase.is_in_flight() {
            return Err(TransitionError::Busy(self.phase));
        }
        if self.phase.is_terminal() {
            self.apply(SessionInput::Reset)?;
        }
        self.amount_input = input.to_string();
        Ok(self.phase)
    }

    /// Apply `input`, returning the new phase.
    pub fn apply(&mut self, input: SessionInput) -> Result<PurchasePhase, TransitionError> {
        use PurchasePhase::*;

        let name = input.name();
        let next = match (self.phase, input) {
            (Idle | Failed | PurchaseConfirmed, SessionInput::Submit { amount, referrer }) => {
                self.amount_input = amount;
                self.referrer = referrer;
                self.failure = None;
                match units::parse_units(&self.amount_input, self.decimals) {
                    Ok(raw) => {
                        self.amount = Some(raw);
                        self.approval_cycles = 0;
                        Validating
                    }
                    Err(e) => {
                        self.amount = None;
                        self.phase = Idle;
                        return Err(TransitionError::Input(e));
                    }
                }
            }
            (phase, SessionInput::Submit { .. }) => return Err(TransitionError::Busy(phase)),

            (Validating, SessionInput::Route { needs_approval: true }) => {
                if !self.method.requires_allowance() {
                    return Err(TransitionError::Invalid { from: Validating, input: name });
                }
                self.approval_cycles += 1;
                ApprovalPending
            }
            (Validating, SessionInput::Route { needs_approval: false }) => PurchasePending,

            (ApprovalPending, SessionInput::ApprovalConfirmed) => ApprovalConfirmed,
            (ApprovalConfirmed, SessionInput::Revalidate) => Validating,

            (PurchasePending, SessionInput::PurchaseConfirmed) => {
                self.amount_input.clear();
                self.amount = None;
                self.referrer = Referrer::NONE;
                PurchaseConfirmed
            }

            (Validating | ApprovalPending | ApprovalConfirmed | PurchasePending, SessionInput::Fail { reason }) => {
                // amount and referrer stay so the user can retry as is
                self.failure = Some(reason);
                Failed
            }

            (_, SessionInput::Reset) => {
                self.generation += 1;
                self.failure = None;
                self.amount = None;
                self.approval_cycles = 0;
                Idle
            }

            (from, _) => return Err(TransitionError::Invalid { from, input: name }),
        };

        self.phase = next;
        Ok(next)
    }
}
