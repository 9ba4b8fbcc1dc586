//! The policy approval flow.
//!
//! A single-use confirmation conversation: explain the proposed policy,
//! require an affirmative gesture, and for newly proposed policies require
//! a second, randomized confirmation gesture. Full approval activates the
//! policy and moves the session into lockdown — a one-way trip.

use std::fmt;
use std::sync::{Arc, Mutex};

use castellan_core::{Key, Story};
use castellan_policy::Policy;
use rand::seq::SliceRandom;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{HsmError, HsmResult};
use crate::pending::{FlowEvent, PendingAction};
use crate::session::Session;

/// Title shown over both approval stories.
const TITLE: &str = "Start HSM?";

/// Alphabet the second-confirmation token is drawn from.
///
/// Digits only, so the token can be entered on the bare keypad; `5` is
/// reserved as the keypad's center/navigation key and excluded.
pub const CONFIRM_ALPHABET: [char; 5] = ['1', '2', '3', '4', '6'];

/// Unique identifier for an approval flow, used in log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowId(Uuid);

impl FlowId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "approval:{}", self.0)
    }
}

/// States of the approval conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Showing the policy explanation, waiting for accept/reject.
    Explain,
    /// Showing the last-chance warning, waiting for the exact token.
    Confirm {
        /// The randomly chosen token that approves; anything else refuses.
        token: char,
    },
    /// Terminal. Outcome is carried by the refusal flag.
    Done,
}

/// A single-use approval conversation over a loaded policy.
///
/// Implements [`PendingAction`]: the owning loop drives it with
/// [`PendingAction::step`] until done. The refusal flag starts true and is
/// only cleared by a completed approval, so every early exit — including
/// an internal error — refuses.
pub struct ApprovalFlow<P: Policy + 'static> {
    id: FlowId,
    policy: Option<P>,
    is_new_policy: bool,
    state: FlowState,
    presented: bool,
    refused: bool,
    failed: Option<String>,
    done: bool,
}

impl<P: Policy + 'static> ApprovalFlow<P> {
    /// Create a flow over a freshly loaded policy.
    ///
    /// `is_new_policy` is true when the policy came from a transfer buffer
    /// rather than from storage; it gates the second confirmation step.
    #[must_use]
    pub fn new(policy: P, is_new_policy: bool) -> Self {
        Self {
            id: FlowId::new(),
            policy: Some(policy),
            is_new_policy,
            state: FlowState::Explain,
            presented: false,
            refused: true,
            failed: None,
            done: false,
        }
    }

    /// This flow's identifier.
    #[must_use]
    pub fn id(&self) -> FlowId {
        self.id
    }

    /// Current state of the conversation.
    #[must_use]
    pub fn current_state(&self) -> FlowState {
        self.state
    }

    fn present_explain(&mut self, session: &mut Session) -> HsmResult<()> {
        let mut body = self.policy.as_ref().map(|p| p.explain()).unwrap_or_default();
        body.push_str("\n\nPress OK to enable HSM mode.");
        Story::new(body).with_title(TITLE).render(&mut session.screen.fb);
        session.screen.flush()?;
        self.presented = true;
        Ok(())
    }

    fn present_confirm(&mut self, session: &mut Session, token: char) -> HsmResult<()> {
        let body = format!(
            "Last chance. You are defining a new policy which allows this \
             device to sign specific transactions without any further user \
             approval.\n\nPress {token} to save policy and enable HSM mode."
        );
        Story::new(body).with_title(TITLE).render(&mut session.screen.fb);
        session.screen.flush()?;
        self.presented = true;
        Ok(())
    }

    fn finish_refused(&mut self, session: &mut Session) {
        self.refused = true;
        self.done = true;
        self.state = FlowState::Done;
        info!(id = %self.id, "HSM policy refused");
        session.restore_prior_ui();
    }

    fn finish_approved(&mut self, session: &mut Session) {
        self.refused = false;
        self.done = true;
        self.state = FlowState::Done;

        // The policy leaves the flow exactly once; a hostile re-entry finds
        // the slot empty and cannot re-activate.
        if let Some(mut policy) = self.policy.take() {
            policy.activate(self.is_new_policy);
            info!(id = %self.id, new = self.is_new_policy, "HSM policy approved");
            session.enter_lockdown(Arc::new(Mutex::new(policy)));
        }
    }

    fn try_step(&mut self, session: &mut Session, event: Option<FlowEvent>) -> HsmResult<()> {
        match self.state {
            FlowState::Done => Ok(()),
            FlowState::Explain => {
                if !self.presented {
                    self.present_explain(session)?;
                }
                match event {
                    None | Some(FlowEvent::Key(Key::Digit(_))) => Ok(()),
                    Some(FlowEvent::Key(Key::Confirm)) => {
                        if self.is_new_policy {
                            let token = pick_confirm_token();
                            self.state = FlowState::Confirm { token };
                            self.present_confirm(session, token)?;
                        } else {
                            self.finish_approved(session);
                        }
                        Ok(())
                    },
                    Some(FlowEvent::Key(Key::Cancel | Key::Abort) | FlowEvent::Interrupted) => {
                        self.finish_refused(session);
                        Ok(())
                    },
                }
            },
            FlowState::Confirm { token } => {
                let Some(event) = event else {
                    return Ok(());
                };
                // Exact match on the chosen token; every other gesture —
                // including interruption — refuses.
                if event == FlowEvent::Key(Key::Digit(token)) {
                    self.finish_approved(session);
                } else {
                    self.finish_refused(session);
                }
                Ok(())
            },
        }
    }
}

impl<P: Policy + 'static> PendingAction for ApprovalFlow<P> {
    fn step(&mut self, session: &mut Session, event: Option<FlowEvent>) {
        if self.done {
            return;
        }
        if let Err(e) = self.try_step(session, event) {
            // Fail closed: an internal error is indistinguishable from an
            // explicit rejection.
            let failure = HsmError::ApprovalInternal(e.to_string());
            warn!(id = %self.id, error = %failure, "approval step failed, refusing");
            self.failed = Some(failure.to_string());
            self.finish_refused(session);
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn refused(&self) -> bool {
        self.refused
    }

    fn failed(&self) -> Option<&str> {
        self.failed.as_deref()
    }
}

/// Draw one confirmation token uniformly from [`CONFIRM_ALPHABET`].
///
/// Uses the operating-system RNG; this gesture is the last line of defense
/// against blind confirmation of a new policy.
fn pick_confirm_token() -> char {
    CONFIRM_ALPHABET
        .choose(&mut rand::rngs::OsRng)
        .copied()
        .unwrap_or(CONFIRM_ALPHABET[0])
}
