//! One-shot interactive tasks.
//!
//! A pending action is an authorization conversation in progress: it is
//! installed into the session's single active slot, driven one step at a
//! time by whichever loop currently owns the UI, and ends in a terminal
//! `done` state with a refusal outcome unless it explicitly cleared it.

use castellan_core::Key;

use crate::session::Session;

/// An event delivered to a pending action's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent {
    /// A key gesture from the operator.
    Key(Key),
    /// The presentation was interrupted (input channel torn down, screen
    /// taken over). Always treated as rejection by approval flows.
    Interrupted,
}

/// A one-shot interactive task with an explicit step entry point.
///
/// `step` may be invoked repeatedly — with or without an event — until
/// [`is_done`](Self::is_done) reports true; stepping a finished action is a
/// no-op. Implementations must fail closed: an internal error terminates
/// the action as refused, it never propagates out of `step`.
pub trait PendingAction: Send {
    /// Advance the state machine by exactly one step.
    ///
    /// `event` is `None` when the driving loop has nothing to deliver
    /// (the action should present itself or keep waiting).
    fn step(&mut self, session: &mut Session, event: Option<FlowEvent>);

    /// Whether the action has reached its terminal state.
    fn is_done(&self) -> bool;

    /// Refusal outcome. Defaults to true until the action explicitly
    /// records a positive result.
    fn refused(&self) -> bool;

    /// Description of the internal failure that terminated the action,
    /// if any.
    fn failed(&self) -> Option<&str>;
}
