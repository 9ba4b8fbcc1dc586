//! Castellan HSM mode - the authorization-and-lockdown controller.
//!
//! HSM mode lets the device sign transactions autonomously, under a policy
//! the operator approved in person. This crate owns the workflow around
//! that irreversible decision:
//!
//! - [`start_approval`]: load a proposed (or previously approved) policy
//!   and start the approval conversation.
//! - [`ApprovalFlow`]: the single-use confirmation state machine — explain,
//!   accept, and for new policies a randomized second confirmation. Fails
//!   closed: any internal error refuses.
//! - [`Session`]: the explicitly owned session context carrying the single
//!   pending-action slot and, after activation, the live policy.
//! - [`LockdownUx`]: the locked interaction loop that replaces the normal
//!   menu once HSM mode starts, for the remainder of the session.
//!
//! The policy's decision semantics, persistent storage, the PIN subsystem
//! and the transport are all external collaborators behind trait seams.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod approve;
pub mod error;
pub mod lockdown;
pub mod pending;
pub mod session;
pub mod start;

pub use approve::{ApprovalFlow, FlowId, FlowState, CONFIRM_ALPHABET};
pub use error::{HsmError, HsmResult};
pub use lockdown::{LockdownUx, LOCAL_PIN_LENGTH};
pub use pending::{FlowEvent, PendingAction};
pub use session::{LocalAuth, NullAuth, RecordingAuth, Session, SharedPolicy, UxEntry};
pub use start::{install_flow, start_approval, InsertionMode, PolicyOrigin};
