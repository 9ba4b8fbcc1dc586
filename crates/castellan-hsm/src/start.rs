//! Starting an approval: load the policy, install the flow, route it into
//! the UI.
//!
//! The three ways an approval can begin differ only in two respects — how
//! a load failure is reported, and how the flow is inserted into the
//! navigation stack — so both are table-driven off [`PolicyOrigin`] and
//! the insertion itself is a single parameterized operation.

use castellan_core::Story;
use castellan_policy::{load, PolicyError, PolicySource};
use tracing::warn;

use crate::approve::{ApprovalFlow, FlowId};
use crate::pending::PendingAction;
use crate::session::{Session, UxEntry};

/// What triggered this approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOrigin {
    /// Trust-asserting external trigger over the transport.
    Transport,
    /// Operator navigated here from the normal menu.
    Menu,
    /// Device boot found a policy marked for immediate approval.
    Boot,
}

/// How the approval flow is routed into the navigation stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionMode {
    /// Discard the existing stack; the flow becomes the new root.
    Replace,
    /// Push above the existing stack so the operator can still back out.
    Push,
    /// Install the flow but leave insertion to the caller.
    Defer,
}

impl PolicyOrigin {
    fn insertion(self) -> InsertionMode {
        match self {
            Self::Transport => InsertionMode::Replace,
            Self::Menu => InsertionMode::Push,
            Self::Boot => InsertionMode::Defer,
        }
    }
}

/// Load a policy and start its approval flow.
///
/// On success the flow is installed as the sole pending action and routed
/// into the UI according to the origin; the returned id identifies it in
/// logs. `Ok(None)` means a load failure was already reported to the
/// operator on-screen (menu origin only) and no flow exists.
///
/// # Errors
///
/// Load failures are propagated only for [`PolicyOrigin::Transport`] and
/// [`PolicyOrigin::Boot`], where the caller owns error reporting.
pub fn start_approval(
    session: &mut Session,
    source: PolicySource<'_>,
    origin: PolicyOrigin,
) -> Result<Option<FlowId>, PolicyError> {
    // Whatever conversation was in flight is over.
    session.cleanup();

    let (policy, is_new) = match load(source) {
        Ok(loaded) => loaded,
        Err(e) => match origin {
            PolicyOrigin::Menu => {
                warn!(error = %e, "cannot start HSM");
                session.show_notice(&Story::new(format!("Cannot start HSM.\n\n{e}")));
                return Ok(None);
            },
            PolicyOrigin::Transport | PolicyOrigin::Boot => return Err(e),
        },
    };

    let flow = ApprovalFlow::new(policy, is_new);
    let id = flow.id();
    install_flow(session, Box::new(flow), origin.insertion());
    Ok(Some(id))
}

/// Install `flow` as the sole pending action and insert it into the UI.
pub fn install_flow(session: &mut Session, flow: Box<dyn PendingAction>, mode: InsertionMode) {
    session.install(flow);
    match mode {
        InsertionMode::Replace => session.ux.reset(UxEntry::Approval),
        InsertionMode::Push => session.ux.push(UxEntry::Approval),
        InsertionMode::Defer => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castellan_core::{NullBackend, Screen};

    use crate::session::NullAuth;

    const VALID: &str = r#"{"period": 60, "rules": [{"max_amount": 100000}]}"#;

    fn session() -> Session {
        Session::new(Screen::new(Box::new(NullBackend)), Box::new(NullAuth))
    }

    #[test]
    fn test_transport_origin_replaces_stack() {
        let mut s = session();
        s.ux.push(UxEntry::Notice); // pre-existing navigation state

        let id = start_approval(
            &mut s,
            PolicySource::Transfer(VALID.as_bytes()),
            PolicyOrigin::Transport,
        )
        .unwrap();

        assert!(id.is_some());
        assert!(s.has_active());
        assert_eq!(s.ux.len(), 1);
        assert_eq!(s.ux.top(), Some(&UxEntry::Approval));
    }

    #[test]
    fn test_menu_origin_pushes_above_stack() {
        let mut s = session();

        start_approval(
            &mut s,
            PolicySource::Transfer(VALID.as_bytes()),
            PolicyOrigin::Menu,
        )
        .unwrap();

        assert!(s.has_active());
        assert_eq!(s.ux.len(), 2, "menu stays beneath the approval");
        assert_eq!(s.ux.top(), Some(&UxEntry::Approval));
    }

    #[test]
    fn test_boot_origin_defers_insertion() {
        let mut s = session();

        start_approval(
            &mut s,
            PolicySource::Transfer(VALID.as_bytes()),
            PolicyOrigin::Boot,
        )
        .unwrap();

        assert!(s.has_active());
        assert_eq!(s.ux.len(), 1);
        assert_eq!(s.ux.top(), Some(&crate::session::UxEntry::Menu));
    }

    #[test]
    fn test_menu_load_failure_shows_notice() {
        let mut s = session();

        let result = start_approval(
            &mut s,
            PolicySource::Transfer(b"{not json"),
            PolicyOrigin::Menu,
        );

        assert!(matches!(result, Ok(None)));
        assert!(!s.has_active(), "no pending action on load failure");
        assert_eq!(s.ux.top(), Some(&UxEntry::Notice));
        assert!(s.screen.fb.row(0).contains("Cannot start HSM."));
    }

    #[test]
    fn test_transport_load_failure_propagates() {
        let mut s = session();

        let result = start_approval(
            &mut s,
            PolicySource::Transfer(b"{not json"),
            PolicyOrigin::Transport,
        );

        assert!(matches!(result, Err(PolicyError::Parse { .. })));
        assert!(!s.has_active());
        assert_ne!(s.ux.top(), Some(&UxEntry::Notice), "nothing drawn for transport");
    }

    #[test]
    fn test_starting_again_replaces_previous_flow() {
        let mut s = session();

        let first = start_approval(
            &mut s,
            PolicySource::Transfer(VALID.as_bytes()),
            PolicyOrigin::Menu,
        )
        .unwrap();
        let second = start_approval(
            &mut s,
            PolicySource::Transfer(VALID.as_bytes()),
            PolicyOrigin::Menu,
        )
        .unwrap();

        assert_ne!(first, second);
        assert!(s.has_active(), "exactly one pending action at a time");
    }
}
