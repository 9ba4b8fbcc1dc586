//! Session context — the explicitly owned state one device session carries.
//!
//! Exactly one authorization conversation can exist at a time on this
//! device, so the pending-action slot lives here as a plain field rather
//! than as a hidden global: everything that reads or replaces it receives
//! the session by reference, which keeps the lifecycle auditable and lets
//! tests construct isolated sessions.

use std::sync::{Arc, Mutex};

use castellan_core::{Screen, Story, UxStack};
use castellan_policy::Policy;
use tracing::{debug, info, warn};

use crate::pending::{FlowEvent, PendingAction};

/// A policy shared between the session and the signing engine after
/// activation.
pub type SharedPolicy = Arc<Mutex<dyn Policy>>;

/// Seam to the local (non-network) re-authentication subsystem.
pub trait LocalAuth: Send {
    /// A full-length local PIN was entered on the device keypad.
    fn local_pin_entered(&mut self, digits: &str);
}

/// [`LocalAuth`] that ignores submissions. Headless runs and tests that
/// do not care about local re-authentication.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuth;

impl LocalAuth for NullAuth {
    fn local_pin_entered(&mut self, _digits: &str) {}
}

/// [`LocalAuth`] that records every submission. Used by tests and the
/// simulator to observe PIN hand-off without a real auth subsystem.
#[derive(Debug, Default, Clone)]
pub struct RecordingAuth {
    submissions: Arc<Mutex<Vec<String>>>,
}

impl RecordingAuth {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the submissions seen so far.
    #[must_use]
    pub fn submissions(&self) -> Vec<String> {
        self.submissions.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl LocalAuth for RecordingAuth {
    fn local_pin_entered(&mut self, digits: &str) {
        if let Ok(mut subs) = self.submissions.lock() {
            subs.push(digits.to_owned());
        }
    }
}

/// One entry on the UI navigation stack.
///
/// The stack tracks *what* is active; menus themselves are owned by the
/// normal interactive UI, which is outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UxEntry {
    /// A normal interactive menu.
    Menu,
    /// The policy approval flow held in the pending-action slot.
    Approval,
    /// A blocking informational notice the operator must dismiss.
    Notice,
    /// The locked HSM-mode screen. Once this is the root, it stays.
    Lockdown,
}

/// Per-session device state: screen, navigation stack, the single
/// pending-action slot, and the activated policy once in lockdown.
pub struct Session {
    /// The device screen.
    pub screen: Screen,
    /// UI navigation stack; the top entry is the active screen.
    pub ux: UxStack<UxEntry>,
    active: Option<Box<dyn PendingAction>>,
    hsm: Option<SharedPolicy>,
    auth: Box<dyn LocalAuth>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("ux_depth", &self.ux.len())
            .field("has_active", &self.active.is_some())
            .field("in_lockdown", &self.hsm.is_some())
            .finish()
    }
}

impl Session {
    /// Create a session showing the normal menu.
    #[must_use]
    pub fn new(screen: Screen, auth: Box<dyn LocalAuth>) -> Self {
        let mut ux = UxStack::new();
        ux.push(UxEntry::Menu);
        Self {
            screen,
            ux,
            active: None,
            hsm: None,
            auth,
        }
    }

    /// Clear the pending-action slot.
    ///
    /// Called before a new flow is installed, and again when the session
    /// moves into lockdown.
    pub fn cleanup(&mut self) {
        if self.active.take().is_some() {
            debug!("pending action slot cleared");
        }
    }

    /// Install `action` as the sole pending action, clearing any
    /// predecessor first.
    pub fn install(&mut self, action: Box<dyn PendingAction>) {
        self.cleanup();
        self.active = Some(action);
        debug!("pending action installed");
    }

    /// Whether a pending action is currently installed.
    #[must_use]
    pub fn has_active(&self) -> bool {
        self.active.is_some()
    }

    /// Inspect the installed pending action.
    #[must_use]
    pub fn active(&self) -> Option<&dyn PendingAction> {
        self.active.as_deref()
    }

    /// Drive the installed pending action by exactly one step.
    ///
    /// The action is taken out of the slot for the duration of the step so
    /// it can mutate the session freely; it is dropped once done. A step
    /// that installed a replacement keeps the replacement.
    pub fn service(&mut self, event: Option<FlowEvent>) {
        let Some(mut action) = self.active.take() else {
            return;
        };
        if !action.is_done() {
            action.step(self, event);
        }
        if !action.is_done() && self.active.is_none() {
            self.active = Some(action);
        }
    }

    /// Enter lockdown: record the activated policy, clear the pending
    /// slot, and make the locked screen the only UI entry.
    ///
    /// One-way for the rest of the session — no method on this type clears
    /// the policy or restores the menu stack afterwards.
    pub fn enter_lockdown(&mut self, policy: SharedPolicy) {
        info!("entering HSM lockdown");
        self.hsm = Some(policy);
        self.cleanup();
        self.ux.reset(UxEntry::Lockdown);
    }

    /// Whether the session has entered lockdown.
    #[must_use]
    pub fn in_lockdown(&self) -> bool {
        self.hsm.is_some()
    }

    /// The activated policy, once in lockdown.
    #[must_use]
    pub fn hsm_policy(&self) -> Option<SharedPolicy> {
        self.hsm.clone()
    }

    /// Hand a full-length local PIN to the authentication subsystem.
    pub fn submit_local_pin(&mut self, digits: &str) {
        debug!("local PIN submitted");
        self.auth.local_pin_entered(digits);
    }

    /// Show a blocking informational notice.
    ///
    /// The notice stays on screen (and on the stack) until the operator
    /// dismisses it through the normal UI.
    pub fn show_notice(&mut self, story: &Story) {
        story.render(&mut self.screen.fb);
        if let Err(e) = self.screen.flush() {
            warn!(error = %e, "failed to present notice");
        }
        self.ux.push(UxEntry::Notice);
    }

    /// Restore the caller's prior UI context after a refused flow.
    pub(crate) fn restore_prior_ui(&mut self) {
        if matches!(self.ux.top(), Some(UxEntry::Approval)) {
            self.ux.pop();
        }
        if self.ux.is_empty() {
            self.ux.push(UxEntry::Menu);
        }
    }
}
