//! The locked interaction screen — the permanent UI once HSM mode starts.
//!
//! Replaces the normal menu for the remainder of the session. The screen
//! renders its static chrome exactly once into a cached background, then
//! loops: restore the background, draw the live statistics and heartbeat,
//! poll the keypad without blocking, and give the active pending action
//! one step. Nothing in here can exit lockdown; the only way out is the
//! host-side restart flag used by the simulator and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use castellan_core::fmt::pretty_short_delay;
use castellan_core::{Background, Key, KeySource, Screen, SCREEN_WIDTH};
use castellan_policy::PeriodLeft;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use crate::session::Session;

/// Length of the local re-authentication PIN.
pub const LOCAL_PIN_LENGTH: usize = 6;

/// How long to suspend when the keypad has nothing queued.
const POLL_IDLE: Duration = Duration::from_millis(100);

/// Heartbeat sweep: horizontal cell offsets for the roaming bar, one entry
/// consumed per loop iteration. Eased so the bar lingers at the edges.
const SWEEP: [usize; 28] = [
    0, 1, 3, 6, 9, 13, 17, 21, 25, 28, 31, 33, 34, 34, 34, 33, 31, 28, 25, 21, 17, 13, 9, 6, 3, 1,
    0, 0,
];

/// Width of the heartbeat bar in cells.
const HEARTBEAT_WIDTH: usize = 6;

// Fixed layout. The cached-background optimization depends on these rows
// and columns never moving between redraws.
const PIN_X: usize = 32;
const PIN_Y: usize = 0;
const STATS_LABEL_Y: usize = 2;
const STATS_VALUE_Y: usize = 3;
const APPROVED_CX: usize = 5;
const REFUSED_CX: usize = 17;
const PERIOD_CX: usize = 31;
const BUSY_Y: usize = 6;
const BOTTOM_Y: usize = 9;

/// The locked HSM-mode screen and its interaction loop.
pub struct LockdownUx {
    digits: Zeroizing<String>,
    phase: usize,
    background: Option<Background>,
    restart: Arc<AtomicBool>,
}

impl Default for LockdownUx {
    fn default() -> Self {
        Self::new()
    }
}

impl LockdownUx {
    /// Create the screen. Nothing is drawn until [`run`](Self::run).
    #[must_use]
    pub fn new() -> Self {
        Self {
            digits: Zeroizing::new(String::new()),
            phase: 0,
            background: None,
            restart: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current heartbeat table index.
    #[must_use]
    pub fn heartbeat_phase(&self) -> usize {
        self.phase
    }

    /// Number of digits currently buffered (never the digits themselves).
    #[must_use]
    pub fn buffered_digits(&self) -> usize {
        self.digits.chars().count()
    }

    /// Host-only escape: setting the flag makes [`run`](Self::run) return
    /// after the current iteration. The device firmware never sets it; the
    /// simulator and tests do.
    #[must_use]
    pub fn restart_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.restart)
    }

    /// Run the locked interaction loop.
    ///
    /// Never returns on the device. Every error past this point is logged
    /// and swallowed — activation already happened, there is no menu to
    /// fall back to.
    pub async fn run(&mut self, session: &mut Session, keys: &mut dyn KeySource) {
        info!("lockdown loop started");

        // Fresh start: no digits from a previous life, chrome drawn once.
        self.digits.zeroize();
        if let Err(e) = self.draw_background(&mut session.screen) {
            warn!(error = %e, "failed to draw lockdown background");
        }

        loop {
            if self.restart.load(Ordering::Relaxed) {
                info!("lockdown loop restart requested (host only)");
                break;
            }

            if let Err(e) = self.redraw(session) {
                warn!(error = %e, "lockdown redraw failed");
            }

            match keys.try_key() {
                Some(Key::Cancel) => self.digits.zeroize(),
                Some(Key::Confirm) => {
                    if self.buffered_digits() == LOCAL_PIN_LENGTH {
                        session.submit_local_pin(&self.digits);
                        self.digits.zeroize();
                    }
                },
                Some(Key::Abort) => {
                    // Eat it entirely. If this propagated, a compromised
                    // input channel could tear lockdown down.
                },
                Some(Key::Digit(d)) => {
                    if self.buffered_digits() < LOCAL_PIN_LENGTH {
                        self.digits.push(d);
                    } else {
                        debug!("digit dropped, local PIN buffer full");
                    }
                },
                None => tokio::time::sleep(POLL_IDLE).await,
            }

            // Input first, then at most one step of the deferred action —
            // its failures stay its own.
            session.service(None);
        }
    }

    /// Render and cache the static chrome: title, stat labels, dividers,
    /// and the local-PIN placeholder.
    fn draw_background(&mut self, screen: &mut Screen) -> Result<(), castellan_core::DisplayError> {
        let fb = &mut screen.fb;
        fb.clear();

        fb.text(2, 0, "HSM MODE");
        fb.text(PIN_X, PIN_Y, "######");
        fb.hline(1);

        fb.text(1, STATS_LABEL_Y, "APPROVED");
        fb.vline(11, STATS_LABEL_Y, STATS_VALUE_Y);
        fb.text(13, STATS_LABEL_Y, "REFUSED");
        fb.vline(23, STATS_LABEL_Y, STATS_VALUE_Y);
        fb.text(25, STATS_LABEL_Y, "PERIOD LEFT");
        fb.hline(4);

        self.background = Some(fb.snapshot());
        screen.flush()
    }

    /// One frame: cached background, live statistics, heartbeat, buffered
    /// digits, busy overlay, flush.
    fn redraw(&mut self, session: &mut Session) -> Result<(), castellan_core::DisplayError> {
        let stats = session.hsm_policy().and_then(|policy| {
            policy
                .lock()
                .ok()
                .map(|p| (p.approvals(), p.refusals(), p.time_left()))
        });

        let screen = &mut session.screen;
        if let Some(background) = &self.background {
            screen.fb.restore(background);
        }

        let (approvals, refusals, left) = stats.unwrap_or((0, 0, PeriodLeft::NotApplicable));
        let left = match left {
            PeriodLeft::NotApplicable => "n/a".to_owned(),
            PeriodLeft::Unbounded => "--".to_owned(),
            PeriodLeft::Remaining(d) => pretty_short_delay(d),
        };
        draw_centered(&mut screen.fb, APPROVED_CX, STATS_VALUE_Y, &approvals.to_string());
        draw_centered(&mut screen.fb, REFUSED_CX, STATS_VALUE_Y, &refusals.to_string());
        draw_centered(&mut screen.fb, PERIOD_CX, STATS_VALUE_Y, &left);

        // Advance exactly one step per iteration, wrapping at table end.
        self.phase = self.phase.saturating_add(1);
        if self.phase >= SWEEP.len() {
            self.phase = 0;
        }
        let offset = SWEEP.get(self.phase).copied().unwrap_or(0);
        for i in 0..HEARTBEAT_WIDTH {
            screen.fb.put(offset.saturating_add(i), BOTTOM_Y, '━');
        }

        if !self.digits.is_empty() {
            // Feedback only: entered digits padded out to full length.
            let shown: String = self
                .digits
                .chars()
                .chain(std::iter::repeat('#'))
                .take(LOCAL_PIN_LENGTH)
                .collect();
            screen.fb.clear_rect(PIN_X, PIN_Y, LOCAL_PIN_LENGTH, 1);
            screen.fb.text(PIN_X, PIN_Y, &shown);
        }

        self.draw_busy(screen)
    }

    /// Render the shared busy overlay inside the lockdown chrome.
    ///
    /// This is the lockdown replacement for the normal UI's full-screen
    /// busy and progress-bar hooks: subsystems keep reporting through
    /// [`Screen::fullscreen`] and [`Screen::progress_bar`], and the state
    /// lands here instead of on a screen of its own. Contains the flush.
    fn draw_busy(&mut self, screen: &mut Screen) -> Result<(), castellan_core::DisplayError> {
        let handle = screen.busy_handle();
        if let Ok(mut busy) = handle.lock() {
            // Once work reports done, drop the overlay entirely.
            if busy.percent.is_some_and(|p| p >= 0.995) {
                busy.percent = None;
                busy.text = None;
            }

            if let Some(text) = busy.text.clone() {
                screen.fb.clear_rect(0, BUSY_Y, SCREEN_WIDTH, 1);
                screen.fb.text_centered(BUSY_Y, &text);
            }

            if let Some(percent) = busy.percent {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
                let filled = (percent.clamp(0.0, 1.0) * SCREEN_WIDTH as f32) as usize;
                for x in 0..SCREEN_WIDTH {
                    let ch = if x < filled { '█' } else { ' ' };
                    screen.fb.put(x, BOTTOM_Y, ch);
                }
            }
        }

        screen.flush()
    }
}

/// Draw `s` centered on `center_x`.
fn draw_centered(fb: &mut castellan_core::FrameBuffer, center_x: usize, y: usize, s: &str) {
    let half = s.chars().count().saturating_div(2);
    fb.text(center_x.saturating_sub(half), y, s);
}

#[cfg(test)]
mod tests {
    use super::*;
    use castellan_core::{FailingBackend, NullBackend};
    use castellan_policy::{Policy, SigningPolicy};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::pending::{FlowEvent, PendingAction};
    use crate::session::{RecordingAuth, SharedPolicy, UxEntry};

    /// Key source that bounds the loop: after `budget` polls it raises the
    /// restart flag, so each test runs an exact number of iterations.
    struct BoundedKeys {
        queue: VecDeque<Key>,
        budget: usize,
        flag: Arc<AtomicBool>,
    }

    impl BoundedKeys {
        fn new(keys: impl IntoIterator<Item = Key>, budget: usize, flag: Arc<AtomicBool>) -> Self {
            Self {
                queue: keys.into_iter().collect(),
                budget,
                flag,
            }
        }
    }

    impl KeySource for BoundedKeys {
        fn try_key(&mut self) -> Option<Key> {
            self.budget = self.budget.saturating_sub(1);
            if self.budget == 0 {
                self.flag.store(true, Ordering::Relaxed);
            }
            self.queue.pop_front()
        }
    }

    fn lockdown_session(auth: RecordingAuth) -> Session {
        let mut session = Session::new(
            castellan_core::Screen::new(Box::new(NullBackend)),
            Box::new(auth),
        );
        let mut policy: SigningPolicy = serde_json::from_str(r#"{"period": 5}"#).unwrap();
        policy.activate(true);
        let shared: SharedPolicy = Arc::new(Mutex::new(policy));
        session.enter_lockdown(shared);
        session
    }

    async fn run_for(
        ux: &mut LockdownUx,
        session: &mut Session,
        keys: impl IntoIterator<Item = Key>,
        iterations: usize,
    ) {
        let mut source = BoundedKeys::new(keys, iterations, ux.restart_flag());
        ux.run(session, &mut source).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_advances_once_per_iteration() {
        let mut session = lockdown_session(RecordingAuth::new());
        let mut ux = LockdownUx::new();

        run_for(&mut ux, &mut session, [], 5).await;
        assert_eq!(ux.heartbeat_phase(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_advances_regardless_of_input() {
        let mut session = lockdown_session(RecordingAuth::new());
        let mut ux = LockdownUx::new();

        let keys = [Key::Digit('1'), Key::Cancel, Key::Abort];
        run_for(&mut ux, &mut session, keys, 4).await;
        assert_eq!(ux.heartbeat_phase(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_wraps_at_table_length() {
        let mut session = lockdown_session(RecordingAuth::new());
        let mut ux = LockdownUx::new();

        run_for(&mut ux, &mut session, [], 30).await;
        assert_eq!(ux.heartbeat_phase(), 2, "30 steps mod 28-entry table");
    }

    #[tokio::test(start_paused = true)]
    async fn test_digit_buffer_never_exceeds_pin_length() {
        let auth = RecordingAuth::new();
        let mut session = lockdown_session(auth.clone());
        let mut ux = LockdownUx::new();

        let keys = "123456789".chars().filter_map(Key::digit);
        run_for(&mut ux, &mut session, keys, 12).await;

        assert_eq!(ux.buffered_digits(), LOCAL_PIN_LENGTH);
        assert!(auth.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_submit_is_noop() {
        let auth = RecordingAuth::new();
        let mut session = lockdown_session(auth.clone());
        let mut ux = LockdownUx::new();

        let keys = [Key::Digit('1'), Key::Digit('2'), Key::Confirm];
        run_for(&mut ux, &mut session, keys, 5).await;

        assert!(auth.submissions().is_empty());
        assert_eq!(ux.buffered_digits(), 2, "short buffer survives a submit");
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_pin_submitted_once_then_cleared() {
        let auth = RecordingAuth::new();
        let mut session = lockdown_session(auth.clone());
        let mut ux = LockdownUx::new();

        let mut keys: Vec<Key> = "123456".chars().filter_map(Key::digit).collect();
        keys.push(Key::Confirm);
        run_for(&mut ux, &mut session, keys, 9).await;

        assert_eq!(auth.submissions(), vec!["123456".to_owned()]);
        assert_eq!(ux.buffered_digits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_clears_buffer() {
        let auth = RecordingAuth::new();
        let mut session = lockdown_session(auth.clone());
        let mut ux = LockdownUx::new();

        let keys = [Key::Digit('9'), Key::Digit('8'), Key::Cancel];
        run_for(&mut ux, &mut session, keys, 5).await;

        assert_eq!(ux.buffered_digits(), 0);
        assert!(auth.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_is_swallowed() {
        let mut session = lockdown_session(RecordingAuth::new());
        let mut ux = LockdownUx::new();

        run_for(&mut ux, &mut session, [Key::Abort, Key::Abort], 4).await;

        assert!(session.in_lockdown());
        assert_eq!(session.ux.top(), Some(&UxEntry::Lockdown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_restored_each_frame() {
        let mut session = lockdown_session(RecordingAuth::new());
        let mut ux = LockdownUx::new();

        run_for(&mut ux, &mut session, [], 3).await;

        let fb = &session.screen.fb;
        assert!(fb.row(0).contains("HSM MODE"));
        assert!(fb.row(0).contains("######"));
        assert!(fb.row(STATS_LABEL_Y).contains("APPROVED"));
        assert!(fb.row(STATS_VALUE_Y).contains('0'), "stats drawn over chrome");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_reflect_policy_counters() {
        let mut session = lockdown_session(RecordingAuth::new());
        let mut ux = LockdownUx::new();

        run_for(&mut ux, &mut session, [], 2).await;
        // Period is 5 minutes and counting down.
        let row = session.screen.fb.row(STATS_VALUE_Y);
        assert!(row.contains('m') || row.contains('s'), "period column rendered: {row}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_overlay_rendered_and_cleared() {
        let mut session = lockdown_session(RecordingAuth::new());
        let mut ux = LockdownUx::new();

        session.screen.fullscreen("signing txn...", Some(0.5));
        run_for(&mut ux, &mut session, [], 2).await;
        assert!(session.screen.fb.row(BUSY_Y).contains("signing txn..."));

        session.screen.progress_bar(1.0);
        ux.restart.store(false, Ordering::Relaxed);
        run_for(&mut ux, &mut session, [], 2).await;
        assert!(!session.screen.fb.row(BUSY_Y).contains("signing txn..."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_action_gets_one_step_per_iteration() {
        struct Counter {
            steps: Arc<AtomicUsize>,
        }
        use std::sync::atomic::AtomicUsize;

        impl PendingAction for Counter {
            fn step(&mut self, _session: &mut Session, event: Option<FlowEvent>) {
                assert_eq!(event, None, "lockdown never routes input to actions");
                self.steps.fetch_add(1, Ordering::SeqCst);
            }

            fn is_done(&self) -> bool {
                false
            }

            fn refused(&self) -> bool {
                true
            }

            fn failed(&self) -> Option<&str> {
                None
            }
        }

        let mut session = lockdown_session(RecordingAuth::new());
        let steps = Arc::new(AtomicUsize::new(0));
        session.install(Box::new(Counter {
            steps: Arc::clone(&steps),
        }));
        let mut ux = LockdownUx::new();

        run_for(&mut ux, &mut session, [], 4).await;
        assert_eq!(steps.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_display_errors_never_stop_the_loop() {
        let auth = RecordingAuth::new();
        let mut session = Session::new(
            castellan_core::Screen::new(Box::new(FailingBackend)),
            Box::new(auth),
        );
        let policy: SigningPolicy = serde_json::from_str("{}").unwrap();
        session.enter_lockdown(Arc::new(Mutex::new(policy)));

        let mut ux = LockdownUx::new();
        run_for(&mut ux, &mut session, [], 3).await;

        assert_eq!(ux.heartbeat_phase(), 3, "loop survived every failed flush");
    }
}
