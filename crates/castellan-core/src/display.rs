//! Character-cell display surface.
//!
//! The device screen is modelled as a fixed grid of character cells. All
//! chrome is drawn into a [`FrameBuffer`]; a [`DisplayBackend`] flushes the
//! buffer to whatever physical surface is attached (OLED bridge on the
//! device, a terminal in the simulator, nothing at all in tests).
//!
//! Cell positions are part of the contract: the lockdown screen caches its
//! static background once and restores it every tick, which is only valid
//! because draw positions never move between redraws.

use std::sync::{Arc, Mutex};

use tracing::warn;

/// Screen width in character cells.
pub const SCREEN_WIDTH: usize = 40;

/// Screen height in character cells.
pub const SCREEN_HEIGHT: usize = 10;

/// Errors surfaced by a display backend.
#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    /// The backend failed to present the frame buffer.
    #[error("display flush failed: {0}")]
    Flush(String),
}

/// A saved copy of the frame buffer contents.
///
/// Produced by [`FrameBuffer::snapshot`] and replayed with
/// [`FrameBuffer::restore`]. Used to cache static chrome that would be
/// wasteful to redraw every tick.
#[derive(Debug, Clone)]
pub struct Background {
    cells: [[char; SCREEN_WIDTH]; SCREEN_HEIGHT],
}

/// Fixed-size character grid the UI draws into.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    cells: [[char; SCREEN_WIDTH]; SCREEN_HEIGHT],
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    /// Create a blank frame buffer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cells: [[' '; SCREEN_WIDTH]; SCREEN_HEIGHT],
        }
    }

    /// Blank every cell.
    pub fn clear(&mut self) {
        self.cells = [[' '; SCREEN_WIDTH]; SCREEN_HEIGHT];
    }

    /// Write a single cell. Out-of-range positions are ignored.
    pub fn put(&mut self, x: usize, y: usize, ch: char) {
        if let Some(row) = self.cells.get_mut(y)
            && let Some(cell) = row.get_mut(x)
        {
            *cell = ch;
        }
    }

    /// Draw text starting at `(x, y)`, clipping at the right edge.
    pub fn text(&mut self, x: usize, y: usize, s: &str) {
        for (i, ch) in s.chars().enumerate() {
            let col = x.saturating_add(i);
            if col >= SCREEN_WIDTH {
                break;
            }
            self.put(col, y, ch);
        }
    }

    /// Draw text centered within the full screen width on row `y`.
    pub fn text_centered(&mut self, y: usize, s: &str) {
        let len = s.chars().count().min(SCREEN_WIDTH);
        let x = SCREEN_WIDTH.saturating_sub(len).saturating_div(2);
        self.text(x, y, s);
    }

    /// Draw a full-width horizontal divider on row `y`.
    pub fn hline(&mut self, y: usize) {
        for x in 0..SCREEN_WIDTH {
            self.put(x, y, '─');
        }
    }

    /// Draw a vertical divider in column `x` spanning rows `y0..=y1`.
    pub fn vline(&mut self, x: usize, y0: usize, y1: usize) {
        for y in y0..=y1.min(SCREEN_HEIGHT.saturating_sub(1)) {
            self.put(x, y, '│');
        }
    }

    /// Blank a `w`-cell-wide, `h`-cell-tall rectangle at `(x, y)`.
    pub fn clear_rect(&mut self, x: usize, y: usize, w: usize, h: usize) {
        for row in y..y.saturating_add(h) {
            for col in x..x.saturating_add(w) {
                self.put(col, row, ' ');
            }
        }
    }

    /// Copy the current contents into a reusable [`Background`].
    #[must_use]
    pub fn snapshot(&self) -> Background {
        Background { cells: self.cells }
    }

    /// Replace the buffer contents with a saved [`Background`].
    pub fn restore(&mut self, background: &Background) {
        self.cells = background.cells;
    }

    /// Read back row `y` as a string, for backends and assertions.
    #[must_use]
    pub fn row(&self, y: usize) -> String {
        self.cells
            .get(y)
            .map(|row| row.iter().collect())
            .unwrap_or_default()
    }

    /// Read back a single cell.
    #[must_use]
    pub fn cell(&self, x: usize, y: usize) -> char {
        self.cells
            .get(y)
            .and_then(|row| row.get(x))
            .copied()
            .unwrap_or(' ')
    }
}

/// Seam to a physical display surface.
///
/// Implementations present a finished [`FrameBuffer`]; they never draw into
/// it. Pixel geometry, fonts and transports live behind this trait.
pub trait DisplayBackend: Send {
    /// Present the frame buffer on the physical surface.
    ///
    /// # Errors
    ///
    /// Returns [`DisplayError::Flush`] if the surface rejected the frame.
    fn flush(&mut self, fb: &FrameBuffer) -> Result<(), DisplayError>;
}

/// Backend that discards every frame. Used in tests and headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl DisplayBackend for NullBackend {
    fn flush(&mut self, _fb: &FrameBuffer) -> Result<(), DisplayError> {
        Ok(())
    }
}

/// Backend that rejects every frame. Used to exercise fail-closed paths.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingBackend;

impl DisplayBackend for FailingBackend {
    fn flush(&mut self, _fb: &FrameBuffer) -> Result<(), DisplayError> {
        Err(DisplayError::Flush("backend rejected frame".to_owned()))
    }
}

/// Busy/progress overlay state shared between subsystems and the active UI.
///
/// Subsystems report long-running work through [`Screen::fullscreen`] and
/// [`Screen::progress_bar`]; whichever screen is currently active reads the
/// overlay each tick and renders it inside its own chrome. This is what lets
/// progress reporting keep working after the normal UI has been replaced.
#[derive(Debug, Default, Clone)]
pub struct BusyOverlay {
    /// Message to show while busy, if any.
    pub text: Option<String>,
    /// Progress in `0.0..=1.0`, if known.
    pub percent: Option<f32>,
}

/// Shared handle to the busy overlay state.
pub type BusyHandle = Arc<Mutex<BusyOverlay>>;

/// The device screen: frame buffer, physical backend and busy overlay.
pub struct Screen {
    /// The drawable character grid.
    pub fb: FrameBuffer,
    backend: Box<dyn DisplayBackend>,
    busy: BusyHandle,
}

impl std::fmt::Debug for Screen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Screen").field("fb", &self.fb).finish()
    }
}

impl Screen {
    /// Create a screen over the given backend.
    #[must_use]
    pub fn new(backend: Box<dyn DisplayBackend>) -> Self {
        Self {
            fb: FrameBuffer::new(),
            backend,
            busy: Arc::new(Mutex::new(BusyOverlay::default())),
        }
    }

    /// Present the current frame buffer.
    ///
    /// # Errors
    ///
    /// Propagates [`DisplayError`] from the backend.
    pub fn flush(&mut self) -> Result<(), DisplayError> {
        self.backend.flush(&self.fb)
    }

    /// Handle to the shared busy overlay, for screens that render it.
    #[must_use]
    pub fn busy_handle(&self) -> BusyHandle {
        Arc::clone(&self.busy)
    }

    /// Report a full-screen busy message, with optional progress.
    pub fn fullscreen(&self, msg: &str, percent: Option<f32>) {
        match self.busy.lock() {
            Ok(mut busy) => {
                busy.text = Some(msg.to_owned());
                if percent.is_some() {
                    busy.percent = percent;
                }
            },
            Err(_) => warn!("busy overlay lock poisoned, dropping message"),
        }
    }

    /// Report bare progress without changing the busy message.
    pub fn progress_bar(&self, percent: f32) {
        match self.busy.lock() {
            Ok(mut busy) => busy.percent = Some(percent),
            Err(_) => warn!("busy overlay lock poisoned, dropping progress"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_clips_at_right_edge() {
        let mut fb = FrameBuffer::new();
        fb.text(SCREEN_WIDTH - 2, 0, "abcdef");
        assert_eq!(fb.cell(SCREEN_WIDTH - 2, 0), 'a');
        assert_eq!(fb.cell(SCREEN_WIDTH - 1, 0), 'b');
        // Nothing wrapped onto the next row.
        assert_eq!(fb.cell(0, 1), ' ');
    }

    #[test]
    fn test_out_of_range_draws_ignored() {
        let mut fb = FrameBuffer::new();
        fb.put(SCREEN_WIDTH, SCREEN_HEIGHT, 'x');
        fb.text(0, SCREEN_HEIGHT, "below");
        assert_eq!(fb.row(SCREEN_HEIGHT), "");
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let mut fb = FrameBuffer::new();
        fb.text(2, 0, "HSM MODE");
        fb.hline(1);
        let background = fb.snapshot();

        fb.text(0, 5, "scribbled over");
        fb.restore(&background);

        assert!(fb.row(0).contains("HSM MODE"));
        assert_eq!(fb.row(5).trim(), "");
    }

    #[test]
    fn test_clear_rect_blanks_region_only() {
        let mut fb = FrameBuffer::new();
        fb.text(0, 0, "aaaaaaaaaa");
        fb.clear_rect(2, 0, 4, 1);
        assert_eq!(&fb.row(0)[..10], "aa    aaaa");
    }

    #[test]
    fn test_busy_overlay_shared_between_handles() {
        let screen = Screen::new(Box::new(NullBackend));
        let handle = screen.busy_handle();

        screen.fullscreen("signing...", Some(0.25));
        let busy = handle.lock().unwrap();
        assert_eq!(busy.text.as_deref(), Some("signing..."));
        assert_eq!(busy.percent, Some(0.25));
    }

    #[test]
    fn test_progress_bar_keeps_message() {
        let screen = Screen::new(Box::new(NullBackend));
        screen.fullscreen("updating", None);
        screen.progress_bar(0.5);

        let handle = screen.busy_handle();
        let busy = handle.lock().unwrap();
        assert_eq!(busy.text.as_deref(), Some("updating"));
        assert_eq!(busy.percent, Some(0.5));
    }
}
