//! UI navigation stack and full-screen stories.
//!
//! The device UI is a stack of screens: menus push interactive flows on
//! top of themselves, transport-triggered flows replace the whole stack.
//! The stack only tracks *what* is active; rendering and input routing stay
//! with the owner of the entries, which keeps this type generic and easy to
//! assert against in tests.

use crate::display::{FrameBuffer, SCREEN_HEIGHT, SCREEN_WIDTH};

/// Navigation stack of UI entries, top entry is the active screen.
#[derive(Debug, Default)]
pub struct UxStack<S> {
    stack: Vec<S>,
}

impl<S> UxStack<S> {
    /// Create an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Push an entry on top of the current stack.
    pub fn push(&mut self, entry: S) {
        self.stack.push(entry);
    }

    /// Pop the top entry, if any.
    pub fn pop(&mut self) -> Option<S> {
        self.stack.pop()
    }

    /// Discard the whole stack and make `root` the only entry.
    pub fn reset(&mut self, root: S) {
        self.stack.clear();
        self.stack.push(root);
    }

    /// The active (top) entry.
    #[must_use]
    pub fn top(&self) -> Option<&S> {
        self.stack.last()
    }

    /// Mutable access to the active entry.
    pub fn top_mut(&mut self) -> Option<&mut S> {
        self.stack.last_mut()
    }

    /// Number of entries on the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Whether the stack has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

/// A full-screen text prompt.
///
/// Stories are how flows talk to the human: a body of wrapped text,
/// optionally under a title, filling the whole screen until a gesture
/// resolves them. Text that does not fit is truncated; scrolling is the
/// concern of richer screens, not of stories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    title: Option<String>,
    body: String,
}

impl Story {
    /// Create a story from body text.
    #[must_use]
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            title: None,
            body: body.into(),
        }
    }

    /// Set the title row.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Body text, for assertions and logging.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Render the story into the frame buffer, replacing its contents.
    pub fn render(&self, fb: &mut FrameBuffer) {
        fb.clear();

        let mut y = 0;
        if let Some(title) = &self.title {
            fb.text(0, 0, title);
            fb.hline(1);
            y = 2;
        }

        for line in wrap(&self.body, SCREEN_WIDTH) {
            if y >= SCREEN_HEIGHT {
                break;
            }
            fb.text(0, y, &line);
            y = y.saturating_add(1);
        }
    }
}

/// Word-wrap `text` to `width` columns, honoring explicit newlines.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in text.split('\n') {
        if raw.is_empty() {
            lines.push(String::new());
            continue;
        }
        let mut current = String::new();
        for word in raw.split_whitespace() {
            let word_len = word.chars().count();
            let current_len = current.chars().count();
            if current.is_empty() {
                current = word.to_owned();
            } else if current_len.saturating_add(1).saturating_add(word_len) <= width {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current));
                current = word.to_owned();
            }
        }
        lines.push(current);
    }
    lines
}
