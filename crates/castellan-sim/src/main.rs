//! Host simulator for the Castellan HSM mode.
//!
//! Stands in for the device: the terminal plays the OLED and keypad, a
//! local file plays the transport's transfer buffer. Useful for walking
//! the whole approval-and-lockdown workflow without hardware.
//!
//! Keys: digits as themselves, Enter/`y` = confirm, Esc/`x` = cancel,
//! Ctrl+C = the abort signal (watch lockdown eat it), Ctrl+Q = host-side
//! exit from the lockdown loop.

use std::io::{self, Stdout, Write as _};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use castellan_core::{
    DisplayBackend, DisplayError, FrameBuffer, Key, KeySource, Screen, SCREEN_HEIGHT,
};
use castellan_hsm::{
    start_approval, FlowEvent, LocalAuth, LockdownUx, PolicyOrigin, Session, UxEntry,
};
use castellan_policy::{PolicySource, POLICY_FNAME};
use clap::Parser;
use crossterm::event::{Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType};
use crossterm::{cursor, event, queue, style};
use tracing::info;

/// Simulate the Castellan HSM approval and lockdown workflow.
#[derive(Debug, Parser)]
struct Args {
    /// Read the proposed policy from this file, as if it arrived in the
    /// transfer buffer (a fresh proposal).
    #[arg(long, conflicts_with = "policy")]
    transfer: Option<PathBuf>,

    /// Read the previously approved policy from this file.
    #[arg(long, default_value = POLICY_FNAME)]
    policy: PathBuf,

    /// Pretend the transport triggered the approval (destructive insert,
    /// load errors propagate instead of rendering).
    #[arg(long)]
    usb: bool,
}

/// Paints the frame buffer into the terminal.
struct TerminalBackend {
    out: Stdout,
}

impl DisplayBackend for TerminalBackend {
    fn flush(&mut self, fb: &FrameBuffer) -> Result<(), DisplayError> {
        let mut draw = || -> io::Result<()> {
            queue!(self.out, Clear(ClearType::All), cursor::Hide)?;
            for y in 0..SCREEN_HEIGHT {
                #[allow(clippy::cast_possible_truncation)]
                queue!(self.out, cursor::MoveTo(0, y as u16), style::Print(fb.row(y)))?;
            }
            self.out.flush()
        };
        draw().map_err(|e| DisplayError::Flush(e.to_string()))
    }
}

/// Maps terminal key events onto the device key alphabet.
struct TerminalKeys {
    restart: Option<Arc<AtomicBool>>,
}

impl TerminalKeys {
    fn new() -> Self {
        Self { restart: None }
    }

    /// Wire up the lockdown loop's host-side escape flag (Ctrl+Q).
    fn set_restart(&mut self, flag: Arc<AtomicBool>) {
        self.restart = Some(flag);
    }
}

impl KeySource for TerminalKeys {
    fn try_key(&mut self) -> Option<Key> {
        while event::poll(Duration::ZERO).unwrap_or(false) {
            let Ok(Event::Key(key)) = event::read() else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
            match key.code {
                KeyCode::Char('q') if ctrl => {
                    if let Some(flag) = &self.restart {
                        flag.store(true, Ordering::Relaxed);
                    }
                    return Some(Key::Cancel);
                },
                KeyCode::Char('c') if ctrl => return Some(Key::Abort),
                KeyCode::Char(ch) if ch.is_ascii_digit() => return Key::digit(ch),
                KeyCode::Char('y') | KeyCode::Enter => return Some(Key::Confirm),
                KeyCode::Char('x') | KeyCode::Esc => return Some(Key::Cancel),
                _ => {},
            }
        }
        None
    }
}

/// [`LocalAuth`] that just narrates submissions to the log.
struct SimAuth;

impl LocalAuth for SimAuth {
    fn local_pin_entered(&mut self, digits: &str) {
        info!(len = digits.len(), "local PIN handed to auth subsystem");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let transfer_bytes = match &args.transfer {
        Some(path) => Some(
            std::fs::read(path)
                .with_context(|| format!("reading transfer file {}", path.display()))?,
        ),
        None => None,
    };

    enable_raw_mode().context("entering raw mode")?;
    let result = run(&args, transfer_bytes.as_deref()).await;
    disable_raw_mode().context("leaving raw mode")?;
    println!();
    result
}

async fn run(args: &Args, transfer: Option<&[u8]>) -> anyhow::Result<()> {
    let screen = Screen::new(Box::new(TerminalBackend { out: io::stdout() }));
    let mut session = Session::new(screen, Box::new(SimAuth));
    let mut keys = TerminalKeys::new();

    let source = match transfer {
        Some(bytes) => PolicySource::Transfer(bytes),
        None => PolicySource::Persisted(&args.policy),
    };
    let origin = if args.usb {
        PolicyOrigin::Transport
    } else {
        PolicyOrigin::Menu
    };

    let started = start_approval(&mut session, source, origin)?;
    if started.is_none() {
        // Load failure already on screen; any key dismisses.
        wait_for_any_key(&mut keys).await;
        return Ok(());
    }

    // Drive the approval conversation until it resolves.
    session.service(None);
    while session.has_active() {
        match keys.try_key() {
            Some(Key::Abort) => session.service(Some(FlowEvent::Interrupted)),
            Some(key) => session.service(Some(FlowEvent::Key(key))),
            None => tokio::time::sleep(Duration::from_millis(25)).await,
        }
    }

    if session.ux.top() == Some(&UxEntry::Lockdown) {
        let mut lockdown = LockdownUx::new();
        keys.set_restart(lockdown.restart_flag());
        lockdown.run(&mut session, &mut keys).await;
        info!("left lockdown via host escape");
    } else {
        info!("policy refused, back to the menu");
    }

    Ok(())
}

async fn wait_for_any_key(keys: &mut TerminalKeys) {
    loop {
        if keys.try_key().is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
