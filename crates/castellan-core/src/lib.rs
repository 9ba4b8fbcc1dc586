//! Castellan Core - shared device primitives.
//!
//! This crate provides the building blocks the Castellan UI layers are
//! assembled from:
//!
//! - [`display`]: a character-cell frame buffer with background
//!   snapshot/restore, the [`display::DisplayBackend`] seam to a physical
//!   surface, and the shared busy/progress overlay state.
//! - [`input`]: the device's key alphabet and the non-blocking
//!   [`input::KeySource`] seam to a keypad.
//! - [`ux`]: the UI navigation stack and full-screen [`ux::Story`] prompts.
//! - [`fmt`]: compact human-readable duration formatting.
//!
//! Everything here is frontend-agnostic: the device firmware and the host
//! simulator both drive these types, they only differ in which backend and
//! key source they plug in.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod display;
pub mod fmt;
pub mod input;
pub mod ux;

pub use display::{
    Background, BusyHandle, BusyOverlay, DisplayBackend, DisplayError, FailingBackend, FrameBuffer,
    NullBackend, Screen, SCREEN_HEIGHT, SCREEN_WIDTH,
};
pub use input::{Key, KeySource, ScriptedKeys};
pub use ux::{Story, UxStack};
