//! Global keyboard input
//!
//! Key presses are captured with rdev regardless of which window has focus
//! and translated to the key numbering stored in the config.

pub mod hook;
pub mod keymap;

pub use hook::*;
pub use keymap::*;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, InputError>;

/// Errors raised by the global key hook
#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to start key hook thread: {0}")]
    Spawn(#[from] std::io::Error),
}
