//! Platform-specific audio backend implementations using CPAL
//!
//! CPAL abstracts the platform audio APIs:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio

pub mod cpal_backend;
pub mod decoder;
pub mod stream;
pub mod watcher;

pub use cpal_backend::*;
pub use decoder::*;
pub use stream::*;
pub use watcher::*;
