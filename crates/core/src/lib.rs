//! Soundboard core: output routing and hotkey dispatch
//!
//! Platform-agnostic domain model. Implementations that talk to the OS
//! (cpal, symphonia, rdev) live in the `infra` crate.

pub mod domain;
