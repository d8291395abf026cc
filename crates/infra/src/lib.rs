//! Platform backends for the soundboard: cpal output devices, symphonia
//! decoding, and the global keyboard hook.

pub mod audio;
pub mod input;
