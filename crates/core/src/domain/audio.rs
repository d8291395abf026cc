//! Audio device abstractions and domain models
//!
//! This module defines the core audio interfaces that are platform-agnostic.
//! Implementations for specific platforms (WASAPI, ALSA, CoreAudio) live in
//! the `infra` crate.

use crate::domain::device::OutputSlot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error)]
pub enum AudioError {
    /// Requested audio device was not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Error in audio stream creation or processing
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Input/Output error at the OS level
    #[error("OS error: {0}")]
    OsError(String),

    /// Device does not support the requested configuration
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Sound data could not be decoded
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Output slot has no device assigned yet
    #[error("No device assigned to {0}")]
    SlotUnassigned(OutputSlot),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Unique identifier for an audio device
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Type of audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Input,
    Output,
    Duplex,
}

impl DeviceType {
    /// Whether audio can be played through a device of this type
    pub fn is_output(&self) -> bool {
        matches!(self, DeviceType::Output | DeviceType::Duplex)
    }
}

/// Snapshot of an audio endpoint as reported by the OS
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub label: String,
    pub device_type: DeviceType,
}

impl DeviceInfo {
    pub fn new(id: impl Into<String>, label: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            id: DeviceId::new(id),
            label: label.into(),
            device_type,
        }
    }

    /// Shorthand for an output-capable endpoint
    pub fn output(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(id, label, DeviceType::Output)
    }
}

/// Trait for enumerating available audio devices
///
/// Enumeration may block on the OS, so implementations are asynchronous.
#[async_trait::async_trait]
pub trait AudioEnumerator: Send + Sync {
    /// List every audio endpoint, regardless of direction
    async fn devices(&self) -> Result<Vec<DeviceInfo>>;

    /// The device the OS designates as default output, if any
    async fn default_output_device(&self) -> Result<Option<DeviceId>>;
}

/// Fully decoded sound, interleaved f32 samples
///
/// Samples are shared so the same decode can feed both output slots.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl DecodedAudio {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }
}
