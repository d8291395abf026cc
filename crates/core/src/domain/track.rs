//! Tracks and the file import policy
//!
//! A track is one sound on the board: a name, the sound data, and an
//! optional hotkey.

use crate::domain::hotkey::KeyCode;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument};

/// Unique identifier for a track
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    const ALPHABET: &'static [u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh id: an underscore followed by nine base-36 characters
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..9)
            .map(|_| Self::ALPHABET[rng.gen_range(0..Self::ALPHABET.len())] as char)
            .collect();
        Self(format!("_{}", suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where a track's sound data lives
#[derive(Clone)]
pub enum TrackSource {
    /// Encoded file on disk
    File(PathBuf),
    /// Encoded file contents held in memory
    Memory(Arc<[u8]>),
}

impl fmt::Debug for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackSource::File(path) => f.debug_tuple("File").field(path).finish(),
            TrackSource::Memory(bytes) => write!(f, "Memory({} bytes)", bytes.len()),
        }
    }
}

/// A sound on the board
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub source: TrackSource,
    pub keycode: Option<KeyCode>,
}

impl Track {
    pub fn new(id: TrackId, name: impl Into<String>, source: TrackSource) -> Self {
        Self {
            id,
            name: name.into(),
            source,
            keycode: None,
        }
    }

    pub fn with_keycode(mut self, keycode: KeyCode) -> Self {
        self.keycode = Some(keycode);
        self
    }

    /// Lowercased file extension of the track name, used as a decoder hint
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.name)
    }
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Errors raised while importing a sound file
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Must upload a file of type: {allowed}")]
    UnsupportedExtension { allowed: String },

    #[error("File size must be less than {max_mb} MB.")]
    TooLarge { max_mb: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which files may become tracks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPolicy {
    pub extensions: Vec<String>,
    pub max_size_mb: u64,
}

impl Default for ImportPolicy {
    fn default() -> Self {
        Self {
            extensions: vec!["wav".to_string(), "mp3".to_string(), "ogg".to_string()],
            max_size_mb: 20,
        }
    }
}

impl ImportPolicy {
    pub fn max_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1_000_000)
    }

    /// Check a file name and size against the policy
    pub fn validate(&self, file_name: &str, size: u64) -> Result<(), ImportError> {
        if !self.extensions.is_empty() {
            let ext = extension_of(file_name).unwrap_or_default();
            let allowed = self.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext));
            if !allowed {
                return Err(ImportError::UnsupportedExtension {
                    allowed: self.extensions.join(" or "),
                });
            }
        }

        if size > self.max_bytes() {
            return Err(ImportError::TooLarge {
                max_mb: self.max_size_mb,
            });
        }

        Ok(())
    }
}

/// Turns files on disk into in-memory tracks
#[derive(Debug, Clone, Default)]
pub struct TrackImporter {
    policy: ImportPolicy,
}

impl TrackImporter {
    pub fn new(policy: ImportPolicy) -> Self {
        Self { policy }
    }

    /// Validate and load a sound file.
    ///
    /// The file contents are copied into memory so the track keeps working
    /// if the original file moves.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn import<P: AsRef<Path>>(&self, path: P) -> Result<Track, ImportError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let size = fs::metadata(path).await?.len();
        self.policy.validate(&name, size)?;

        let bytes = fs::read(path).await?;
        debug!(bytes = bytes.len(), "Read sound file");

        let track = Track::new(TrackId::generate(), name, TrackSource::Memory(bytes.into()));
        info!(id = %track.id, name = %track.name, "Imported track");
        Ok(track)
    }
}
