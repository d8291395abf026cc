//! Domain entities and business rules

pub mod audio;
pub mod config;
pub mod device;
pub mod hotkey;
pub mod persistence;
pub mod playback;
pub mod session;
pub mod track;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{AudioEnumerator, AudioError, DecodedAudio, DeviceId, DeviceInfo, DeviceType};
pub use config::{AppConfig, ConfigError, ConfigManager, SoundboardConfig, TrackConfig};
pub use device::{list_output_devices, resolve_defaults, DeviceMap, OutputAssignment, OutputSlot};
pub use hotkey::{BindingState, BindingTable, KeyAction, KeyCode, KeyEvent};
pub use persistence::{Persister, TrackStore};
pub use playback::{AudioDecoder, AudioSink, Multiplexer, PlayReport, PlaybackInstance, SlotOutcome};
pub use session::{
    Change, Command, InitialState, Session, SessionError, SessionParts, SessionSnapshot,
    SessionUpdate, TrackSummary,
};
pub use track::{ImportError, ImportPolicy, Track, TrackId, TrackImporter, TrackSource};
