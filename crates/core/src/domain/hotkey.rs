//! Hotkey binding table
//!
//! Translates global key presses into playback, stop, or the completion of
//! an interactive rebind. The table is pure data: registering the OS-level
//! hook is the input collaborator's job.

use crate::domain::track::{Track, TrackId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Key code in libuiohook numbering (Escape = 1, A = 30, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyCode(u16);

impl KeyCode {
    pub const ESCAPE: KeyCode = KeyCode(0x0001);

    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key-down notification from the global hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub raw_code: u32,
}

impl KeyEvent {
    pub fn new(code: KeyCode) -> Self {
        Self {
            code,
            raw_code: code.value() as u32,
        }
    }
}

/// Rebind state machine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BindingState {
    #[default]
    Idle,
    /// The next key press becomes this track's hotkey
    ListeningForTrackKey(TrackId),
    /// The next key press becomes the stop key
    ListeningForStopKey,
}

/// What a key press resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    Play(TrackId),
    StopAll,
    TrackKeyAssigned {
        track: TrackId,
        key: Option<KeyCode>,
    },
    StopKeyAssigned(Option<KeyCode>),
    Ignored,
}

/// Key bindings for tracks and the stop action
#[derive(Debug, Clone)]
pub struct BindingTable {
    state: BindingState,
    stop_key: Option<KeyCode>,
    escape: KeyCode,
}

impl Default for BindingTable {
    fn default() -> Self {
        Self::new(None)
    }
}

impl BindingTable {
    pub fn new(stop_key: Option<KeyCode>) -> Self {
        Self {
            state: BindingState::Idle,
            stop_key,
            escape: KeyCode::ESCAPE,
        }
    }

    /// Override the key that cancels a rebind
    pub fn with_escape(mut self, escape: KeyCode) -> Self {
        self.escape = escape;
        self
    }

    pub fn state(&self) -> &BindingState {
        &self.state
    }

    pub fn stop_key(&self) -> Option<KeyCode> {
        self.stop_key
    }

    pub fn is_listening(&self) -> bool {
        self.state != BindingState::Idle
    }

    /// Track currently being rebound, if any
    pub fn changing(&self) -> Option<&TrackId> {
        match &self.state {
            BindingState::ListeningForTrackKey(id) => Some(id),
            _ => None,
        }
    }

    /// Capture the next key press for `track`. Replaces any pending rebind.
    pub fn listen_for_track_key(&mut self, track: TrackId) {
        debug!(track = %track, "Listening for track key");
        self.state = BindingState::ListeningForTrackKey(track);
    }

    /// Capture the next key press as the stop key. Replaces any pending rebind.
    pub fn listen_for_stop_key(&mut self) {
        debug!("Listening for stop key");
        self.state = BindingState::ListeningForStopKey;
    }

    /// Abandon a pending rebind without changing any binding
    pub fn cancel(&mut self) {
        self.state = BindingState::Idle;
    }

    /// Process one key press.
    ///
    /// While a rebind is pending the press is consumed by it and nothing is
    /// dispatched. Track keys may be shared between tracks (the last write
    /// wins); in that case the first matching track in list order plays.
    pub fn handle_key(&mut self, event: &KeyEvent, tracks: &mut [Track]) -> KeyAction {
        match std::mem::take(&mut self.state) {
            BindingState::Idle => self.dispatch(event.code, tracks),
            BindingState::ListeningForTrackKey(target) => {
                self.assign_track_key(target, event.code, tracks)
            }
            BindingState::ListeningForStopKey => self.assign_stop_key(event.code),
        }
    }

    fn dispatch(&self, code: KeyCode, tracks: &[Track]) -> KeyAction {
        if self.stop_key == Some(code) {
            return KeyAction::StopAll;
        }

        match tracks.iter().find(|t| t.keycode == Some(code)) {
            Some(track) => KeyAction::Play(track.id.clone()),
            None => KeyAction::Ignored,
        }
    }

    fn assign_track_key(&self, target: TrackId, code: KeyCode, tracks: &mut [Track]) -> KeyAction {
        let key = if code == self.escape || self.stop_key == Some(code) {
            None
        } else {
            Some(code)
        };

        if let Some(key) = key {
            if let Some(other) = tracks.iter().find(|t| t.id != target && t.keycode == Some(key)) {
                warn!(
                    key = %key,
                    track = %target,
                    shared_with = %other.id,
                    "Key is already bound to another track"
                );
            }
        }

        match tracks.iter_mut().find(|t| t.id == target) {
            Some(track) => {
                track.keycode = key;
                info!(track = %target, key = ?key.map(|k| k.value()), "Track key assigned");
                KeyAction::TrackKeyAssigned { track: target, key }
            }
            None => {
                debug!(track = %target, "Rebind target no longer exists");
                KeyAction::Ignored
            }
        }
    }

    fn assign_stop_key(&mut self, code: KeyCode) -> KeyAction {
        self.stop_key = if code == self.escape { None } else { Some(code) };
        info!(key = ?self.stop_key.map(|k| k.value()), "Stop key assigned");
        KeyAction::StopKeyAssigned(self.stop_key)
    }
}
