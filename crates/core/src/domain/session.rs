//! Session controller
//!
//! Owns the soundboard state (devices, output assignment, tracks, bindings)
//! and is the only place it changes. Every mutation is broadcast as a
//! [`SessionUpdate`] so persistence and front ends can follow along.
//!
//! Events are handled one at a time: [`Session::run`] drains key presses,
//! device-change notifications and commands from a single loop. Playback runs
//! in background tasks so a slow decode never holds up the next key press.

use crate::domain::audio::{AudioEnumerator, AudioError, DeviceId};
use crate::domain::device::{
    list_output_devices, resolve_defaults, DeviceMap, OutputAssignment, OutputSlot,
};
use crate::domain::hotkey::{BindingState, BindingTable, KeyAction, KeyCode, KeyEvent};
use crate::domain::playback::{AudioDecoder, AudioSink, Multiplexer, PlayReport};
use crate::domain::track::{Track, TrackId};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub type Result<T> = std::result::Result<T, SessionError>;

/// Result of one background playback: the track and its per-slot report
pub type PlaybackResult = (TrackId, std::result::Result<PlayReport, AudioError>);

const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Errors raised by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Track not found: {0}")]
    TrackNotFound(TrackId),

    #[error("Track already exists: {0}")]
    DuplicateTrack(TrackId),

    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),

    #[error(transparent)]
    Audio(#[from] AudioError),
}

/// Platform collaborators a session drives
#[derive(Clone)]
pub struct SessionParts {
    pub enumerator: Arc<dyn AudioEnumerator>,
    pub decoder: Arc<dyn AudioDecoder>,
    pub sink: Arc<dyn AudioSink>,
}

/// State restored from persistence at startup
#[derive(Debug, Clone)]
pub struct InitialState {
    pub assignment: OutputAssignment,
    pub tracks: Vec<Track>,
    pub stop_key: Option<KeyCode>,
    pub escape: KeyCode,
}

impl Default for InitialState {
    fn default() -> Self {
        Self {
            assignment: OutputAssignment::default(),
            tracks: Vec::new(),
            stop_key: None,
            escape: KeyCode::ESCAPE,
        }
    }
}

/// Track metadata without its sound data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSummary {
    pub id: TrackId,
    pub name: String,
    pub keycode: Option<KeyCode>,
}

impl From<&Track> for TrackSummary {
    fn from(track: &Track) -> Self {
        Self {
            id: track.id.clone(),
            name: track.name.clone(),
            keycode: track.keycode,
        }
    }
}

/// Read-only view of the session
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub devices: DeviceMap,
    pub assignment: OutputAssignment,
    pub tracks: Vec<TrackSummary>,
    pub stop_key: Option<KeyCode>,
    pub binding: BindingState,
}

/// What a session mutation changed
#[derive(Debug, Clone)]
pub enum Change {
    DevicesChanged,
    AssignmentChanged,
    TrackAdded(Track),
    TrackRemoved(TrackId),
    TrackKeyChanged {
        track: TrackId,
        key: Option<KeyCode>,
    },
    StopKeyChanged(Option<KeyCode>),
    BindingChanged,
}

impl Change {
    /// Whether the change touches state that outlives the session
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Change::DevicesChanged | Change::BindingChanged)
    }
}

/// Notification emitted after every mutation
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub change: Change,
    pub snapshot: SessionSnapshot,
}

/// Requests a front end can queue for the session loop
#[derive(Debug)]
pub enum Command {
    Play(TrackId),
    StopAll,
    RebindTrack(TrackId),
    RebindStop,
    CancelRebind,
    SelectOutput { slot: OutputSlot, device: DeviceId },
    AddTrack(Track),
    RemoveTrack(TrackId),
    RefreshDevices,
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Quit,
}

/// The soundboard session
pub struct Session {
    enumerator: Arc<dyn AudioEnumerator>,
    decoder: Arc<dyn AudioDecoder>,
    multiplexer: Arc<Multiplexer>,
    devices: DeviceMap,
    assignment: OutputAssignment,
    tracks: Vec<Track>,
    bindings: BindingTable,
    updates: broadcast::Sender<SessionUpdate>,
    journals: Vec<mpsc::UnboundedSender<SessionUpdate>>,
    playing: JoinSet<PlaybackResult>,
}

impl Session {
    pub fn new(parts: SessionParts, initial: InitialState) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        info!(
            tracks = initial.tracks.len(),
            stop_key = ?initial.stop_key.map(|k| k.value()),
            "Starting soundboard session"
        );

        Self {
            enumerator: parts.enumerator,
            decoder: parts.decoder,
            multiplexer: Arc::new(Multiplexer::new(parts.sink)),
            devices: DeviceMap::new(),
            assignment: initial.assignment,
            tracks: initial.tracks,
            bindings: BindingTable::new(initial.stop_key).with_escape(initial.escape),
            updates,
            journals: Vec::new(),
            playing: JoinSet::new(),
        }
    }

    /// Follow changes made to the session.
    ///
    /// Slow receivers skip updates once they fall behind. Use
    /// [`Session::journal`] where every update matters.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// Receive every change made to the session, in order, without loss.
    ///
    /// The receiver closes when the session is dropped.
    pub fn journal(&mut self) -> mpsc::UnboundedReceiver<SessionUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.journals.push(tx);
        rx
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            devices: self.devices.clone(),
            assignment: self.assignment.clone(),
            tracks: self.tracks.iter().map(TrackSummary::from).collect(),
            stop_key: self.bindings.stop_key(),
            binding: self.bindings.state().clone(),
        }
    }

    pub fn devices(&self) -> &DeviceMap {
        &self.devices
    }

    pub fn assignment(&self) -> &OutputAssignment {
        &self.assignment
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// Instances currently producing sound
    pub fn playing_count(&self) -> usize {
        self.multiplexer.active_count()
    }

    fn notify(&mut self, change: Change) {
        debug!(?change, "Session changed");
        let update = SessionUpdate {
            change,
            snapshot: self.snapshot(),
        };

        self.journals.retain(|journal| journal.send(update.clone()).is_ok());
        // Nobody listening is fine
        let _ = self.updates.send(update);
    }

    fn track_index(&self, id: &TrackId) -> Result<usize> {
        self.tracks
            .iter()
            .position(|t| &t.id == id)
            .ok_or_else(|| SessionError::TrackNotFound(id.clone()))
    }

    /// Re-enumerate devices and re-resolve the output assignment.
    ///
    /// On failure the previous device map and assignment stay in place.
    pub async fn refresh_devices(&mut self) -> Result<&OutputAssignment> {
        let devices = match list_output_devices(self.enumerator.as_ref()).await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "Device enumeration failed, keeping last known devices");
                return Err(e.into());
            }
        };

        if devices != self.devices {
            self.devices = devices;
            self.notify(Change::DevicesChanged);
        }

        let resolved = resolve_defaults(&self.devices, &self.assignment);
        if resolved != self.assignment {
            self.assignment = resolved;
            self.notify(Change::AssignmentChanged);
        }

        Ok(&self.assignment)
    }

    /// Explicitly route `slot` to `device`.
    ///
    /// The same device may back both slots.
    pub fn select_output(&mut self, slot: OutputSlot, device: DeviceId) -> Result<()> {
        if !self.devices.contains(&device) {
            return Err(SessionError::DeviceNotFound(device));
        }

        if self.assignment.get(slot) != Some(&device) {
            info!(%slot, device = %device, "Output selected");
            self.assignment.set(slot, Some(device));
            self.notify(Change::AssignmentChanged);
        }
        Ok(())
    }

    pub fn add_track(&mut self, track: Track) -> Result<()> {
        if self.tracks.iter().any(|t| t.id == track.id) {
            return Err(SessionError::DuplicateTrack(track.id));
        }

        info!(id = %track.id, name = %track.name, "Track added");
        self.tracks.push(track.clone());
        self.notify(Change::TrackAdded(track));
        Ok(())
    }

    /// Delete a track. All playback is stopped first.
    pub fn remove_track(&mut self, id: &TrackId) -> Result<Track> {
        let index = self.track_index(id)?;
        self.stop_all();

        if self.bindings.changing() == Some(id) {
            self.bindings.cancel();
            self.notify(Change::BindingChanged);
        }

        let track = self.tracks.remove(index);
        info!(id = %track.id, name = %track.name, "Track removed");
        self.notify(Change::TrackRemoved(track.id.clone()));
        Ok(track)
    }

    /// Capture the next key press as `id`'s hotkey
    pub fn begin_track_rebind(&mut self, id: &TrackId) -> Result<()> {
        self.track_index(id)?;
        self.bindings.listen_for_track_key(id.clone());
        self.notify(Change::BindingChanged);
        Ok(())
    }

    /// Capture the next key press as the stop key
    pub fn begin_stop_rebind(&mut self) {
        self.bindings.listen_for_stop_key();
        self.notify(Change::BindingChanged);
    }

    pub fn cancel_rebind(&mut self) {
        if self.bindings.is_listening() {
            self.bindings.cancel();
            self.notify(Change::BindingChanged);
        }
    }

    /// Route one global key press
    pub fn handle_key(&mut self, event: KeyEvent) -> KeyAction {
        let was_listening = self.bindings.is_listening();
        let action = self.bindings.handle_key(&event, &mut self.tracks);
        debug!(code = event.code.value(), ?action, "Key handled");

        match &action {
            KeyAction::Play(id) => {
                if let Err(e) = self.play_track(id) {
                    warn!(track = %id, error = %e, "Could not play track");
                }
            }
            KeyAction::StopAll => {
                self.stop_all();
            }
            KeyAction::TrackKeyAssigned { track, key } => {
                self.notify(Change::TrackKeyChanged {
                    track: track.clone(),
                    key: *key,
                });
            }
            KeyAction::StopKeyAssigned(key) => {
                self.notify(Change::StopKeyChanged(*key));
            }
            KeyAction::Ignored if was_listening => {
                // rebind target was deleted while listening
                self.notify(Change::BindingChanged);
            }
            KeyAction::Ignored => {}
        }

        action
    }

    /// Start playing a track on both outputs.
    ///
    /// Returns as soon as the playback task is queued. Outcomes are collected
    /// with [`Session::next_playback`].
    pub fn play_track(&mut self, id: &TrackId) -> Result<()> {
        let track = &self.tracks[self.track_index(id)?];

        let id = track.id.clone();
        let source = track.source.clone();
        let extension = track.extension();
        let assignment = self.assignment.clone();
        let decoder = self.decoder.clone();
        let multiplexer = self.multiplexer.clone();
        let generation = multiplexer.generation();

        debug!(track = %id, "Queueing playback");
        self.playing.spawn(async move {
            let report = match decoder.decode(&source, extension.as_deref()).await {
                Ok(audio) => Ok(multiplexer
                    .play_at(generation, Arc::new(audio), assignment)
                    .await),
                Err(e) => Err(e),
            };
            (id, report)
        });
        Ok(())
    }

    /// Stop everything that is playing
    pub fn stop_all(&mut self) -> usize {
        self.multiplexer.stop_all()
    }

    /// Wait for the next queued playback to finish starting.
    ///
    /// Returns `None` when nothing is queued.
    pub async fn next_playback(&mut self) -> Option<PlaybackResult> {
        while let Some(joined) = self.playing.join_next().await {
            match joined {
                Ok(result) => {
                    log_playback(&result);
                    return Some(result);
                }
                Err(e) => error!(error = %e, "Playback task failed"),
            }
        }
        None
    }

    /// Wait for every queued playback
    pub async fn settle(&mut self) -> Vec<PlaybackResult> {
        let mut results = Vec::new();
        while let Some(result) = self.next_playback().await {
            results.push(result);
        }
        results
    }

    /// Apply one command. Returns `false` once the session should end.
    pub async fn execute(&mut self, command: Command) -> Result<bool> {
        match command {
            Command::Play(id) => self.play_track(&id)?,
            Command::StopAll => {
                self.stop_all();
            }
            Command::RebindTrack(id) => self.begin_track_rebind(&id)?,
            Command::RebindStop => self.begin_stop_rebind(),
            Command::CancelRebind => self.cancel_rebind(),
            Command::SelectOutput { slot, device } => self.select_output(slot, device)?,
            Command::AddTrack(track) => self.add_track(track)?,
            Command::RemoveTrack(id) => {
                self.remove_track(&id)?;
            }
            Command::RefreshDevices => {
                self.refresh_devices().await?;
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// Drive the session until a `Quit` command arrives or the command
    /// channel closes.
    ///
    /// Devices are enumerated once on entry and again after every
    /// notification on `device_changes`. All playback is stopped on exit.
    pub async fn run(
        mut self,
        mut keys: mpsc::UnboundedReceiver<KeyEvent>,
        mut device_changes: broadcast::Receiver<()>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        // failure is already logged and the empty map is kept
        let _ = self.refresh_devices().await;

        let mut keys_open = true;
        let mut watching = true;

        loop {
            tokio::select! {
                // key presses first, then device changes, then commands
                biased;

                event = keys.recv(), if keys_open => match event {
                    Some(event) => {
                        self.handle_key(event);
                    }
                    None => {
                        warn!("Global key hook closed");
                        keys_open = false;
                    }
                },
                changed = device_changes.recv(), if watching => match changed {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        let _ = self.refresh_devices().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("Device watcher closed");
                        watching = false;
                    }
                },
                command = commands.recv() => match command {
                    Some(command) => match self.execute(command).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => warn!(error = %e, "Command failed"),
                    },
                    None => break,
                },
                Some(joined) = self.playing.join_next(), if !self.playing.is_empty() => {
                    match joined {
                        Ok(result) => log_playback(&result),
                        Err(e) => error!(error = %e, "Playback task failed"),
                    }
                }
            }
        }

        info!("Ending soundboard session");
        self.stop_all();
        self.playing.shutdown().await;
    }
}

fn log_playback((track, result): &PlaybackResult) {
    match result {
        Ok(report) => debug!(track = %track, started = report.started(), "Playback started"),
        Err(e) => warn!(track = %track, error = %e, "Could not decode track"),
    }
}
