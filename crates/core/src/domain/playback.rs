//! Playback multiplexer
//!
//! Plays one decoded sound through both output slots at once. Each slot gets
//! its own playback instance bound to that slot's device; binding is
//! asynchronous and must finish before the instance can start.

use crate::domain::audio::{AudioError, DecodedAudio, DeviceId, Result};
use crate::domain::device::{OutputAssignment, OutputSlot};
use crate::domain::track::TrackSource;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Decodes track data into PCM
#[async_trait::async_trait]
pub trait AudioDecoder: Send + Sync {
    /// Decode the whole sound. `extension` is a container hint such as "mp3".
    async fn decode(&self, source: &TrackSource, extension: Option<&str>) -> Result<DecodedAudio>;
}

/// Opens playback instances on specific output devices
#[async_trait::async_trait]
pub trait AudioSink: Send + Sync {
    /// Bind a new instance to `device`. Fails if the device is gone.
    async fn bind(&self, device: &DeviceId) -> Result<Box<dyn PlaybackInstance>>;
}

/// One sound playing on one device
pub trait PlaybackInstance: Send {
    fn start(&mut self, audio: Arc<DecodedAudio>) -> Result<()>;

    fn stop(&mut self);

    /// The sound reached its end (or the device went away)
    fn is_finished(&self) -> bool;
}

/// What happened on one slot during a `play`
#[derive(Debug)]
pub enum SlotOutcome {
    Started,
    /// `stop_all` ran while the device was being bound
    Cancelled,
    Failed(AudioError),
}

impl SlotOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, SlotOutcome::Started)
    }
}

/// Per-slot result of a `play` call
#[derive(Debug)]
pub struct PlayReport {
    pub slot1: SlotOutcome,
    pub slot2: SlotOutcome,
}

impl PlayReport {
    pub fn get(&self, slot: OutputSlot) -> &SlotOutcome {
        match slot {
            OutputSlot::Slot1 => &self.slot1,
            OutputSlot::Slot2 => &self.slot2,
        }
    }

    pub fn started(&self) -> usize {
        OutputSlot::ALL
            .iter()
            .filter(|slot| self.get(**slot).is_started())
            .count()
    }
}

struct ActiveInstance {
    slot: OutputSlot,
    device: DeviceId,
    instance: Box<dyn PlaybackInstance>,
}

/// Routes sounds to both output slots and tracks what is playing
///
/// Calls are not serialized: every `play` layers a new pair of instances on
/// top of whatever is still playing until `stop_all` clears them. Each
/// `stop_all` bumps a generation counter; a bind that completes after a
/// `stop_all` issued during it is dropped instead of started.
pub struct Multiplexer {
    sink: Arc<dyn AudioSink>,
    active: Mutex<Vec<ActiveInstance>>,
    generation: AtomicU64,
}

impl Multiplexer {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            sink,
            active: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, Vec<ActiveInstance>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Play `audio` on both slots of `assignment`.
    ///
    /// The assignment is taken by value; later reassignments do not affect a
    /// play already in progress. A failure on one slot leaves the other one
    /// playing.
    pub async fn play(&self, audio: Arc<DecodedAudio>, assignment: OutputAssignment) -> PlayReport {
        self.play_at(self.generation(), audio, assignment).await
    }

    /// Current stop generation, incremented by every `stop_all`
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Like `play`, but treats any `stop_all` since `generation` as a cancel.
    ///
    /// Callers that do slow work (decoding) before playing capture the
    /// generation when the request is made.
    pub async fn play_at(
        &self,
        generation: u64,
        audio: Arc<DecodedAudio>,
        assignment: OutputAssignment,
    ) -> PlayReport {
        let (bound1, bound2) = tokio::join!(
            self.bind_slot(OutputSlot::Slot1, assignment.slot1),
            self.bind_slot(OutputSlot::Slot2, assignment.slot2),
        );

        // Both starts are issued under one lock, with no blocking work between them
        let mut active = self.lock_active();
        active.retain(|a| !a.instance.is_finished());

        let current = self.generation();
        let mut start = |slot: OutputSlot, bound: Result<(DeviceId, Box<dyn PlaybackInstance>)>| {
            let (device, mut instance) = match bound {
                Ok(bound) => bound,
                Err(e) => {
                    warn!(%slot, error = %e, "Could not bind output device");
                    return SlotOutcome::Failed(e);
                }
            };

            if current != generation {
                debug!(%slot, device = %device, "Playback stopped while binding, discarding");
                return SlotOutcome::Cancelled;
            }

            match instance.start(audio.clone()) {
                Ok(()) => {
                    active.push(ActiveInstance {
                        slot,
                        device,
                        instance,
                    });
                    SlotOutcome::Started
                }
                Err(e) => {
                    warn!(%slot, device = %device, error = %e, "Could not start playback");
                    SlotOutcome::Failed(e)
                }
            }
        };

        let report = PlayReport {
            slot1: start(OutputSlot::Slot1, bound1),
            slot2: start(OutputSlot::Slot2, bound2),
        };
        debug!(started = report.started(), playing = active.len(), "Play dispatched");
        report
    }

    async fn bind_slot(
        &self,
        slot: OutputSlot,
        device: Option<DeviceId>,
    ) -> Result<(DeviceId, Box<dyn PlaybackInstance>)> {
        let device = device.ok_or(AudioError::SlotUnassigned(slot))?;
        let instance = self.sink.bind(&device).await?;
        Ok((device, instance))
    }

    /// Stop everything that is playing. Returns how many instances were stopped.
    pub fn stop_all(&self) -> usize {
        let mut active = self.lock_active();
        self.generation.fetch_add(1, Ordering::SeqCst);

        let count = active.len();
        for mut playing in active.drain(..) {
            playing.instance.stop();
            debug!(slot = %playing.slot, device = %playing.device, "Stopped instance");
        }

        if count > 0 {
            info!(count, "Stopped all playback");
        }
        count
    }

    /// Number of instances that are still playing
    pub fn active_count(&self) -> usize {
        let mut active = self.lock_active();
        active.retain(|a| !a.instance.is_finished());
        active.len()
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.stop_all();
    }
}
