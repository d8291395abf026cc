//! Saving the session between runs
//!
//! Track metadata, the output assignment and the stop key go to the TOML
//! config. Each track's encoded sound data is copied into a `tracks/`
//! directory next to it, one file per track id.

use crate::domain::config::{ConfigManager, Result, SoundboardConfig, TrackConfig};
use crate::domain::session::{Change, SessionUpdate};
use crate::domain::track::{Track, TrackId, TrackSource};
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

/// Directory of persisted track payloads
#[derive(Debug, Clone)]
pub struct TrackStore {
    dir: PathBuf,
}

impl TrackStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// The store that lives beside a config manager's file
    pub fn beside(manager: &ConfigManager) -> Self {
        Self::new(manager.config_dir().join("tracks"))
    }

    pub fn path(&self, id: &TrackId) -> PathBuf {
        self.dir.join(id.as_str())
    }

    /// Persist a track's sound data
    #[instrument(skip(self, track), fields(id = %track.id))]
    pub async fn save(&self, track: &Track) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let target = self.path(&track.id);

        match &track.source {
            TrackSource::Memory(bytes) => fs::write(&target, bytes).await?,
            TrackSource::File(path) if path == &target => {}
            TrackSource::File(path) => {
                fs::copy(path, &target).await?;
            }
        }

        debug!(path = %target.display(), "Stored track payload");
        Ok(target)
    }

    /// Delete a track's sound data. Missing data is not an error.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: &TrackId) -> Result<()> {
        match fs::remove_file(self.path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rebuild tracks from their persisted metadata.
    ///
    /// Entries whose payload has gone missing are skipped.
    pub fn load_tracks(&self, configs: &[TrackConfig]) -> Vec<Track> {
        configs
            .iter()
            .filter_map(|config| {
                let path = self.path(&config.id);
                if !path.is_file() {
                    warn!(
                        id = %config.id,
                        name = %config.name,
                        path = %path.display(),
                        "Track data missing, skipping"
                    );
                    return None;
                }

                let mut track = Track::new(config.id.clone(), config.name.clone(), TrackSource::File(path));
                track.keycode = config.keycode;
                Some(track)
            })
            .collect()
    }
}

/// Writes session changes back to disk
pub struct Persister {
    manager: ConfigManager,
    store: TrackStore,
    config: SoundboardConfig,
}

impl Persister {
    pub fn new(manager: ConfigManager, store: TrackStore, config: SoundboardConfig) -> Self {
        Self {
            manager,
            store,
            config,
        }
    }

    pub fn config(&self) -> &SoundboardConfig {
        &self.config
    }

    /// Save whatever `update` changed
    pub async fn apply(&mut self, update: &SessionUpdate) -> Result<()> {
        match &update.change {
            Change::TrackAdded(track) => {
                self.store.save(track).await?;
            }
            Change::TrackRemoved(id) => self.store.remove(id).await?,
            change if !change.is_persistent() => return Ok(()),
            _ => {}
        }

        self.config.update_from(&update.snapshot);
        self.manager.save(&self.config).await
    }

    /// Follow a session journal until it closes, saving after every change
    pub async fn run(mut self, mut updates: mpsc::UnboundedReceiver<SessionUpdate>) {
        info!(path = %self.manager.config_path().display(), "Persisting session changes");

        while let Some(update) = updates.recv().await {
            if let Err(e) = self.apply(&update).await {
                error!(error = %e, change = ?update.change, "Failed to persist change");
            }
        }

        debug!("Persister stopped");
    }
}
