//! Configuration management for the soundboard
//!
//! This module provides:
//! - Application settings (import limits, device polling, escape key)
//! - The persisted soundboard state with TOML serialization
//! - `ConfigManager` for the config file in the user's config directory

use crate::domain::device::OutputAssignment;
use crate::domain::hotkey::KeyCode;
use crate::domain::session::SessionSnapshot;
use crate::domain::track::{ImportPolicy, TrackId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// File extensions accepted on import
    pub import_extensions: Vec<String>,

    /// Largest importable file in MB
    pub max_import_size_mb: u64,

    /// How often output devices are re-enumerated, in milliseconds
    pub device_poll_interval_ms: u64,

    /// Key that clears a binding while listening
    pub escape_key: KeyCode,
}

impl Default for AppConfig {
    fn default() -> Self {
        let policy = ImportPolicy::default();
        Self {
            import_extensions: policy.extensions,
            max_import_size_mb: policy.max_size_mb,
            device_poll_interval_ms: 2000,
            escape_key: KeyCode::ESCAPE,
        }
    }
}

impl AppConfig {
    pub fn import_policy(&self) -> ImportPolicy {
        ImportPolicy {
            extensions: self.import_extensions.clone(),
            max_size_mb: self.max_import_size_mb,
        }
    }

    pub fn device_poll_interval(&self) -> Duration {
        Duration::from_millis(self.device_poll_interval_ms.max(100))
    }
}

/// Persisted track metadata. The sound data lives in the track store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackConfig {
    pub id: TrackId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keycode: Option<KeyCode>,
}

/// Complete soundboard configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoundboardConfig {
    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub outputs: OutputAssignment,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_key: Option<KeyCode>,

    #[serde(default)]
    pub tracks: Vec<TrackConfig>,
}

impl SoundboardConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!(tracks = config.tracks.len(), "Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Create factory default configuration: no tracks, no stop key,
    /// both outputs left for default resolution.
    pub fn factory_default() -> Self {
        Self::default()
    }

    /// Reject configurations the session cannot start from
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for track in &self.tracks {
            if !seen.insert(&track.id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate track id {}",
                    track.id
                )));
            }
        }
        Ok(())
    }

    /// Copy the persistent parts of a session into this configuration
    pub fn update_from(&mut self, snapshot: &SessionSnapshot) {
        self.outputs = snapshot.assignment.clone();
        self.stop_key = snapshot.stop_key;
        self.tracks = snapshot
            .tracks
            .iter()
            .map(|t| TrackConfig {
                id: t.id.clone(),
                name: t.name.clone(),
                keycode: t.keycode,
            })
            .collect();
    }
}

/// Configuration manager for persistent config
///
/// Manages the main configuration file at `~/.config/soundboard/config.toml`.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager
    ///
    /// # Arguments
    /// * `config_dir` - Configuration directory path (e.g., `~/.config/soundboard`)
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");

        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/soundboard` on Linux,
    /// `%APPDATA%\soundboard` on Windows
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("soundboard"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get the config file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// If the config file doesn't exist, returns factory default.
    /// If the config file is corrupt, logs an error and returns factory default.
    #[instrument(skip(self))]
    pub async fn load(&self) -> SoundboardConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = SoundboardConfig::factory_default();

            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }

            return config;
        }

        match SoundboardConfig::load_from_file(&self.config_path).await {
            Ok(config) => {
                info!(
                    path = %self.config_path.display(),
                    tracks = config.tracks.len(),
                    "Configuration loaded successfully"
                );
                config
            }
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                SoundboardConfig::factory_default()
            }
        }
    }

    /// Save configuration to file
    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &SoundboardConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;

        config.save_to_file(&self.config_path).await
    }
}
