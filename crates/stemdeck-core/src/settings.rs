//! Music settings: the default engine template and preview selection.
//!
//! Settings are read once, when a player is first created.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// File name looked up in the platform config directory.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Default fade speed, in volume units per second.
pub const DEFAULT_FADE_RATE: f32 = 1.0;

/// What an engine starts playing as soon as it is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AutoPlay {
    #[default]
    Disabled,
    /// A music track from the library.
    Track { name: String },
    /// A single clip from the library.
    File {
        name: String,
        #[serde(default = "full_volume")]
        volume: f32,
        #[serde(rename = "loop", default)]
        looping: bool,
    },
    /// A playlist from the library.
    Playlist { name: String },
}

const fn full_volume() -> f32 {
    1.0
}

const fn default_fade_rate() -> f32 {
    DEFAULT_FADE_RATE
}

/// Template used to build an engine when none exists yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineTemplate {
    /// How fast fades lower the volume, per second of wall-clock time.
    #[serde(default = "default_fade_rate")]
    pub fade_rate: f32,
    /// Output channels allocated up front.
    #[serde(default)]
    pub initial_channels: usize,
    /// Playback started right after creation.
    #[serde(default)]
    pub autoplay: AutoPlay,
}

impl Default for EngineTemplate {
    fn default() -> Self {
        Self {
            fade_rate: DEFAULT_FADE_RATE,
            initial_channels: 0,
            autoplay: AutoPlay::Disabled,
        }
    }
}

/// Project-wide music settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MusicSettings {
    /// Template for auto-created engines. Without one, no engine can be auto-created.
    #[serde(default)]
    pub default_engine: Option<EngineTemplate>,
    /// Track opened by the live preview on start.
    #[serde(default)]
    pub pre_selected_track: Option<String>,
}

impl MusicSettings {
    /// Settings with a default engine template.
    pub fn with_default_engine() -> Self {
        Self {
            default_engine: Some(EngineTemplate::default()),
            pre_selected_track: None,
        }
    }

    /// Load settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&content)?;
        info!("Music settings loaded from {}", path.display());
        Ok(settings)
    }

    /// Load settings from the platform config directory.
    ///
    /// A missing file gives default settings, which carry no engine template.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            warn!(
                "No music settings found at {}; engines cannot be auto-created",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Path of the settings file in the platform config directory.
    pub fn default_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "stemdeck", "stemdeck").ok_or_else(|| {
            Error::ConfigMissing("Failed to determine config directory".to_string())
        })?;
        Ok(project_dirs.config_dir().join(SETTINGS_FILE_NAME))
    }

    /// Write settings as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("Music settings saved to {}", path.display());
        Ok(())
    }

    /// Get the engine template, or a configuration error if there is none.
    pub fn engine_template(&self) -> Result<&EngineTemplate> {
        self.default_engine.as_ref().ok_or_else(|| {
            Error::ConfigMissing("No default engine has been assigned in the music settings".into())
        })
    }

    /// Take the pre-selected preview track. It is only handed out once.
    pub fn take_pre_selected_track(&mut self) -> Option<String> {
        self.pre_selected_track.take()
    }
}
