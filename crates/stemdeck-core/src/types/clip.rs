//! Audio clip type representing a single playable audio asset.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A single audio asset (one stem, or one standalone file).
///
/// Clips are identified by name: two clips with the same name are the same clip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioClip {
    /// Clip name, unique within a library.
    pub name: String,
    /// Location of the encoded audio, if backed by a file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Nominal length in seconds.
    #[serde(rename = "duration_secs")]
    pub duration: f64,
}

impl AudioClip {
    pub fn new(name: impl Into<String>, duration: f64) -> Self {
        Self {
            name: name.into(),
            path: None,
            duration: duration.max(0.0),
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Get the file path, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Check whether this is the same asset as `other`.
    pub fn same_asset(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
