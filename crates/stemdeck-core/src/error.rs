//! Error types for stemdeck.

use thiserror::Error;

/// Result type alias using stemdeck's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for stemdeck.
#[derive(Error, Debug)]
pub enum Error {
    // Invalid requests
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Music Track '{0}' has no channels")]
    EmptyTrack(String),

    #[error("Playlist '{0}' is empty")]
    EmptyPlaylist(String),

    #[error("Unknown {kind}: '{name}'")]
    UnknownAsset { kind: AssetKind, name: String },

    // Engine state errors
    #[error("Playback mode error: {0}")]
    ModeInconsistent(String),

    #[error("Music player is already initialized")]
    AlreadyInitialized,

    #[error("Music player is not initialized")]
    NotInitialized,

    // Configuration errors
    #[error("Configuration missing: {0}")]
    ConfigMissing(String),

    // Audio errors
    #[error("Audio decode error: {0}")]
    AudioDecode(String),

    #[error("Audio output error: {0}")]
    AudioOutput(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Kind of library asset referenced by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Clip,
    Track,
    Playlist,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Clip => "audio clip",
            Self::Track => "music track",
            Self::Playlist => "playlist",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Returns true if this error means no player can exist until the
    /// configuration is fixed.
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigMissing(_))
    }

    /// Returns true if the request itself was bad and the engine state was left untouched.
    pub const fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::EmptyTrack(_)
                | Self::EmptyPlaylist(_)
                | Self::UnknownAsset { .. }
        )
    }
}
