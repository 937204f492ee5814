//! # stemdeck-core
//!
//! Core types, playlist sequencing, settings and error handling for stemdeck.

pub mod error;
pub mod library;
pub mod settings;
pub mod types;

pub use error::{AssetKind, Error, Result};
pub use library::TrackLibrary;
pub use settings::{AutoPlay, EngineTemplate, MusicSettings};
pub use types::*;
