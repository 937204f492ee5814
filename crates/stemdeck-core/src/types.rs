//! Core domain types for stemdeck.

pub mod clip;
pub mod playlist;
pub mod request;
pub mod track;

pub use clip::AudioClip;
pub use playlist::{Playlist, PlaylistEntries, SharedPlaylist};
pub use request::{PlayRequest, PlaySource};
pub use track::{MusicChannel, MusicTrack, SharedTrack, MIN_MASTER_VOLUME};
