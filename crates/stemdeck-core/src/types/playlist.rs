//! Playlist type and its sequencing cursor.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{AudioClip, MusicTrack, PlayRequest};
use crate::{Error, Result};

/// A playlist shared between its owner and the engine.
pub type SharedPlaylist = Arc<Mutex<Playlist>>;

/// Entries of a playlist. A playlist holds either tracks or files, never both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "items", rename_all = "lowercase")]
pub enum PlaylistEntries {
    Tracks(Vec<MusicTrack>),
    Files(Vec<AudioClip>),
}

impl PlaylistEntries {
    pub fn len(&self) -> usize {
        match self {
            Self::Tracks(tracks) => tracks.len(),
            Self::Files(files) => files.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PlaylistEntries {
    fn default() -> Self {
        Self::Tracks(Vec::new())
    }
}

/// An ordered list of tracks or files played one after another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Playlist {
    /// Playlist name.
    pub name: String,
    /// Start over from the first entry after the last one.
    #[serde(rename = "loop", default)]
    pub looping: bool,
    /// Entries in playback order.
    pub entries: PlaylistEntries,
    /// Index of the entry currently selected.
    #[serde(skip)]
    cursor: usize,
    /// Set once a non-looping playlist has run past its last entry.
    #[serde(skip)]
    finished: bool,
}

impl Playlist {
    pub fn new(name: impl Into<String>, entries: PlaylistEntries) -> Self {
        Self {
            name: name.into(),
            looping: false,
            entries,
            cursor: 0,
            finished: false,
        }
    }

    pub fn of_tracks(name: impl Into<String>, tracks: Vec<MusicTrack>) -> Self {
        Self::new(name, PlaylistEntries::Tracks(tracks))
    }

    pub fn of_files(name: impl Into<String>, files: Vec<AudioClip>) -> Self {
        Self::new(name, PlaylistEntries::Files(files))
    }

    #[must_use]
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Wrap the playlist for sharing with the engine.
    pub fn into_shared(self) -> SharedPlaylist {
        Arc::new(Mutex::new(self))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the cursor position.
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Check if a non-looping playlist has run out of entries.
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Rewind to the first entry and build its request.
    pub fn select_first(&mut self) -> Result<PlayRequest> {
        self.cursor = 0;
        self.finished = false;
        self.current()
    }

    /// Move the cursor to the next entry.
    ///
    /// Returns false when a non-looping playlist has no entry left. The cursor then
    /// stays on the last entry until `select_first` is called.
    pub fn advance(&mut self) -> bool {
        let len = self.len();
        if len == 0 || self.finished {
            return false;
        }

        if self.cursor + 1 < len {
            self.cursor += 1;
            true
        } else if self.looping {
            self.cursor = 0;
            true
        } else {
            self.finished = true;
            false
        }
    }

    /// Build a request for the entry under the cursor.
    pub fn current(&self) -> Result<PlayRequest> {
        let request = match &self.entries {
            PlaylistEntries::Tracks(tracks) => tracks
                .get(self.cursor)
                .map(|t| PlayRequest::track(t.clone().into_shared())),
            PlaylistEntries::Files(files) => files
                .get(self.cursor)
                .map(|f| PlayRequest::file(f.clone())),
        };
        request.ok_or_else(|| Error::EmptyPlaylist(self.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;
    use crate::types::PlaySource;
    use proptest::prelude::*;

    fn files(n: usize) -> Vec<AudioClip> {
        (0..n)
            .map(|i| AudioClip::new(format!("file{i}"), 5.0))
            .collect()
    }

    fn file_name(request: &PlayRequest) -> String {
        match &request.source {
            PlaySource::File(clip) => clip.name.clone(),
            PlaySource::Track(track) => track.read().name.clone(),
        }
    }

    #[test]
    fn test_select_first_resets_cursor() {
        let mut playlist = Playlist::of_files("Menu", files(3));
        assert!(playlist.advance());
        assert!(playlist.advance());
        assert_eq!(playlist.cursor(), 2);

        let first = playlist.select_first().unwrap();
        assert_eq!(playlist.cursor(), 0);
        assert_eq!(file_name(&first), "file0");
    }

    #[test]
    fn test_advance_without_loop_runs_out() {
        let mut playlist = Playlist::of_files("Menu", files(3));
        playlist.select_first().unwrap();
        assert!(playlist.advance());
        assert!(playlist.advance());
        assert!(!playlist.advance());
        assert!(playlist.is_finished());
        assert_eq!(playlist.cursor(), 2);
        assert!(!playlist.advance());
    }

    #[test]
    fn test_single_entry_playlist_spent() {
        let mut playlist = Playlist::of_files("Jingle", files(1));
        playlist.select_first().unwrap();
        assert!(!playlist.advance());
        assert_eq!(playlist.cursor(), 0);
        assert_eq!(file_name(&playlist.current().unwrap()), "file0");
    }

    #[test]
    fn test_empty_playlist_fails_fast() {
        let mut playlist = Playlist::of_tracks("Nothing", Vec::new());
        assert!(matches!(playlist.select_first(), Err(Error::EmptyPlaylist(_))));
        assert!(matches!(playlist.current(), Err(Error::EmptyPlaylist(_))));
        assert!(!playlist.advance());
    }

    #[test]
    fn test_track_entries_build_detached_requests() {
        let track = MusicTrack::new("Battle")
            .with_clip(AudioClip::new("battle_drums", 40.0))
            .with_looping(true);
        let mut playlist = Playlist::of_tracks("Combat", vec![track]);
        let request = playlist.select_first().unwrap();
        assert!(request.is_track());
        assert!(request.looping);

        if let PlaySource::Track(shared) = &request.source {
            shared.write().set_looping(false);
        }
        let PlaylistEntries::Tracks(tracks) = &playlist.entries else {
            unreachable!()
        };
        assert!(tracks[0].looping);
    }

    #[test]
    fn test_cursor_not_serialized() {
        let mut playlist = Playlist::of_files("Menu", files(2)).with_looping(true);
        playlist.advance();
        let json = serde_json::to_string(&playlist).unwrap();
        let back: Playlist = serde_json::from_str(&json).unwrap();
        assert_eq!(back.cursor(), 0);
        assert!(back.looping);
        assert_eq!(back.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_looping_playlist_wraps(n in 1usize..12, start in 0usize..12) {
            let mut playlist = Playlist::of_files("Loop", files(n)).with_looping(true);
            playlist.select_first().unwrap();
            for _ in 0..(start % n) {
                playlist.advance();
            }
            let origin = playlist.cursor();
            for _ in 0..n {
                prop_assert!(playlist.advance());
            }
            prop_assert_eq!(playlist.cursor(), origin);
        }
    }
}
