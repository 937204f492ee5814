//! Play requests handed to the playback engine.

use super::{AudioClip, SharedTrack};

/// What a play request will sound.
#[derive(Debug, Clone)]
pub enum PlaySource {
    /// A multi-channel music track.
    Track(SharedTrack),
    /// A single audio file.
    File(AudioClip),
}

/// A request to play one track or file.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub source: PlaySource,
    /// Loop flag requested by the source. The engine overrides it under playlist mode.
    pub looping: bool,
    /// Track master volume, or the file volume.
    pub volume: f32,
    /// Offset into the audio, in seconds.
    pub start_time: f64,
}

impl PlayRequest {
    /// Build a request for a track, taking its loop flag and master volume.
    pub fn track(track: SharedTrack) -> Self {
        let (looping, volume) = {
            let t = track.read();
            (t.looping, t.master_volume)
        };
        Self {
            source: PlaySource::Track(track),
            looping,
            volume,
            start_time: 0.0,
        }
    }

    /// Build a request for a file at full volume, without looping.
    pub const fn file(clip: AudioClip) -> Self {
        Self::file_with(clip, 1.0, false)
    }

    pub const fn file_with(clip: AudioClip, volume: f32, looping: bool) -> Self {
        Self {
            source: PlaySource::File(clip),
            looping,
            volume,
            start_time: 0.0,
        }
    }

    #[must_use]
    pub fn with_start_time(mut self, start_time: f64) -> Self {
        self.start_time = start_time.max(0.0);
        self
    }

    pub const fn is_track(&self) -> bool {
        matches!(self.source, PlaySource::Track(_))
    }

    /// Number of output channels this request needs.
    pub fn channel_count(&self) -> usize {
        match &self.source {
            PlaySource::Track(track) => track.read().channels.len(),
            PlaySource::File(_) => 1,
        }
    }

    /// Length of the first channel's clip in seconds.
    pub fn duration(&self) -> f64 {
        match &self.source {
            PlaySource::Track(track) => track.read().duration(),
            PlaySource::File(clip) => clip.duration,
        }
    }

    /// Human-readable description, e.g. `Music Track: Forest`.
    pub fn describe(&self) -> String {
        match &self.source {
            PlaySource::Track(track) => format!("Music Track: {}", track.read().name),
            PlaySource::File(clip) => format!("Audio File: {}", clip.name),
        }
    }
}
