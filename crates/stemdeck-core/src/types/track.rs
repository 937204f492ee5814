//! Music track types: a set of synchronized stems played together.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::AudioClip;
use crate::{Error, Result};

/// Lowest master volume a track may be set to.
pub const MIN_MASTER_VOLUME: f32 = 0.1;

/// Channels whose length differs from channel 0 by more than this are reported.
const DURATION_TOLERANCE_SECS: f64 = 0.05;

/// A track shared between its editor and the engine.
///
/// Live edits made through the lock are picked up by the engine's volume refresh.
pub type SharedTrack = Arc<RwLock<MusicTrack>>;

/// One stem of a music track.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MusicChannel {
    /// Disabled channels keep playing, but at volume 0.
    pub enabled: bool,
    /// The audio played on this channel.
    pub clip: AudioClip,
    /// Channel volume (0.0 to 1.0).
    pub volume: f32,
}

impl MusicChannel {
    pub const fn new(clip: AudioClip) -> Self {
        Self {
            enabled: true,
            clip,
            volume: 1.0,
        }
    }

    pub const fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Set the channel volume, clamped to 0.0..=1.0.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    /// Volume this channel should sound at under the given master volume.
    pub fn output_volume(&self, master_volume: f32) -> f32 {
        if self.enabled {
            self.volume * master_volume
        } else {
            0.0
        }
    }
}

/// A music track made of parallel channels sharing one length.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MusicTrack {
    /// Track name.
    pub name: String,
    /// Whether the track loops when played on its own.
    #[serde(rename = "loop", default)]
    pub looping: bool,
    /// Master volume (0.1 to 1.0) applied on top of each channel volume.
    pub master_volume: f32,
    /// Channels in playback order. Channel 0 defines the track length.
    pub channels: Vec<MusicChannel>,
}

impl MusicTrack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            looping: false,
            master_volume: 1.0,
            channels: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_channel(mut self, channel: MusicChannel) -> Self {
        self.channels.push(channel);
        self
    }

    #[must_use]
    pub fn with_clip(self, clip: AudioClip) -> Self {
        self.with_channel(MusicChannel::new(clip))
    }

    #[must_use]
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    #[must_use]
    pub fn with_master_volume(mut self, volume: f32) -> Self {
        self.set_master_volume(volume);
        self
    }

    /// Wrap the track for sharing with the engine.
    pub fn into_shared(self) -> SharedTrack {
        Arc::new(RwLock::new(self))
    }

    pub const fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Set the master volume, clamped to 0.1..=1.0.
    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(MIN_MASTER_VOLUME, 1.0);
    }

    pub fn channel_mut(&mut self, index: usize) -> Option<&mut MusicChannel> {
        self.channels.get_mut(index)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Track length in seconds, taken from channel 0.
    pub fn duration(&self) -> f64 {
        self.channels.first().map_or(0.0, |c| c.clip.duration)
    }

    /// Output volume of every channel, in channel order.
    pub fn channel_volumes(&self) -> Vec<f32> {
        self.channels
            .iter()
            .map(|c| c.output_volume(self.master_volume))
            .collect()
    }

    /// Check that the track can be played.
    ///
    /// Channels with a different length than channel 0 are only logged.
    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.channels.first() else {
            return Err(Error::EmptyTrack(self.name.clone()));
        };

        for (index, channel) in self.channels.iter().enumerate().skip(1) {
            if (channel.clip.duration - first.clip.duration).abs() > DURATION_TOLERANCE_SECS {
                warn!(
                    "Music Track '{}': channel {} ({:.2}s) does not match channel 0 ({:.2}s)",
                    self.name, index, channel.clip.duration, first.clip.duration
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;
    use proptest::prelude::*;

    fn stems() -> MusicTrack {
        MusicTrack::new("Forest")
            .with_clip(AudioClip::new("forest_drums", 60.0))
            .with_clip(AudioClip::new("forest_strings", 60.0))
    }

    #[test]
    fn test_track_creation() {
        let track = stems().with_looping(true).with_master_volume(0.5);
        assert_eq!(track.channels.len(), 2);
        assert!(track.looping);
        assert!((track.master_volume - 0.5).abs() < f32::EPSILON);
        assert!((track.duration() - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_master_volume_clamped() {
        let mut track = stems();
        track.set_master_volume(0.0);
        assert!((track.master_volume - MIN_MASTER_VOLUME).abs() < f32::EPSILON);
        track.set_master_volume(3.0);
        assert!((track.master_volume - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_empty_track_is_invalid() {
        let track = MusicTrack::new("Nothing");
        assert!(matches!(track.validate(), Err(Error::EmptyTrack(name)) if name == "Nothing"));
        assert!(track.duration().abs() < f64::EPSILON);
    }

    #[test]
    fn test_mismatched_lengths_still_validate() {
        let track = MusicTrack::new("Uneven")
            .with_clip(AudioClip::new("a", 10.0))
            .with_clip(AudioClip::new("b", 12.0));
        assert!(track.validate().is_ok());
        assert!((track.duration() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_clone_is_detached() {
        let original = stems();
        let mut copy = original.clone();
        copy.channel_mut(0).unwrap().set_enabled(false);
        copy.channel_mut(1).unwrap().set_volume(0.25);
        assert!(original.channels[0].enabled);
        assert!((original.channels[1].volume - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_serde_uses_loop_key() {
        let json = serde_json::to_value(stems().with_looping(true)).unwrap();
        assert_eq!(json["loop"], true);
        let back: MusicTrack = serde_json::from_value(json).unwrap();
        assert!(back.looping);
    }

    proptest! {
        #[test]
        fn prop_channel_volume_composition(
            channels in prop::collection::vec((any::<bool>(), 0.0f32..=1.0), 1..8),
            master in MIN_MASTER_VOLUME..=1.0f32,
        ) {
            let mut track = MusicTrack::new("prop").with_master_volume(master);
            for (i, (enabled, volume)) in channels.iter().enumerate() {
                let mut channel = MusicChannel::new(AudioClip::new(format!("c{i}"), 5.0));
                channel.set_enabled(*enabled);
                channel.set_volume(*volume);
                track.channels.push(channel);
            }

            let volumes = track.channel_volumes();
            for ((enabled, volume), out) in channels.iter().zip(volumes) {
                let expected = if *enabled { volume * track.master_volume } else { 0.0 };
                prop_assert!((out - expected).abs() < 1e-6);
            }
        }
    }
}
