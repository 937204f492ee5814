//! Track library: clips, music tracks and playlists loaded from a JSON manifest.
//!
//! Tracks reference clips by name and playlists reference tracks or clips by
//! name, so one clip can be shared by several tracks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::AssetKind;
use crate::types::{AudioClip, MusicChannel, MusicTrack, Playlist, PlaylistEntries};
use crate::{Error, Result};

#[derive(Debug, Deserialize, Serialize)]
struct Manifest {
    #[serde(default)]
    clips: Vec<ManifestClip>,
    #[serde(default)]
    tracks: Vec<ManifestTrack>,
    #[serde(default)]
    playlists: Vec<ManifestPlaylist>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ManifestClip {
    name: String,
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    duration_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ManifestTrack {
    name: String,
    #[serde(rename = "loop", default)]
    looping: bool,
    #[serde(default = "full_volume")]
    master_volume: f32,
    channels: Vec<ManifestChannel>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ManifestChannel {
    clip: String,
    #[serde(default = "enabled")]
    enabled: bool,
    #[serde(default = "full_volume")]
    volume: f32,
}

#[derive(Debug, Deserialize, Serialize)]
struct ManifestPlaylist {
    name: String,
    #[serde(rename = "loop", default)]
    looping: bool,
    #[serde(default)]
    tracks: Vec<String>,
    #[serde(default)]
    files: Vec<String>,
}

const fn full_volume() -> f32 {
    1.0
}

const fn enabled() -> bool {
    true
}

/// All playable content known to an application.
#[derive(Debug, Clone, Default)]
pub struct TrackLibrary {
    clips: BTreeMap<String, AudioClip>,
    tracks: BTreeMap<String, MusicTrack>,
    playlists: BTreeMap<String, Playlist>,
}

impl TrackLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a manifest whose clips all declare their duration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(path, |clip_path| {
            Err(Error::InvalidArgument(format!(
                "No duration declared for {}",
                clip_path.display()
            )))
        })
    }

    /// Load a manifest, asking `probe` for the duration of clips that declare none.
    ///
    /// Relative clip paths are resolved against the manifest's directory.
    pub fn load_with<F>(path: impl AsRef<Path>, probe: F) -> Result<Self>
    where
        F: FnMut(&Path) -> Result<f64>,
    {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let library = Self::from_json(&content, base, probe)?;
        info!(
            "Library loaded from {}: {} clips, {} tracks, {} playlists",
            path.display(),
            library.clips.len(),
            library.tracks.len(),
            library.playlists.len()
        );
        Ok(library)
    }

    /// Parse a manifest from a JSON string.
    pub fn from_json<F>(json: &str, base: &Path, mut probe: F) -> Result<Self>
    where
        F: FnMut(&Path) -> Result<f64>,
    {
        let manifest: Manifest = serde_json::from_str(json)?;
        let mut library = Self::new();

        for clip in manifest.clips {
            let path = clip.path.map(|p| if p.is_relative() { base.join(p) } else { p });
            let duration = match (clip.duration_secs, &path) {
                (Some(duration), _) => duration,
                (None, Some(path)) => probe(path)?,
                (None, None) => {
                    return Err(Error::InvalidArgument(format!(
                        "Clip '{}' has neither a path nor a duration",
                        clip.name
                    )))
                }
            };
            let mut resolved = AudioClip::new(clip.name, duration);
            resolved.path = path;
            library.insert_clip(resolved);
        }

        for track in manifest.tracks {
            let mut resolved = MusicTrack::new(track.name)
                .with_looping(track.looping)
                .with_master_volume(track.master_volume);
            for channel in track.channels {
                let mut resolved_channel = MusicChannel::new(library.clip(&channel.clip)?.clone());
                resolved_channel.set_enabled(channel.enabled);
                resolved_channel.set_volume(channel.volume);
                resolved.channels.push(resolved_channel);
            }
            library.insert_track(resolved);
        }

        for playlist in manifest.playlists {
            let entries = match (playlist.tracks.is_empty(), playlist.files.is_empty()) {
                (false, false) => {
                    return Err(Error::InvalidArgument(format!(
                        "Playlist '{}' mixes tracks and files",
                        playlist.name
                    )))
                }
                (false, true) => PlaylistEntries::Tracks(
                    playlist
                        .tracks
                        .iter()
                        .map(|name| library.track(name))
                        .collect::<Result<_>>()?,
                ),
                _ => PlaylistEntries::Files(
                    playlist
                        .files
                        .iter()
                        .map(|name| library.clip(name).cloned())
                        .collect::<Result<_>>()?,
                ),
            };
            library.insert_playlist(
                Playlist::new(playlist.name, entries).with_looping(playlist.looping),
            );
        }

        Ok(library)
    }

    pub fn insert_clip(&mut self, clip: AudioClip) {
        debug!("Library clip: {} ({:.2}s)", clip.name, clip.duration);
        self.clips.insert(clip.name.clone(), clip);
    }

    pub fn insert_track(&mut self, track: MusicTrack) {
        self.tracks.insert(track.name.clone(), track);
    }

    pub fn insert_playlist(&mut self, playlist: Playlist) {
        self.playlists.insert(playlist.name.clone(), playlist);
    }

    /// Look up a clip by name.
    pub fn clip(&self, name: &str) -> Result<&AudioClip> {
        self.clips.get(name).ok_or_else(|| unknown(AssetKind::Clip, name))
    }

    /// Get a detached copy of a track.
    pub fn track(&self, name: &str) -> Result<MusicTrack> {
        self.tracks
            .get(name)
            .cloned()
            .ok_or_else(|| unknown(AssetKind::Track, name))
    }

    /// Get a fresh copy of a playlist with its cursor at the start.
    pub fn playlist(&self, name: &str) -> Result<Playlist> {
        self.playlists
            .get(name)
            .cloned()
            .ok_or_else(|| unknown(AssetKind::Playlist, name))
    }

    pub fn clips(&self) -> impl Iterator<Item = &AudioClip> {
        self.clips.values()
    }

    pub fn tracks(&self) -> impl Iterator<Item = &MusicTrack> {
        self.tracks.values()
    }

    pub fn playlists(&self) -> impl Iterator<Item = &Playlist> {
        self.playlists.values()
    }
}

fn unknown(kind: AssetKind, name: &str) -> Error {
    Error::UnknownAsset {
        kind,
        name: name.to_string(),
    }
}
