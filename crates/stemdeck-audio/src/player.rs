//! Host owning at most one playback engine.

use std::sync::Arc;

use stemdeck_core::{
    AudioClip, AutoPlay, Error, MusicSettings, PlayRequest, Result, SharedPlaylist, SharedTrack,
    TrackLibrary,
};
use tracing::{error, info, warn};

use crate::backend::AudioBackend;
use crate::engine::{EngineConfig, FrameTime, PlaybackEngine, PlaybackMode};
use crate::events::TrackFinishedSubscription;

/// Creates the engine on demand and forwards playback calls to it.
pub struct MusicPlayer {
    backend: Arc<dyn AudioBackend>,
    settings: MusicSettings,
    library: Option<Arc<TrackLibrary>>,
    engine: Option<PlaybackEngine>,
}

impl MusicPlayer {
    pub fn new(backend: Arc<dyn AudioBackend>, settings: MusicSettings) -> Self {
        Self {
            backend,
            settings,
            library: None,
            engine: None,
        }
    }

    /// Library used to resolve autoplay names.
    #[must_use]
    pub fn with_library(mut self, library: Arc<TrackLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    /// Create the engine from the default template and run its autoplay.
    pub fn init(&mut self) -> Result<()> {
        if self.engine.is_some() {
            warn!("A playback engine already exists");
            return Err(Error::AlreadyInitialized);
        }
        self.create()
    }

    /// Return the engine, creating it first if needed.
    pub fn ensure_engine(&mut self) -> Result<&mut PlaybackEngine> {
        if self.engine.is_none() {
            self.create()?;
        }
        self.engine.as_mut().ok_or(Error::NotInitialized)
    }

    pub fn play_track(&mut self, track: SharedTrack, start_time: f64) -> Result<()> {
        self.ensure_engine()?.play_track(track, start_time)
    }

    pub fn play_file(&mut self, clip: AudioClip, start_time: f64) -> Result<()> {
        self.ensure_engine()?.play_file(clip, start_time)
    }

    pub fn play_playlist(&mut self, playlist: SharedPlaylist) -> Result<()> {
        self.ensure_engine()?.play_playlist(playlist)
    }

    pub fn stop(&mut self, instant: bool) {
        match self.engine.as_mut() {
            Some(engine) => engine.stop(instant),
            None => warn!("Stop requested but no playback engine exists"),
        }
    }

    pub fn update_volume(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.update_volume();
        }
    }

    pub fn tick(&mut self, frame: FrameTime) {
        if let Some(engine) = self.engine.as_mut() {
            engine.tick(frame);
        }
    }

    pub fn is_playing(&self) -> bool {
        self.engine.as_ref().is_some_and(PlaybackEngine::is_playing)
    }

    pub fn current_time(&self) -> f64 {
        self.engine.as_ref().map_or(0.0, PlaybackEngine::current_time)
    }

    /// Register for track-finished notifications, creating the engine if needed.
    pub fn subscribe_track_finished(&mut self) -> Result<TrackFinishedSubscription> {
        Ok(self.ensure_engine()?.subscribe_track_finished())
    }

    pub const fn engine(&self) -> Option<&PlaybackEngine> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut PlaybackEngine> {
        self.engine.as_mut()
    }

    pub const fn settings(&self) -> &MusicSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut MusicSettings {
        &mut self.settings
    }

    /// Tear the engine down. A later `init` builds a fresh one.
    pub fn shutdown(&mut self) -> Result<()> {
        let mut engine = self.engine.take().ok_or(Error::NotInitialized)?;
        engine.shutdown();
        Ok(())
    }

    fn create(&mut self) -> Result<()> {
        let template = match self.settings.engine_template() {
            Ok(template) => template.clone(),
            Err(e) => {
                error!("Unable to create a playback engine: {e}");
                return Err(e);
            }
        };
        let engine = PlaybackEngine::new(self.backend.clone(), EngineConfig::from(&template))?;
        self.engine = Some(engine);
        self.autoplay(&template.autoplay);
        Ok(())
    }

    fn autoplay(&mut self, autoplay: &AutoPlay) {
        if *autoplay == AutoPlay::Disabled {
            return;
        }
        let (Some(library), Some(engine)) = (self.library.clone(), self.engine.as_mut()) else {
            warn!("Autoplay is configured but no library is loaded");
            return;
        };

        let result = match autoplay {
            AutoPlay::Disabled => Ok(()),
            AutoPlay::Track { name } => library
                .track(name)
                .and_then(|track| engine.play_track(track.into_shared(), 0.0)),
            AutoPlay::File {
                name,
                volume,
                looping,
            } => library.clip(name).and_then(|clip| {
                engine.play(
                    PlayRequest::file_with(clip.clone(), *volume, *looping),
                    PlaybackMode::Solo,
                )
            }),
            AutoPlay::Playlist { name } => library
                .playlist(name)
                .and_then(|playlist| engine.play_playlist(playlist.into_shared())),
        };

        match result {
            Ok(()) => info!("Autoplay started: {autoplay:?}"),
            Err(e) => warn!("Autoplay skipped: {e}"),
        }
    }
}

impl std::fmt::Debug for MusicPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MusicPlayer")
            .field("backend", &self.backend.name())
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;
    use crate::backend::VirtualBackend;
    use stemdeck_core::{EngineTemplate, MusicTrack, Playlist};

    fn library() -> Arc<TrackLibrary> {
        let mut library = TrackLibrary::new();
        let clip = AudioClip::new("theme", 4.0);
        library.insert_clip(clip.clone());
        library.insert_track(MusicTrack::new("Theme").with_clip(clip.clone()));
        library.insert_playlist(Playlist::of_files("Loop", vec![clip]));
        Arc::new(library)
    }

    fn player_with(autoplay: AutoPlay) -> MusicPlayer {
        let settings = MusicSettings {
            default_engine: Some(EngineTemplate {
                initial_channels: 2,
                autoplay,
                ..EngineTemplate::default()
            }),
            pre_selected_track: None,
        };
        MusicPlayer::new(Arc::new(VirtualBackend::new()), settings).with_library(library())
    }

    #[test]
    fn test_second_init_is_rejected() {
        let mut player = player_with(AutoPlay::Disabled);
        player.init().unwrap();
        assert!(matches!(player.init(), Err(Error::AlreadyInitialized)));
        assert_eq!(player.engine().unwrap().channels().len(), 2);
    }

    #[test]
    fn test_missing_template_is_config_error() {
        let mut player =
            MusicPlayer::new(Arc::new(VirtualBackend::new()), MusicSettings::default());
        let err = player
            .play_file(AudioClip::new("theme", 1.0), 0.0)
            .unwrap_err();
        assert!(err.is_config_error());
        assert!(player.engine().is_none());
    }

    #[test]
    fn test_play_creates_engine_on_demand() {
        let mut player = player_with(AutoPlay::Disabled);
        assert!(!player.is_playing());
        player.stop(true);

        player
            .play_file(AudioClip::new("theme", 4.0), 1.0)
            .unwrap();
        assert!(player.is_playing());
        assert!((player.current_time() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_autoplay_variants() {
        let mut player = player_with(AutoPlay::Track {
            name: "Theme".into(),
        });
        player.init().unwrap();
        let info = player.engine().unwrap().current_track_info();
        assert_eq!(info.as_deref(), Some("Music Track: Theme"));

        let mut player = player_with(AutoPlay::File {
            name: "theme".into(),
            volume: 0.3,
            looping: true,
        });
        player.init().unwrap();
        let engine = player.engine().unwrap();
        assert!((engine.channels()[0].volume() - 0.3).abs() < 1e-6);
        assert!(engine.channels()[0].looping());

        let mut player = player_with(AutoPlay::Playlist {
            name: "Loop".into(),
        });
        player.init().unwrap();
        assert!(player.engine().unwrap().has_active_playlist());
    }

    #[test]
    fn test_missing_autoplay_asset_only_warns() {
        let mut player = player_with(AutoPlay::Track {
            name: "Nope".into(),
        });
        player.init().unwrap();
        assert!(!player.is_playing());
    }

    #[test]
    fn test_shutdown_then_init_again() {
        let mut player = player_with(AutoPlay::Disabled);
        assert!(matches!(player.shutdown(), Err(Error::NotInitialized)));

        player.init().unwrap();
        let sub = player.subscribe_track_finished().unwrap();
        player.shutdown().unwrap();
        assert!(player.engine().is_none());
        assert!(sub.is_disconnected());

        player.init().unwrap();
        assert!(player.engine().is_some());
    }

    #[test]
    fn test_tick_drives_engine() {
        let mut player = player_with(AutoPlay::Disabled);
        let sub = player.subscribe_track_finished().unwrap();
        player.play_file(AudioClip::new("short", 0.5), 0.0).unwrap();
        for _ in 0..20 {
            player.tick(FrameTime::uniform(0.05));
        }
        assert_eq!(sub.try_recv().unwrap().info, "Audio File: short");
        assert!(!player.is_playing());
    }
}
