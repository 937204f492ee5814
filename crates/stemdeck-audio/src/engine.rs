//! Playback engine: the tick-driven state machine behind every play and stop call.
//!
//! A play request arriving while music is audible does not cut it off. The
//! engine fades the sounding channels out and parks the request; it is
//! committed once the fade completes. A newer request arriving meanwhile
//! replaces the parked one and restarts the fade from the current volumes.

use std::sync::Arc;

use stemdeck_core::{
    AudioClip, EngineTemplate, Error, MusicChannel, PlayRequest, PlaySource, Result,
    SharedPlaylist, SharedTrack,
};
use tracing::{debug, error, info, warn};

use crate::backend::AudioBackend;
use crate::events::{ListenerId, Listeners, TrackFinished, TrackFinishedSubscription};
use crate::fade::Crossfade;
use crate::pool::{ChannelHandle, ChannelPool};
use crate::watcher::EndOfTrackWatcher;

/// Time elapsed since the previous tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameTime {
    /// Scaled game time. Stands still while the game is paused.
    pub delta: f64,
    /// Wall-clock time. Fades use this so they finish even while paused.
    pub unscaled_delta: f64,
}

impl FrameTime {
    /// A frame where game time and wall-clock time agree.
    pub const fn uniform(delta: f64) -> Self {
        Self {
            delta,
            unscaled_delta: delta,
        }
    }

    /// A frame during which game time is frozen.
    pub const fn paused(unscaled_delta: f64) -> Self {
        Self {
            delta: 0.0,
            unscaled_delta,
        }
    }
}

/// Playback mode of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    #[default]
    Stopped,
    /// A single track or file, outside any playlist.
    Solo,
    /// Entries of the active playlist, one after another.
    Playlist,
}

/// Engine tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Volume units removed per second of wall-clock time while fading.
    pub fade_rate: f32,
    /// Channels allocated when the engine starts.
    pub initial_channels: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&EngineTemplate::default())
    }
}

impl From<&EngineTemplate> for EngineConfig {
    fn from(template: &EngineTemplate) -> Self {
        Self {
            fade_rate: template.fade_rate,
            initial_channels: template.initial_channels,
        }
    }
}

/// A request waiting for the running fade to finish.
#[derive(Debug)]
struct QueuedRequest {
    request: PlayRequest,
    mode: PlaybackMode,
}

/// The music playback engine.
pub struct PlaybackEngine {
    config: EngineConfig,
    pool: ChannelPool,
    mode: PlaybackMode,
    current: Option<PlayRequest>,
    active_playlist: Option<SharedPlaylist>,
    queued: Option<QueuedRequest>,
    /// Leading pool channels used by the current request.
    claimed: usize,
    fade: Option<Crossfade>,
    watcher: Option<EndOfTrackWatcher>,
    listeners: Listeners,
}

impl PlaybackEngine {
    /// Create an engine drawing its channels from `backend`.
    pub fn new(backend: Arc<dyn AudioBackend>, config: EngineConfig) -> Result<Self> {
        info!(
            "Starting playback engine on '{}' backend (fade rate {:.2}/s)",
            backend.name(),
            config.fade_rate
        );

        let mut pool = ChannelPool::new(backend);
        pool.ensure(config.initial_channels)?;

        Ok(Self {
            config,
            pool,
            mode: PlaybackMode::Stopped,
            current: None,
            active_playlist: None,
            queued: None,
            claimed: 0,
            fade: None,
            watcher: None,
            listeners: Listeners::new(),
        })
    }

    /// Play a music track on its own.
    pub fn play_track(&mut self, track: SharedTrack, start_time: f64) -> Result<()> {
        if let Err(e) = track.read().validate() {
            warn!("Unable to play Music Track: {e}");
            return Err(e);
        }
        self.play(
            PlayRequest::track(track).with_start_time(start_time),
            PlaybackMode::Solo,
        )
    }

    /// Play a single audio file on its own.
    pub fn play_file(&mut self, clip: AudioClip, start_time: f64) -> Result<()> {
        self.play(
            PlayRequest::file(clip).with_start_time(start_time),
            PlaybackMode::Solo,
        )
    }

    /// Play a playlist from its first entry.
    pub fn play_playlist(&mut self, playlist: SharedPlaylist) -> Result<()> {
        let first = playlist.lock().select_first();
        let request = match first {
            Ok(request) => request,
            Err(e) => {
                warn!("Unable to play playlist: {e}");
                return Err(e);
            }
        };

        if request.channel_count() == 0 {
            let err = Error::EmptyTrack(request.describe());
            warn!("Unable to play playlist: {err}");
            return Err(err);
        }

        let previous_mode = self.mode;
        let previous_playlist = self.active_playlist.replace(playlist);
        self.mode = PlaybackMode::Playlist;
        let result = self.play(request, PlaybackMode::Playlist);
        if result.is_err() {
            self.mode = previous_mode;
            self.active_playlist = previous_playlist;
        }
        result
    }

    /// Run a request through validation, then commit it or queue it behind a fade.
    pub fn play(&mut self, request: PlayRequest, mode: PlaybackMode) -> Result<()> {
        if request.channel_count() == 0 {
            let err = Error::EmptyTrack(request.describe());
            warn!("Unable to play: {err}");
            return Err(err);
        }

        match mode {
            PlaybackMode::Solo => self.active_playlist = None,
            PlaybackMode::Playlist if self.active_playlist.is_none() => {
                let err = Error::ModeInconsistent(
                    "Requested to play Music Track as part of a playlist, but no playlist is active"
                        .into(),
                );
                error!("{err}");
                return Err(err);
            }
            PlaybackMode::Playlist => {}
            PlaybackMode::Stopped => {
                let err = Error::ModeInconsistent(format!("Invalid playback mode: {mode:?}"));
                error!("{err}");
                return Err(err);
            }
        }

        self.mode = mode;
        self.cancel_transitions();

        if self.is_audible() {
            debug!("Fading out before playing {}", request.describe());
            self.fade = Some(Crossfade::start(&self.pool, self.config.fade_rate));
            self.queued = Some(QueuedRequest { request, mode });
            return Ok(());
        }

        self.commit(request)
    }

    /// Stop playback, fading out unless `instant`.
    ///
    /// Drops the queued request and every track-finished listener.
    pub fn stop(&mut self, instant: bool) {
        debug!("Stopping playback (instant: {instant})");
        self.mode = PlaybackMode::Stopped;
        self.queued = None;
        self.listeners.clear();
        self.cancel_transitions();

        if instant {
            self.pool.stop_all();
        } else {
            self.fade = Some(Crossfade::start(&self.pool, self.config.fade_rate));
        }
    }

    /// Re-apply channel volumes after the current track or file was edited.
    ///
    /// Ignored while a fade is running.
    pub fn update_volume(&mut self) {
        if self.fade.is_some() {
            debug!("Volume update ignored while fading");
            return;
        }
        let Some(current) = &self.current else {
            return;
        };

        let volumes = match &current.source {
            PlaySource::Track(track) => track.read().channel_volumes(),
            PlaySource::File(_) => vec![current.volume],
        };
        for (channel, volume) in self
            .pool
            .channels_mut()
            .iter_mut()
            .take(self.claimed)
            .zip(volumes)
        {
            channel.set_volume(volume);
        }
    }

    /// Advance fades, voices and end-of-track detection by one frame.
    pub fn tick(&mut self, frame: FrameTime) {
        self.pool.advance(frame.unscaled_delta);

        if let Some(fade) = self.fade.as_mut() {
            if fade.tick(&mut self.pool, frame.unscaled_delta) {
                self.fade = None;
                self.on_fade_completed();
            }
        }

        let sounding = self.is_playing();
        if let Some(watcher) = self.watcher.as_mut() {
            if watcher.tick(frame.delta, sounding) {
                self.watcher = None;
                self.on_track_finished();
            }
        }
    }

    /// Register for track-finished notifications.
    pub fn subscribe_track_finished(&mut self) -> TrackFinishedSubscription {
        self.listeners.subscribe()
    }

    pub fn unsubscribe_track_finished(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Stop everything and drop all session state.
    pub fn shutdown(&mut self) {
        self.stop(true);
        self.active_playlist = None;
        self.current = None;
        self.claimed = 0;
        info!("Playback engine shut down");
    }

    /// True if there is a current request and its first channel is sounding.
    pub fn is_playing(&self) -> bool {
        self.current.is_some() && self.pool.get(0).is_some_and(ChannelHandle::is_playing)
    }

    /// True while anything is sounding, fading, queued or waiting for the track end.
    pub fn is_active(&self) -> bool {
        self.is_audible() || self.fade.is_some() || self.queued.is_some() || self.watcher.is_some()
    }

    /// Position of the current request in seconds, or 0 when nothing plays.
    pub fn current_time(&self) -> f64 {
        if self.is_playing() {
            self.pool.get(0).map_or(0.0, ChannelHandle::elapsed_time)
        } else {
            0.0
        }
    }

    /// Output channel currently playing `channel`'s clip.
    pub fn channel_for(&self, channel: &MusicChannel) -> Option<&ChannelHandle> {
        self.pool.handle_for(&channel.clip)
    }

    pub const fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub const fn has_active_playlist(&self) -> bool {
        self.active_playlist.is_some()
    }

    pub const fn active_playlist(&self) -> Option<&SharedPlaylist> {
        self.active_playlist.as_ref()
    }

    pub const fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    /// Request waiting for the running fade to complete.
    pub fn queued_request(&self) -> Option<&PlayRequest> {
        self.queued.as_ref().map(|q| &q.request)
    }

    /// Request most recently committed.
    pub const fn current_request(&self) -> Option<&PlayRequest> {
        self.current.as_ref()
    }

    /// Description of the current request, e.g. `Audio File: theme`.
    pub fn current_track_info(&self) -> Option<String> {
        self.current.as_ref().map(PlayRequest::describe)
    }

    /// Every channel of the pool.
    pub fn channels(&self) -> &[ChannelHandle] {
        self.pool.channels()
    }

    /// Channels used by the current request.
    pub fn claimed_channels(&self) -> &[ChannelHandle] {
        let claimed = self.claimed.min(self.pool.len());
        &self.pool.channels()[..claimed]
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Claim channels and start sounding `request`.
    fn commit(&mut self, request: PlayRequest) -> Result<()> {
        let looping = if self.active_playlist.is_some() {
            false
        } else {
            request.looping
        };

        let (clips, volumes): (Vec<AudioClip>, Vec<f32>) = match &request.source {
            PlaySource::Track(track) => {
                let track = track.read();
                (
                    track.channels.iter().map(|c| c.clip.clone()).collect(),
                    track.channel_volumes(),
                )
            }
            PlaySource::File(clip) => (vec![clip.clone()], vec![request.volume]),
        };

        self.queued = None;
        let channels = self.pool.ensure(clips.len())?;
        let (used, spare) = channels.split_at_mut(clips.len());

        for ((channel, clip), volume) in used.iter_mut().zip(&clips).zip(volumes) {
            if let Err(e) = channel.start(clip, request.start_time, looping, volume) {
                error!("Failed to start channel {}: {e}", channel.index());
                self.pool.stop_all();
                self.current = None;
                self.claimed = 0;
                return Err(e);
            }
        }
        spare.iter_mut().for_each(ChannelHandle::release);

        self.claimed = clips.len();
        let remaining = request.duration() - request.start_time;
        self.watcher = Some(EndOfTrackWatcher::new(remaining));

        info!(
            "Playing {} on {} channel(s) from {:.2}s (loop: {looping})",
            request.describe(),
            self.claimed,
            request.start_time
        );
        self.current = Some(request);
        Ok(())
    }

    /// True if any claimed channel is still sounding, whatever channel 0 does.
    fn is_audible(&self) -> bool {
        self.current.is_some() && self.claimed_channels().iter().any(ChannelHandle::is_playing)
    }

    fn cancel_transitions(&mut self) {
        self.fade = None;
        self.watcher = None;
    }

    fn on_fade_completed(&mut self) {
        debug!("Fade completed ({:?})", self.mode);

        let queued = self.queued.take();
        match (self.mode, queued) {
            (PlaybackMode::Stopped, _) => {}
            (PlaybackMode::Playlist, _) if self.active_playlist.is_none() => {}
            (_, Some(QueuedRequest { request, mode })) => {
                if let Err(e) = self.play(request, mode) {
                    error!("Failed to play queued request: {e}");
                }
            }
            (_, None) => self.stop(true),
        }
    }

    fn on_track_finished(&mut self) {
        let info = self.current_track_info().unwrap_or_default();
        debug!("Track finished: {info}");
        self.listeners.notify(&TrackFinished { info });

        match self.mode {
            PlaybackMode::Stopped => {}
            PlaybackMode::Solo => self.stop(true),
            PlaybackMode::Playlist => {
                let Some(playlist) = self.active_playlist.clone() else {
                    self.stop(true);
                    return;
                };

                let next = {
                    let mut playlist = playlist.lock();
                    if playlist.advance() {
                        Some(playlist.current())
                    } else {
                        None
                    }
                };

                match next {
                    Some(Ok(request)) => {
                        if let Err(e) = self.play(request, PlaybackMode::Playlist) {
                            error!("Failed to play next playlist entry: {e}");
                            self.stop(true);
                        }
                    }
                    Some(Err(e)) => {
                        error!("Failed to read next playlist entry: {e}");
                        self.stop(true);
                    }
                    None => {
                        info!("Playlist finished");
                        self.active_playlist = None;
                        self.stop(true);
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("mode", &self.mode)
            .field("current", &self.current_track_info())
            .field("claimed", &self.claimed)
            .field("fading", &self.fade.is_some())
            .field("queued", &self.queued.is_some())
            .field("channels", &self.pool.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;
    use crate::backend::VirtualBackend;
    use proptest::prelude::*;
    use stemdeck_core::{MusicTrack, Playlist};

    const FRAME: f64 = 0.05;

    fn engine() -> PlaybackEngine {
        PlaybackEngine::new(Arc::new(VirtualBackend::new()), EngineConfig::default()).unwrap()
    }

    fn track(name: &str, stems: usize, duration: f64) -> MusicTrack {
        (0..stems).fold(MusicTrack::new(name), |t, i| {
            t.with_clip(AudioClip::new(format!("{name}_{i}"), duration))
        })
    }

    fn run(engine: &mut PlaybackEngine, seconds: f64) {
        let frames = (seconds / FRAME).ceil() as usize;
        for _ in 0..frames {
            engine.tick(FrameTime::uniform(FRAME));
        }
    }

    fn clip_names(engine: &PlaybackEngine) -> Vec<String> {
        engine
            .claimed_channels()
            .iter()
            .map(|c| c.clip().unwrap().name.clone())
            .collect()
    }

    #[test]
    fn test_two_channel_track_volumes_and_completion() {
        let mut engine = engine();
        let mut t = track("Forest", 2, 1.0).with_master_volume(0.5);
        t.channels[1].set_enabled(false);

        let sub = engine.subscribe_track_finished();
        engine.play_track(t.into_shared(), 0.0).unwrap();

        assert_eq!(engine.mode(), PlaybackMode::Solo);
        assert!(engine.is_playing());
        assert!((engine.channels()[0].volume() - 0.5).abs() < 1e-6);
        assert!(engine.channels()[1].volume().abs() < 1e-6);

        run(&mut engine, 1.5);

        assert_eq!(sub.try_recv().unwrap().info, "Music Track: Forest");
        assert!(sub.try_recv().is_none());
        assert_eq!(engine.mode(), PlaybackMode::Stopped);
        assert!(!engine.is_playing());
        assert!(engine.channels().iter().all(|c| !c.is_playing()));
    }

    #[test]
    fn test_new_request_waits_for_fade() {
        let mut engine = engine();
        engine.play_track(track("A", 2, 30.0).into_shared(), 0.0).unwrap();
        run(&mut engine, 1.0);

        engine.play_track(track("B", 3, 30.0).into_shared(), 0.0).unwrap();
        assert!(engine.is_fading());
        assert_eq!(engine.queued_request().unwrap().describe(), "Music Track: B");
        assert_eq!(clip_names(&engine), vec!["A_0", "A_1"]);

        engine.tick(FrameTime::uniform(0.25));
        assert!(engine.is_fading());
        assert!(engine.channels()[0].is_playing());
        assert!(engine.channels()[0].volume() < 1.0);

        run(&mut engine, 1.0);
        assert!(!engine.is_fading());
        assert!(engine.queued_request().is_none());
        assert_eq!(clip_names(&engine), vec!["B_0", "B_1", "B_2"]);
        assert!(engine.claimed_channels().iter().all(ChannelHandle::is_playing));
        assert!((engine.channels()[0].volume() - 1.0).abs() < 1e-6);
        assert_eq!(engine.current_track_info().unwrap(), "Music Track: B");
    }

    #[test]
    fn test_latest_request_replaces_queued_one() {
        let mut engine = engine();
        engine.play_file(AudioClip::new("a", 30.0), 0.0).unwrap();
        engine.play_file(AudioClip::new("b", 30.0), 0.0).unwrap();
        engine.tick(FrameTime::uniform(0.5));
        let partial = engine.channels()[0].volume();

        engine.play_file(AudioClip::new("c", 30.0), 0.0).unwrap();
        assert_eq!(engine.queued_request().unwrap().describe(), "Audio File: c");
        assert!((engine.channels()[0].volume() - partial).abs() < 1e-6);

        run(&mut engine, 1.0);
        assert_eq!(engine.current_track_info().unwrap(), "Audio File: c");
    }

    #[test]
    fn test_narrower_track_releases_spare_channels() {
        let mut engine = engine();
        engine.play_track(track("Wide", 3, 2.0).into_shared(), 0.0).unwrap();
        engine.stop(true);
        engine.play_file(AudioClip::new("jingle", 2.0), 0.0).unwrap();

        assert_eq!(engine.channels().len(), 3);
        assert_eq!(engine.claimed_channels().len(), 1);
        assert!(engine.channels()[1].clip().is_none());
        assert!(!engine.channels()[2].is_playing());
    }

    #[test]
    fn test_playlist_plays_every_entry_then_stops() {
        let mut engine = engine();
        let playlist = Playlist::of_tracks(
            "Set",
            vec![track("One", 1, 1.0), track("Two", 2, 1.0), track("Three", 1, 1.0)],
        )
        .into_shared();

        let sub = engine.subscribe_track_finished();
        engine.play_playlist(playlist.clone()).unwrap();
        assert_eq!(engine.mode(), PlaybackMode::Playlist);
        assert!(engine.has_active_playlist());

        run(&mut engine, 1.5);
        assert_eq!(engine.current_track_info().unwrap(), "Music Track: Two");
        run(&mut engine, 1.0);
        assert_eq!(engine.current_track_info().unwrap(), "Music Track: Three");
        run(&mut engine, 1.5);

        let finished: Vec<_> = sub.receiver().try_iter().map(|e| e.info).collect();
        assert_eq!(
            finished,
            vec!["Music Track: One", "Music Track: Two", "Music Track: Three"]
        );
        assert_eq!(engine.mode(), PlaybackMode::Stopped);
        assert!(!engine.has_active_playlist());
        assert!(!engine.is_playing());
        assert_eq!(playlist.lock().cursor(), 2);
    }

    #[test]
    fn test_looping_playlist_wraps() {
        let mut engine = engine();
        let playlist = Playlist::of_files(
            "Loop",
            vec![AudioClip::new("x", 1.0), AudioClip::new("y", 1.0)],
        )
        .with_looping(true)
        .into_shared();

        engine.play_playlist(playlist).unwrap();
        run(&mut engine, 2.2);
        assert_eq!(engine.current_track_info().unwrap(), "Audio File: x");
        assert!(engine.is_playing());
    }

    #[test]
    fn test_playlist_forces_loop_off() {
        let mut engine = engine();
        let looping = track("Loopy", 2, 1.0).with_looping(true);
        engine
            .play_playlist(Playlist::of_tracks("P", vec![looping.clone()]).into_shared())
            .unwrap();
        assert!(engine.claimed_channels().iter().all(|c| !c.looping()));

        engine.stop(true);
        engine.play_track(looping.into_shared(), 0.0).unwrap();
        assert!(engine.claimed_channels().iter().all(ChannelHandle::looping));
    }

    #[test]
    fn test_solo_request_leaves_playlist_mode() {
        let mut engine = engine();
        engine
            .play_playlist(Playlist::of_tracks("P", vec![track("T", 1, 5.0)]).into_shared())
            .unwrap();
        engine.play_file(AudioClip::new("sting", 1.0), 0.0).unwrap();
        assert_eq!(engine.mode(), PlaybackMode::Solo);
        assert!(!engine.has_active_playlist());
    }

    #[test]
    fn test_invalid_requests_are_noops() {
        let mut engine = engine();
        let err = engine
            .play_track(MusicTrack::new("Empty").into_shared(), 0.0)
            .unwrap_err();
        assert!(matches!(err, Error::EmptyTrack(_)));

        let err = engine
            .play_playlist(Playlist::of_files("None", Vec::new()).into_shared())
            .unwrap_err();
        assert!(matches!(err, Error::EmptyPlaylist(_)));
        assert!(!engine.has_active_playlist());

        let err = engine
            .play(PlayRequest::file(AudioClip::new("x", 1.0)), PlaybackMode::Playlist)
            .unwrap_err();
        assert!(matches!(err, Error::ModeInconsistent(_)));

        assert_eq!(engine.mode(), PlaybackMode::Stopped);
        assert!(engine.current_request().is_none());
        assert!(engine.channels().is_empty());
    }

    #[test]
    fn test_stop_with_fade_never_reports_finished() {
        let mut engine = engine();
        let sub = engine.subscribe_track_finished();
        engine.play_file(AudioClip::new("theme", 1.0), 0.0).unwrap();
        engine.stop(false);
        assert!(engine.is_fading());
        assert_eq!(engine.listener_count(), 0);

        run(&mut engine, 3.0);
        assert!(!engine.is_playing());
        assert!(!engine.is_fading());
        assert!(sub.try_recv().is_none());
        assert!(sub.is_disconnected());
    }

    #[test]
    fn test_fade_runs_while_game_time_is_paused() {
        let mut engine = engine();
        engine.play_file(AudioClip::new("theme", 30.0), 0.0).unwrap();
        engine.stop(false);
        for _ in 0..30 {
            engine.tick(FrameTime::paused(FRAME));
        }
        assert!(!engine.is_fading());
        assert!(!engine.channels()[0].is_playing());
    }

    #[test]
    fn test_update_volume_applies_live_edits() {
        let mut engine = engine();
        let shared = track("Edit", 2, 10.0).into_shared();
        engine.play_track(shared.clone(), 0.0).unwrap();

        {
            let mut t = shared.write();
            t.set_master_volume(0.4);
            t.channels[0].set_enabled(false);
            t.channels[1].set_volume(0.5);
        }
        engine.update_volume();

        assert!(engine.channels()[0].volume().abs() < 1e-6);
        assert!((engine.channels()[1].volume() - 0.2).abs() < 1e-6);
        let found = engine.channel_for(&shared.read().channels[1]).unwrap();
        assert_eq!(found.index(), 1);
    }

    #[test]
    fn test_start_time_shortens_watch() {
        let mut engine = engine();
        let sub = engine.subscribe_track_finished();
        engine.play_file(AudioClip::new("long", 10.0), 9.0).unwrap();
        assert!((engine.current_time() - 9.0).abs() < 1e-9);
        run(&mut engine, 1.2);
        assert!(sub.try_recv().is_some());
    }

    #[test]
    fn test_rejected_playlist_leaves_session_untouched() {
        let mut engine = engine();
        engine.play_track(track("Solo", 1, 1.0).into_shared(), 0.0).unwrap();

        let playlist = Playlist::of_tracks(
            "Broken",
            vec![MusicTrack::new("Empty"), track("Next", 1, 1.0)],
        )
        .into_shared();
        let err = engine.play_playlist(playlist).unwrap_err();
        assert!(matches!(err, Error::EmptyTrack(_)));
        assert_eq!(engine.mode(), PlaybackMode::Solo);
        assert!(!engine.has_active_playlist());
        assert!(!engine.is_fading());

        run(&mut engine, 1.5);
        assert_eq!(engine.mode(), PlaybackMode::Stopped);
        assert!(!engine.is_playing());
        assert_eq!(engine.current_track_info().unwrap(), "Music Track: Solo");
    }

    #[test]
    fn test_active_until_watcher_fires() {
        let mut engine = engine();
        let sub = engine.subscribe_track_finished();
        let playlist = Playlist::of_files(
            "Pair",
            vec![AudioClip::new("a", 1.0), AudioClip::new("b", 1.0)],
        )
        .into_shared();
        engine.play_playlist(playlist).unwrap();

        // Voices run slightly ahead of game time
        let frame = FrameTime {
            delta: 0.0475,
            unscaled_delta: 0.05,
        };
        for _ in 0..21 {
            engine.tick(frame);
        }
        assert!(!engine.is_playing());
        assert!(engine.is_active());
        assert_eq!(engine.current_track_info().unwrap(), "Audio File: a");

        let mut ticks = 0;
        while engine.is_active() && ticks < 200 {
            engine.tick(frame);
            ticks += 1;
        }
        assert!(!engine.is_active());
        let finished: Vec<_> = sub.receiver().try_iter().map(|e| e.info).collect();
        assert_eq!(finished, vec!["Audio File: a", "Audio File: b"]);
        assert_eq!(engine.mode(), PlaybackMode::Stopped);
    }

    #[test]
    fn test_quiet_first_stem_does_not_cut_louder_ones() {
        let mut engine = engine();
        let mut a = track("A", 2, 30.0);
        a.channels[0].set_volume(0.1);
        engine.play_track(a.into_shared(), 0.0).unwrap();

        engine.play_file(AudioClip::new("b", 30.0), 0.0).unwrap();
        engine.tick(FrameTime::uniform(0.2));
        assert!(!engine.is_playing());
        assert!(engine.channels()[1].is_playing());

        engine.play_file(AudioClip::new("c", 30.0), 0.0).unwrap();
        assert!(engine.is_fading());
        assert_eq!(engine.queued_request().unwrap().describe(), "Audio File: c");
        assert!(engine.channels()[1].is_playing());
        assert!((engine.channels()[1].volume() - 0.8).abs() < 1e-6);

        run(&mut engine, 1.0);
        assert_eq!(engine.current_track_info().unwrap(), "Audio File: c");
        assert!(!engine.channels()[1].is_playing());
    }

    #[test]
    fn test_shutdown_clears_session() {
        let mut engine = engine();
        let sub = engine.subscribe_track_finished();
        engine
            .play_playlist(Playlist::of_tracks("P", vec![track("T", 2, 5.0)]).into_shared())
            .unwrap();
        engine.shutdown();

        assert!(!engine.is_playing());
        assert!(!engine.has_active_playlist());
        assert!(engine.current_request().is_none());
        assert!(engine.claimed_channels().is_empty());
        assert!(sub.is_disconnected());
    }

    proptest! {
        #[test]
        fn prop_committed_volumes_follow_channels(
            channels in prop::collection::vec((any::<bool>(), 0.0f32..=1.0), 1..6),
            master in 0.1f32..=1.0,
        ) {
            let mut engine = engine();
            let mut t = track("Prop", channels.len(), 10.0).with_master_volume(master);
            for (channel, (enabled, volume)) in t.channels.iter_mut().zip(&channels) {
                channel.set_enabled(*enabled);
                channel.set_volume(*volume);
            }
            let master = t.master_volume;
            let shared = t.into_shared();
            engine.play_track(shared.clone(), 0.0).unwrap();

            for (handle, (enabled, volume)) in engine.claimed_channels().iter().zip(&channels) {
                let expected = if *enabled { volume * master } else { 0.0 };
                prop_assert!((handle.volume() - expected).abs() < 1e-6);
            }

            for channel in &mut shared.write().channels {
                channel.set_enabled(!channel.enabled);
            }
            engine.update_volume();
            for (handle, (enabled, volume)) in engine.claimed_channels().iter().zip(&channels) {
                let expected = if *enabled { 0.0 } else { volume * master };
                prop_assert!((handle.volume() - expected).abs() < 1e-6);
            }
        }
    }
}
