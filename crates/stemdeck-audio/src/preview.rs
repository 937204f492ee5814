//! Live preview: audition a music track while editing its channel mix.
//!
//! Edits go to a working copy that is playing live. They only reach the saved
//! track through [`LivePreview::save`].

use stemdeck_core::{Error, MusicSettings, MusicTrack, Result, SharedTrack, TrackLibrary};
use tracing::{debug, info};

use crate::events::TrackFinishedSubscription;
use crate::player::MusicPlayer;

/// An editing session over one music track.
#[derive(Debug)]
pub struct LivePreview {
    selected: MusicTrack,
    working: SharedTrack,
    position: f64,
    subscription: Option<TrackFinishedSubscription>,
}

impl LivePreview {
    pub fn new(selected: MusicTrack) -> Result<Self> {
        selected.validate()?;
        let working = selected.clone().into_shared();
        Ok(Self {
            selected,
            working,
            position: 0.0,
            subscription: None,
        })
    }

    /// Open the track pre-selected in the settings, if there is one.
    ///
    /// The pre-selection is consumed.
    pub fn from_settings(
        settings: &mut MusicSettings,
        library: &TrackLibrary,
    ) -> Result<Option<Self>> {
        let Some(name) = settings.take_pre_selected_track() else {
            return Ok(None);
        };
        debug!("Opening pre-selected track '{name}'");
        Self::new(library.track(&name)?).map(Some)
    }

    /// Switch to another track, stopping the current preview first.
    pub fn set_track(&mut self, track: MusicTrack, player: &mut MusicPlayer) -> Result<()> {
        track.validate()?;
        self.stop(player);
        self.working = track.clone().into_shared();
        self.selected = track;
        Ok(())
    }

    /// Start playback from the current position, or stop if already playing.
    pub fn toggle_play(&mut self, player: &mut MusicPlayer) -> Result<()> {
        if player.is_playing() {
            player.stop(true);
            return Ok(());
        }
        self.start(player, self.position)
    }

    /// Stop and rewind.
    pub fn stop(&mut self, player: &mut MusicPlayer) {
        if player.is_playing() {
            player.stop(true);
        }
        self.subscription = None;
        self.position = 0.0;
    }

    /// Follow playback. Restarts the track when it finished on its own.
    pub fn poll(&mut self, player: &mut MusicPlayer) -> Result<()> {
        let finished = self
            .subscription
            .as_ref()
            .and_then(TrackFinishedSubscription::try_recv);

        if finished.is_some() {
            debug!("Preview reached the end, restarting");
            self.position = 0.0;
            return self.start(player, 0.0);
        }

        if player.is_playing() {
            self.position = player.current_time();
        }
        Ok(())
    }

    pub fn set_channel_enabled(
        &mut self,
        index: usize,
        enabled: bool,
        player: &mut MusicPlayer,
    ) -> Result<()> {
        self.working
            .write()
            .channel_mut(index)
            .ok_or_else(|| no_channel(index))?
            .set_enabled(enabled);
        player.update_volume();
        Ok(())
    }

    pub fn set_channel_volume(
        &mut self,
        index: usize,
        volume: f32,
        player: &mut MusicPlayer,
    ) -> Result<()> {
        self.working
            .write()
            .channel_mut(index)
            .ok_or_else(|| no_channel(index))?
            .set_volume(volume);
        player.update_volume();
        Ok(())
    }

    pub fn set_master_volume(&mut self, volume: f32, player: &mut MusicPlayer) {
        self.working.write().set_master_volume(volume);
        player.update_volume();
    }

    /// Applies from the next time the preview starts.
    pub fn set_looping(&mut self, looping: bool) {
        self.working.write().set_looping(looping);
    }

    /// Accept the edits and return the track to persist.
    pub fn save(&mut self) -> MusicTrack {
        self.selected = self.working.read().clone();
        info!("Saved changes to Music Track '{}'", self.selected.name);
        self.selected.clone()
    }

    /// Throw the edits away.
    pub fn discard(&mut self, player: &mut MusicPlayer) {
        *self.working.write() = self.selected.clone();
        player.update_volume();
    }

    pub fn is_dirty(&self) -> bool {
        *self.working.read() != self.selected
    }

    pub const fn position(&self) -> f64 {
        self.position
    }

    pub fn total_time(&self) -> f64 {
        self.working.read().duration()
    }

    pub const fn selected(&self) -> &MusicTrack {
        &self.selected
    }

    pub const fn working(&self) -> &SharedTrack {
        &self.working
    }

    /// Display labels such as `Ch. 1: drums`.
    pub fn channel_names(&self) -> Vec<String> {
        self.working
            .read()
            .channels
            .iter()
            .enumerate()
            .map(|(i, c)| format!("Ch. {}: {}", i + 1, c.clip.name))
            .collect()
    }

    /// Whether each channel of the working copy is sounding right now.
    pub fn channel_activity(&self, player: &MusicPlayer) -> Vec<bool> {
        let track = self.working.read();
        track
            .channels
            .iter()
            .map(|channel| {
                channel.enabled
                    && player
                        .engine()
                        .and_then(|engine| engine.channel_for(channel))
                        .is_some_and(|handle| handle.is_playing() && handle.volume() > 0.0)
            })
            .collect()
    }

    fn start(&mut self, player: &mut MusicPlayer, start_time: f64) -> Result<()> {
        self.subscription = Some(player.subscribe_track_finished()?);
        player.play_track(self.working.clone(), start_time)
    }
}

fn no_channel(index: usize) -> Error {
    Error::InvalidArgument(format!("No channel at index {index}"))
}

/// Format seconds as `m:ss`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}
