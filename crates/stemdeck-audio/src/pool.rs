//! Pool of output channels that only ever grows.

use std::sync::Arc;

use stemdeck_core::{AudioClip, Result};
use tracing::debug;

use crate::backend::{AudioBackend, Voice};

/// One output channel of the pool.
///
/// Caches what was last assigned so meters and lookups never query the backend.
pub struct ChannelHandle {
    index: usize,
    voice: Box<dyn Voice>,
    clip: Option<AudioClip>,
    looping: bool,
}

impl ChannelHandle {
    /// Position of this channel in the pool. Stable for the pool's lifetime.
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Clip currently assigned, if any.
    pub const fn clip(&self) -> Option<&AudioClip> {
        self.clip.as_ref()
    }

    pub const fn looping(&self) -> bool {
        self.looping
    }

    pub fn volume(&self) -> f32 {
        self.voice.volume()
    }

    pub fn is_playing(&self) -> bool {
        self.voice.is_playing()
    }

    pub fn elapsed_time(&self) -> f64 {
        self.voice.elapsed_time()
    }

    /// Assign a clip and start it.
    pub(crate) fn start(
        &mut self,
        clip: &AudioClip,
        start_time: f64,
        looping: bool,
        volume: f32,
    ) -> Result<()> {
        self.voice.assign(clip, start_time, looping, volume)?;
        self.clip = Some(clip.clone());
        self.looping = looping;
        self.voice.play();
        Ok(())
    }

    pub(crate) fn set_volume(&mut self, volume: f32) {
        self.voice.set_volume(volume);
    }

    pub(crate) fn stop(&mut self) {
        self.voice.stop();
    }

    /// Stop and forget the assigned clip.
    pub(crate) fn release(&mut self) {
        self.voice.stop();
        self.voice.set_volume(0.0);
        self.clip = None;
        self.looping = false;
    }

    fn advance(&mut self, delta: f64) {
        self.voice.advance(delta);
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("index", &self.index)
            .field("clip", &self.clip.as_ref().map_or("empty", |c| c.name.as_str()))
            .field("playing", &self.is_playing())
            .field("volume", &self.volume())
            .finish()
    }
}

/// Allocates output channels and reuses them between tracks.
pub struct ChannelPool {
    backend: Arc<dyn AudioBackend>,
    channels: Vec<ChannelHandle>,
}

impl ChannelPool {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            backend,
            channels: Vec::new(),
        }
    }

    /// Make sure at least `count` channels exist, creating idle ones as needed.
    ///
    /// Existing channels are never dropped or reordered.
    pub fn ensure(&mut self, count: usize) -> Result<&mut [ChannelHandle]> {
        if count > self.channels.len() {
            debug!(
                "Growing channel pool on '{}' from {} to {} channels",
                self.backend.name(),
                self.channels.len(),
                count
            );
        }

        while self.channels.len() < count {
            let mut voice = self.backend.create_voice()?;
            voice.set_volume(0.0);
            self.channels.push(ChannelHandle {
                index: self.channels.len(),
                voice,
                clip: None,
                looping: false,
            });
        }

        Ok(&mut self.channels)
    }

    /// Find the channel currently holding `clip`.
    pub fn handle_for(&self, clip: &AudioClip) -> Option<&ChannelHandle> {
        self.channels
            .iter()
            .find(|c| c.clip.as_ref().is_some_and(|assigned| assigned.same_asset(clip)))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ChannelHandle> {
        self.channels.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Option<&mut ChannelHandle> {
        self.channels.get_mut(index)
    }

    pub fn channels(&self) -> &[ChannelHandle] {
        &self.channels
    }

    pub(crate) fn channels_mut(&mut self) -> &mut [ChannelHandle] {
        &mut self.channels
    }

    /// Stop every channel immediately.
    pub(crate) fn stop_all(&mut self) {
        self.channels.iter_mut().for_each(ChannelHandle::stop);
    }

    /// Forward wall-clock time to every voice.
    pub(crate) fn advance(&mut self, delta: f64) {
        for channel in &mut self.channels {
            channel.advance(delta);
        }
    }
}
