//! Audio backend abstraction: the only I/O boundary of the engine.

use std::sync::atomic::{AtomicUsize, Ordering};

use stemdeck_core::{AudioClip, Result};

/// One audio-output voice, able to play a single clip at a time.
pub trait Voice: Send {
    /// Load a clip and prepare it for playback from `start_time` seconds.
    fn assign(&mut self, clip: &AudioClip, start_time: f64, looping: bool, volume: f32)
        -> Result<()>;

    /// Start (or restart) the assigned clip.
    fn play(&mut self);

    /// Stop playback. The clip stays assigned.
    fn stop(&mut self);

    fn set_volume(&mut self, volume: f32);

    fn volume(&self) -> f32;

    /// Whether the voice is still producing sound.
    fn is_playing(&self) -> bool;

    /// Playback position within the clip, in seconds.
    fn elapsed_time(&self) -> f64;

    /// Advance the voice clock by wall-clock seconds.
    ///
    /// Backends that run on their own audio clock ignore this.
    fn advance(&mut self, _delta: f64) {}
}

/// Factory for output voices.
pub trait AudioBackend: Send + Sync {
    /// Allocate a new, idle voice.
    fn create_voice(&self) -> Result<Box<dyn Voice>>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Backend whose voices only keep time. Nothing is sent to a device.
///
/// Used for headless runs and tests: voices move forward on `advance` and stop
/// at the end of their clip unless looping.
#[derive(Debug, Default)]
pub struct VirtualBackend {
    voices_created: AtomicUsize,
}

impl VirtualBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of voices allocated so far.
    pub fn voices_created(&self) -> usize {
        self.voices_created.load(Ordering::Relaxed)
    }
}

impl AudioBackend for VirtualBackend {
    fn create_voice(&self) -> Result<Box<dyn Voice>> {
        self.voices_created.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(VirtualVoice::default()))
    }

    fn name(&self) -> &str {
        "virtual"
    }
}

/// Voice of the [`VirtualBackend`].
#[derive(Debug, Default)]
pub struct VirtualVoice {
    duration: f64,
    position: f64,
    looping: bool,
    volume: f32,
    playing: bool,
}

impl Voice for VirtualVoice {
    fn assign(
        &mut self,
        clip: &AudioClip,
        start_time: f64,
        looping: bool,
        volume: f32,
    ) -> Result<()> {
        self.duration = clip.duration;
        self.position = start_time.clamp(0.0, clip.duration);
        self.looping = looping;
        self.volume = volume;
        self.playing = false;
        Ok(())
    }

    fn play(&mut self) {
        self.playing = self.position < self.duration || (self.looping && self.duration > 0.0);
    }

    fn stop(&mut self) {
        self.playing = false;
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn elapsed_time(&self) -> f64 {
        self.position
    }

    fn advance(&mut self, delta: f64) {
        if !self.playing {
            return;
        }

        self.position += delta;
        if self.position >= self.duration {
            if self.looping && self.duration > 0.0 {
                self.position %= self.duration;
            } else {
                self.position = 0.0;
                self.playing = false;
            }
        }
    }
}
