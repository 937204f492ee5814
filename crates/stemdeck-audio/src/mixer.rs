//! Software mixer backend that plays voices through the default output device.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use stemdeck_core::{AudioClip, Error, Result};
use tracing::{debug, error, info};

use crate::backend::{AudioBackend, Voice};
use crate::decode::decode_file;
use crate::output::AudioOutput;
use crate::resample::resample_clip;

/// Mix state shared between the voices and the output callback.
pub type SharedMix = Arc<Mutex<Mix>>;

type ClipCache = Arc<Mutex<HashMap<String, Arc<[f32]>>>>;

/// One mixer voice: a decoded clip and a read position.
#[derive(Debug, Clone, Default)]
struct MixVoice {
    /// Interleaved stereo at the device rate.
    samples: Option<Arc<[f32]>>,
    frame: usize,
    looping: bool,
    volume: f32,
    playing: bool,
}

impl MixVoice {
    fn frames(&self) -> usize {
        self.samples.as_ref().map_or(0, |s| s.len() / 2)
    }

    fn render(&mut self, out: &mut [f32]) {
        if !self.playing {
            return;
        }
        let Some(samples) = self.samples.clone() else {
            self.playing = false;
            return;
        };
        let total = samples.len() / 2;

        for frame in out.chunks_exact_mut(2) {
            if self.frame >= total {
                if self.looping && total > 0 {
                    self.frame = 0;
                } else {
                    self.frame = 0;
                    self.playing = false;
                    return;
                }
            }
            frame[0] += samples[self.frame * 2] * self.volume;
            frame[1] += samples[self.frame * 2 + 1] * self.volume;
            self.frame += 1;
        }
    }
}

/// All voices of a [`MixerBackend`].
#[derive(Debug, Default)]
pub struct Mix {
    voices: Vec<MixVoice>,
}

impl Mix {
    /// Add every playing voice into the interleaved stereo buffer `out`.
    pub fn render(&mut self, out: &mut [f32]) {
        for voice in &mut self.voices {
            voice.render(out);
        }
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    fn add_voice(&mut self) -> usize {
        self.voices.push(MixVoice::default());
        self.voices.len() - 1
    }
}

/// Backend mixing its voices in software onto the default cpal device.
///
/// The output stream lives on a dedicated thread until the backend is dropped.
pub struct MixerBackend {
    mix: SharedMix,
    cache: ClipCache,
    sample_rate: u32,
    device_name: String,
    shutdown: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl MixerBackend {
    /// Open the default output device.
    pub fn new() -> Result<Self> {
        let mix = SharedMix::default();
        let (init_tx, init_rx) = bounded::<Result<(u32, String)>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let mix_clone = mix.clone();
        let thread = std::thread::Builder::new()
            .name("stemdeck-output".to_string())
            .spawn(move || {
                // cpal::Stream is not Send, so the output is created and dropped here
                match AudioOutput::new(mix_clone) {
                    Ok(output) => {
                        let _ = init_tx.send(Ok((
                            output.sample_rate(),
                            output.device_name().to_string(),
                        )));
                        let _ = shutdown_rx.recv();
                        debug!("Closing audio output on {}", output.device_name());
                    }
                    Err(e) => {
                        error!("Failed to initialize audio output: {e}");
                        let _ = init_tx.send(Err(e));
                    }
                }
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn output thread: {e}")))?;

        let (sample_rate, device_name) = init_rx.recv().map_err(|_| {
            Error::AudioOutput("Output thread exited before reporting".to_string())
        })??;

        info!("Audio output initialized: {sample_rate} Hz, device: {device_name}");

        Ok(Self {
            mix,
            cache: ClipCache::default(),
            sample_rate,
            device_name,
            shutdown: shutdown_tx,
            thread: Some(thread),
        })
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl AudioBackend for MixerBackend {
    fn create_voice(&self) -> Result<Box<dyn Voice>> {
        let id = self.mix.lock().add_voice();
        Ok(Box::new(MixerVoice {
            id,
            mix: self.mix.clone(),
            cache: self.cache.clone(),
            sample_rate: self.sample_rate,
        }))
    }

    fn name(&self) -> &str {
        "mixer"
    }
}

impl Drop for MixerBackend {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Audio output thread panicked");
            }
        }
    }
}

/// Voice of the [`MixerBackend`].
pub struct MixerVoice {
    id: usize,
    mix: SharedMix,
    cache: ClipCache,
    sample_rate: u32,
}

impl MixerVoice {
    fn with_voice<R>(&self, f: impl FnOnce(&mut MixVoice) -> R) -> R {
        let mut mix = self.mix.lock();
        f(&mut mix.voices[self.id])
    }

    /// Decoded samples for `clip`, decoding and resampling on first use.
    fn load(&self, clip: &AudioClip) -> Result<Arc<[f32]>> {
        if let Some(samples) = self.cache.lock().get(&clip.name) {
            return Ok(samples.clone());
        }

        let path = clip.path().ok_or_else(|| {
            Error::AudioDecode(format!("Audio clip '{}' has no file", clip.name))
        })?;
        let decoded = decode_file(path)?;
        let samples: Arc<[f32]> =
            resample_clip(&decoded.samples, 2, decoded.sample_rate, self.sample_rate)?.into();

        self.cache
            .lock()
            .insert(clip.name.clone(), samples.clone());
        Ok(samples)
    }
}

impl Voice for MixerVoice {
    fn assign(
        &mut self,
        clip: &AudioClip,
        start_time: f64,
        looping: bool,
        volume: f32,
    ) -> Result<()> {
        let samples = self.load(clip)?;
        let total = samples.len() / 2;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let frame = ((start_time.max(0.0) * f64::from(self.sample_rate)) as usize).min(total);

        self.with_voice(|voice| {
            *voice = MixVoice {
                samples: Some(samples),
                frame,
                looping,
                volume: volume.clamp(0.0, 1.0),
                playing: false,
            };
        });
        Ok(())
    }

    fn play(&mut self) {
        self.with_voice(|voice| {
            let frames = voice.frames();
            voice.playing = frames > 0 && (voice.frame < frames || voice.looping);
        });
    }

    fn stop(&mut self) {
        self.with_voice(|voice| voice.playing = false);
    }

    fn set_volume(&mut self, volume: f32) {
        self.with_voice(|voice| voice.volume = volume.clamp(0.0, 1.0));
    }

    fn volume(&self) -> f32 {
        self.with_voice(|voice| voice.volume)
    }

    fn is_playing(&self) -> bool {
        self.with_voice(|voice| voice.playing)
    }

    #[allow(clippy::cast_precision_loss)]
    fn elapsed_time(&self) -> f64 {
        let frame = self.with_voice(|voice| voice.frame);
        frame as f64 / f64::from(self.sample_rate.max(1))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;

    fn voice(frames: usize, looping: bool) -> MixVoice {
        MixVoice {
            samples: Some(vec![0.5f32; frames * 2].into()),
            frame: 0,
            looping,
            volume: 0.5,
            playing: true,
        }
    }

    #[test]
    fn test_voices_are_summed_with_volume() {
        let mut mix = Mix {
            voices: vec![voice(8, false), voice(8, false)],
        };
        let mut out = vec![0.0f32; 8];
        mix.render(&mut out);
        assert!(out.iter().all(|s| (s - 0.5).abs() < 1e-6));
        assert_eq!(mix.voices[0].frame, 4);
    }

    #[test]
    fn test_voice_stops_at_end_of_clip() {
        let mut v = voice(3, false);
        let mut out = vec![0.0f32; 10];
        v.render(&mut out);

        assert!(!v.playing);
        assert_eq!(v.frame, 0);
        assert!(out[..6].iter().all(|s| *s > 0.0));
        assert!(out[6..].iter().all(|s| s.abs() < f32::EPSILON));
    }

    #[test]
    fn test_looping_voice_wraps() {
        let mut v = voice(3, true);
        let mut out = vec![0.0f32; 10];
        v.render(&mut out);

        assert!(v.playing);
        assert_eq!(v.frame, 2);
        assert!(out.iter().all(|s| *s > 0.0));
    }

    #[test]
    fn test_stopped_voice_is_silent() {
        let mut v = voice(3, false);
        v.playing = false;
        let mut out = vec![0.0f32; 4];
        v.render(&mut out);
        assert!(out.iter().all(|s| s.abs() < f32::EPSILON));
    }

    #[test]
    fn test_voice_reads_cached_clip() {
        let mix = SharedMix::default();
        let cache = ClipCache::default();
        cache
            .lock()
            .insert("pad".to_string(), vec![0.1f32; 200].into());
        let id = mix.lock().add_voice();

        let mut voice = MixerVoice {
            id,
            mix: mix.clone(),
            cache,
            sample_rate: 100,
        };
        voice
            .assign(&AudioClip::new("pad", 1.0), 0.5, false, 0.8)
            .unwrap();
        voice.play();

        assert!(voice.is_playing());
        assert!((voice.elapsed_time() - 0.5).abs() < 1e-9);
        assert!((voice.volume() - 0.8).abs() < 1e-6);

        let mut out = vec![0.0f32; 200];
        mix.lock().render(&mut out);
        assert!(!voice.is_playing());
    }

    #[test]
    fn test_clip_without_file_is_rejected() {
        let mix = SharedMix::default();
        let id = mix.lock().add_voice();
        let mut voice = MixerVoice {
            id,
            mix,
            cache: ClipCache::default(),
            sample_rate: 48000,
        };
        let err = voice
            .assign(&AudioClip::new("ghost", 1.0), 0.0, false, 1.0)
            .unwrap_err();
        assert!(matches!(err, Error::AudioDecode(_)));
    }
}
