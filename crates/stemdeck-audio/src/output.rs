//! Audio output using cpal.

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, Stream, StreamConfig,
};
use stemdeck_core::{Error, Result};
use tracing::{debug, error, info};

use crate::mixer::SharedMix;

/// Audio output stream configuration.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

/// Output stream that renders the shared mix.
///
/// `cpal::Stream` is not `Send`, so this lives on the thread that created it.
pub struct AudioOutput {
    _stream: Stream,
    config: OutputConfig,
    device_name: String,
}

impl AudioOutput {
    /// Open the default output device.
    pub fn new(mix: SharedMix) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No output device found".to_string()))?;

        Self::with_device(device, mix)
    }

    #[allow(clippy::needless_pass_by_value)] // Device is typically moved
    pub fn with_device(device: Device, mix: SharedMix) -> Result<Self> {
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio output device: {device_name}");

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get output config: {e}")))?;

        debug!("Supported output config: {:?}", supported_config);

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        let output_config = OutputConfig {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, mix)?,
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, mix)?,
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, mix)?,
            _ => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {sample_format:?}"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {e}")))?;

        Ok(Self {
            _stream: stream,
            config: output_config,
            device_name,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &Device,
        config: &StreamConfig,
        mix: SharedMix,
    ) -> Result<Stream> {
        let channels = usize::from(config.channels.max(1));

        let err_fn = |err| {
            error!("Audio stream error: {err}");
        };

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let frames = data.len() / channels;
                    let mut stereo = vec![0.0f32; frames * 2];
                    mix.lock().render(&mut stereo);

                    for (frame, out) in stereo.chunks_exact(2).zip(data.chunks_mut(channels)) {
                        for (ch, sample) in out.iter_mut().enumerate() {
                            // Mono devices get the left channel, extra channels stay silent
                            let s = if ch < 2 { frame[ch] } else { 0.0 };
                            // Soft clipping using tanh for smooth limiting
                            let limited = if s.abs() > 0.9 { s.tanh() } else { s };
                            *sample = T::from_sample(limited);
                        }
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {e}")))?;

        Ok(stream)
    }

    pub const fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}
