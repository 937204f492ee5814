//! Audio resampling using rubato.

use rubato::{FftFixedIn, Resampler as RubatoResampler};
use stemdeck_core::{Error, Result};
use tracing::debug;

const CHUNK_SIZE: usize = 1024;

/// Resampler matching decoded clips to the device sample rate.
pub struct Resampler {
    #[allow(clippy::struct_field_names)]
    resampler: FftFixedIn<f32>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Deinterleaved input waiting for a full chunk.
    input_buffer: Vec<Vec<f32>>,
}

impl Resampler {
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self> {
        let resampler = FftFixedIn::new(
            input_rate as usize,
            output_rate as usize,
            CHUNK_SIZE,
            2,
            channels,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to create resampler: {e}")))?;

        if input_rate != output_rate {
            debug!(
                "Resampler created: {}Hz -> {}Hz, {} channels",
                input_rate, output_rate, channels
            );
        }

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            channels,
            input_buffer: vec![Vec::new(); channels],
        })
    }

    pub const fn needs_resampling(&self) -> bool {
        self.input_rate != self.output_rate
    }

    pub const fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub const fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Process interleaved samples and return resampled interleaved samples.
    ///
    /// Input that does not fill a whole chunk is kept for the next call or `flush`.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if !self.needs_resampling() {
            return Ok(input.to_vec());
        }

        self.deinterleave(input);

        let mut all_output = Vec::new();
        while self.input_buffer[0].len() >= CHUNK_SIZE {
            let chunk: Vec<Vec<f32>> = self
                .input_buffer
                .iter_mut()
                .map(|ch| ch.drain(..CHUNK_SIZE).collect())
                .collect();

            let resampled = self
                .resampler
                .process(&chunk, None)
                .map_err(|e| Error::AudioOutput(format!("Resample failed: {e}")))?;
            all_output.extend(self.interleave(&resampled, usize::MAX));
        }

        Ok(all_output)
    }

    /// Process whatever input is still buffered (for end of clip).
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        if !self.needs_resampling() || self.input_buffer[0].is_empty() {
            self.input_buffer.iter_mut().for_each(Vec::clear);
            return Ok(Vec::new());
        }

        let remaining = self.input_buffer[0].len();
        let padding = CHUNK_SIZE - remaining;

        let chunk: Vec<Vec<f32>> = self
            .input_buffer
            .iter_mut()
            .map(|ch| {
                let mut data: Vec<f32> = std::mem::take(ch);
                data.extend(std::iter::repeat_n(0.0, padding));
                data
            })
            .collect();

        let resampled = self
            .resampler
            .process(&chunk, None)
            .map_err(|e| Error::AudioOutput(format!("Resample failed: {e}")))?;

        // Only take the non-padded portion
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let output_frames =
            (remaining as f64 * f64::from(self.output_rate) / f64::from(self.input_rate)) as usize;
        Ok(self.interleave(&resampled, output_frames))
    }

    pub fn reset(&mut self) {
        self.resampler.reset();
        self.input_buffer.iter_mut().for_each(Vec::clear);
    }

    fn deinterleave(&mut self, input: &[f32]) {
        for frame in input.chunks_exact(self.channels) {
            for (buffer, sample) in self.input_buffer.iter_mut().zip(frame) {
                buffer.push(*sample);
            }
        }
    }

    /// Interleave at most `frames` frames of resampler output.
    fn interleave(&self, channels: &[Vec<f32>], frames: usize) -> Vec<f32> {
        let Some(first) = channels.first() else {
            return Vec::new();
        };

        let frames = frames.min(first.len());
        let mut output = Vec::with_capacity(frames * self.channels);
        for frame in 0..frames {
            for ch in channels {
                output.push(ch[frame]);
            }
        }
        output
    }
}

/// Convert a whole interleaved clip from `input_rate` to `output_rate`.
pub fn resample_clip(
    samples: &[f32],
    channels: usize,
    input_rate: u32,
    output_rate: u32,
) -> Result<Vec<f32>> {
    if input_rate == output_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let mut resampler = Resampler::new(input_rate, output_rate, channels)?;
    let mut output = resampler.process(samples)?;
    output.extend(resampler.flush()?);
    Ok(output)
}
