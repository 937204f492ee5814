//! Audio decoding using symphonia.

use std::io::Cursor;
use std::path::Path;

use bytes::Bytes;
use stemdeck_core::{Error, Result};
use symphonia::core::{
    audio::{AudioBufferRef, Signal},
    codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL},
    formats::{FormatOptions, FormatReader},
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, error};

/// A clip decoded to interleaved stereo samples.
#[derive(Debug, Clone)]
pub struct DecodedClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedClip {
    /// Number of stereo frames.
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / f64::from(self.sample_rate)
    }
}

/// Audio decoder wrapping symphonia.
pub struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
}

impl AudioDecoder {
    /// Open an audio file, using its extension as a format hint.
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| {
            Error::AudioDecode(format!("Failed to read {}: {e}", path.display()))
        })?;
        let extension = path.extension().and_then(|e| e.to_str());
        Self::from_bytes(Bytes::from(data), extension)
    }

    /// Create a decoder from an in-memory file.
    #[allow(clippy::needless_pass_by_value)] // Bytes is cheaply cloneable
    pub fn from_bytes(data: Bytes, extension: Option<&str>) -> Result<Self> {
        let cursor = Cursor::new(data.to_vec());
        let mss = MediaSourceStream::new(Box::new(cursor), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(extension) = extension {
            hint.with_extension(extension);
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let metadata_opts = MetadataOptions::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .map_err(|e| Error::AudioDecode(format!("Failed to probe format: {e}")))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::AudioDecode("No audio tracks found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(48000);
        #[allow(clippy::cast_possible_truncation)]
        let channels = track.codec_params.channels.map_or(2, |c| c.count() as u16);

        debug!(
            "Audio track: id={}, sample_rate={}, channels={}",
            track_id, sample_rate, channels
        );

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::AudioDecode(format!("Failed to create decoder: {e}")))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Decode the next packet and return interleaved f32 samples.
    pub fn decode_next(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(e) => {
                    return Err(Error::AudioDecode(format!("Failed to read packet: {e}")));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => return Ok(Some(audio_buffer_to_f32(&decoded))),
                Err(symphonia::core::errors::Error::DecodeError(e)) => {
                    error!("Decode error (skipping): {e}");
                }
                Err(e) => {
                    return Err(Error::AudioDecode(format!("Decode failed: {e}")));
                }
            }
        }
    }

    /// Total duration in seconds, if the container declares it.
    pub fn duration(&self) -> Option<f64> {
        let track = self
            .format
            .tracks()
            .iter()
            .find(|t| t.id == self.track_id)?;

        let time_base = track.codec_params.time_base?;
        let n_frames = track.codec_params.n_frames?;
        let time = time_base.calc_time(n_frames);

        #[allow(clippy::cast_precision_loss)]
        Some(time.seconds as f64 + time.frac)
    }

    /// Decode everything that is left, converted to stereo.
    pub fn decode_to_end(mut self) -> Result<DecodedClip> {
        let channels = usize::from(self.channels.max(1));
        let mut samples = Vec::new();
        while let Some(chunk) = self.decode_next()? {
            samples.extend(to_stereo(&chunk, channels));
        }
        Ok(DecodedClip {
            samples,
            sample_rate: self.sample_rate,
        })
    }
}

/// Decode a whole audio file to interleaved stereo.
pub fn decode_file(path: &Path) -> Result<DecodedClip> {
    let clip = AudioDecoder::open(path)?.decode_to_end()?;
    debug!(
        "Decoded {} ({:.2}s at {}Hz)",
        path.display(),
        clip.duration(),
        clip.sample_rate
    );
    Ok(clip)
}

/// Length of an audio file in seconds.
///
/// Uses the container header when it has one and decodes the file otherwise.
pub fn probe_duration(path: &Path) -> Result<f64> {
    let decoder = AudioDecoder::open(path)?;
    if let Some(duration) = decoder.duration() {
        return Ok(duration);
    }
    Ok(decoder.decode_to_end()?.duration())
}

/// Fold interleaved audio with any channel count into stereo.
fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        2 => samples.to_vec(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        _ => samples
            .chunks_exact(channels)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

/// Convert an `AudioBuffer` to interleaved f32 samples.
#[allow(clippy::cast_possible_truncation)]
fn audio_buffer_to_f32(buffer: &AudioBufferRef<'_>) -> Vec<f32> {
    match buffer {
        AudioBufferRef::F32(buf) => interleave(buf.planes().planes(), buf.frames(), |s| s),
        AudioBufferRef::F64(buf) => interleave(buf.planes().planes(), buf.frames(), |s| s as f32),
        #[allow(clippy::cast_precision_loss)]
        AudioBufferRef::S32(buf) => interleave(buf.planes().planes(), buf.frames(), |s| {
            s as f32 / i32::MAX as f32
        }),
        AudioBufferRef::S16(buf) => interleave(buf.planes().planes(), buf.frames(), |s| {
            f32::from(s) / f32::from(i16::MAX)
        }),
        AudioBufferRef::U8(buf) => interleave(buf.planes().planes(), buf.frames(), |s| {
            (f32::from(s) - 128.0) / 128.0
        }),
        _ => Vec::new(),
    }
}

fn interleave<S: Copy>(planes: &[&[S]], frames: usize, convert: impl Fn(S) -> f32) -> Vec<f32> {
    let mut output = Vec::with_capacity(frames * planes.len());
    for frame in 0..frames {
        for plane in planes {
            output.push(convert(plane[frame]));
        }
    }
    output
}
