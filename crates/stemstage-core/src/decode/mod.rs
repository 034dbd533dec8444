//! Audio file decoding for track streams
//!
//! Files are decoded with Symphonia straight into stereo frames: mono
//! sources are duplicated into both channels while packets are converted,
//! and sources with more than two channels keep their first pair. Frames are
//! then resampled to the output rate with rubato when the rates differ.

mod loader;
mod resample;

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::types::StereoSample;

pub use loader::{spawn_decode, PendingDecode};
pub use resample::resample_frames;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to open {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported audio format: {0}")]
    Unsupported(String),

    #[error("No audio track found in {0:?}")]
    NoAudioTrack(PathBuf),

    #[error("No audio decoded from {0:?}")]
    Empty(PathBuf),

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("Decoder thread exited without a result")]
    Disconnected,
}

/// Fully decoded stem as stereo frames
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub frames: Vec<StereoSample>,
    pub sample_rate: u32,
    /// Channel count of the source file
    pub channels: u16,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames.len() as f64 / self.sample_rate as f64
    }
}

/// Append interleaved samples as stereo frames
fn push_frames(frames: &mut Vec<StereoSample>, interleaved: &[f32], channels: usize) {
    match channels {
        0 => {}
        1 => frames.extend(interleaved.iter().map(|&s| StereoSample::mono(s))),
        n => frames.extend(
            interleaved
                .chunks_exact(n)
                .map(|frame| StereoSample::new(frame[0], frame[1])),
        ),
    }
}

/// Decode a whole file at its native sample rate
pub fn decode_file(path: &Path) -> Result<DecodedAudio, DecodeError> {
    let file = File::open(path).map_err(|e| DecodeError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::NoAudioTrack(path.to_path_buf()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);
    if let Some(n_frames) = track.codec_params.n_frames {
        log::debug!("{:?}: {} frames declared", path, n_frames);
    }

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

    let mut frames: Vec<StereoSample> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("{:?}: error reading packet: {}", path, e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("{:?}: error decoding packet: {}", path, e);
                continue;
            }
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let buf = sample_buf.get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
        buf.copy_interleaved_ref(decoded);
        push_frames(&mut frames, buf.samples(), channels as usize);
    }

    if frames.is_empty() || sample_rate == 0 {
        return Err(DecodeError::Empty(path.to_path_buf()));
    }

    Ok(DecodedAudio {
        frames,
        sample_rate,
        channels,
    })
}

/// Decode a file and bring it to `output_rate`
pub fn decode_for_output(path: &Path, output_rate: u32) -> Result<DecodedAudio, DecodeError> {
    let decoded = decode_file(path)?;
    if decoded.sample_rate == output_rate {
        return Ok(decoded);
    }

    log::info!(
        "{:?}: resampling {}Hz -> {}Hz",
        path,
        decoded.sample_rate,
        output_rate
    );
    let frames = resample_frames(&decoded.frames, decoded.sample_rate, output_rate)?;
    Ok(DecodedAudio {
        frames,
        sample_rate: output_rate,
        channels: decoded.channels,
    })
}
