//! Common types for stemstage
//!
//! Fundamental audio types (stereo samples and buffers) plus the song data
//! model shared by the engine, the MIDI output and the player host.

use std::fmt;
use std::ops::{Index, IndexMut};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default output sample rate (48kHz); the real rate comes from the device.
pub const SAMPLE_RATE: u32 = 48000;

/// Maximum number of stems a song may carry
pub const MAX_TRACKS: usize = 6;

/// Audio sample type (32-bit float throughout the engine)
pub type Sample = f32;

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` so `&[StereoSample]` can be viewed as interleaved
/// `&[f32]` through bytemuck without copying.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Create a mono sample (same value in both channels)
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Get the peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

/// A buffer of stereo samples
///
/// The audio callback works on pre-allocated buffers whose working length
/// is set per callback with [`StereoBuffer::set_len_from_capacity`].
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a buffer from an existing Vec of StereoSamples
    pub fn from_vec(samples: Vec<StereoSample>) -> Self {
        Self { samples }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Fills any newly exposed elements with silence. Growing past the
    /// allocated capacity would allocate, so callers chunk their work.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        let current_len = self.samples.len();
        if new_len > current_len {
            debug_assert!(
                new_len <= self.samples.capacity(),
                "set_len_from_capacity called with len > capacity"
            );
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Zero-copy view of the samples as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }

    /// Get the per-channel peak amplitude in the buffer
    pub fn channel_peaks(&self) -> (Sample, Sample) {
        self.samples.iter().fold((0.0, 0.0), |(l, r), s| {
            (l.max(s.left.abs()), r.max(s.right.abs()))
        })
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

/// Track identifier as written in song files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One stem of a song plus its mixer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    /// Path to the audio file backing this stem
    #[serde(rename = "source")]
    pub source_ref: PathBuf,
    /// Linear volume 0.0..=1.0
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// Stereo balance -1.0 (left) ..= 1.0 (right)
    #[serde(default)]
    pub balance: f32,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
    /// Channel count reported by the decoder (0 until known)
    #[serde(default)]
    pub channel_count: u16,
}

fn default_volume() -> f32 {
    1.0
}

impl Track {
    pub fn new(id: u32, name: impl Into<String>, source_ref: impl Into<PathBuf>) -> Self {
        Self {
            id: TrackId(id),
            name: name.into(),
            source_ref: source_ref.into(),
            volume: 1.0,
            balance: 0.0,
            muted: false,
            solo: false,
            channel_count: 0,
        }
    }
}

/// A time range during which one track is silenced
///
/// Half-open: `start` is muted, `end` is not. Overlapping regions on the
/// same track behave as their union.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MuteRegion {
    pub id: u32,
    #[serde(rename = "track")]
    pub track_id: TrackId,
    pub start: f64,
    pub end: f64,
}

impl MuteRegion {
    pub fn new(id: u32, track_id: TrackId, start: f64, end: f64) -> Self {
        Self { id, track_id, start, end }
    }

    #[inline]
    pub fn contains(&self, time: f64) -> bool {
        self.start <= time && time < self.end
    }

    /// Zero-length (or inverted) regions never mute anything
    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.start < self.end)
    }
}

/// Snapshot of the transport
///
/// Exactly one authoritative instance exists; it is replaced wholesale on
/// every update and handed out as `Arc<TransportState>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportState {
    pub is_playing: bool,
    /// Seconds from song start, derived from the reference track
    pub current_time: f64,
    pub duration: f64,
    pub is_ready: bool,
    /// Tracks whose decode failed; they are muted and excluded from sync
    pub failed_tracks: Vec<TrackId>,
    /// Cues whose send was rejected by the command collaborator
    pub failed_cue_sends: u32,
    /// Number of drift corrections applied since load
    pub drift_corrections: u64,
}

/// Left/right level pair
///
/// Raw taps carry linear peak amplitude; meter readings are 0-100.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StereoLevels {
    pub left: f32,
    pub right: f32,
}

impl StereoLevels {
    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }
}
