//! Grain-based pitch shifter (single channel)
//!
//! Every hop (`F/4` samples) the last `F` input samples are cut into a
//! Hann-windowed grain. Near unity ratio the grain is overlap-added as is.
//! Otherwise it is read back at `j * ratio` with Catmull-Rom interpolation,
//! re-windowed, faded in/out over one hop at each end and overlap-added
//! with loudness compensation.
//!
//! The periodic Hann window sums to 2.0 at 75% overlap, so the bypass path
//! scaled by [`OLA_NORMALIZATION`] reconstructs the input delayed by `F`
//! samples.

use std::f32::consts::PI;

/// Ratio limits (two octaves each way)
pub const MIN_RATIO: f32 = 0.25;
pub const MAX_RATIO: f32 = 4.0;

/// Ratios this close to 1.0 skip resynthesis
pub const BYPASS_TOLERANCE: f32 = 0.001;

/// Gain that makes four overlapping Hann grains sum to unity
pub const OLA_NORMALIZATION: f32 = 0.5;

pub const DEFAULT_GRAIN_SIZE: usize = 2048;
pub const DEFAULT_HEADROOM: f32 = 0.8;

const MIN_GRAIN_SIZE: usize = 64;
const MAX_GRAIN_SIZE: usize = 16384;

/// Processing state of the shifter
///
/// `GrainReady`, `Synthesizing` and `OverlapAdd` are passed through inside a
/// single call whenever a hop completes; between calls the shifter rests in
/// `Idle` (no input since reset) or `Buffering`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrainState {
    Idle,
    Buffering,
    GrainReady,
    Synthesizing,
    OverlapAdd,
}

/// Clamp a requested ratio into the supported range
pub fn clamp_ratio(ratio: f32) -> f32 {
    if ratio.is_finite() {
        ratio.clamp(MIN_RATIO, MAX_RATIO)
    } else {
        1.0
    }
}

/// Periodic Hann window of length `len`
pub fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / len as f32).cos()))
        .collect()
}

/// Catmull-Rom interpolation at a fractional index
///
/// Neighbour indices are clamped to the slice, so reads near either edge
/// never leave it.
#[inline]
fn read_cubic(data: &[f32], position: f32) -> f32 {
    let last = data.len() as isize - 1;
    let index = position.floor() as isize;
    let t = position - position.floor();
    let at = |i: isize| data[i.clamp(0, last) as usize];

    let (s0, s1, s2, s3) = (at(index - 1), at(index), at(index + 1), at(index + 2));
    let t2 = t * t;
    let t3 = t2 * t;

    let c0 = -0.5 * t3 + t2 - 0.5 * t;
    let c1 = 1.5 * t3 - 2.5 * t2 + 1.0;
    let c2 = -1.5 * t3 + 2.0 * t2 + 0.5 * t;
    let c3 = 0.5 * t3 - 0.5 * t2;

    s0 * c0 + s1 * c1 + s2 * c2 + s3 * c3
}

/// Streaming grain pitch shifter for one channel
///
/// All buffers are allocated in [`GrainShifter::new`]; processing never
/// allocates.
pub struct GrainShifter {
    grain_size: usize,
    hop: usize,
    window: Vec<f32>,
    /// Input ring; `input_pos` is the next write slot (and the oldest sample)
    input: Vec<f32>,
    input_pos: usize,
    filled: usize,
    since_grain: usize,
    /// Overlap-add accumulator; `output_pos` is the next sample to emit
    output: Vec<f32>,
    output_pos: usize,
    grain: Vec<f32>,
    shifted: Vec<f32>,
    ratio: f32,
    headroom: f32,
    state: GrainState,
}

/// Grain length actually used for a requested size: a power of two in
/// 64..=16384
pub fn effective_grain_size(grain_size: usize) -> usize {
    grain_size
        .clamp(MIN_GRAIN_SIZE, MAX_GRAIN_SIZE)
        .next_power_of_two()
}

impl GrainShifter {
    /// `grain_size` is rounded with [`effective_grain_size`]
    pub fn new(grain_size: usize, headroom: f32) -> Self {
        let grain_size = effective_grain_size(grain_size);
        Self {
            grain_size,
            hop: grain_size / 4,
            window: hann_window(grain_size),
            input: vec![0.0; grain_size],
            input_pos: 0,
            filled: 0,
            since_grain: 0,
            output: vec![0.0; grain_size],
            output_pos: 0,
            grain: vec![0.0; grain_size],
            shifted: vec![0.0; grain_size],
            ratio: 1.0,
            headroom: headroom.clamp(0.0, 1.0),
            state: GrainState::Idle,
        }
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        self.ratio = clamp_ratio(ratio);
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn grain_size(&self) -> usize {
        self.grain_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop
    }

    /// Delay between an input sample and its reconstruction, in samples
    pub fn latency(&self) -> usize {
        self.grain_size
    }

    pub fn state(&self) -> GrainState {
        self.state
    }

    /// Clear all history (the ratio is kept)
    pub fn reset(&mut self) {
        self.input.fill(0.0);
        self.output.fill(0.0);
        self.input_pos = 0;
        self.output_pos = 0;
        self.filled = 0;
        self.since_grain = 0;
        self.state = GrainState::Idle;
    }

    /// Process a block in place
    pub fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Push one input sample and pop one output sample
    #[inline]
    pub fn process_sample(&mut self, input: f32) -> f32 {
        let out = self.output[self.output_pos];
        self.output[self.output_pos] = 0.0;
        self.output_pos = (self.output_pos + 1) % self.grain_size;

        self.input[self.input_pos] = input;
        self.input_pos = (self.input_pos + 1) % self.grain_size;
        self.filled = (self.filled + 1).min(self.grain_size);
        self.since_grain += 1;
        self.state = GrainState::Buffering;

        if self.filled == self.grain_size && self.since_grain >= self.hop {
            self.since_grain = 0;
            self.run_grain();
        }

        out
    }

    fn run_grain(&mut self) {
        self.state = GrainState::GrainReady;
        let size = self.grain_size;
        for j in 0..size {
            self.grain[j] = self.window[j] * self.input[(self.input_pos + j) % size];
        }

        if (self.ratio - 1.0).abs() <= BYPASS_TOLERANCE {
            self.state = GrainState::OverlapAdd;
            for j in 0..size {
                let slot = (self.output_pos + j) % size;
                self.output[slot] += self.grain[j] * OLA_NORMALIZATION;
            }
        } else {
            self.state = GrainState::Synthesizing;
            self.synthesize();
            self.state = GrainState::OverlapAdd;
            for j in 0..size {
                let slot = (self.output_pos + j) % size;
                self.output[slot] += self.shifted[j];
            }
        }

        self.state = GrainState::Buffering;
    }

    fn synthesize(&mut self) {
        let size = self.grain_size;
        let hop = self.hop as f32;
        let end = (size - 1) as f32;
        let gain = self.ratio.abs().sqrt() * self.headroom * OLA_NORMALIZATION;

        for j in 0..size {
            let position = j as f32 * self.ratio;
            let mut value = if position > end {
                0.0
            } else {
                read_cubic(&self.grain, position)
            };
            value *= self.window[j];
            if j < self.hop {
                value *= j as f32 / hop;
            } else if j >= size - self.hop {
                value *= (size - j) as f32 / hop;
            }
            self.shifted[j] = value * gain;
        }
    }
}
