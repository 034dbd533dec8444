//! Per-track audio graph: gain, balance, mute gate
//!
//! A [`Voice`] is owned by the mixer inside the audio callback. The control
//! side keeps the matching [`VoiceAtomics`] to read position, seek
//! acknowledgement, gate value and peak levels without locking.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use basedrop::Shared;

use crate::types::{StereoLevels, StereoSample};

/// Peak level tap written by the audio thread, drained by the meter
///
/// The audio side keeps the running maximum; the reader swaps it back to
/// zero. Non-negative floats order the same as their bit patterns, so
/// `fetch_max` on the raw bits is an atomic float max.
#[derive(Debug, Default)]
pub struct LevelTap {
    left: AtomicU32,
    right: AtomicU32,
}

impl LevelTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a linear peak pair into the tap (audio thread)
    #[inline]
    pub fn record(&self, left: f32, right: f32) {
        if left.is_finite() && left > 0.0 {
            self.left.fetch_max(left.to_bits(), Ordering::Relaxed);
        }
        if right.is_finite() && right > 0.0 {
            self.right.fetch_max(right.to_bits(), Ordering::Relaxed);
        }
    }

    /// Peak since the previous call, resetting the tap
    pub fn take(&self) -> StereoLevels {
        StereoLevels::new(
            f32::from_bits(self.left.swap(0, Ordering::Relaxed)),
            f32::from_bits(self.right.swap(0, Ordering::Relaxed)),
        )
    }
}

/// Lock-free view of a voice for the control domain
#[derive(Debug, Default)]
pub struct VoiceAtomics {
    position: AtomicU64,
    playing: AtomicBool,
    seek_generation: AtomicU64,
    gate: AtomicU32,
    tap: LevelTap,
}

impl VoiceAtomics {
    pub fn new() -> Self {
        Self {
            gate: AtomicU32::new(1.0f32.to_bits()),
            ..Self::default()
        }
    }

    /// Playhead in frames as of the last rendered buffer
    #[inline]
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    /// Generation of the last seek the audio thread applied
    #[inline]
    pub fn applied_seek(&self) -> u64 {
        self.seek_generation.load(Ordering::Relaxed)
    }

    /// Gate gain at the end of the last rendered buffer
    #[inline]
    pub fn gate(&self) -> f32 {
        f32::from_bits(self.gate.load(Ordering::Relaxed))
    }

    pub fn tap(&self) -> &LevelTap {
        &self.tap
    }
}

/// Left/right gains for a balance control
///
/// Center is unity on both sides; turning towards one side attenuates the
/// other linearly and never boosts.
#[inline]
pub fn balance_gains(balance: f32) -> (f32, f32) {
    let b = balance.clamp(-1.0, 1.0);
    ((1.0 - b).min(1.0), (1.0 + b).min(1.0))
}

/// One playing track inside the mixer
pub struct Voice {
    pcm: Shared<Vec<StereoSample>>,
    atomics: Arc<VoiceAtomics>,
    position: u64,
    playing: bool,
    gain: f32,
    target_gain: f32,
    pan: f32,
    gate: f32,
    gate_target: f32,
    gate_step: f32,
    gate_remaining: u32,
}

/// Initial settings for a voice being attached
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceSettings {
    pub position: u64,
    pub playing: bool,
    pub gain: f32,
    pub pan: f32,
    pub gate: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            position: 0,
            playing: false,
            gain: 1.0,
            pan: 0.0,
            gate: 1.0,
        }
    }
}

impl Voice {
    pub fn new(
        pcm: Shared<Vec<StereoSample>>,
        atomics: Arc<VoiceAtomics>,
        settings: VoiceSettings,
    ) -> Self {
        let position = settings.position.min(pcm.len() as u64);
        let voice = Self {
            pcm,
            atomics,
            position,
            playing: settings.playing,
            gain: settings.gain,
            target_gain: settings.gain,
            pan: settings.pan,
            gate: settings.gate,
            gate_target: settings.gate,
            gate_step: 0.0,
            gate_remaining: 0,
        };
        voice.publish();
        voice
    }

    pub fn len(&self) -> u64 {
        self.pcm.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    pub fn seek(&mut self, frame: u64, generation: u64) {
        self.position = frame.min(self.len());
        self.atomics.seek_generation.store(generation, Ordering::Relaxed);
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.target_gain = gain.max(0.0);
    }

    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);
    }

    /// Start a linear gate fade from the current gate value
    pub fn ramp_gate(&mut self, target: f32, frames: u32) {
        self.gate_target = target.clamp(0.0, 1.0);
        if frames == 0 {
            self.gate = self.gate_target;
            self.gate_remaining = 0;
        } else {
            self.gate_step = (self.gate_target - self.gate) / frames as f32;
            self.gate_remaining = frames;
        }
    }

    /// Mix this voice into `out`
    pub fn render(&mut self, out: &mut [StereoSample]) {
        if out.is_empty() {
            return;
        }
        let len = self.len();
        let gain_step = (self.target_gain - self.gain) / out.len() as f32;
        let (pan_l, pan_r) = balance_gains(self.pan);
        let mut peak_l = 0.0f32;
        let mut peak_r = 0.0f32;

        for dst in out.iter_mut() {
            if self.gate_remaining > 0 {
                self.gate_remaining -= 1;
                self.gate = if self.gate_remaining == 0 {
                    self.gate_target
                } else {
                    self.gate + self.gate_step
                };
            }
            self.gain += gain_step;

            if !self.playing || self.position >= len {
                continue;
            }
            let src = self.pcm[self.position as usize];
            self.position += 1;

            let g = self.gain * self.gate;
            let left = src.left * g * pan_l;
            let right = src.right * g * pan_r;
            peak_l = peak_l.max(left.abs());
            peak_r = peak_r.max(right.abs());
            dst.left += left;
            dst.right += right;
        }

        self.gain = self.target_gain;
        self.atomics.tap.record(peak_l, peak_r);
        self.publish();
    }

    fn publish(&self) {
        self.atomics.position.store(self.position, Ordering::Relaxed);
        self.atomics.playing.store(self.playing, Ordering::Relaxed);
        self.atomics.gate.store(self.gate.to_bits(), Ordering::Relaxed);
    }
}
