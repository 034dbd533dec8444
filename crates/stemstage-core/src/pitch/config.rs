use serde::{Deserialize, Serialize};

use super::grain::{clamp_ratio, effective_grain_size, DEFAULT_GRAIN_SIZE, DEFAULT_HEADROOM};
use super::unit::{pitch_unit, PitchControl, PitchShiftUnit};

/// Master-bus pitch shift settings
///
/// When enabled the whole master bus is delayed by one grain
/// ([`PitchConfig::latency_frames`], about 43 ms at 48 kHz with the default
/// grain). Track positions and cue timing are not compensated: cues go out
/// that much ahead of the audio they belong to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    pub enabled: bool,
    /// Grain length in samples (rounded up to a power of two)
    pub grain_size: usize,
    /// Ratio applied when the unit starts (1.0 = unshifted)
    pub initial_ratio: f32,
    /// Fixed gain against overlap-add clipping
    pub headroom: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            grain_size: DEFAULT_GRAIN_SIZE,
            initial_ratio: 1.0,
            headroom: DEFAULT_HEADROOM,
        }
    }
}

impl PitchConfig {
    /// Build the control/unit pair, or nothing when disabled
    pub fn build(&self) -> Option<(PitchControl, PitchShiftUnit)> {
        if !self.enabled {
            return None;
        }
        let (mut control, unit) = pitch_unit(self.grain_size, self.headroom);
        control.set_ratio(clamp_ratio(self.initial_ratio));
        Some((control, unit))
    }

    /// Extra output delay in frames (0 when disabled)
    pub fn latency_frames(&self) -> usize {
        if self.enabled {
            effective_grain_size(self.grain_size)
        } else {
            0
        }
    }

    pub fn latency_secs(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.latency_frames() as f64 / sample_rate as f64
    }
}
