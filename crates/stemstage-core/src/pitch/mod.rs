//! Grain-based pitch shifting
//!
//! [`GrainShifter`] is the single-channel DSP core. [`PitchShiftUnit`] wraps
//! two of them for the stereo master bus and owns an inbox that the control
//! side feeds through [`PitchControl`]. Nothing else crosses into the unit.

mod config;
mod grain;
mod unit;

pub use config::PitchConfig;
pub use grain::{
    clamp_ratio, hann_window, GrainShifter, GrainState, BYPASS_TOLERANCE, DEFAULT_GRAIN_SIZE,
    DEFAULT_HEADROOM, MAX_RATIO, MIN_RATIO, OLA_NORMALIZATION,
};
pub use unit::{pitch_unit, PitchControl, PitchMessage, PitchShiftUnit, PITCH_INBOX_CAPACITY};
