//! Performance engine tunables
//!
//! The cue window and drift threshold are live-show heuristics rather than
//! hard guarantees, so they live here instead of being baked into the engine.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Control-domain tick rate (drift, mute gates, cues)
    pub tick_rate_hz: f64,
    /// A track further than this from the reference track gets repositioned
    pub drift_threshold_secs: f64,
    /// A cue fires while `time` is in `[timestamp, timestamp + window)`
    pub cue_window_secs: f64,
    /// Duration of the mute-gate fade
    pub gate_ramp_ms: f64,
    /// Level taps are sampled at this rate, independent of the tick rate
    pub meter_rate_hz: f64,
    /// Fraction of the distance to a rising target covered per meter interval
    pub meter_attack: f32,
    /// Maximum fall of a meter reading, in meter units (0-100) per second
    pub meter_decay_per_sec: f32,
    /// How long a peak marker holds before falling
    pub peak_hold_secs: f64,
    /// Queue depth for each transport-state subscriber
    pub subscriber_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60.0,
            drift_threshold_secs: 0.05,
            cue_window_secs: 0.5,
            gate_ramp_ms: 5.0,
            meter_rate_hz: 30.0,
            meter_attack: 0.95,
            meter_decay_per_sec: 60.0,
            peak_hold_secs: 1.5,
            subscriber_capacity: 16,
        }
    }
}

impl EngineConfig {
    /// Clamp every field into a usable range
    ///
    /// Config files are hand-edited; a zero tick rate or a negative window
    /// must not take the engine down.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.tick_rate_hz.is_finite() && self.tick_rate_hz > 0.0) {
            self.tick_rate_hz = defaults.tick_rate_hz;
        }
        self.tick_rate_hz = self.tick_rate_hz.clamp(10.0, 1000.0);
        if !self.drift_threshold_secs.is_finite() {
            self.drift_threshold_secs = defaults.drift_threshold_secs;
        }
        self.drift_threshold_secs = self.drift_threshold_secs.clamp(0.001, 1.0);
        if !(self.cue_window_secs.is_finite() && self.cue_window_secs > 0.0) {
            self.cue_window_secs = defaults.cue_window_secs;
        }
        if !self.gate_ramp_ms.is_finite() {
            self.gate_ramp_ms = defaults.gate_ramp_ms;
        }
        self.gate_ramp_ms = self.gate_ramp_ms.clamp(0.5, 100.0);
        if !(self.meter_rate_hz.is_finite() && self.meter_rate_hz > 0.0) {
            self.meter_rate_hz = defaults.meter_rate_hz;
        }
        self.meter_rate_hz = self.meter_rate_hz.clamp(1.0, self.tick_rate_hz);
        if !self.meter_attack.is_finite() {
            self.meter_attack = defaults.meter_attack;
        }
        self.meter_attack = self.meter_attack.clamp(0.01, 1.0);
        if !(self.meter_decay_per_sec.is_finite() && self.meter_decay_per_sec > 0.0) {
            self.meter_decay_per_sec = defaults.meter_decay_per_sec;
        }
        if !(self.peak_hold_secs.is_finite() && self.peak_hold_secs >= 0.0) {
            self.peak_hold_secs = defaults.peak_hold_secs;
        }
        self.subscriber_capacity = self.subscriber_capacity.max(1);
        self
    }

    /// Gate ramp duration in seconds
    pub fn gate_ramp_secs(&self) -> f64 {
        self.gate_ramp_ms / 1000.0
    }

    /// Seconds between two meter samples
    pub fn meter_interval_secs(&self) -> f64 {
        1.0 / self.meter_rate_hz
    }
}
