//! Level metering with VU-style ballistics
//!
//! Raw peak taps are sampled at a throttled rate (see [`LevelMeter::due`]),
//! converted to a 0-100 dB-linear scale and smoothed: fast attack, bounded
//! decay, and a peak marker that holds before falling.

use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::types::{StereoLevels, TrackId};

/// Level that maps to 0 on the meter scale
pub const METER_FLOOR_DB: f32 = -60.0;

/// Map a linear peak amplitude onto the 0-100 meter scale
///
/// 0 dBFS (and above) reads 100, [`METER_FLOOR_DB`] and below read 0.
pub fn amplitude_to_meter(amplitude: f32) -> f32 {
    if !(amplitude > 0.0) {
        return 0.0;
    }
    let db = 20.0 * amplitude.log10();
    ((db - METER_FLOOR_DB) / -METER_FLOOR_DB * 100.0).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ballistics {
    /// Fraction of the gap to a rising target closed per interval
    pub attack: f32,
    /// Maximum fall per interval, in meter units
    pub decay_per_interval: f32,
    /// Intervals a peak marker holds before falling
    pub hold_intervals: u32,
}

impl Ballistics {
    pub fn from_config(config: &EngineConfig) -> Self {
        let interval = config.meter_interval_secs();
        Self {
            attack: config.meter_attack,
            decay_per_interval: config.meter_decay_per_sec * interval as f32,
            hold_intervals: (config.peak_hold_secs / interval).round() as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ChannelMeter {
    level: f32,
    peak: f32,
    hold: u32,
}

impl ChannelMeter {
    fn update(&mut self, target: f32, b: &Ballistics) {
        if target > self.level {
            self.level += b.attack * (target - self.level);
        } else {
            self.level = (self.level - b.decay_per_interval).max(target);
        }

        if self.level >= self.peak {
            self.peak = self.level;
            self.hold = b.hold_intervals;
        } else if self.hold > 0 {
            self.hold -= 1;
        } else {
            self.peak = (self.peak - b.decay_per_interval).max(self.level);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct StereoMeter {
    left: ChannelMeter,
    right: ChannelMeter,
}

impl StereoMeter {
    fn update(&mut self, raw: StereoLevels, b: &Ballistics) {
        self.left.update(amplitude_to_meter(raw.left), b);
        self.right.update(amplitude_to_meter(raw.right), b);
    }

    fn levels(&self) -> StereoLevels {
        StereoLevels::new(self.left.level, self.right.level)
    }

    fn peaks(&self) -> StereoLevels {
        StereoLevels::new(self.left.peak, self.right.peak)
    }
}

/// Throttled per-track and master meters
pub struct LevelMeter {
    ballistics: Ballistics,
    interval: f64,
    next_due: Option<f64>,
    tracks: HashMap<TrackId, StereoMeter>,
    master: StereoMeter,
}

impl LevelMeter {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ballistics: Ballistics::from_config(config),
            interval: config.meter_interval_secs(),
            next_due: None,
            tracks: HashMap::new(),
            master: StereoMeter::default(),
        }
    }

    /// Whether a meter sample is due at `now` (monotonic seconds)
    ///
    /// Consumes the slot when it returns true. A stalled caller does not
    /// get a burst of catch-up samples.
    pub fn due(&mut self, now: f64) -> bool {
        match self.next_due {
            Some(next) if now < next => false,
            Some(next) => {
                let mut following = next + self.interval;
                if following <= now {
                    following = now + self.interval;
                }
                self.next_due = Some(following);
                true
            }
            None => {
                self.next_due = Some(now + self.interval);
                true
            }
        }
    }

    /// Feed one raw (linear peak) sample for a track
    pub fn update_track(&mut self, track: TrackId, raw: StereoLevels) {
        self.tracks
            .entry(track)
            .or_default()
            .update(raw, &self.ballistics);
    }

    /// Feed one raw (linear peak) sample for the master bus
    pub fn update_master(&mut self, raw: StereoLevels) {
        self.master.update(raw, &self.ballistics);
    }

    /// Smoothed track level (0-100); unknown tracks read silent
    pub fn track_levels(&self, track: TrackId) -> StereoLevels {
        self.tracks.get(&track).map(StereoMeter::levels).unwrap_or_default()
    }

    pub fn track_peaks(&self, track: TrackId) -> StereoLevels {
        self.tracks.get(&track).map(StereoMeter::peaks).unwrap_or_default()
    }

    pub fn master_levels(&self) -> StereoLevels {
        self.master.levels()
    }

    pub fn master_peaks(&self) -> StereoLevels {
        self.master.peaks()
    }

    /// Drop every reading back to silence
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.master = StereoMeter::default();
        self.next_due = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: TrackId = TrackId(0);

    fn meter() -> LevelMeter {
        // 30Hz, decay 60 units/s => 2 units per interval, hold 1.5s => 45 intervals
        LevelMeter::new(&EngineConfig::default())
    }

    #[test]
    fn test_db_scale() {
        assert_eq!(amplitude_to_meter(0.0), 0.0);
        assert_eq!(amplitude_to_meter(1.0), 100.0);
        assert_eq!(amplitude_to_meter(2.0), 100.0);
        assert!(amplitude_to_meter(0.001).abs() < 1e-3);
        assert!((amplitude_to_meter(0.031_622_78) - 50.0).abs() < 1e-2);
    }

    #[test]
    fn test_fast_attack() {
        let mut m = meter();
        m.update_track(T, StereoLevels::new(1.0, 0.0));
        let levels = m.track_levels(T);
        assert!((levels.left - 95.0).abs() < 1e-4);
        assert_eq!(levels.right, 0.0);
    }

    #[test]
    fn test_bounded_decay() {
        let mut m = meter();
        for _ in 0..50 {
            m.update_track(T, StereoLevels::new(1.0, 1.0));
        }
        let start = m.track_levels(T).left;
        m.update_track(T, StereoLevels::default());
        let after = m.track_levels(T).left;
        assert!((start - after - 2.0).abs() < 1e-3, "fell {}", start - after);
    }

    #[test]
    fn test_peak_holds_then_falls() {
        let mut m = meter();
        for _ in 0..50 {
            m.update_track(T, StereoLevels::new(1.0, 1.0));
        }
        let peak = m.track_peaks(T).left;

        for _ in 0..45 {
            m.update_track(T, StereoLevels::default());
        }
        assert_eq!(m.track_peaks(T).left, peak);

        m.update_track(T, StereoLevels::default());
        assert!(m.track_peaks(T).left < peak);
        assert!(m.track_peaks(T).left >= m.track_levels(T).left);
    }

    #[test]
    fn test_due_throttles() {
        let mut m = meter();
        assert!(m.due(0.0));
        assert!(!m.due(0.016));
        assert!(m.due(0.034));
        assert!(!m.due(0.05));
        // Stall: one sample, then back on the regular cadence
        assert!(m.due(5.0));
        assert!(!m.due(5.01));
    }

    #[test]
    fn test_unknown_track_reads_silent() {
        let m = meter();
        assert_eq!(m.track_levels(TrackId(42)), StereoLevels::default());
    }
}
