//! Mute-region engine
//!
//! Keeps a sorted, merged set of mute ranges per track and decides each tick
//! whether the track's gate should be open (1.0) or closed (0.0). The
//! decision is a pure function of (time, regions); the engine only remembers
//! the last target it asked for so that unchanged ticks produce no ramp.

use std::collections::HashMap;

use crate::types::{MuteRegion, TrackId};

/// Gate transition requested by [`MuteRegionEngine::apply_tick`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateChange {
    /// 0.0 (silenced) or 1.0 (open)
    pub target: f32,
}

#[derive(Debug, Default)]
struct TrackGate {
    /// Non-overlapping `[start, end)` spans sorted by start
    spans: Vec<(f64, f64)>,
    /// Last target handed out; gates start open
    last_target: Option<f32>,
}

impl TrackGate {
    fn is_muted_at(&self, time: f64) -> bool {
        // First span starting after `time`; only its predecessor can contain it
        let idx = self.spans.partition_point(|&(start, _)| start <= time);
        idx > 0 && time < self.spans[idx - 1].1
    }
}

/// Per-track mute-region state
#[derive(Debug, Default)]
pub struct MuteRegionEngine {
    tracks: HashMap<TrackId, TrackGate>,
}

impl MuteRegionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the region set of one track
    ///
    /// Regions belonging to other tracks and empty regions are ignored.
    /// Overlapping regions are merged into their union. The last gate target
    /// is kept, so a new region that does not cover the current time causes
    /// no ramp on the next tick.
    pub fn set_regions(&mut self, track: TrackId, regions: &[MuteRegion]) {
        let mut spans: Vec<(f64, f64)> = regions
            .iter()
            .filter(|r| r.track_id == track && !r.is_empty())
            .map(|r| (r.start, r.end))
            .collect();
        spans.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut merged: Vec<(f64, f64)> = Vec::with_capacity(spans.len());
        for (start, end) in spans {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }

        log::debug!("Track {}: {} mute span(s)", track, merged.len());
        self.tracks.entry(track).or_default().spans = merged;
    }

    /// Whether `time` falls inside any region of `track`
    pub fn is_muted_at(&self, track: TrackId, time: f64) -> bool {
        self.tracks
            .get(&track)
            .is_some_and(|gate| gate.is_muted_at(time))
    }

    /// Gate target for `track` at `time`: 1.0 iff outside every region
    pub fn gate_target(&self, track: TrackId, time: f64) -> f32 {
        if self.is_muted_at(track, time) {
            0.0
        } else {
            1.0
        }
    }

    /// Decide the gate for this tick
    ///
    /// Returns a change only when the target differs from the last one handed
    /// out, so repeated calls with the same (time, regions) are silent.
    pub fn apply_tick(&mut self, track: TrackId, time: f64) -> Option<GateChange> {
        let gate = self.tracks.entry(track).or_default();
        let target = if gate.is_muted_at(time) { 0.0 } else { 1.0 };
        let last = gate.last_target.unwrap_or(1.0);
        gate.last_target = Some(target);
        (target != last).then_some(GateChange { target })
    }

    /// Clear the gate memory of every track (regions are kept)
    ///
    /// Callers reopen all gates after a reset; the next tick recomputes.
    pub fn reset(&mut self) {
        for gate in self.tracks.values_mut() {
            gate.last_target = None;
        }
    }

    /// Drop all tracks and regions
    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}
