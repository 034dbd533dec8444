//! Performance engine for one open song
//!
//! Owns the transport, mute-region engine, cue scheduler and meters, plus
//! the collaborators injected at construction. Everything runs from
//! [`PerformanceEngine::tick`]; each tick recomputes its decisions from the
//! current state, so stop and seek need no cancellation.

use std::sync::Arc;

use crossbeam::channel::Receiver;

use super::cues::{CommandSink, CueScheduler, TimedCue};
use super::error::{EngineError, EngineResult};
use super::meter::LevelMeter;
use super::mute::MuteRegionEngine;
use super::stream::StreamResolver;
use super::transport::{TrackEvent, TransportController};
use super::voice::LevelTap;
use crate::config::EngineConfig;
use crate::types::{MuteRegion, StereoLevels, Track, TrackId, TransportState, MAX_TRACKS};

pub struct PerformanceEngine {
    config: EngineConfig,
    resolver: Box<dyn StreamResolver>,
    master_tap: Option<Arc<LevelTap>>,
    transport: TransportController,
    mutes: MuteRegionEngine,
    cues: CueScheduler,
    meter: LevelMeter,
    tracks: Vec<Track>,
}

impl PerformanceEngine {
    pub fn new(
        config: EngineConfig,
        resolver: Box<dyn StreamResolver>,
        sink: Box<dyn CommandSink>,
        master_tap: Option<Arc<LevelTap>>,
    ) -> Self {
        let config = config.sanitized();
        Self {
            transport: TransportController::new(&config),
            mutes: MuteRegionEngine::new(),
            cues: CueScheduler::new(sink, config.cue_window_secs),
            meter: LevelMeter::new(&config),
            tracks: Vec::new(),
            resolver,
            master_tap,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Load a song, replacing the current one
    ///
    /// Returns once decoding has been started; poll [`Self::state`] (or
    /// subscribe) for readiness.
    pub fn load(
        &mut self,
        tracks: Vec<Track>,
        regions: &[MuteRegion],
        cues: Vec<TimedCue>,
    ) -> EngineResult<()> {
        if tracks.len() > MAX_TRACKS {
            return Err(EngineError::TooManyTracks {
                count: tracks.len(),
                max: MAX_TRACKS,
            });
        }
        log::info!(
            "Loading {} track(s), {} mute region(s), {} cue(s)",
            tracks.len(),
            regions.len(),
            cues.len()
        );

        self.mutes.clear();
        for track in &tracks {
            self.mutes.set_regions(track.id, regions);
        }
        self.cues.set_cues(cues);
        self.meter.reset();

        self.transport.load(&tracks, self.resolver.as_mut());
        self.tracks = tracks;
        let ids: Vec<TrackId> = self.tracks.iter().map(|t| t.id).collect();
        for id in ids {
            self.apply_mix(id);
        }
        Ok(())
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn play(&mut self) -> EngineResult<()> {
        self.transport.play()
    }

    pub fn pause(&mut self) {
        self.transport.pause();
    }

    /// Pause, rewind, reopen every gate and re-arm every cue
    pub fn stop(&mut self) {
        self.transport.stop();
        self.mutes.reset();
        let ramp = self.config.gate_ramp_secs();
        self.transport.for_each_stream(|_, stream| stream.ramp_gate(1.0, ramp));
        self.cues.reset();
        log::info!("Transport stopped");
    }

    /// Seek all tracks and re-arm cues; returns the clamped position
    pub fn seek(&mut self, time: f64) -> f64 {
        let time = self.transport.seek(time);
        self.cues.seek(time);
        time
    }

    /// Replace the mute regions of one track ("regions changed")
    ///
    /// Takes effect on the next tick; a region that does not cover the
    /// current position causes no gate change.
    pub fn set_regions(&mut self, track: TrackId, regions: &[MuteRegion]) -> EngineResult<()> {
        if !self.transport.contains(track) {
            return Err(EngineError::UnknownTrack(track));
        }
        self.mutes.set_regions(track, regions);
        Ok(())
    }

    pub fn set_cues(&mut self, cues: Vec<TimedCue>) {
        self.cues.set_cues(cues);
    }

    pub fn set_volume(&mut self, track: TrackId, volume: f32) -> EngineResult<()> {
        self.track_mut(track)?.volume = volume.clamp(0.0, 1.0);
        self.apply_mix(track);
        Ok(())
    }

    pub fn set_balance(&mut self, track: TrackId, balance: f32) -> EngineResult<()> {
        self.track_mut(track)?.balance = balance.clamp(-1.0, 1.0);
        self.apply_mix(track);
        Ok(())
    }

    pub fn set_muted(&mut self, track: TrackId, muted: bool) -> EngineResult<()> {
        self.track_mut(track)?.muted = muted;
        self.apply_all_mix();
        Ok(())
    }

    /// Solo changes the audibility of every other track too
    pub fn set_solo(&mut self, track: TrackId, solo: bool) -> EngineResult<()> {
        self.track_mut(track)?.solo = solo;
        self.apply_all_mix();
        Ok(())
    }

    fn track_mut(&mut self, track: TrackId) -> EngineResult<&mut Track> {
        self.tracks
            .iter_mut()
            .find(|t| t.id == track)
            .ok_or(EngineError::UnknownTrack(track))
    }

    /// Volume reaching the mixer: 0 unless the track is audible
    pub fn effective_gain(&self, track: TrackId) -> f32 {
        let any_solo = self.tracks.iter().any(|t| t.solo);
        self.tracks
            .iter()
            .find(|t| t.id == track)
            .filter(|t| !t.muted && !self.transport.is_failed(t.id) && (!any_solo || t.solo))
            .map_or(0.0, |t| t.volume)
    }

    fn apply_mix(&mut self, track: TrackId) {
        let gain = self.effective_gain(track);
        let Some(pan) = self.tracks.iter().find(|t| t.id == track).map(|t| t.balance) else {
            return;
        };
        let _ = self.transport.with_stream(track, |stream| {
            stream.set_gain(gain);
            stream.set_pan(pan);
        });
    }

    fn apply_all_mix(&mut self) {
        let ids: Vec<TrackId> = self.tracks.iter().map(|t| t.id).collect();
        for id in ids {
            self.apply_mix(id);
        }
    }

    /// One control tick; `now` is a monotonic clock in seconds
    pub fn tick(&mut self, now: f64) -> Arc<TransportState> {
        let events = self.transport.poll_readiness();
        if !events.is_empty() {
            for event in events {
                if let TrackEvent::Ready { track, channels } = event {
                    if let Ok(t) = self.track_mut(track) {
                        t.channel_count = channels;
                    }
                }
            }
            self.apply_all_mix();
        }

        // The tick that reaches the song end still owns its cue window
        let was_playing = self.transport.is_playing();
        let time = self.transport.tick();

        if self.transport.is_ready() {
            let ramp = self.config.gate_ramp_secs();
            let mutes = &mut self.mutes;
            self.transport.for_each_stream(|id, stream| {
                if let Some(change) = mutes.apply_tick(id, time) {
                    log::debug!("Track {} gate -> {} at {:.3}s", id, change.target, time);
                    stream.ramp_gate(change.target, ramp);
                }
            });
        }

        if was_playing {
            self.cues.apply_tick(time);
            self.transport.record_cue_failures(self.cues.failed_sends());
        }

        if self.meter.due(now) {
            let meter = &mut self.meter;
            self.transport.for_each_stream(|id, stream| {
                meter.update_track(id, stream.take_levels());
            });
            if let Some(tap) = &self.master_tap {
                self.meter.update_master(tap.take());
            }
        }

        self.transport.state()
    }

    pub fn state(&self) -> Arc<TransportState> {
        self.transport.state()
    }

    pub fn subscribe(&mut self) -> Receiver<Arc<TransportState>> {
        self.transport.subscribe()
    }

    /// Smoothed 0-100 levels; unknown tracks read silent
    pub fn track_levels(&self, track: TrackId) -> StereoLevels {
        self.meter.track_levels(track)
    }

    pub fn master_levels(&self) -> StereoLevels {
        self.meter.master_levels()
    }

    /// Held peak markers on the same 0-100 scale as the levels
    pub fn track_peaks(&self, track: TrackId) -> StereoLevels {
        self.meter.track_peaks(track)
    }

    pub fn master_peaks(&self) -> StereoLevels {
        self.meter.master_peaks()
    }

    pub fn cues(&self) -> &[TimedCue] {
        self.cues.cues()
    }
}
