//! Transport controller
//!
//! The single authority for play/pause/seek/stop. Current position comes
//! from the longest ready track; every other track is snapped back onto it
//! when it drifts past the configured threshold. State is published as a fresh
//! `Arc<TransportState>` on every change.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use super::error::{EngineError, EngineResult};
use super::stream::{StreamResolver, StreamStatus, TrackStream};
use crate::config::EngineConfig;
use crate::types::{Track, TrackId, TransportState};

/// Readiness change reported by [`TransportController::poll_readiness`]
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    Ready { track: TrackId, channels: u16 },
    Failed { track: TrackId, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Pending,
    Ready,
    Failed,
}

struct TransportTrack {
    id: TrackId,
    stream: Box<dyn TrackStream>,
    readiness: Readiness,
}

impl TransportTrack {
    fn is_ready(&self) -> bool {
        self.readiness == Readiness::Ready
    }
}

pub struct TransportController {
    tracks: Vec<TransportTrack>,
    state: Arc<TransportState>,
    subscribers: Vec<Sender<Arc<TransportState>>>,
    subscriber_capacity: usize,
    drift_threshold: f64,
}

impl TransportController {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            tracks: Vec::new(),
            state: Arc::new(TransportState::default()),
            subscribers: Vec::new(),
            subscriber_capacity: config.subscriber_capacity.max(1),
            drift_threshold: config.drift_threshold_secs,
        }
    }

    /// Open a stream for every track
    ///
    /// Returns immediately; readiness is picked up by [`Self::poll_readiness`].
    /// Streams of a previous song are dropped first.
    pub fn load(&mut self, tracks: &[Track], resolver: &mut dyn StreamResolver) {
        self.tracks.clear();
        self.tracks = tracks
            .iter()
            .map(|track| TransportTrack {
                id: track.id,
                stream: resolver.open(track),
                readiness: Readiness::Pending,
            })
            .collect();
        self.replace_state(TransportState::default());
    }

    /// Poll decode readiness of every pending track
    pub fn poll_readiness(&mut self) -> Vec<TrackEvent> {
        let mut events = Vec::new();
        for track in self.tracks.iter_mut().filter(|t| t.readiness == Readiness::Pending) {
            match track.stream.poll() {
                StreamStatus::Pending => {}
                StreamStatus::Ready => {
                    track.readiness = Readiness::Ready;
                    events.push(TrackEvent::Ready {
                        track: track.id,
                        channels: track.stream.channel_count(),
                    });
                }
                StreamStatus::Failed(reason) => {
                    log::warn!("Track {} failed to load, muting it: {}", track.id, reason);
                    track.readiness = Readiness::Failed;
                    events.push(TrackEvent::Failed {
                        track: track.id,
                        reason,
                    });
                }
            }
        }
        if events.is_empty() {
            return events;
        }

        let settled = self.tracks.iter().all(|t| t.readiness != Readiness::Pending);
        let any_ready = self.tracks.iter().any(TransportTrack::is_ready);
        let duration = self
            .tracks
            .iter()
            .filter(|t| t.is_ready())
            .filter_map(|t| t.stream.duration())
            .fold(0.0f64, f64::max);
        let failed_tracks: Vec<TrackId> = self
            .tracks
            .iter()
            .filter(|t| t.readiness == Readiness::Failed)
            .map(|t| t.id)
            .collect();

        let is_ready = settled && any_ready;
        if is_ready && !self.state.is_ready {
            log::info!(
                "Transport ready: {} track(s), {:.2}s, {} failed",
                self.tracks.len() - failed_tracks.len(),
                duration,
                failed_tracks.len()
            );
        }
        self.update(|state| {
            state.is_ready = is_ready;
            state.duration = duration;
            state.failed_tracks = failed_tracks;
        });
        events
    }

    pub fn state(&self) -> Arc<TransportState> {
        Arc::clone(&self.state)
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    pub fn is_failed(&self, track: TrackId) -> bool {
        self.state.failed_tracks.contains(&track)
    }

    pub fn track_ids(&self) -> Vec<TrackId> {
        self.tracks.iter().map(|t| t.id).collect()
    }

    pub fn contains(&self, track: TrackId) -> bool {
        self.tracks.iter().any(|t| t.id == track)
    }

    /// Run `f` on one track's stream
    pub fn with_stream<R>(
        &mut self,
        track: TrackId,
        f: impl FnOnce(&mut dyn TrackStream) -> R,
    ) -> EngineResult<R> {
        self.tracks
            .iter_mut()
            .find(|t| t.id == track)
            .map(|t| f(t.stream.as_mut()))
            .ok_or(EngineError::UnknownTrack(track))
    }

    /// Run `f` on every stream, in load order
    pub fn for_each_stream(&mut self, mut f: impl FnMut(TrackId, &mut dyn TrackStream)) {
        for track in &mut self.tracks {
            f(track.id, track.stream.as_mut());
        }
    }

    /// Receive every state published from now on
    ///
    /// The current state is delivered first. A subscriber that falls behind
    /// misses updates instead of stalling the transport.
    pub fn subscribe(&mut self) -> Receiver<Arc<TransportState>> {
        let (tx, rx) = channel::bounded(self.subscriber_capacity);
        let _ = tx.try_send(Arc::clone(&self.state));
        self.subscribers.push(tx);
        rx
    }

    /// Start every ready track
    ///
    /// Starting from the end of the song rewinds to 0 first.
    pub fn play(&mut self) -> EngineResult<()> {
        if !self.state.is_ready {
            return Err(EngineError::NotReady);
        }
        if self.state.is_playing {
            return Ok(());
        }
        if self.state.current_time >= self.state.duration {
            self.reposition(0.0);
        }
        for track in self.tracks.iter_mut().filter(|t| t.is_ready()) {
            track.stream.play();
        }
        let corrected = self.correct_drift();
        let time = self.reference_position().unwrap_or(self.state.current_time);
        self.update(|state| {
            state.is_playing = true;
            state.current_time = time;
            state.drift_corrections += corrected as u64;
        });
        log::info!("Playback started at {:.3}s", time);
        Ok(())
    }

    pub fn pause(&mut self) {
        for track in &mut self.tracks {
            track.stream.pause();
        }
        let time = self.reference_position().unwrap_or(self.state.current_time);
        self.update(|state| {
            state.is_playing = false;
            state.current_time = time;
        });
    }

    /// Pause and rewind to the song start
    pub fn stop(&mut self) {
        for track in &mut self.tracks {
            track.stream.pause();
        }
        self.reposition(0.0);
        self.update(|state| {
            state.is_playing = false;
            state.current_time = 0.0;
        });
    }

    /// Reposition every track; returns the clamped target
    pub fn seek(&mut self, time: f64) -> f64 {
        let time = if time.is_finite() {
            time.clamp(0.0, self.state.duration)
        } else {
            0.0
        };
        self.reposition(time);
        self.update(|state| state.current_time = time);
        log::debug!("Seek to {:.3}s", time);
        time
    }

    fn reposition(&mut self, time: f64) {
        for track in self.tracks.iter_mut().filter(|t| t.readiness != Readiness::Failed) {
            track.stream.set_position(time);
        }
    }

    /// Index of the longest ready track; ties go to the earliest in load order
    ///
    /// The longest track keeps moving until the song itself ends, so shorter
    /// tracks finishing early never hold the clock back.
    fn reference_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (index, track) in self.tracks.iter().enumerate().filter(|(_, t)| t.is_ready()) {
            let duration = track.stream.duration().unwrap_or(0.0);
            if best.map_or(true, |(_, longest)| duration > longest) {
                best = Some((index, duration));
            }
        }
        best.map(|(index, _)| index)
    }

    fn reference_position(&self) -> Option<f64> {
        self.reference_index()
            .map(|index| self.tracks[index].stream.position())
    }

    /// Snap drifting tracks back onto the reference position
    ///
    /// A track shorter than the reference is only compared up to its own
    /// end. Returns the number of tracks repositioned.
    pub fn correct_drift(&mut self) -> usize {
        let Some(reference_index) = self.reference_index() else {
            return 0;
        };
        let reference = self.tracks[reference_index].stream.position();
        let threshold = self.drift_threshold;
        let mut corrected = 0;
        for (_, track) in self
            .tracks
            .iter_mut()
            .enumerate()
            .filter(|(index, t)| t.is_ready() && *index != reference_index)
        {
            let target = match track.stream.duration() {
                Some(duration) => reference.min(duration),
                None => reference,
            };
            let drift = track.stream.position() - target;
            if drift.abs() > threshold {
                log::debug!(
                    "Track {} drifted {:+.1}ms from reference, resyncing",
                    track.id,
                    drift * 1000.0
                );
                track.stream.set_position(target);
                corrected += 1;
            }
        }
        corrected
    }

    /// One control tick: drift correction and end-of-song handling
    ///
    /// Returns the authoritative position for this tick.
    pub fn tick(&mut self) -> f64 {
        if !self.state.is_playing {
            return self.state.current_time;
        }
        let corrected = self.correct_drift();
        let mut time = self.reference_position().unwrap_or(self.state.current_time);
        let at_end = time >= self.state.duration;
        if at_end {
            for track in &mut self.tracks {
                track.stream.pause();
            }
            time = self.state.duration;
            log::info!("End of song reached at {:.3}s", time);
        }
        self.update(|state| {
            state.current_time = time;
            state.is_playing = !at_end;
            state.drift_corrections += corrected as u64;
        });
        time
    }

    /// Reflect the cue scheduler's failure count on the published state
    pub fn record_cue_failures(&mut self, failed_sends: u32) {
        if self.state.failed_cue_sends != failed_sends {
            self.update(|state| state.failed_cue_sends = failed_sends);
        }
    }

    fn update(&mut self, f: impl FnOnce(&mut TransportState)) {
        let mut next = (*self.state).clone();
        f(&mut next);
        if next != *self.state {
            self.replace_state(next);
        }
    }

    fn replace_state(&mut self, next: TransportState) {
        self.state = Arc::new(next);
        let state = &self.state;
        self.subscribers.retain(|tx| match tx.try_send(Arc::clone(state)) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{FakeHandle, FakeResolver};

    const A: TrackId = TrackId(1);
    const B: TrackId = TrackId(2);

    fn loaded(resolver: &mut FakeResolver) -> TransportController {
        let mut transport = TransportController::new(&EngineConfig::default());
        let tracks = vec![Track::new(1, "a", "a.wav"), Track::new(2, "b", "b.wav")];
        transport.load(&tracks, resolver);
        transport.poll_readiness();
        transport
    }

    #[test]
    fn test_not_ready_until_all_settled() {
        let mut resolver = FakeResolver::new();
        resolver.register(A, FakeHandle::ready(10.0, 1));
        let b = resolver.register(B, FakeHandle::pending(12.0, 2));
        let mut transport = loaded(&mut resolver);

        assert!(!transport.is_ready());
        assert_eq!(transport.play(), Err(EngineError::NotReady));

        b.finish_decode();
        let events = transport.poll_readiness();
        assert_eq!(events, vec![TrackEvent::Ready { track: B, channels: 2 }]);
        assert!(transport.is_ready());
        assert_eq!(transport.state().duration, 12.0);
    }

    #[test]
    fn test_failed_track_does_not_block() {
        let mut resolver = FakeResolver::new();
        resolver.register(A, FakeHandle::ready(10.0, 2));
        resolver.register(B, FakeHandle::failing());
        let mut transport = loaded(&mut resolver);

        assert!(transport.is_ready());
        assert_eq!(transport.state().failed_tracks, vec![B]);
        assert!(transport.play().is_ok());
        assert!(transport.is_playing());
    }

    #[test]
    fn test_drift_corrected_within_one_cycle() {
        let mut resolver = FakeResolver::new();
        let a = resolver.register(A, FakeHandle::ready(10.0, 2));
        let b = resolver.register(B, FakeHandle::ready(10.0, 2));
        let mut transport = loaded(&mut resolver);
        transport.play().unwrap();

        resolver.advance(1.0);
        b.nudge(0.080);
        transport.tick();

        let offset = (a.state().position - b.state().position).abs();
        assert!(offset < 0.005, "offset {}", offset);
        assert_eq!(transport.state().drift_corrections, 1);
    }

    #[test]
    fn test_small_drift_left_alone() {
        let mut resolver = FakeResolver::new();
        resolver.register(A, FakeHandle::ready(10.0, 2));
        let b = resolver.register(B, FakeHandle::ready(10.0, 2));
        let mut transport = loaded(&mut resolver);
        transport.play().unwrap();

        b.nudge(0.010);
        assert_eq!(transport.correct_drift(), 0);
    }

    #[test]
    fn test_seek_clamps_and_repositions() {
        let mut resolver = FakeResolver::new();
        let a = resolver.register(A, FakeHandle::ready(10.0, 2));
        let b = resolver.register(B, FakeHandle::ready(8.0, 2));
        let mut transport = loaded(&mut resolver);

        assert_eq!(transport.seek(25.0), 10.0);
        assert_eq!(transport.seek(-3.0), 0.0);
        assert_eq!(transport.seek(4.5), 4.5);
        assert_eq!(a.state().position, 4.5);
        assert_eq!(b.state().position, 4.5);
        assert_eq!(transport.state().current_time, 4.5);
    }

    #[test]
    fn test_end_of_song_pauses_then_replays_from_start() {
        let mut resolver = FakeResolver::new();
        let a = resolver.register(A, FakeHandle::ready(10.0, 2));
        resolver.register(B, FakeHandle::ready(6.0, 2));
        let mut transport = loaded(&mut resolver);
        transport.play().unwrap();

        resolver.advance(20.0);
        assert_eq!(transport.tick(), 10.0);
        assert!(!transport.is_playing());
        assert!(!a.state().playing);

        transport.play().unwrap();
        assert_eq!(transport.state().current_time, 0.0);
        assert!(a.state().playing);
    }

    #[test]
    fn test_shorter_track_is_not_resynced_past_its_end() {
        let mut resolver = FakeResolver::new();
        resolver.register(A, FakeHandle::ready(10.0, 2));
        resolver.register(B, FakeHandle::ready(6.0, 2));
        let mut transport = loaded(&mut resolver);
        transport.play().unwrap();

        resolver.advance(8.0);
        assert_eq!(transport.correct_drift(), 0);
    }

    #[test]
    fn test_short_first_track_does_not_hold_back_the_song() {
        let mut resolver = FakeResolver::new();
        let a = resolver.register(A, FakeHandle::ready(6.0, 2));
        let b = resolver.register(B, FakeHandle::ready(10.0, 2));
        let mut transport = loaded(&mut resolver);
        transport.play().unwrap();

        let mut passed_six = false;
        for _ in 0..720 {
            resolver.advance(1.0 / 60.0);
            transport.tick();
            passed_six |= b.state().position > 6.5;
        }

        assert!(passed_six);
        assert_eq!(a.state().position, 6.0);
        let state = transport.state();
        assert_eq!(state.current_time, 10.0);
        assert!(!state.is_playing);
    }

    #[test]
    fn test_stop_rewinds() {
        let mut resolver = FakeResolver::new();
        let a = resolver.register(A, FakeHandle::ready(10.0, 2));
        resolver.register(B, FakeHandle::ready(10.0, 2));
        let mut transport = loaded(&mut resolver);
        transport.play().unwrap();
        resolver.advance(3.0);
        transport.tick();

        transport.stop();
        assert_eq!(a.state().position, 0.0);
        assert!(!a.state().playing);
        let state = transport.state();
        assert!(!state.is_playing);
        assert_eq!(state.current_time, 0.0);
    }

    #[test]
    fn test_subscribers_receive_snapshots() {
        let mut resolver = FakeResolver::new();
        resolver.register(A, FakeHandle::ready(10.0, 2));
        resolver.register(B, FakeHandle::ready(10.0, 2));
        let mut transport = loaded(&mut resolver);

        let rx = transport.subscribe();
        assert!(rx.try_recv().unwrap().is_ready);
        transport.play().unwrap();
        assert!(rx.try_recv().unwrap().is_playing);

        drop(rx);
        transport.pause();
        assert!(transport.subscribers.is_empty());
    }
}
