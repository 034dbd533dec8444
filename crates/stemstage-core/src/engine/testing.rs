//! Test doubles for the engine's collaborators

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::cues::CommandSink;
use super::stream::{StreamResolver, StreamStatus, TrackStream};
use crate::cue_sheet::CueCommand;
use crate::types::{StereoLevels, Track, TrackId};

/// Command sink that records what it was asked to send
#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<CueCommand>>>,
    fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects every send (but still records it)
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<CueCommand> {
        self.sent.lock().unwrap().clone()
    }
}

impl CommandSink for RecordingSink {
    fn send_command(&mut self, command: &CueCommand) -> bool {
        self.sent.lock().unwrap().push(command.clone());
        !self.fail
    }
}

#[derive(Debug, Clone)]
pub struct FakeState {
    pub status: StreamStatus,
    pub duration: f64,
    pub channels: u16,
    pub position: f64,
    pub playing: bool,
    pub gain: f32,
    pub pan: f32,
    pub gate: f32,
    /// Every gate ramp requested: (target, ramp seconds)
    pub ramps: Vec<(f32, f64)>,
    pub levels: StereoLevels,
}

/// Shared handle onto a fake stream's state, kept by the test
#[derive(Clone)]
pub struct FakeHandle(Arc<Mutex<FakeState>>);

impl FakeHandle {
    fn with_status(status: StreamStatus, duration: f64, channels: u16) -> Self {
        Self(Arc::new(Mutex::new(FakeState {
            status,
            duration,
            channels,
            position: 0.0,
            playing: false,
            gain: 1.0,
            pan: 0.0,
            gate: 1.0,
            ramps: Vec::new(),
            levels: StereoLevels::default(),
        })))
    }

    pub fn ready(duration: f64, channels: u16) -> Self {
        Self::with_status(StreamStatus::Ready, duration, channels)
    }

    pub fn pending(duration: f64, channels: u16) -> Self {
        Self::with_status(StreamStatus::Pending, duration, channels)
    }

    pub fn failing() -> Self {
        Self::with_status(StreamStatus::Failed("corrupt file".to_string()), 0.0, 0)
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.0.lock().unwrap()
    }

    pub fn finish_decode(&self) {
        self.lock().status = StreamStatus::Ready;
    }

    /// Move the playhead as the audio clock would
    pub fn advance(&self, dt: f64) {
        let mut state = self.lock();
        if state.playing && state.status == StreamStatus::Ready {
            state.position = (state.position + dt).min(state.duration);
        }
    }

    /// Move the playhead without telling anyone (simulated drift)
    pub fn nudge(&self, offset: f64) {
        let mut state = self.lock();
        state.position = (state.position + offset).max(0.0);
    }

    pub fn state(&self) -> FakeState {
        self.lock().clone()
    }

    pub fn set_levels(&self, levels: StereoLevels) {
        self.lock().levels = levels;
    }
}

pub struct FakeStream(FakeHandle);

impl TrackStream for FakeStream {
    fn poll(&mut self) -> StreamStatus {
        self.0.state().status
    }

    fn duration(&self) -> Option<f64> {
        let state = self.0.state();
        (state.status == StreamStatus::Ready).then_some(state.duration)
    }

    fn channel_count(&self) -> u16 {
        self.0.state().channels
    }

    fn position(&self) -> f64 {
        self.0.state().position
    }

    fn set_position(&mut self, secs: f64) {
        let mut state = self.0.lock();
        state.position = secs.clamp(0.0, state.duration.max(0.0));
    }

    fn play(&mut self) {
        self.0.lock().playing = true;
    }

    fn pause(&mut self) {
        self.0.lock().playing = false;
    }

    fn set_gain(&mut self, gain: f32) {
        self.0.lock().gain = gain;
    }

    fn set_pan(&mut self, pan: f32) {
        self.0.lock().pan = pan;
    }

    fn ramp_gate(&mut self, target: f32, ramp_secs: f64) {
        let mut state = self.0.lock();
        state.gate = target;
        state.ramps.push((target, ramp_secs));
    }

    fn take_levels(&mut self) -> StereoLevels {
        std::mem::take(&mut self.0.lock().levels)
    }
}

/// Resolver handing out fake streams registered by the test
///
/// Tracks without a registered handle open as a ready 10 s stereo stream.
#[derive(Clone, Default)]
pub struct FakeResolver {
    handles: Arc<Mutex<HashMap<TrackId, FakeHandle>>>,
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, track: TrackId, handle: FakeHandle) -> FakeHandle {
        self.handles.lock().unwrap().insert(track, handle.clone());
        handle
    }

    pub fn handle(&self, track: TrackId) -> FakeHandle {
        self.handles
            .lock()
            .unwrap()
            .entry(track)
            .or_insert_with(|| FakeHandle::ready(10.0, 2))
            .clone()
    }

    /// Advance every registered stream
    pub fn advance(&self, dt: f64) {
        for handle in self.handles.lock().unwrap().values() {
            handle.advance(dt);
        }
    }
}

impl StreamResolver for FakeResolver {
    fn open(&mut self, track: &Track) -> Box<dyn TrackStream> {
        Box::new(FakeStream(self.handle(track.id)))
    }
}
