//! Fixed-rate session scheduler
//!
//! A dedicated thread owns the [`PerformanceEngine`] and ticks it at
//! `tick_rate_hz`. Other threads talk to it through [`SessionClient`]:
//! requests go over a crossbeam channel and answers come back on tokio
//! oneshot channels. The engine itself is never shared.
//!
//! ```text
//! ┌──────────────┐   SessionRequest    ┌────────────────────┐
//! │ console / UI │ ──────────────────► │ session-scheduler  │──► tick() @ 60 Hz
//! │              │ ◄────────────────── │ (PerformanceEngine)│
//! └──────────────┘   oneshot replies   └────────────────────┘
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use tokio::sync::oneshot;

use super::cues::TimedCue;
use super::error::{EngineError, EngineResult};
use super::session::PerformanceEngine;
use crate::types::{MuteRegion, StereoLevels, Track, TrackId, TransportState};

/// A per-track mixer change
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MixChange {
    Volume(f32),
    Balance(f32),
    Muted(bool),
    Solo(bool),
}

/// Smoothed level and held peak marker of one meter (0-100)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeterReading {
    pub level: StereoLevels,
    pub peak: StereoLevels,
}

/// Meter readings for every track plus the master bus
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelsSnapshot {
    pub master: MeterReading,
    pub tracks: Vec<(TrackId, MeterReading)>,
}

/// Requests handled on the scheduler thread
pub enum SessionRequest {
    Load {
        tracks: Vec<Track>,
        regions: Vec<MuteRegion>,
        cues: Vec<TimedCue>,
        reply: oneshot::Sender<EngineResult<()>>,
    },
    Play {
        reply: oneshot::Sender<EngineResult<()>>,
    },
    Pause,
    Stop,
    Seek {
        time: f64,
        reply: oneshot::Sender<f64>,
    },
    SetRegions {
        track: TrackId,
        regions: Vec<MuteRegion>,
        reply: oneshot::Sender<EngineResult<()>>,
    },
    SetCues {
        cues: Vec<TimedCue>,
    },
    Mix {
        track: TrackId,
        change: MixChange,
        reply: oneshot::Sender<EngineResult<()>>,
    },
    State {
        reply: oneshot::Sender<Arc<TransportState>>,
    },
    Subscribe {
        reply: oneshot::Sender<Receiver<Arc<TransportState>>>,
    },
    Levels {
        reply: oneshot::Sender<LevelsSnapshot>,
    },
    Tracks {
        reply: oneshot::Sender<Vec<Track>>,
    },
    Shutdown,
}

pub struct SessionScheduler;

impl SessionScheduler {
    /// Move `engine` onto its own thread and start ticking
    pub fn spawn(engine: PerformanceEngine) -> std::io::Result<SessionClient> {
        let (tx, rx) = channel::unbounded();
        let tick_rate = engine.config().tick_rate_hz;

        let thread = thread::Builder::new()
            .name("session-scheduler".to_string())
            .spawn(move || {
                log::info!("Session scheduler started at {} Hz", tick_rate);
                Self::run(engine, rx, tick_rate);
                log::info!("Session scheduler stopped");
            })?;

        Ok(SessionClient {
            tx,
            thread: Some(thread),
        })
    }

    fn run(mut engine: PerformanceEngine, rx: Receiver<SessionRequest>, tick_rate: f64) {
        let interval = Duration::from_secs_f64(1.0 / tick_rate);
        let start = Instant::now();
        let mut next_tick = start;

        loop {
            let now = Instant::now();
            if now >= next_tick {
                engine.tick(start.elapsed().as_secs_f64());
                next_tick += interval;
                // After a stall, resume the cadence instead of bursting
                if next_tick <= now {
                    next_tick = now + interval;
                }
            }

            match rx.recv_timeout(next_tick.saturating_duration_since(Instant::now())) {
                Ok(SessionRequest::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(request) => Self::handle(&mut engine, request),
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    fn handle(engine: &mut PerformanceEngine, request: SessionRequest) {
        match request {
            SessionRequest::Load {
                tracks,
                regions,
                cues,
                reply,
            } => {
                let _ = reply.send(engine.load(tracks, &regions, cues));
            }
            SessionRequest::Play { reply } => {
                let _ = reply.send(engine.play());
            }
            SessionRequest::Pause => engine.pause(),
            SessionRequest::Stop => engine.stop(),
            SessionRequest::Seek { time, reply } => {
                let _ = reply.send(engine.seek(time));
            }
            SessionRequest::SetRegions {
                track,
                regions,
                reply,
            } => {
                let _ = reply.send(engine.set_regions(track, &regions));
            }
            SessionRequest::SetCues { cues } => engine.set_cues(cues),
            SessionRequest::Mix {
                track,
                change,
                reply,
            } => {
                let result = match change {
                    MixChange::Volume(v) => engine.set_volume(track, v),
                    MixChange::Balance(b) => engine.set_balance(track, b),
                    MixChange::Muted(m) => engine.set_muted(track, m),
                    MixChange::Solo(s) => engine.set_solo(track, s),
                };
                let _ = reply.send(result);
            }
            SessionRequest::State { reply } => {
                let _ = reply.send(engine.state());
            }
            SessionRequest::Subscribe { reply } => {
                let _ = reply.send(engine.subscribe());
            }
            SessionRequest::Levels { reply } => {
                let tracks = engine
                    .tracks()
                    .iter()
                    .map(|t| {
                        let reading = MeterReading {
                            level: engine.track_levels(t.id),
                            peak: engine.track_peaks(t.id),
                        };
                        (t.id, reading)
                    })
                    .collect();
                let master = MeterReading {
                    level: engine.master_levels(),
                    peak: engine.master_peaks(),
                };
                let _ = reply.send(LevelsSnapshot { master, tracks });
            }
            SessionRequest::Tracks { reply } => {
                let _ = reply.send(engine.tracks().to_vec());
            }
            SessionRequest::Shutdown => {}
        }
    }
}

/// Handle for talking to the scheduler thread
///
/// Every call blocks only until the scheduler has handled the request
/// (at most one tick). Once the scheduler is gone, calls return
/// [`EngineError::SchedulerStopped`].
pub struct SessionClient {
    tx: Sender<SessionRequest>,
    thread: Option<JoinHandle<()>>,
}

impl SessionClient {
    fn post(&self, request: SessionRequest) -> EngineResult<()> {
        self.tx.send(request).map_err(|_| EngineError::SchedulerStopped)
    }

    fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionRequest,
    ) -> EngineResult<T> {
        let (reply, rx) = oneshot::channel();
        self.post(make(reply))?;
        rx.blocking_recv().map_err(|_| EngineError::SchedulerStopped)
    }

    pub fn load(
        &self,
        tracks: Vec<Track>,
        regions: Vec<MuteRegion>,
        cues: Vec<TimedCue>,
    ) -> EngineResult<()> {
        self.request(|reply| SessionRequest::Load {
            tracks,
            regions,
            cues,
            reply,
        })?
    }

    pub fn play(&self) -> EngineResult<()> {
        self.request(|reply| SessionRequest::Play { reply })?
    }

    pub fn pause(&self) -> EngineResult<()> {
        self.post(SessionRequest::Pause)
    }

    pub fn stop(&self) -> EngineResult<()> {
        self.post(SessionRequest::Stop)
    }

    /// Returns the clamped position actually sought to
    pub fn seek(&self, time: f64) -> EngineResult<f64> {
        self.request(|reply| SessionRequest::Seek { time, reply })
    }

    pub fn set_regions(&self, track: TrackId, regions: Vec<MuteRegion>) -> EngineResult<()> {
        self.request(|reply| SessionRequest::SetRegions {
            track,
            regions,
            reply,
        })?
    }

    pub fn set_cues(&self, cues: Vec<TimedCue>) -> EngineResult<()> {
        self.post(SessionRequest::SetCues { cues })
    }

    pub fn mix(&self, track: TrackId, change: MixChange) -> EngineResult<()> {
        self.request(|reply| SessionRequest::Mix {
            track,
            change,
            reply,
        })?
    }

    pub fn state(&self) -> EngineResult<Arc<TransportState>> {
        self.request(|reply| SessionRequest::State { reply })
    }

    pub fn subscribe(&self) -> EngineResult<Receiver<Arc<TransportState>>> {
        self.request(|reply| SessionRequest::Subscribe { reply })
    }

    pub fn levels(&self) -> EngineResult<LevelsSnapshot> {
        self.request(|reply| SessionRequest::Levels { reply })
    }

    pub fn tracks(&self) -> EngineResult<Vec<Track>> {
        self.request(|reply| SessionRequest::Tracks { reply })
    }

    /// Stop the scheduler and wait for its thread
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        let _ = self.tx.send(SessionRequest::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Session scheduler thread panicked");
            }
        }
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        self.join();
    }
}
