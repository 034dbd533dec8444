//! Real-time performance engine
//!
//! Two domains:
//! - Audio (cpal callback): [`Mixer`] renders [`Voice`]s, fed by
//!   [`MixerCommand`]s over a lock-free ring.
//! - Control (session scheduler, ~60 Hz): [`PerformanceEngine`] ties the
//!   [`TransportController`], [`MuteRegionEngine`], [`CueScheduler`] and
//!   [`LevelMeter`] together and runs them from a single tick.

mod command;
mod cues;
mod error;
mod gc;
mod meter;
mod mixer;
mod mute;
mod scheduler;
mod session;
mod stream;
mod transport;
mod voice;

#[cfg(test)]
pub(crate) mod testing;

pub use command::*;
pub use cues::*;
pub use error::*;
pub use gc::gc_handle;
pub use meter::*;
pub use mixer::*;
pub use mute::*;
pub use scheduler::*;
pub use session::*;
pub use stream::*;
pub use transport::*;
pub use voice::*;
