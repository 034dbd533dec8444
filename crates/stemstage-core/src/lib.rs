//! Stemstage Core - multitrack stem playback for live performance
//!
//! - [`engine`]: transport, mute regions, cue scheduling, metering and the
//!   real-time mixer
//! - [`audio`]: cpal output backend
//! - [`decode`]: stem decoding and resampling
//! - [`pitch`]: master-bus pitch shift
//! - [`song`] / [`cue_sheet`]: song files and their cue annotations

pub mod audio;
pub mod config;
pub mod cue_sheet;
pub mod decode;
pub mod engine;
pub mod pitch;
pub mod song;
pub mod types;

pub use types::*;
