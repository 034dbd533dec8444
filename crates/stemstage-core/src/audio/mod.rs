//! Audio output backend (cpal)
//!
//! The audio system follows a lock-free design for real-time safety:
//!
//! - **Session thread**: sends [`MixerCommand`](crate::engine::MixerCommand)s
//!   via a lock-free ringbuffer
//! - **Audio thread**: owns the mixer (and the optional pitch unit)
//!   exclusively, processes commands at the start of each callback
//! - **Atomics**: the session reads positions and peak levels via relaxed
//!   atomics (no locks)
//!
//! # Example Usage
//!
//! ```ignore
//! use stemstage_core::audio::{start_audio_system, AudioConfig};
//!
//! let audio = start_audio_system(&AudioConfig::default(), None)?;
//! let resolver = MixerStreamResolver::new(audio.command_sender, audio.sample_rate);
//! ```

mod config;
mod cpal_backend;
mod device;
mod error;

pub use config::{
    AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE,
    LOW_LATENCY_BUFFER_SIZE, MAX_BUFFER_SIZE,
};
pub use cpal_backend::{start_audio_system, AudioHandle, AudioSystemResult};
pub use device::{find_device_by_id, get_default_device, get_output_devices, AudioDevice};
pub use error::{AudioError, AudioResult};
