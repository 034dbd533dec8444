//! Audio backend configuration
//!
//! Device selection and buffer settings for the output stream.

use serde::{Deserialize, Serialize};

/// Maximum buffer size to pre-allocate (covers typical configurations)
/// Larger device callbacks are rendered in chunks of this size.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default buffer size when no preference is specified (frames)
/// 512 frames is a safe default that works on most systems
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Buffer size used for [`BufferSize::LowLatency`]
pub const LOW_LATENCY_BUFFER_SIZE: u32 = 256;

/// Default sample rate for the audio system (48kHz)
/// Stems at other rates are resampled while decoding.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Preferred buffer size for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the backend pick a safe default
    #[default]
    Default,
    /// Request a specific buffer size in frames (clamped to 64..=MAX_BUFFER_SIZE)
    Fixed(u32),
    /// Small buffers for tight monitoring
    LowLatency,
}

impl BufferSize {
    /// Buffer size in frames to request from the device
    pub fn frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => (*frames).clamp(64, MAX_BUFFER_SIZE as u32),
            BufferSize::LowLatency => LOW_LATENCY_BUFFER_SIZE,
        }
    }

    /// Calculate latency in milliseconds for a given sample rate
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        (self.frames() as f32 / sample_rate as f32) * 1000.0
    }
}

/// Audio device identifier
///
/// Includes both the device name and the host backend (JACK, ALSA, etc.)
/// so the same name on two hosts can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier (e.g., "JACK", "ALSA", "CoreAudio")
    /// If None, every host is searched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    pub fn with_host(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: Some(host.to_string()),
        }
    }

    /// Get a display label that includes the host if available
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the audio backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device (None = use system default)
    pub device: Option<DeviceId>,

    /// Preferred buffer size
    pub buffer_size: BufferSize,

    /// Preferred sample rate (None = 48kHz if supported)
    pub sample_rate: Option<u32>,
}

impl AudioConfig {
    /// Set the output device
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    /// Set a fixed buffer size in frames
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    /// Set the preferred sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    /// Sample rate to ask the device for
    pub fn target_sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_frames() {
        assert_eq!(BufferSize::Default.frames(), 512);
        assert_eq!(BufferSize::Fixed(16).frames(), 64);
        assert_eq!(BufferSize::Fixed(100_000).frames(), MAX_BUFFER_SIZE as u32);
        assert_eq!(BufferSize::LowLatency.frames(), 256);
        assert!((BufferSize::Fixed(480).latency_ms(48000) - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_yaml_round_trip_with_defaults() {
        let config: AudioConfig = serde_yaml::from_str("device:\n  name: hw:1,0\n").unwrap();
        assert_eq!(config.device, Some(DeviceId::new("hw:1,0")));
        assert_eq!(config.buffer_size, BufferSize::Default);
        assert_eq!(config.target_sample_rate(), DEFAULT_SAMPLE_RATE);

        let config = AudioConfig::default().with_buffer_frames(128).with_sample_rate(44100);
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: AudioConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, config);
    }
}
