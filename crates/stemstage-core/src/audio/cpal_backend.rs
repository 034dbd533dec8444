//! CPAL output stream
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │ Session tick     │───push()───────────►│   Command Queue     │
//! │   (~16ms cycle)  │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!         ▲                                           │ pop()
//!         │ Relaxed atomics                           ▼
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  VoiceAtomics /  │◄────────────────────│  CPAL Audio Thread  │
//! │  LevelTap        │     sync writes     │ (Mixer + PitchUnit) │
//! └──────────────────┘                     └─────────────────────┘
//! ```
//!
//! The callback owns the mixer and pitch unit outright; nothing is shared
//! with the control side except the command ring and the atomics.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::config::{AudioConfig, MAX_BUFFER_SIZE};
use super::device::{find_device_by_id, get_default_device};
use super::error::{AudioError, AudioResult};
use crate::engine::{command_channel, CommandSender, LevelTap, Mixer, MixerCommand};
use crate::pitch::PitchShiftUnit;
use crate::types::StereoBuffer;

/// Keeps the output stream alive. Drop this to stop audio.
pub struct AudioHandle {
    _stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Buffer size in frames as requested from the device
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Output latency in milliseconds (one buffer)
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

/// Everything the control side needs from a started audio system
pub struct AudioSystemResult {
    /// Drop to stop audio
    pub handle: AudioHandle,
    /// Lock-free sender into the mixer
    pub command_sender: CommandSender,
    /// Master bus peak tap (post pitch shift)
    pub master_tap: Arc<LevelTap>,
    pub sample_rate: u32,
    pub buffer_size: u32,
    pub latency_ms: f32,
}

/// Open the configured device and start rendering
///
/// `pitch` runs on the master bus after mixing when given.
pub fn start_audio_system(
    config: &AudioConfig,
    pitch: Option<PitchShiftUnit>,
) -> AudioResult<AudioSystemResult> {
    let device = match &config.device {
        Some(id) => find_device_by_id(id)?,
        None => get_default_device()?,
    };
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let supported = get_output_config(&device, config)?;
    let sample_rate = supported.sample_rate().0;
    let buffer_size = config.buffer_size.frames();
    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };
    let latency_ms = (buffer_size as f32 / sample_rate as f32) * 1000.0;

    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        latency_ms
    );
    if let Some(unit) = &pitch {
        let frames = unit.latency_frames();
        log::info!(
            "Master pitch shift enabled ({} frames, ~{:.1}ms latency; cues lead the audio by this much)",
            frames,
            frames as f32 / sample_rate as f32 * 1000.0
        );
    }

    let (command_tx, command_rx) = command_channel();
    let mixer = Mixer::new();
    let master_tap = mixer.master_tap();
    let state = AudioCallbackState::new(mixer, command_rx, pitch);

    let stream = build_output_stream(&device, &stream_config, state)?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
    log::info!("Audio stream started");

    Ok(AudioSystemResult {
        handle: AudioHandle {
            _stream: stream,
            sample_rate,
            buffer_size,
        },
        command_sender: CommandSender::new(command_tx),
        master_tap,
        sample_rate,
        buffer_size,
        latency_ms,
    })
}

/// State owned by the audio callback
struct AudioCallbackState {
    mixer: Mixer,
    command_rx: rtrb::Consumer<MixerCommand>,
    pitch: Option<PitchShiftUnit>,
    /// Pre-allocated master buffer
    master: StereoBuffer,
}

impl AudioCallbackState {
    fn new(
        mixer: Mixer,
        command_rx: rtrb::Consumer<MixerCommand>,
        pitch: Option<PitchShiftUnit>,
    ) -> Self {
        Self {
            mixer,
            command_rx,
            pitch,
            master: StereoBuffer::silence(MAX_BUFFER_SIZE),
        }
    }

    /// Fill an interleaved device buffer
    ///
    /// Commands are applied once, at the start of the callback, so every
    /// voice sees a transport change in the same buffer.
    fn render(&mut self, data: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        self.mixer.process_commands(&mut self.command_rx);

        for chunk in data.chunks_mut(MAX_BUFFER_SIZE * channels) {
            let n_frames = chunk.len() / channels;
            // RT-safe: no allocation
            self.master.set_len_from_capacity(n_frames);
            self.mixer.process(&mut self.master);
            if let Some(pitch) = &mut self.pitch {
                pitch.process(self.master.as_mut_slice());
            }
            self.mixer.meter_master(&self.master);

            for (frame, sample) in chunk.chunks_mut(channels).zip(self.master.iter()) {
                frame[0] = sample.left;
                if channels > 1 {
                    frame[1] = sample.right;
                }
                for ch in frame.iter_mut().skip(2) {
                    *ch = 0.0;
                }
            }
        }
    }
}

/// Pick a stereo f32 config at the requested rate when the device has one
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    let target = config.target_sample_rate();
    let in_range = |c: &cpal::SupportedStreamConfigRange| {
        target >= c.min_sample_rate().0 && target <= c.max_sample_rate().0
    };

    let best = supported_configs
        .iter()
        .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2 && in_range(c))
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2)
        })
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32)
        })
        .ok_or_else(|| AudioError::ConfigError("No f32 output configuration".to_string()))?;

    let sample_rate = if in_range(best) {
        cpal::SampleRate(target)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz (stems will be resampled)",
            target,
            fallback.0
        );
        fallback
    };

    Ok(best.clone().with_sample_rate(sample_rate))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut state: AudioCallbackState,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                state.render(data, channels);
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{gc_handle, Voice, VoiceAtomics, VoiceSettings};
    use crate::pitch::pitch_unit;
    use crate::types::StereoSample;
    use basedrop::{Owned, Shared};

    fn state_with_voice(pitch: Option<PitchShiftUnit>) -> (AudioCallbackState, CommandSender) {
        let (tx, rx) = command_channel();
        let mut sender = CommandSender::new(tx);
        let pcm = Shared::new(&gc_handle(), vec![StereoSample::new(0.5, -0.25); 20_000]);
        let settings = VoiceSettings {
            playing: true,
            ..VoiceSettings::default()
        };
        let voice = Voice::new(pcm, Arc::new(VoiceAtomics::new()), settings);
        sender
            .send(MixerCommand::Attach {
                slot: 0,
                voice: Owned::new(&gc_handle(), voice),
            })
            .unwrap();
        (AudioCallbackState::new(Mixer::new(), rx, pitch), sender)
    }

    #[test]
    fn test_render_interleaves_and_silences_extra_channels() {
        let (mut state, _sender) = state_with_voice(None);
        let mut data = vec![9.0f32; 4 * 64];
        state.render(&mut data, 4);
        assert_eq!(&data[0..4], &[0.5, -0.25, 0.0, 0.0]);
        assert_eq!(&data[252..256], &[0.5, -0.25, 0.0, 0.0]);
        let levels = state.mixer.master_tap().take();
        assert_eq!(levels.left, 0.5);
    }

    #[test]
    fn test_render_larger_than_preallocated_buffer() {
        let (mut state, _sender) = state_with_voice(None);
        let frames = MAX_BUFFER_SIZE + 100;
        let mut data = vec![0.0f32; frames * 2];
        state.render(&mut data, 2);
        assert_eq!(data[(frames - 1) * 2], 0.5);
    }

    #[test]
    fn test_render_through_pitch_unit() {
        let (_control, unit) = pitch_unit(256, 0.8);
        let latency = unit.latency_frames();
        let (mut state, _sender) = state_with_voice(Some(unit));
        let mut data = vec![0.0f32; 2 * 2048];
        state.render(&mut data, 2);
        assert!(data.iter().all(|s| s.is_finite()));
        // Output is delayed by the grain latency
        assert_eq!(data[0], 0.0);
        assert!(data[2 * (latency + 512)].abs() > 0.0);
    }
}
