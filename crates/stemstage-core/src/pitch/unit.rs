//! Message-driven stereo pitch-shift unit
//!
//! The unit lives inside the audio callback. Control code holds the
//! [`PitchControl`] end of an SPSC queue and can only send messages; it never
//! reads back, so the audio side never waits on the control side.

use super::grain::{clamp_ratio, GrainShifter};
use crate::types::StereoSample;

/// Messages accepted by the unit
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PitchMessage {
    /// New pitch ratio (clamped to the supported range on arrival)
    SetRatio(f32),
    /// Drop all buffered audio
    Reset,
}

/// Inbox depth; a handful of slider moves per callback is the worst case
pub const PITCH_INBOX_CAPACITY: usize = 64;

/// Control-side handle
pub struct PitchControl {
    producer: rtrb::Producer<PitchMessage>,
    ratio: f32,
}

impl PitchControl {
    /// Queue a new ratio; returns false if the inbox is full
    pub fn set_ratio(&mut self, ratio: f32) -> bool {
        let ratio = clamp_ratio(ratio);
        match self.producer.push(PitchMessage::SetRatio(ratio)) {
            Ok(()) => {
                self.ratio = ratio;
                true
            }
            Err(rtrb::PushError::Full(_)) => {
                log::warn!("Pitch inbox full, ratio {} dropped", ratio);
                false
            }
        }
    }

    pub fn reset(&mut self) -> bool {
        self.producer.push(PitchMessage::Reset).is_ok()
    }

    /// Last ratio successfully queued
    pub fn ratio(&self) -> f32 {
        self.ratio
    }
}

/// Audio-side stereo processor
pub struct PitchShiftUnit {
    inbox: rtrb::Consumer<PitchMessage>,
    left: GrainShifter,
    right: GrainShifter,
}

/// Create a connected control handle and processing unit
pub fn pitch_unit(grain_size: usize, headroom: f32) -> (PitchControl, PitchShiftUnit) {
    let (producer, inbox) = rtrb::RingBuffer::new(PITCH_INBOX_CAPACITY);
    let unit = PitchShiftUnit {
        inbox,
        left: GrainShifter::new(grain_size, headroom),
        right: GrainShifter::new(grain_size, headroom),
    };
    (PitchControl { producer, ratio: 1.0 }, unit)
}

impl PitchShiftUnit {
    fn drain_inbox(&mut self) {
        while let Ok(message) = self.inbox.pop() {
            match message {
                PitchMessage::SetRatio(ratio) => {
                    self.left.set_ratio(ratio);
                    self.right.set_ratio(ratio);
                }
                PitchMessage::Reset => {
                    self.left.reset();
                    self.right.reset();
                }
            }
        }
    }

    /// Apply pending messages, then shift the block in place
    pub fn process(&mut self, samples: &mut [StereoSample]) {
        self.drain_inbox();
        for sample in samples.iter_mut() {
            sample.left = self.left.process_sample(sample.left);
            sample.right = self.right.process_sample(sample.right);
        }
    }

    pub fn ratio(&self) -> f32 {
        self.left.ratio()
    }

    pub fn latency_frames(&self) -> usize {
        self.left.latency()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_message_applies_on_next_block() {
        let (mut control, mut unit) = pitch_unit(256, 0.8);
        assert!(control.set_ratio(2.0));
        assert_eq!(unit.ratio(), 1.0);

        let mut block = vec![StereoSample::silence(); 16];
        unit.process(&mut block);
        assert_eq!(unit.ratio(), 2.0);
        assert_eq!(control.ratio(), 2.0);
    }

    #[test]
    fn test_control_clamps_before_sending() {
        let (mut control, mut unit) = pitch_unit(256, 0.8);
        control.set_ratio(9.0);
        unit.process(&mut []);
        assert_eq!(unit.ratio(), 4.0);
    }

    #[test]
    fn test_full_inbox_reports_failure() {
        let (mut control, _unit) = pitch_unit(256, 0.8);
        for _ in 0..PITCH_INBOX_CAPACITY {
            assert!(control.set_ratio(1.5));
        }
        assert!(!control.set_ratio(0.5));
        assert_eq!(control.ratio(), 1.5);
    }

    #[test]
    fn test_unity_stereo_passthrough_is_delayed() {
        let (_control, mut unit) = pitch_unit(128, 0.8);
        let latency = unit.latency_frames();
        let frames: Vec<StereoSample> = (0..2048)
            .map(|i| StereoSample::new((i as f32 * 0.05).sin(), (i as f32 * 0.07).cos() * 0.5))
            .collect();

        let mut block = frames.clone();
        for chunk in block.chunks_mut(100) {
            unit.process(chunk);
        }

        for u in (latency * 2)..frames.len() {
            assert!((block[u].left - frames[u - latency].left).abs() < 1e-4);
            assert!((block[u].right - frames[u - latency].right).abs() < 1e-4);
        }
    }

    #[test]
    fn test_reset_silences_tail() {
        let (mut control, mut unit) = pitch_unit(128, 0.8);
        let mut block = vec![StereoSample::mono(0.5); 512];
        unit.process(&mut block);

        control.reset();
        let mut silent = vec![StereoSample::silence(); 256];
        unit.process(&mut silent);
        assert!(silent.iter().all(|s| s.peak() == 0.0));
    }
}
