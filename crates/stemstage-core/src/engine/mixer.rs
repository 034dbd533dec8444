//! Mixer - sums track voices onto the master bus
//!
//! Owned by the audio callback. Holds a fixed table of voice slots so that
//! applying commands never allocates, and voices it drops are handed to the
//! GC thread instead of being freed here.

use std::sync::Arc;

use basedrop::Owned;

use super::command::MixerCommand;
use super::voice::{LevelTap, Voice};
use crate::types::{StereoBuffer, MAX_TRACKS};

pub struct Mixer {
    voices: [Option<Owned<Voice>>; MAX_TRACKS],
    master_tap: Arc<LevelTap>,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mixer {
    pub fn new() -> Self {
        Self {
            voices: std::array::from_fn(|_| None),
            master_tap: Arc::new(LevelTap::new()),
        }
    }

    /// Master peak tap (shared with the control domain)
    pub fn master_tap(&self) -> Arc<LevelTap> {
        Arc::clone(&self.master_tap)
    }

    /// Number of occupied slots
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_some()).count()
    }

    /// Drain and apply every pending command
    pub fn process_commands(&mut self, rx: &mut rtrb::Consumer<MixerCommand>) {
        while let Ok(cmd) = rx.pop() {
            self.apply(cmd);
        }
    }

    pub fn apply(&mut self, cmd: MixerCommand) {
        match cmd {
            MixerCommand::Attach { slot, voice } => {
                if let Some(entry) = self.voices.get_mut(slot) {
                    *entry = Some(voice);
                }
            }
            MixerCommand::Detach { slot } => {
                if let Some(entry) = self.voices.get_mut(slot) {
                    *entry = None;
                }
            }
            MixerCommand::Play { slot } => self.with_voice(slot, |v| v.set_playing(true)),
            MixerCommand::Pause { slot } => self.with_voice(slot, |v| v.set_playing(false)),
            MixerCommand::Seek { slot, frame, generation } => {
                self.with_voice(slot, |v| v.seek(frame, generation))
            }
            MixerCommand::SetGain { slot, gain } => self.with_voice(slot, |v| v.set_gain(gain)),
            MixerCommand::SetPan { slot, pan } => self.with_voice(slot, |v| v.set_pan(pan)),
            MixerCommand::RampGate { slot, target, frames } => {
                self.with_voice(slot, |v| v.ramp_gate(target, frames))
            }
        }
    }

    #[inline]
    fn with_voice(&mut self, slot: usize, f: impl FnOnce(&mut Voice)) {
        if let Some(Some(voice)) = self.voices.get_mut(slot) {
            f(voice);
        }
    }

    /// Render all voices into `master` (overwriting it)
    pub fn process(&mut self, master: &mut StereoBuffer) {
        master.fill_silence();
        for voice in self.voices.iter_mut().flatten() {
            voice.render(master.as_mut_slice());
        }
    }

    /// Record master peaks; called after any master-bus processing
    pub fn meter_master(&self, master: &StereoBuffer) {
        let (left, right) = master.channel_peaks();
        self.master_tap.record(left, right);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command::{command_channel, CommandSender};
    use crate::engine::gc::gc_handle;
    use crate::engine::voice::{VoiceAtomics, VoiceSettings};
    use crate::types::StereoSample;
    use basedrop::{Collector, Handle, Shared};

    fn voice_on(handle: &Handle, value: f32, len: usize) -> (Owned<Voice>, Arc<VoiceAtomics>) {
        let atomics = Arc::new(VoiceAtomics::new());
        let pcm = Shared::new(handle, vec![StereoSample::mono(value); len]);
        let voice = Voice::new(pcm, atomics.clone(), VoiceSettings::default());
        (Owned::new(handle, voice), atomics)
    }

    fn voice(value: f32, len: usize) -> (Owned<Voice>, Arc<VoiceAtomics>) {
        voice_on(&gc_handle(), value, len)
    }

    #[test]
    fn test_voices_sum_on_master() {
        let (tx, mut rx) = command_channel();
        let mut sender = CommandSender::new(tx);
        let mut mixer = Mixer::new();

        let (a, _) = voice(0.25, 1000);
        let (b, _) = voice(0.5, 1000);
        sender.send(MixerCommand::Attach { slot: 0, voice: a }).unwrap();
        sender.send(MixerCommand::Attach { slot: 3, voice: b }).unwrap();
        sender.send(MixerCommand::Play { slot: 0 }).unwrap();
        sender.send(MixerCommand::Play { slot: 3 }).unwrap();
        mixer.process_commands(&mut rx);

        let mut master = StereoBuffer::silence(64);
        mixer.process(&mut master);
        assert_eq!(mixer.active_voices(), 2);
        assert!((master[10].left - 0.75).abs() < 1e-6);

        mixer.meter_master(&master);
        let levels = mixer.master_tap().take();
        assert!((levels.left - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_play_reaches_all_voices_in_same_buffer() {
        let mut mixer = Mixer::new();
        let (a, atomics_a) = voice(0.1, 1000);
        let (b, atomics_b) = voice(0.1, 1000);
        mixer.apply(MixerCommand::Attach { slot: 0, voice: a });
        mixer.apply(MixerCommand::Attach { slot: 1, voice: b });
        mixer.apply(MixerCommand::Play { slot: 0 });
        mixer.apply(MixerCommand::Play { slot: 1 });

        let mut master = StereoBuffer::silence(128);
        mixer.process(&mut master);
        assert_eq!(atomics_a.position(), atomics_b.position());
    }

    #[test]
    fn test_detach_and_out_of_range_slots() {
        let mut mixer = Mixer::new();
        let (a, _) = voice(1.0, 10);
        mixer.apply(MixerCommand::Attach { slot: 2, voice: a });
        mixer.apply(MixerCommand::Play { slot: MAX_TRACKS + 4 });
        mixer.apply(MixerCommand::Detach { slot: 2 });
        assert_eq!(mixer.active_voices(), 0);

        let mut master = StereoBuffer::silence(8);
        mixer.process(&mut master);
        assert!(master.iter().all(|s| s.peak() == 0.0));
    }

    #[test]
    fn test_dropped_voices_wait_for_the_collector() {
        let mut collector = Collector::new();
        let handle = collector.handle();
        let mut mixer = Mixer::new();

        let (a, _) = voice_on(&handle, 0.5, 100);
        let (b, _) = voice_on(&handle, 0.5, 100);
        let (c, _) = voice_on(&handle, 0.5, 100);
        mixer.apply(MixerCommand::Attach { slot: 0, voice: a });
        mixer.apply(MixerCommand::Attach { slot: 1, voice: b });
        // Replacing slot 1 and detaching slot 0 drop two voices and their PCM
        mixer.apply(MixerCommand::Attach { slot: 1, voice: c });
        mixer.apply(MixerCommand::Detach { slot: 0 });
        assert_eq!(mixer.active_voices(), 1);
        assert_eq!(collector.alloc_count(), 6);

        // Freeing a voice queues its PCM, which the next pass picks up
        collector.collect();
        collector.collect();
        assert_eq!(collector.alloc_count(), 2);

        drop(mixer);
        collector.collect();
        collector.collect();
        assert_eq!(collector.alloc_count(), 0);
    }
}
