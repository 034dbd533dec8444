//! Playable track handles
//!
//! The transport only sees [`TrackStream`]s: something that decodes in the
//! background, reports readiness and position, and accepts transport and
//! mixer operations without blocking. [`MixerStream`] is the production
//! implementation, backed by a background decode and a mixer voice slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use basedrop::{Owned, Shared};

use super::command::{CommandSender, MixerCommand};
use super::gc::gc_handle;
use super::voice::{Voice, VoiceAtomics, VoiceSettings};
use crate::decode::{spawn_decode, DecodedAudio, PendingDecode};
use crate::types::{StereoLevels, Track, TrackId, MAX_TRACKS};

/// Decode readiness of a stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamStatus {
    Pending,
    Ready,
    Failed(String),
}

/// A per-track playable handle
///
/// Every method must return promptly; the control tick calls these at
/// ~60 Hz. Operations on a stream that is still decoding are remembered and
/// applied once it becomes ready. Operations on a failed stream are ignored.
pub trait TrackStream: Send {
    /// Advance decode readiness and report it
    fn poll(&mut self) -> StreamStatus;
    /// Length in seconds, once known
    fn duration(&self) -> Option<f64>;
    fn channel_count(&self) -> u16;
    /// Playhead in seconds
    fn position(&self) -> f64;
    fn set_position(&mut self, secs: f64);
    fn play(&mut self);
    fn pause(&mut self);
    /// Linear volume (already combined with mute/solo)
    fn set_gain(&mut self, gain: f32);
    fn set_pan(&mut self, pan: f32);
    /// Fade the mute gate towards `target` over `ramp_secs`
    fn ramp_gate(&mut self, target: f32, ramp_secs: f64);
    /// Raw linear peaks since the previous call
    fn take_levels(&mut self) -> StereoLevels;
}

/// Device/file collaborator: opens a playable handle per track
pub trait StreamResolver: Send {
    fn open(&mut self, track: &Track) -> Box<dyn TrackStream>;
}

/// Command sender shared by every stream of a session
pub type SharedCommandSender = Arc<Mutex<CommandSender>>;

fn send(sender: &SharedCommandSender, cmd: MixerCommand) {
    let mut sender = sender.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(cmd) = sender.send(cmd) {
        log::warn!("Mixer command queue full, dropped {:?}", cmd);
    }
}

/// Voice slot reservations shared by the streams of one mixer
#[derive(Clone, Default)]
pub struct SlotPool {
    slots: Arc<[AtomicBool; MAX_TRACKS]>,
}

impl SlotPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self) -> Option<SlotLease> {
        self.slots.iter().enumerate().find_map(|(index, used)| {
            used.compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .ok()
                .map(|_| SlotLease {
                    pool: self.clone(),
                    index,
                })
        })
    }

    /// Number of slots currently leased
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|s| s.load(Ordering::Relaxed)).count()
    }
}

struct SlotLease {
    pool: SlotPool,
    index: usize,
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.pool.slots[self.index].store(false, Ordering::Release);
    }
}

enum Phase {
    Decoding(PendingDecode),
    Attached {
        lease: SlotLease,
        atomics: Arc<VoiceAtomics>,
        frames: u64,
        channels: u16,
    },
    Failed(String),
}

/// A track decoded in the background and played by a mixer voice
pub struct MixerStream {
    id: TrackId,
    sender: SharedCommandSender,
    slots: SlotPool,
    sample_rate: u32,
    phase: Phase,
    settings: VoiceSettings,
    /// Position requested by the last seek, in frames
    requested: u64,
    seek_generation: u64,
}

impl MixerStream {
    pub fn new(
        id: TrackId,
        pending: PendingDecode,
        sender: SharedCommandSender,
        slots: SlotPool,
        sample_rate: u32,
    ) -> Self {
        Self {
            id,
            sender,
            slots,
            sample_rate,
            phase: Phase::Decoding(pending),
            settings: VoiceSettings::default(),
            requested: 0,
            seek_generation: 0,
        }
    }

    fn attach(&mut self, audio: DecodedAudio) -> Phase {
        let Some(lease) = self.slots.acquire() else {
            return Phase::Failed("no free mixer slot".to_string());
        };
        let frames = audio.frames.len() as u64;
        let channels = audio.channels;
        let atomics = Arc::new(VoiceAtomics::new());
        let settings = VoiceSettings {
            position: self.requested.min(frames),
            ..self.settings
        };
        let pcm = Shared::new(&gc_handle(), audio.frames);
        let voice = Voice::new(pcm, Arc::clone(&atomics), settings);

        send(
            &self.sender,
            MixerCommand::Attach {
                slot: lease.index,
                voice: Owned::new(&gc_handle(), voice),
            },
        );
        log::debug!("Track {} attached to mixer slot {}", self.id, lease.index);

        Phase::Attached {
            lease,
            atomics,
            frames,
            channels,
        }
    }

    fn slot(&self) -> Option<usize> {
        match &self.phase {
            Phase::Attached { lease, .. } => Some(lease.index),
            _ => None,
        }
    }

    fn to_frames(&self, secs: f64) -> u64 {
        (secs.max(0.0) * self.sample_rate as f64).round() as u64
    }
}

impl TrackStream for MixerStream {
    fn poll(&mut self) -> StreamStatus {
        if let Phase::Decoding(pending) = &mut self.phase {
            match pending.try_take() {
                None => {}
                Some(Ok(audio)) => self.phase = self.attach(audio),
                Some(Err(e)) => self.phase = Phase::Failed(e.to_string()),
            }
        }
        match &self.phase {
            Phase::Decoding(_) => StreamStatus::Pending,
            Phase::Attached { .. } => StreamStatus::Ready,
            Phase::Failed(reason) => StreamStatus::Failed(reason.clone()),
        }
    }

    fn duration(&self) -> Option<f64> {
        match &self.phase {
            Phase::Attached { frames, .. } => Some(*frames as f64 / self.sample_rate as f64),
            _ => None,
        }
    }

    fn channel_count(&self) -> u16 {
        match &self.phase {
            Phase::Attached { channels, .. } => *channels,
            _ => 0,
        }
    }

    fn position(&self) -> f64 {
        let frame = match &self.phase {
            // Until the audio thread acknowledges the latest seek, report the
            // requested position rather than a stale playhead
            Phase::Attached { atomics, .. } if atomics.applied_seek() >= self.seek_generation => {
                atomics.position()
            }
            _ => self.requested,
        };
        frame as f64 / self.sample_rate as f64
    }

    fn set_position(&mut self, secs: f64) {
        let mut frame = self.to_frames(secs);
        if let Phase::Attached { frames, .. } = &self.phase {
            frame = frame.min(*frames);
        }
        self.requested = frame;
        self.settings.position = frame;
        if let Some(slot) = self.slot() {
            self.seek_generation += 1;
            send(
                &self.sender,
                MixerCommand::Seek {
                    slot,
                    frame,
                    generation: self.seek_generation,
                },
            );
        }
    }

    fn play(&mut self) {
        self.settings.playing = true;
        if let Some(slot) = self.slot() {
            send(&self.sender, MixerCommand::Play { slot });
        }
    }

    fn pause(&mut self) {
        self.settings.playing = false;
        // Freeze the requested position at the playhead so a later attach or
        // position query stays consistent
        self.requested = self.to_frames(self.position());
        if let Some(slot) = self.slot() {
            send(&self.sender, MixerCommand::Pause { slot });
        }
    }

    fn set_gain(&mut self, gain: f32) {
        self.settings.gain = gain;
        if let Some(slot) = self.slot() {
            send(&self.sender, MixerCommand::SetGain { slot, gain });
        }
    }

    fn set_pan(&mut self, pan: f32) {
        self.settings.pan = pan;
        if let Some(slot) = self.slot() {
            send(&self.sender, MixerCommand::SetPan { slot, pan });
        }
    }

    fn ramp_gate(&mut self, target: f32, ramp_secs: f64) {
        self.settings.gate = target;
        if let Some(slot) = self.slot() {
            let frames = (ramp_secs.max(0.0) * self.sample_rate as f64).round() as u32;
            send(&self.sender, MixerCommand::RampGate { slot, target, frames });
        }
    }

    fn take_levels(&mut self) -> StereoLevels {
        match &self.phase {
            Phase::Attached { atomics, .. } => atomics.tap().take(),
            _ => StereoLevels::default(),
        }
    }
}

impl Drop for MixerStream {
    fn drop(&mut self) {
        if let Some(slot) = self.slot() {
            send(&self.sender, MixerCommand::Detach { slot });
        }
    }
}

/// Opens every track as a [`MixerStream`] decoding on its own thread
pub struct MixerStreamResolver {
    sender: SharedCommandSender,
    slots: SlotPool,
    sample_rate: u32,
}

impl MixerStreamResolver {
    pub fn new(sender: CommandSender, sample_rate: u32) -> Self {
        Self {
            sender: Arc::new(Mutex::new(sender)),
            slots: SlotPool::new(),
            sample_rate,
        }
    }
}

impl StreamResolver for MixerStreamResolver {
    fn open(&mut self, track: &Track) -> Box<dyn TrackStream> {
        log::info!("Opening track {} ({})", track.id, track.source_ref.display());
        let pending = spawn_decode(track.id, track.source_ref.clone(), self.sample_rate);
        Box::new(MixerStream::new(
            track.id,
            pending,
            Arc::clone(&self.sender),
            self.slots.clone(),
            self.sample_rate,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodeError;
    use crate::engine::command::command_channel;
    use crate::engine::mixer::Mixer;
    use crate::types::{StereoBuffer, StereoSample};

    const RATE: u32 = 1000;

    fn decoded(frames: usize) -> DecodedAudio {
        DecodedAudio {
            frames: vec![StereoSample::mono(0.5); frames],
            sample_rate: RATE,
            channels: 1,
        }
    }

    fn setup() -> (SharedCommandSender, rtrb::Consumer<MixerCommand>, SlotPool) {
        let (tx, rx) = command_channel();
        (Arc::new(Mutex::new(CommandSender::new(tx))), rx, SlotPool::new())
    }

    fn stream(
        sender: &SharedCommandSender,
        slots: &SlotPool,
        result: Result<DecodedAudio, DecodeError>,
    ) -> MixerStream {
        MixerStream::new(
            TrackId(1),
            PendingDecode::ready(result),
            Arc::clone(sender),
            slots.clone(),
            RATE,
        )
    }

    #[test]
    fn test_settings_before_ready_apply_on_attach() {
        let (sender, mut rx, slots) = setup();
        let mut s = stream(&sender, &slots, Ok(decoded(2000)));
        s.set_position(0.5);
        s.play();
        s.set_gain(0.25);

        assert_eq!(s.poll(), StreamStatus::Ready);
        assert_eq!(s.duration(), Some(2.0));
        assert_eq!(s.channel_count(), 1);
        assert_eq!(slots.in_use(), 1);

        let mut mixer = Mixer::new();
        mixer.process_commands(&mut rx);
        let mut buf = StereoBuffer::silence(100);
        mixer.process(&mut buf);
        assert!((buf[0].left - 0.125).abs() < 1e-6);
        assert!((s.position() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_position_reports_request_until_seek_applied() {
        let (sender, mut rx, slots) = setup();
        let mut s = stream(&sender, &slots, Ok(decoded(5000)));
        s.poll();
        let mut mixer = Mixer::new();
        mixer.process_commands(&mut rx);

        s.set_position(3.0);
        assert!((s.position() - 3.0).abs() < 1e-9);
        mixer.process_commands(&mut rx);
        let mut buf = StereoBuffer::silence(10);
        mixer.process(&mut buf);
        assert!((s.position() - 3.0).abs() < 1e-9);

        s.set_position(99.0);
        assert!((s.position() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_decode_is_reported() {
        let (sender, _rx, slots) = setup();
        let mut s = stream(&sender, &slots, Err(DecodeError::Empty("a.wav".into())));
        assert!(matches!(s.poll(), StreamStatus::Failed(_)));
        assert_eq!(s.duration(), None);
        s.play();
        assert_eq!(slots.in_use(), 0);
    }

    #[test]
    fn test_drop_detaches_and_frees_slot() {
        let (sender, mut rx, slots) = setup();
        let mut mixer = Mixer::new();
        {
            let mut s = stream(&sender, &slots, Ok(decoded(100)));
            s.poll();
            mixer.process_commands(&mut rx);
            assert_eq!(mixer.active_voices(), 1);
        }
        mixer.process_commands(&mut rx);
        assert_eq!(mixer.active_voices(), 0);
        assert_eq!(slots.in_use(), 0);
    }

    #[test]
    fn test_slot_exhaustion_fails_stream() {
        let (sender, _rx, slots) = setup();
        let mut streams: Vec<MixerStream> = (0..MAX_TRACKS)
            .map(|_| stream(&sender, &slots, Ok(decoded(10))))
            .collect();
        for s in &mut streams {
            assert_eq!(s.poll(), StreamStatus::Ready);
        }
        let mut extra = stream(&sender, &slots, Ok(decoded(10)));
        assert!(matches!(extra.poll(), StreamStatus::Failed(_)));
    }
}
