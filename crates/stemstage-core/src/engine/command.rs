//! Lock-free command queue from the control domain to the audio callback
//!
//! The control tick pushes [`MixerCommand`]s into an `rtrb` SPSC ring; the
//! audio callback drains it at the start of every buffer. Both ends are
//! wait-free, so a busy tick can never stall audio and vice versa.

use basedrop::Owned;

use super::voice::Voice;

/// Commands applied by the mixer at buffer boundaries
///
/// `slot` indexes the mixer's fixed voice table (0..MAX_TRACKS).
pub enum MixerCommand {
    /// Install a decoded voice in a slot, replacing anything there
    ///
    /// `Owned` keeps the enum small in the ring, and a voice dropped by the
    /// mixer is freed on the GC thread.
    Attach { slot: usize, voice: Owned<Voice> },
    /// Remove the voice in a slot
    Detach { slot: usize },
    Play { slot: usize },
    Pause { slot: usize },
    /// Jump to `frame`; the voice reports `generation` once applied
    Seek { slot: usize, frame: u64, generation: u64 },
    /// Volume, interpolated across the next buffer
    SetGain { slot: usize, gain: f32 },
    /// Balance -1.0..=1.0
    SetPan { slot: usize, pan: f32 },
    /// Linear fade of the mute gate towards `target` over `frames`
    RampGate { slot: usize, target: f32, frames: u32 },
}

impl std::fmt::Debug for MixerCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MixerCommand::Attach { slot, .. } => write!(f, "Attach({})", slot),
            MixerCommand::Detach { slot } => write!(f, "Detach({})", slot),
            MixerCommand::Play { slot } => write!(f, "Play({})", slot),
            MixerCommand::Pause { slot } => write!(f, "Pause({})", slot),
            MixerCommand::Seek { slot, frame, generation } => {
                write!(f, "Seek({}, frame={}, gen={})", slot, frame, generation)
            }
            MixerCommand::SetGain { slot, gain } => write!(f, "SetGain({}, {})", slot, gain),
            MixerCommand::SetPan { slot, pan } => write!(f, "SetPan({}, {})", slot, pan),
            MixerCommand::RampGate { slot, target, frames } => {
                write!(f, "RampGate({}, {} over {})", slot, target, frames)
            }
        }
    }
}

/// Capacity of the command queue
///
/// A song load plus a full mixer reset is well under a hundred commands.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Create a new command channel (producer for control, consumer for audio)
pub fn command_channel() -> (rtrb::Producer<MixerCommand>, rtrb::Consumer<MixerCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

/// Control-side sender for mixer commands
pub struct CommandSender {
    producer: rtrb::Producer<MixerCommand>,
}

impl CommandSender {
    pub fn new(producer: rtrb::Producer<MixerCommand>) -> Self {
        Self { producer }
    }

    /// Queue a command without blocking
    ///
    /// Returns the command back if the queue is full.
    pub fn send(&mut self, cmd: MixerCommand) -> Result<(), MixerCommand> {
        self.producer.push(cmd).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }

    pub fn has_space(&self) -> bool {
        self.producer.slots() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_arrive_in_order() {
        let (tx, mut rx) = command_channel();
        let mut sender = CommandSender::new(tx);
        sender.send(MixerCommand::Play { slot: 0 }).unwrap();
        sender.send(MixerCommand::Pause { slot: 1 }).unwrap();

        assert!(matches!(rx.pop(), Ok(MixerCommand::Play { slot: 0 })));
        assert!(matches!(rx.pop(), Ok(MixerCommand::Pause { slot: 1 })));
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_full_queue_returns_command() {
        let (tx, _rx) = command_channel();
        let mut sender = CommandSender::new(tx);
        for _ in 0..COMMAND_QUEUE_CAPACITY {
            sender.send(MixerCommand::Detach { slot: 0 }).unwrap();
        }
        assert!(!sender.has_space());
        let rejected = sender.send(MixerCommand::Play { slot: 3 });
        assert!(matches!(rejected, Err(MixerCommand::Play { slot: 3 })));
    }
}
