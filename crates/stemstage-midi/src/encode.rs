//! Cue command to MIDI wire bytes

use stemstage_core::cue_sheet::CueCommand;

/// A channel voice message of at most three bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiBytes {
    bytes: [u8; 3],
    len: u8,
}

impl MidiBytes {
    fn two(status: u8, data: u8) -> Self {
        Self {
            bytes: [status, data & 0x7F, 0],
            len: 2,
        }
    }

    fn three(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            bytes: [status, data1 & 0x7F, data2 & 0x7F],
            len: 3,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

/// Encode a cue command
///
/// Channels above 15 wrap into the low nibble; data bytes are masked to 7 bits.
pub fn encode(command: &CueCommand) -> MidiBytes {
    match *command {
        CueCommand::ProgramChange { channel, program } => {
            MidiBytes::two(0xC0 | (channel & 0x0F), program)
        }
        CueCommand::ControlChange {
            channel,
            controller,
            value,
        } => MidiBytes::three(0xB0 | (channel & 0x0F), controller, value),
        CueCommand::Note {
            channel,
            note,
            velocity,
        } => MidiBytes::three(0x90 | (channel & 0x0F), note, velocity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_change() {
        let msg = encode(&CueCommand::ProgramChange {
            channel: 0,
            program: 5,
        });
        assert_eq!(msg.as_slice(), &[0xC0, 5]);
    }

    #[test]
    fn test_control_change() {
        let msg = encode(&CueCommand::ControlChange {
            channel: 15,
            controller: 74,
            value: 127,
        });
        assert_eq!(msg.as_slice(), &[0xBF, 74, 127]);
    }

    #[test]
    fn test_note_on() {
        let msg = encode(&CueCommand::Note {
            channel: 9,
            note: 36,
            velocity: 100,
        });
        assert_eq!(msg.as_slice(), &[0x99, 36, 100]);
    }

    #[test]
    fn test_data_bytes_are_masked() {
        let msg = encode(&CueCommand::ControlChange {
            channel: 1,
            controller: 0xFF,
            value: 0x80,
        });
        assert_eq!(msg.as_slice(), &[0xB1, 0x7F, 0x00]);
    }
}
