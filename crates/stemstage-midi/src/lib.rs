//! MIDI output for stemstage cue commands
//!
//! This crate provides:
//! - Output port discovery by name substring via midir
//! - Cue command to wire byte encoding
//! - A background writer implementing the core [`CommandSink`]
//!
//! # Architecture
//!
//! ```text
//! CueScheduler (session thread) → flume channel → midi-out thread → MIDI port
//! ```
//!
//! The session thread only ever does a `try_send`, so a stalled driver can
//! cost a cue but never a tick.

mod config;
mod connection;
mod encode;
mod sender;

pub use config::MidiOutputConfig;
pub use connection::{find_port, MidiConnection, MidiConnectionError};
pub use encode::{encode, MidiBytes};
pub use sender::{MidiCommandSender, MidiWrite, OfflineSink};

use stemstage_core::engine::CommandSink;

/// Error type for MIDI output setup
#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("MIDI connection error: {0}")]
    ConnectionError(#[from] MidiConnectionError),

    #[error("Failed to start MIDI writer: {0}")]
    WorkerError(#[from] std::io::Error),
}

/// Connect to the configured port and start its writer
pub fn connect_sender(port_match: &str, queue_capacity: usize) -> Result<MidiCommandSender, MidiError> {
    let connection = MidiConnection::connect_output(port_match)?;
    let sender = MidiCommandSender::spawn(connection.output, connection.port_name, queue_capacity)?;
    Ok(sender)
}

/// Build the cue sink for a config
///
/// Falls back to [`OfflineSink`] when no port is configured or the port
/// can't be opened; a missing controller must not stop the show.
pub fn open_sink(config: &MidiOutputConfig) -> Box<dyn CommandSink> {
    let Some(port_match) = config.port_match.as_deref() else {
        log::info!("MIDI: No output port configured, cues will not be sent");
        return Box::new(OfflineSink);
    };
    match connect_sender(port_match, config.queue_capacity) {
        Ok(sender) => {
            log::info!("MIDI: Sending cues to {}", sender.port_name());
            Box::new(sender)
        }
        Err(e) => {
            log::warn!("MIDI: {} (cues will not be sent)", e);
            if let Ok(ports) = MidiConnection::list_output_ports() {
                log::info!("MIDI: Available output ports: {:?}", ports);
            }
            Box::new(OfflineSink)
        }
    }
}
