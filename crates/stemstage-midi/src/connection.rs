//! MIDI output port discovery and connection
//!
//! Uses midir for cross-platform MIDI I/O (ALSA on Linux, CoreMIDI on macOS, WinMM on Windows).

use midir::{MidiOutput, MidiOutputConnection};

/// Error type for MIDI connection operations
#[derive(Debug, thiserror::Error)]
pub enum MidiConnectionError {
    #[error("Failed to initialize MIDI output: {0}")]
    OutputInitError(String),

    #[error("No MIDI output ports available")]
    NoOutputPorts,

    #[error("No MIDI port found matching pattern: {0}")]
    PortNotFound(String),

    #[error("Failed to connect to MIDI port: {0}")]
    ConnectionError(String),

    #[error("Failed to get port info: {0}")]
    PortInfoError(String),
}

/// An open output connection and the name of the port it went to
pub struct MidiConnection {
    pub output: MidiOutputConnection,
    pub port_name: String,
}

impl MidiConnection {
    /// Connect to the first output port whose name contains `port_match`
    ///
    /// The pattern is matched case-insensitively as a substring of port names.
    pub fn connect_output(port_match: &str) -> Result<Self, MidiConnectionError> {
        let midi_out = MidiOutput::new("stemstage-midi-out")
            .map_err(|e| MidiConnectionError::OutputInitError(e.to_string()))?;

        let out_ports = midi_out.ports();
        if out_ports.is_empty() {
            return Err(MidiConnectionError::NoOutputPorts);
        }

        let names: Vec<String> = out_ports
            .iter()
            .map(|port| midi_out.port_name(port).unwrap_or_default())
            .collect();
        let index = find_port(&names, port_match)
            .ok_or_else(|| MidiConnectionError::PortNotFound(port_match.to_string()))?;

        let port = &out_ports[index];
        let port_name = midi_out
            .port_name(port)
            .map_err(|e| MidiConnectionError::PortInfoError(e.to_string()))?;
        log::info!("MIDI: Found output port: {}", port_name);

        let output = midi_out
            .connect(port, "stemstage-cues")
            .map_err(|e| MidiConnectionError::ConnectionError(e.to_string()))?;
        log::info!("MIDI: Connected to output port");

        Ok(Self { output, port_name })
    }

    /// List all available MIDI output ports
    pub fn list_output_ports() -> Result<Vec<String>, MidiConnectionError> {
        let midi_out = MidiOutput::new("stemstage-midi-list")
            .map_err(|e| MidiConnectionError::OutputInitError(e.to_string()))?;

        let ports: Vec<String> = midi_out
            .ports()
            .iter()
            .filter_map(|port| midi_out.port_name(port).ok())
            .collect();

        Ok(ports)
    }
}

/// Index of the first name containing `pattern`, ignoring case
pub fn find_port(names: &[String], pattern: &str) -> Option<usize> {
    let pattern = pattern.to_lowercase();
    names
        .iter()
        .position(|name| name.to_lowercase().contains(&pattern))
}
