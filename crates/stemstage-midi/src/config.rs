//! MIDI output configuration

use serde::{Deserialize, Serialize};

/// Where cue commands go
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiOutputConfig {
    /// Case-insensitive substring of the output port name; `None` keeps MIDI offline
    pub port_match: Option<String>,
    /// Messages buffered ahead of the writer thread
    pub queue_capacity: usize,
}

impl Default for MidiOutputConfig {
    fn default() -> Self {
        Self {
            port_match: None,
            queue_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: MidiOutputConfig = serde_yaml::from_str("port_match: helix").unwrap();
        assert_eq!(config.port_match.as_deref(), Some("helix"));
        assert_eq!(config.queue_capacity, 64);
    }
}
