//! Player configuration for stemstage-player
//!
//! Configuration is stored as YAML in the user's config directory.
//! Default location: ~/.config/stemstage/player.yaml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use stemstage_core::audio::AudioConfig;
use stemstage_core::config::{default_config_path, EngineConfig};
use stemstage_core::pitch::PitchConfig;
use stemstage_midi::MidiOutputConfig;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Tick rate, drift tolerance, cue window, metering
    pub engine: EngineConfig,
    /// Output device and buffer size
    pub audio: AudioConfig,
    /// Master-bus pitch shift
    pub pitch: PitchConfig,
    /// Where cue commands are sent
    pub midi: MidiOutputConfig,
}

pub fn default_player_config_path() -> PathBuf {
    default_config_path("player.yaml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use stemstage_core::config::{load_config, save_config};

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config: PlayerConfig = load_config(&dir.path().join("player.yaml"));
        assert_eq!(config, PlayerConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let yaml = "midi:\n  port_match: helix\npitch:\n  enabled: true\n";
        let config: PlayerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.midi.port_match.as_deref(), Some("helix"));
        assert!(config.pitch.enabled);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("player.yaml");
        let mut config = PlayerConfig::default();
        config.midi.port_match = Some("kemper".into());
        save_config(&config, &path).unwrap();
        let loaded: PlayerConfig = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_default_path() {
        assert!(default_player_config_path().ends_with("stemstage/player.yaml"));
    }
}
