//! YAML configuration I/O
//!
//! Loading never fails: a missing or broken file yields the type's default
//! so a show can always start. Saving reports errors through anyhow.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load a configuration value from a YAML file
///
/// Returns `T::default()` if the file is missing, unreadable or invalid.
/// The latter two cases are logged as warnings.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("Config {:?} not found, using defaults", path);
        return T::default();
    }

    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::warn!("Failed to read config {:?}: {}, using defaults", path, e);
            return T::default();
        }
    };

    match serde_yaml::from_str::<T>(&contents) {
        Ok(config) => {
            log::info!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("Failed to parse config {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Save a configuration value as YAML, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("Saved config to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_missing_file_yields_default() {
        let config: EngineConfig = load_config(Path::new("/nonexistent/stemstage/engine.yaml"));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_invalid_yaml_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "tick_rate_hz: [not, a, number]").unwrap();

        let config: EngineConfig = load_config(&path);
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "cue_window_secs: 0.25\n").unwrap();

        let config: EngineConfig = load_config(&path);
        assert_eq!(config.cue_window_secs, 0.25);
        assert_eq!(config.drift_threshold_secs, EngineConfig::default().drift_threshold_secs);
    }

    #[test]
    fn test_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.yaml");

        let config = EngineConfig {
            tick_rate_hz: 120.0,
            ..EngineConfig::default()
        };
        save_config(&config, &path).unwrap();

        let loaded: EngineConfig = load_config(&path);
        assert_eq!(loaded.tick_rate_hz, 120.0);
    }
}
