//! Standard locations for stemstage configuration files

use std::path::PathBuf;

/// `~/.config/stemstage` (platform equivalent), or `./stemstage` when no
/// config directory can be determined
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stemstage")
}

/// Path of a named file inside [`default_config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_layout() {
        let path = default_config_path("player.yaml");
        assert!(path.ends_with("stemstage/player.yaml"));
    }
}
