//! Configuration for stemstage
//!
//! - Generic YAML config loading/saving
//! - Engine tunables ([`EngineConfig`])
//! - Standard config file locations

mod engine;
mod io;
mod paths;

pub use engine::EngineConfig;
pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};
