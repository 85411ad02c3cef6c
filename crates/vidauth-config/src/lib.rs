//! Configuration system for the vidauth login server.
//!
//! Provides TOML-based configuration with:
//! - `[server]`, `[provider]` and `[storage]` sections
//! - Config file layering (user config dir + project-local overrides)
//! - Client secret resolution (env var → config file)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, save_config,
    xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
