//! CLI command handlers.

pub mod logout;
pub mod serve;
pub mod status;

use std::path::PathBuf;

use anyhow::Result;
use vidauth_config::VidauthConfig;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file, bypassing discovery.
    pub config_path: Option<PathBuf>,
    /// Credentials directory override.
    pub data_dir: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
}

impl Context {
    /// Load the config file(s), logging any warnings.
    pub fn load_config(&self) -> Result<VidauthConfig> {
        if let Some(path) = &self.config_path {
            return Ok(vidauth_config::load_config_file(path)?);
        }

        let loaded = vidauth_config::load_config(None)?;
        for warning in &loaded.warnings {
            tracing::warn!("{}", warning);
        }
        for path in loaded.loaded_from() {
            tracing::debug!(path = %path.display(), "Loaded config");
        }
        Ok(loaded.config)
    }

    /// Like [`Context::load_config`], falling back to an empty config.
    ///
    /// Used by commands that only need the storage location.
    pub fn load_config_or_default(&self) -> VidauthConfig {
        self.load_config().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Ignoring unreadable config");
            VidauthConfig::default()
        })
    }

    /// Credentials directory: CLI flag, then config, then the user config dir.
    pub fn data_dir(&self, config: &VidauthConfig) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        if let Some(dir) = config.storage.as_ref().and_then(|s| s.data_dir.clone()) {
            return Ok(dir);
        }
        vidauth_config::xdg_config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
    }
}
