//! Locating and layering the callback server's config files.
//!
//! The per-user file is read first, then `vidauth.toml` in the working (or
//! given) directory on top of it. Command-line flags are layered by the
//! binary afterwards.

use std::path::{Path, PathBuf};

use crate::{ConfigError, Result, VidauthConfig};

const PROJECT_CONFIG_FILE: &str = "vidauth.toml";
const USER_CONFIG_FILE: &str = "config.toml";
const APP_NAME: &str = "vidauth";

/// Points the per-user config lookup at another directory.
const CONFIG_DIR_ENV: &str = "VIDAUTH_CONFIG_DIR";

/// One candidate config file and whether it contributed to the result.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub loaded: bool,
}

/// Merged config plus what was looked at to produce it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: VidauthConfig,
    /// Candidates in merge order; later entries win.
    pub sources: Vec<ConfigSource>,
    /// Problems worth surfacing to the operator, such as a secret kept in a file.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Merge the per-user file and `vidauth.toml` from `project_dir` (or the
/// working directory).
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Like [`load_config`], reading the per-user file from `config_dir` when given
/// instead of `VIDAUTH_CONFIG_DIR` or the platform config directory.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = VidauthConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_config_path {
        sources.push(load_layer(&mut config, &path, &mut warnings));
    }

    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    sources.push(load_layer(&mut config, &project_path, &mut warnings));

    if config.has_plaintext_secret() {
        warnings.push(format!(
            "client_secret is stored in plaintext under [provider]; set {} to keep it out of config files",
            crate::CLIENT_SECRET_ENV
        ));
    }

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Parse a single config file.
pub fn load_config_file(path: &Path) -> Result<VidauthConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    VidauthConfig::from_toml(&contents)
}

/// Write `config` as TOML, creating missing parent directories.
pub fn save_config(config: &VidauthConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Per-user directory for config and, by default, stored credentials.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Merge `path` into `config` if it exists. A broken file is skipped and
/// reported in `warnings` so the server can still start from other layers.
fn load_layer(config: &mut VidauthConfig, path: &Path, warnings: &mut Vec<String>) -> ConfigSource {
    let loaded = path.is_file()
        && match load_config_file(path) {
            Ok(layer) => {
                config.merge(layer);
                true
            }
            Err(e) => {
                warnings.push(format!("Skipping {}: {}", path.display(), e));
                false
            }
        };
    ConfigSource {
        path: path.to_path_buf(),
        loaded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_layers_merge_project_over_user() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(
            user.path().join("config.toml"),
            "[provider]\nclient_id = \"user\"\nstate_ttl_secs = 120\n",
        )
        .unwrap();
        fs::write(
            project.path().join("vidauth.toml"),
            "[provider]\nclient_id = \"project\"\n",
        )
        .unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        let provider = loaded.config.provider.unwrap();
        assert_eq!(provider.client_id.as_deref(), Some("project"));
        assert_eq!(provider.state_ttl_secs, Some(120));
        assert_eq!(loaded.sources.len(), 2);
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_invalid_layer_is_skipped_with_warning() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(user.path().join("config.toml"), "not = [valid").unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert!(loaded.loaded_from().is_empty());
        assert_eq!(loaded.warnings.len(), 1);
    }

    #[test]
    fn test_plaintext_secret_warns() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        fs::write(
            user.path().join("config.toml"),
            "[provider]\nclient_secret = \"shh\"\n",
        )
        .unwrap();

        let loaded = load_config_with_options(Some(project.path()), Some(user.path())).unwrap();
        assert!(loaded.warnings[0].contains("stored in plaintext"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = VidauthConfig::from_toml("[provider]\nclient_id = \"a\"\n").unwrap();

        save_config(&config, &path).unwrap();
        assert_eq!(load_config_file(&path).unwrap(), config);
    }
}
