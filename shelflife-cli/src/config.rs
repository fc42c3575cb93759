//! Config file loading.

use std::path::{Path, PathBuf};

use shelflife_core::{ConfigError, SyncConfig};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SHELFLIFE_CONFIG";

/// Load and validate the config from `explicit`, or from [`CONFIG_ENV`].
pub fn load(explicit: Option<&Path>) -> Result<SyncConfig, ConfigError> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(config_path_from_env)
        .ok_or(ConfigError::MissingConfigPath)?;
    from_path(&path)
}

/// Read a TOML config file. A relative `cache_path` is taken relative to
/// the file's directory.
pub fn from_path(path: &Path) -> Result<SyncConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        reason: format!("{}: {}", path.display(), e),
    })?;
    let mut config = parse(&contents)?;

    if config.cache_path.is_relative() {
        if let Some(dir) = path.parent() {
            config.cache_path = dir.join(&config.cache_path);
        }
    }
    Ok(config)
}

/// Parse and validate TOML text.
pub fn parse(contents: &str) -> Result<SyncConfig, ConfigError> {
    let config: SyncConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
        reason: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var_os(CONFIG_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}
