//! Core TOML config loading: read from a path or the configuration directory.

use std::path::Path;

use forwagent_common::ConfigError;
use tracing::{debug, info};

use crate::paths::CONFIG_FILE_NAME;
use crate::schema::ForwagentConfig;
use crate::validation;

/// Load config from a specific TOML file path.
///
/// Deserializes the file using serde defaults for any missing fields, then
/// validates it. An invalid config is an error: it is only read at startup.
pub fn load_from_path(path: &Path) -> Result<ForwagentConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(ConfigError::ParseError(format!(
                "failed to read {}: {e}",
                path.display()
            )));
        }
    };

    let config: ForwagentConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse {}: {e}", path.display())))?;

    validation::validate(&config)?;

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load `config.toml` from `conf_dir`, falling back to defaults when the
/// file does not exist.
pub fn load_from_dir(conf_dir: &Path) -> Result<ForwagentConfig, ConfigError> {
    let path = conf_dir.join(CONFIG_FILE_NAME);
    match load_from_path(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) => {
            debug!("no config at {}, using defaults", path.display());
            Ok(ForwagentConfig::default())
        }
        Err(e) => Err(e),
    }
}
