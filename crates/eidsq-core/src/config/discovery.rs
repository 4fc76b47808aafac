//! Configuration discovery and resolution

use super::types::{
    is_known_key, QueueConfig, KEY_FAILED_DIR, KEY_NOTIFICATION_DIR, KEY_NOTIFICATION_FILE_EXTENSION,
    KEY_NOTIFICATION_FILE_PREFIX, KEY_PROCESSED_DIR,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Name of the config file looked up in the current directory
pub const CONFIG_FILE_NAME: &str = "eidsq.toml";

/// Environment variables and the configuration key each one sets
const ENV_KEYS: [(&str, &str); 5] = [
    ("EIDSQ_NOTIFICATION_DIR", KEY_NOTIFICATION_DIR),
    ("EIDSQ_PREFIX", KEY_NOTIFICATION_FILE_PREFIX),
    ("EIDSQ_EXTENSION", KEY_NOTIFICATION_FILE_EXTENSION),
    ("EIDSQ_PROCESSED_DIR", KEY_PROCESSED_DIR),
    ("EIDSQ_FAILED_DIR", KEY_FAILED_DIR),
];

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A recognized key carried a value that is not a string
    #[error("Invalid value for {key}: expected a string")]
    InvalidValue { key: String },
}

/// Command-line overrides for configuration
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Path to config file override
    pub config_path: Option<PathBuf>,
    /// Override the shared directory
    pub notification_dir: Option<PathBuf>,
    /// Override the file prefix
    pub prefix: Option<String>,
    /// Override the file extension
    pub extension: Option<String>,
    /// Override the archive directory
    pub processed_dir: Option<PathBuf>,
    /// Override the quarantine directory
    pub failed_dir: Option<PathBuf>,
}

/// Resolve configuration from all sources
///
/// Priority (highest to lowest):
/// 1. Command-line overrides
/// 2. Environment variables (`EIDSQ_*`)
/// 3. Config file (`--config`, or `eidsq.toml` in the current directory)
/// 4. Defaults (shared directory = current directory)
pub fn resolve_config(
    overrides: &ConfigOverrides,
    current_dir: &Path,
) -> Result<QueueConfig, ConfigError> {
    let mut config = QueueConfig::new(current_dir);

    // 3. Config file; an explicit path must load, the implicit one may be absent
    if let Some(ref path) = overrides.config_path {
        load_config_file(&mut config, path)?;
        debug!("Loaded config from {}", path.display());
    } else {
        let local = current_dir.join(CONFIG_FILE_NAME);
        if local.exists() {
            if let Err(e) = load_config_file(&mut config, &local) {
                warn!("Failed to parse config at {}: {e}", local.display());
            }
        }
    }

    // 2. Apply environment variables
    apply_env_overrides(&mut config);

    // 1. Apply command-line overrides
    apply_cli_overrides(&mut config, overrides);

    Ok(config)
}

/// Apply a TOML config file
///
/// The file is a flat table using the same keys as the command line
/// (`notificationDir`, `processedDir`, ...). Unrecognized keys are ignored so
/// a config shared with other components still loads.
fn load_config_file(config: &mut QueueConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let table: toml::Table = toml::from_str(&contents)?;

    for (key, value) in &table {
        let Some(value) = value.as_str() else {
            if is_known_key(key) {
                return Err(ConfigError::InvalidValue { key: key.clone() });
            }
            continue;
        };
        config.set(key, value);
    }
    Ok(())
}

/// Apply environment variable overrides
fn apply_env_overrides(config: &mut QueueConfig) {
    for (var, key) in ENV_KEYS {
        if let Ok(value) = std::env::var(var) {
            config.set(key, &value);
        }
    }
}

/// Apply command-line overrides
fn apply_cli_overrides(config: &mut QueueConfig, overrides: &ConfigOverrides) {
    if let Some(ref dir) = overrides.notification_dir {
        config.notification_dir = dir.clone();
    }

    if let Some(ref prefix) = overrides.prefix {
        config.set(KEY_NOTIFICATION_FILE_PREFIX, prefix);
    }

    if let Some(ref extension) = overrides.extension {
        config.set(KEY_NOTIFICATION_FILE_EXTENSION, extension);
    }

    if let Some(ref dir) = overrides.processed_dir {
        config.processed_dir = Some(dir.clone());
    }

    if let Some(ref dir) = overrides.failed_dir {
        config.failed_dir = Some(dir.clone());
    }
}
