//! Configuration types

use crate::io::error::QueueError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default notification file prefix
pub const DEFAULT_NOTIFICATION_FILE_PREFIX: &str = "eids_";
/// Default notification file extension
pub const DEFAULT_NOTIFICATION_FILE_EXTENSION: &str = ".xml";

/// The shared directory key
pub const KEY_NOTIFICATION_DIR: &str = "notificationDir";
/// The notification file prefix key
pub const KEY_NOTIFICATION_FILE_PREFIX: &str = "notificationFilePrefix";
/// The notification file extension key
pub const KEY_NOTIFICATION_FILE_EXTENSION: &str = "notificationFileExtension";
/// The processed (archive) directory key. Files are deleted after
/// processing when it is not set.
pub const KEY_PROCESSED_DIR: &str = "processedDir";
/// The failed (quarantine) directory key for undecodable files
pub const KEY_FAILED_DIR: &str = "failedDir";

/// All recognized configuration keys
pub const KEYS: [&str; 5] = [
    KEY_NOTIFICATION_DIR,
    KEY_NOTIFICATION_FILE_PREFIX,
    KEY_NOTIFICATION_FILE_EXTENSION,
    KEY_PROCESSED_DIR,
    KEY_FAILED_DIR,
];

/// Whether `key` is one of [`KEYS`], ignoring ASCII case
pub fn is_known_key(key: &str) -> bool {
    KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
}

/// Queue directory configuration, shared by producers and consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    /// Shared directory; created if absent
    #[serde(default = "default_notification_dir")]
    pub notification_dir: PathBuf,

    /// File name prefix; empty means the default
    #[serde(default = "default_prefix")]
    pub notification_file_prefix: String,

    /// Archive directory for processed files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_dir: Option<PathBuf>,

    /// Quarantine directory for files that fail to decode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_dir: Option<PathBuf>,

    /// File name extension, including the leading dot
    #[serde(
        default = "default_extension",
        rename = "notificationFileExtension"
    )]
    pub extension: String,
}

fn default_notification_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_prefix() -> String {
    DEFAULT_NOTIFICATION_FILE_PREFIX.to_string()
}

fn default_extension() -> String {
    DEFAULT_NOTIFICATION_FILE_EXTENSION.to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new(default_notification_dir())
    }
}

impl QueueConfig {
    /// Configuration for `notification_dir` with default prefix and extension
    pub fn new(notification_dir: impl Into<PathBuf>) -> Self {
        Self {
            notification_dir: notification_dir.into(),
            notification_file_prefix: default_prefix(),
            processed_dir: None,
            failed_dir: None,
            extension: default_extension(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.notification_file_prefix = prefix.into();
        self
    }

    pub fn with_processed_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.processed_dir = Some(dir.into());
        self
    }

    pub fn with_failed_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.failed_dir = Some(dir.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Effective prefix (the default when the configured one is empty)
    pub fn prefix(&self) -> &str {
        if self.notification_file_prefix.is_empty() {
            DEFAULT_NOTIFICATION_FILE_PREFIX
        } else {
            &self.notification_file_prefix
        }
    }

    /// Apply one configuration value
    ///
    /// Keys are matched case-insensitively. Returns `false` for keys this
    /// configuration does not own, which callers may ignore.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let Some(key) = KEYS.iter().find(|k| k.eq_ignore_ascii_case(key)) else {
            return false;
        };

        match *key {
            KEY_NOTIFICATION_DIR => self.notification_dir = PathBuf::from(value),
            KEY_NOTIFICATION_FILE_PREFIX => self.notification_file_prefix = value.to_string(),
            KEY_NOTIFICATION_FILE_EXTENSION => {
                self.extension = if value.is_empty() || value.starts_with('.') {
                    value.to_string()
                } else {
                    format!(".{value}")
                };
            }
            KEY_PROCESSED_DIR => self.processed_dir = non_empty_path(value),
            KEY_FAILED_DIR => self.failed_dir = non_empty_path(value),
            _ => return false,
        }
        true
    }

    /// Apply every recognized `(key, value)` pair, returning how many applied
    pub fn apply_key_values<I, K, V>(&mut self, pairs: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        pairs
            .into_iter()
            .filter(|(k, v)| self.set(k.as_ref(), v.as_ref()))
            .count()
    }

    /// Create the shared, archive and quarantine directories if missing
    pub fn prepare(&self) -> Result<(), QueueError> {
        ensure_dir(&self.notification_dir)?;
        if let Some(ref dir) = self.processed_dir {
            ensure_dir(dir)?;
        }
        if let Some(ref dir) = self.failed_dir {
            ensure_dir(dir)?;
        }
        Ok(())
    }
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

fn ensure_dir(dir: &Path) -> Result<(), QueueError> {
    fs::create_dir_all(dir).map_err(|e| QueueError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    if !dir.is_dir() {
        return Err(QueueError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }
    Ok(())
}
