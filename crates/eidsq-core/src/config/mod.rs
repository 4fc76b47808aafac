//! Configuration resolution
//!
//! The same key set is accepted from every source: `notificationDir`,
//! `notificationFilePrefix`, `notificationFileExtension`, `processedDir` and
//! `failedDir`, matched case-insensitively. Sources, by priority:
//! 1. Command-line flags (passed as parameters)
//! 2. Environment variables
//! 3. Config file (`eidsq.toml`)
//! 4. Defaults

mod discovery;
mod types;

pub use discovery::{resolve_config, ConfigError, ConfigOverrides, CONFIG_FILE_NAME};
pub use types::{
    is_known_key, QueueConfig, DEFAULT_NOTIFICATION_FILE_EXTENSION,
    DEFAULT_NOTIFICATION_FILE_PREFIX, KEYS, KEY_FAILED_DIR, KEY_NOTIFICATION_DIR,
    KEY_NOTIFICATION_FILE_EXTENSION, KEY_NOTIFICATION_FILE_PREFIX, KEY_PROCESSED_DIR,
};
