//! Producer-side atomic publish
//!
//! A payload is written to a temporary file inside the shared directory,
//! synced, and then renamed onto the first free candidate name with a
//! no-clobber rename. Readers only ever see complete files, and two writers
//! racing for the same millisecond land on different disambiguators without
//! a lock: the rename itself fails with `AlreadyExists` for the loser, who
//! moves on to the next candidate.

use crate::codec::{CodecError, NotificationCodec};
use crate::config::QueueConfig;
use crate::io::error::QueueError;
use crate::io::naming::{self, Clock, SystemClock};
use crate::lifecycle::{Lifecycle, LifecycleError};
use crate::sink::NotificationSource;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Outcome of a queue write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// The payload is visible in the shared directory
    Written { path: PathBuf },

    /// Nothing was written; the reason has been logged
    Dropped { reason: DropReason },
}

impl WriteOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteOutcome::Written { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            WriteOutcome::Written { path } => Some(path),
            WriteOutcome::Dropped { .. } => None,
        }
    }
}

/// Why a write was abandoned
#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    /// The payload was empty
    EmptyPayload,
    /// The codec could not encode the notification
    EncodeFailed(String),
    /// All disambiguators for this millisecond were taken
    NoFreeName,
    /// Writing or renaming the temporary file failed
    Io(String),
}

/// Writes raw payloads into a queue directory
pub struct AtomicWriter {
    name: String,
    directory: PathBuf,
    prefix: String,
    extension: String,
    clock: Arc<dyn Clock>,
    file_count: AtomicU64,
}

impl AtomicWriter {
    pub fn new(name: impl Into<String>, config: &QueueConfig) -> Self {
        Self {
            name: name.into(),
            directory: config.notification_dir.clone(),
            prefix: config.prefix().to_string(),
            extension: config.extension.clone(),
            clock: Arc::new(SystemClock),
            file_count: AtomicU64::new(0),
        }
    }

    /// Replace the time source used for base names
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Number of files this writer has published
    pub fn file_count(&self) -> u64 {
        self.file_count.load(Ordering::Relaxed)
    }

    /// Publish `payload` as a new notification file
    ///
    /// Never fails from the caller's point of view: every reason for not
    /// writing is logged and reported as [`WriteOutcome::Dropped`].
    pub fn write(&self, payload: &[u8]) -> WriteOutcome {
        let base = naming::base_name(&self.prefix, self.clock.as_ref());

        if payload.is_empty() {
            warn!(name = %self.name, "could not get payload for name ({base})");
            return WriteOutcome::Dropped {
                reason: DropReason::EmptyPayload,
            };
        }

        match self.publish_temp(&base, payload) {
            Ok(Some(path)) => {
                let count = self.file_count.fetch_add(1, Ordering::Relaxed) + 1;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                info!(name = %self.name, "saved notification to file ({count}, {file_name})");
                WriteOutcome::Written { path }
            }
            Ok(None) => {
                warn!(name = %self.name, "could not get notification file for name ({base})");
                WriteOutcome::Dropped {
                    reason: DropReason::NoFreeName,
                }
            }
            Err(e) => {
                warn!(name = %self.name, "could not save notification ({base}): {e}");
                WriteOutcome::Dropped {
                    reason: DropReason::Io(e.to_string()),
                }
            }
        }
    }

    /// Write the temporary file and rename it onto the first free candidate
    ///
    /// Returns `Ok(None)` if every candidate is taken. The temporary file is
    /// removed on every path that does not end in a successful rename.
    fn publish_temp(&self, base: &str, payload: &[u8]) -> Result<Option<PathBuf>, QueueError> {
        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{base}_"))
            .suffix(".tmp")
            .tempfile_in(&self.directory)
            .map_err(|e| QueueError::Io {
                path: self.directory.clone(),
                source: e,
            })?;

        write_synced(&mut temp, payload).map_err(|e| QueueError::Io {
            path: temp.path().to_path_buf(),
            source: e,
        })?;

        for candidate in naming::candidates(&self.directory, base, &self.extension) {
            match temp.persist_noclobber(&candidate) {
                Ok(_) => return Ok(Some(candidate)),
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                    temp = e.file;
                }
                Err(e) => {
                    return Err(QueueError::Io {
                        path: candidate,
                        source: e.error,
                    });
                }
            }
        }

        Ok(None)
    }
}

fn write_synced(temp: &mut NamedTempFile, payload: &[u8]) -> std::io::Result<()> {
    temp.write_all(payload)?;
    temp.flush()?;
    temp.as_file().sync_all()
}

/// Encodes notifications with a codec and publishes them atomically
pub struct NotificationWriter<C> {
    writer: AtomicWriter,
    codec: C,
}

impl<C: NotificationCodec> NotificationWriter<C> {
    pub fn new(name: impl Into<String>, config: &QueueConfig, codec: C) -> Self {
        Self {
            writer: AtomicWriter::new(name, config),
            codec,
        }
    }

    pub fn from_writer(writer: AtomicWriter, codec: C) -> Self {
        Self { writer, codec }
    }

    pub fn writer(&self) -> &AtomicWriter {
        &self.writer
    }

    /// Encode and publish a notification
    pub fn publish(&self, notification: &C::Notification) -> WriteOutcome {
        match self.codec.encode(notification) {
            Ok(payload) => self.writer.write(&payload),
            Err(CodecError::Empty) => self.writer.write(&[]),
            Err(e) => {
                warn!(name = %self.writer.name, "could not encode notification: {e}");
                WriteOutcome::Dropped {
                    reason: DropReason::EncodeFailed(e.to_string()),
                }
            }
        }
    }
}

impl<C: NotificationCodec> NotificationSource<C::Notification> for NotificationWriter<C> {
    fn supply_encoded(&self, notification: &C::Notification) -> WriteOutcome {
        self.publish(notification)
    }
}

impl<C: NotificationCodec> Lifecycle for NotificationWriter<C> {
    fn startup(&self) -> Result<(), LifecycleError> {
        let dir = self.writer.directory();
        fs::create_dir_all(dir).map_err(|e| QueueError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        debug!(name = %self.writer.name, "writer started ({})", dir.display());
        Ok(())
    }

    fn shutdown(&self) {
        debug!(name = %self.writer.name, "writer stopped");
    }
}
