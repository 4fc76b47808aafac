//! Consumer-side queue drain
//!
//! A drain pass lists the eligible files in the shared directory, sorts them
//! into arrival order and processes each one:
//!
//! 1. Read and decode the payload
//! 2. Hand the notification to the sink
//! 3. Take the file off the queue (delete, or move to the archive directory)
//!
//! Payload and sink failures are logged and the file is still taken off the
//! queue, so a poison message is never redelivered. Failing to delete or move
//! a file is fatal: the directory can no longer be trusted, and continuing
//! would reprocess the same file forever.
//!
//! The pass repeats until a listing comes back empty, which absorbs files
//! that arrived while earlier ones were being processed.
//!
//! Archived files are never overwritten. A name already present in the
//! archive or quarantine directory makes the move fail, which is fatal like
//! any other move failure.
//!
//! Passes and single-file calls on one drainer are serialized, so a worker
//! finishing its last file never races a newer pass over the same file.

use crate::codec::NotificationCodec;
use crate::config::QueueConfig;
use crate::io::error::DrainError;
use crate::io::naming::NotificationFile;
use crate::sink::NotificationSink;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a processed file leaves the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    /// The payload decoded (whether or not the sink accepted it)
    Handled,
    /// The payload could not be read or decoded
    Undecodable,
}

/// Drains a queue directory into a sink
pub struct Drainer<C, S> {
    name: String,
    config: QueueConfig,
    codec: C,
    sink: S,
    file_count: AtomicU64,
    pass_lock: Mutex<()>,
}

impl<C, S> Drainer<C, S>
where
    C: NotificationCodec,
    S: NotificationSink<C::Notification>,
{
    pub fn new(name: impl Into<String>, config: &QueueConfig, codec: C, sink: S) -> Self {
        Self {
            name: name.into(),
            config: config.clone(),
            codec,
            sink,
            file_count: AtomicU64::new(0),
            pass_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Number of files this drainer has taken off the queue
    pub fn file_count(&self) -> u64 {
        self.file_count.load(Ordering::Relaxed)
    }

    /// Whether `path` names an eligible notification file
    pub fn is_eligible(&self, path: &Path) -> bool {
        NotificationFile::parse(path, self.config.prefix(), &self.config.extension).is_some()
    }

    /// List the eligible files currently in the shared directory, in arrival order
    ///
    /// Entries that disappear while listing, and entries that are not regular
    /// files, are left out.
    pub fn list_files(&self) -> Result<Vec<NotificationFile>, DrainError> {
        let dir = &self.config.notification_dir;
        let entries = fs::read_dir(dir).map_err(|e| DrainError::List {
            path: dir.clone(),
            source: e,
        })?;

        let mut files: Vec<NotificationFile> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    debug!(name = %self.name, "skipping unreadable directory entry: {e}");
                    None
                }
            })
            .filter_map(|path| {
                NotificationFile::parse(&path, self.config.prefix(), &self.config.extension)
            })
            .filter(|file| file.path().is_file())
            .collect();

        files.sort();
        Ok(files)
    }

    /// Process every eligible file until the directory has none left
    ///
    /// Returns the number of files taken off the queue.
    pub fn drain_once(&self) -> Result<usize, DrainError> {
        self.drain(&CancellationToken::new())
    }

    /// Like [`drain_once`](Self::drain_once), but stops between files once
    /// `cancel` fires. A file already in progress is always finished.
    pub fn drain(&self, cancel: &CancellationToken) -> Result<usize, DrainError> {
        let _pass = self.lock_pass();
        let mut count = 0;

        'passes: while !cancel.is_cancelled() {
            let files = self.list_files()?;
            if files.is_empty() {
                break;
            }
            if count == 0 {
                match files.first().and_then(NotificationFile::created_at) {
                    Some(oldest) => debug!(
                        name = %self.name,
                        "drain started ({} file(s), oldest queued {oldest})",
                        files.len()
                    ),
                    None => debug!(name = %self.name, "drain started ({} file(s))", files.len()),
                }
            }

            for file in files {
                if cancel.is_cancelled() {
                    break 'passes;
                }
                if self.process_unlocked(file.path())? {
                    count += 1;
                }
            }
        }

        if count > 0 {
            debug!(name = %self.name, "drain completed ({count})");
        }
        Ok(count)
    }

    /// Decode one file, hand it to the sink and take it off the queue
    ///
    /// Returns `Ok(false)` when the path is not an eligible file or has
    /// already disappeared. Returns [`DrainError::Fatal`] when the file could
    /// not be deleted or moved.
    pub fn process_file(&self, path: &Path) -> Result<bool, DrainError> {
        let _pass = self.lock_pass();
        self.process_unlocked(path)
    }

    fn lock_pass(&self) -> MutexGuard<'_, ()> {
        self.pass_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn process_unlocked(&self, path: &Path) -> Result<bool, DrainError> {
        if !self.is_eligible(path) {
            debug!(name = %self.name, "ignoring ineligible file ({})", path.display());
            return Ok(false);
        }

        let payload = match fs::read(path) {
            Ok(payload) => Some(payload),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(name = %self.name, "notification file ({}) no longer exists", path.display());
                return Ok(false);
            }
            Err(e) => {
                warn!(name = %self.name, "could not read notification ({}): {e}", path.display());
                None
            }
        };

        let count = self.file_count.fetch_add(1, Ordering::Relaxed) + 1;
        info!(name = %self.name, "notification file ({count}, {})", path.display());

        let disposition = match payload.map(|bytes| self.codec.decode(&bytes)) {
            Some(Ok(notification)) => {
                if let Err(e) = self.sink.receive(notification) {
                    warn!(name = %self.name, "Error processing notification ({}): {e}", path.display());
                }
                Disposition::Handled
            }
            Some(Err(e)) => {
                warn!(name = %self.name, "could not decode notification ({}): {e}", path.display());
                Disposition::Undecodable
            }
            None => Disposition::Undecodable,
        };

        self.take_off_queue(path, disposition)?;
        Ok(true)
    }

    /// Delete the file, or move it to the archive or quarantine directory
    fn take_off_queue(&self, path: &Path, disposition: Disposition) -> Result<(), DrainError> {
        let target_dir = match disposition {
            Disposition::Handled => self.config.processed_dir.as_ref(),
            Disposition::Undecodable => self
                .config
                .failed_dir
                .as_ref()
                .or(self.config.processed_dir.as_ref()),
        };

        let Some(dir) = target_dir else {
            return match fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    info!(name = %self.name, "could not delete file ({}), no longer exists", path.display());
                    Ok(())
                }
                Err(e) => {
                    error!(name = %self.name, "could not delete file ({}): {e}", path.display());
                    Err(DrainError::Fatal {
                        path: path.to_path_buf(),
                        source: e,
                    })
                }
            };
        };

        let dest = match path.file_name() {
            Some(file_name) => dir.join(file_name),
            None => dir.clone(),
        };
        move_file(path, &dest).map_err(|e| {
            error!(name = %self.name, "could not move file ({}): {e}", path.display());
            DrainError::Fatal {
                path: path.to_path_buf(),
                source: e,
            }
        })
    }
}

/// Move `from` to `to` without replacing an existing `to`
///
/// Links the new name and then unlinks the old one. Where linking is refused
/// (another filesystem, or no hard links), the contents are copied into a
/// freshly created `to` instead. Fails with `AlreadyExists` if `to` exists.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(e),
        Err(link_err) => {
            if !from.is_file() || !to.parent().is_some_and(Path::is_dir) {
                return Err(link_err);
            }
            copy_new(from, to)?;
        }
    }
    fs::remove_file(from)
}

fn copy_new(from: &Path, to: &Path) -> io::Result<()> {
    let mut source = File::open(from)?;
    let mut dest = OpenOptions::new().write(true).create_new(true).open(to)?;
    io::copy(&mut source, &mut dest)?;
    dest.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{JsonCodec, RawCodec, RawNotification};
    use crate::io::writer::AtomicWriter;
    use crate::sink::SinkError;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tracing_test::traced_test;

    /// Sink that records payload text and fails for payloads listed in `fail_on`
    #[derive(Default, Clone)]
    struct RecordingSink {
        received: Arc<Mutex<Vec<String>>>,
        fail_on: Vec<String>,
    }

    impl RecordingSink {
        fn failing_on(text: &str) -> Self {
            Self {
                fail_on: vec![text.to_string()],
                ..Default::default()
            }
        }

        fn received(&self) -> Vec<String> {
            self.received.lock().unwrap().clone()
        }
    }

    impl NotificationSink<RawNotification> for RecordingSink {
        fn receive(&self, notification: RawNotification) -> Result<(), SinkError> {
            let text = notification.to_text();
            self.received.lock().unwrap().push(text.clone());
            if self.fail_on.contains(&text) {
                return Err(SinkError::new(format!("rejected {text}")));
            }
            Ok(())
        }
    }

    fn place(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_drain_delivers_in_name_order_and_empties_directory() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        place(dir, "eids_1739284800300_0.xml", "third");
        place(dir, "eids_1739284800100_0.xml", "first");
        place(dir, "eids_1739284800200_1.xml", "second-b");
        place(dir, "eids_1739284800200_0.xml", "second-a");

        let sink = RecordingSink::default();
        let drainer = Drainer::new("reader", &QueueConfig::new(dir), RawCodec, sink.clone());

        assert_eq!(drainer.drain_once().unwrap(), 4);
        assert_eq!(sink.received(), vec!["first", "second-a", "second-b", "third"]);
        assert!(file_names(dir).is_empty());
        assert_eq!(drainer.file_count(), 4);
    }

    #[test]
    #[traced_test]
    fn test_drain_start_reports_oldest_queued_time() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        place(dir, "eids_1739284800500_0.xml", "later");
        place(dir, "eids_1739284800000_0.xml", "oldest");

        let drainer = Drainer::new("reader", &QueueConfig::new(dir), RawCodec, RecordingSink::default());

        assert_eq!(drainer.drain_once().unwrap(), 2);
        assert!(logs_contain("drain started (2 file(s), oldest queued 2025-02-11 14:40:00 UTC)"));
    }

    #[test]
    fn test_drain_archives_when_processed_dir_configured() {
        let temp_dir = TempDir::new().unwrap();
        let queue = temp_dir.path().join("queue");
        let done = temp_dir.path().join("done");
        let config = QueueConfig::new(&queue).with_processed_dir(&done);
        config.prepare().unwrap();
        place(&queue, "eids_1_0.xml", "a");
        place(&queue, "eids_2_0.xml", "b");

        let drainer = Drainer::new("reader", &config, RawCodec, RecordingSink::default());
        assert_eq!(drainer.drain_once().unwrap(), 2);

        assert!(file_names(&queue).is_empty());
        assert_eq!(file_names(&done), vec!["eids_1_0.xml", "eids_2_0.xml"]);
        assert_eq!(fs::read_to_string(done.join("eids_1_0.xml")).unwrap(), "a");
    }

    #[test]
    #[traced_test]
    fn test_sink_failure_still_removes_file() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        place(dir, "eids_100_0.xml", "A");
        place(dir, "eids_200_0.xml", "B");

        let sink = RecordingSink::failing_on("A");
        let drainer = Drainer::new("reader", &QueueConfig::new(dir), RawCodec, sink.clone());

        assert_eq!(drainer.drain_once().unwrap(), 2);
        assert_eq!(sink.received(), vec!["A", "B"]);
        assert!(file_names(dir).is_empty());
        assert!(logs_contain("Error processing notification"));

        // a second pass finds nothing to redeliver
        assert_eq!(drainer.drain_once().unwrap(), 0);
        assert_eq!(sink.received().len(), 2);
    }

    #[test]
    #[traced_test]
    fn test_undecodable_file_is_quarantined() {
        let temp_dir = TempDir::new().unwrap();
        let queue = temp_dir.path().join("queue");
        let done = temp_dir.path().join("done");
        let failed = temp_dir.path().join("failed");
        let config = QueueConfig::new(&queue)
            .with_processed_dir(&done)
            .with_failed_dir(&failed);
        config.prepare().unwrap();
        place(&queue, "eids_1_0.xml", "[1,2]");
        place(&queue, "eids_2_0.xml", "not json");

        let received = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&received);
        let sink = move |n: Vec<u32>| {
            recorded.lock().unwrap().push(n);
            Ok::<(), SinkError>(())
        };
        let drainer = Drainer::new("reader", &config, JsonCodec::<Vec<u32>>::new(), sink);

        assert_eq!(drainer.drain_once().unwrap(), 2);
        assert_eq!(*received.lock().unwrap(), vec![vec![1, 2]]);
        assert_eq!(file_names(&done), vec!["eids_1_0.xml"]);
        assert_eq!(file_names(&failed), vec!["eids_2_0.xml"]);
        assert!(logs_contain("could not decode notification"));
    }

    #[test]
    fn test_undecodable_file_without_quarantine_is_archived() {
        let temp_dir = TempDir::new().unwrap();
        let queue = temp_dir.path().join("queue");
        let done = temp_dir.path().join("done");
        let config = QueueConfig::new(&queue).with_processed_dir(&done);
        config.prepare().unwrap();
        place(&queue, "eids_1_0.xml", "not json");

        let sink = |_: Vec<u32>| -> Result<(), SinkError> { panic!("sink must not be called") };
        let drainer = Drainer::new("reader", &config, JsonCodec::<Vec<u32>>::new(), sink);

        assert_eq!(drainer.drain_once().unwrap(), 1);
        assert_eq!(file_names(&done), vec!["eids_1_0.xml"]);
    }

    #[test]
    fn test_ineligible_files_are_left_alone() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        place(dir, "other_1_0.xml", "x");
        place(dir, "eids_1_0.json", "x");
        place(dir, ".eids_1_abc.tmp", "x");
        fs::create_dir(dir.join("eids_dir.xml")).unwrap();

        let sink = RecordingSink::default();
        let drainer = Drainer::new("reader", &QueueConfig::new(dir), RawCodec, sink.clone());

        assert_eq!(drainer.drain_once().unwrap(), 0);
        assert!(sink.received().is_empty());
        assert_eq!(file_names(dir).len(), 4);
    }

    #[test]
    fn test_custom_prefix_and_extension() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        place(dir, "pdl_1_0.msg", "yes");
        place(dir, "eids_1_0.xml", "no");

        let config = QueueConfig::new(dir).with_prefix("pdl_").with_extension(".msg");
        let sink = RecordingSink::default();
        let drainer = Drainer::new("reader", &config, RawCodec, sink.clone());

        assert_eq!(drainer.drain_once().unwrap(), 1);
        assert_eq!(sink.received(), vec!["yes"]);
        assert_eq!(file_names(dir), vec!["eids_1_0.xml"]);
    }

    #[test]
    fn test_vanished_file_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let sink = RecordingSink::default();
        let drainer = Drainer::new(
            "reader",
            &QueueConfig::new(temp_dir.path()),
            RawCodec,
            sink.clone(),
        );

        let processed = drainer
            .process_file(&temp_dir.path().join("eids_1_0.xml"))
            .unwrap();
        assert!(!processed);
        assert!(sink.received().is_empty());
        assert_eq!(drainer.file_count(), 0);
    }

    #[test]
    #[traced_test]
    fn test_move_failure_is_fatal_and_keeps_file() {
        let temp_dir = TempDir::new().unwrap();
        let queue = temp_dir.path().join("queue");
        let done = temp_dir.path().join("done");
        let config = QueueConfig::new(&queue).with_processed_dir(&done);
        config.prepare().unwrap();
        fs::remove_dir(&done).unwrap();
        let path = place(&queue, "eids_1_0.xml", "C");
        place(&queue, "eids_2_0.xml", "D");

        let sink = RecordingSink::default();
        let drainer = Drainer::new("reader", &config, RawCodec, sink.clone());

        let err = drainer.drain_once().unwrap_err();
        assert!(matches!(err, DrainError::Fatal { path: ref p, .. } if *p == path));
        assert_eq!(sink.received(), vec!["C"]);
        assert!(path.exists());
        assert!(logs_contain("could not move file"));
    }

    #[test]
    #[traced_test]
    fn test_archive_name_collision_keeps_both_copies() {
        let temp_dir = TempDir::new().unwrap();
        let queue = temp_dir.path().join("queue");
        let done = temp_dir.path().join("done");
        let config = QueueConfig::new(&queue).with_processed_dir(&done);
        config.prepare().unwrap();
        let archived = place(&done, "eids_1_0.xml", "previously archived");
        let path = place(&queue, "eids_1_0.xml", "new");

        let sink = RecordingSink::default();
        let drainer = Drainer::new("reader", &config, RawCodec, sink.clone());

        let err = drainer.drain_once().unwrap_err();
        match err {
            DrainError::Fatal { path: ref p, ref source } => {
                assert_eq!(*p, path);
                assert_eq!(source.kind(), ErrorKind::AlreadyExists);
            }
            other => panic!("expected a fatal move error, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(&archived).unwrap(), "previously archived");
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert!(logs_contain("could not move file"));
    }

    #[test]
    fn test_quarantine_name_collision_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let queue = temp_dir.path().join("queue");
        let failed = temp_dir.path().join("failed");
        let config = QueueConfig::new(&queue).with_failed_dir(&failed);
        config.prepare().unwrap();
        place(&failed, "eids_1_0.xml", "old garbage");
        place(&queue, "eids_1_0.xml", "new garbage");

        let sink = |_: Vec<u32>| -> Result<(), SinkError> { panic!("sink must not be called") };
        let drainer = Drainer::new("reader", &config, JsonCodec::<Vec<u32>>::new(), sink);

        assert!(matches!(drainer.drain_once(), Err(DrainError::Fatal { .. })));
        assert_eq!(
            fs::read_to_string(failed.join("eids_1_0.xml")).unwrap(),
            "old garbage"
        );
        assert_eq!(file_names(&queue), vec!["eids_1_0.xml"]);
    }

    #[test]
    fn test_move_file_copies_into_fresh_name_only() {
        let temp_dir = TempDir::new().unwrap();
        let from = place(temp_dir.path(), "a.xml", "payload");
        let to = temp_dir.path().join("b.xml");

        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "payload");

        let again = place(temp_dir.path(), "a.xml", "second");
        let err = copy_new(&again, &to).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&to).unwrap(), "payload");
    }

    #[test]
    fn test_missing_directory_is_a_list_error() {
        let temp_dir = TempDir::new().unwrap();
        let drainer = Drainer::new(
            "reader",
            &QueueConfig::new(temp_dir.path().join("missing")),
            RawCodec,
            RecordingSink::default(),
        );
        assert!(matches!(drainer.drain_once(), Err(DrainError::List { .. })));
    }

    #[test]
    fn test_drain_picks_up_files_written_during_the_pass() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        let config = QueueConfig::new(&dir);
        place(&dir, "eids_1_0.xml", "seed");

        let writer = AtomicWriter::new("writer", &config);
        let received = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&received);
        let sink = move |n: RawNotification| {
            let text = n.to_text();
            if text == "seed" {
                writer.write(b"follow-up");
            }
            recorded.lock().unwrap().push(text);
            Ok::<(), SinkError>(())
        };
        let drainer = Drainer::new("reader", &config, RawCodec, sink);

        assert_eq!(drainer.drain_once().unwrap(), 2);
        assert_eq!(*received.lock().unwrap(), vec!["seed", "follow-up"]);
        assert!(file_names(&dir).is_empty());
    }

    #[test]
    fn test_cancelled_drain_stops_between_files() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        place(dir, "eids_1_0.xml", "a");
        place(dir, "eids_2_0.xml", "b");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let sink = move |_: RawNotification| {
            trigger.cancel();
            Ok::<(), SinkError>(())
        };
        let drainer = Drainer::new("reader", &QueueConfig::new(dir), RawCodec, sink);

        assert_eq!(drainer.drain(&cancel).unwrap(), 1);
        assert_eq!(file_names(dir), vec!["eids_2_0.xml"]);
    }

    #[test]
    fn test_empty_file_reaches_raw_sink() {
        let temp_dir = TempDir::new().unwrap();
        place(temp_dir.path(), "eids_1_0.xml", "");
        let sink = RecordingSink::default();
        let drainer = Drainer::new(
            "reader",
            &QueueConfig::new(temp_dir.path()),
            RawCodec,
            sink.clone(),
        );
        assert_eq!(drainer.drain_once().unwrap(), 1);
        assert_eq!(sink.received(), vec![""]);
    }
}
