//! Notification file naming
//!
//! Files are named `<prefix><epoch-millis>_<disambiguator><extension>`, e.g.
//! `eids_1739284800000_0.xml`. The timestamp makes names sort in arrival
//! order; the disambiguator separates files created within the same
//! millisecond and is capped at [`MAX_DISAMBIGUATOR`] candidates.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Number of disambiguators tried before a name is considered unavailable
pub const MAX_DISAMBIGUATOR: u32 = 1000;

/// Time source for base names
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> i64;
}

/// Wall clock backed by [`chrono::Utc`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Combine the prefix with the current time in epoch milliseconds
pub fn base_name(prefix: &str, clock: &dyn Clock) -> String {
    format!("{prefix}{}", clock.now_millis())
}

/// Candidate destination paths for `base_name`, in disambiguator order
///
/// Yields exactly [`MAX_DISAMBIGUATOR`] paths: `<base>_0<ext>`, `<base>_1<ext>`, ...
pub fn candidates<'a>(
    directory: &'a Path,
    base_name: &'a str,
    extension: &'a str,
) -> impl Iterator<Item = PathBuf> + 'a {
    (0..MAX_DISAMBIGUATOR).map(move |i| directory.join(format!("{base_name}_{i}{extension}")))
}

/// Find the first candidate path that does not exist yet
///
/// Returns `None` when all [`MAX_DISAMBIGUATOR`] candidates are taken. This
/// only probes; the writer reserves names with an exclusive rename instead.
pub fn unique_file(directory: &Path, base_name: &str, extension: &str) -> Option<PathBuf> {
    candidates(directory, base_name, extension).find(|path| !path.exists())
}

/// An eligible file in the shared directory
///
/// Ordering follows the name, except that the numeric disambiguator is
/// compared as a number so `_10` sorts after `_9` within one millisecond.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFile {
    path: PathBuf,
    name: String,
    /// Name up to the disambiguator separator, or the full name if the
    /// file does not follow the convention
    base: String,
    timestamp_millis: Option<i64>,
    disambiguator: Option<u32>,
}

impl NotificationFile {
    /// Parse a path whose file name starts with `prefix` and ends with `extension`
    ///
    /// Returns `None` for ineligible names (wrong prefix/extension, non-UTF-8).
    /// Eligible names that do not carry a timestamp and disambiguator are still
    /// returned; their accessors report `None`.
    pub fn parse(path: &Path, prefix: &str, extension: &str) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_prefix(prefix)?.strip_suffix(extension)?;

        let parsed = stem.rsplit_once('_').and_then(|(millis, index)| {
            let millis = millis.parse::<i64>().ok()?;
            let index = index.parse::<u32>().ok()?;
            Some((millis, index))
        });

        let (base, timestamp_millis, disambiguator) = match parsed {
            Some((millis, index)) => {
                let base_len = prefix.len() + stem.rfind('_').unwrap_or(stem.len());
                (name[..base_len].to_string(), Some(millis), Some(index))
            }
            None => (name.to_string(), None, None),
        };

        Some(Self {
            path: path.to_path_buf(),
            name: name.to_string(),
            base,
            timestamp_millis,
            disambiguator,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.name
    }

    pub fn timestamp_millis(&self) -> Option<i64> {
        self.timestamp_millis
    }

    pub fn disambiguator(&self) -> Option<u32> {
        self.disambiguator
    }

    /// Creation time encoded in the name
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp_millis().and_then(DateTime::from_timestamp_millis)
    }
}

impl Ord for NotificationFile {
    fn cmp(&self, other: &Self) -> Ordering {
        self.base
            .cmp(&other.base)
            .then_with(|| {
                self.disambiguator
                    .unwrap_or(0)
                    .cmp(&other.disambiguator.unwrap_or(0))
            })
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for NotificationFile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
