//! Core types for eidsq, a filesystem-mediated notification queue
//!
//! A producer writes each notification to a uniquely named file in a shared
//! directory; a consumer drains that directory in name order and deletes or
//! archives every file it has handled. The directory is the only channel
//! between the two sides:
//!
//! ```text
//! NotificationSource → NotificationWriter → shared dir ← DirectoryWatcher/Drainer → NotificationSink
//! ```
//!
//! Coordination relies only on filesystem primitives:
//! - **Atomic publish**: payloads are written to a temporary file in the
//!   shared directory, synced, and renamed into place without clobbering
//! - **Deterministic order**: names embed epoch milliseconds and a numeric
//!   disambiguator, so sorting the listing yields arrival order
//! - **Single consumer**: one background worker per watcher drains, then waits
//!   on filesystem change events until cancelled

pub mod codec;
pub mod config;
pub mod io;
pub mod lifecycle;
pub mod logging;
pub mod schema;
pub mod sink;
pub mod watcher;

pub use codec::{JsonCodec, NotificationCodec, RawCodec, RawNotification};
pub use config::{QueueConfig, resolve_config, ConfigError, ConfigOverrides};
pub use io::{Drainer, NotificationFile, NotificationWriter, WriteOutcome};
pub use lifecycle::Lifecycle;
pub use schema::UrlNotification;
pub use sink::{NotificationSink, NotificationSource, SinkError};
pub use watcher::{DirectoryWatcher, WatcherStatus};
