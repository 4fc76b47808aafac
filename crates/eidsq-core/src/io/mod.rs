//! Queue directory I/O
//!
//! - [`naming`]: base names, disambiguators and the on-disk file convention
//! - [`writer`]: producer-side atomic publish (temp file + no-clobber rename)
//! - [`drainer`]: consumer-side list, sort, process and remove/archive
//!
//! # Example
//!
//! ```rust,no_run
//! use eidsq_core::io::{Drainer, NotificationWriter, WriteOutcome};
//! use eidsq_core::{QueueConfig, RawCodec, RawNotification, SinkError};
//!
//! let config = QueueConfig::new("/var/spool/eids");
//! config.prepare().unwrap();
//!
//! let writer = NotificationWriter::new("writer", &config, RawCodec);
//! if let WriteOutcome::Written { path } = writer.publish(&RawNotification::from("<notification/>")) {
//!     println!("queued {}", path.display());
//! }
//!
//! let drainer = Drainer::new("reader", &config, RawCodec, |n: RawNotification| {
//!     println!("received {} bytes", n.len());
//!     Ok::<(), SinkError>(())
//! });
//! let handled = drainer.drain_once().unwrap();
//! println!("handled {handled} file(s)");
//! ```

pub mod drainer;
pub mod error;
pub mod naming;
pub mod writer;

// Re-export primary API
pub use drainer::Drainer;
pub use error::{DrainError, QueueError};
pub use naming::{Clock, NotificationFile, SystemClock, MAX_DISAMBIGUATOR};
pub use writer::{AtomicWriter, DropReason, NotificationWriter, WriteOutcome};
