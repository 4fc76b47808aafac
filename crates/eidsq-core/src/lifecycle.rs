//! Startup/shutdown hooks exposed to the owning process

use crate::io::error::QueueError;
use thiserror::Error;

/// Errors raised while starting a queue component
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// The queue directories could not be prepared
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The watcher was started outside a tokio runtime
    #[error("No tokio runtime available to spawn the watcher worker")]
    NoRuntime,
}

/// Process lifecycle hooks
///
/// Both operations are idempotent and may be called in any order; calling
/// `shutdown()` on a component that was never started is a no-op.
pub trait Lifecycle {
    fn startup(&self) -> Result<(), LifecycleError>;

    /// Signal the component to stop. Errors are logged, never returned.
    fn shutdown(&self);
}
