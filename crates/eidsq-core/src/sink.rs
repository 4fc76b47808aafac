//! Capability seams between the queue and its collaborators
//!
//! The drainer hands every decoded notification to a [`NotificationSink`];
//! producers hand notifications to a [`NotificationSource`], which the
//! [`NotificationWriter`](crate::io::NotificationWriter) implements.

use crate::io::WriteOutcome;
use thiserror::Error;

/// Failure reported by a sink
///
/// The drainer logs these and still takes the file off the queue, so a
/// failing sink never causes redelivery.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct SinkError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Receives notifications drained from the queue
pub trait NotificationSink<N>: Send + Sync {
    fn receive(&self, notification: N) -> Result<(), SinkError>;
}

impl<N, F> NotificationSink<N> for F
where
    F: Fn(N) -> Result<(), SinkError> + Send + Sync,
{
    fn receive(&self, notification: N) -> Result<(), SinkError> {
        self(notification)
    }
}

/// Accepts notifications to persist onto the queue
///
/// Always returns normally; failures are logged and reported through the
/// returned [`WriteOutcome`].
pub trait NotificationSource<N>: Send + Sync {
    fn supply_encoded(&self, notification: &N) -> WriteOutcome;
}
