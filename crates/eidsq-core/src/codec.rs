//! Notification encoding
//!
//! The queue moves opaque bytes. A [`NotificationCodec`] turns the logical
//! document into those bytes on the producer side and back on the consumer
//! side. An empty encoding is always an encode failure: the writer never
//! publishes an empty file.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use thiserror::Error;

/// Errors raised while encoding or decoding a notification
#[derive(Error, Debug)]
pub enum CodecError {
    /// The encoded form was empty
    #[error("Notification encoded to an empty payload")]
    Empty,

    /// JSON (de)serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Any other codec-specific failure
    #[error("{0}")]
    Other(String),
}

/// Converts notifications to and from their on-disk payload
pub trait NotificationCodec: Send + Sync {
    /// The logical document type
    type Notification: Send;

    fn encode(&self, notification: &Self::Notification) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, payload: &[u8]) -> Result<Self::Notification, CodecError>;
}

/// An opaque payload, passed through unchanged
#[derive(Clone, PartialEq, Eq, Default)]
pub struct RawNotification(Vec<u8>);

impl RawNotification {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Payload as UTF-8 text, replacing invalid sequences
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl fmt::Debug for RawNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawNotification")
            .field("len", &self.0.len())
            .finish()
    }
}

impl From<&str> for RawNotification {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for RawNotification {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<Vec<u8>> for RawNotification {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

/// Pass-through codec for [`RawNotification`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl NotificationCodec for RawCodec {
    type Notification = RawNotification;

    fn encode(&self, notification: &RawNotification) -> Result<Vec<u8>, CodecError> {
        if notification.is_empty() {
            return Err(CodecError::Empty);
        }
        Ok(notification.as_bytes().to_vec())
    }

    fn decode(&self, payload: &[u8]) -> Result<RawNotification, CodecError> {
        Ok(RawNotification::new(payload))
    }
}

/// JSON codec for any serde document
pub struct JsonCodec<T> {
    pretty: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            pretty: false,
            _marker: PhantomData,
        }
    }

    /// Write indented JSON
    pub fn pretty() -> Self {
        Self {
            pretty: true,
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self {
            pretty: self.pretty,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec")
            .field("pretty", &self.pretty)
            .finish()
    }
}

impl<T> NotificationCodec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    type Notification = T;

    fn encode(&self, notification: &T) -> Result<Vec<u8>, CodecError> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(notification)?
        } else {
            serde_json::to_vec(notification)?
        };
        if bytes.is_empty() {
            return Err(CodecError::Empty);
        }
        Ok(bytes)
    }

    fn decode(&self, payload: &[u8]) -> Result<T, CodecError> {
        Ok(serde_json::from_slice(payload)?)
    }
}
