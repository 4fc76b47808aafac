//! Notification document schema

pub mod notification;

pub use notification::{ProductId, UrlNotification};
