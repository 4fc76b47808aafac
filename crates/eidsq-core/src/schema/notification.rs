//! URL notification document
//!
//! A notification announces that a product is available at a URL. The queue
//! does not interpret it; this model exists for producers and sinks that use
//! [`JsonCodec`](crate::codec::JsonCodec) as their payload format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identity of a distributed product
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductId {
    /// Network that produced the product (e.g. "us")
    pub source: String,

    /// Product type (e.g. "origin")
    #[serde(rename = "type")]
    pub product_type: String,

    /// Source-specific product code
    pub code: String,

    /// Version of the product
    pub update_time: DateTime<Utc>,
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "urn:usgs-product:{}:{}:{}:{}",
            self.source,
            self.product_type,
            self.code,
            self.update_time.timestamp_millis()
        )
    }
}

/// Notification that a product can be fetched from `product_url`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlNotification {
    pub id: ProductId,

    /// After this time the notification should be ignored
    pub expiration_date: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none", rename = "trackerURL")]
    pub tracker_url: Option<String>,

    #[serde(rename = "productURL")]
    pub product_url: String,

    /// Unknown fields for forward compatibility
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

impl UrlNotification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date <= now
    }
}
