//! Broadcast record types.
//!
//! `BroadcastRequest` is what a client may send; `Broadcast` is what gets
//! stored. The record's `account` and `timestamp` only ever come from the
//! server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind name used when building record keys.
pub const BROADCAST_KIND: &str = "Broadcast";

/// Inbound submission payload.
///
/// Missing fields default to empty values. Any `account` or `timestamp`
/// supplied by the client is not part of this type and is dropped.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    #[serde(default)]
    pub geo_location: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub sender: Option<String>,
}

/// A persisted broadcast. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Broadcast {
    /// Free-form location token, e.g. "40.0,-70.0"
    pub geo_location: String,
    /// Message text
    pub body: String,
    /// Recipient addresses in submission order
    pub recipients: Vec<String>,
    /// Authenticated submitter
    pub account: String,
    /// Optional display name for the From header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Server-assigned creation time
    pub timestamp: DateTime<Utc>,
}

impl Broadcast {
    /// Build a record from a client request, stamping the server-side fields.
    pub fn from_request(
        request: BroadcastRequest,
        account: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            geo_location: request.geo_location,
            body: request.body,
            recipients: request.recipients,
            account: account.into(),
            sender: request.sender,
            timestamp,
        }
    }

    /// Name shown as the sender: the explicit sender, or the account.
    pub fn display_sender(&self) -> &str {
        self.sender
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(self.account.as_str())
    }
}
