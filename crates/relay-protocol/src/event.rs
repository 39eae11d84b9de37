//! Outbound server events.
//!
//! Server notices share the `{type, action, data}` shape. They always carry a
//! `type` key and never a top-level `data` string, so clients can tell them
//! apart from relayed chat envelopes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::codec::{self, ProtocolError};

/// Event type used for notices generated by the router itself.
pub const SYSTEM_EVENT_TYPE: &str = "system";

/// Welcome action, sent privately to a new connection.
pub const ACTION_WELCOME: &str = "welcome";

/// Arrival action, broadcast when a new user connects.
pub const ACTION_ARRIVAL: &str = "arrival";

/// A structured server-to-client event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketEvent {
    /// Event category.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event action within the category.
    pub action: String,
    /// Event payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl SocketEvent {
    /// Create a new event.
    #[must_use]
    pub fn new(kind: impl Into<String>, action: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            action: action.into(),
            data,
        }
    }

    /// Private greeting for a freshly connected user.
    #[must_use]
    pub fn welcome(user_id: &str, connection_id: &str) -> Self {
        Self::new(
            SYSTEM_EVENT_TYPE,
            ACTION_WELCOME,
            json!({
                "user_id": user_id,
                "connection_id": connection_id,
                "message": format!("Welcome! You are {user_id} (connection {connection_id})"),
            }),
        )
    }

    /// Announcement that a new user has connected.
    #[must_use]
    pub fn arrival(user_id: &str) -> Self {
        Self::new(
            SYSTEM_EVENT_TYPE,
            ACTION_ARRIVAL,
            json!({
                "user_id": user_id,
                "message": format!("New user connected: {user_id}"),
            }),
        )
    }

    /// Whether this event was generated by the router.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.kind == SYSTEM_EVENT_TYPE
    }

    /// Human-readable message, if the payload carries one.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.data.get("message").and_then(|m| m.as_str())
    }

    /// Encode the event as a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_bytes(&self) -> Result<Bytes, ProtocolError> {
        codec::encode(self)
    }

    /// Try to interpret a payload as a server event.
    ///
    /// Returns `None` for anything that is not a `{type, action, data}` object
    /// with an object `data`. Chat envelopes always carry a string `data`, so
    /// a relayed envelope is never taken for a notice even when the sender
    /// added `type` and `action` keys.
    #[must_use]
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        codec::decode::<Self>(data)
            .ok()
            .filter(|event| event.data.is_object())
    }
}
