//! Inbound message envelope.
//!
//! Clients send chat messages as JSON objects:
//!
//! ```text
//! { "from": "<id>", "to": "<id>", "room": "<room>", "data": "<text>" }
//! ```
//!
//! `to` and `room` are optional and an empty string is treated the same as
//! an absent field. When both are present the room wins.

use serde::{Deserialize, Serialize};

use crate::codec::{self, ProtocolError};

/// A parsed chat message.
///
/// Unknown fields are ignored. Missing `from` or `data` decode as empty
/// strings; only malformed JSON or wrongly typed fields fail to parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Claimed sender identity.
    #[serde(default)]
    pub from: String,
    /// Recipient identity for addressed delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Room for room delivery. Takes precedence over `to`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Message body.
    #[serde(default)]
    pub data: String,
}

/// Where an envelope should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<'a> {
    /// Every member of the named room.
    Room(&'a str),
    /// A single user identity.
    User(&'a str),
    /// Neither `room` nor `to` was set.
    Nobody,
}

impl Envelope {
    /// Parse an envelope from a raw payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not a JSON object with string fields.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        codec::decode(data)
    }

    /// Parse an envelope no larger than `max` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is too large or is not a JSON object
    /// with string fields.
    pub fn parse_with_limit(data: &[u8], max: usize) -> Result<Self, ProtocolError> {
        codec::decode_with_limit(data, max)
    }

    /// Create an addressed envelope.
    #[must_use]
    pub fn direct(from: impl Into<String>, to: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: Some(to.into()),
            room: None,
            data: data.into(),
        }
    }

    /// Create a room envelope.
    #[must_use]
    pub fn room(from: impl Into<String>, room: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: None,
            room: Some(room.into()),
            data: data.into(),
        }
    }

    /// Resolve the delivery target.
    #[must_use]
    pub fn target(&self) -> Target<'_> {
        if let Some(room) = non_empty(&self.room) {
            Target::Room(room)
        } else if let Some(to) = non_empty(&self.to) {
            Target::User(to)
        } else {
            Target::Nobody
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direct() {
        let env = Envelope::parse(br#"{"from":"A","to":"B","data":"hi"}"#).unwrap();
        assert_eq!(env.from, "A");
        assert_eq!(env.target(), Target::User("B"));
        assert_eq!(env.data, "hi");
    }

    #[test]
    fn test_room_takes_precedence() {
        let env = Envelope::parse(br#"{"from":"A","to":"B","room":"R","data":"hi"}"#).unwrap();
        assert_eq!(env.target(), Target::Room("R"));
    }

    #[test]
    fn test_empty_room_falls_back_to_user() {
        let env = Envelope::parse(br#"{"from":"A","to":"B","room":"","data":"hi"}"#).unwrap();
        assert_eq!(env.target(), Target::User("B"));
    }

    #[test]
    fn test_no_target() {
        let env = Envelope::parse(br#"{"from":"A","to":"","data":"hi"}"#).unwrap();
        assert_eq!(env.target(), Target::Nobody);

        let env = Envelope::parse(br#"{"data":"hi"}"#).unwrap();
        assert_eq!(env.target(), Target::Nobody);
        assert!(env.from.is_empty());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let env = Envelope::parse(br#"{"from":"A","to":"B","data":"hi","extra":42}"#).unwrap();
        assert_eq!(env.target(), Target::User("B"));
    }

    #[test]
    fn test_null_fields_are_absent() {
        let env = Envelope::parse(br#"{"from":"A","to":null,"room":null,"data":"x"}"#).unwrap();
        assert_eq!(env.target(), Target::Nobody);
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(Envelope::parse(b"hello there").is_err());
        assert!(Envelope::parse(b"\"just a string\"").is_err());
        assert!(Envelope::parse(b"[1,2,3]").is_err());
        assert!(Envelope::parse(br#"{"to":5,"data":"x"}"#).is_err());
        assert!(Envelope::parse(b"").is_err());
    }

    #[test]
    fn test_builders() {
        let env = Envelope::direct("A", "B", "hi");
        assert_eq!(env.target(), Target::User("B"));

        let env = Envelope::room("A", "lobby", "hi");
        assert_eq!(env.target(), Target::Room("lobby"));
    }
}
