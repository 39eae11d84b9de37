//! # relay-protocol
//!
//! Wire formats for the Relay message router.
//!
//! Relay speaks JSON over WebSocket text frames. Two shapes cross the wire:
//!
//! - `Envelope` - inbound chat messages, addressed to one user or a room
//! - `SocketEvent` - outbound server notices (welcome, arrival, pushes)
//!
//! ## Example
//!
//! ```rust
//! use relay_protocol::{Envelope, Target};
//!
//! let raw = br#"{"from":"aB3dE6gH","room":"lobby","data":"hello"}"#;
//! let envelope = Envelope::parse(raw).unwrap();
//!
//! assert_eq!(envelope.target(), Target::Room("lobby"));
//! ```

pub mod codec;
pub mod envelope;
pub mod event;

pub use codec::{decode, decode_with_limit, encode, ProtocolError, MAX_PAYLOAD_SIZE};
pub use envelope::{Envelope, Target};
pub use event::{SocketEvent, SYSTEM_EVENT_TYPE};
