//! Transport abstraction traits for Relay.
//!
//! These traits define the boundary between the router and whatever carries
//! bytes to clients, allowing the router to be transport-agnostic.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Counter appended to generated IDs so two connections accepted within the
/// same nanosecond still get distinct handles.
static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Opaque handle for a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let counter = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of a connection.
///
/// ```text
/// Connecting ──▶ Connected ──┬──▶ Disconnected  (peer hung up)
///                            ├──▶ Closed        (server called close)
///                            └──▶ Errored       (read/write failure)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Accepted, hooks not yet run.
    Connecting,
    /// Live and announced.
    Connected,
    /// Server asked to close; waiting for the socket to wind down.
    Closing,
    /// Peer-initiated termination.
    Disconnected,
    /// Server-initiated termination.
    Closed,
    /// Terminated by a transport error.
    Errored,
}

impl ConnectionState {
    /// Whether no further events will be delivered for this connection.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Closed | Self::Errored)
    }

    /// Whether the connection can still carry outbound frames.
    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Disconnected => "disconnected",
            Self::Closed => "closed",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed or never existed.
    #[error("Connection closed: {0}")]
    ConnectionClosed(ConnectionId),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Operations the router may perform on connections.
///
/// Payloads are always delivered as text frames; implementations must reject
/// payloads that are not valid UTF-8.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Get the transport name (e.g., "websocket", "memory").
    fn name(&self) -> &'static str;

    /// Send a text frame to one connection.
    async fn send(&self, id: &ConnectionId, payload: Bytes) -> Result<(), TransportError>;

    /// Send a text frame to every live connection, optionally skipping one.
    ///
    /// Individual failures are swallowed. Returns the number of connections
    /// the payload was handed to.
    async fn broadcast_all(&self, payload: Bytes, exclude: Option<&ConnectionId>) -> usize;

    /// Close a connection from the server side.
    async fn close(&self, id: &ConnectionId) -> Result<(), TransportError>;

    /// Store a connection-local attribute.
    fn set_attribute(
        &self,
        id: &ConnectionId,
        key: &str,
        value: String,
    ) -> Result<(), TransportError>;

    /// Read a connection-local attribute.
    fn get_attribute(&self, id: &ConnectionId, key: &str) -> Option<String>;

    /// IDs of all live connections.
    fn connection_ids(&self) -> Vec<ConnectionId>;

    /// Number of live connections.
    fn connection_count(&self) -> usize {
        self.connection_ids().len()
    }

    /// Check if the transport is healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Subscriber to connection lifecycle and message events.
///
/// Every hook has a no-op default so a handler only implements the events it
/// cares about. Hooks receive the transport that raised the event, so a
/// handler never needs to own it.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// A new connection is live.
    async fn on_connect(&self, _transport: &dyn Transport, _id: &ConnectionId) {}

    /// A payload arrived on an established connection.
    async fn on_message(&self, _transport: &dyn Transport, _id: &ConnectionId, _payload: Bytes) {}

    /// The peer ended the connection.
    async fn on_disconnect(&self, _transport: &dyn Transport, _id: &ConnectionId) {}

    /// The server ended the connection via `Transport::close`.
    async fn on_close(&self, _transport: &dyn Transport, _id: &ConnectionId) {}

    /// The connection failed. No further events follow for this ID.
    async fn on_error(
        &self,
        _transport: &dyn Transport,
        _id: &ConnectionId,
        _error: &TransportError,
    ) {
    }
}
