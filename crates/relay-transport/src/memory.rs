//! In-process transport.
//!
//! `MemoryTransport` keeps every delivered payload in a per-connection outbox
//! instead of writing to a socket. Tests and benches drive the event hooks
//! themselves and then inspect what each connection received.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use std::collections::HashMap;
use tracing::trace;

use crate::traits::{ConnectionId, ConnectionState, Transport, TransportError};

#[derive(Debug)]
struct MemoryConnection {
    state: ConnectionState,
    attributes: HashMap<String, String>,
    outbox: Vec<Bytes>,
}

impl MemoryConnection {
    fn new() -> Self {
        Self {
            state: ConnectionState::Connected,
            attributes: HashMap::new(),
            outbox: Vec::new(),
        }
    }
}

/// A transport whose connections live in memory.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    connections: DashMap<ConnectionId, MemoryConnection>,
    failing: DashSet<ConnectionId>,
}

impl MemoryTransport {
    /// Create an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new connection with a generated ID.
    pub fn open(&self) -> ConnectionId {
        let id = ConnectionId::generate();
        self.open_with_id(id.clone());
        id
    }

    /// Open a connection with a caller-chosen ID.
    pub fn open_with_id(&self, id: ConnectionId) {
        self.connections.insert(id, MemoryConnection::new());
    }

    /// Mark a connection as ended by the peer.
    ///
    /// The connection's attributes stay readable until `remove` is called,
    /// matching the order in which a real transport runs its terminal hooks.
    pub fn disconnect(&self, id: &ConnectionId) {
        if let Some(mut conn) = self.connections.get_mut(id) {
            conn.state = ConnectionState::Disconnected;
        }
    }

    /// Drop a connection entirely.
    pub fn remove(&self, id: &ConnectionId) {
        self.connections.remove(id);
        self.failing.remove(id);
    }

    /// Make every subsequent send to `id` fail.
    pub fn fail_sends_to(&self, id: &ConnectionId) {
        self.failing.insert(id.clone());
    }

    /// Current state of a connection.
    #[must_use]
    pub fn state(&self, id: &ConnectionId) -> Option<ConnectionState> {
        self.connections.get(id).map(|c| c.state)
    }

    /// Payloads delivered to a connection, oldest first.
    #[must_use]
    pub fn sent(&self, id: &ConnectionId) -> Vec<Bytes> {
        self.connections
            .get(id)
            .map(|c| c.outbox.clone())
            .unwrap_or_default()
    }

    /// Number of payloads delivered to a connection.
    #[must_use]
    pub fn sent_count(&self, id: &ConnectionId) -> usize {
        self.connections
            .get(id)
            .map(|c| c.outbox.len())
            .unwrap_or(0)
    }

    /// Number of payloads delivered across all connections.
    #[must_use]
    pub fn total_sent(&self) -> usize {
        self.connections.iter().map(|c| c.outbox.len()).sum()
    }

    /// Forget every delivered payload.
    pub fn clear_sent(&self) {
        for mut conn in self.connections.iter_mut() {
            conn.outbox.clear();
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn send(&self, id: &ConnectionId, payload: Bytes) -> Result<(), TransportError> {
        if self.failing.contains(id) {
            return Err(TransportError::SendFailed(format!("injected failure for {id}")));
        }

        std::str::from_utf8(&payload)
            .map_err(|_| TransportError::SendFailed("payload is not valid UTF-8".into()))?;

        let mut conn = self
            .connections
            .get_mut(id)
            .filter(|c| c.state.is_open())
            .ok_or_else(|| TransportError::ConnectionClosed(id.clone()))?;

        trace!(connection = %id, bytes = payload.len(), "Memory send");
        conn.outbox.push(payload);
        Ok(())
    }

    async fn broadcast_all(&self, payload: Bytes, exclude: Option<&ConnectionId>) -> usize {
        let mut delivered = 0;
        for id in self.connection_ids() {
            if exclude == Some(&id) {
                continue;
            }
            if self.send(&id, payload.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    async fn close(&self, id: &ConnectionId) -> Result<(), TransportError> {
        let mut conn = self
            .connections
            .get_mut(id)
            .ok_or_else(|| TransportError::ConnectionClosed(id.clone()))?;
        conn.state = ConnectionState::Closed;
        Ok(())
    }

    fn set_attribute(
        &self,
        id: &ConnectionId,
        key: &str,
        value: String,
    ) -> Result<(), TransportError> {
        let mut conn = self
            .connections
            .get_mut(id)
            .ok_or_else(|| TransportError::ConnectionClosed(id.clone()))?;
        conn.attributes.insert(key.to_string(), value);
        Ok(())
    }

    fn get_attribute(&self, id: &ConnectionId, key: &str) -> Option<String> {
        self.connections
            .get(id)
            .and_then(|c| c.attributes.get(key).cloned())
    }

    fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|c| c.state.is_open())
            .map(|c| c.key().clone())
            .collect()
    }
}
