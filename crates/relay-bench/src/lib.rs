//! Shared fixtures for the Relay benchmarks.
//!
//! `CountingTransport` accepts every send and only counts it, so benchmark
//! numbers reflect routing work rather than buffering.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use relay_core::{Router, USER_ID_ATTRIBUTE};
use relay_transport::{ConnectionId, Transport, TransportError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Transport that discards payloads and counts deliveries.
#[derive(Default)]
pub struct CountingTransport {
    connections: DashMap<ConnectionId, HashMap<String, String>>,
    sent: AtomicU64,
}

impl CountingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection with a fixed ID.
    pub fn open(&self, id: impl Into<ConnectionId>) -> ConnectionId {
        let id = id.into();
        self.connections.insert(id.clone(), HashMap::new());
        id
    }

    /// Total payloads accepted so far.
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for CountingTransport {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn send(&self, id: &ConnectionId, _payload: Bytes) -> Result<(), TransportError> {
        if !self.connections.contains_key(id) {
            return Err(TransportError::ConnectionClosed(id.clone()));
        }
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn broadcast_all(&self, _payload: Bytes, exclude: Option<&ConnectionId>) -> usize {
        let count = self
            .connections
            .iter()
            .filter(|c| Some(c.key()) != exclude)
            .count();
        self.sent.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    async fn close(&self, id: &ConnectionId) -> Result<(), TransportError> {
        self.connections
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| TransportError::ConnectionClosed(id.clone()))
    }

    fn set_attribute(
        &self,
        id: &ConnectionId,
        key: &str,
        value: String,
    ) -> Result<(), TransportError> {
        let mut attrs = self
            .connections
            .get_mut(id)
            .ok_or_else(|| TransportError::ConnectionClosed(id.clone()))?;
        attrs.insert(key.to_string(), value);
        Ok(())
    }

    fn get_attribute(&self, id: &ConnectionId, key: &str) -> Option<String> {
        self.connections.get(id).and_then(|a| a.get(key).cloned())
    }

    fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|c| c.key().clone()).collect()
    }
}

/// Register `n` users with deterministic identities and open connections.
///
/// Returns the identities in creation order.
pub fn populate(router: &Router, transport: &CountingTransport, n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let identity = format!("u{i:07}");
            let conn = transport.open(format!("conn-{i}"));
            let _ = transport.set_attribute(&conn, USER_ID_ATTRIBUTE, identity.clone());
            router.identities().register(identity.clone(), conn);
            identity
        })
        .collect()
}
