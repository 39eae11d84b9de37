//! Connection lifecycle handling.
//!
//! `Router` subscribes to transport events. On connect it allocates an
//! identity, stores it on the connection, announces the arrival and sends a
//! private welcome. Any terminal event (disconnect, close or error) releases
//! the identity again.

use async_trait::async_trait;
use bytes::Bytes;
use relay_protocol::SocketEvent;
use relay_transport::{ConnectionId, ConnectionState, EventHandler, Transport, TransportError};
use tracing::{debug, error, info, warn};

use crate::identity::UserId;
use crate::router::{Router, RouterError};

/// Connection attribute holding the assigned user ID.
pub const USER_ID_ATTRIBUTE: &str = "user_id";

/// Attempts at drawing an unused identity before giving up.
const MAX_IDENTITY_ATTEMPTS: usize = 16;

impl Router {
    /// Draw a fresh identity and register it for `handle`.
    ///
    /// # Errors
    ///
    /// Returns an error if every attempt collided with a live identity.
    pub fn allocate_identity(&self, handle: &ConnectionId) -> Result<UserId, RouterError> {
        for _ in 0..MAX_IDENTITY_ATTEMPTS {
            let identity = self.generator.generate();
            if self.identities.try_register(&identity, handle) {
                return Ok(identity);
            }
            debug!(user = %identity, "Identity collision, retrying");
        }
        Err(RouterError::IdentityExhausted(MAX_IDENTITY_ATTEMPTS))
    }

    /// Release the identity attached to a terminated connection.
    ///
    /// Safe to call more than once for the same connection.
    pub fn release(&self, transport: &dyn Transport, handle: &ConnectionId, state: ConnectionState) {
        let Some(identity) = transport.get_attribute(handle, USER_ID_ATTRIBUTE) else {
            debug!(connection = %handle, state = %state, "No identity attached, nothing to release");
            return;
        };

        // A duplicate terminal event, or one for a handle whose identity now
        // belongs to another connection, must not touch that identity.
        if !self.identities.remove_if_handle(&identity, handle) {
            debug!(user = %identity, connection = %handle, "Identity not held by this connection");
            return;
        }

        if self.config.leave_rooms_on_disconnect {
            let left = self.rooms.leave_all(&identity);
            if !left.is_empty() {
                debug!(user = %identity, rooms = ?left, "Removed from rooms");
            }
        }

        info!(user = %identity, connection = %handle, state = %state, "Connection ended");
    }
}

#[async_trait]
impl EventHandler for Router {
    async fn on_connect(&self, transport: &dyn Transport, id: &ConnectionId) {
        let identity = match self.allocate_identity(id) {
            Ok(identity) => identity,
            Err(e) => {
                error!(connection = %id, error = %e, "Could not assign identity");
                let _ = transport.close(id).await;
                return;
            }
        };

        if let Err(e) = transport.set_attribute(id, USER_ID_ATTRIBUTE, identity.clone()) {
            warn!(connection = %id, error = %e, "Connection vanished during connect");
            self.identities.remove(&identity);
            return;
        }

        info!(user = %identity, connection = %id, "Connection event");

        if self.config.announce_arrivals {
            match SocketEvent::arrival(&identity).to_bytes() {
                Ok(notice) => {
                    self.broadcast(transport, notice, Some(id)).await;
                }
                Err(e) => warn!(error = %e, "Failed to encode arrival notice"),
            }
        }

        let welcome = SocketEvent::welcome(&identity, id.as_str());
        if let Err(e) = self.emit(transport, &identity, &welcome).await {
            warn!(user = %identity, connection = %id, error = %e, "Failed to send welcome");
        }
    }

    async fn on_message(&self, transport: &dyn Transport, id: &ConnectionId, payload: Bytes) {
        let identity = transport.get_attribute(id, USER_ID_ATTRIBUTE).unwrap_or_default();
        debug!(user = %identity, connection = %id, bytes = payload.len(), "Message event");

        match self.route(transport, payload).await {
            Ok(delivery) => {
                debug!(
                    user = %identity,
                    delivered = delivery.delivered,
                    unresolved = delivery.unresolved,
                    failed = delivery.failed,
                    "Routed"
                );
            }
            Err(e) => warn!(user = %identity, connection = %id, error = %e, "Dropping message"),
        }
    }

    async fn on_disconnect(&self, transport: &dyn Transport, id: &ConnectionId) {
        self.release(transport, id, ConnectionState::Disconnected);
    }

    async fn on_close(&self, transport: &dyn Transport, id: &ConnectionId) {
        self.release(transport, id, ConnectionState::Closed);
    }

    async fn on_error(&self, transport: &dyn Transport, id: &ConnectionId, err: &TransportError) {
        warn!(connection = %id, error = %err, "Error event");
        self.release(transport, id, ConnectionState::Errored);
    }
}
