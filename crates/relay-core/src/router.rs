//! Message router for Relay.
//!
//! The router owns the identity and room registries and delivers inbound
//! envelopes to one addressed user or to every member of a room.

use bytes::Bytes;
use relay_protocol::{Envelope, ProtocolError, SocketEvent, Target, MAX_PAYLOAD_SIZE};
use relay_transport::{ConnectionId, Transport, TransportError};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::identity::{IdentityGenerator, UserId};
use crate::registry::IdentityRegistry;
use crate::room::{RoomError, RoomRegistry};

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The payload could not be decoded or encoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No live connection for this identity.
    #[error("Unknown identity: {0}")]
    UnknownIdentity(String),

    /// Room operation failed.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Could not allocate a free identity.
    #[error("Identity space exhausted after {0} attempts")]
    IdentityExhausted(usize),

    /// Transport refused a send.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Remove a user from all rooms when their connection ends.
    pub leave_rooms_on_disconnect: bool,
    /// Broadcast an arrival notice to existing connections on connect.
    pub announce_arrivals: bool,
    /// Largest inbound envelope accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            leave_rooms_on_disconnect: false,
            announce_arrivals: true,
            max_message_size: MAX_PAYLOAD_SIZE,
        }
    }
}

/// Outcome of routing one envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Sends the transport accepted.
    pub delivered: usize,
    /// Recipients with no live connection.
    pub unresolved: usize,
    /// Sends the transport rejected.
    pub failed: usize,
}

/// The central message router.
///
/// One router is built at startup and shared with every connection handler.
/// The two registries are locked independently and no lock is held across a
/// transport send.
pub struct Router {
    pub(crate) identities: IdentityRegistry,
    pub(crate) rooms: RoomRegistry,
    pub(crate) generator: IdentityGenerator,
    pub(crate) config: RouterConfig,
}

impl Router {
    /// Create a new router with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Create a new router with custom configuration.
    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        Self::with_generator(config, IdentityGenerator::new())
    }

    /// Create a router with a specific identity generator.
    #[must_use]
    pub fn with_generator(config: RouterConfig, generator: IdentityGenerator) -> Self {
        info!("Creating router with config: {:?}", config);
        Self {
            identities: IdentityRegistry::new(),
            rooms: RoomRegistry::new(),
            generator,
            config,
        }
    }

    /// The identity registry.
    #[must_use]
    pub fn identities(&self) -> &IdentityRegistry {
        &self.identities
    }

    /// The room registry.
    #[must_use]
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Router configuration.
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            identities: self.identities.len(),
            rooms: self.rooms.room_count(),
            room_memberships: self.rooms.membership_count(),
        }
    }

    /// Route one inbound payload.
    ///
    /// Room delivery takes precedence over addressed delivery. Recipients
    /// receive the original payload bytes, not a re-encoded copy.
    ///
    /// # Errors
    ///
    /// Returns an error only if the payload is not a valid envelope. Missing
    /// recipients and failed sends are reported in the returned `Delivery`.
    pub async fn route(
        &self,
        transport: &dyn Transport,
        payload: Bytes,
    ) -> Result<Delivery, RouterError> {
        let envelope = Envelope::parse_with_limit(&payload, self.config.max_message_size)?;
        let mut delivery = Delivery::default();

        match envelope.target() {
            Target::Room(room) => {
                let members = self.rooms.members(room);
                trace!(room = %room, from = %envelope.from, members = members.len(), "Routing to room");
                for member in &members {
                    self.deliver(transport, member, &payload, &mut delivery).await;
                }
            }
            Target::User(to) => {
                trace!(to = %to, from = %envelope.from, "Routing to user");
                self.deliver(transport, to, &payload, &mut delivery).await;
                if delivery.unresolved > 0 {
                    warn!(to = %to, from = %envelope.from, "Recipient not connected, message dropped");
                }
            }
            Target::Nobody => {
                debug!(from = %envelope.from, "Envelope has no recipient, message dropped");
            }
        }

        Ok(delivery)
    }

    async fn deliver(
        &self,
        transport: &dyn Transport,
        identity: &str,
        payload: &Bytes,
        delivery: &mut Delivery,
    ) {
        let Some(handle) = self.identities.resolve(identity) else {
            trace!(user = %identity, "Skipping unresolved recipient");
            delivery.unresolved += 1;
            return;
        };

        match transport.send(&handle, payload.clone()).await {
            Ok(()) => delivery.delivered += 1,
            Err(e) => {
                warn!(user = %identity, connection = %handle, error = %e, "Send failed");
                delivery.failed += 1;
            }
        }
    }

    /// Send a payload to every live connection, optionally skipping one.
    ///
    /// Returns the number of connections the payload was handed to.
    pub async fn broadcast(
        &self,
        transport: &dyn Transport,
        payload: Bytes,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let count = transport.broadcast_all(payload, exclude).await;
        trace!(recipients = count, "Broadcast");
        count
    }

    /// Push a structured event to one user.
    ///
    /// # Errors
    ///
    /// Returns an error if the user is not connected or the send fails.
    pub async fn emit(
        &self,
        transport: &dyn Transport,
        identity: &str,
        event: &SocketEvent,
    ) -> Result<(), RouterError> {
        let handle = self
            .identities
            .resolve(identity)
            .ok_or_else(|| RouterError::UnknownIdentity(identity.to_string()))?;
        let payload = event.to_bytes()?;
        transport.send(&handle, payload).await?;
        Ok(())
    }

    /// Add a connected user to a room.
    ///
    /// Returns `true` if the user was not already a member.
    ///
    /// # Errors
    ///
    /// Returns an error if the user is not connected or the room name is invalid.
    pub fn join_room(&self, room: &str, identity: &str) -> Result<bool, RouterError> {
        if !self.identities.contains(identity) {
            return Err(RouterError::UnknownIdentity(identity.to_string()));
        }
        Ok(self.rooms.join(room, identity)?)
    }

    /// Remove a user from a room.
    ///
    /// Returns `true` if the user was a member.
    pub fn leave_room(&self, room: &str, identity: &str) -> bool {
        self.rooms.leave(room, identity)
    }

    /// Members of a room in join order.
    #[must_use]
    pub fn room_members(&self, room: &str) -> Vec<UserId> {
        self.rooms.members(room)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Router statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    /// Number of registered identities.
    pub identities: usize,
    /// Number of rooms.
    pub rooms: usize,
    /// Total room memberships.
    pub room_memberships: usize,
}
