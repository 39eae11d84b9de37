//! Room registry.
//!
//! Rooms are named groups of user IDs. Members are kept in join order and a
//! room disappears when its last member leaves.

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::identity::UserId;

/// Maximum room name length.
pub const MAX_ROOM_NAME_LENGTH: usize = 256;

/// A room identifier.
pub type RoomId = String;

/// Room errors.
#[derive(Debug, Error)]
pub enum RoomError {
    /// Invalid room name.
    #[error("Invalid room name: {0}")]
    InvalidName(&'static str),
}

/// Validate a room name.
///
/// # Errors
///
/// Returns an error message if the room name is invalid.
pub fn validate_room_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Room name cannot be empty");
    }
    if name.len() > MAX_ROOM_NAME_LENGTH {
        return Err("Room name too long");
    }
    if name.starts_with('$') {
        return Err("Room names starting with '$' are reserved");
    }
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Room name contains invalid characters");
    }
    Ok(())
}

/// Room to member mapping.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<RoomId, Vec<UserId>>,
}

impl RoomRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Members of a room in join order. Unknown rooms have no members.
    #[must_use]
    pub fn members(&self, room: &str) -> Vec<UserId> {
        self.rooms
            .get(room)
            .map(|m| m.value().clone())
            .unwrap_or_default()
    }

    /// Add a user to a room, creating the room if needed.
    ///
    /// Returns `true` if the user was not already a member.
    ///
    /// # Errors
    ///
    /// Returns an error if the room name is invalid.
    pub fn join(&self, room: &str, identity: &str) -> Result<bool, RoomError> {
        validate_room_name(room).map_err(RoomError::InvalidName)?;

        let mut members = self.rooms.entry(room.to_string()).or_insert_with(|| {
            debug!(room = %room, "Creating new room");
            Vec::new()
        });

        if members.iter().any(|m| m == identity) {
            return Ok(false);
        }
        members.push(identity.to_string());

        debug!(room = %room, user = %identity, members = members.len(), "Joined room");
        Ok(true)
    }

    /// Remove a user from a room.
    ///
    /// Returns `true` if the user was a member.
    pub fn leave(&self, room: &str, identity: &str) -> bool {
        let Some(mut members) = self.rooms.get_mut(room) else {
            return false;
        };

        let before = members.len();
        members.retain(|m| m != identity);
        let removed = members.len() != before;

        if removed {
            debug!(room = %room, user = %identity, members = members.len(), "Left room");
        }

        if members.is_empty() {
            drop(members); // Release the shard lock
            self.rooms.remove_if(room, |_, m| m.is_empty());
            debug!(room = %room, "Deleted empty room");
        }

        removed
    }

    /// Remove a user from every room.
    ///
    /// Returns the rooms the user was removed from.
    pub fn leave_all(&self, identity: &str) -> Vec<RoomId> {
        let mut left = Vec::new();
        let mut emptied = Vec::new();

        for mut entry in self.rooms.iter_mut() {
            let before = entry.len();
            entry.retain(|m| m != identity);
            if entry.len() != before {
                left.push(entry.key().clone());
            }
            if entry.is_empty() {
                emptied.push(entry.key().clone());
            }
        }

        for room in emptied {
            self.rooms.remove_if(&room, |_, m| m.is_empty());
        }

        if !left.is_empty() {
            debug!(user = %identity, rooms = left.len(), "Left all rooms");
        }
        left
    }

    /// Check if a user is a member of a room.
    #[must_use]
    pub fn contains(&self, room: &str, identity: &str) -> bool {
        self.rooms
            .get(room)
            .map(|m| m.iter().any(|id| id == identity))
            .unwrap_or(false)
    }

    /// Check if a room exists.
    #[must_use]
    pub fn room_exists(&self, room: &str) -> bool {
        self.rooms.contains_key(room)
    }

    /// Names of all rooms.
    #[must_use]
    pub fn room_names(&self) -> Vec<RoomId> {
        self.rooms.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of rooms.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Total memberships across all rooms.
    #[must_use]
    pub fn membership_count(&self) -> usize {
        self.rooms.iter().map(|e| e.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_room_is_empty() {
        let rooms = RoomRegistry::new();
        assert!(rooms.members("nowhere").is_empty());
        assert!(!rooms.room_exists("nowhere"));
    }

    #[test]
    fn test_join_preserves_order() {
        let rooms = RoomRegistry::new();
        assert!(rooms.join("lobby", "carol").unwrap());
        assert!(rooms.join("lobby", "alice").unwrap());
        assert!(rooms.join("lobby", "bob").unwrap());
        assert!(!rooms.join("lobby", "alice").unwrap());

        assert_eq!(rooms.members("lobby"), vec!["carol", "alice", "bob"]);
    }

    #[test]
    fn test_leave_deletes_empty_room() {
        let rooms = RoomRegistry::new();
        rooms.join("lobby", "alice").unwrap();
        rooms.join("lobby", "bob").unwrap();

        assert!(rooms.leave("lobby", "alice"));
        assert!(!rooms.leave("lobby", "alice"));
        assert!(rooms.room_exists("lobby"));

        assert!(rooms.leave("lobby", "bob"));
        assert!(!rooms.room_exists("lobby"));
        assert!(!rooms.leave("lobby", "bob"));
    }

    #[test]
    fn test_leave_all() {
        let rooms = RoomRegistry::new();
        rooms.join("a", "alice").unwrap();
        rooms.join("b", "alice").unwrap();
        rooms.join("b", "bob").unwrap();

        let mut left = rooms.leave_all("alice");
        left.sort();
        assert_eq!(left, vec!["a", "b"]);

        assert!(!rooms.room_exists("a"));
        assert_eq!(rooms.members("b"), vec!["bob"]);
        assert_eq!(rooms.membership_count(), 1);
        assert!(rooms.leave_all("alice").is_empty());
    }

    #[test]
    fn test_room_name_validation() {
        assert!(validate_room_name("lobby").is_ok());
        assert!(validate_room_name("team:rust").is_ok());
        assert!(validate_room_name("").is_err());
        assert!(validate_room_name("$system").is_err());
        assert!(validate_room_name("tab\there").is_err());

        let long_name = "a".repeat(MAX_ROOM_NAME_LENGTH + 1);
        assert!(validate_room_name(&long_name).is_err());

        let rooms = RoomRegistry::new();
        assert!(matches!(
            rooms.join("", "alice"),
            Err(RoomError::InvalidName(_))
        ));
        assert_eq!(rooms.room_count(), 0);
    }

    #[test]
    fn test_contains() {
        let rooms = RoomRegistry::new();
        rooms.join("lobby", "alice").unwrap();
        assert!(rooms.contains("lobby", "alice"));
        assert!(!rooms.contains("lobby", "bob"));
        assert!(!rooms.contains("other", "alice"));
    }
}
