//! User identity generation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

/// A user identifier, unique among active connections.
pub type UserId = String;

/// Length of generated user IDs.
pub const USER_ID_LENGTH: usize = 8;

/// Symbols used in generated user IDs.
const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Produces short random user IDs.
///
/// One generator is shared by every connection. The RNG is seeded once and
/// then drawn from under a lock, so simultaneous connects never share a seed.
#[derive(Debug)]
pub struct IdentityGenerator {
    rng: Mutex<StdRng>,
}

impl IdentityGenerator {
    /// Create a generator seeded from the operating system.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Create a deterministic generator.
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Generate a new ID of `USER_ID_LENGTH` alphanumeric characters.
    pub fn generate(&self) -> UserId {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (0..USER_ID_LENGTH)
            .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
            .collect()
    }
}

impl Default for IdentityGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Check whether a string has the shape of a generated user ID.
#[must_use]
pub fn is_valid_user_id(id: &str) -> bool {
    id.len() == USER_ID_LENGTH && id.bytes().all(|b| b.is_ascii_alphanumeric())
}
