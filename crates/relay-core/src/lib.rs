//! # relay-core
//!
//! Identity tracking and message routing for the Relay chat router.
//!
//! This crate provides the building blocks behind a Relay server:
//!
//! - **Identity** - Random user IDs handed out at connect time
//! - **IdentityRegistry** - Which connection currently serves each user
//! - **RoomRegistry** - Named groups of users
//! - **Router** - Addressed and room delivery, arrival broadcasts, and the
//!   connection lifecycle (via its `EventHandler` impl)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  events   ┌─────────────┐     ┌──────────────────┐
//! │  Transport  │──────────▶│   Router    │────▶│ IdentityRegistry │
//! └─────────────┘           └─────────────┘     └──────────────────┘
//!        ▲                         │
//!        │        send             ▼
//!        └──────────────── ┌─────────────┐
//!                          │RoomRegistry │
//!                          └─────────────┘
//! ```

pub mod identity;
pub mod lifecycle;
pub mod registry;
pub mod room;
pub mod router;

pub use identity::{IdentityGenerator, UserId, USER_ID_LENGTH};
pub use lifecycle::USER_ID_ATTRIBUTE;
pub use registry::IdentityRegistry;
pub use room::{RoomError, RoomId, RoomRegistry};
pub use router::{Delivery, Router, RouterConfig, RouterError, RouterStats};
