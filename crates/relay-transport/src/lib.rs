//! # relay-transport
//!
//! Transport abstraction layer for the Relay message router.
//!
//! The router never owns connections. It talks to a transport through two
//! traits:
//!
//! - **`Transport`** - what the router can do to connections (send, broadcast,
//!   close, per-connection attributes)
//! - **`EventHandler`** - what the transport tells subscribers (connect,
//!   message, disconnect, close, error)
//!
//! Two implementations ship with the crate:
//!
//! - **`WebSocketHub`** - axum WebSocket connections (feature `websocket`)
//! - **`MemoryTransport`** - in-process connections for tests and benches
//!
//! ```rust,ignore
//! use relay_transport::{EventHandler, WebSocketHub};
//!
//! let hub = Arc::new(WebSocketHub::new(HubConfig::default()));
//! hub.subscribe(Arc::new(my_handler));
//! // inside an axum upgrade handler:
//! hub.clone().serve(socket).await;
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::MemoryTransport;
pub use traits::{ConnectionId, ConnectionState, EventHandler, Transport, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{HubConfig, WebSocketHub};
