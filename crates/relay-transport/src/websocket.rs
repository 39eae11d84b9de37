//! WebSocket transport implementation.
//!
//! `WebSocketHub` owns every upgraded axum WebSocket, runs one reader loop and
//! one writer task per connection, and fans lifecycle events out to the
//! subscribed `EventHandler`s.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace, warn};

use crate::traits::{ConnectionId, ConnectionState, EventHandler, Transport, TransportError};

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Outbound frames buffered per connection before sends start failing.
    pub outbound_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 256,
        }
    }
}

/// Frames queued for a connection's writer task.
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close,
}

struct HubConnection {
    sender: mpsc::Sender<Outbound>,
    state: ConnectionState,
    attributes: HashMap<String, String>,
}

/// WebSocket connection hub.
pub struct WebSocketHub {
    connections: DashMap<ConnectionId, HubConnection>,
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
    config: HubConfig,
}

impl WebSocketHub {
    /// Create a hub with no subscribers.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        info!("Creating WebSocket hub with config: {:?}", config);
        Self {
            connections: DashMap::new(),
            handlers: RwLock::new(Vec::new()),
            config,
        }
    }

    /// Register an event handler.
    ///
    /// Handlers are invoked in registration order for every event.
    pub fn subscribe(&self, handler: Arc<dyn EventHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn handlers(&self) -> Vec<Arc<dyn EventHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_state(&self, id: &ConnectionId, state: ConnectionState) {
        if let Some(mut conn) = self.connections.get_mut(id) {
            trace!(connection = %id, from = %conn.state, to = %state, "State transition");
            conn.state = state;
        }
    }

    /// Terminal state for a socket that stopped yielding frames.
    fn ended_state(&self, id: &ConnectionId) -> ConnectionState {
        match self.connections.get(id).map(|c| c.state) {
            Some(ConnectionState::Closing) => ConnectionState::Closed,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Drive an upgraded WebSocket until it terminates.
    ///
    /// Runs `on_connect`, then `on_message` for every inbound frame in order,
    /// then exactly one of `on_disconnect`, `on_close` or `on_error`.
    pub async fn serve(self: Arc<Self>, socket: WebSocket) {
        let id = ConnectionId::generate();
        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::channel::<Outbound>(self.config.outbound_buffer);

        self.connections.insert(
            id.clone(),
            HubConnection {
                sender: tx,
                state: ConnectionState::Connecting,
                attributes: HashMap::new(),
            },
        );

        let writer_id = id.clone();
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let result = match frame {
                    Outbound::Text(text) => sink.send(Message::Text(text)).await,
                    Outbound::Close => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                };
                if let Err(e) = result {
                    debug!(connection = %writer_id, error = %e, "Write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        self.set_state(&id, ConnectionState::Connected);
        debug!(connection = %id, "WebSocket connected");

        let handlers = self.handlers();
        for handler in &handlers {
            handler.on_connect(self.as_ref(), &id).await;
        }

        let (state, error) = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    let payload = Bytes::from(text);
                    for handler in &handlers {
                        handler.on_message(self.as_ref(), &id, payload.clone()).await;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    let payload = Bytes::from(data);
                    for handler in &handlers {
                        handler.on_message(self.as_ref(), &id, payload.clone()).await;
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                    // Answered by axum
                }
                Some(Ok(Message::Close(_))) | None => break (self.ended_state(&id), None),
                Some(Err(e)) => {
                    warn!(connection = %id, error = %e, "WebSocket error");
                    break (
                        ConnectionState::Errored,
                        Some(TransportError::ReceiveFailed(e.to_string())),
                    );
                }
            }
        };

        self.set_state(&id, state);
        debug!(connection = %id, state = %state, "WebSocket terminated");

        for handler in &handlers {
            match (&state, &error) {
                (ConnectionState::Errored, Some(err)) => {
                    handler.on_error(self.as_ref(), &id, err).await;
                }
                (ConnectionState::Closed, _) => handler.on_close(self.as_ref(), &id).await,
                _ => handler.on_disconnect(self.as_ref(), &id).await,
            }
        }

        // Dropping the sender lets the writer drain and exit.
        self.connections.remove(&id);
    }
}

#[async_trait]
impl Transport for WebSocketHub {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn send(&self, id: &ConnectionId, payload: Bytes) -> Result<(), TransportError> {
        let text = String::from_utf8(payload.to_vec())
            .map_err(|_| TransportError::SendFailed("payload is not valid UTF-8".into()))?;

        let sender = self
            .connections
            .get(id)
            .filter(|c| c.state.is_open())
            .map(|c| c.sender.clone())
            .ok_or_else(|| TransportError::ConnectionClosed(id.clone()))?;

        sender.try_send(Outbound::Text(text)).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::SendFailed(format!("outbound queue full for {id}")),
            TrySendError::Closed(_) => TransportError::ConnectionClosed(id.clone()),
        })
    }

    async fn broadcast_all(&self, payload: Bytes, exclude: Option<&ConnectionId>) -> usize {
        let mut delivered = 0;
        for id in self.connection_ids() {
            if exclude == Some(&id) {
                continue;
            }
            match self.send(&id, payload.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => debug!(connection = %id, error = %e, "Broadcast send skipped"),
            }
        }
        delivered
    }

    async fn close(&self, id: &ConnectionId) -> Result<(), TransportError> {
        let sender = {
            let mut conn = self
                .connections
                .get_mut(id)
                .filter(|c| c.state.is_open())
                .ok_or_else(|| TransportError::ConnectionClosed(id.clone()))?;
            conn.state = ConnectionState::Closing;
            conn.sender.clone()
        };

        debug!(connection = %id, "Closing connection");
        sender
            .send(Outbound::Close)
            .await
            .map_err(|_| TransportError::ConnectionClosed(id.clone()))
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

    fn connection_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|c| c.state.is_open())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, extract::WebSocketUpgrade, response::IntoResponse, routing::get};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::{connect_async, tungstenite::Message as ClientMessage};

    /// Echoes every message back and records lifecycle events.
    #[derive(Default)]
    struct EchoHandler {
        events: Mutex<Vec<String>>,
    }

    impl EchoHandler {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for EchoHandler {
        async fn on_connect(&self, transport: &dyn Transport, id: &ConnectionId) {
            transport.set_attribute(id, "seen", "yes".into()).unwrap();
            self.events.lock().unwrap().push("connect".into());
        }

        async fn on_message(&self, transport: &dyn Transport, id: &ConnectionId, payload: Bytes) {
            self.events.lock().unwrap().push("message".into());
            transport.send(id, payload).await.unwrap();
        }

        async fn on_disconnect(&self, transport: &dyn Transport, id: &ConnectionId) {
            assert_eq!(transport.get_attribute(id, "seen").as_deref(), Some("yes"));
            self.events.lock().unwrap().push("disconnect".into());
        }
    }

    async fn ws_route(
        ws: WebSocketUpgrade,
        State(hub): State<Arc<WebSocketHub>>,
    ) -> impl IntoResponse {
        ws.on_upgrade(move |socket| hub.serve(socket))
    }

    #[test]
    fn test_hub_config_default() {
        let config = HubConfig::default();
        assert_eq!(config.outbound_buffer, 256);
    }

    #[tokio::test]
    async fn test_hub_echo_and_disconnect() {
        let hub = Arc::new(WebSocketHub::new(HubConfig::default()));
        let handler = Arc::new(EchoHandler::default());
        hub.subscribe(handler.clone());
        assert_eq!(hub.handler_count(), 1);

        let app = axum::Router::new()
            .route("/ws", get(ws_route))
            .with_state(hub.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let (mut client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        client
            .send(ClientMessage::Text("hello".into()))
            .await
            .unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(reply, ClientMessage::Text("hello".into()));
        assert_eq!(hub.connection_count(), 1);

        client.close(None).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while !handler.events().contains(&"disconnect".to_string()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(handler.events(), vec!["connect", "message", "disconnect"]);
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_send_to_unknown_connection() {
        let hub = WebSocketHub::new(HubConfig::default());
        let result = hub.send(&"nope".into(), Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(TransportError::ConnectionClosed(_))));
        assert_eq!(hub.broadcast_all(Bytes::from_static(b"x"), None).await, 0);
    }
}
