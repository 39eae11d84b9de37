//! Metrics collection and export for Relay.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format. `MetricsRecorder` subscribes to the hub next to the
//! router, so every lifecycle event is counted without touching routing code.

use async_trait::async_trait;
use bytes::Bytes;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use relay_transport::{ConnectionId, EventHandler, Transport, TransportError};
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
    pub const MESSAGES_TOTAL: &str = "relay_messages_total";
    pub const MESSAGES_BYTES: &str = "relay_messages_bytes";
    pub const DISCONNECTS_TOTAL: &str = "relay_disconnects_total";
    pub const ERRORS_TOTAL: &str = "relay_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Total number of inbound messages");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Total bytes of inbound messages");
    metrics::describe_counter!(
        names::DISCONNECTS_TOTAL,
        "Terminated connections by reason"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a terminated connection.
pub fn record_disconnection(reason: &'static str) {
    counter!(names::DISCONNECTS_TOTAL, "reason" => reason).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record an inbound message.
pub fn record_message(bytes: usize) {
    counter!(names::MESSAGES_TOTAL).increment(1);
    counter!(names::MESSAGES_BYTES).increment(bytes as u64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Event handler that turns hub events into metrics.
#[derive(Debug, Default)]
pub struct MetricsRecorder;

#[async_trait]
impl EventHandler for MetricsRecorder {
    async fn on_connect(&self, _transport: &dyn Transport, _id: &ConnectionId) {
        record_connection();
    }

    async fn on_message(&self, _transport: &dyn Transport, _id: &ConnectionId, payload: Bytes) {
        record_message(payload.len());
    }

    async fn on_disconnect(&self, _transport: &dyn Transport, _id: &ConnectionId) {
        record_disconnection("disconnect");
    }

    async fn on_close(&self, _transport: &dyn Transport, _id: &ConnectionId) {
        record_disconnection("close");
    }

    async fn on_error(
        &self,
        _transport: &dyn Transport,
        _id: &ConnectionId,
        _error: &TransportError,
    ) {
        record_error("websocket");
        record_disconnection("error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_transport::MemoryTransport;

    #[tokio::test]
    async fn test_recorder_handles_every_event() {
        // No recorder installed: the calls must simply not panic.
        let recorder = MetricsRecorder;
        let transport = MemoryTransport::new();
        let id = transport.open();

        recorder.on_connect(&transport, &id).await;
        recorder
            .on_message(&transport, &id, Bytes::from_static(b"{}"))
            .await;
        recorder.on_disconnect(&transport, &id).await;
        recorder.on_close(&transport, &id).await;
        recorder
            .on_error(&transport, &id, &TransportError::Other("boom".into()))
            .await;
    }
}
