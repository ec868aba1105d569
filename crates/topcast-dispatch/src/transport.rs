// Connection transport collaborator: push bytes to one connection.
use async_trait::async_trait;
use bytes::Bytes;
use topcast_common::ids::ConnectionId;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    // The peer is gone; a non-fatal per-connection failure.
    #[error("connection {0} is unreachable")]
    Unreachable(ConnectionId),
    #[error("transport failure: {0}")]
    Other(String),
}

/// Delivery channel to live connections. Send order is preserved per
/// connection only if the underlying transport preserves it; the
/// dispatcher adds no ordering of its own.
#[async_trait]
pub trait ConnectionTransport: Send + Sync {
    async fn send(
        &self,
        connection_id: &ConnectionId,
        payload: Bytes,
    ) -> std::result::Result<(), TransportError>;
}
