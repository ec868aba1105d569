// Fully wired in-memory deployment: gateway and dispatcher sharing one
// pair of registries, with the mock queue and transport in between.
use crate::mocks::{MemoryQueue, RecordingTransport, StaticKeySource};
use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use topcast_auth::{ApiKeyCache, AuthCacheConfig};
use topcast_common::ids::{ConnectionId, PrincipalId};
use topcast_dispatch::{
    ConnectionTransport, DispatchConfig, DispatchReport, Dispatcher, MessageQueue,
};
use topcast_gateway::{ApiResponse, Gateway, RequestContext};
use topcast_registry::{ConnectionRegistry, SubscriptionIndex};
use topcast_store::MemoryStore;
use topcast_wire::ClientMessage;

pub struct TestWorld {
    gateway: Arc<Gateway>,
    dispatcher: Dispatcher,
    pub queue: Arc<MemoryQueue>,
    pub transport: Arc<RecordingTransport>,
    pub connections: ConnectionRegistry,
    pub subscriptions: SubscriptionIndex,
}

impl TestWorld {
    /// Stand up the whole pipeline with the given API keys considered
    /// valid. Both the gateway and the dispatcher see the same
    /// registries, as they would in a real deployment.
    pub fn with_keys(keys: &[&str]) -> Self {
        let auth = Arc::new(ApiKeyCache::new(
            Arc::new(StaticKeySource::new(keys.iter().copied())),
            AuthCacheConfig::default(),
        ));
        let connections = ConnectionRegistry::new(Arc::new(MemoryStore::new()));
        let subscriptions = SubscriptionIndex::new(Arc::new(MemoryStore::new()));
        let queue = Arc::new(MemoryQueue::new());
        let transport = Arc::new(RecordingTransport::new());

        let gateway = Arc::new(Gateway::new(
            auth,
            connections.clone(),
            subscriptions.clone(),
            Arc::clone(&queue) as Arc<dyn MessageQueue>,
        ));
        let dispatcher = Dispatcher::new(
            connections.clone(),
            subscriptions.clone(),
            Arc::clone(&transport) as Arc<dyn ConnectionTransport>,
            DispatchConfig::default(),
        );

        Self {
            gateway,
            dispatcher,
            queue,
            transport,
            connections,
            subscriptions,
        }
    }

    /// Authorize with the given key and open a connection, as the host
    /// transport would on a new socket.
    pub async fn connect(&self, api_key: &str, connection_id: &str) -> Result<Session> {
        let headers = vec![("x-api-key".to_string(), api_key.to_string())];
        let principal_id = self
            .gateway
            .authorize(&headers)
            .await
            .with_context(|| format!("authorize connection {connection_id}"))?;

        let connection_id = ConnectionId::new(connection_id);
        let ctx = RequestContext::new()
            .with_principal(principal_id.clone())
            .with_connection(connection_id.clone(), Utc::now());
        self.gateway
            .connect(&ctx)
            .await
            .with_context(|| format!("connect {connection_id}"))?;

        Ok(Session {
            gateway: Arc::clone(&self.gateway),
            ctx,
            connection_id,
            principal_id,
        })
    }

    /// Drain the queue and run everything through the dispatcher, like
    /// one poll of the queue consumer.
    pub async fn pump(&self) -> Result<DispatchReport> {
        let batch = self.queue.drain();
        self.dispatcher
            .dispatch_batch(&batch)
            .await
            .context("dispatch batch")
    }

    pub fn delivered_to(&self, connection_id: &ConnectionId) -> Vec<Bytes> {
        self.transport.sent_to(connection_id)
    }
}

/// One authorized live connection, addressable by the client actions
/// the wire protocol offers.
pub struct Session {
    gateway: Arc<Gateway>,
    ctx: RequestContext,
    pub connection_id: ConnectionId,
    pub principal_id: PrincipalId,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection_id", &self.connection_id)
            .field("principal_id", &self.principal_id)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub async fn subscribe(&self, topic: &str) -> Result<ApiResponse> {
        self.send(&ClientMessage::Subscribe {
            topic: topic.to_string(),
        })
        .await
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<ApiResponse> {
        self.send(&ClientMessage::Unsubscribe {
            topic: topic.to_string(),
        })
        .await
    }

    pub async fn publish(&self, topic: &str, message: &str) -> Result<ApiResponse> {
        self.send(&ClientMessage::Publish {
            topic: topic.to_string(),
            message: message.to_string(),
        })
        .await
    }

    /// Send a raw body, bypassing message construction. Useful for
    /// exercising the malformed-input paths.
    pub async fn send_raw(&self, body: &str) -> Result<ApiResponse> {
        self.gateway
            .handle_message(&self.ctx, body)
            .await
            .context("handle message")
    }

    pub async fn disconnect(&self) -> Result<ApiResponse> {
        self.gateway
            .disconnect(&self.ctx)
            .await
            .with_context(|| format!("disconnect {}", self.connection_id))
    }

    async fn send(&self, message: &ClientMessage) -> Result<ApiResponse> {
        let body = message.to_json().context("serialize client message")?;
        self.send_raw(&body).await
    }
}
