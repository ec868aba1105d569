// Synchronous entry points for the WebSocket API: authorize a
// credential, track connect/disconnect, and route client messages to
// the subscription index or the publish queue. The host transport
// (whatever serves the actual sockets) calls into this layer.
use chrono::{DateTime, Utc};
use std::sync::Arc;
use topcast_auth::{derive_principal_id, ApiKeyCache};
use topcast_common::ids::{ConnectionId, PrincipalId};
use topcast_dispatch::{MessageQueue, QueueError};
use topcast_registry::{Connection, ConnectionRegistry, RegistryError, SubscriptionIndex};
use topcast_wire::ClientMessage;

pub type Result<T> = std::result::Result<T, GatewayError>;

const API_KEY_HEADER: &str = "x-api-key";

#[derive(thiserror::Error, Debug)]
pub enum GatewayError {
    // Credential missing or not valid even after a refresh.
    #[error("unauthorized")]
    Unauthorized,
    // An authorized request arrived without a field the host transport
    // was supposed to supply; fatal to this request only.
    #[error("missing {0} in authorized request context")]
    MissingContextField(&'static str),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("serialize queue payload: {0}")]
    Serialize(topcast_wire::Error),
}

/// Transport-agnostic response: an HTTP-ish status plus a short body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    fn ok(body: &str) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
        }
    }

    fn bad_request(body: &str) -> Self {
        Self {
            status: 400,
            body: body.to_string(),
        }
    }

    fn not_found(body: &str) -> Self {
        Self {
            status: 404,
            body: body.to_string(),
        }
    }
}

/// Fields the host transport extracted for an authorized request.
/// Absence of an expected field is a typed outcome the caller must
/// handle, not an exception.
#[derive(Debug, Default, Clone)]
pub struct RequestContext {
    pub principal_id: Option<PrincipalId>,
    pub connection_id: Option<ConnectionId>,
    pub connected_at: Option<DateTime<Utc>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principal(mut self, principal_id: PrincipalId) -> Self {
        self.principal_id = Some(principal_id);
        self
    }

    pub fn with_connection(
        mut self,
        connection_id: ConnectionId,
        connected_at: DateTime<Utc>,
    ) -> Self {
        self.connection_id = Some(connection_id);
        self.connected_at = Some(connected_at);
        self
    }

    pub fn principal(&self) -> Result<&PrincipalId> {
        self.principal_id
            .as_ref()
            .ok_or(GatewayError::MissingContextField("principal id"))
    }

    pub fn connection_id(&self) -> Result<&ConnectionId> {
        self.connection_id
            .as_ref()
            .ok_or(GatewayError::MissingContextField("connection id"))
    }

    pub fn connected_at(&self) -> Result<DateTime<Utc>> {
        self.connected_at
            .ok_or(GatewayError::MissingContextField("connected at"))
    }
}

pub struct Gateway {
    auth: Arc<ApiKeyCache>,
    connections: ConnectionRegistry,
    subscriptions: SubscriptionIndex,
    queue: Arc<dyn MessageQueue>,
}

impl Gateway {
    pub fn new(
        auth: Arc<ApiKeyCache>,
        connections: ConnectionRegistry,
        subscriptions: SubscriptionIndex,
        queue: Arc<dyn MessageQueue>,
    ) -> Self {
        Self {
            auth,
            connections,
            subscriptions,
            queue,
        }
    }

    /// Validate the API key from the request headers (header names are
    /// case-insensitive) and derive the caller's principal. Denies on a
    /// missing key, an unknown key, and a failed refresh alike.
    pub async fn authorize(&self, headers: &[(String, String)]) -> Result<PrincipalId> {
        let api_key = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(API_KEY_HEADER))
            .map(|(_, value)| value.as_str());
        let Some(api_key) = api_key else {
            tracing::warn!("request made without an API key");
            return Err(GatewayError::Unauthorized);
        };

        if !self.auth.is_valid(api_key).await {
            tracing::warn!("request made with an unknown API key");
            return Err(GatewayError::Unauthorized);
        }
        Ok(derive_principal_id(api_key))
    }

    /// Record a newly authorized connection.
    pub async fn connect(&self, ctx: &RequestContext) -> Result<ApiResponse> {
        let connection = Connection::new(
            ctx.connection_id()?.clone(),
            ctx.principal()?.clone(),
            ctx.connected_at()?,
        );
        tracing::debug!(
            connection_id = %connection.connection_id,
            principal_id = %connection.principal_id,
            "connection request received"
        );
        self.connections.register(&connection).await?;
        Ok(ApiResponse::ok("Connected"))
    }

    /// Drop the connection record. Subscriptions are intentionally left
    /// in place so reconnecting resumes topic traffic.
    pub async fn disconnect(&self, ctx: &RequestContext) -> Result<ApiResponse> {
        let connection_id = ctx.connection_id()?;
        tracing::debug!(connection_id = %connection_id, "disconnect request received");
        self.connections
            .deregister(connection_id, ctx.connected_at()?)
            .await?;
        Ok(ApiResponse::ok("Disconnected"))
    }

    /// Route one client message body for an authorized connection.
    pub async fn handle_message(&self, ctx: &RequestContext, body: &str) -> Result<ApiResponse> {
        let principal_id = ctx.principal()?;
        match topcast_wire::parse_client_message(body) {
            Ok(ClientMessage::Subscribe { topic }) => {
                tracing::debug!(topic = %topic, principal_id = %principal_id, "subscribe request received");
                self.subscriptions
                    .subscribe(&topic, principal_id, Utc::now())
                    .await?;
                Ok(ApiResponse::ok("Created subscription"))
            }
            Ok(ClientMessage::Unsubscribe { topic }) => {
                tracing::debug!(topic = %topic, principal_id = %principal_id, "unsubscribe request received");
                self.subscriptions.unsubscribe(&topic, principal_id).await?;
                Ok(ApiResponse::ok("Removed subscription"))
            }
            Ok(message @ ClientMessage::Publish { .. }) => {
                tracing::debug!(topic = %message.topic(), principal_id = %principal_id, "publish request received");
                // Re-serialize canonically; the dispatcher parses this
                // payload back off the queue.
                let payload = message.to_json().map_err(GatewayError::Serialize)?;
                self.queue.enqueue(payload).await?;
                Ok(ApiResponse::ok("Published message"))
            }
            // A recognized action with bad fields is a validation error
            // on this synchronous path.
            Err(topcast_wire::Error::MissingField(field)) => {
                tracing::warn!(field, principal_id = %principal_id, "invalid message");
                Ok(ApiResponse::bad_request("Invalid message"))
            }
            // Everything else lands where an unroutable action would:
            // log it and answer 404.
            Err(err) => {
                tracing::warn!(error = %err, principal_id = %principal_id, "unknown action");
                Ok(ApiResponse::not_found("Unknown action"))
            }
        }
    }
}
