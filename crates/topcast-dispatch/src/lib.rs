// Broadcast dispatcher: join the subscription index with a connection
// registry snapshot and deliver each published message to every
// resolvable connection, independently and concurrently.
pub mod queue;
pub mod transport;

pub use queue::{MessageQueue, QueueError};
pub use transport::{ConnectionTransport, TransportError};

use bytes::Bytes;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use topcast_registry::{
    Connection, ConnectionRegistry, ConnectionSnapshot, RegistryError, SubscriptionIndex,
};
use topcast_wire::BroadcastMessage;

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    // Without a registry snapshot there is nothing to fan out to.
    #[error("failed to snapshot connections: {0}")]
    Snapshot(#[source] RegistryError),
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    // Deadline for one delivery; an elapsed deadline counts as a failed
    // delivery. None waits on the transport indefinitely.
    pub delivery_timeout: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            delivery_timeout: Some(Duration::from_secs(10)),
        }
    }
}

/// Counts of what happened to one batch. The batch as a whole succeeds
/// once every message has been attempted; failed deliveries are not
/// retried here — redelivery is the upstream queue's policy.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub messages: usize,
    pub skipped: usize,
    pub delivered: usize,
    pub failed: usize,
}

impl DispatchReport {
    fn absorb(&mut self, other: MessageOutcome) {
        match other {
            MessageOutcome::Skipped => self.skipped += 1,
            MessageOutcome::Fanned { delivered, failed } => {
                self.delivered += delivered;
                self.failed += failed;
            }
        }
    }
}

enum MessageOutcome {
    Skipped,
    Fanned { delivered: usize, failed: usize },
}

pub struct Dispatcher {
    connections: ConnectionRegistry,
    subscriptions: SubscriptionIndex,
    transport: Arc<dyn ConnectionTransport>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        connections: ConnectionRegistry,
        subscriptions: SubscriptionIndex,
        transport: Arc<dyn ConnectionTransport>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            connections,
            subscriptions,
            transport,
            config,
        }
    }

    /// Process one queue batch of raw publish payloads.
    ///
    /// One registry snapshot is shared across the whole batch; this
    /// bounds target resolution to one scan per batch, at the cost of
    /// not seeing connections that register or drop mid-batch.
    pub async fn dispatch_batch(&self, batch: &[String]) -> Result<DispatchReport> {
        let snapshot = self
            .connections
            .snapshot_grouped_by_principal()
            .await
            .map_err(DispatchError::Snapshot)?;

        let outcomes = join_all(
            batch
                .iter()
                .map(|payload| self.dispatch_message(&snapshot, payload)),
        )
        .await;

        let mut report = DispatchReport {
            messages: batch.len(),
            ..DispatchReport::default()
        };
        for outcome in outcomes {
            report.absorb(outcome);
        }
        metrics::counter!("topcast_dispatch_messages_total").increment(report.messages as u64);
        metrics::counter!("topcast_dispatch_delivered_total").increment(report.delivered as u64);
        metrics::counter!("topcast_dispatch_failed_total").increment(report.failed as u64);
        Ok(report)
    }

    // A bad payload or a failed index read skips this message only; the
    // rest of the batch is unaffected.
    async fn dispatch_message(
        &self,
        snapshot: &ConnectionSnapshot,
        payload: &str,
    ) -> MessageOutcome {
        let broadcast = match topcast_wire::parse_client_message(payload)
            .and_then(BroadcastMessage::try_from)
        {
            Ok(broadcast) => broadcast,
            Err(err) => {
                tracing::warn!(error = %err, payload, "skipping unparseable queue payload");
                metrics::counter!("topcast_dispatch_skipped_total").increment(1);
                return MessageOutcome::Skipped;
            }
        };

        let principals = match self
            .subscriptions
            .principals_for_topic(&broadcast.topic)
            .await
        {
            Ok(principals) => principals,
            Err(err) => {
                tracing::warn!(error = %err, topic = %broadcast.topic, "skipping message; subscriber lookup failed");
                metrics::counter!("topcast_dispatch_skipped_total").increment(1);
                return MessageOutcome::Skipped;
            }
        };

        // Flatten to the target connections: a principal with several
        // live sessions gets one copy per session, a principal with none
        // contributes nothing.
        let targets: Vec<&Connection> = principals
            .iter()
            .flat_map(|principal| snapshot.connections_for(principal))
            .collect();

        let body = Bytes::from(broadcast.message.into_bytes());
        let results = join_all(
            targets
                .iter()
                .map(|connection| self.deliver(connection, &broadcast.topic, body.clone())),
        )
        .await;

        let delivered = results.iter().filter(|ok| **ok).count();
        MessageOutcome::Fanned {
            delivered,
            failed: results.len() - delivered,
        }
    }

    // One delivery; success or failure is observed here and never
    // propagates to sibling deliveries.
    async fn deliver(&self, connection: &Connection, topic: &str, body: Bytes) -> bool {
        let send = self.transport.send(&connection.connection_id, body);
        let result = match self.config.delivery_timeout {
            Some(deadline) => match tokio::time::timeout(deadline, send).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Other(format!(
                    "delivery deadline elapsed after {deadline:?}"
                ))),
            },
            None => send.await,
        };

        match result {
            Ok(()) => {
                tracing::debug!(
                    connection_id = %connection.connection_id,
                    topic,
                    "delivered message"
                );
                true
            }
            Err(err) => {
                // Stale registry entries are left in place; see the
                // unreachable-connection note in DESIGN.md.
                tracing::warn!(
                    connection_id = %connection.connection_id,
                    topic,
                    error = %err,
                    "delivery failed"
                );
                false
            }
        }
    }
}
