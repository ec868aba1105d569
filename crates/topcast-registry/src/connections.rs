// Connection registry: one record per live transport session, keyed by
// (connectionId, connectedAt) so disconnects can race record cleanup.
use crate::{RegistryError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use topcast_common::ids::{ConnectionId, PrincipalId};
use topcast_store::{Item, KeyValueStore};

const ATTR_PRINCIPAL_ID: &str = "principalId";

/// One live transport-level session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub connection_id: ConnectionId,
    pub principal_id: PrincipalId,
    pub connected_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(
        connection_id: ConnectionId,
        principal_id: PrincipalId,
        connected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            connection_id,
            principal_id,
            connected_at,
        }
    }
}

fn to_item(connection: &Connection) -> Item {
    Item::new(
        connection.connection_id.as_str(),
        connection.connected_at.to_rfc3339(),
    )
    .with_attribute(ATTR_PRINCIPAL_ID, connection.principal_id.as_str())
}

fn from_item(item: &Item) -> Result<Connection> {
    let principal_id = item.attribute(ATTR_PRINCIPAL_ID).ok_or_else(|| {
        RegistryError::MalformedRecord(format!(
            "connection {} has no principal id",
            item.partition_key()
        ))
    })?;
    let connected_at = DateTime::parse_from_rfc3339(item.sort_key())
        .map_err(|err| {
            RegistryError::MalformedRecord(format!(
                "connection {} has invalid connectedAt: {err}",
                item.partition_key()
            ))
        })?
        .with_timezone(&Utc);
    Ok(Connection {
        connection_id: ConnectionId::new(item.partition_key()),
        principal_id: PrincipalId::new(principal_id),
        connected_at,
    })
}

/// Registry of active connections, owned exclusively by connect and
/// disconnect handling. The dispatcher only reads snapshots.
#[derive(Clone)]
pub struct ConnectionRegistry {
    store: Arc<dyn KeyValueStore>,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Upsert by connection id; registering the same connection twice is
    /// a no-op.
    pub async fn register(&self, connection: &Connection) -> Result<()> {
        self.store.put(to_item(connection)).await?;
        Ok(())
    }

    /// Remove the record. Absence is not an error; the disconnect may
    /// race the record's own cleanup.
    pub async fn deregister(
        &self,
        connection_id: &ConnectionId,
        connected_at: DateTime<Utc>,
    ) -> Result<()> {
        self.store
            .delete(connection_id.as_str(), &connected_at.to_rfc3339())
            .await?;
        Ok(())
    }

    /// Point-in-time snapshot of every active connection, grouped by
    /// principal for O(1) lookup during a dispatch batch. Connections
    /// registered or removed after the scan are not reflected.
    pub async fn snapshot_grouped_by_principal(&self) -> Result<ConnectionSnapshot> {
        let items = self.store.scan().await?;
        let mut by_principal: HashMap<PrincipalId, Vec<Connection>> = HashMap::new();
        for item in &items {
            let connection = from_item(item)?;
            by_principal
                .entry(connection.principal_id.clone())
                .or_default()
                .push(connection);
        }
        Ok(ConnectionSnapshot { by_principal })
    }
}

/// A grouped snapshot of the registry taken once per dispatch batch.
#[derive(Debug, Default)]
pub struct ConnectionSnapshot {
    by_principal: HashMap<PrincipalId, Vec<Connection>>,
}

impl ConnectionSnapshot {
    /// Connections for a principal; a principal with no live connection
    /// resolves to an empty slice, not an error.
    pub fn connections_for(&self, principal_id: &PrincipalId) -> &[Connection] {
        self.by_principal
            .get(principal_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn connection_count(&self) -> usize {
        self.by_principal.values().map(Vec::len).sum()
    }
}
