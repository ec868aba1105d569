// Subscription index: (topic, principal) pairs, unique, persisted
// across disconnects so reconnecting resumes topic traffic.
use crate::{RegistryError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use topcast_common::ids::PrincipalId;
use topcast_store::{Item, KeyValueStore};

const ATTR_SUBSCRIBED_AT: &str = "subscribedAt";

/// One principal's interest in one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub principal_id: PrincipalId,
    pub subscribed_at: DateTime<Utc>,
}

fn to_item(subscription: &Subscription) -> Item {
    Item::new(
        subscription.topic.as_str(),
        subscription.principal_id.as_str(),
    )
    .with_attribute(
        ATTR_SUBSCRIBED_AT,
        subscription.subscribed_at.to_rfc3339(),
    )
}

fn from_item(item: &Item) -> Result<Subscription> {
    let subscribed_at = item
        .attribute(ATTR_SUBSCRIBED_AT)
        .ok_or_else(|| {
            RegistryError::MalformedRecord(format!(
                "subscription ({}, {}) has no subscribedAt",
                item.partition_key(),
                item.sort_key()
            ))
        })
        .and_then(|raw| {
            DateTime::parse_from_rfc3339(raw).map_err(|err| {
                RegistryError::MalformedRecord(format!(
                    "subscription ({}, {}) has invalid subscribedAt: {err}",
                    item.partition_key(),
                    item.sort_key()
                ))
            })
        })?
        .with_timezone(&Utc);
    Ok(Subscription {
        topic: item.partition_key().to_string(),
        principal_id: PrincipalId::new(item.sort_key()),
        subscribed_at,
    })
}

/// Index of topic subscriptions keyed by (topic, principal).
#[derive(Clone)]
pub struct SubscriptionIndex {
    store: Arc<dyn KeyValueStore>,
}

impl SubscriptionIndex {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Upsert by (topic, principal). Subscribing twice leaves one record
    /// and therefore one delivery per publish.
    pub async fn subscribe(
        &self,
        topic: &str,
        principal_id: &PrincipalId,
        subscribed_at: DateTime<Utc>,
    ) -> Result<()> {
        let subscription = Subscription {
            topic: topic.to_string(),
            principal_id: principal_id.clone(),
            subscribed_at,
        };
        self.store.put(to_item(&subscription)).await?;
        Ok(())
    }

    /// Delete; unsubscribing an absent pair is a no-op.
    pub async fn unsubscribe(&self, topic: &str, principal_id: &PrincipalId) -> Result<()> {
        self.store.delete(topic, principal_id.as_str()).await?;
        Ok(())
    }

    /// Every principal currently subscribed to the topic. Used once per
    /// published message during dispatch.
    pub async fn principals_for_topic(&self, topic: &str) -> Result<HashSet<PrincipalId>> {
        let items = self.store.query(topic).await?;
        let mut principals = HashSet::with_capacity(items.len());
        for item in &items {
            principals.insert(from_item(item)?.principal_id);
        }
        Ok(principals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topcast_store::MemoryStore;

    fn index() -> SubscriptionIndex {
        SubscriptionIndex::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn subscribe_then_lookup() {
        let index = index();
        let principal = PrincipalId::new("p1");
        index
            .subscribe("orders", &principal, Utc::now())
            .await
            .expect("subscribe");

        let principals = index.principals_for_topic("orders").await.expect("lookup");
        assert_eq!(principals.len(), 1);
        assert!(principals.contains(&principal));
    }

    #[tokio::test]
    async fn double_subscribe_leaves_one_record() {
        let index = index();
        let principal = PrincipalId::new("p1");
        index
            .subscribe("orders", &principal, Utc::now())
            .await
            .expect("subscribe");
        index
            .subscribe("orders", &principal, Utc::now())
            .await
            .expect("subscribe again");

        let principals = index.principals_for_topic("orders").await.expect("lookup");
        assert_eq!(principals.len(), 1);
    }

    #[tokio::test]
    async fn unsubscribe_removes_the_pair() {
        let index = index();
        let principal = PrincipalId::new("p1");
        index
            .subscribe("orders", &principal, Utc::now())
            .await
            .expect("subscribe");
        index
            .unsubscribe("orders", &principal)
            .await
            .expect("unsubscribe");

        let principals = index.principals_for_topic("orders").await.expect("lookup");
        assert!(principals.is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_absent_pair_is_ok() {
        let index = index();
        index
            .unsubscribe("orders", &PrincipalId::new("ghost"))
            .await
            .expect("unsubscribe");
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let index = index();
        index
            .subscribe("t1", &PrincipalId::new("p1"), Utc::now())
            .await
            .expect("subscribe");
        index
            .subscribe("t2", &PrincipalId::new("p2"), Utc::now())
            .await
            .expect("subscribe");

        let t1 = index.principals_for_topic("t1").await.expect("t1");
        assert_eq!(t1.len(), 1);
        assert!(t1.contains(&PrincipalId::new("p1")));
        assert!(index
            .principals_for_topic("t3")
            .await
            .expect("t3")
            .is_empty());
    }
}
