// Key-value store collaborator: partition/sort keyed items with
// query-by-partition and full-scan reads. No cross-item transactions.
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One stored record: a composite key plus named string attributes.
///
/// ```
/// use topcast_store::Item;
///
/// let item = Item::new("orders", "user-1").with_attribute("subscribedAt", "2024-01-01");
/// assert_eq!(item.attribute("subscribedAt"), Some("2024-01-01"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    partition_key: String,
    sort_key: String,
    attributes: HashMap<String, String>,
}

impl Item {
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    pub fn sort_key(&self) -> &str {
        &self.sort_key
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Store operations the registry crates are written against.
/// Writes are per-item atomic upserts/deletes; reads may observe
/// concurrent writers in any order.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn put(&self, item: Item) -> Result<()>;
    async fn delete(&self, partition_key: &str, sort_key: &str) -> Result<()>;
    async fn query(&self, partition_key: &str) -> Result<Vec<Item>>;
    async fn scan(&self) -> Result<Vec<Item>>;
}

/// In-memory store backend keyed by (partition, sort).
///
/// ```
/// use topcast_store::{Item, KeyValueStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// let rt = tokio::runtime::Runtime::new().expect("rt");
/// rt.block_on(async {
///     store.put(Item::new("pk", "sk")).await.expect("put");
///     assert_eq!(store.query("pk").await.expect("query").len(), 1);
/// });
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    // BTreeMap keeps items for one partition contiguous for range reads.
    inner: RwLock<BTreeMap<(String, String), Item>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn put(&self, item: Item) -> Result<()> {
        let key = (item.partition_key.clone(), item.sort_key.clone());
        self.inner.write().await.insert(key, item);
        Ok(())
    }

    async fn delete(&self, partition_key: &str, sort_key: &str) -> Result<()> {
        // Deleting an absent item is a no-op; disconnects may race cleanup.
        self.inner
            .write()
            .await
            .remove(&(partition_key.to_string(), sort_key.to_string()));
        Ok(())
    }

    async fn query(&self, partition_key: &str) -> Result<Vec<Item>> {
        let guard = self.inner.read().await;
        let start = (partition_key.to_string(), String::new());
        Ok(guard
            .range(start..)
            .take_while(|((pk, _), _)| pk == partition_key)
            .map(|(_, item)| item.clone())
            .collect())
    }

    async fn scan(&self) -> Result<Vec<Item>> {
        Ok(self.inner.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_is_an_upsert() {
        let store = MemoryStore::new();
        store
            .put(Item::new("pk", "sk").with_attribute("v", "1"))
            .await
            .expect("put");
        store
            .put(Item::new("pk", "sk").with_attribute("v", "2"))
            .await
            .expect("put");
        let items = store.query("pk").await.expect("query");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].attribute("v"), Some("2"));
    }

    #[tokio::test]
    async fn query_returns_only_matching_partition() {
        let store = MemoryStore::new();
        store.put(Item::new("a", "1")).await.expect("put");
        store.put(Item::new("a", "2")).await.expect("put");
        store.put(Item::new("ab", "1")).await.expect("put");
        store.put(Item::new("b", "1")).await.expect("put");
        let items = store.query("a").await.expect("query");
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item.partition_key() == "a"));
    }

    #[tokio::test]
    async fn delete_absent_item_is_ok() {
        let store = MemoryStore::new();
        store.delete("pk", "sk").await.expect("delete");
        assert!(store.scan().await.expect("scan").is_empty());
    }

    #[tokio::test]
    async fn scan_sees_all_partitions() {
        let store = MemoryStore::new();
        store.put(Item::new("a", "1")).await.expect("put");
        store.put(Item::new("b", "1")).await.expect("put");
        assert_eq!(store.scan().await.expect("scan").len(), 2);
    }
}
