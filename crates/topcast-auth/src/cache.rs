// Process-local cache of valid API keys, refreshed from an
// authoritative but paginated credential source.
//
// The refresh is single-flight: concurrent misses share one in-progress
// refresh through a guarded shared future instead of each starting a
// paginated read. A failed or abandoned refresh releases the gate so a
// later miss can try again.
use crate::{AuthError, Result};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// One page of valid keys from the credential source. Pagination ends
/// when a page holds fewer items than the requested page size.
#[derive(Debug, Clone)]
pub struct KeyPage {
    pub items: Vec<String>,
    pub next_page_token: Option<String>,
}

/// The authoritative source of valid API keys.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn list_valid_keys(&self, page_token: Option<&str>, page_size: usize)
        -> Result<KeyPage>;
}

#[derive(Debug, Clone)]
pub struct AuthCacheConfig {
    // How long a fetched key stays valid in the cache. Revoked keys keep
    // working for up to this window.
    pub key_ttl: Duration,
    // Page size for the paginated source read.
    pub page_size: usize,
}

impl Default for AuthCacheConfig {
    fn default() -> Self {
        Self {
            key_ttl: Duration::from_secs(10 * 60),
            page_size: 500,
        }
    }
}

/// Refresh failure observed by every caller sharing the in-flight
/// refresh. Cloneable so the shared future's output can fan out.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct RefreshError(Arc<AuthError>);

type SharedRefresh = Shared<BoxFuture<'static, std::result::Result<(), RefreshError>>>;

// At most one refresh in flight; waiters clone the shared future. Each
// installed refresh carries an id so it can release its own slot.
#[derive(Default)]
struct RefreshGate {
    in_flight: Option<(u64, SharedRefresh)>,
    next_id: u64,
}

pub struct ApiKeyCache {
    source: Arc<dyn CredentialSource>,
    config: AuthCacheConfig,
    // apiKey -> expiry instant. Entries are lazily evicted on lookup.
    entries: Arc<RwLock<HashMap<String, Instant>>>,
    refresh_gate: Arc<Mutex<RefreshGate>>,
}

impl ApiKeyCache {
    pub fn new(source: Arc<dyn CredentialSource>, config: AuthCacheConfig) -> Self {
        Self {
            source,
            config,
            entries: Arc::new(RwLock::new(HashMap::new())),
            refresh_gate: Arc::new(Mutex::new(RefreshGate::default())),
        }
    }

    /// Check whether a key is currently valid. A miss triggers (or joins)
    /// a refresh and re-checks; a failed refresh denies, never allows.
    pub async fn is_valid(&self, api_key: &str) -> bool {
        if self.lookup(api_key).await {
            return true;
        }

        // Refresh to make sure this isn't a newly issued key.
        if let Err(err) = self.trigger_refresh().await {
            tracing::warn!(error = %err, "api key cache refresh failed");
            return false;
        }
        self.lookup(api_key).await
    }

    async fn lookup(&self, api_key: &str) -> bool {
        let mut guard = self.entries.write().await;
        match guard.get(api_key) {
            Some(expires_at) if Instant::now() < *expires_at => true,
            Some(_) => {
                // Lazy-expire on read to avoid a background sweeper.
                guard.remove(api_key);
                false
            }
            None => false,
        }
    }

    /// Run one refresh, or await the refresh already in flight.
    pub async fn trigger_refresh(&self) -> std::result::Result<(), RefreshError> {
        let refresh = {
            let mut gate = self.refresh_gate.lock().await;
            match gate.in_flight.as_ref() {
                Some((_, in_flight)) => in_flight.clone(),
                None => {
                    let id = gate.next_id;
                    gate.next_id += 1;
                    let source = Arc::clone(&self.source);
                    let entries = Arc::clone(&self.entries);
                    let gate_handle = Arc::clone(&self.refresh_gate);
                    let key_ttl = self.config.key_ttl;
                    let page_size = self.config.page_size;
                    // The refresh releases its own slot as its last act,
                    // so a caller cancelled mid-await can never strand a
                    // finished refresh in the gate. The id check keeps a
                    // newer refresh installed in the meantime intact.
                    let refresh = async move {
                        let result = run_refresh(source, entries, key_ttl, page_size).await;
                        let mut gate = gate_handle.lock().await;
                        if gate
                            .in_flight
                            .as_ref()
                            .is_some_and(|(current, _)| *current == id)
                        {
                            gate.in_flight = None;
                        }
                        result
                    }
                    .boxed()
                    .shared();
                    gate.in_flight = Some((id, refresh.clone()));
                    refresh
                }
            }
        };

        refresh.await
    }

    #[cfg(test)]
    async fn cached_key_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

async fn run_refresh(
    source: Arc<dyn CredentialSource>,
    entries: Arc<RwLock<HashMap<String, Instant>>>,
    key_ttl: Duration,
    page_size: usize,
) -> std::result::Result<(), RefreshError> {
    let mut page_token: Option<String> = None;
    loop {
        let page = source
            .list_valid_keys(page_token.as_deref(), page_size)
            .await
            .map_err(|err| RefreshError(Arc::new(err)))?;

        // Expiry is fixed at insertion; this bounds the staleness window.
        let expires_at = Instant::now() + key_ttl;
        let item_count = page.items.len();
        {
            let mut guard = entries.write().await;
            for key in page.items {
                guard.insert(key, expires_at);
            }
        }

        // A short page is the pagination terminal condition.
        if item_count < page_size {
            return Ok(());
        }
        page_token = page.next_page_token;
        if page_token.is_none() {
            return Ok(());
        }
    }
}
