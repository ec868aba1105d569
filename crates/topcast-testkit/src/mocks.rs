// In-memory stand-ins for the external collaborators: the topic queue,
// the connection transport, and the credential source.
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use topcast_auth::{CredentialSource, KeyPage};
use topcast_common::ids::ConnectionId;
use topcast_dispatch::{ConnectionTransport, MessageQueue, QueueError, TransportError};

/// Queue that buffers published payloads until the test pumps them
/// through the dispatcher.
#[derive(Default)]
pub struct MemoryQueue {
    payloads: Mutex<Vec<String>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything enqueued so far, leaving the queue empty.
    pub fn drain(&self) -> Vec<String> {
        std::mem::take(&mut *self.payloads.lock().expect("queue lock"))
    }

    pub fn len(&self) -> usize {
        self.payloads.lock().expect("queue lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn enqueue(&self, payload: String) -> Result<(), QueueError> {
        self.payloads.lock().expect("queue lock").push(payload);
        Ok(())
    }
}

/// Transport that records every delivery per connection and can be told
/// to treat chosen connections as gone.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<HashMap<ConnectionId, Vec<Bytes>>>,
    unreachable: Mutex<HashSet<ConnectionId>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_to(&self, connection_id: &ConnectionId) -> Vec<Bytes> {
        self.sent
            .lock()
            .expect("transport lock")
            .get(connection_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn total_sent(&self) -> usize {
        self.sent
            .lock()
            .expect("transport lock")
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn mark_unreachable(&self, connection_id: ConnectionId) {
        self.unreachable
            .lock()
            .expect("transport lock")
            .insert(connection_id);
    }
}

#[async_trait]
impl ConnectionTransport for RecordingTransport {
    async fn send(
        &self,
        connection_id: &ConnectionId,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        if self
            .unreachable
            .lock()
            .expect("transport lock")
            .contains(connection_id)
        {
            return Err(TransportError::Unreachable(connection_id.clone()));
        }
        self.sent
            .lock()
            .expect("transport lock")
            .entry(connection_id.clone())
            .or_default()
            .push(payload);
        Ok(())
    }
}

/// Credential source backed by a fixed key list, served one page at a
/// time so refreshes exercise the pagination loop.
pub struct StaticKeySource {
    keys: Vec<String>,
    fetches: AtomicUsize,
}

impl StaticKeySource {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Number of pages handed out across all refreshes.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for StaticKeySource {
    async fn list_valid_keys(
        &self,
        page_token: Option<&str>,
        page_size: usize,
    ) -> topcast_auth::Result<KeyPage> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let start: usize = match page_token {
            Some(token) => token.parse().unwrap_or(0),
            None => 0,
        };
        let end = (start + page_size).min(self.keys.len());
        let next_page_token = if end < self.keys.len() {
            Some(end.to_string())
        } else {
            None
        };
        Ok(KeyPage {
            items: self.keys[start..end].to_vec(),
            next_page_token,
        })
    }
}
