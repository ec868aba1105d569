// Message queue collaborator. The queue owns batching and redelivery;
// the dispatcher only consumes whatever batch it is handed.
use async_trait::async_trait;

#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),
}

/// Producer side of the topic-messages queue, used by the publish path.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn enqueue(&self, payload: String) -> std::result::Result<(), QueueError>;
}
