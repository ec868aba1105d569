// Durable membership and presence state, joined at delivery time:
// the connection registry records which connections are live for a
// principal, the subscription index records which principals follow a
// topic. Both sit on the key-value store collaborator.
pub mod connections;
pub mod subscriptions;

pub use connections::{Connection, ConnectionRegistry, ConnectionSnapshot};
pub use subscriptions::{Subscription, SubscriptionIndex};

use topcast_store::StoreError;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("malformed record: {0}")]
    MalformedRecord(String),
}
