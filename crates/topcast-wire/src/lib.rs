// Wire-level message model: one JSON object per client message,
// discriminated by the `action` field. Field names are matched
// case-insensitively; action values are lowercase.
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("malformed message body")]
    Malformed(#[source] serde_json::Error),
    #[error("message body is not a JSON object")]
    NotAnObject,
    #[error("message has no action field")]
    MissingAction,
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("missing or non-string field: {0}")]
    MissingField(&'static str),
}

/// A client request, one of subscribe/unsubscribe/publish.
///
/// ```
/// use topcast_wire::ClientMessage;
///
/// let msg = topcast_wire::parse_client_message(
///     r#"{ "action": "publish", "topic": "t1", "message": "hello" }"#,
/// )
/// .expect("parse");
/// assert!(matches!(msg, ClientMessage::Publish { .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Publish { topic: String, message: String },
}

impl ClientMessage {
    pub fn topic(&self) -> &str {
        match self {
            ClientMessage::Subscribe { topic }
            | ClientMessage::Unsubscribe { topic }
            | ClientMessage::Publish { topic, .. } => topic,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::Malformed)
    }
}

/// The payload carried on the topic-messages queue: a publish request
/// stripped down to the topic and the body to broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastMessage {
    pub topic: String,
    pub message: String,
}

impl From<BroadcastMessage> for ClientMessage {
    fn from(value: BroadcastMessage) -> Self {
        ClientMessage::Publish {
            topic: value.topic,
            message: value.message,
        }
    }
}

impl TryFrom<ClientMessage> for BroadcastMessage {
    type Error = Error;

    fn try_from(value: ClientMessage) -> Result<Self> {
        match value {
            ClientMessage::Publish { topic, message } => Ok(BroadcastMessage { topic, message }),
            other => Err(Error::UnknownAction(other.action_name().to_string())),
        }
    }
}

impl ClientMessage {
    fn action_name(&self) -> &'static str {
        match self {
            ClientMessage::Subscribe { .. } => "subscribe",
            ClientMessage::Unsubscribe { .. } => "unsubscribe",
            ClientMessage::Publish { .. } => "publish",
        }
    }
}

/// Parse a raw message body, matching top-level field names
/// case-insensitively (`Topic` and `topic` are the same field).
pub fn parse_client_message(body: &str) -> Result<ClientMessage> {
    let value: Value = serde_json::from_str(body).map_err(Error::Malformed)?;
    let object = value.as_object().ok_or(Error::NotAnObject)?;

    // Normalize keys once; later duplicates win, matching typical JSON parsers.
    let mut fields = serde_json::Map::with_capacity(object.len());
    for (key, value) in object {
        fields.insert(key.to_ascii_lowercase(), value.clone());
    }

    let action = fields
        .get("action")
        .and_then(Value::as_str)
        .ok_or(Error::MissingAction)?;

    match action {
        "subscribe" => Ok(ClientMessage::Subscribe {
            topic: required_string(&fields, "topic")?,
        }),
        "unsubscribe" => Ok(ClientMessage::Unsubscribe {
            topic: required_string(&fields, "topic")?,
        }),
        "publish" => Ok(ClientMessage::Publish {
            topic: required_string(&fields, "topic")?,
            message: required_string(&fields, "message")?,
        }),
        other => Err(Error::UnknownAction(other.to_string())),
    }
}

fn required_string(fields: &serde_json::Map<String, Value>, name: &'static str) -> Result<String> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(Error::MissingField(name))
}
