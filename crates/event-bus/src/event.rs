use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{EventBusError, Result};

/// Unique identifier for a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a message within one partition of a topic.
///
/// Offsets start at 0 for the first message and increase by 1. A committed
/// offset names the next message a consumer group will read.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Offset(u64);

impl Offset {
    /// Creates an offset from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the offset of the first message in a partition.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the next offset.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw offset value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message to be published, before the bus assigns it a position.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub topic: String,
    pub key: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub headers: HashMap<String, String>,
}

impl Record {
    /// Creates a new record builder.
    pub fn builder() -> RecordBuilder {
        RecordBuilder::default()
    }
}

/// Builder for constructing records.
#[derive(Debug, Default)]
pub struct RecordBuilder {
    topic: Option<String>,
    key: Option<String>,
    event_type: Option<String>,
    payload: Option<serde_json::Value>,
    headers: HashMap<String, String>,
}

impl RecordBuilder {
    /// Sets the destination topic.
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Sets the partitioning key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: Serialize + ?Sized>(mut self, payload: &T) -> Result<Self> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Adds a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Builds the record, failing on the first missing required field.
    pub fn build(self) -> Result<Record> {
        Ok(Record {
            topic: self.topic.ok_or(EventBusError::MissingField("topic"))?,
            key: self.key.ok_or(EventBusError::MissingField("key"))?,
            event_type: self
                .event_type
                .ok_or(EventBusError::MissingField("event_type"))?,
            payload: self.payload.ok_or(EventBusError::MissingField("payload"))?,
            headers: self.headers,
        })
    }
}

/// A message as stored on, and delivered from, a topic partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique identifier for this message.
    pub message_id: MessageId,

    /// Topic the message was published to.
    pub topic: String,

    /// Partitioning key; all messages with one key share a partition.
    pub key: String,

    /// Partition the key hashed to.
    pub partition: u32,

    /// Position within the partition.
    pub offset: Offset,

    /// The type of the event (e.g., "OrderCreated").
    pub event_type: String,

    /// When the message was appended.
    pub timestamp: DateTime<Utc>,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// Free-form string headers.
    pub headers: HashMap<String, String>,
}

impl EventEnvelope {
    /// Places a record at a concrete position.
    pub fn from_record(record: Record, partition: u32, offset: Offset) -> Self {
        Self {
            message_id: MessageId::new(),
            topic: record.topic,
            key: record.key,
            partition,
            offset,
            event_type: record.event_type,
            timestamp: Utc::now(),
            payload: record.payload,
            headers: record.headers,
        }
    }

    /// Deserializes the JSON payload into the target type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}
