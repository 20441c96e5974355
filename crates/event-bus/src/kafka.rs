//! Kafka-backed bus.
//!
//! Records are published with their key, so Kafka's partitioner keeps every
//! order on one partition. The event type and message id travel as headers;
//! the value is the JSON payload alone.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{Offset as KafkaOffset, TopicPartitionList};
use tokio::sync::watch;

use crate::bus::{EventBus, RecordMetadata};
use crate::consumer::{ConsumerConfig, MessageHandler, pause};
use crate::{EventBusError, EventEnvelope, MessageId, Offset, Record, Result};

/// Header carrying the event type.
pub const EVENT_TYPE_HEADER: &str = "event-type";
/// Header carrying the message id.
pub const MESSAGE_ID_HEADER: &str = "message-id";

/// Connection settings shared by producers and consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    pub brokers: String,
    /// Where a group with no committed offset starts reading.
    pub auto_offset_reset: String,
    /// How long a publish may wait for the broker before failing.
    pub message_timeout: Duration,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            auto_offset_reset: "earliest".to_string(),
            message_timeout: Duration::from_secs(5),
        }
    }
}

/// Publishes records to Kafka.
///
/// Cheap to clone; clones share one producer.
#[derive(Clone)]
pub struct KafkaEventBus {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaEventBus {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set(
                "message.timeout.ms",
                config.message_timeout.as_millis().to_string(),
            )
            .set("enable.idempotence", "true")
            .create()?;

        tracing::info!(brokers = %config.brokers, "kafka producer initialized");
        Ok(Self {
            producer,
            timeout: config.message_timeout,
        })
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    async fn publish(&self, record: Record) -> Result<RecordMetadata> {
        let payload = serde_json::to_vec(&record.payload)?;
        let message_id = MessageId::new().to_string();

        let mut headers = OwnedHeaders::new()
            .insert(Header {
                key: EVENT_TYPE_HEADER,
                value: Some(record.event_type.as_str()),
            })
            .insert(Header {
                key: MESSAGE_ID_HEADER,
                value: Some(message_id.as_str()),
            });
        for (key, value) in &record.headers {
            headers = headers.insert(Header {
                key: key.as_str(),
                value: Some(value.as_str()),
            });
        }

        let kafka_record = FutureRecord::to(&record.topic)
            .key(record.key.as_str())
            .payload(payload.as_slice())
            .headers(headers);

        let delivery = self
            .producer
            .send(kafka_record, self.timeout)
            .await
            .map_err(|(e, _)| EventBusError::Kafka(e))?;

        tracing::debug!(
            topic = %record.topic,
            key = %record.key,
            partition = delivery.partition,
            offset = delivery.offset,
            "record published"
        );
        Ok(RecordMetadata {
            partition: u32::try_from(delivery.partition).unwrap_or_default(),
            offset: Offset::new(u64::try_from(delivery.offset).unwrap_or_default()),
        })
    }
}

/// Converts a consumed Kafka message into an envelope.
///
/// A value that is not JSON is kept as a JSON string, so decoding it into an
/// event fails and the handler sees it as a poison record.
pub fn envelope_from<M: Message>(message: &M) -> EventEnvelope {
    let mut headers = HashMap::new();
    if let Some(raw) = message.headers() {
        for idx in 0..raw.count() {
            let header = raw.get(idx);
            if let Some(value) = header.value
                && let Ok(value) = std::str::from_utf8(value)
            {
                headers.insert(header.key.to_string(), value.to_string());
            }
        }
    }

    let event_type = headers.remove(EVENT_TYPE_HEADER).unwrap_or_default();
    let message_id = headers
        .remove(MESSAGE_ID_HEADER)
        .and_then(|id| id.parse().ok())
        .unwrap_or_default();
    let payload = match message.payload() {
        Some(raw) => serde_json::from_slice(raw).unwrap_or_else(|_| {
            serde_json::Value::String(String::from_utf8_lossy(raw).into_owned())
        }),
        None => serde_json::Value::Null,
    };
    let timestamp = message
        .timestamp()
        .to_millis()
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now);

    EventEnvelope {
        message_id,
        topic: message.topic().to_string(),
        key: message
            .key()
            .map(|key| String::from_utf8_lossy(key).into_owned())
            .unwrap_or_default(),
        partition: u32::try_from(message.partition()).unwrap_or_default(),
        offset: Offset::new(u64::try_from(message.offset()).unwrap_or_default()),
        event_type,
        timestamp,
        payload,
        headers,
    }
}

/// Feeds one Kafka topic to a handler as a member of a consumer group.
///
/// Offsets are committed only after the handler succeeds. A failing record is
/// retried in place after `redelivery_delay`, which keeps later records of its
/// partition behind it; if shutdown arrives first the record stays
/// uncommitted and the group redelivers it.
pub struct KafkaGroupConsumer<H: MessageHandler> {
    consumer: StreamConsumer,
    handler: Arc<H>,
    config: ConsumerConfig,
}

impl<H: MessageHandler> KafkaGroupConsumer<H> {
    /// Joins `config.group` and subscribes to `config.topic`.
    pub fn new(kafka: &KafkaConfig, handler: Arc<H>, config: ConsumerConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &kafka.brokers)
            .set("group.id", &config.group)
            .set("auto.offset.reset", &kafka.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .create()?;
        consumer.subscribe(&[config.topic.as_str()])?;

        tracing::info!(
            brokers = %kafka.brokers,
            topic = %config.topic,
            group = %config.group,
            "kafka consumer subscribed"
        );
        Ok(Self {
            consumer,
            handler,
            config,
        })
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Consumes until `shutdown` flips to `true`.
    ///
    /// The record being handled when shutdown arrives is finished first.
    #[tracing::instrument(skip(self, shutdown), fields(topic = %self.config.topic, group = %self.config.group))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!("consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                received = self.consumer.recv() => received,
            };

            let envelope = match received {
                Ok(message) => envelope_from(&message),
                Err(e) => {
                    tracing::error!(error = %e, "receiving record failed");
                    continue;
                }
            };

            if !self.deliver(&envelope, &mut shutdown).await {
                break;
            }
            if let Err(e) = self.commit(&envelope) {
                tracing::error!(
                    partition = envelope.partition,
                    offset = %envelope.offset,
                    error = %e,
                    "commit failed, record may be redelivered"
                );
            }
        }

        tracing::info!("consumer stopped");
        Ok(())
    }

    /// Handles one record until it succeeds. Returns `false` when shutdown
    /// interrupted the retries.
    async fn deliver(&self, envelope: &EventEnvelope, shutdown: &mut watch::Receiver<bool>) -> bool {
        loop {
            let Err(e) = self.handler.handle(envelope).await else {
                return true;
            };
            tracing::warn!(
                partition = envelope.partition,
                offset = %envelope.offset,
                key = %envelope.key,
                error = %e,
                "handler failed, record will be redelivered"
            );
            metrics::counter!("bus_redeliveries_total", "topic" => self.config.topic.clone())
                .increment(1);

            if pause(shutdown, self.config.redelivery_delay).await {
                return false;
            }
        }
    }

    fn commit(&self, envelope: &EventEnvelope) -> Result<()> {
        let partition =
            i32::try_from(envelope.partition).map_err(|_| EventBusError::UnknownPartition {
                topic: envelope.topic.clone(),
                partition: envelope.partition,
            })?;
        let next = i64::try_from(envelope.offset.next().as_u64()).unwrap_or(i64::MAX);

        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(&envelope.topic, partition, KafkaOffset::Offset(next))?;
        self.consumer.commit(&offsets, CommitMode::Async)?;
        Ok(())
    }
}
