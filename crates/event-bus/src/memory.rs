use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    EventBusError, EventEnvelope, Offset, Record, Result,
    bus::{EventBus, PartitionedLog, RecordMetadata, partition_for},
};

/// Default number of partitions per topic.
pub const DEFAULT_PARTITIONS: u32 = 4;

type Partitions = Vec<Vec<EventEnvelope>>;

/// In-process event bus for tests and local runs.
///
/// Keeps every topic as a set of append-only partition logs plus a committed
/// offset per (topic, group, partition). Clones share the same state. Nothing
/// is persisted or trimmed; production deployments use
/// [`KafkaEventBus`](crate::KafkaEventBus).
#[derive(Clone)]
pub struct InMemoryEventBus {
    partitions: u32,
    topics: Arc<RwLock<HashMap<String, Partitions>>>,
    offsets: Arc<RwLock<HashMap<(String, String, u32), Offset>>>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Creates a bus with [`DEFAULT_PARTITIONS`] partitions per topic.
    pub fn new() -> Self {
        Self::with_partitions(DEFAULT_PARTITIONS)
    }

    /// Creates a bus with a fixed partition count (at least one).
    pub fn with_partitions(partitions: u32) -> Self {
        Self {
            partitions: partitions.max(1),
            topics: Arc::new(RwLock::new(HashMap::new())),
            offsets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns every record on a topic, partition by partition.
    pub async fn messages(&self, topic: &str) -> Vec<EventEnvelope> {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|parts| parts.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of records on a topic.
    pub async fn message_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .await
            .get(topic)
            .map(|parts| parts.iter().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Rewinds a group to the start of every partition of a topic.
    ///
    /// Used to simulate redelivery after a consumer crash.
    pub async fn reset_offsets(&self, topic: &str, group: &str) {
        self.offsets
            .write()
            .await
            .retain(|(t, g, _), _| !(t == topic && g == group));
    }

    fn check_partition(&self, topic: &str, partition: u32) -> Result<()> {
        if partition >= self.partitions {
            return Err(EventBusError::UnknownPartition {
                topic: topic.to_string(),
                partition,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, record: Record) -> Result<RecordMetadata> {
        let partition = partition_for(&record.key, self.partitions);

        let mut topics = self.topics.write().await;
        let parts = topics
            .entry(record.topic.clone())
            .or_insert_with(|| vec![Vec::new(); self.partitions as usize]);
        let log = &mut parts[partition as usize];
        let offset = Offset::new(log.len() as u64);
        log.push(EventEnvelope::from_record(record, partition, offset));

        Ok(RecordMetadata { partition, offset })
    }
}

#[async_trait]
impl PartitionedLog for InMemoryEventBus {
    fn partition_count(&self) -> u32 {
        self.partitions
    }

    async fn fetch(
        &self,
        topic: &str,
        partition: u32,
        from: Offset,
        max: usize,
    ) -> Result<Vec<EventEnvelope>> {
        self.check_partition(topic, partition)?;

        let topics = self.topics.read().await;
        let Some(log) = topics.get(topic).and_then(|parts| parts.get(partition as usize)) else {
            return Ok(Vec::new());
        };

        Ok(log
            .iter()
            .skip(from.as_u64() as usize)
            .take(max)
            .cloned()
            .collect())
    }

    async fn committed_offset(&self, topic: &str, group: &str, partition: u32) -> Result<Offset> {
        self.check_partition(topic, partition)?;

        Ok(self
            .offsets
            .read()
            .await
            .get(&(topic.to_string(), group.to_string(), partition))
            .copied()
            .unwrap_or_default())
    }

    async fn commit(&self, topic: &str, group: &str, partition: u32, next: Offset) -> Result<()> {
        self.check_partition(topic, partition)?;

        let mut offsets = self.offsets.write().await;
        let entry = offsets
            .entry((topic.to_string(), group.to_string(), partition))
            .or_default();
        // Commits never move backwards.
        if next > *entry {
            *entry = next;
        }
        Ok(())
    }
}
