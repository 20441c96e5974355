use async_trait::async_trait;
use serde::Serialize;

use crate::{EventEnvelope, Offset, Record, Result};

/// Where a published record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMetadata {
    pub partition: u32,
    pub offset: Offset,
}

/// Core trait for event bus implementations.
///
/// Records with the same key always land on the same partition of their
/// topic and are delivered in publish order.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Appends a record to its topic and returns its position.
    async fn publish(&self, record: Record) -> Result<RecordMetadata>;
}

/// A bus whose partitions can be read back directly.
///
/// Every topic has the same fixed number of partitions. Consumer groups track
/// their own committed offset per partition, so every group sees every record.
/// [`GroupConsumer`](crate::GroupConsumer) drives delivery on top of it.
#[async_trait]
pub trait PartitionedLog: EventBus {
    /// Number of partitions every topic on this bus has.
    fn partition_count(&self) -> u32;

    /// Reads up to `max` records from one partition, starting at `from`.
    ///
    /// Records are returned in offset order. An unknown topic reads as empty.
    async fn fetch(
        &self,
        topic: &str,
        partition: u32,
        from: Offset,
        max: usize,
    ) -> Result<Vec<EventEnvelope>>;

    /// Returns the next offset the group will read on a partition.
    async fn committed_offset(&self, topic: &str, group: &str, partition: u32) -> Result<Offset>;

    /// Records that the group finished every record before `next`.
    async fn commit(&self, topic: &str, group: &str, partition: u32, next: Offset) -> Result<()>;
}

/// Extension trait providing convenience methods for event buses.
#[async_trait]
pub trait EventBusExt: EventBus {
    /// Serializes `payload` and publishes it under `key`.
    async fn publish_json<T>(
        &self,
        topic: &str,
        key: &str,
        event_type: &str,
        payload: &T,
    ) -> Result<RecordMetadata>
    where
        T: Serialize + Sync + ?Sized,
    {
        let record = Record::builder()
            .topic(topic)
            .key(key)
            .event_type(event_type)
            .payload(payload)?
            .build()?;
        self.publish(record).await
    }
}

// Blanket implementation for all EventBus implementations
impl<T: EventBus + ?Sized> EventBusExt for T {}

/// Maps a key to a partition.
///
/// Uses 64-bit FNV-1a so the assignment is stable across processes and
/// releases.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    if partitions <= 1 {
        return 0;
    }

    let hash = key.bytes().fold(OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(PRIME)
    });
    (hash % u64::from(partitions)) as u32
}
