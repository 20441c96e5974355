pub mod bus;
pub mod consumer;
pub mod error;
pub mod event;
pub mod kafka;
pub mod memory;

pub use bus::{EventBus, EventBusExt, PartitionedLog, RecordMetadata, partition_for};
pub use consumer::{ConsumerConfig, GroupConsumer, MessageHandler};
pub use error::{EventBusError, Result};
pub use event::{EventEnvelope, MessageId, Offset, Record, RecordBuilder};
pub use kafka::{KafkaConfig, KafkaEventBus, KafkaGroupConsumer, envelope_from};
pub use memory::{DEFAULT_PARTITIONS, InMemoryEventBus};
