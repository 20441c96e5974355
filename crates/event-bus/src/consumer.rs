//! Consumer-group delivery loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::watch;

use crate::bus::PartitionedLog;
use crate::{EventBusError, EventEnvelope, Result};

/// Handles records delivered to a consumer group.
///
/// Delivery is at-least-once: a record whose handler returns an error is not
/// committed and will be delivered again, as will any record in flight when the
/// process stops. Handlers must tolerate seeing the same record twice.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    type Error: std::fmt::Display + Send;

    /// Processes one record.
    async fn handle(&self, envelope: &EventEnvelope) -> std::result::Result<(), Self::Error>;
}

/// Settings for a [`GroupConsumer`].
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub topic: String,
    pub group: String,
    /// Sleep between polls of an idle partition.
    pub poll_interval: Duration,
    /// Maximum records fetched per poll.
    pub batch_size: usize,
    /// Sleep before redelivering a record whose handler failed.
    pub redelivery_delay: Duration,
}

impl ConsumerConfig {
    pub fn new(topic: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            group: group.into(),
            poll_interval: Duration::from_millis(100),
            batch_size: 32,
            redelivery_delay: Duration::from_millis(500),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = delay;
        self
    }
}

/// Outcome of one poll of one partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Progress {
    processed: usize,
    stalled: bool,
}

/// Feeds one topic to a handler on behalf of a consumer group.
///
/// Each partition is read by a single sequential worker, so records sharing a
/// key are handled one at a time in publish order. Different partitions run
/// concurrently.
pub struct GroupConsumer<B: PartitionedLog, H: MessageHandler> {
    bus: Arc<B>,
    handler: Arc<H>,
    config: ConsumerConfig,
}

impl<B, H> GroupConsumer<B, H>
where
    B: PartitionedLog + 'static,
    H: MessageHandler,
{
    pub fn new(bus: Arc<B>, handler: Arc<H>, config: ConsumerConfig) -> Self {
        Self {
            bus,
            handler,
            config,
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Runs one worker per partition until `shutdown` flips to `true`.
    #[tracing::instrument(skip(self, shutdown), fields(topic = %self.config.topic, group = %self.config.group))]
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let consumer = Arc::new(self);
        let partitions = consumer.bus.partition_count();

        tracing::info!(partitions, "consumer started");

        let workers = (0..partitions).map(|partition| {
            let consumer = Arc::clone(&consumer);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { consumer.run_partition(partition, shutdown).await })
        });

        for joined in join_all(workers).await {
            joined.map_err(|e| EventBusError::Worker(e.to_string()))?;
        }

        tracing::info!("consumer stopped");
        Ok(())
    }

    /// Handles every record currently available on every partition, then
    /// returns how many were handled.
    ///
    /// A partition stops at its first failing record; that record stays
    /// uncommitted.
    #[tracing::instrument(skip(self), fields(topic = %self.config.topic, group = %self.config.group))]
    pub async fn drain(&self) -> Result<usize> {
        let mut total = 0;
        for partition in 0..self.bus.partition_count() {
            loop {
                let progress = self.poll_partition(partition).await?;
                total += progress.processed;
                if progress.stalled || progress.processed == 0 {
                    break;
                }
            }
        }
        Ok(total)
    }

    async fn run_partition(&self, partition: u32, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = match self.poll_partition(partition).await {
                Ok(progress) if progress.stalled => self.config.redelivery_delay,
                Ok(progress) if progress.processed == 0 => self.config.poll_interval,
                Ok(_) => continue,
                Err(e) => {
                    tracing::error!(partition, error = %e, "poll failed");
                    self.config.poll_interval
                }
            };

            if pause(&mut shutdown, delay).await {
                break;
            }
        }
        tracing::debug!(partition, "partition worker stopped");
    }

    async fn poll_partition(&self, partition: u32) -> Result<Progress> {
        let topic = &self.config.topic;
        let group = &self.config.group;

        let from = self.bus.committed_offset(topic, group, partition).await?;
        let batch = self
            .bus
            .fetch(topic, partition, from, self.config.batch_size)
            .await?;

        let mut progress = Progress::default();
        for envelope in batch {
            if let Err(e) = self.handler.handle(&envelope).await {
                tracing::warn!(
                    partition,
                    offset = %envelope.offset,
                    key = %envelope.key,
                    error = %e,
                    "handler failed, record will be redelivered"
                );
                metrics::counter!("bus_redeliveries_total", "topic" => topic.clone())
                    .increment(1);
                progress.stalled = true;
                break;
            }
            self.bus
                .commit(topic, group, partition, envelope.offset.next())
                .await?;
            progress.processed += 1;
        }
        Ok(progress)
    }
}

/// Sleeps for `delay`, returning early with `true` when shutdown is signalled
/// or its sender is gone.
pub(crate) async fn pause(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBusExt;
    use crate::memory::InMemoryEventBus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::RwLock;

    /// Records handled values, optionally failing the first N calls.
    #[derive(Default)]
    struct RecordingHandler {
        seen: RwLock<Vec<(String, i64)>>,
        failures_left: AtomicUsize,
    }

    impl RecordingHandler {
        fn failing(times: usize) -> Self {
            Self {
                seen: RwLock::new(Vec::new()),
                failures_left: AtomicUsize::new(times),
            }
        }
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        type Error = String;

        async fn handle(&self, envelope: &EventEnvelope) -> std::result::Result<(), String> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err("injected failure".to_string());
            }
            let value: i64 = envelope.decode().map_err(|e| e.to_string())?;
            self.seen.write().await.push((envelope.key.clone(), value));
            Ok(())
        }
    }

    fn consumer(
        bus: &Arc<InMemoryEventBus>,
        handler: &Arc<RecordingHandler>,
    ) -> GroupConsumer<InMemoryEventBus, RecordingHandler> {
        GroupConsumer::new(
            Arc::clone(bus),
            Arc::clone(handler),
            ConsumerConfig::new("numbers", "test-group")
                .with_poll_interval(Duration::from_millis(5))
                .with_redelivery_delay(Duration::from_millis(5)),
        )
    }

    #[tokio::test]
    async fn test_drain_delivers_per_key_in_order_and_commits() {
        let bus = Arc::new(InMemoryEventBus::with_partitions(3));
        for n in 0..10i64 {
            let key = if n % 2 == 0 { "even" } else { "odd" };
            bus.publish_json("numbers", key, "Number", &n).await.unwrap();
        }
        let handler = Arc::new(RecordingHandler::default());
        let consumer = consumer(&bus, &handler);

        assert_eq!(consumer.drain().await.unwrap(), 10);

        let seen = handler.seen.read().await.clone();
        let evens: Vec<i64> = seen.iter().filter(|(k, _)| k == "even").map(|(_, v)| *v).collect();
        let odds: Vec<i64> = seen.iter().filter(|(k, _)| k == "odd").map(|(_, v)| *v).collect();
        assert_eq!(evens, vec![0, 2, 4, 6, 8]);
        assert_eq!(odds, vec![1, 3, 5, 7, 9]);

        // Everything committed: a second drain sees nothing.
        assert_eq!(consumer.drain().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_record_is_redelivered() {
        let bus = Arc::new(InMemoryEventBus::with_partitions(1));
        bus.publish_json("numbers", "k", "Number", &1i64).await.unwrap();
        bus.publish_json("numbers", "k", "Number", &2i64).await.unwrap();

        let handler = Arc::new(RecordingHandler::failing(1));
        let consumer = consumer(&bus, &handler);

        // First drain stalls on the first record and commits nothing.
        assert_eq!(consumer.drain().await.unwrap(), 0);
        assert_eq!(
            bus.committed_offset("numbers", "test-group", 0).await.unwrap(),
            crate::Offset::initial()
        );

        assert_eq!(consumer.drain().await.unwrap(), 2);
        assert_eq!(
            handler.seen.read().await.clone(),
            vec![("k".to_string(), 1), ("k".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn test_reset_offsets_replays_records() {
        let bus = Arc::new(InMemoryEventBus::with_partitions(2));
        bus.publish_json("numbers", "a", "Number", &1i64).await.unwrap();

        let handler = Arc::new(RecordingHandler::default());
        let consumer = consumer(&bus, &handler);
        consumer.drain().await.unwrap();

        bus.reset_offsets("numbers", "test-group").await;
        consumer.drain().await.unwrap();

        assert_eq!(handler.seen.read().await.len(), 2);
    }

    #[tokio::test]
    async fn test_run_processes_until_shutdown() {
        let bus = Arc::new(InMemoryEventBus::with_partitions(2));
        let handler = Arc::new(RecordingHandler::failing(2));
        let (tx, rx) = watch::channel(false);

        let task = tokio::spawn(consumer(&bus, &handler).run(rx));

        for n in 0..4i64 {
            bus.publish_json("numbers", &format!("key-{n}"), "Number", &n)
                .await
                .unwrap();
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while handler.seen.read().await.len() < 4 {
            assert!(tokio::time::Instant::now() < deadline, "consumer did not catch up");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tx.send(true).unwrap();
        task.await.unwrap().unwrap();

        let mut values: Vec<i64> = handler.seen.read().await.iter().map(|(_, v)| *v).collect();
        values.sort();
        assert_eq!(values, vec![0, 1, 2, 3]);
    }
}
