//! Kafka integration tests
//!
//! These tests share one Kafka container. Run with:
//!
//! ```bash
//! cargo test -p event-bus --test kafka_integration -- --test-threads=1
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use event_bus::{
    ConsumerConfig, EventBus, EventBusExt, EventEnvelope, KafkaConfig, KafkaEventBus,
    KafkaGroupConsumer, MessageHandler, Record,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::kafka::{KAFKA_PORT, Kafka};
use tokio::sync::{Mutex, OnceCell, watch};

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Kafka>,
    brokers: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn kafka_config() -> KafkaConfig {
    let info = CONTAINER
        .get_or_init(|| async {
            let container = Kafka::default().start().await.unwrap();
            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(KAFKA_PORT).await.unwrap();

            Arc::new(ContainerInfo {
                container,
                brokers: format!("{}:{}", host, port),
            })
        })
        .await
        .clone();

    KafkaConfig {
        brokers: info.brokers.clone(),
        message_timeout: Duration::from_secs(30),
        ..KafkaConfig::default()
    }
}

fn unique_topic() -> String {
    format!("topic-{}", uuid::Uuid::new_v4())
}

fn consumer_config(topic: &str) -> ConsumerConfig {
    ConsumerConfig::new(topic, format!("group-{}", uuid::Uuid::new_v4()))
        .with_redelivery_delay(Duration::from_millis(50))
}

#[derive(Default)]
struct Collect {
    seen: Mutex<Vec<EventEnvelope>>,
    failures_left: Mutex<u32>,
}

#[async_trait]
impl MessageHandler for Collect {
    type Error = String;

    async fn handle(&self, envelope: &EventEnvelope) -> Result<(), String> {
        let mut failures = self.failures_left.lock().await;
        if *failures > 0 {
            *failures -= 1;
            return Err("not yet".to_string());
        }
        self.seen.lock().await.push(envelope.clone());
        Ok(())
    }
}

async fn wait_for(handler: &Collect, count: usize) -> Vec<EventEnvelope> {
    for _ in 0..300 {
        {
            let seen = handler.seen.lock().await;
            if seen.len() >= count {
                return seen.clone();
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("expected {} records", count);
}

#[tokio::test]
async fn published_records_reach_the_group_in_key_order() {
    let kafka = kafka_config().await;
    let topic = unique_topic();
    let bus = KafkaEventBus::new(&kafka).unwrap();

    for n in 0..3 {
        bus.publish_json(&topic, "order-7", "OrderCreated", &serde_json::json!({ "n": n }))
            .await
            .unwrap();
    }

    let handler = Arc::new(Collect::default());
    let consumer =
        KafkaGroupConsumer::new(&kafka, handler.clone(), consumer_config(&topic)).unwrap();
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(consumer.run(stop_rx));

    let seen = wait_for(&handler, 3).await;
    stop_tx.send(true).unwrap();
    task.await.unwrap().unwrap();

    let numbers: Vec<_> = seen.iter().map(|e| e.payload["n"].as_i64()).collect();
    assert_eq!(numbers, vec![Some(0), Some(1), Some(2)]);
    assert!(seen.iter().all(|e| e.key == "order-7"));
    assert!(seen.iter().all(|e| e.event_type == "OrderCreated"));
}

#[tokio::test]
async fn failing_record_is_retried_before_the_next_one() {
    let kafka = kafka_config().await;
    let topic = unique_topic();
    let bus = KafkaEventBus::new(&kafka).unwrap();

    let first = Record::builder()
        .topic(&topic)
        .key("k")
        .event_type("Numbered")
        .payload_raw(serde_json::json!({ "n": 1 }))
        .header("trace_id", "t-1")
        .build()
        .unwrap();
    bus.publish(first).await.unwrap();
    bus.publish_json(&topic, "k", "Numbered", &serde_json::json!({ "n": 2 }))
        .await
        .unwrap();

    let handler = Arc::new(Collect {
        failures_left: Mutex::new(2),
        ..Collect::default()
    });
    let consumer =
        KafkaGroupConsumer::new(&kafka, handler.clone(), consumer_config(&topic)).unwrap();
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(consumer.run(stop_rx));

    let seen = wait_for(&handler, 2).await;
    stop_tx.send(true).unwrap();
    task.await.unwrap().unwrap();

    assert_eq!(seen[0].payload["n"], 1);
    assert_eq!(seen[0].headers["trace_id"], "t-1");
    assert_eq!(seen[1].payload["n"], 2);
}
