use crate::partition::{partition_for_key, Partition, Record};
use pipeline_domain::errors::BusError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const DEFAULT_PARTITIONS: usize = 4;

/// The fixed topic set spec.md:128 names, plus the per-job historical
/// prefix. Anything outside this set is a caller bug (a typo'd topic name
/// or a stage wired to the wrong env var), not a condition to paper over by
/// auto-creating a partition set for it.
const KNOWN_TOPICS: &[&str] = &["trades", "candles", "ta", "news", "news_signals"];
const HISTORICAL_TOPIC_PREFIX: &str = "trades_historical_";

fn is_known_topic(name: &str) -> bool {
    KNOWN_TOPICS.contains(&name) || name.starts_with(HISTORICAL_TOPIC_PREFIX)
}

struct Topic {
    partitions: Vec<Partition>,
}

/// Whether a new consumer group starts replaying from the oldest buffered
/// record or only sees records produced from the moment it subscribes.
/// LIVE ingestion uses `Latest`; HISTORICAL backfill jobs use `Earliest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetReset {
    Earliest,
    Latest,
}

/// The in-process partitioned bus shared by every stage binary in a process.
/// Cheap to clone — internal state lives behind `Arc`s, mirroring the
/// teacher's `EventBus` clone semantics.
#[derive(Clone)]
pub struct Bus {
    topics: Arc<tokio::sync::RwLock<HashMap<String, Arc<Topic>>>>,
    shutting_down: Arc<AtomicBool>,
}

impl Bus {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn topic(&self, name: &str) -> Result<Arc<Topic>, BusError> {
        if !is_known_topic(name) {
            return Err(BusError::UnknownTopic(name.to_string()));
        }
        if let Some(t) = self.topics.read().await.get(name) {
            return Ok(t.clone());
        }
        let mut topics = self.topics.write().await;
        Ok(topics
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Topic {
                    partitions: (0..DEFAULT_PARTITIONS).map(|_| Partition::new()).collect(),
                })
            })
            .clone())
    }

    pub fn producer(&self) -> Producer {
        Producer { bus: self.clone() }
    }

    pub async fn consumer(
        &self,
        topics: Vec<String>,
        group: &str,
        offset_reset: OffsetReset,
    ) -> Result<Consumer, BusError> {
        let mut cursors = Vec::new();
        for name in &topics {
            let topic = self.topic(name).await?;
            for (idx, partition) in topic.partitions.iter().enumerate() {
                let start = match offset_reset {
                    OffsetReset::Earliest => partition.earliest_offset(),
                    OffsetReset::Latest => partition.latest_offset(),
                };
                cursors.push(PartitionCursor {
                    topic_name: name.clone(),
                    topic: topic.clone(),
                    partition_index: idx,
                    offset: start,
                });
            }
        }
        info!(group, ?topics, ?offset_reset, "consumer subscribed");
        Ok(Consumer {
            bus: self.clone(),
            group: group.to_string(),
            cursors,
        })
    }

    /// Requests every consumer loop stop, waiting up to `timeout` for
    /// in-flight work to drain. Mirrors the teacher's task-abort shutdown
    /// pattern: cooperative first, forced after the deadline.
    pub async fn shutdown(&self, timeout: Duration) {
        self.shutting_down.store(true, Ordering::SeqCst);
        tokio::time::sleep(timeout.min(Duration::from_millis(50))).await;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct Producer {
    bus: Bus,
}

impl Producer {
    pub async fn send<T: Serialize>(&self, topic: &str, key: &str, value: &T) -> Result<(), BusError> {
        if self.bus.is_shutting_down() {
            return Err(BusError::ShuttingDown);
        }
        let value = serde_json::to_value(value).map_err(|e| BusError::Encode {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;
        let message_time = value
            .get("timestamp")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);

        let t = self.bus.topic(topic).await?;
        let idx = partition_for_key(key, t.partitions.len());
        let record = Record {
            key: key.to_string(),
            value,
            message_time,
        };
        t.partitions[idx].try_send(topic, idx, record).await
    }
}

struct PartitionCursor {
    topic_name: String,
    topic: Arc<Topic>,
    partition_index: usize,
    offset: u64,
}

pub struct Consumer {
    bus: Bus,
    group: String,
    cursors: Vec<PartitionCursor>,
}

impl Consumer {
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Polls every subscribed partition round-robin and returns the next
    /// record, or `None` once the bus is shutting down and nothing remains.
    pub async fn poll(&mut self) -> Option<(String, serde_json::Value)> {
        if self.cursors.is_empty() {
            return None;
        }
        loop {
            if self.bus.is_shutting_down() {
                return None;
            }
            for cursor in &mut self.cursors {
                let partition = &cursor.topic.partitions[cursor.partition_index];
                if cursor.offset < partition.latest_offset() {
                    let record = partition.read_at(cursor.offset).await?;
                    cursor.offset += 1;
                    tracing::trace!(
                        topic = %cursor.topic_name,
                        partition = cursor.partition_index,
                        message_time = record.message_time,
                        "consumed record"
                    );
                    return Some((record.key, record.value));
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn producer_consumer_round_trip_preserves_fifo_order() {
        let bus = Bus::new();
        let producer = bus.producer();
        let mut consumer = bus.consumer(vec!["trades".into()], "group-a", OffsetReset::Earliest).await.unwrap();

        for i in 0..5 {
            producer
                .send("trades", "BTC", &json!({"timestamp": i, "i": i}))
                .await
                .unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..5 {
            let (_key, value) = consumer.poll().await.unwrap();
            seen.push(value["i"].as_i64().unwrap());
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn latest_offset_reset_skips_history() {
        let bus = Bus::new();
        let producer = bus.producer();
        producer.send("news", "k", &json!({"timestamp": 0})).await.unwrap();

        let mut consumer = bus.consumer(vec!["news".into()], "late-joiner", OffsetReset::Latest).await.unwrap();
        producer.send("news", "k", &json!({"timestamp": 1, "marker": "new"})).await.unwrap();

        let (_key, value) = consumer.poll().await.unwrap();
        assert_eq!(value["marker"], "new");
    }

    #[tokio::test]
    async fn shutdown_unblocks_polling_consumers() {
        let bus = Bus::new();
        let mut consumer = bus.consumer(vec!["ta".into()], "group", OffsetReset::Latest).await.unwrap();
        let bus2 = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            bus2.shutdown(Duration::from_millis(10)).await;
        });
        assert!(consumer.poll().await.is_none());
    }

    #[tokio::test]
    async fn producer_reports_encode_failure_distinctly_from_backpressure() {
        // A map keyed by a non-string type is not representable as a JSON
        // object, so `serde_json` fails to encode it — a stand-in for any
        // value whose `Serialize` impl can fail.
        let mut unencodable: HashMap<(), i32> = HashMap::new();
        unencodable.insert((), 1);

        let bus = Bus::new();
        let producer = bus.producer();
        let err = producer.send("trades", "k", &unencodable).await.unwrap_err();
        assert!(matches!(err, BusError::Encode { topic, .. } if topic == "trades"));
    }

    #[tokio::test]
    async fn producer_rejects_unknown_topic() {
        let bus = Bus::new();
        let producer = bus.producer();
        let err = producer
            .send("not_a_real_topic", "k", &json!({"timestamp": 0}))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::UnknownTopic(t) if t == "not_a_real_topic"));
    }

    #[tokio::test]
    async fn consumer_rejects_unknown_topic_but_accepts_historical_prefix() {
        let bus = Bus::new();
        let result = bus
            .consumer(vec!["not_a_real_topic".into()], "group", OffsetReset::Latest)
            .await;
        assert!(matches!(result, Err(BusError::UnknownTopic(t)) if t == "not_a_real_topic"));

        assert!(bus
            .consumer(vec!["trades_historical_job-1".into()], "group", OffsetReset::Earliest)
            .await
            .is_ok());
    }
}
