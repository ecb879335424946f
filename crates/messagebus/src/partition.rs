use pipeline_domain::errors::BusError;
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone)]
pub struct Record {
    pub key: String,
    pub value: serde_json::Value,
    /// Message time read from `value`'s `timestamp` field, not arrival time.
    pub message_time: i64,
}

const PARTITION_CAPACITY: usize = 4096;

/// A single partition's append-only log. Retains up to `PARTITION_CAPACITY`
/// records so a consumer starting with `OffsetReset::Earliest` can replay
/// from the oldest still-buffered record; beyond that, the producer is
/// backpressured rather than silently dropping history.
pub struct Partition {
    log: Mutex<VecDeque<Record>>,
    next_offset: std::sync::atomic::AtomicU64,
    base_offset: std::sync::atomic::AtomicU64,
    notify: Notify,
}

impl Partition {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(VecDeque::new()),
            next_offset: std::sync::atomic::AtomicU64::new(0),
            base_offset: std::sync::atomic::AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    pub async fn try_send(&self, topic: &str, index: usize, record: Record) -> Result<(), BusError> {
        let mut log = self.log.lock().await;
        if log.len() >= PARTITION_CAPACITY {
            return Err(BusError::Backpressure {
                topic: topic.to_string(),
                partition: index,
                retry_after_secs: 1,
            });
        }
        log.push_back(record);
        self.next_offset.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.notify.notify_waiters();
        Ok(())
    }

    pub fn earliest_offset(&self) -> u64 {
        self.base_offset.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub fn latest_offset(&self) -> u64 {
        self.next_offset.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Returns the record at `offset` once available, waiting for it to be
    /// produced if necessary. Callers must only call this for an `offset`
    /// they know will eventually be produced (e.g. `Consumer::poll` only
    /// calls it once `offset < latest_offset()`) — unlike the rest of this
    /// bus, this call does not itself observe shutdown and will wait
    /// forever for an offset that never arrives.
    pub async fn read_at(&self, offset: u64) -> Option<Record> {
        loop {
            let notified = self.notify.notified();
            {
                let log = self.log.lock().await;
                let base = self.base_offset.load(std::sync::atomic::Ordering::SeqCst);
                if offset >= base {
                    let idx = (offset - base) as usize;
                    if let Some(record) = log.get(idx) {
                        return Some(record.clone());
                    }
                }
            }
            notified.await;
        }
    }
}

pub fn partition_for_key(key: &str, partition_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % partition_count.max(1)
}
