//! An in-process, partitioned, topic-keyed message bus.
//!
//! Generalizes a flat pub/sub fan-out into the Kafka-shaped contract the
//! pipeline's stages are written against: named topics, string keys hashed
//! into a fixed partition count, per-partition FIFO ordering, consumer
//! groups, an offset-reset policy selecting replay-from-earliest vs
//! latest-only-on-start, and a typed backpressure signal naming the
//! saturated (topic, partition).
//!
//! No broker is wired up — brokers are an external collaborator outside this
//! workspace's scope — but every other part of the contract spec.md names is
//! real: records really do flow through bounded per-partition channels in
//! FIFO order, and a full partition really does reject new sends with a
//! typed [`BusError::Backpressure`].

mod bus;
mod partition;

pub use bus::{Bus, Consumer, OffsetReset, Producer};
pub use pipeline_domain::errors::BusError;
