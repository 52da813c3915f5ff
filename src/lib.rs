//! kafkastore: a key-value store backed by a compacted Kafka topic
//!
//! Every mutation is appended to a single-partition, compacted changelog
//! topic. Each process keeps a local cache that a background task rebuilds
//! from the start of that topic and then keeps current, so any number of
//! instances share one consistent state without a database.
//!
//! A writer reads its own writes: `put` and `delete` return only after this
//! instance has applied the record they produced.
//!
//! Start with [`KafkaStore::builder`] and a [`StoreConfig`].

pub mod config; // Store configuration and client properties
pub mod kafka; // Changelog store implementation

// Test utilities (only compiled in test builds)
#[cfg(test)]
pub mod testing;

pub use config::{ClientProperties, StoreConfig};
pub use kafka::{
    ConfigError, InMemoryCache, JsonSerializer, KafkaStore, KafkaStoreBuilder, LocalCache,
    LogError, LogPlatform, MemoryLog, RdKafkaPlatform, Result, Serializer, StoreError, StoreState,
    StoreUpdateHandler, StringSerializer,
};
