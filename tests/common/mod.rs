//! Shared fixtures for the integration tests
//!
//! Stores here run over a [`MemoryLog`], so nothing needs a broker.

#![allow(dead_code)]

use std::sync::Arc;

use kafkastore::{
    InMemoryCache, KafkaStore, LocalCache, MemoryLog, StoreConfig, StringSerializer,
};

/// Config with short retries and a replication factor a single broker can satisfy
pub fn test_config() -> StoreConfig {
    StoreConfig::new("localhost:9092")
        .replication_factor(1)
        .timeout_ms(5_000)
        .init_timeout_ms(5_000)
        .retry_backoff_ms(1)
}

/// Uninitialized String store over `log`
pub fn memory_store(log: &MemoryLog, config: StoreConfig) -> KafkaStore<String, String> {
    KafkaStore::builder(config, StringSerializer)
        .platform(log.clone())
        .build()
        .expect("valid test config")
}

/// Initialized String store over `log`, writing into `cache`
pub async fn init_store_with_cache(
    log: &MemoryLog,
    config: StoreConfig,
    cache: Arc<InMemoryCache<String, String>>,
) -> KafkaStore<String, String> {
    let store = KafkaStore::builder(config, StringSerializer)
        .platform(log.clone())
        .cache(cache as Arc<dyn LocalCache<String, String>>)
        .build()
        .expect("valid test config");
    store.init().await.expect("store init");
    store
}

/// Create the config's topic by hand with the given layout
pub fn create_topic(log: &MemoryLog, config: &StoreConfig, partitions: i32, cleanup_policy: &str) {
    log.create_topic_with(
        &config.topic,
        partitions,
        1,
        &[("cleanup.policy", cleanup_policy)],
    );
}

/// Shorthand for owned String keys and values
pub fn s(value: &str) -> String {
    value.to_string()
}
