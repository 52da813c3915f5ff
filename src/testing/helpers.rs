//! Test helper functions
//!
//! Fixtures for building stores over a shared in-memory log

use crate::config::StoreConfig;
use crate::kafka::platform::MemoryLog;
use crate::kafka::serializer::StringSerializer;
use crate::kafka::store::KafkaStore;

/// Creates an uninitialized String store over `log`
pub fn memory_store(log: &MemoryLog, config: StoreConfig) -> KafkaStore<String, String> {
    KafkaStore::builder(config, StringSerializer)
        .platform(log.clone())
        .build()
        .expect("valid test config")
}

/// Creates the config's changelog topic up front, compacted with one partition
pub fn compacted_topic(log: &MemoryLog, config: &StoreConfig) {
    log.create_topic_with(&config.topic, 1, 1, &[("cleanup.policy", "compact")]);
}
