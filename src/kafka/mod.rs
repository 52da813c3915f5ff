// Changelog store implementation module
//
// This module contains everything between the caller and the Kafka cluster:
// - Endpoint resolution (broker listeners → bootstrap list)
// - Changelog topic verification and creation
// - The writer that appends mutations and the tailer that replays them
// - The store that ties both together behind get/put/delete
//
// Architecture Overview:
// =====================
//
//   caller ──put/delete──► KafkaStore ──append──► LogWriter ──► changelog topic
//     ▲                        │                                     │
//     │                  wait_for_offset                              │ poll
//     │                        ▼                                     ▼
//     └───────get────── LocalCache ◄──────apply────────── ChangelogTailer
//
// The changelog topic is the only durable state. Every instance replays it
// from the beginning on startup, so instances converge on the same cache.
//
// The platform submodule is the seam to the cluster: librdkafka in
// production, an in-memory log in tests.

pub mod admin;
pub mod cache;
pub mod constants;
pub mod endpoints;
pub mod error;
pub mod handler;
pub mod platform;
pub mod retry;
pub mod serializer;
pub mod store;
pub mod tailer;
pub mod writer;

// Re-export commonly used types for convenience
pub use admin::ChangelogTopicAdmin;
pub use cache::{InMemoryCache, LocalCache};
pub use endpoints::{
    brokers_to_endpoints, endpoints_to_bootstrap_servers, BrokerListener, SecurityProtocol,
};
pub use error::{ConfigError, Result, StoreError};
pub use handler::StoreUpdateHandler;
pub use platform::{LogError, LogPlatform, MemoryLog, RdKafkaPlatform};
pub use serializer::{JsonSerializer, Serializer, StringSerializer};
pub use store::{KafkaStore, KafkaStoreBuilder, StoreState};
pub use tailer::{ChangelogTailer, TailerState};
pub use writer::LogWriter;
