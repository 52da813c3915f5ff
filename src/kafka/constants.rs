//! Store constants
//!
//! This module centralizes the defaults and limits used by the changelog store.
//! Using named constants keeps the config layer, the topic admin and the tests
//! in agreement about what "default" means.
//!
//! # Terminology
//! - **Changelog topic**: the compacted Kafka topic that is the store's source of truth
//! - **Tailer**: the background task that replays the changelog into the local cache

// ===== Changelog Topic =====

/// Default name of the changelog topic
pub const DEFAULT_TOPIC: &str = "_kafkastore";

/// The only partition the store ever writes to or reads from
pub const CHANGELOG_PARTITION: i32 = 0;

/// Required partition count for the changelog topic
///
/// A single partition gives every mutation a total order, which is what lets
/// independent tailers on different instances converge on the same state.
pub const CHANGELOG_PARTITION_COUNT: i32 = 1;

/// Default replication factor used when the store creates its topic
pub const DEFAULT_REPLICATION_FACTOR: i32 = 3;

/// Minimum replication factor
pub const MIN_REPLICATION_FACTOR: i32 = 1;

/// Maximum topic name length accepted by Kafka
pub const MAX_TOPIC_NAME_LENGTH: usize = 249;

// ===== Topic Config Keys =====

/// Topic config key for the cleanup policy
pub const CLEANUP_POLICY_CONFIG: &str = "cleanup.policy";

/// Cleanup policy value for log compaction
pub const CLEANUP_POLICY_COMPACT: &str = "compact";

/// Cleanup policy value for time/size based deletion
pub const CLEANUP_POLICY_DELETE: &str = "delete";

/// Topic config key for retention
pub const RETENTION_MS_CONFIG: &str = "retention.ms";

// ===== Consumer Group Identity =====

/// Prefix of the generated consumer group id
///
/// A store without an explicit group id gets `kafkastore-<uuid>`.
pub const DEFAULT_GROUP_ID_PREFIX: &str = "kafkastore-";

// ===== Security =====

/// Default security protocol used to pick bootstrap endpoints
pub const DEFAULT_SECURITY_PROTOCOL: &str = "PLAINTEXT";

/// Default SASL mechanism
pub const DEFAULT_SASL_MECHANISM: &str = "PLAIN";

// ===== Timeouts =====

/// Default time a put/delete waits for the tailer to apply its own write (milliseconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Minimum operation timeout (milliseconds)
pub const MIN_TIMEOUT_MS: u64 = 1;

/// Default time init() waits for the initial catch-up (milliseconds)
pub const DEFAULT_INIT_TIMEOUT_MS: u64 = 60_000;

/// Timeout for admin and metadata requests (milliseconds)
pub const DEFAULT_ADMIN_TIMEOUT_MS: u64 = 10_000;

/// Delivery timeout handed to librdkafka for a single append (milliseconds)
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 30_000;

/// Flush timeout used when the store closes its producer (milliseconds)
pub const DEFAULT_CLOSE_FLUSH_TIMEOUT_MS: u64 = 5_000;

// ===== Retries =====

/// Default number of retries for a transient append failure
pub const DEFAULT_MAX_APPEND_RETRIES: usize = 5;

/// Default number of consecutive transient consume failures the tailer tolerates
pub const DEFAULT_MAX_CONSUME_RETRIES: usize = 10;

/// Default initial retry backoff (milliseconds)
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;

/// Maximum retry backoff (milliseconds)
pub const MAX_RETRY_BACKOFF_MS: u64 = 10_000;

// ===== Environment Variables =====

/// Prefix of every environment variable read by `StoreConfig::from_env`
pub const ENV_PREFIX: &str = "KAFKASTORE_";
