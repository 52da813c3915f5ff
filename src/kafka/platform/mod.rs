//! Log platform seam
//!
//! The store never talks to librdkafka directly. It goes through three small
//! traits, one per client role, and a factory that builds them from client
//! properties:
//!
//! - [`ChangelogAdmin`]: topic describe/create, broker listing, watermarks
//! - [`ChangelogProducer`]: acknowledged single-record appends
//! - [`ChangelogConsumer`]: ordered reads of one partition from the beginning
//! - [`LogPlatform`]: builds the three from a property map
//!
//! [`rdkafka::RdKafkaPlatform`] is the production implementation.
//! [`memory::MemoryLog`] keeps the whole log in process and is used by the
//! test suite and by embedded single-process deployments.

pub mod memory;
pub mod rdkafka;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::constants::{CLEANUP_POLICY_CONFIG, CLEANUP_POLICY_DELETE};
use super::endpoints::BrokerListener;
use crate::config::ClientProperties;

pub use memory::MemoryLog;
pub use self::rdkafka::RdKafkaPlatform;

/// Errors reported by a log platform
///
/// The classification drives retries: only [`LogError::Transient`] is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    /// Broker unreachable, leader moving, request timed out
    #[error("Transient log error: {0}")]
    Transient(String),

    /// Anything retrying will not fix
    #[error("Log error: {0}")]
    Fatal(String),

    /// A create request lost the race with another creator
    #[error("Topic already exists: {0}")]
    TopicAlreadyExists(String),
}

impl LogError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LogError::Transient(_))
    }
}

pub type LogResult<T> = std::result::Result<T, LogError>;

/// A record read back from the changelog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    /// `None` is a tombstone
    pub value: Option<Vec<u8>>,
}

/// What the cluster reports about an existing topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDescription {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i32,
    pub configs: BTreeMap<String, String>,
}

impl TopicDescription {
    /// Cleanup policies of the topic, lower-cased
    ///
    /// An unset `cleanup.policy` means Kafka's default, `delete`.
    pub fn cleanup_policies(&self) -> Vec<String> {
        match self.configs.get(CLEANUP_POLICY_CONFIG) {
            Some(policy) => policy
                .split(',')
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
            None => vec![CLEANUP_POLICY_DELETE.to_string()],
        }
    }

    pub fn config(&self, name: &str) -> Option<&str> {
        self.configs.get(name).map(String::as_str)
    }
}

/// Parameters of a topic to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i32,
    pub configs: BTreeMap<String, String>,
}

/// Topic and cluster administration
#[async_trait]
pub trait ChangelogAdmin: Send + Sync {
    /// Describe a topic, `None` if it does not exist
    async fn describe_topic(&self, topic: &str) -> LogResult<Option<TopicDescription>>;

    /// Create a topic
    ///
    /// Returns [`LogError::TopicAlreadyExists`] if someone else created it first.
    async fn create_topic(&self, spec: &NewTopicSpec) -> LogResult<()>;

    /// Every advertised listener of every live broker
    async fn brokers(&self) -> LogResult<Vec<BrokerListener>>;

    /// Offset the next record appended to the partition will get
    async fn high_watermark(&self, topic: &str, partition: i32) -> LogResult<i64>;
}

/// Acknowledged appends
#[async_trait]
pub trait ChangelogProducer: Send + Sync {
    /// Append one record and wait for the broker to acknowledge it
    ///
    /// `value = None` writes a tombstone. Returns the record's offset.
    async fn send(
        &self,
        topic: &str,
        partition: i32,
        key: &[u8],
        value: Option<&[u8]>,
    ) -> LogResult<i64>;

    /// Wait for in-flight appends
    async fn flush(&self, timeout: Duration) -> LogResult<()>;
}

/// Ordered reads of a single partition
#[async_trait]
pub trait ChangelogConsumer: Send {
    /// Position the consumer at the earliest retained offset of the partition
    fn assign_from_beginning(&mut self, topic: &str, partition: i32) -> LogResult<()>;

    /// Next record, waiting until one is available
    ///
    /// Must be cancel safe: dropping the future loses no record.
    async fn poll(&mut self) -> LogResult<LogRecord>;
}

/// Builds clients for one cluster
pub trait LogPlatform: Send + Sync {
    fn admin(&self, properties: &ClientProperties) -> LogResult<Arc<dyn ChangelogAdmin>>;

    fn producer(&self, properties: &ClientProperties) -> LogResult<Arc<dyn ChangelogProducer>>;

    fn consumer(&self, properties: &ClientProperties) -> LogResult<Box<dyn ChangelogConsumer>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn description(policy: Option<&str>) -> TopicDescription {
        let mut configs = BTreeMap::new();
        if let Some(policy) = policy {
            configs.insert(CLEANUP_POLICY_CONFIG.to_string(), policy.to_string());
        }
        TopicDescription {
            name: "_kafkastore".to_string(),
            partitions: 1,
            replication_factor: 1,
            configs,
        }
    }

    #[test]
    fn test_cleanup_policies() {
        assert_eq!(description(Some("compact")).cleanup_policies(), vec!["compact"]);
        assert_eq!(
            description(Some("Compact, delete")).cleanup_policies(),
            vec!["compact", "delete"]
        );
        assert_eq!(description(None).cleanup_policies(), vec!["delete"]);
    }

    #[test]
    fn test_log_error_classification() {
        assert!(LogError::Transient("broker down".to_string()).is_transient());
        assert!(!LogError::Fatal("auth".to_string()).is_transient());
        assert!(!LogError::TopicAlreadyExists("t".to_string()).is_transient());
    }
}
