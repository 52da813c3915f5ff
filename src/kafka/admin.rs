//! Changelog topic administration
//!
//! Before a store reads or writes anything, [`ChangelogTopicAdmin`] makes sure
//! the changelog topic exists and is safe to use as a source of truth:
//!
//! - `cleanup.policy` includes `compact` and not `delete`, so the latest
//!   value of every key is retained forever
//! - exactly one partition, so all mutations share one total order
//!
//! A missing topic is created with those settings. An existing topic that
//! breaks either rule fails initialization; nothing is altered in place.
//!
//! The admin also turns the cluster's broker listeners into the bootstrap
//! list the producer and consumer connect with.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::constants::{
    CHANGELOG_PARTITION_COUNT, CLEANUP_POLICY_COMPACT, CLEANUP_POLICY_CONFIG,
    CLEANUP_POLICY_DELETE, RETENTION_MS_CONFIG,
};
use super::endpoints::{brokers_to_endpoints, endpoints_to_bootstrap_servers};
use super::error::{Result, StoreError};
use super::platform::{ChangelogAdmin, LogError, NewTopicSpec, TopicDescription};
use crate::config::{canonical_protocol, StoreConfig};

/// Verifies, creates and locates the changelog topic
pub struct ChangelogTopicAdmin {
    admin: Arc<dyn ChangelogAdmin>,
    topic: String,
    replication_factor: i32,
    security_protocol: String,
}

impl ChangelogTopicAdmin {
    pub fn new(admin: Arc<dyn ChangelogAdmin>, config: &StoreConfig) -> Self {
        Self {
            admin,
            topic: config.topic.clone(),
            replication_factor: config.replication_factor,
            security_protocol: canonical_protocol(&config.security_protocol),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Make sure the changelog topic exists with a valid configuration
    ///
    /// # Errors
    /// - [`StoreError::InvalidChangelogTopic`] if an existing topic is not
    ///   compacted or has more than one partition
    /// - [`StoreError::Initialization`] if the cluster cannot be queried or
    ///   the topic cannot be created
    pub async fn ensure_topic(&self) -> Result<()> {
        let description = self
            .admin
            .describe_topic(&self.topic)
            .await
            .map_err(|e| self.init_error("describe", e))?;

        match description {
            Some(description) => {
                debug!("Changelog topic {} exists, verifying", self.topic);
                self.verify(&description)
            }
            None => self.create().await,
        }
    }

    async fn create(&self) -> Result<()> {
        let live_brokers = self
            .admin
            .brokers()
            .await
            .map_err(|e| self.init_error("list brokers for", e))?
            .iter()
            .map(|b| b.id)
            .collect::<BTreeSet<_>>()
            .len() as i32;

        if live_brokers == 0 {
            return Err(StoreError::Initialization(format!(
                "no live brokers available to create changelog topic {}",
                self.topic
            )));
        }

        let mut replication_factor = self.replication_factor;
        if live_brokers < replication_factor {
            warn!(
                "Creating changelog topic {} with replication factor {} instead of {}: only {} live broker(s)",
                self.topic, live_brokers, replication_factor, live_brokers
            );
            replication_factor = live_brokers;
        }

        let spec = NewTopicSpec {
            name: self.topic.clone(),
            partitions: CHANGELOG_PARTITION_COUNT,
            replication_factor,
            configs: BTreeMap::from([(
                CLEANUP_POLICY_CONFIG.to_string(),
                CLEANUP_POLICY_COMPACT.to_string(),
            )]),
        };

        info!(
            "Creating changelog topic {} (partitions={}, replication_factor={})",
            self.topic, spec.partitions, spec.replication_factor
        );

        match self.admin.create_topic(&spec).await {
            Ok(()) => Ok(()),
            Err(LogError::TopicAlreadyExists(_)) => {
                // Another instance won the race; its topic still has to pass
                info!(
                    "Changelog topic {} was created concurrently, verifying",
                    self.topic
                );
                let description = self
                    .admin
                    .describe_topic(&self.topic)
                    .await
                    .map_err(|e| self.init_error("describe", e))?
                    .ok_or_else(|| {
                        StoreError::Initialization(format!(
                            "changelog topic {} reported as existing but cannot be described",
                            self.topic
                        ))
                    })?;
                self.verify(&description)
            }
            Err(e) => Err(self.init_error("create", e)),
        }
    }

    /// Check an existing topic against the changelog requirements
    pub fn verify(&self, description: &TopicDescription) -> Result<()> {
        let policies = description.cleanup_policies();
        let compacted = policies.iter().any(|p| p == CLEANUP_POLICY_COMPACT);
        let deleting = policies.iter().any(|p| p == CLEANUP_POLICY_DELETE);
        if !compacted || deleting {
            return Err(StoreError::InvalidChangelogTopic {
                topic: self.topic.clone(),
                reason: format!(
                    "{} must be '{}' but is '{}'",
                    CLEANUP_POLICY_CONFIG,
                    CLEANUP_POLICY_COMPACT,
                    policies.join(",")
                ),
            });
        }

        if description.partitions != CHANGELOG_PARTITION_COUNT {
            return Err(StoreError::InvalidChangelogTopic {
                topic: self.topic.clone(),
                reason: format!(
                    "must have exactly {} partition but has {}",
                    CHANGELOG_PARTITION_COUNT, description.partitions
                ),
            });
        }

        if description.replication_factor < self.replication_factor {
            warn!(
                "Changelog topic {} has replication factor {}, lower than the configured {}",
                self.topic, description.replication_factor, self.replication_factor
            );
        }

        if let Some(retention) = description.config(RETENTION_MS_CONFIG) {
            if retention != "-1" {
                warn!(
                    "Changelog topic {} has {}={}; compaction keeps the latest value per key regardless",
                    self.topic, RETENTION_MS_CONFIG, retention
                );
            }
        }

        Ok(())
    }

    /// Bootstrap list for the data clients, from the cluster's live brokers
    ///
    /// # Errors
    /// [`StoreError::EndpointResolution`] if no broker listens with the
    /// configured security protocol.
    pub async fn resolve_bootstrap_servers(&self) -> Result<String> {
        let brokers = self
            .admin
            .brokers()
            .await
            .map_err(|e| StoreError::Initialization(format!("failed to list brokers: {}", e)))?;

        let endpoints = brokers_to_endpoints(&brokers);
        let bootstrap = endpoints_to_bootstrap_servers(&endpoints, &self.security_protocol)
            .map_err(StoreError::EndpointResolution)?;

        debug!("Resolved bootstrap servers: {}", bootstrap);
        Ok(bootstrap)
    }

    fn init_error(&self, action: &str, err: LogError) -> StoreError {
        StoreError::Initialization(format!(
            "failed to {} changelog topic {}: {}",
            action, self.topic, err
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::endpoints::{BrokerListener, SecurityProtocol};
    use crate::kafka::platform::{LogResult, MemoryLog};
    use crate::testing::mock_config;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Admin that misses the topic on the first describe, and sees another
    /// instance create it just before its own create request lands
    struct LosingRaceAdmin {
        log: MemoryLog,
        winner_policy: &'static str,
        described: AtomicBool,
    }

    #[async_trait]
    impl ChangelogAdmin for LosingRaceAdmin {
        async fn describe_topic(&self, topic: &str) -> LogResult<Option<TopicDescription>> {
            if !self.described.swap(true, Ordering::SeqCst) {
                return Ok(None);
            }
            self.log.describe_topic(topic).await
        }

        async fn create_topic(&self, spec: &NewTopicSpec) -> LogResult<()> {
            self.log
                .create_topic_with(&spec.name, 1, 1, &[("cleanup.policy", self.winner_policy)]);
            self.log.create_topic(spec).await
        }

        async fn brokers(&self) -> LogResult<Vec<BrokerListener>> {
            self.log.brokers().await
        }

        async fn high_watermark(&self, topic: &str, partition: i32) -> LogResult<i64> {
            self.log.high_watermark(topic, partition).await
        }
    }

    fn racing_admin(winner_policy: &'static str, config: &StoreConfig) -> ChangelogTopicAdmin {
        let admin = LosingRaceAdmin {
            log: MemoryLog::new(),
            winner_policy,
            described: AtomicBool::new(false),
        };
        ChangelogTopicAdmin::new(Arc::new(admin), config)
    }

    fn admin_for(log: &MemoryLog, config: &StoreConfig) -> ChangelogTopicAdmin {
        ChangelogTopicAdmin::new(Arc::new(log.clone()), config)
    }

    fn three_brokers() -> MemoryLog {
        MemoryLog::with_brokers(
            (0..3)
                .map(|id| {
                    BrokerListener::new(
                        id,
                        format!("broker{}", id),
                        9092,
                        "PLAINTEXT",
                        SecurityProtocol::Plaintext,
                    )
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_creates_missing_topic() {
        let log = three_brokers();
        let config = mock_config().replication_factor(3);

        admin_for(&log, &config).ensure_topic().await.unwrap();

        let description = log.describe_topic(&config.topic).await.unwrap().unwrap();
        assert_eq!(description.partitions, 1);
        assert_eq!(description.replication_factor, 3);
        assert_eq!(description.cleanup_policies(), vec!["compact"]);
    }

    #[tokio::test]
    async fn test_caps_replication_at_live_brokers() {
        let log = MemoryLog::new();
        let config = mock_config().replication_factor(3);

        admin_for(&log, &config).ensure_topic().await.unwrap();

        let description = log.describe_topic(&config.topic).await.unwrap().unwrap();
        assert_eq!(description.replication_factor, 1);
    }

    #[tokio::test]
    async fn test_accepts_valid_existing_topic() {
        let log = MemoryLog::new();
        let config = mock_config();
        log.create_topic_with(&config.topic, 1, 1, &[("cleanup.policy", "compact")]);

        assert!(admin_for(&log, &config).ensure_topic().await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_delete_policy() {
        let log = MemoryLog::new();
        let config = mock_config();
        log.create_topic_with(&config.topic, 1, 1, &[("cleanup.policy", "delete")]);

        let err = admin_for(&log, &config).ensure_topic().await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidChangelogTopic { .. }));
        assert!(err.is_initialization_error());
    }

    #[tokio::test]
    async fn test_rejects_compact_and_delete() {
        let log = MemoryLog::new();
        let config = mock_config();
        log.create_topic_with(
            &config.topic,
            1,
            1,
            &[("cleanup.policy", "compact,delete")],
        );

        assert!(matches!(
            admin_for(&log, &config).ensure_topic().await,
            Err(StoreError::InvalidChangelogTopic { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_unset_policy() {
        let log = MemoryLog::new();
        let config = mock_config();
        log.create_topic_with(&config.topic, 1, 1, &[]);

        assert!(matches!(
            admin_for(&log, &config).ensure_topic().await,
            Err(StoreError::InvalidChangelogTopic { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_multiple_partitions() {
        let log = MemoryLog::new();
        let config = mock_config();
        log.create_topic_with(&config.topic, 3, 1, &[("cleanup.policy", "compact")]);

        let err = admin_for(&log, &config).ensure_topic().await.unwrap_err();
        match err {
            StoreError::InvalidChangelogTopic { reason, .. } => assert!(reason.contains("3")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_bootstrap_servers() {
        let log = MemoryLog::with_brokers(vec![
            BrokerListener::new(0, "a", 9092, "PLAINTEXT", SecurityProtocol::Plaintext),
            BrokerListener::new(0, "a", 9093, "SSL", SecurityProtocol::Ssl),
            BrokerListener::new(1, "b", 9092, "PLAINTEXT", SecurityProtocol::Plaintext),
        ]);

        let plaintext = admin_for(&log, &mock_config());
        assert_eq!(
            plaintext.resolve_bootstrap_servers().await.unwrap(),
            "PLAINTEXT://a:9092,PLAINTEXT://b:9092"
        );

        let ssl = admin_for(&log, &mock_config().security_protocol("SSL"));
        assert_eq!(ssl.resolve_bootstrap_servers().await.unwrap(), "SSL://a:9093");
    }

    #[tokio::test]
    async fn test_resolve_with_lower_case_protocol_field() {
        let log = MemoryLog::new();
        let mut config = mock_config();
        config.security_protocol = "plaintext".to_string();

        let admin = admin_for(&log, &config);
        assert_eq!(
            admin.resolve_bootstrap_servers().await.unwrap(),
            "PLAINTEXT://localhost:9092"
        );
    }

    #[tokio::test]
    async fn test_resolve_without_matching_listener() {
        let log = MemoryLog::new();
        let admin = admin_for(&log, &mock_config().security_protocol("SASL_SSL"));

        assert!(matches!(
            admin.resolve_bootstrap_servers().await,
            Err(StoreError::EndpointResolution(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_creation_is_verified() {
        let config = mock_config();
        assert!(racing_admin("compact", &config).ensure_topic().await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_creation_with_bad_policy_fails() {
        let config = mock_config();
        assert!(matches!(
            racing_admin("delete", &config).ensure_topic().await,
            Err(StoreError::InvalidChangelogTopic { .. })
        ));
    }
}
