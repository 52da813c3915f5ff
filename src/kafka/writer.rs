//! Changelog writer
//!
//! Serializes a mutation and appends it to partition 0 of the changelog,
//! retrying transient failures with [`append_policy`]. The returned offset is
//! what the store then waits for the tailer to apply.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tracing::{trace, warn};

use super::constants::CHANGELOG_PARTITION;
use super::error::{Result, StoreError};
use super::platform::{ChangelogProducer, LogError};
use super::retry::append_policy;
use super::serializer::Serializer;
use crate::config::StoreConfig;

/// Appends records to the changelog topic
pub struct LogWriter<K, V> {
    producer: Arc<dyn ChangelogProducer>,
    serializer: Arc<dyn Serializer<K, V>>,
    topic: String,
    max_retries: usize,
    retry_backoff: Duration,
}

impl<K, V> LogWriter<K, V> {
    pub fn new(
        producer: Arc<dyn ChangelogProducer>,
        serializer: Arc<dyn Serializer<K, V>>,
        config: &StoreConfig,
    ) -> Self {
        Self {
            producer,
            serializer,
            topic: config.topic.clone(),
            max_retries: config.max_append_retries,
            retry_backoff: config.retry_backoff(),
        }
    }

    /// Append `key -> value`, or a tombstone for `key` when `value` is `None`
    ///
    /// Returns the offset the broker assigned.
    ///
    /// # Errors
    /// - [`StoreError::Serialization`] if the key or value cannot be encoded
    /// - [`StoreError::Append`] on a fatal error, or once transient retries
    ///   are exhausted
    pub async fn append(&self, key: &K, value: Option<&V>) -> Result<i64> {
        let key_bytes = self.serializer.serialize_key(key)?;
        let value_bytes = value
            .map(|v| self.serializer.serialize_value(v))
            .transpose()?;

        let attempts = AtomicUsize::new(0);
        let result = (|| async {
            attempts.fetch_add(1, Ordering::Relaxed);
            self.producer
                .send(
                    &self.topic,
                    CHANGELOG_PARTITION,
                    &key_bytes,
                    value_bytes.as_deref(),
                )
                .await
        })
        .retry(append_policy(self.max_retries, self.retry_backoff))
        .when(LogError::is_transient)
        .notify(|err: &LogError, delay: Duration| {
            warn!(
                "Append to {} failed, retrying in {:?}: {}",
                self.topic, delay, err
            );
        })
        .await;

        match result {
            Ok(offset) => {
                trace!(
                    "Appended {} to {} at offset {}",
                    if value_bytes.is_some() { "record" } else { "tombstone" },
                    self.topic,
                    offset
                );
                Ok(offset)
            }
            Err(err) => Err(StoreError::Append {
                topic: self.topic.clone(),
                attempts: attempts.load(Ordering::Relaxed),
                message: err.to_string(),
            }),
        }
    }

    /// Wait for in-flight appends
    pub async fn flush(&self, timeout: Duration) -> Result<()> {
        self.producer.flush(timeout).await?;
        Ok(())
    }
}
