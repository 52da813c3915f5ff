//! Log-backed key-value store
//!
//! [`KafkaStore`] is the public face of the crate. Writes go to the changelog
//! topic and return once this instance's tailer has applied them, so a caller
//! always reads its own writes. Reads go straight to the local cache.
//!
//! ```rust,no_run
//! use kafkastore::{KafkaStore, StoreConfig, StringSerializer};
//!
//! # async fn example() -> kafkastore::Result<()> {
//! let config = StoreConfig::new("localhost:9092").topic("_schemas");
//! let store = KafkaStore::builder(config, StringSerializer).build()?;
//! store.init().await?;
//!
//! store.put("subject".to_string(), "v1".to_string()).await?;
//! assert_eq!(store.get(&"subject".to_string())?, Some("v1".to_string()));
//!
//! store.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! Lifecycle: `Uninitialized → Initialized → Closed`. A failed `init()` goes
//! straight to `Closed`; a store is never initialized twice.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::admin::ChangelogTopicAdmin;
use super::cache::{InMemoryCache, LocalCache};
use super::constants::{CHANGELOG_PARTITION, DEFAULT_CLOSE_FLUSH_TIMEOUT_MS, DEFAULT_GROUP_ID_PREFIX};
use super::error::{Result, StoreError};
use super::handler::StoreUpdateHandler;
use super::platform::{ChangelogAdmin, LogPlatform, RdKafkaPlatform};
use super::serializer::Serializer;
use super::tailer::ChangelogTailer;
use super::writer::LogWriter;
use crate::config::StoreConfig;

const UNINITIALIZED: u8 = 0;
const INITIALIZING: u8 = 1;
const INITIALIZED: u8 = 2;
const CLOSED: u8 = 3;

/// Externally visible lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Uninitialized,
    Initialized,
    Closed,
}

/// Clients and tasks that exist only between init and close
struct Components<K, V> {
    admin: Arc<dyn ChangelogAdmin>,
    writer: LogWriter<K, V>,
    tailer: ChangelogTailer<K, V>,
}

impl<K, V> Components<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Stop the tailer, then flush the producer
    async fn shut_down(&self) {
        self.tailer.stop().await;
        if let Err(e) = self
            .writer
            .flush(Duration::from_millis(DEFAULT_CLOSE_FLUSH_TIMEOUT_MS))
            .await
        {
            warn!("Failed to flush changelog producer on close: {}", e);
        }
    }
}

/// A key-value store whose source of truth is a compacted Kafka topic
pub struct KafkaStore<K, V> {
    config: StoreConfig,
    group_id: String,
    platform: Arc<dyn LogPlatform>,
    cache: Arc<dyn LocalCache<K, V>>,
    serializer: Arc<dyn Serializer<K, V>>,
    handler: Option<Arc<dyn StoreUpdateHandler<K, V>>>,
    state: AtomicU8,
    components: RwLock<Option<Arc<Components<K, V>>>>,
}

/// Builder for [`KafkaStore`]
///
/// Defaults: librdkafka platform, [`InMemoryCache`], no update handler.
pub struct KafkaStoreBuilder<K, V> {
    config: StoreConfig,
    serializer: Arc<dyn Serializer<K, V>>,
    platform: Option<Arc<dyn LogPlatform>>,
    cache: Option<Arc<dyn LocalCache<K, V>>>,
    handler: Option<Arc<dyn StoreUpdateHandler<K, V>>>,
}

impl<K, V> KafkaStoreBuilder<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Use another log platform, e.g. a [`MemoryLog`](super::platform::MemoryLog)
    pub fn platform<P: LogPlatform + 'static>(mut self, platform: P) -> Self {
        self.platform = Some(Arc::new(platform));
        self
    }

    /// Use a caller-owned cache
    ///
    /// Keep a clone of the `Arc` to reuse the cache in a later store.
    pub fn cache(mut self, cache: Arc<dyn LocalCache<K, V>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Be told about every applied record
    pub fn handler<H: StoreUpdateHandler<K, V> + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Validate the config and build an uninitialized store
    pub fn build(self) -> Result<KafkaStore<K, V>> {
        self.config.validate()?;

        let group_id = self
            .config
            .group_id
            .clone()
            .unwrap_or_else(|| format!("{}{}", DEFAULT_GROUP_ID_PREFIX, Uuid::new_v4()));

        Ok(KafkaStore {
            config: self.config,
            group_id,
            platform: self
                .platform
                .unwrap_or_else(|| Arc::new(RdKafkaPlatform::new()) as Arc<dyn LogPlatform>),
            cache: self
                .cache
                .unwrap_or_else(|| Arc::new(InMemoryCache::new()) as Arc<dyn LocalCache<K, V>>),
            serializer: self.serializer,
            handler: self.handler,
            state: AtomicU8::new(UNINITIALIZED),
            components: RwLock::new(None),
        })
    }
}

impl<K, V> KafkaStore<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn builder<S>(config: StoreConfig, serializer: S) -> KafkaStoreBuilder<K, V>
    where
        S: Serializer<K, V> + 'static,
    {
        KafkaStoreBuilder {
            config,
            serializer: Arc::new(serializer),
            platform: None,
            cache: None,
            handler: None,
        }
    }

    /// Verify or create the changelog topic, connect, and replay the log
    ///
    /// Returns once everything in the log at startup is in the cache.
    ///
    /// # Errors
    /// - [`StoreError::AlreadyInitialized`] on a second call; the store is left as it was
    /// - [`StoreError::Closed`] if the store was closed or a previous init failed
    /// - any other error means this init failed and the store is now closed
    pub async fn init(&self) -> Result<()> {
        if let Err(current) = self.state.compare_exchange(
            UNINITIALIZED,
            INITIALIZING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(match current {
                CLOSED => StoreError::Closed,
                _ => StoreError::AlreadyInitialized,
            });
        }

        info!(
            "Initializing store on changelog topic {} (group {})",
            self.config.topic, self.group_id
        );

        let components = match self.start_components().await {
            Ok(components) => Arc::new(components),
            Err(err) => {
                error!("Store initialization failed: {}", err);
                self.state.store(CLOSED, Ordering::Release);
                return Err(err);
            }
        };

        *self.components.write() = Some(Arc::clone(&components));

        // close() may have run while we were catching up
        if self
            .state
            .compare_exchange(INITIALIZING, INITIALIZED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.components.write().take();
            components.shut_down().await;
            return Err(StoreError::Closed);
        }

        info!(
            "Store initialized on {} at offset {}",
            self.config.topic,
            components.tailer.last_applied_offset()
        );
        Ok(())
    }

    async fn start_components(&self) -> Result<Components<K, V>> {
        let topic = &self.config.topic;

        let admin = self
            .platform
            .admin(&self.config.admin_properties())
            .map_err(|e| StoreError::Initialization(format!("failed to create admin client: {}", e)))?;

        let topic_admin = ChangelogTopicAdmin::new(Arc::clone(&admin), &self.config);
        topic_admin.ensure_topic().await?;
        let bootstrap_servers = topic_admin.resolve_bootstrap_servers().await?;

        let producer = self
            .platform
            .producer(&self.config.producer_properties(&bootstrap_servers))
            .map_err(|e| StoreError::Initialization(format!("failed to create producer: {}", e)))?;
        let writer = LogWriter::new(producer, Arc::clone(&self.serializer), &self.config);

        let consumer_properties = self
            .config
            .consumer_properties(&bootstrap_servers, &self.group_id);
        let consumer = self
            .platform
            .consumer(&consumer_properties)
            .map_err(|e| StoreError::Initialization(format!("failed to create consumer: {}", e)))?;

        let high_watermark = admin
            .high_watermark(topic, CHANGELOG_PARTITION)
            .await
            .map_err(|e| {
                StoreError::Initialization(format!(
                    "failed to read the end offset of {}: {}",
                    topic, e
                ))
            })?;

        let tailer = ChangelogTailer::new(
            &self.config,
            consumer_properties,
            Arc::clone(&self.cache),
            Arc::clone(&self.serializer),
            self.handler.clone(),
        );
        tailer.start(consumer, high_watermark)?;

        if let Err(err) = tailer.wait_for_catch_up(self.config.init_timeout()).await {
            tailer.stop().await;
            return Err(StoreError::Initialization(format!(
                "failed to catch up with {} (high watermark {}): {}",
                topic, high_watermark, err
            )));
        }

        Ok(Components {
            admin,
            writer,
            tailer,
        })
    }

    /// Write `key -> value` and wait until this instance has applied it
    ///
    /// # Errors
    /// - [`StoreError::Timeout`] if the write was appended but not applied
    ///   within the configured timeout; the write may still become visible later
    /// - [`StoreError::TailerFailed`] if the tailer has failed; once it has,
    ///   nothing more is appended and every operation returns this error
    pub async fn put(&self, key: K, value: V) -> Result<()> {
        let components = self.components()?;
        let offset = components.writer.append(&key, Some(&value)).await?;
        components
            .tailer
            .wait_for_offset(offset, self.config.timeout())
            .await
    }

    /// Delete `key` and wait until this instance has applied the tombstone
    pub async fn delete(&self, key: K) -> Result<()> {
        let components = self.components()?;
        let offset = components.writer.append(&key, None).await?;
        components
            .tailer
            .wait_for_offset(offset, self.config.timeout())
            .await
    }

    /// Read from the local cache without waiting
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        self.components()?;
        self.cache.get(key)
    }

    /// Wait until every record currently in the log has been applied
    ///
    /// A newly elected writer calls this before serving, so it does not act
    /// on state older than what the previous writer produced.
    pub async fn wait_until_caught_up(&self) -> Result<()> {
        let components = self.components()?;
        let high_watermark = components
            .admin
            .high_watermark(&self.config.topic, CHANGELOG_PARTITION)
            .await?;
        components
            .tailer
            .wait_for_offset(high_watermark - 1, self.config.init_timeout())
            .await
    }

    /// Stop the tailer and release the clients
    ///
    /// Idempotent. Callers waiting in `put`/`delete` get [`StoreError::Closed`].
    pub async fn close(&self) {
        let previous = self.state.swap(CLOSED, Ordering::AcqRel);
        if previous == CLOSED {
            return;
        }

        let components = self.components.write().take();
        if let Some(components) = components {
            components.shut_down().await;
        }

        info!("Store on {} closed", self.config.topic);
    }

    /// Effective consumer property of the running tailer
    pub fn consumer_property(&self, name: &str) -> Option<String> {
        self.components
            .read()
            .as_ref()
            .and_then(|c| c.tailer.consumer_property(name))
    }

    /// Highest offset applied to the cache, -1 if none or not running
    pub fn last_applied_offset(&self) -> i64 {
        self.components
            .read()
            .as_ref()
            .map_or(-1, |c| c.tailer.last_applied_offset())
    }

    fn components(&self) -> Result<Arc<Components<K, V>>> {
        match self.state.load(Ordering::Acquire) {
            INITIALIZED => {}
            CLOSED => return Err(StoreError::Closed),
            _ => return Err(StoreError::NotInitialized),
        }
        let components = self.components.read().clone().ok_or(StoreError::Closed)?;

        // A dead tailer means the cache no longer follows the log
        if let Some(reason) = components.tailer.failure() {
            return Err(StoreError::TailerFailed(reason));
        }
        Ok(components)
    }
}

impl<K, V> KafkaStore<K, V> {
    pub fn state(&self) -> StoreState {
        match self.state.load(Ordering::Acquire) {
            INITIALIZED => StoreState::Initialized,
            CLOSED => StoreState::Closed,
            _ => StoreState::Uninitialized,
        }
    }

    /// Consumer group id, generated as `kafkastore-<uuid>` unless configured
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl<K, V> std::fmt::Debug for KafkaStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaStore")
            .field("topic", &self.config.topic)
            .field("group_id", &self.group_id)
            .field("state", &self.state())
            .finish()
    }
}
