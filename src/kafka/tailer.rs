// Changelog tailer
//
// One background tokio task per store reads the changelog from the earliest
// offset and folds every record into the local cache, strictly in offset
// order. Progress is published on a watch channel so writers can wait for
// their own record:
//
//   LogWriter::append ──► offset N
//                              │
//   tailer task: poll ─► apply to cache ─► handler ─► publish last_applied
//                                                          │
//   KafkaStore::put ◄── wait_for_offset(N) ◄───────────────┘
//
// State machine: Stopped → Running → Stopping → Stopped, or Running → Failed.
// Failed is terminal: every current and future waiter gets TailerFailed.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use backon::BackoffBuilder;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::cache::LocalCache;
use super::constants::CHANGELOG_PARTITION;
use super::error::{Result, StoreError};
use super::handler::StoreUpdateHandler;
use super::platform::{ChangelogConsumer, LogRecord};
use super::retry::consume_policy;
use super::serializer::Serializer;
use crate::config::{ClientProperties, StoreConfig};

/// Lifecycle of the tailer task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailerState {
    Stopped,
    Running,
    Stopping,
    Failed,
}

/// What the tailer publishes after every change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailerProgress {
    /// Highest applied offset, -1 before the first record
    pub last_applied: i64,
    pub state: TailerState,
    /// Why the tailer failed, once it has
    pub failure: Option<String>,
}

impl Default for TailerProgress {
    fn default() -> Self {
        Self {
            last_applied: -1,
            state: TailerState::Stopped,
            failure: None,
        }
    }
}

/// Background reader that keeps the local cache in step with the changelog
pub struct ChangelogTailer<K, V> {
    topic: String,
    consumer_properties: ClientProperties,
    cache: Arc<dyn LocalCache<K, V>>,
    serializer: Arc<dyn Serializer<K, V>>,
    handler: Option<Arc<dyn StoreUpdateHandler<K, V>>>,
    max_retries: usize,
    retry_backoff: Duration,
    /// High watermark seen at start; catch-up target is one below it
    start_high_watermark: AtomicI64,
    progress: Arc<watch::Sender<TailerProgress>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<K, V> ChangelogTailer<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(
        config: &StoreConfig,
        consumer_properties: ClientProperties,
        cache: Arc<dyn LocalCache<K, V>>,
        serializer: Arc<dyn Serializer<K, V>>,
        handler: Option<Arc<dyn StoreUpdateHandler<K, V>>>,
    ) -> Self {
        let (progress, _) = watch::channel(TailerProgress::default());
        let (shutdown, _) = watch::channel(false);

        Self {
            topic: config.topic.clone(),
            consumer_properties,
            cache,
            serializer,
            handler,
            max_retries: config.max_consume_retries,
            retry_backoff: config.retry_backoff(),
            start_high_watermark: AtomicI64::new(0),
            progress: Arc::new(progress),
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Assign partition 0 from the beginning and spawn the consume loop
    ///
    /// `high_watermark` is the end of the log at startup; see
    /// [`wait_for_catch_up`](Self::wait_for_catch_up).
    pub fn start(&self, mut consumer: Box<dyn ChangelogConsumer>, high_watermark: i64) -> Result<()> {
        let mut task = self.task.lock();
        if task.is_some() || *self.shutdown.borrow() {
            return Err(StoreError::Initialization(format!(
                "tailer for {} cannot be started twice",
                self.topic
            )));
        }

        consumer
            .assign_from_beginning(&self.topic, CHANGELOG_PARTITION)
            .map_err(|e| {
                StoreError::Initialization(format!(
                    "failed to assign {}-{}: {}",
                    self.topic, CHANGELOG_PARTITION, e
                ))
            })?;

        self.start_high_watermark
            .store(high_watermark, Ordering::Release);
        self.progress.send_modify(|p| p.state = TailerState::Running);

        let worker = TailerWorker {
            topic: self.topic.clone(),
            cache: Arc::clone(&self.cache),
            serializer: Arc::clone(&self.serializer),
            handler: self.handler.clone(),
            max_retries: self.max_retries,
            retry_backoff: self.retry_backoff,
            progress: Arc::clone(&self.progress),
        };
        let shutdown = self.shutdown.subscribe();

        info!(
            "Starting changelog tailer on {} (high watermark {})",
            self.topic, high_watermark
        );
        *task = Some(tokio::spawn(worker.run(consumer, shutdown)));
        Ok(())
    }

    /// Wait until everything present at start has been applied
    ///
    /// Returns immediately for an empty log.
    pub async fn wait_for_catch_up(&self, timeout: Duration) -> Result<()> {
        let target = self.start_high_watermark.load(Ordering::Acquire) - 1;
        self.wait_for_offset(target, timeout).await
    }

    /// Wait until `offset` has been applied to the cache
    ///
    /// # Errors
    /// - [`StoreError::Timeout`] if `timeout` elapses first
    /// - [`StoreError::TailerFailed`] if the tailer fails
    /// - [`StoreError::Closed`] if the tailer is stopped
    pub async fn wait_for_offset(&self, offset: i64, timeout: Duration) -> Result<()> {
        let mut progress = self.progress.subscribe();
        let reached = progress.wait_for(|p| p.last_applied >= offset || p.state != TailerState::Running);

        let outcome = match tokio::time::timeout(timeout, reached).await {
            Err(_) => Err(StoreError::Timeout {
                offset,
                last_applied: self.last_applied_offset(),
                timeout_ms: timeout.as_millis() as u64,
            }),
            Ok(Err(_)) => Err(StoreError::Closed),
            Ok(Ok(p)) if p.last_applied >= offset => Ok(()),
            Ok(Ok(p)) => match p.state {
                TailerState::Failed => Err(StoreError::TailerFailed(
                    p.failure.clone().unwrap_or_else(|| "unknown failure".to_string()),
                )),
                _ => Err(StoreError::Closed),
            },
        };
        outcome
    }

    /// Signal the loop to stop and wait for it to exit
    ///
    /// Idempotent. Waiters are released with [`StoreError::Closed`].
    pub async fn stop(&self) {
        self.shutdown.send_replace(true);
        self.progress.send_if_modified(|p| {
            if p.state == TailerState::Running {
                p.state = TailerState::Stopping;
                true
            } else {
                false
            }
        });

        let task = self.task.lock().take();
        if let Some(task) = task {
            debug!("Waiting for changelog tailer on {} to exit", self.topic);
            if let Err(e) = task.await {
                error!("Changelog tailer on {} ended abnormally: {}", self.topic, e);
            }
        }

        self.progress.send_if_modified(|p| {
            if p.state == TailerState::Stopping {
                p.state = TailerState::Stopped;
                true
            } else {
                false
            }
        });
    }

    pub fn last_applied_offset(&self) -> i64 {
        self.progress.borrow().last_applied
    }

    pub fn state(&self) -> TailerState {
        self.progress.borrow().state
    }

    /// Why the tailer failed, `None` unless it is in [`TailerState::Failed`]
    pub fn failure(&self) -> Option<String> {
        let progress = self.progress.borrow();
        match progress.state {
            TailerState::Failed => progress.failure.clone(),
            _ => None,
        }
    }

    /// Effective consumer configuration value, e.g. `group.id`
    pub fn consumer_property(&self, name: &str) -> Option<String> {
        self.consumer_properties.get(name).cloned()
    }
}

impl<K, V> Drop for ChangelogTailer<K, V> {
    fn drop(&mut self) {
        // The task owns its own handles; tell it to exit
        self.shutdown.send_replace(true);
    }
}

/// State moved into the spawned task
struct TailerWorker<K, V> {
    topic: String,
    cache: Arc<dyn LocalCache<K, V>>,
    serializer: Arc<dyn Serializer<K, V>>,
    handler: Option<Arc<dyn StoreUpdateHandler<K, V>>>,
    max_retries: usize,
    retry_backoff: Duration,
    progress: Arc<watch::Sender<TailerProgress>>,
}

impl<K, V> TailerWorker<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn run(self, mut consumer: Box<dyn ChangelogConsumer>, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = consume_policy(self.max_retries, self.retry_backoff).build();
        let mut consecutive_failures = 0usize;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let polled = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                polled = consumer.poll() => polled,
            };

            match polled {
                Ok(record) => {
                    if consecutive_failures > 0 {
                        info!(
                            "Changelog tailer on {} recovered after {} failed poll(s)",
                            self.topic, consecutive_failures
                        );
                        consecutive_failures = 0;
                        backoff = consume_policy(self.max_retries, self.retry_backoff).build();
                    }
                    if let Err(reason) = self.apply(record) {
                        self.fail(reason);
                        return;
                    }
                }
                Err(err) if err.is_transient() => {
                    consecutive_failures += 1;
                    let Some(delay) = backoff.next() else {
                        self.fail(format!(
                            "giving up after {} consecutive poll failures: {}",
                            consecutive_failures, err
                        ));
                        return;
                    };
                    warn!(
                        "Poll of {} failed, retrying in {:?}: {}",
                        self.topic, delay, err
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => {
                    self.fail(format!("poll of {} failed: {}", self.topic, err));
                    return;
                }
            }
        }

        info!("Changelog tailer on {} stopped", self.topic);
    }

    /// Apply one record and publish its offset
    ///
    /// Undecodable records are skipped. Cache errors are fatal.
    fn apply(&self, record: LogRecord) -> std::result::Result<(), String> {
        let offset = record.offset;
        if offset <= self.progress.borrow().last_applied {
            trace!("Skipping already applied offset {} of {}", offset, self.topic);
            return Ok(());
        }

        match self.decode(&record) {
            Ok((key, value)) => self.update(key, value, offset)?,
            Err(err) => error!(
                "Skipping undecodable record at offset {} of {}: {}",
                offset, self.topic, err
            ),
        }

        self.progress.send_modify(|p| p.last_applied = offset);
        trace!("Applied offset {} of {}", offset, self.topic);
        Ok(())
    }

    fn decode(&self, record: &LogRecord) -> Result<(K, Option<V>)> {
        let key_bytes = record
            .key
            .as_deref()
            .ok_or_else(|| StoreError::Serialization("record has no key".to_string()))?;
        let key = self.serializer.deserialize_key(key_bytes)?;
        let value = record
            .value
            .as_deref()
            .map(|bytes| self.serializer.deserialize_value(bytes))
            .transpose()?;
        Ok((key, value))
    }

    fn update(&self, key: K, value: Option<V>, offset: i64) -> std::result::Result<(), String> {
        let cache_error = |e: StoreError| {
            format!(
                "failed to apply offset {} of {} to the local cache: {}",
                offset, self.topic, e
            )
        };

        let applied = match &value {
            Some(value) => self.cache.put(key.clone(), value.clone()),
            None => self.cache.delete(&key),
        };
        applied.map_err(cache_error)?;

        if let Some(handler) = &self.handler {
            handler.handle_update(&key, value.as_ref(), offset);
        }
        Ok(())
    }

    fn fail(&self, reason: String) {
        error!("Changelog tailer on {} failed: {}", self.topic, reason);
        self.progress.send_modify(|p| {
            p.state = TailerState::Failed;
            p.failure = Some(reason);
        });
    }
}
