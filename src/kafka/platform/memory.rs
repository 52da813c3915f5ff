//! In-process log platform
//!
//! `MemoryLog` keeps topics, partitions and records in memory and implements
//! every platform trait on top of them. Clones share the same log, so two
//! stores built from clones of one `MemoryLog` see each other's writes the
//! way two instances see one Kafka cluster.
//!
//! Compaction is not simulated: every record stays readable.
//!
//! Fault injection hooks let tests fail appends or polls and stall consumers.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use super::{
    ChangelogAdmin, ChangelogConsumer, ChangelogProducer, LogError, LogPlatform, LogRecord,
    LogResult, NewTopicSpec, TopicDescription,
};
use crate::config::ClientProperties;
use crate::kafka::endpoints::{BrokerListener, SecurityProtocol};

/// A shared in-memory log
#[derive(Clone)]
pub struct MemoryLog {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<LogState>,
    /// Woken on every append, injected poll failure and consumer resume
    changed: Notify,
}

struct LogState {
    topics: BTreeMap<String, MemoryTopic>,
    brokers: Vec<BrokerListener>,
    append_failures: VecDeque<LogError>,
    poll_failures: VecDeque<LogError>,
    consumers_paused: bool,
}

struct MemoryTopic {
    partitions: Vec<Vec<LogRecord>>,
    replication_factor: i32,
    configs: BTreeMap<String, String>,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::with_brokers(vec![BrokerListener::new(
            0,
            "localhost",
            9092,
            "PLAINTEXT",
            SecurityProtocol::Plaintext,
        )])
    }
}

impl MemoryLog {
    /// An empty log behind a single PLAINTEXT broker at `localhost:9092`
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty log behind the given broker listeners
    pub fn with_brokers(brokers: Vec<BrokerListener>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(LogState {
                    topics: BTreeMap::new(),
                    brokers,
                    append_failures: VecDeque::new(),
                    poll_failures: VecDeque::new(),
                    consumers_paused: false,
                }),
                changed: Notify::new(),
            }),
        }
    }

    /// Create a topic directly, bypassing the admin checks
    ///
    /// Replaces an existing topic of the same name.
    pub fn create_topic_with(
        &self,
        name: &str,
        partitions: i32,
        replication_factor: i32,
        configs: &[(&str, &str)],
    ) {
        let topic = MemoryTopic {
            partitions: vec![Vec::new(); partitions.max(0) as usize],
            replication_factor,
            configs: configs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        self.inner.state.lock().topics.insert(name.to_string(), topic);
    }

    pub fn topic_exists(&self, name: &str) -> bool {
        self.inner.state.lock().topics.contains_key(name)
    }

    /// Everything appended to a partition so far
    pub fn records(&self, topic: &str, partition: i32) -> Vec<LogRecord> {
        let state = self.inner.state.lock();
        state
            .topics
            .get(topic)
            .and_then(|t| t.partitions.get(partition as usize))
            .cloned()
            .unwrap_or_default()
    }

    /// Append raw bytes, bypassing fault injection
    pub fn append_raw(
        &self,
        topic: &str,
        partition: i32,
        key: Option<&[u8]>,
        value: Option<&[u8]>,
    ) -> LogResult<i64> {
        let offset = {
            let mut state = self.inner.state.lock();
            let records = partition_mut(&mut state, topic, partition)?;
            let offset = records.len() as i64;
            records.push(LogRecord {
                offset,
                key: key.map(<[u8]>::to_vec),
                value: value.map(<[u8]>::to_vec),
            });
            offset
        };
        self.inner.changed.notify_waiters();
        Ok(offset)
    }

    /// Fail the next `count` appends with `error`
    pub fn fail_next_appends(&self, count: usize, error: LogError) {
        let mut state = self.inner.state.lock();
        state
            .append_failures
            .extend(std::iter::repeat(error).take(count));
    }

    /// Fail the next `count` polls with `error`
    pub fn fail_next_polls(&self, count: usize, error: LogError) {
        {
            let mut state = self.inner.state.lock();
            state
                .poll_failures
                .extend(std::iter::repeat(error).take(count));
        }
        self.inner.changed.notify_waiters();
    }

    /// Stop delivering records to consumers
    ///
    /// Appends still succeed, so writers waiting on their own record stall.
    pub fn pause_consumers(&self) {
        self.inner.state.lock().consumers_paused = true;
    }

    pub fn resume_consumers(&self) {
        self.inner.state.lock().consumers_paused = false;
        self.inner.changed.notify_waiters();
    }
}

fn partition_mut<'a>(
    state: &'a mut LogState,
    topic: &str,
    partition: i32,
) -> LogResult<&'a mut Vec<LogRecord>> {
    state
        .topics
        .get_mut(topic)
        .ok_or_else(|| LogError::Fatal(format!("unknown topic {}", topic)))?
        .partitions
        .get_mut(partition as usize)
        .ok_or_else(|| LogError::Fatal(format!("unknown partition {}-{}", topic, partition)))
}

impl LogPlatform for MemoryLog {
    fn admin(&self, _properties: &ClientProperties) -> LogResult<Arc<dyn ChangelogAdmin>> {
        Ok(Arc::new(self.clone()))
    }

    fn producer(&self, _properties: &ClientProperties) -> LogResult<Arc<dyn ChangelogProducer>> {
        Ok(Arc::new(self.clone()))
    }

    fn consumer(&self, _properties: &ClientProperties) -> LogResult<Box<dyn ChangelogConsumer>> {
        Ok(Box::new(MemoryConsumer {
            log: self.clone(),
            assignment: None,
        }))
    }
}

#[async_trait]
impl ChangelogAdmin for MemoryLog {
    async fn describe_topic(&self, topic: &str) -> LogResult<Option<TopicDescription>> {
        let state = self.inner.state.lock();
        Ok(state.topics.get(topic).map(|t| TopicDescription {
            name: topic.to_string(),
            partitions: t.partitions.len() as i32,
            replication_factor: t.replication_factor,
            configs: t.configs.clone(),
        }))
    }

    async fn create_topic(&self, spec: &NewTopicSpec) -> LogResult<()> {
        let mut state = self.inner.state.lock();

        if state.topics.contains_key(&spec.name) {
            return Err(LogError::TopicAlreadyExists(spec.name.clone()));
        }
        if spec.partitions < 1 {
            return Err(LogError::Fatal(format!(
                "invalid partition count {}",
                spec.partitions
            )));
        }
        if spec.replication_factor < 1 || spec.replication_factor as usize > state.brokers.len() {
            return Err(LogError::Fatal(format!(
                "replication factor {} larger than available brokers {}",
                spec.replication_factor,
                state.brokers.len()
            )));
        }

        state.topics.insert(
            spec.name.clone(),
            MemoryTopic {
                partitions: vec![Vec::new(); spec.partitions as usize],
                replication_factor: spec.replication_factor,
                configs: spec.configs.clone(),
            },
        );
        Ok(())
    }

    async fn brokers(&self) -> LogResult<Vec<BrokerListener>> {
        Ok(self.inner.state.lock().brokers.clone())
    }

    async fn high_watermark(&self, topic: &str, partition: i32) -> LogResult<i64> {
        let mut state = self.inner.state.lock();
        Ok(partition_mut(&mut state, topic, partition)?.len() as i64)
    }
}

#[async_trait]
impl ChangelogProducer for MemoryLog {
    async fn send(
        &self,
        topic: &str,
        partition: i32,
        key: &[u8],
        value: Option<&[u8]>,
    ) -> LogResult<i64> {
        let injected = self.inner.state.lock().append_failures.pop_front();
        if let Some(err) = injected {
            return Err(err);
        }
        self.append_raw(topic, partition, Some(key), value)
    }

    async fn flush(&self, _timeout: Duration) -> LogResult<()> {
        Ok(())
    }
}

/// Reader over one partition of a [`MemoryLog`]
pub struct MemoryConsumer {
    log: MemoryLog,
    /// (topic, partition, next index)
    assignment: Option<(String, i32, usize)>,
}

impl MemoryConsumer {
    /// Next record, an injected failure, or `None` if nothing is ready yet
    fn try_next(&mut self) -> LogResult<Option<LogRecord>> {
        let Some((topic, partition, next)) = self.assignment.as_mut() else {
            return Err(LogError::Fatal("consumer has no assignment".to_string()));
        };

        let mut state = self.log.inner.state.lock();
        if let Some(err) = state.poll_failures.pop_front() {
            return Err(err);
        }
        if state.consumers_paused {
            return Ok(None);
        }

        let records = partition_mut(&mut state, topic, *partition)?;
        match records.get(*next) {
            Some(record) => {
                *next += 1;
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ChangelogConsumer for MemoryConsumer {
    fn assign_from_beginning(&mut self, topic: &str, partition: i32) -> LogResult<()> {
        {
            let mut state = self.log.inner.state.lock();
            partition_mut(&mut state, topic, partition)?;
        }
        self.assignment = Some((topic.to_string(), partition, 0));
        Ok(())
    }

    async fn poll(&mut self) -> LogResult<LogRecord> {
        let inner = Arc::clone(&self.log.inner);
        loop {
            // Registered before checking, so an append in between is not missed
            let changed = inner.changed.notified();
            if let Some(record) = self.try_next()? {
                trace!("Memory consumer read offset {}", record.offset);
                return Ok(record);
            }
            changed.await;
        }
    }
}
