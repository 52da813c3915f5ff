//! librdkafka-backed log platform
//!
//! Wraps rdkafka's `AdminClient`, `FutureProducer` and `StreamConsumer`
//! behind the platform traits and classifies librdkafka error codes into
//! transient and fatal [`LogError`]s.
//!
//! Metadata and watermark queries are synchronous in librdkafka. They run on
//! tokio's blocking pool so a slow cluster never stalls the tailer task.
//!
//! ## OpenSSL Warning
//!
//! SSL and SASL support come from the system OpenSSL/Cyrus libraries via the
//! `ssl` and `gssapi` crate features.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, ResourceSpecifier, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::topic_partition_list::{Offset, TopicPartitionList};
use rdkafka::util::Timeout;
use tracing::debug;

use super::{
    ChangelogAdmin, ChangelogConsumer, ChangelogProducer, LogError, LogPlatform, LogRecord,
    LogResult, NewTopicSpec, TopicDescription,
};
use crate::config::ClientProperties;
use crate::kafka::constants::{DEFAULT_ADMIN_TIMEOUT_MS, DEFAULT_DELIVERY_TIMEOUT_MS};
use crate::kafka::endpoints::{BrokerListener, SecurityProtocol};

/// Production log platform talking to a real cluster
#[derive(Debug, Clone)]
pub struct RdKafkaPlatform {
    admin_timeout: Duration,
    delivery_timeout: Duration,
}

impl Default for RdKafkaPlatform {
    fn default() -> Self {
        Self {
            admin_timeout: Duration::from_millis(DEFAULT_ADMIN_TIMEOUT_MS),
            delivery_timeout: Duration::from_millis(DEFAULT_DELIVERY_TIMEOUT_MS),
        }
    }
}

impl RdKafkaPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timeout for admin requests and metadata queries
    pub fn admin_timeout(mut self, timeout: Duration) -> Self {
        self.admin_timeout = timeout;
        self
    }

    /// How long a single append may wait in librdkafka's queue
    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }
}

impl LogPlatform for RdKafkaPlatform {
    fn admin(&self, properties: &ClientProperties) -> LogResult<Arc<dyn ChangelogAdmin>> {
        let protocol = match properties.get("security.protocol") {
            Some(name) => name
                .parse::<SecurityProtocol>()
                .map_err(|e| LogError::Fatal(e.to_string()))?,
            None => SecurityProtocol::default(),
        };
        let admin: AdminClient<DefaultClientContext> = client_config(properties).create()?;
        debug!("Created admin client for {:?}", properties.get("bootstrap.servers"));

        Ok(Arc::new(RdKafkaAdmin {
            admin: Arc::new(admin),
            protocol,
            timeout: self.admin_timeout,
        }))
    }

    fn producer(&self, properties: &ClientProperties) -> LogResult<Arc<dyn ChangelogProducer>> {
        let producer: FutureProducer = client_config(properties).create()?;
        Ok(Arc::new(RdKafkaProducer {
            producer,
            delivery_timeout: self.delivery_timeout,
        }))
    }

    fn consumer(&self, properties: &ClientProperties) -> LogResult<Box<dyn ChangelogConsumer>> {
        let consumer: StreamConsumer = client_config(properties).create()?;
        Ok(Box::new(RdKafkaConsumer { consumer }))
    }
}

fn client_config(properties: &ClientProperties) -> ClientConfig {
    let mut config = ClientConfig::new();
    for (key, value) in properties {
        config.set(key, value);
    }
    config
}

/// Admin client plus the metadata half of the low-level client
pub struct RdKafkaAdmin {
    admin: Arc<AdminClient<DefaultClientContext>>,
    /// Broker metadata carries no listener details, so every broker is
    /// reported as speaking the protocol this client connected with.
    protocol: SecurityProtocol,
    timeout: Duration,
}

#[async_trait]
impl ChangelogAdmin for RdKafkaAdmin {
    async fn describe_topic(&self, topic: &str) -> LogResult<Option<TopicDescription>> {
        let name = topic.to_string();
        let timeout = self.timeout;
        let layout = run_blocking(Arc::clone(&self.admin), move |admin| {
            let metadata = admin.inner().fetch_metadata(Some(name.as_str()), timeout)?;

            let Some(topic_metadata) = metadata.topics().iter().find(|t| t.name() == name) else {
                return Ok(None);
            };

            if let Some(err) = topic_metadata.error() {
                let code = RDKafkaErrorCode::from(err);
                if code == RDKafkaErrorCode::UnknownTopicOrPartition {
                    return Ok(None);
                }
                return Err(classify(code, format!("describe {}: {}", name, code)));
            }

            let partitions = topic_metadata.partitions();
            let replication_factor = partitions
                .first()
                .map(|p| p.replicas().len() as i32)
                .unwrap_or(0);
            Ok(Some((partitions.len() as i32, replication_factor)))
        })
        .await?;

        let Some((partitions, replication_factor)) = layout else {
            return Ok(None);
        };

        let opts = AdminOptions::new().request_timeout(Some(self.timeout));
        let results = self
            .admin
            .describe_configs(&[ResourceSpecifier::Topic(topic)], &opts)
            .await?;

        let mut configs = BTreeMap::new();
        for result in results {
            let resource = result
                .map_err(|code| classify(code, format!("describe configs of {}: {}", topic, code)))?;
            for entry in resource.entries {
                if let Some(value) = entry.value {
                    configs.insert(entry.name, value);
                }
            }
        }

        Ok(Some(TopicDescription {
            name: topic.to_string(),
            partitions,
            replication_factor,
            configs,
        }))
    }

    async fn create_topic(&self, spec: &NewTopicSpec) -> LogResult<()> {
        let mut new_topic = NewTopic::new(
            &spec.name,
            spec.partitions,
            TopicReplication::Fixed(spec.replication_factor),
        );
        for (key, value) in &spec.configs {
            new_topic = new_topic.set(key, value);
        }

        let opts = AdminOptions::new().operation_timeout(Some(self.timeout));
        let results = self.admin.create_topics(&[new_topic], &opts).await?;

        for result in results {
            if let Err((name, code)) = result {
                return Err(match code {
                    RDKafkaErrorCode::TopicAlreadyExists => LogError::TopicAlreadyExists(name),
                    other => classify(other, format!("create {}: {}", name, other)),
                });
            }
        }
        Ok(())
    }

    async fn brokers(&self) -> LogResult<Vec<BrokerListener>> {
        let (protocol, timeout) = (self.protocol, self.timeout);
        run_blocking(Arc::clone(&self.admin), move |admin| {
            let metadata = admin.inner().fetch_metadata(None, timeout)?;

            metadata
                .brokers()
                .iter()
                .map(|broker| {
                    let port = u16::try_from(broker.port()).map_err(|_| {
                        LogError::Fatal(format!(
                            "broker {} advertises invalid port {}",
                            broker.id(),
                            broker.port()
                        ))
                    })?;
                    Ok(BrokerListener::new(
                        broker.id(),
                        broker.host(),
                        port,
                        protocol.as_str(),
                        protocol,
                    ))
                })
                .collect()
        })
        .await
    }

    async fn high_watermark(&self, topic: &str, partition: i32) -> LogResult<i64> {
        let topic = topic.to_string();
        let timeout = self.timeout;
        run_blocking(Arc::clone(&self.admin), move |admin| {
            let (_low, high) = admin.inner().fetch_watermarks(&topic, partition, timeout)?;
            Ok(high)
        })
        .await
    }
}

/// Run a synchronous librdkafka call on the blocking pool
async fn run_blocking<C, T, F>(client: Arc<C>, call: F) -> LogResult<T>
where
    C: Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&C) -> LogResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || call(&client))
        .await
        .map_err(|e| LogError::Fatal(format!("blocking librdkafka call failed: {}", e)))?
}

/// Producer waiting for the acknowledgement of every record
pub struct RdKafkaProducer {
    producer: FutureProducer,
    delivery_timeout: Duration,
}

#[async_trait]
impl ChangelogProducer for RdKafkaProducer {
    async fn send(
        &self,
        topic: &str,
        partition: i32,
        key: &[u8],
        value: Option<&[u8]>,
    ) -> LogResult<i64> {
        let mut record = FutureRecord::<[u8], [u8]>::to(topic)
            .key(key)
            .partition(partition);

        if let Some(payload) = value {
            record = record.payload(payload);
        }

        let (_partition, offset) = self
            .producer
            .send(record, Timeout::After(self.delivery_timeout))
            .await
            .map_err(|(err, _)| LogError::from(err))?;

        Ok(offset)
    }

    async fn flush(&self, timeout: Duration) -> LogResult<()> {
        self.producer.flush(Timeout::After(timeout))?;
        Ok(())
    }
}

/// Consumer with a manual assignment and no offset commits
pub struct RdKafkaConsumer {
    consumer: StreamConsumer,
}

#[async_trait]
impl ChangelogConsumer for RdKafkaConsumer {
    fn assign_from_beginning(&mut self, topic: &str, partition: i32) -> LogResult<()> {
        let mut assignment = TopicPartitionList::new();
        assignment.add_partition_offset(topic, partition, Offset::Beginning)?;
        self.consumer.assign(&assignment)?;
        Ok(())
    }

    async fn poll(&mut self) -> LogResult<LogRecord> {
        let message = self.consumer.recv().await?;
        Ok(LogRecord {
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            value: message.payload().map(<[u8]>::to_vec),
        })
    }
}

impl From<KafkaError> for LogError {
    fn from(err: KafkaError) -> Self {
        let message = err.to_string();
        match err.rdkafka_error_code() {
            Some(code) => classify(code, message),
            None => LogError::Fatal(message),
        }
    }
}

/// Sort a librdkafka error code into transient or fatal
fn classify(code: RDKafkaErrorCode, message: String) -> LogError {
    match code {
        RDKafkaErrorCode::BrokerTransportFailure
        | RDKafkaErrorCode::AllBrokersDown
        | RDKafkaErrorCode::RequestTimedOut
        | RDKafkaErrorCode::MessageTimedOut
        | RDKafkaErrorCode::OperationTimedOut
        | RDKafkaErrorCode::QueueFull
        | RDKafkaErrorCode::NetworkException
        | RDKafkaErrorCode::LeaderNotAvailable
        | RDKafkaErrorCode::NotLeaderForPartition
        | RDKafkaErrorCode::NotEnoughReplicas
        | RDKafkaErrorCode::NotEnoughReplicasAfterAppend
        | RDKafkaErrorCode::Resolve => LogError::Transient(message),
        RDKafkaErrorCode::TopicAlreadyExists => LogError::TopicAlreadyExists(message),
        _ => LogError::Fatal(message),
    }
}
