// Configuration module for kafkastore
//
// StoreConfig holds everything needed to reach the cluster and to run the
// store: where the brokers are, how to authenticate, which topic is the
// changelog and how long callers wait. It can be built in code with chained
// setters or read from KAFKASTORE_* environment variables.
//
// The property builders at the bottom turn the config into the librdkafka
// key/value maps for the admin, producer and consumer clients.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use crate::kafka::constants::{
    DEFAULT_DELIVERY_TIMEOUT_MS, DEFAULT_INIT_TIMEOUT_MS, DEFAULT_MAX_APPEND_RETRIES,
    DEFAULT_MAX_CONSUME_RETRIES, DEFAULT_REPLICATION_FACTOR, DEFAULT_RETRY_BACKOFF_MS,
    DEFAULT_SASL_MECHANISM, DEFAULT_SECURITY_PROTOCOL, DEFAULT_TIMEOUT_MS, DEFAULT_TOPIC,
    ENV_PREFIX, MAX_RETRY_BACKOFF_MS, MAX_TOPIC_NAME_LENGTH, MIN_REPLICATION_FACTOR,
    MIN_TIMEOUT_MS,
};
use crate::kafka::endpoints::{strip_protocols, SecurityProtocol};
use crate::kafka::error::ConfigError;

/// librdkafka client properties, ordered so logs and tests are stable
pub type ClientProperties = BTreeMap<String, String>;

/// Configuration for a [`KafkaStore`](crate::kafka::store::KafkaStore)
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Comma-separated `host:port` list, optionally with `PROTOCOL://` prefixes
    pub bootstrap_servers: String,
    /// Name of the changelog topic
    pub topic: String,
    /// Security protocol used both to connect and to pick bootstrap endpoints
    pub security_protocol: String,
    /// Consumer group id; generated when `None`
    pub group_id: Option<String>,
    /// Replication factor used when the store creates its topic
    pub replication_factor: i32,
    /// How long put/delete wait for their own write to be applied (milliseconds)
    pub timeout_ms: u64,
    /// How long init waits for the initial catch-up (milliseconds)
    pub init_timeout_ms: u64,
    pub sasl_mechanism: String,
    pub sasl_username: String,
    pub sasl_password: String,
    pub ssl_ca_location: String,
    /// Retries after the first failed append
    pub max_append_retries: usize,
    /// Consecutive transient consume failures tolerated by the tailer
    pub max_consume_retries: usize,
    /// Initial backoff between retries (milliseconds)
    pub retry_backoff_ms: u64,
    /// Extra properties passed to every client
    pub client_properties: ClientProperties,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: String::new(),
            topic: DEFAULT_TOPIC.to_string(),
            security_protocol: DEFAULT_SECURITY_PROTOCOL.to_string(),
            group_id: None,
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            init_timeout_ms: DEFAULT_INIT_TIMEOUT_MS,
            sasl_mechanism: DEFAULT_SASL_MECHANISM.to_string(),
            sasl_username: String::new(),
            sasl_password: String::new(),
            ssl_ca_location: String::new(),
            max_append_retries: DEFAULT_MAX_APPEND_RETRIES,
            max_consume_retries: DEFAULT_MAX_CONSUME_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            client_properties: ClientProperties::new(),
        }
    }
}

impl StoreConfig {
    /// Create a config with defaults for everything but the brokers
    pub fn new(bootstrap_servers: &str) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.to_string(),
            ..Default::default()
        }
    }

    /// Set the changelog topic
    pub fn topic(mut self, topic: &str) -> Self {
        self.topic = topic.to_string();
        self
    }

    /// Set the security protocol
    ///
    /// Known names are stored in canonical upper case (`sasl_ssl` becomes
    /// `SASL_SSL`); anything else is kept as given and rejected by `validate()`.
    pub fn security_protocol(mut self, protocol: &str) -> Self {
        self.security_protocol = canonical_protocol(protocol);
        self
    }

    /// Use a fixed consumer group id
    pub fn group_id(mut self, group_id: &str) -> Self {
        self.group_id = Some(group_id.to_string());
        self
    }

    pub fn replication_factor(mut self, replication_factor: i32) -> Self {
        self.replication_factor = replication_factor;
        self
    }

    /// Set the put/delete timeout in milliseconds
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Set the init catch-up timeout in milliseconds
    pub fn init_timeout_ms(mut self, ms: u64) -> Self {
        self.init_timeout_ms = ms;
        self
    }

    /// Set SASL mechanism
    pub fn sasl_mechanism(mut self, mechanism: &str) -> Self {
        self.sasl_mechanism = mechanism.to_string();
        self
    }

    /// Set SASL credentials
    pub fn sasl_credentials(mut self, username: &str, password: &str) -> Self {
        self.sasl_username = username.to_string();
        self.sasl_password = password.to_string();
        self
    }

    /// Set SSL CA certificate location
    pub fn ssl_ca_location(mut self, path: &str) -> Self {
        self.ssl_ca_location = path.to_string();
        self
    }

    pub fn max_append_retries(mut self, retries: usize) -> Self {
        self.max_append_retries = retries;
        self
    }

    pub fn max_consume_retries(mut self, retries: usize) -> Self {
        self.max_consume_retries = retries;
        self
    }

    /// Set the initial retry backoff in milliseconds
    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.retry_backoff_ms = ms;
        self
    }

    /// Add a raw librdkafka property for every client
    pub fn client_property(mut self, key: &str, value: &str) -> Self {
        self.client_properties
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Parsed security protocol
    pub fn protocol(&self) -> Result<SecurityProtocol, ConfigError> {
        self.security_protocol.parse()
    }

    /// Check every field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bootstrap_servers.trim().is_empty() {
            return Err(invalid("bootstrap_servers", "must not be empty"));
        }

        validate_topic_name(&self.topic)?;

        let protocol = self.protocol()?;

        if self.replication_factor < MIN_REPLICATION_FACTOR {
            return Err(invalid(
                "replication_factor",
                format!(
                    "must be at least {}, got {}",
                    MIN_REPLICATION_FACTOR, self.replication_factor
                ),
            ));
        }

        if self.timeout_ms < MIN_TIMEOUT_MS {
            return Err(invalid(
                "timeout_ms",
                format!("must be at least {}ms", MIN_TIMEOUT_MS),
            ));
        }

        if self.init_timeout_ms < MIN_TIMEOUT_MS {
            return Err(invalid(
                "init_timeout_ms",
                format!("must be at least {}ms", MIN_TIMEOUT_MS),
            ));
        }

        if self.retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return Err(invalid(
                "retry_backoff_ms",
                format!(
                    "must be at most {}ms, got {}ms",
                    MAX_RETRY_BACKOFF_MS, self.retry_backoff_ms
                ),
            ));
        }

        if let Some(group_id) = &self.group_id {
            if group_id.trim().is_empty() {
                return Err(invalid("group_id", "must not be empty when set"));
            }
        }

        // GSSAPI and OAUTHBEARER authenticate without a username
        if protocol.uses_sasl()
            && (self.sasl_mechanism == "PLAIN" || self.sasl_mechanism.starts_with("SCRAM"))
            && self.sasl_username.is_empty()
        {
            return Err(invalid(
                "sasl_username",
                format!("required for SASL mechanism {}", self.sasl_mechanism),
            ));
        }

        Ok(())
    }

    /// Read the config from `KAFKASTORE_*` environment variables
    ///
    /// Unset variables keep their defaults. The result is validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable lookup
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));
        let mut config = Self::default();

        if let Some(servers) = var("BOOTSTRAP_SERVERS") {
            config.bootstrap_servers = servers;
        }
        if let Some(topic) = var("TOPIC") {
            config.topic = topic;
        }
        if let Some(protocol) = var("SECURITY_PROTOCOL") {
            config.security_protocol = canonical_protocol(&protocol);
        }
        config.group_id = var("GROUP_ID").filter(|g| !g.is_empty());
        if let Some(mechanism) = var("SASL_MECHANISM") {
            config.sasl_mechanism = mechanism;
        }
        if let Some(username) = var("SASL_USERNAME") {
            config.sasl_username = username;
        }
        if let Some(password) = var("SASL_PASSWORD") {
            config.sasl_password = password;
        }
        if let Some(path) = var("SSL_CA_LOCATION") {
            config.ssl_ca_location = path;
        }

        if let Some(rf) = parse_var(var("REPLICATION_FACTOR"), "replication_factor")? {
            config.replication_factor = rf;
        }
        if let Some(ms) = parse_var(var("TIMEOUT_MS"), "timeout_ms")? {
            config.timeout_ms = ms;
        }
        if let Some(ms) = parse_var(var("INIT_TIMEOUT_MS"), "init_timeout_ms")? {
            config.init_timeout_ms = ms;
        }
        if let Some(n) = parse_var(var("MAX_APPEND_RETRIES"), "max_append_retries")? {
            config.max_append_retries = n;
        }
        if let Some(n) = parse_var(var("MAX_CONSUME_RETRIES"), "max_consume_retries")? {
            config.max_consume_retries = n;
        }
        if let Some(ms) = parse_var(var("RETRY_BACKOFF_MS"), "retry_backoff_ms")? {
            config.retry_backoff_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }

    /// Properties for the admin client, connecting through the configured brokers
    pub fn admin_properties(&self) -> ClientProperties {
        self.common_properties(&self.bootstrap_servers)
    }

    /// Properties for the changelog producer
    ///
    /// `bootstrap_servers` is the resolved list, protocol prefixes allowed.
    /// librdkafka's own retries are off: the writer retries and counts attempts.
    pub fn producer_properties(&self, bootstrap_servers: &str) -> ClientProperties {
        let mut props = self.common_properties(bootstrap_servers);
        set(&mut props, "acks", "all");
        set(&mut props, "retries", "0");
        set(&mut props, "enable.idempotence", "false");
        set(&mut props, "linger.ms", "0");
        set(&mut props, "compression.type", "none");
        set(
            &mut props,
            "message.timeout.ms",
            &DEFAULT_DELIVERY_TIMEOUT_MS.to_string(),
        );
        props
    }

    /// Properties for the changelog consumer
    ///
    /// Offsets are never committed: every start replays from the beginning.
    pub fn consumer_properties(&self, bootstrap_servers: &str, group_id: &str) -> ClientProperties {
        let mut props = self.common_properties(bootstrap_servers);
        set(&mut props, "group.id", group_id);
        set(&mut props, "client.id", &format!("{}-reader", group_id));
        set(&mut props, "enable.auto.commit", "false");
        set(&mut props, "enable.auto.offset.store", "false");
        set(&mut props, "auto.offset.reset", "earliest");
        set(&mut props, "enable.partition.eof", "false");
        props
    }

    /// Connection and security settings shared by all clients
    fn common_properties(&self, bootstrap_servers: &str) -> ClientProperties {
        let mut props = ClientProperties::new();

        let protocol = self.protocol().ok();

        set(&mut props, "bootstrap.servers", &strip_protocols(bootstrap_servers));
        set(
            &mut props,
            "security.protocol",
            &canonical_protocol(&self.security_protocol),
        );

        // SASL configuration (if using SASL_* protocol)
        if protocol.is_some_and(|p| p.uses_sasl()) {
            set(&mut props, "sasl.mechanism", &self.sasl_mechanism);

            if !self.sasl_username.is_empty() {
                set(&mut props, "sasl.username", &self.sasl_username);
            }

            if !self.sasl_password.is_empty() {
                set(&mut props, "sasl.password", &self.sasl_password);
            }
        }

        // SSL configuration (if using *_SSL protocol)
        if protocol.is_some_and(|p| p.uses_tls()) {
            if !self.ssl_ca_location.is_empty() {
                set(&mut props, "ssl.ca.location", &self.ssl_ca_location);
            }
            set(&mut props, "ssl.endpoint.identification.algorithm", "https");
        }

        for (key, value) in &self.client_properties {
            set(&mut props, key, value);
        }

        props
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let client_properties: BTreeMap<&str, &str> = self
            .client_properties
            .iter()
            .map(|(k, v)| {
                if is_secret_property(k) {
                    (k.as_str(), "[REDACTED]")
                } else {
                    (k.as_str(), v.as_str())
                }
            })
            .collect();

        f.debug_struct("StoreConfig")
            .field("bootstrap_servers", &self.bootstrap_servers)
            .field("topic", &self.topic)
            .field("security_protocol", &self.security_protocol)
            .field("group_id", &self.group_id)
            .field("replication_factor", &self.replication_factor)
            .field("timeout_ms", &self.timeout_ms)
            .field("init_timeout_ms", &self.init_timeout_ms)
            .field("sasl_mechanism", &self.sasl_mechanism)
            // REDACT sensitive credentials to prevent log exposure
            .field("sasl_username", &"[REDACTED]")
            .field("sasl_password", &"[REDACTED]")
            .field("ssl_ca_location", &self.ssl_ca_location)
            .field("max_append_retries", &self.max_append_retries)
            .field("max_consume_retries", &self.max_consume_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("client_properties", &client_properties)
            .finish()
    }
}

/// Upper-case form of a known protocol name, or the input unchanged
pub(crate) fn canonical_protocol(name: &str) -> String {
    name.parse::<SecurityProtocol>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|_| name.to_string())
}

fn set(props: &mut ClientProperties, key: &str, value: &str) {
    props.insert(key.to_string(), value.to_string());
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn is_secret_property(key: &str) -> bool {
    let key = key.to_lowercase();
    key.contains("password") || key.contains("secret")
}

fn parse_var<T: FromStr>(raw: Option<String>, field: &'static str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.map(|value| {
        value
            .trim()
            .parse::<T>()
            .map_err(|e| invalid(field, format!("{:?}: {}", value, e)))
    })
    .transpose()
}

/// Kafka's topic naming rules: 1..=249 chars of `[a-zA-Z0-9._-]`, not `.` or `..`
fn validate_topic_name(topic: &str) -> Result<(), ConfigError> {
    if topic.is_empty() {
        return Err(invalid("topic", "must not be empty"));
    }
    if topic.len() > MAX_TOPIC_NAME_LENGTH {
        return Err(invalid(
            "topic",
            format!(
                "must be at most {} characters, got {}",
                MAX_TOPIC_NAME_LENGTH,
                topic.len()
            ),
        ));
    }
    if topic == "." || topic == ".." {
        return Err(invalid("topic", "cannot be '.' or '..'"));
    }
    if let Some(c) = topic
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(invalid("topic", format!("illegal character {:?}", c)));
    }
    Ok(())
}
