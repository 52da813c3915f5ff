//! Store error types
//!
//! Every fallible store call reports one of three error families, split by
//! when the problem shows up and whether retrying can help:
//! - [`ConfigError`]: construction-time problems (bad security protocol, empty endpoint list)
//! - [`StoreError`]: everything the store surface can return, including
//!   initialization failures that leave the store unusable
//! - [`LogError`](super::platform::LogError): failures reported by the log platform,
//!   classified as transient or fatal

use thiserror::Error;

use super::platform::LogError;

/// Configuration errors
///
/// Raised while validating a [`StoreConfig`](crate::config::StoreConfig) or while
/// resolving broker endpoints into a bootstrap list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No endpoints were supplied for resolution
    #[error("No broker endpoints were supplied")]
    EmptyEndpoints,

    /// The security protocol name is not one Kafka recognizes
    #[error("Unsupported security protocol: {0}")]
    UnsupportedSecurityProtocol(String),

    /// None of the endpoints use the requested security protocol
    #[error("No endpoints found for security protocol {protocol}. Endpoints: {endpoints}")]
    NoMatchingEndpoints { protocol: String, endpoints: String },

    /// An endpoint string is not of the form `PROTOCOL://host:port`
    #[error("Malformed endpoint: {0}")]
    MalformedEndpoint(String),

    /// A configuration field has an invalid value
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors returned by the store
#[derive(Error, Debug)]
pub enum StoreError {
    /// init() was called on a store that is already initialized
    #[error("Store already initialized")]
    AlreadyInitialized,

    /// The existing changelog topic violates the compaction/partition requirements
    #[error("Invalid changelog topic {topic}: {reason}")]
    InvalidChangelogTopic { topic: String, reason: String },

    /// Broker endpoints could not be turned into a bootstrap list
    #[error("Failed to resolve bootstrap servers: {0}")]
    EndpointResolution(#[source] ConfigError),

    /// Any other failure during init()
    #[error("Store initialization failed: {0}")]
    Initialization(String),

    /// Operation attempted before init()
    #[error("Store is not initialized")]
    NotInitialized,

    /// Operation attempted after close(), or close() interrupted a waiting caller
    #[error("Store is closed")]
    Closed,

    /// An append could not be acknowledged
    #[error("Failed to append to {topic} after {attempts} attempt(s): {message}")]
    Append {
        topic: String,
        attempts: usize,
        message: String,
    },

    /// The tailer did not apply the awaited offset in time
    #[error(
        "Timed out after {timeout_ms}ms waiting for offset {offset} to be applied (last applied: {last_applied})"
    )]
    Timeout {
        offset: i64,
        last_applied: i64,
        timeout_ms: u64,
    },

    /// The tailer stopped permanently
    #[error("Changelog tailer failed: {0}")]
    TailerFailed(String),

    /// A key or value could not be converted to or from bytes
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The local cache rejected an operation
    #[error("Local cache error: {0}")]
    Cache(String),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Log platform error
    #[error(transparent)]
    Platform(#[from] LogError),
}

impl StoreError {
    /// True for errors that leave the store permanently unusable after init()
    pub fn is_initialization_error(&self) -> bool {
        matches!(
            self,
            StoreError::AlreadyInitialized
                | StoreError::InvalidChangelogTopic { .. }
                | StoreError::EndpointResolution(_)
                | StoreError::Initialization(_)
        )
    }

    /// True if a put/delete gave up waiting for the tailer
    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::InvalidChangelogTopic {
            topic: "_kafkastore".to_string(),
            reason: "3 partitions".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid changelog topic _kafkastore: 3 partitions"
        );

        let err = StoreError::Timeout {
            offset: 10,
            last_applied: 7,
            timeout_ms: 500,
        };
        let msg = err.to_string();
        assert!(msg.contains("500ms"));
        assert!(msg.contains("offset 10"));
        assert!(msg.contains("last applied: 7"));
    }

    #[test]
    fn test_initialization_errors() {
        assert!(StoreError::AlreadyInitialized.is_initialization_error());
        assert!(StoreError::EndpointResolution(ConfigError::EmptyEndpoints)
            .is_initialization_error());
        assert!(StoreError::Initialization("boom".to_string()).is_initialization_error());

        assert!(!StoreError::Closed.is_initialization_error());
        assert!(!StoreError::TailerFailed("gone".to_string()).is_initialization_error());
    }

    #[test]
    fn test_timeout_is_distinguishable() {
        let timeout = StoreError::Timeout {
            offset: 1,
            last_applied: 0,
            timeout_ms: 1,
        };
        assert!(timeout.is_timeout());
        assert!(!StoreError::Closed.is_timeout());
        assert!(!StoreError::Append {
            topic: "t".to_string(),
            attempts: 3,
            message: "broker down".to_string(),
        }
        .is_timeout());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: StoreError = ConfigError::UnsupportedSecurityProtocol("TRACE".to_string()).into();
        assert!(matches!(err, StoreError::Config(_)));
        assert_eq!(err.to_string(), "Unsupported security protocol: TRACE");
    }

    #[test]
    fn test_endpoint_resolution_keeps_source() {
        use std::error::Error;

        let err = StoreError::EndpointResolution(ConfigError::NoMatchingEndpoints {
            protocol: "SSL".to_string(),
            endpoints: "PLAINTEXT://a:1".to_string(),
        });
        let source = err.source().expect("source");
        assert!(source.to_string().contains("SSL"));
    }
}
