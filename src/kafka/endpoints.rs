//! Broker endpoint resolution
//!
//! This module turns advertised broker listener metadata into connection
//! strings of the form `PROTOCOL://host:port`, and filters such strings by a
//! security protocol into the comma-joined bootstrap list handed to the
//! producer and consumer.
//!
//! Everything here is a pure function: no client, no I/O.
//!
//! # Usage
//!
//! ```rust
//! use kafkastore::kafka::endpoints::{
//!     brokers_to_endpoints, endpoints_to_bootstrap_servers, BrokerListener, SecurityProtocol,
//! };
//!
//! let brokers = vec![
//!     BrokerListener::new(0, "kafka0", 9092, "CLIENT", SecurityProtocol::Plaintext),
//!     BrokerListener::new(1, "kafka1", 9093, "SECURE", SecurityProtocol::SaslSsl),
//! ];
//! let endpoints = brokers_to_endpoints(&brokers);
//! assert_eq!(endpoints, vec!["PLAINTEXT://kafka0:9092", "SASL_SSL://kafka1:9093"]);
//!
//! let bootstrap = endpoints_to_bootstrap_servers(&endpoints, "SASL_SSL").unwrap();
//! assert_eq!(bootstrap, "SASL_SSL://kafka1:9093");
//! ```

use std::fmt;
use std::str::FromStr;

use super::error::ConfigError;

/// Separator between the protocol and the address in an endpoint string
const PROTOCOL_SEPARATOR: &str = "://";

/// Security protocols a Kafka listener can advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SecurityProtocol {
    /// Unauthenticated, unencrypted
    #[default]
    Plaintext,
    /// TLS
    Ssl,
    /// SASL authentication without TLS
    SaslPlaintext,
    /// SASL authentication over TLS
    SaslSsl,
}

impl SecurityProtocol {
    /// Every recognized protocol, in Kafka's canonical order
    pub const ALL: [SecurityProtocol; 4] = [
        SecurityProtocol::Plaintext,
        SecurityProtocol::Ssl,
        SecurityProtocol::SaslPlaintext,
        SecurityProtocol::SaslSsl,
    ];

    /// Canonical (upper-case) protocol name
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityProtocol::Plaintext => "PLAINTEXT",
            SecurityProtocol::Ssl => "SSL",
            SecurityProtocol::SaslPlaintext => "SASL_PLAINTEXT",
            SecurityProtocol::SaslSsl => "SASL_SSL",
        }
    }

    /// True for SASL_PLAINTEXT and SASL_SSL
    pub fn uses_sasl(&self) -> bool {
        matches!(
            self,
            SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl
        )
    }

    /// True for SSL and SASL_SSL
    pub fn uses_tls(&self) -> bool {
        matches!(self, SecurityProtocol::Ssl | SecurityProtocol::SaslSsl)
    }
}

impl FromStr for SecurityProtocol {
    type Err = ConfigError;

    /// Parse a protocol name, ignoring case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        SecurityProtocol::ALL
            .into_iter()
            .find(|p| p.as_str() == upper)
            .ok_or_else(|| ConfigError::UnsupportedSecurityProtocol(s.to_string()))
    }
}

impl fmt::Display for SecurityProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One advertised listener of one broker
///
/// A broker with several listeners appears once per listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerListener {
    /// Broker node id
    pub id: i32,
    /// Advertised host
    pub host: String,
    /// Advertised port
    pub port: u16,
    /// Listener name (e.g. `CLIENT`, `REPLICATION`, or the protocol name itself)
    pub listener_name: String,
    /// Security protocol the listener speaks
    pub security_protocol: SecurityProtocol,
}

impl BrokerListener {
    pub fn new(
        id: i32,
        host: impl Into<String>,
        port: u16,
        listener_name: impl Into<String>,
        security_protocol: SecurityProtocol,
    ) -> Self {
        Self {
            id,
            host: host.into(),
            port,
            listener_name: listener_name.into(),
            security_protocol,
        }
    }

    /// Connection string for this listener: `<protocol>://<host>:<port>`
    ///
    /// The listener's own protocol is used, whatever its name says.
    pub fn endpoint(&self) -> String {
        format!(
            "{}{}{}:{}",
            self.security_protocol, PROTOCOL_SEPARATOR, self.host, self.port
        )
    }
}

/// A parsed `PROTOCOL://host:port` connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl BrokerEndpoint {
    /// `host:port`, the form librdkafka expects in `bootstrap.servers`
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Map broker listeners to connection strings
///
/// One entry per input listener, in input order, duplicates preserved.
pub fn brokers_to_endpoints(brokers: &[BrokerListener]) -> Vec<String> {
    brokers.iter().map(BrokerListener::endpoint).collect()
}

/// Filter connection strings by security protocol into a bootstrap list
///
/// Keeps the entries whose protocol prefix equals `security_protocol`
/// (case-sensitive), in input order with duplicates, joined by commas.
///
/// # Errors
/// - [`ConfigError::EmptyEndpoints`] if `endpoints` is empty
/// - [`ConfigError::UnsupportedSecurityProtocol`] if `security_protocol` is not a
///   recognized protocol name, even when an entry carries that literal prefix
/// - [`ConfigError::NoMatchingEndpoints`] if no entry uses the protocol
pub fn endpoints_to_bootstrap_servers<S: AsRef<str>>(
    endpoints: &[S],
    security_protocol: &str,
) -> Result<String, ConfigError> {
    if endpoints.is_empty() {
        return Err(ConfigError::EmptyEndpoints);
    }

    security_protocol.parse::<SecurityProtocol>()?;

    let matching: Vec<&str> = endpoints
        .iter()
        .map(AsRef::as_ref)
        .filter(|endpoint| endpoint_protocol(endpoint) == Some(security_protocol))
        .collect();

    if matching.is_empty() {
        return Err(ConfigError::NoMatchingEndpoints {
            protocol: security_protocol.to_string(),
            endpoints: endpoints
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<_>>()
                .join(","),
        });
    }

    Ok(matching.join(","))
}

/// Protocol prefix of an endpoint string, if it has one
fn endpoint_protocol(endpoint: &str) -> Option<&str> {
    endpoint
        .split_once(PROTOCOL_SEPARATOR)
        .map(|(protocol, _)| protocol)
}

/// Parse a `PROTOCOL://host:port` connection string
pub fn parse_endpoint(endpoint: &str) -> Result<BrokerEndpoint, ConfigError> {
    let malformed = || ConfigError::MalformedEndpoint(endpoint.to_string());

    let (protocol, address) = endpoint
        .trim()
        .split_once(PROTOCOL_SEPARATOR)
        .ok_or_else(malformed)?;
    let (host, port) = address.rsplit_once(':').ok_or_else(malformed)?;
    if protocol.is_empty() || host.is_empty() {
        return Err(malformed());
    }
    let port = port.parse::<u16>().map_err(|_| malformed())?;

    Ok(BrokerEndpoint {
        protocol: protocol.to_string(),
        host: host.to_string(),
        port,
    })
}

/// Strip protocol prefixes from a comma-joined endpoint list
///
/// `"SSL://a:1,SSL://b:2"` becomes `"a:1,b:2"`. Entries without a prefix
/// are kept as they are.
pub fn strip_protocols(bootstrap_servers: &str) -> String {
    bootstrap_servers
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once(PROTOCOL_SEPARATOR)
                .map_or(entry, |(_, address)| address)
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixed_endpoints() -> Vec<String> {
        vec![
            "PLAINTEXT://localhost0:1234".to_string(),
            "PLAINTEXT://localhost1:1234".to_string(),
            "SASL_PLAINTEXT://localhost1:1235".to_string(),
            "SSL://localhost1:1236".to_string(),
            "SASL_SSL://localhost2:1234".to_string(),
            "TRACE://localhost3:1234".to_string(),
        ]
    }

    #[test]
    fn test_filter_single_plaintext() {
        let endpoint = "PLAINTEXT://hostname:1234";
        assert_eq!(
            endpoints_to_bootstrap_servers(&[endpoint], "PLAINTEXT").unwrap(),
            endpoint
        );
    }

    #[test]
    fn test_filter_empty_endpoints() {
        let endpoints: Vec<String> = Vec::new();
        assert_eq!(
            endpoints_to_bootstrap_servers(&endpoints, "PLAINTEXT"),
            Err(ConfigError::EmptyEndpoints)
        );
    }

    #[test]
    fn test_filter_no_protocol_match() {
        let result = endpoints_to_bootstrap_servers(&["SSL://localhost:1234"], "PLAINTEXT");
        assert!(matches!(
            result,
            Err(ConfigError::NoMatchingEndpoints { ref protocol, .. }) if protocol == "PLAINTEXT"
        ));
    }

    #[test]
    fn test_filter_unsupported_protocol() {
        // TRACE is rejected even though an entry carries that prefix
        let result = endpoints_to_bootstrap_servers(&["TRACE://localhost:1234"], "TRACE");
        assert_eq!(
            result,
            Err(ConfigError::UnsupportedSecurityProtocol("TRACE".to_string()))
        );
    }

    #[test]
    fn test_filter_mixed() {
        let endpoints = mixed_endpoints();

        assert_eq!(
            endpoints_to_bootstrap_servers(&endpoints, "PLAINTEXT").unwrap(),
            "PLAINTEXT://localhost0:1234,PLAINTEXT://localhost1:1234"
        );
        assert_eq!(
            endpoints_to_bootstrap_servers(&endpoints, "SASL_PLAINTEXT").unwrap(),
            "SASL_PLAINTEXT://localhost1:1235"
        );
        assert_eq!(
            endpoints_to_bootstrap_servers(&endpoints, "SSL").unwrap(),
            "SSL://localhost1:1236"
        );
        assert_eq!(
            endpoints_to_bootstrap_servers(&endpoints, "SASL_SSL").unwrap(),
            "SASL_SSL://localhost2:1234"
        );
    }

    #[test]
    fn test_filter_is_case_sensitive() {
        // "plaintext" is a recognized protocol name, but no prefix matches it exactly
        let result = endpoints_to_bootstrap_servers(&["PLAINTEXT://localhost:1234"], "plaintext");
        assert!(matches!(
            result,
            Err(ConfigError::NoMatchingEndpoints { .. })
        ));
    }

    #[test]
    fn test_filter_keeps_duplicates() {
        let endpoints = ["SSL://a:1", "PLAINTEXT://b:2", "SSL://a:1"];
        assert_eq!(
            endpoints_to_bootstrap_servers(&endpoints, "SSL").unwrap(),
            "SSL://a:1,SSL://a:1"
        );
    }

    #[test]
    fn test_brokers_to_endpoints() {
        let brokers = vec![
            BrokerListener::new(0, "localhost", 1, "CLIENT", SecurityProtocol::Plaintext),
            BrokerListener::new(1, "localhost1", 12, "PLAINTEXT", SecurityProtocol::Plaintext),
            BrokerListener::new(
                2,
                "localhost2",
                123,
                "SECURE_REPLICATION",
                SecurityProtocol::SaslPlaintext,
            ),
            BrokerListener::new(
                2,
                "localhost2",
                123,
                "SASL_PLAINTEXT",
                SecurityProtocol::SaslPlaintext,
            ),
            BrokerListener::new(3, "localhost3", 1234, "SSL", SecurityProtocol::Ssl),
        ];

        let endpoints = brokers_to_endpoints(&brokers);

        assert_eq!(
            endpoints,
            vec![
                "PLAINTEXT://localhost:1",
                "PLAINTEXT://localhost1:12",
                "SASL_PLAINTEXT://localhost2:123",
                "SASL_PLAINTEXT://localhost2:123",
                "SSL://localhost3:1234",
            ]
        );
    }

    #[test]
    fn test_brokers_to_endpoints_empty() {
        assert!(brokers_to_endpoints(&[]).is_empty());
    }

    #[test]
    fn test_security_protocol_parse() {
        assert_eq!(
            "SASL_SSL".parse::<SecurityProtocol>().unwrap(),
            SecurityProtocol::SaslSsl
        );
        assert_eq!(
            "sasl_plaintext".parse::<SecurityProtocol>().unwrap(),
            SecurityProtocol::SaslPlaintext
        );
        assert!("TRACE".parse::<SecurityProtocol>().is_err());
        assert!("".parse::<SecurityProtocol>().is_err());

        for protocol in SecurityProtocol::ALL {
            assert_eq!(protocol.as_str().parse::<SecurityProtocol>().unwrap(), protocol);
        }
    }

    #[test]
    fn test_security_protocol_flags() {
        assert!(!SecurityProtocol::Plaintext.uses_sasl());
        assert!(!SecurityProtocol::Plaintext.uses_tls());
        assert!(SecurityProtocol::SaslSsl.uses_sasl());
        assert!(SecurityProtocol::SaslSsl.uses_tls());
        assert!(SecurityProtocol::Ssl.uses_tls());
        assert!(SecurityProtocol::SaslPlaintext.uses_sasl());
    }

    #[test]
    fn test_parse_endpoint() {
        let endpoint = parse_endpoint("SASL_SSL://broker.example.com:9093").unwrap();
        assert_eq!(endpoint.protocol, "SASL_SSL");
        assert_eq!(endpoint.host, "broker.example.com");
        assert_eq!(endpoint.port, 9093);
        assert_eq!(endpoint.address(), "broker.example.com:9093");

        let ipv6 = parse_endpoint("PLAINTEXT://[::1]:9092").unwrap();
        assert_eq!(ipv6.host, "[::1]");
        assert_eq!(ipv6.port, 9092);

        assert!(parse_endpoint("localhost:9092").is_err());
        assert!(parse_endpoint("PLAINTEXT://localhost").is_err());
        assert!(parse_endpoint("PLAINTEXT://localhost:notaport").is_err());
        assert!(parse_endpoint("://localhost:9092").is_err());
    }

    #[test]
    fn test_strip_protocols() {
        assert_eq!(
            strip_protocols("SSL://a:1,SSL://b:2"),
            "a:1,b:2"
        );
        assert_eq!(strip_protocols("a:1, PLAINTEXT://b:2"), "a:1,b:2");
        assert_eq!(strip_protocols(""), "");
    }
}
