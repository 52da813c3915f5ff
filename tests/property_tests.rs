// Property-based tests using proptest for endpoint resolution
//
// These tests generate random broker listener sets and endpoint lists to
// verify filtering keeps order and duplicates, and never invents entries.

#[cfg(test)]
mod property_tests {
    use kafkastore::kafka::endpoints::{parse_endpoint, strip_protocols};
    use kafkastore::kafka::{
        brokers_to_endpoints, endpoints_to_bootstrap_servers, BrokerListener, SecurityProtocol,
    };
    use kafkastore::ConfigError;
    use proptest::prelude::*;

    fn protocol() -> impl Strategy<Value = SecurityProtocol> {
        prop::sample::select(SecurityProtocol::ALL.to_vec())
    }

    fn listener() -> impl Strategy<Value = BrokerListener> {
        (0i32..10, "[a-z][a-z0-9-]{0,11}", 1u16.., protocol()).prop_map(
            |(id, host, port, protocol)| {
                BrokerListener::new(id, host, port, protocol.as_str(), protocol)
            },
        )
    }

    proptest! {
        #[test]
        fn test_brokers_to_endpoints_preserves_length_and_order(
            brokers in prop::collection::vec(listener(), 0..12)
        ) {
            // Property: one endpoint per listener, in input order
            let endpoints = brokers_to_endpoints(&brokers);
            prop_assert_eq!(endpoints.len(), brokers.len());

            for (endpoint, broker) in endpoints.iter().zip(&brokers) {
                let parsed = parse_endpoint(endpoint).unwrap();
                prop_assert_eq!(parsed.protocol.as_str(), broker.security_protocol.as_str());
                prop_assert_eq!(&parsed.host, &broker.host);
                prop_assert_eq!(parsed.port, broker.port);
            }
        }

        #[test]
        fn test_filter_is_an_ordered_subsequence(
            brokers in prop::collection::vec(listener(), 1..12),
            wanted in protocol()
        ) {
            // Property: the result is exactly the matching entries, in order
            let endpoints = brokers_to_endpoints(&brokers);
            let expected: Vec<&String> = endpoints
                .iter()
                .filter(|e| e.starts_with(&format!("{}://", wanted)))
                .collect();

            match endpoints_to_bootstrap_servers(&endpoints, wanted.as_str()) {
                Ok(joined) => {
                    let got: Vec<&str> = joined.split(',').collect();
                    prop_assert_eq!(got.len(), expected.len());
                    for (g, e) in got.iter().zip(&expected) {
                        prop_assert_eq!(*g, e.as_str());
                    }
                }
                Err(ConfigError::NoMatchingEndpoints { .. }) => {
                    prop_assert!(expected.is_empty());
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        }

        #[test]
        fn test_unknown_protocol_always_rejected(
            endpoints in prop::collection::vec("[A-Z_]{1,10}://[a-z]{1,8}:[0-9]{1,5}", 1..8),
            name in "[A-Z_]{1,10}"
        ) {
            // Property: only the four known protocol names are accepted
            prop_assume!(name.parse::<SecurityProtocol>().is_err());
            let result = endpoints_to_bootstrap_servers(&endpoints, &name);
            prop_assert!(
                matches!(result, Err(ConfigError::UnsupportedSecurityProtocol(_))),
                "expected unsupported protocol error"
            );
        }

        #[test]
        fn test_strip_protocols_keeps_addresses(
            brokers in prop::collection::vec(listener(), 1..8)
        ) {
            // Property: stripping leaves host:port for every entry
            let joined = brokers_to_endpoints(&brokers).join(",");
            let stripped = strip_protocols(&joined);
            let expected: Vec<String> = brokers
                .iter()
                .map(|b| format!("{}:{}", b.host, b.port))
                .collect();
            prop_assert_eq!(stripped, expected.join(","));
        }
    }
}
