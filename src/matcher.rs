//! Request matching
//!
//! Decides whether a stored interaction answers an incoming request. The
//! default is "approximate" matching: method and scheme/host/port/path must
//! be exactly equal, the query string is compared as an unordered multiset,
//! and bodies are never compared (JSON body key order is not stable across
//! encoders).

use hyper::Uri;

use crate::cassette::Interaction;
use crate::request::{parse_query, InboundRequest};

/// Default approximate matcher
///
/// Fails closed when the stored URL cannot be decomposed into components.
pub fn approximate(entry: &Interaction, incoming: &InboundRequest) -> bool {
    if entry.request.method != incoming.method {
        return false;
    }

    let Ok(stored) = entry.request.url.parse::<Uri>() else {
        return false;
    };

    urls_approximately_equal(&stored, &incoming.url)
}

fn urls_approximately_equal(stored: &Uri, incoming: &Uri) -> bool {
    // Relative URLs cannot be decomposed into host/port; refuse to match.
    if stored.host().is_none() || incoming.host().is_none() {
        return false;
    }

    stored.scheme_str() == incoming.scheme_str()
        && stored.host() == incoming.host()
        && stored.port_u16() == incoming.port_u16()
        && stored.path() == incoming.path()
        && sorted_pairs(stored.query()) == sorted_pairs(incoming.query())
}

/// Query pairs as a sortable multiset
fn sorted_pairs(query: Option<&str>) -> Vec<(String, String)> {
    let mut pairs = parse_query(query.unwrap_or(""));
    pairs.sort();
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette::{StoredRequest, StoredResponse};
    use std::collections::BTreeMap;

    fn entry(method: &str, url: &str) -> Interaction {
        Interaction {
            request: StoredRequest {
                url: url.to_string(),
                method: method.to_string(),
                headers: BTreeMap::new(),
                body: None,
            },
            response: StoredResponse {
                status: "200 OK".to_string(),
                headers: BTreeMap::new(),
                body: String::new(),
                body_encoding_raw: 0,
                elapsed_time: 0.0,
            },
        }
    }

    fn incoming(method: &str, url: &str) -> InboundRequest {
        InboundRequest {
            method: method.to_string(),
            url: url.parse().unwrap(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    #[test]
    fn test_exact_match() {
        let entry = entry("GET", "https://api.example.com/items");
        assert!(approximate(&entry, &incoming("GET", "https://api.example.com/items")));
    }

    #[test]
    fn test_method_mismatch() {
        let entry = entry("GET", "https://api.example.com/items");
        assert!(!approximate(&entry, &incoming("POST", "https://api.example.com/items")));
    }

    #[test]
    fn test_method_is_case_sensitive() {
        let entry = entry("get", "https://api.example.com/items");
        assert!(!approximate(&entry, &incoming("GET", "https://api.example.com/items")));
    }

    #[test]
    fn test_host_and_path_must_match() {
        let entry = entry("GET", "https://api.example.com/items");
        assert!(!approximate(&entry, &incoming("GET", "https://other.example.com/items")));
        assert!(!approximate(&entry, &incoming("GET", "https://api.example.com/other")));
    }

    #[test]
    fn test_scheme_and_port_must_match() {
        let entry = entry("GET", "https://api.example.com/items");
        assert!(!approximate(&entry, &incoming("GET", "http://api.example.com/items")));

        let entry = self::entry("GET", "http://api.example.com:8080/items");
        assert!(!approximate(&entry, &incoming("GET", "http://api.example.com:9090/items")));
    }

    #[test]
    fn test_query_order_irrelevant() {
        let entry = entry("GET", "https://api.example.com/items?b=2&a=1");
        assert!(approximate(&entry, &incoming("GET", "https://api.example.com/items?a=1&b=2")));
    }

    #[test]
    fn test_query_values_compared() {
        let entry = entry("GET", "https://api.example.com/items?a=1");
        assert!(!approximate(&entry, &incoming("GET", "https://api.example.com/items?a=2")));
        assert!(!approximate(&entry, &incoming("GET", "https://api.example.com/items")));
    }

    #[test]
    fn test_duplicate_keys_are_multiset() {
        let entry = entry("GET", "https://api.example.com/items?a=1&a=2");
        assert!(approximate(&entry, &incoming("GET", "https://api.example.com/items?a=2&a=1")));
        assert!(!approximate(&entry, &incoming("GET", "https://api.example.com/items?a=1")));
        assert!(!approximate(&entry, &incoming("GET", "https://api.example.com/items?a=1&a=1")));
    }

    #[test]
    fn test_body_never_compared() {
        let mut recorded = entry("POST", "https://api.example.com/items");
        recorded.request.body = Some("{\"a\":1,\"b\":2}".to_string());

        let mut request = incoming("POST", "https://api.example.com/items");
        request.body = Some(bytes::Bytes::from_static(b"{\"b\":2,\"a\":1}"));

        assert!(approximate(&recorded, &request));
    }

    #[test]
    fn test_unparseable_stored_url_fails_closed() {
        let entry = entry("GET", "http://exa mple.com/items");
        assert!(!approximate(&entry, &incoming("GET", "http://example.com/items")));
    }

    #[test]
    fn test_relative_stored_url_fails_closed() {
        let entry = entry("GET", "/items");
        assert!(!approximate(&entry, &incoming("GET", "http://example.com/items")));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn pair() -> impl Strategy<Value = (String, String)> {
            ("[a-z]{1,8}", "[a-z0-9]{0,8}").prop_map(|(k, v)| (k, v))
        }

        fn query_string(pairs: &[(String, String)]) -> String {
            pairs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&")
        }

        proptest! {
            #[test]
            fn match_is_query_order_independent(
                pairs in proptest::collection::vec(pair(), 0..6)
            ) {
                let shuffled = {
                    let mut reversed = pairs.clone();
                    reversed.reverse();
                    reversed
                };

                let stored_url = format!(
                    "http://example.com/items?{}",
                    query_string(&pairs)
                );
                let incoming_url = format!(
                    "http://example.com/items?{}",
                    query_string(&shuffled)
                );

                let recorded = entry("GET", &stored_url);
                prop_assert!(approximate(&recorded, &incoming("GET", &incoming_url)));
            }

            #[test]
            fn extra_parameter_never_matches(
                pairs in proptest::collection::vec(pair(), 0..5)
            ) {
                let stored_url = format!(
                    "http://example.com/items?{}",
                    query_string(&pairs)
                );
                let mut extended = pairs.clone();
                extended.push(("zzextra".to_string(), "1".to_string()));
                let incoming_url = format!(
                    "http://example.com/items?{}",
                    query_string(&extended)
                );

                let recorded = entry("GET", &stored_url);
                prop_assert!(!approximate(&recorded, &incoming("GET", &incoming_url)));
            }
        }
    }
}
