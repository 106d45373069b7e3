//! Normalized inbound requests
//!
//! The server substrate hands us raw hyper parts; everything downstream works
//! on an [`InboundRequest`] carrying an absolute URL.

use std::collections::BTreeMap;

use bytes::Bytes;
use hyper::http::uri::PathAndQuery;
use hyper::Uri;

use crate::cassette::StoredRequest;
use crate::{DeckError, Result};

/// One normalized inbound request
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// HTTP method (e.g., "GET", "POST")
    pub method: String,
    /// Absolute request URL
    pub url: Uri,
    /// Header mapping, keys as received
    pub headers: BTreeMap<String, String>,
    /// Fully received body, if any
    pub body: Option<Bytes>,
}

impl InboundRequest {
    /// Normalize a raw hyper request into an [`InboundRequest`]
    ///
    /// The inbound URI is usually origin-form; the absolute URL is rebuilt
    /// from the `Host` header.
    ///
    /// # Errors
    ///
    /// Returns error if no absolute URL can be derived
    pub fn from_hyper(parts: &hyper::http::request::Parts, body: Bytes) -> Result<Self> {
        let mut headers = BTreeMap::new();
        for (name, value) in &parts.headers {
            let value = value
                .to_str()
                .map_err(|_| DeckError::InvalidRequest(format!("Non-text header: {name}")))?;
            headers.insert(name.to_string(), value.to_string());
        }

        let url = if parts.uri.authority().is_some() {
            parts.uri.clone()
        } else {
            let host = headers
                .get("host")
                .or_else(|| headers.get("Host"))
                .ok_or_else(|| {
                    DeckError::InvalidRequest("Missing Host header on origin-form URI".to_string())
                })?;
            let path_and_query = parts
                .uri
                .path_and_query()
                .map_or("/", PathAndQuery::as_str);
            format!("http://{host}{path_and_query}")
                .parse::<Uri>()
                .map_err(|e| DeckError::InvalidRequest(format!("Unparseable URL: {e}")))?
        };

        Ok(Self {
            method: parts.method.to_string(),
            url,
            headers,
            body: if body.is_empty() { None } else { Some(body) },
        })
    }

    /// Rewrite scheme/host/port to the given base URL, preserving
    /// path, query, method, headers, and body
    ///
    /// # Errors
    ///
    /// Returns error if the base URL lacks scheme or authority
    pub fn rebase(&mut self, base: &Uri) -> Result<()> {
        let scheme = base
            .scheme()
            .ok_or_else(|| DeckError::Config("Base URL missing scheme".to_string()))?
            .clone();
        let authority = base
            .authority()
            .ok_or_else(|| DeckError::Config("Base URL missing host".to_string()))?
            .clone();

        let path_and_query = self
            .url
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        let host = authority.host().to_string();
        self.url = Uri::builder()
            .scheme(scheme)
            .authority(authority)
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| DeckError::InvalidRequest(format!("Rebase failed: {e}")))?;

        self.headers.remove("host");
        self.headers.insert("Host".to_string(), host);

        Ok(())
    }

    /// Query string as decoded key/value pairs, duplicates preserved
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        parse_query(self.url.query().unwrap_or(""))
    }

    /// Convert into the cassette representation
    #[must_use]
    pub fn to_stored(&self) -> StoredRequest {
        StoredRequest {
            url: self.url.to_string(),
            method: self.method.clone(),
            headers: self.headers.clone(),
            body: self
                .body
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).into_owned()),
        }
    }
}

/// Parse a raw query string into decoded key/value pairs
#[must_use]
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), std::borrow::Cow::into_owned)
}
