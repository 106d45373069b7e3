//! Recorded interaction types
//!
//! Wire shape:
//! `{"entries":[{"request":{url,method,headers,body?},"response":{status,headers,body,bodyEncodingRaw,elapsedTime}}]}`
//!
//! Every field defaults on deserialization so a hand-edited cassette with
//! missing keys still loads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The request half of a recorded exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRequest {
    /// Absolute URL (scheme + host + path + query)
    #[serde(default)]
    pub url: String,
    /// HTTP method
    #[serde(default)]
    pub method: String,
    /// Header mapping, keys as received
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body as decoded text, absent when the request had none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// The response half of a recorded exchange
///
/// Headers never contain `Content-Length` (recomputed on replay) nor a gzip
/// `Content-Encoding` entry (the payload is stored decompressed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    /// Status line, e.g. "200 OK"
    #[serde(default = "default_status")]
    pub status: String,
    /// Header mapping
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Body as text, decoded with the declared character encoding
    #[serde(default)]
    pub body: String,
    /// Numeric identifier of the body's character encoding
    #[serde(rename = "bodyEncodingRaw", default)]
    pub body_encoding_raw: u32,
    /// Wall-clock seconds between sending the request and the full response
    #[serde(rename = "elapsedTime", default)]
    pub elapsed_time: f64,
}

fn default_status() -> String {
    "200 OK".to_string()
}

/// One captured request/response exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// The request as it was sent upstream
    pub request: StoredRequest,
    /// The response it produced
    pub response: StoredResponse,
}

/// Ordered sequence of interactions, consumed in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cassette {
    /// Recorded interactions, oldest first
    #[serde(default)]
    pub entries: Vec<Interaction>,
}
