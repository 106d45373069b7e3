//! HTTP client for forwarding captured requests to the live backend

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::Method;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::request::InboundRequest;
use crate::{DeckError, Result};

/// Client used for the single live call a capture performs
pub struct UpstreamClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

/// Fully buffered response from the live backend
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers (hyper yields lowercase names)
    pub headers: BTreeMap<String, String>,
    /// Raw response body
    pub body: Bytes,
}

impl UpstreamClient {
    /// Create a new upstream client
    ///
    /// # Errors
    ///
    /// Returns error if the TLS root store cannot be loaded
    pub fn new() -> Result<Self> {
        let https = HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| DeckError::Upstream(format!("TLS setup failed: {e}")))?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build(https);

        Ok(Self { client })
    }

    /// Forward a rebased request to the live backend and buffer the response
    ///
    /// The outbound call always carries `Cache-Control: no-cache` so no
    /// intermediary serves it from a cache.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be built or the transport fails
    pub async fn forward(&self, request: &InboundRequest) -> Result<UpstreamResponse> {
        debug!("Forwarding {} to {}", request.method, request.url);

        let method = request
            .method
            .parse::<Method>()
            .map_err(|e| DeckError::InvalidRequest(format!("Invalid HTTP method: {e}")))?;

        let mut builder = hyper::Request::builder()
            .method(method)
            .uri(request.url.clone());

        for (name, value) in &request.headers {
            if name.eq_ignore_ascii_case("cache-control") {
                continue;
            }
            builder = builder.header(name, value);
        }
        builder = builder.header("Cache-Control", "no-cache");

        let body = request.body.clone().unwrap_or_default();
        let outbound = builder
            .body(Full::new(body))
            .map_err(|e| DeckError::InvalidRequest(format!("Failed to build request: {e}")))?;

        let response = self
            .client
            .request(outbound)
            .await
            .map_err(|e| DeckError::Upstream(e.to_string()))?;

        let status = response.status().as_u16();
        let mut headers = BTreeMap::new();
        for (name, value) in response.headers() {
            match value.to_str() {
                Ok(value) => {
                    headers.insert(name.to_string(), value.to_string());
                }
                Err(_) => warn!(header = %name, "Dropping non-text upstream header"),
            }
        }

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| DeckError::MalformedResponse(format!("Body read failed: {e}")))?
            .to_bytes();

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
