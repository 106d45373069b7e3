//! Capture pipeline
//!
//! Forwards the inbound request to the live backend, records the exchange on
//! the cassette, then replays the live response to the caller. The append
//! always happens before anything is emitted.

use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use flate2::read::GzDecoder;
use hyper::Uri;
use tracing::{debug, warn};

use crate::cassette::{
    charset_from_content_type, decode_body, encoding_for_charset, encoding_id, CassetteStore,
    Interaction, StoredResponse,
};
use crate::config::CaptureErrorHook;
use crate::request::InboundRequest;
use crate::server::ResponseSink;
use crate::{DeckError, Result};

use super::client::{UpstreamClient, UpstreamResponse};

/// Handler for capture mode
pub struct CaptureHandler {
    store: Arc<CassetteStore>,
    client: UpstreamClient,
    base: Uri,
    on_error: Option<Arc<CaptureErrorHook>>,
}

impl CaptureHandler {
    /// Create a capture handler proxying toward `base`
    ///
    /// # Errors
    ///
    /// Returns error if the upstream client cannot be constructed
    pub fn new(
        store: Arc<CassetteStore>,
        base: Uri,
        on_error: Option<Arc<CaptureErrorHook>>,
    ) -> Result<Self> {
        Ok(Self {
            store,
            client: UpstreamClient::new()?,
            base,
            on_error,
        })
    }

    /// Proxy one request live, record it, and emit the response
    ///
    /// Failures are terminal for this request: the error callback fires,
    /// nothing is emitted, nothing is appended.
    pub async fn handle(&self, request: InboundRequest, mut sink: ResponseSink) {
        if let Err(e) = self.try_handle(request, &mut sink).await {
            warn!(error = %e, "Capture failed, request dropped");
            if let Some(hook) = &self.on_error {
                hook(&e);
            }
        }
    }

    async fn try_handle(&self, mut request: InboundRequest, sink: &mut ResponseSink) -> Result<()> {
        request.rebase(&self.base)?;

        let start = Instant::now();
        let upstream = self.client.forward(&request).await?;
        let elapsed = start.elapsed().as_secs_f64();

        let (stored, emit_body) = stored_from_upstream(upstream, elapsed)?;
        let status = stored.status.clone();
        let headers = stored.headers.clone();

        let entry = Interaction {
            request: request.to_stored(),
            response: stored,
        };
        self.store.append(entry).await?;

        debug!(
            method = %request.method,
            url = %request.url,
            elapsed_secs = elapsed,
            "Captured interaction"
        );

        sink.send_status(&status, &headers);
        if !emit_body.is_empty() {
            sink.send_body(emit_body);
        }
        sink.send_body(Bytes::new());

        Ok(())
    }
}

/// Turn a live response into its cassette form plus the bytes to emit
///
/// Derives the status line from a `Status` header (defaulting to "200 OK"),
/// decompresses a gzip payload, strips `Content-Encoding: gzip` and
/// `Content-Length`, and decodes the body text per the declared charset.
fn stored_from_upstream(
    upstream: UpstreamResponse,
    elapsed: f64,
) -> Result<(StoredResponse, Bytes)> {
    if upstream.body.is_empty() {
        return Err(DeckError::EmptyBody);
    }

    let mut headers = upstream.headers;

    let status = headers
        .get("status")
        .cloned()
        .unwrap_or_else(|| "200 OK".to_string());

    let body = if headers
        .get("content-encoding")
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"))
    {
        headers.remove("content-encoding");
        Bytes::from(gunzip(&upstream.body)?)
    } else {
        upstream.body
    };

    // Recomputed from the replayed byte count, so manual cassette edits work.
    headers.remove("content-length");

    let encoding = encoding_for_charset(
        headers
            .get("content-type")
            .and_then(|ct| charset_from_content_type(ct)),
    );

    let stored = StoredResponse {
        status,
        headers,
        body: decode_body(&body, encoding),
        body_encoding_raw: encoding_id(encoding),
        elapsed_time: elapsed,
    };

    Ok((stored, body))
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| DeckError::MalformedResponse(format!("gzip payload: {e}")))?;
    Ok(decompressed)
}
