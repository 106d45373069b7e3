//! Playback pipeline
//!
//! Looks up a recorded interaction for the incoming request, removes it from
//! the cassette (single use), and emits it after a simulated delay equal to
//! the original call's elapsed time. Misses are a normal outcome and answer
//! with a synthetic 404.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hyper::Uri;
use tracing::{debug, info};

use crate::cassette::{encode_body, CassetteStore};
use crate::config::{Matcher, Transformer, UnrecordedHook};
use crate::matcher::approximate;
use crate::request::InboundRequest;
use crate::server::ResponseSink;

/// Handler for playback mode
pub struct PlaybackHandler {
    store: Arc<CassetteStore>,
    base: Uri,
    matcher: Option<Arc<Matcher>>,
    transformer: Option<Arc<Transformer>>,
    on_unrecorded: Option<Arc<UnrecordedHook>>,
}

impl PlaybackHandler {
    /// Create a playback handler matching against `base`-rebased requests
    #[must_use]
    pub fn new(
        store: Arc<CassetteStore>,
        base: Uri,
        matcher: Option<Arc<Matcher>>,
        transformer: Option<Arc<Transformer>>,
        on_unrecorded: Option<Arc<UnrecordedHook>>,
    ) -> Self {
        Self {
            store,
            base,
            matcher,
            transformer,
            on_unrecorded,
        }
    }

    /// Serve one request from the cassette
    pub async fn handle(&self, request: InboundRequest, mut sink: ResponseSink) {
        // Rebased copy for matching only; hooks see the original request.
        let mut routed = request.clone();
        if routed.rebase(&self.base).is_err() {
            self.miss(&request, &mut sink);
            return;
        }

        let taken = match &self.matcher {
            Some(custom) => self.store.take_matching(&routed, custom.as_ref()).await,
            None => self.store.take_matching(&routed, &approximate).await,
        };

        let Some(entry) = taken else {
            self.miss(&request, &mut sink);
            return;
        };

        let response = entry.response;
        let mut body = encode_body(response.body_encoding_raw, &response.body);
        if let Some(transformer) = &self.transformer {
            // The transformer's output is authoritative, length included.
            body = transformer(&request, body);
        }

        let mut headers = response.headers;
        headers.insert("Content-Length".to_string(), body.len().to_string());

        debug!(
            method = %request.method,
            url = %request.url,
            delay_secs = response.elapsed_time,
            "Replaying recorded response"
        );

        if response.elapsed_time.is_finite() && response.elapsed_time > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(response.elapsed_time)).await;
        }

        sink.send_status(&response.status, &headers);
        if !body.is_empty() {
            sink.send_body(Bytes::from(body));
        }
        sink.send_body(Bytes::new());
    }

    fn miss(&self, request: &InboundRequest, sink: &mut ResponseSink) {
        info!(method = %request.method, url = %request.url, "No recording for request");
        if let Some(hook) = &self.on_unrecorded {
            hook(request);
        }
        sink.send_status("404 Not Found", &BTreeMap::new());
        sink.send_body(Bytes::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cassette::{Interaction, StoredRequest, StoredResponse};
    use crate::server::sink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::time::Instant;

    fn store_with(entries: Vec<Interaction>) -> (Arc<CassetteStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cassette.json");
        let cassette = crate::cassette::Cassette { entries };
        std::fs::write(&path, serde_json::to_vec_pretty(&cassette).unwrap()).unwrap();
        (Arc::new(CassetteStore::new(path)), dir)
    }

    fn entry(url: &str, body: &str, elapsed: f64) -> Interaction {
        Interaction {
            request: StoredRequest {
                url: url.to_string(),
                method: "GET".to_string(),
                headers: BTreeMap::new(),
                body: None,
            },
            response: StoredResponse {
                status: "200 OK".to_string(),
                headers: BTreeMap::new(),
                body: body.to_string(),
                body_encoding_raw: 0,
                elapsed_time: elapsed,
            },
        }
    }

    fn incoming(path_and_query: &str) -> InboundRequest {
        InboundRequest {
            method: "GET".to_string(),
            url: format!("http://localhost:6000{path_and_query}")
                .parse()
                .unwrap(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    fn handler(store: Arc<CassetteStore>) -> PlaybackHandler {
        PlaybackHandler::new(
            store,
            "https://api.example.com".parse().unwrap(),
            None,
            None,
            None,
        )
    }

    async fn collect_body(mut body_rx: tokio::sync::mpsc::UnboundedReceiver<Bytes>) -> Vec<u8> {
        let mut collected = Vec::new();
        while let Some(chunk) = body_rx.recv().await {
            if chunk.is_empty() {
                break;
            }
            collected.extend_from_slice(&chunk);
        }
        collected
    }

    #[tokio::test]
    async fn test_hit_emits_recorded_response() {
        let (store, _dir) = store_with(vec![entry("https://api.example.com/items", "payload", 0.0)]);
        let (snk, status_rx, body_rx) = sink::channel();

        handler(store).handle(incoming("/items"), snk).await;

        let status = status_rx.await.unwrap();
        assert_eq!(status.line, "200 OK");
        assert_eq!(status.headers.get("Content-Length").unwrap(), "7");
        assert_eq!(collect_body(body_rx).await, b"payload");
    }

    #[tokio::test]
    async fn test_miss_is_synthetic_404() {
        let (store, _dir) = store_with(vec![]);
        let (snk, status_rx, body_rx) = sink::channel();

        handler(store).handle(incoming("/missing"), snk).await;

        let status = status_rx.await.unwrap();
        assert_eq!(status.line, "404 Not Found");
        assert!(status.headers.is_empty());
        assert!(collect_body(body_rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_miss_invokes_unrecorded_hook_with_original_url() {
        let (store, _dir) = store_with(vec![]);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(std::sync::Mutex::new(String::new()));

        let hook_calls = Arc::clone(&calls);
        let hook_seen = Arc::clone(&seen);
        let handler = PlaybackHandler::new(
            store,
            "https://api.example.com".parse().unwrap(),
            None,
            None,
            Some(Arc::new(move |request: &InboundRequest| {
                hook_calls.fetch_add(1, Ordering::SeqCst);
                *hook_seen.lock().unwrap() = request.url.to_string();
            })),
        );

        let (snk, status_rx, _body_rx) = sink::channel();
        handler.handle(incoming("/missing"), snk).await;
        status_rx.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // The hook gets the request as received, not the rebased one.
        assert_eq!(*seen.lock().unwrap(), "http://localhost:6000/missing");
    }

    #[tokio::test]
    async fn test_single_use_consumption() {
        let (store, _dir) = store_with(vec![
            entry("https://api.example.com/dup", "first", 0.0),
            entry("https://api.example.com/dup", "second", 0.0),
        ]);
        let handler = handler(store);

        let (snk, _status_rx, body_rx) = sink::channel();
        handler.handle(incoming("/dup"), snk).await;
        assert_eq!(collect_body(body_rx).await, b"first");

        let (snk, _status_rx, body_rx) = sink::channel();
        handler.handle(incoming("/dup"), snk).await;
        assert_eq!(collect_body(body_rx).await, b"second");

        let (snk, status_rx, _body_rx) = sink::channel();
        handler.handle(incoming("/dup"), snk).await;
        assert_eq!(status_rx.await.unwrap().line, "404 Not Found");
    }

    #[tokio::test]
    async fn test_query_order_irrelevant_through_pipeline() {
        let (store, _dir) = store_with(vec![entry("https://api.example.com/items?b=2&a=1", "ok", 0.0)]);
        let (snk, status_rx, _body_rx) = sink::channel();

        handler(store).handle(incoming("/items?a=1&b=2"), snk).await;

        assert_eq!(status_rx.await.unwrap().line, "200 OK");
    }

    #[tokio::test]
    async fn test_transformer_replaces_body_and_content_length() {
        let (store, _dir) = store_with(vec![entry("https://api.example.com/items", "original", 0.0)]);
        let handler = PlaybackHandler::new(
            store,
            "https://api.example.com".parse().unwrap(),
            None,
            Some(Arc::new(|_request: &InboundRequest, _body: Vec<u8>| {
                b"rewritten!".to_vec()
            })),
            None,
        );

        let (snk, status_rx, body_rx) = sink::channel();
        handler.handle(incoming("/items"), snk).await;

        let status = status_rx.await.unwrap();
        assert_eq!(status.headers.get("Content-Length").unwrap(), "10");
        assert_eq!(collect_body(body_rx).await, b"rewritten!");
    }

    #[tokio::test]
    async fn test_custom_matcher_used_instead_of_default() {
        let (store, _dir) = store_with(vec![entry("https://api.example.com/anything", "matched", 0.0)]);
        let handler = PlaybackHandler::new(
            store,
            "https://api.example.com".parse().unwrap(),
            // Match on method alone, ignoring the URL entirely.
            Some(Arc::new(|entry: &Interaction, request: &InboundRequest| {
                entry.request.method == request.method
            })),
            None,
            None,
        );

        let (snk, status_rx, body_rx) = sink::channel();
        handler.handle(incoming("/completely/different"), snk).await;

        assert_eq!(status_rx.await.unwrap().line, "200 OK");
        assert_eq!(collect_body(body_rx).await, b"matched");
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_delay_matches_elapsed_time() {
        let (store, _dir) = store_with(vec![entry("https://api.example.com/slow", "ok", 0.25)]);
        let (snk, status_rx, _body_rx) = sink::channel();

        let start = Instant::now();
        handler(store).handle(incoming("/slow"), snk).await;
        status_rx.await.unwrap();

        // Paused clock: the sleep is auto-advanced, virtual time still moves.
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
