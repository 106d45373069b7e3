//! Bridge between pipeline emission callbacks and hyper responses
//!
//! Pipelines talk to the caller through a [`ResponseSink`]: one status line
//! plus headers, then body chunks, where an empty chunk signals end of
//! stream. The connection task converts that into a streaming hyper response
//! once the status arrives.

use std::collections::BTreeMap;
use std::convert::Infallible;

use bytes::Bytes;
use futures_util::stream;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Response, StatusCode};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// Status line and headers, sent exactly once per response
#[derive(Debug)]
pub(crate) struct StatusPart {
    pub line: String,
    pub headers: BTreeMap<String, String>,
}

/// Emission half of the server substrate contract
pub struct ResponseSink {
    status_tx: Option<oneshot::Sender<StatusPart>>,
    body_tx: mpsc::UnboundedSender<Bytes>,
}

impl ResponseSink {
    /// Emit the status line and headers; must precede any body chunk
    pub fn send_status(&mut self, line: &str, headers: &BTreeMap<String, String>) {
        if let Some(tx) = self.status_tx.take() {
            // Receiver gone means the caller hung up; nothing to do.
            let _ = tx.send(StatusPart {
                line: line.to_string(),
                headers: headers.clone(),
            });
        }
    }

    /// Emit a body chunk; an empty chunk signals end of stream
    pub fn send_body(&self, chunk: Bytes) {
        let _ = self.body_tx.send(chunk);
    }
}

/// Create a sink plus the receiving halves used by the connection task
pub(crate) fn channel() -> (
    ResponseSink,
    oneshot::Receiver<StatusPart>,
    mpsc::UnboundedReceiver<Bytes>,
) {
    let (status_tx, status_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::unbounded_channel();

    (
        ResponseSink {
            status_tx: Some(status_tx),
            body_tx,
        },
        status_rx,
        body_rx,
    )
}

/// Assemble the hyper response once the status line has been emitted
pub(crate) fn build_response(
    status: StatusPart,
    body_rx: mpsc::UnboundedReceiver<Bytes>,
) -> Response<BoxBody<Bytes, Infallible>> {
    let code = parse_status_line(&status.line);

    let mut builder = Response::builder().status(code);
    for (name, value) in &status.headers {
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                builder = builder.header(name, value);
            }
            _ => warn!(header = %name, "Dropping unrepresentable response header"),
        }
    }

    let body_stream = stream::unfold(body_rx, |mut rx| async move {
        match rx.recv().await {
            Some(chunk) if !chunk.is_empty() => Some((Ok(Frame::data(chunk)), rx)),
            // Empty chunk is the end-of-stream signal; a closed channel
            // (handler dropped) ends the body as well.
            _ => None,
        }
    });

    builder
        .body(StreamBody::new(body_stream).boxed())
        .unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(http_body_util::Empty::new().boxed())
                .expect("static response")
        })
}

/// Parse the numeric code out of a stored status line like "200 OK"
fn parse_status_line(line: &str) -> StatusCode {
    line.split_whitespace()
        .next()
        .and_then(|token| token.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK)
}
