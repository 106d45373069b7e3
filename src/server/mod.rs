//! Fixture lifecycle and mode routing
//!
//! The [`Fixture`] binds a local port, runs a dedicated background thread
//! with a single-threaded event loop, and routes every inbound request to
//! the capture or playback pipeline according to a runtime-mutable flag.
//! That one loop owns all cassette mutation, replay delays, and emission.

pub(crate) mod sink;

pub use sink::ResponseSink;

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Response;
use hyper_util::rt::TokioIo;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::capture::CaptureHandler;
use crate::cassette::CassetteStore;
use crate::config::{FixtureConfig, Hooks, Mode, PortRange};
use crate::playback::PlaybackHandler;
use crate::request::InboundRequest;
use crate::{DeckError, Result};

/// The HTTP interaction fixture
///
/// One instance exclusively owns its cassette file; concurrent instances
/// pointed at the same path must not be used together.
pub struct Fixture {
    config: FixtureConfig,
    hooks: Hooks,
    capturing: Arc<AtomicBool>,
    shutdown: Option<watch::Sender<bool>>,
    thread: Option<JoinHandle<()>>,
    port: Option<u16>,
}

impl Fixture {
    /// Create a fixture from validated configuration and optional hooks
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid
    pub fn new(config: FixtureConfig, hooks: Hooks) -> Result<Self> {
        config.validate()?;
        let capturing = Arc::new(AtomicBool::new(config.mode.is_capture()));

        Ok(Self {
            config,
            hooks,
            capturing,
            shutdown: None,
            thread: None,
            port: None,
        })
    }

    /// Current operating mode
    #[must_use]
    pub fn mode(&self) -> Mode {
        if self.capturing.load(Ordering::SeqCst) {
            Mode::Capture
        } else {
            Mode::Playback
        }
    }

    /// Switch mode; read per request at dispatch time
    pub fn set_mode(&self, mode: Mode) {
        self.capturing.store(mode.is_capture(), Ordering::SeqCst);
    }

    /// Bind the first free candidate port and start the background loop
    ///
    /// Calling `start` on a running fixture returns the bound port again.
    ///
    /// # Errors
    ///
    /// Returns [`DeckError::NoAvailablePort`] if the whole candidate range
    /// is taken, or an error if the loop cannot be started
    pub fn start(&mut self) -> Result<u16> {
        if let Some(port) = self.port {
            return Ok(port);
        }

        let listener = bind_candidate(self.config.ports)?;
        let port = listener.local_addr()?.port();

        let base = self.config.base_uri()?;
        let store = Arc::new(CassetteStore::new(self.config.cassette_path.clone()));
        let router = Arc::new(Router {
            capture: CaptureHandler::new(
                Arc::clone(&store),
                base.clone(),
                self.hooks.on_capture_error.clone(),
            )?,
            playback: PlaybackHandler::new(
                store,
                base,
                self.hooks.matcher.clone(),
                self.hooks.transformer.clone(),
                self.hooks.on_unrecorded.clone(),
            ),
            capturing: Arc::clone(&self.capturing),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let thread = std::thread::Builder::new()
            .name("replaydeck-loop".to_string())
            .spawn(move || {
                runtime.block_on(serve(listener, router, shutdown_rx));
            })?;

        self.shutdown = Some(shutdown_tx);
        self.thread = Some(thread);
        self.port = Some(port);

        info!(port, mode = ?self.mode(), "Fixture started");
        Ok(port)
    }

    /// Stop accepting, stop the loop, and join the background thread
    ///
    /// Idempotent. In-flight live calls are abandoned; their completions
    /// become no-ops.
    pub fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Fixture loop thread panicked during shutdown");
            }
        }
        self.port = None;
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bind the first free port in the candidate range
fn bind_candidate(ports: PortRange) -> Result<std::net::TcpListener> {
    for port in ports.first..=ports.last {
        if let Ok(listener) = std::net::TcpListener::bind(("127.0.0.1", port)) {
            listener.set_nonblocking(true)?;
            return Ok(listener);
        }
    }

    Err(DeckError::NoAvailablePort {
        first: ports.first,
        last: ports.last,
    })
}

/// Per-request pipeline selection
struct Router {
    capture: CaptureHandler,
    playback: PlaybackHandler,
    capturing: Arc<AtomicBool>,
}

impl Router {
    /// Normalize the raw request, delegate to the selected pipeline, and
    /// wait for its status line before answering the connection
    async fn dispatch(
        self: Arc<Self>,
        request: hyper::Request<Incoming>,
    ) -> Result<Response<BoxBody<Bytes, Infallible>>> {
        let (parts, body) = request.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| DeckError::InvalidRequest(format!("Body read failed: {e}")))?
            .to_bytes();
        let inbound = InboundRequest::from_hyper(&parts, body)?;

        let (response_sink, status_rx, body_rx) = sink::channel();

        let router = Arc::clone(&self);
        if self.capturing.load(Ordering::SeqCst) {
            tokio::spawn(async move {
                router.capture.handle(inbound, response_sink).await;
            });
        } else {
            tokio::spawn(async move {
                router.playback.handle(inbound, response_sink).await;
            });
        }

        // A dropped sender means the pipeline produced nothing (failed
        // capture); close the connection without a response.
        let status = status_rx.await.map_err(|_| {
            DeckError::Upstream("Request produced no response".to_string())
        })?;

        Ok(sink::build_response(status, body_rx))
    }
}

/// Accept loop; runs until the shutdown signal flips
async fn serve(
    listener: std::net::TcpListener,
    router: Arc<Router>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let listener = match tokio::net::TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to register listener with the loop: {e}");
            return;
        }
    };

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        debug!(%peer, "Accepted connection");
                        let router = Arc::clone(&router);

                        tokio::spawn(async move {
                            let service = service_fn(move |request| {
                                Arc::clone(&router).dispatch(request)
                            });

                            let connection = http1::Builder::new()
                                .serve_connection(TokioIo::new(stream), service);
                            if let Err(e) = connection.await {
                                debug!("Connection ended: {e}");
                            }
                        });
                    }
                    Err(e) => error!("Accept error: {e}"),
                }
            }
            _ = shutdown_rx.changed() => {
                info!("Fixture loop shutting down");
                break;
            }
        }
    }
}
