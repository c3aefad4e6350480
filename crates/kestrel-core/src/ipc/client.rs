//! IPC client: connects to the daemon over a Unix domain socket.
//!
//! Provides a typed client for the CLI and config processes to quit the
//! compositor, reload its config, probe liveness, and watch for shutdown.
//! Uses `hyper` for HTTP/1.1 over the Unix socket.
//!
//! Deadlines are the caller's business. [`IpcClient::check_alive`] is the
//! watchdog primitive: it fails with [`IpcClientError::Timeout`] when the
//! daemon holds the connection open but stops answering.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use rand::RngCore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::UnixStream;
use tracing::{debug, warn};

use super::server::SHUTDOWN_EVENT;
use super::types::*;

/// Errors from the IPC client.
#[derive(Debug, thiserror::Error)]
pub enum IpcClientError {
    #[error("failed to connect to daemon socket at {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("daemon is not running (socket not found at {0})")]
    NotRunning(PathBuf),

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("daemon returned error: {0}")]
    DaemonError(String),

    #[error("no ping response within {0:?}")]
    Timeout(Duration),

    #[error("ping response payload does not match the request")]
    PayloadMismatch,
}

/// Client for the kestrel control socket.
#[derive(Debug, Clone)]
pub struct IpcClient {
    socket_path: PathBuf,
}

impl IpcClient {
    /// Create a new IPC client targeting the given socket path.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Check if the daemon socket exists (daemon is likely running).
    pub fn daemon_available(&self) -> bool {
        self.socket_path.exists()
    }

    /// Open a connection and send one request, returning the live response.
    ///
    /// The returned [`SendRequest`] keeps the connection open for as long as
    /// the caller holds it.
    async fn send(
        &self,
        method: hyper::Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(SendRequest<Full<Bytes>>, hyper::Response<Incoming>), IpcClientError> {
        if !self.daemon_available() {
            return Err(IpcClientError::NotRunning(self.socket_path.clone()));
        }

        let stream =
            UnixStream::connect(&self.socket_path)
                .await
                .map_err(|e| IpcClientError::Connect {
                    path: self.socket_path.clone(),
                    source: e,
                })?;

        let (mut sender, conn) =
            hyper::client::conn::http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream))
                .await
                .map_err(|e| IpcClientError::Request(format!("HTTP handshake failed: {e}")))?;

        // Drive the connection in the background
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                warn!(error = %e, "IPC connection error");
            }
        });

        debug!(%method, path, "IPC request");

        let mut builder = hyper::Request::builder()
            .method(method)
            .uri(path)
            .header("host", "localhost");
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }

        let req = builder
            .body(Full::new(body.map(Bytes::from).unwrap_or_default()))
            .map_err(|e| IpcClientError::Request(format!("failed to build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| IpcClientError::Request(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .into_body()
                .collect()
                .await
                .map(|b| b.to_bytes())
                .unwrap_or_default();
            return Err(IpcClientError::DaemonError(format!(
                "{status}: {}",
                String::from_utf8_lossy(&body).trim()
            )));
        }

        Ok((sender, resp))
    }

    /// POST a JSON body and decode the JSON response.
    async fn call<Req, Resp>(&self, path: &str, request: &Req) -> Result<Resp, IpcClientError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)
            .map_err(|e| IpcClientError::Parse(format!("failed to serialize request: {e}")))?;
        let (_sender, resp) = self.send(hyper::Method::POST, path, Some(body)).await?;
        let bytes = read_body(resp).await?;
        serde_json::from_slice(&bytes).map_err(|e| IpcClientError::Parse(format!("{path}: {e}")))
    }

    // ── Typed API methods ──────────────────────────────────────────────

    /// Health check with build metadata.
    pub async fn health(&self) -> Result<HealthResponse, IpcClientError> {
        let (_sender, resp) = self.send(hyper::Method::GET, "/health", None).await?;
        let bytes = read_body(resp).await?;
        serde_json::from_slice(&bytes).map_err(|e| IpcClientError::Parse(format!("health: {e}")))
    }

    /// Ask the compositor to quit. Returns once the request is accepted,
    /// not when the process has exited.
    pub async fn quit(&self) -> Result<Ack, IpcClientError> {
        self.call("/quit", &QuitRequest {}).await
    }

    /// Ask the compositor to reload its configuration.
    pub async fn reload_config(&self) -> Result<Ack, IpcClientError> {
        self.call("/reload-config", &ReloadConfigRequest {}).await
    }

    /// Send a ping with the given payload and return the echo unchecked.
    pub async fn ping(&self, payload: Option<Vec<u8>>) -> Result<PingResponse, IpcClientError> {
        self.call("/ping", &PingRequest { payload }).await
    }

    /// Ping with a random payload and verify the echo within `timeout`.
    ///
    /// Returns the round-trip time.
    pub async fn check_alive(&self, timeout: Duration) -> Result<Duration, IpcClientError> {
        let mut payload = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut payload);

        let started = Instant::now();
        let response = tokio::time::timeout(timeout, self.ping(Some(payload.to_vec())))
            .await
            .map_err(|_| IpcClientError::Timeout(timeout))??;

        if response.payload() != payload.as_slice() {
            return Err(IpcClientError::PayloadMismatch);
        }
        Ok(started.elapsed())
    }

    /// Open a shutdown watch.
    pub async fn shutdown_watch(&self) -> Result<ShutdownWatchStream, IpcClientError> {
        let body = serde_json::to_vec(&ShutdownWatchRequest {})
            .map_err(|e| IpcClientError::Parse(format!("failed to serialize request: {e}")))?;
        let (sender, resp) = self
            .send(hyper::Method::POST, "/shutdown-watch", Some(body))
            .await?;

        Ok(ShutdownWatchStream {
            _sender: sender,
            body: resp.into_body(),
            buffer: Vec::new(),
        })
    }
}

async fn read_body(resp: hyper::Response<Incoming>) -> Result<Bytes, IpcClientError> {
    resp.into_body()
        .collect()
        .await
        .map(|b| b.to_bytes())
        .map_err(|e| IpcClientError::Request(format!("failed to read response body: {e}")))
}

/// Client side of an open shutdown watch.
///
/// Yields at most one [`ShutdownWatchResponse`], then `None` once the daemon
/// closes the stream. Dropping it cancels the watch on the daemon side.
#[derive(Debug)]
pub struct ShutdownWatchStream {
    _sender: SendRequest<Full<Bytes>>,
    body: Incoming,
    buffer: Vec<u8>,
}

impl ShutdownWatchStream {
    /// Wait for the next notification.
    pub async fn next(&mut self) -> Result<Option<ShutdownWatchResponse>, IpcClientError> {
        loop {
            while let Some(block) = take_event_block(&mut self.buffer) {
                if let Some(data) = parse_event(&block) {
                    let notification = serde_json::from_str(&data)
                        .map_err(|e| IpcClientError::Parse(format!("shutdown event: {e}")))?;
                    return Ok(Some(notification));
                }
            }

            let Some(frame) = self.body.frame().await else {
                return Ok(None);
            };
            let frame = frame
                .map_err(|e| IpcClientError::Request(format!("shutdown watch stream: {e}")))?;
            if let Ok(data) = frame.into_data() {
                self.buffer.extend_from_slice(&data);
            }
        }
    }
}

/// Split the first complete SSE event block (terminated by a blank line)
/// off the front of `buffer`.
///
/// Bytes are only decoded once the whole block has arrived, so a character
/// split across body frames survives intact.
fn take_event_block(buffer: &mut Vec<u8>) -> Option<String> {
    let (end, terminator) = (0..buffer.len()).find_map(|i| {
        let rest = &buffer[i..];
        if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else {
            None
        }
    })?;

    let block: Vec<u8> = buffer.drain(..end + terminator).collect();
    Some(String::from_utf8_lossy(&block[..end]).replace("\r\n", "\n"))
}

/// Extract the data of a `shutdown` event, ignoring comments and other events.
fn parse_event(block: &str) -> Option<String> {
    let mut event = None;
    let mut data: Option<String> = None;

    for line in block.lines() {
        if line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value.to_string()),
            "data" => match &mut data {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(value);
                }
                None => data = Some(value.to_string()),
            },
            _ => {}
        }
    }

    if event.as_deref() == Some(SHUTDOWN_EVENT) {
        data
    } else {
        None
    }
}
