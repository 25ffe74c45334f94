//! HTTP client for the chat gateway

use crate::response::{extract_reply_text, resolve_health};
use crate::sse::{parse_frame, Frame, SseDecoder};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use joey_core::{
    validate_url, ChatTransport, ClientConfig, DeltaStream, HealthProbe, HealthReport, JoeyError,
    Result, SendPayload, StreamEvent, TransportStatus,
};
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Shared HTTP client for connection pooling to the gateway
static HTTP_CLIENT: OnceLock<Arc<Client>> = OnceLock::new();

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Get or initialize the shared HTTP client.
///
/// No overall request timeout is set here: streams may legitimately run for
/// minutes and are bounded by the caller's inactivity timeout instead.
pub(crate) fn get_http_client() -> Arc<Client> {
    HTTP_CLIENT
        .get_or_init(|| {
            let client = Client::builder()
                .pool_max_idle_per_host(16)
                .pool_idle_timeout(Duration::from_secs(90))
                .tcp_keepalive(Duration::from_secs(60))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|e| {
                    warn!("Failed to build tuned HTTP client ({}), using defaults", e);
                    Client::new()
                });
            Arc::new(client)
        })
        .clone()
}

/// Turn a non-2xx response into a typed transport error
pub(crate) async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .await
        .unwrap_or_else(|e| format!("Failed to read error response: {}", e));
    Err(JoeyError::transport(
        TransportStatus::Http(status.as_u16()),
        format!("Gateway returned {}: {}", status, truncate(&body, 200)),
    ))
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Chat gateway client: streaming chat, one-shot chat and health probing
#[derive(Clone)]
pub struct GatewayClient {
    base_url: String,
    health_path: String,
    request_timeout: Duration,
    max_response_size: usize,
    client: Arc<Client>,
}

impl GatewayClient {
    /// Create a client using the shared connection pool
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Self::with_http_client(config, get_http_client())
    }

    /// Create a client on a caller-supplied HTTP client
    pub fn with_http_client(config: &ClientConfig, client: Arc<Client>) -> Result<Self> {
        let base_url = config.backend_url.trim_end_matches('/').to_string();
        validate_url(&base_url)?;
        Ok(Self {
            base_url,
            health_path: config.health_path.clone(),
            request_timeout: config.request_timeout,
            max_response_size: config.max_response_size,
            client,
        })
    }

    /// Gateway base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Probe the configured health endpoint, then its alternate.
    ///
    /// Any failure resolves to an offline report.
    pub async fn probe_health(&self) -> HealthReport {
        for path in health_paths(&self.health_path) {
            match self.fetch_health(&path).await {
                Ok(report) => {
                    debug!(path = %path, ok = report.ok, "Health probe answered");
                    return report;
                }
                Err(e) => debug!(path = %path, "Health probe failed: {}", e),
            }
        }
        HealthReport::offline(&self.base_url)
    }

    async fn fetch_health(&self, path: &str) -> Result<HealthReport> {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;
        let body: Value = check_status(resp).await?.json().await?;
        resolve_health(&body, &self.base_url)
            .ok_or_else(|| JoeyError::malformed("Unrecognised health response"))
    }
}

/// Configured path first, then the other well-known health path
fn health_paths(configured: &str) -> Vec<String> {
    let mut paths = vec![configured.to_string()];
    for known in ["/v1/health", "/api/health"] {
        if known != configured {
            paths.push(known.to_string());
        }
    }
    paths
}

#[async_trait]
impl ChatTransport for GatewayClient {
    async fn stream_chat(&self, payload: &SendPayload) -> Result<DeltaStream> {
        let resp = self
            .client
            .post(self.chat_url())
            .header(ACCEPT, "text/event-stream")
            .json(&payload.to_request(true))
            .send()
            .await?;
        let resp = check_status(resp).await?;

        debug!(model = %payload.model, "Chat stream opened");
        Ok(sse_stream(resp, self.max_response_size))
    }

    async fn send_chat_once(&self, payload: &SendPayload) -> Result<String> {
        let resp = self
            .client
            .post(self.chat_url())
            .timeout(self.request_timeout)
            .json(&payload.to_request(false))
            .send()
            .await?;
        let bytes = check_status(resp).await?.bytes().await?;

        if bytes.len() > self.max_response_size {
            return Err(JoeyError::malformed(format!(
                "Response too large: {} bytes (max {} bytes)",
                bytes.len(),
                self.max_response_size
            )));
        }

        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|e| JoeyError::malformed(format!("Reply is not JSON: {}", e)))?;
        Ok(extract_reply_text(&body))
    }
}

#[async_trait]
impl HealthProbe for GatewayClient {
    async fn probe(&self) -> HealthReport {
        self.probe_health().await
    }
}

/// Read state of one event stream
struct SseReader {
    response: Response,
    decoder: SseDecoder,
    queued: VecDeque<Result<StreamEvent>>,
    finished: bool,
    received: usize,
    limit: usize,
}

impl SseReader {
    /// Apply one frame; returns true once the stream has ended
    fn apply(&mut self, data: &str) -> bool {
        match parse_frame(data) {
            Frame::Done => self.finish(),
            Frame::Stop(tail) => {
                if let Some(piece) = tail {
                    self.push_delta(piece);
                }
                self.finish();
            }
            Frame::Delta(piece) => self.push_delta(piece),
            Frame::Ignored => {}
            Frame::Malformed(e) => warn!("Skipping malformed stream frame: {}", e),
        }
        self.finished
    }

    fn push_delta(&mut self, piece: String) {
        if self.finished {
            return;
        }
        self.received += piece.len();
        if self.received > self.limit {
            self.queued.push_back(Err(JoeyError::malformed(format!(
                "Streamed reply exceeded {} bytes",
                self.limit
            ))));
            self.finished = true;
            return;
        }
        self.queued.push_back(Ok(StreamEvent::Delta(piece)));
    }

    fn finish(&mut self) {
        if !self.finished {
            self.queued.push_back(Ok(StreamEvent::Done));
            self.finished = true;
        }
    }
}

/// Lazily decode a response body into stream events.
///
/// The body is read only as the stream is polled. A body that ends without a
/// terminal frame still completes with `Done`.
fn sse_stream(response: Response, limit: usize) -> DeltaStream {
    let reader = SseReader {
        response,
        decoder: SseDecoder::new(),
        queued: VecDeque::new(),
        finished: false,
        received: 0,
        limit,
    };

    stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(item) = reader.queued.pop_front() {
                return Some((item, reader));
            }
            if reader.finished {
                return None;
            }

            match reader.response.chunk().await {
                Ok(Some(bytes)) => {
                    reader.decoder.push(&bytes);
                    while let Some(data) = reader.decoder.next_frame() {
                        if reader.apply(&data) {
                            break;
                        }
                    }
                }
                Ok(None) => {
                    if let Some(data) = reader.decoder.finish() {
                        reader.apply(&data);
                    }
                    if !reader.finished {
                        debug!("Stream closed without a terminal frame");
                        reader.finish();
                    }
                }
                Err(e) => {
                    reader.finished = true;
                    return Some((Err(JoeyError::from(e)), reader));
                }
            }
        }
    })
    .boxed()
}
