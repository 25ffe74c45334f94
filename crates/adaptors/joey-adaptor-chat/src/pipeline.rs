//! Send pipeline: one logical "send a message" operation
//!
//! ```text
//! Idle -> Streaming -> Success
//!              \-> Fallback(1) -> Success
//!                    \-> Fallback(2) -> ... -> Failed
//! ```
//!
//! The streaming attempt is bounded by an inactivity timeout that restarts
//! on every chunk. On any recoverable failure the same payload is retried
//! without streaming, with exponential backoff before each attempt. The
//! pending slot is opened before any network call and resolved exactly once.

use crate::health::HealthMonitor;
use crate::render::Notice;
use crate::session::{ChatSession, SlotToken};
use futures_util::StreamExt;
use joey_core::{
    retry_with_backoff, ChatTransport, ClientConfig, ConversationId, JoeyError, Result,
    RetryConfig, Role, SendPayload, StreamEvent, TerminalFailure, TransportStatus,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Settings for one pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model name
    pub model: String,
    /// Provider name
    pub provider: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Inactivity window of the streaming attempt
    pub stream_idle_timeout: Duration,
    /// Non-streaming fallback attempts and backoff
    pub fallback: RetryConfig,
    /// Title the conversation after the first exchange
    pub auto_title: bool,
}

impl From<&ClientConfig> for PipelineConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            model: config.model.clone(),
            provider: config.provider.clone(),
            temperature: config.temperature,
            stream_idle_timeout: config.stream_idle_timeout,
            fallback: config.fallback.clone(),
            auto_title: config.auto_title,
        }
    }
}

/// How the reply was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// The streaming attempt completed
    Streamed,
    /// A non-streaming fallback attempt completed
    Fallback {
        /// 1-based fallback attempt
        attempt: usize,
    },
}

/// Outcome of a successful send
#[derive(Debug, Clone, Serialize)]
pub struct SendReport {
    /// Conversation the exchange belongs to
    pub conversation_id: ConversationId,
    /// Final reply text
    pub text: String,
    /// How the reply was obtained
    pub mode: DeliveryMode,
    /// Attempts made, stream attempt included
    pub attempts: usize,
    /// Streamed chunks applied
    pub chunks: usize,
    /// Time from send to final render
    pub latency: Duration,
}

struct Delivered {
    text: String,
    mode: DeliveryMode,
    attempts: usize,
    chunks: usize,
    slot: SlotToken,
}

/// Orchestrates sends for one session
pub struct SendPipeline {
    transport: Arc<dyn ChatTransport>,
    session: Arc<ChatSession>,
    health: Arc<HealthMonitor>,
    config: PipelineConfig,
}

impl SendPipeline {
    /// Create a pipeline
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        session: Arc<ChatSession>,
        health: Arc<HealthMonitor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            transport,
            session,
            health,
            config,
        }
    }

    /// Session this pipeline sends into
    pub fn session(&self) -> &Arc<ChatSession> {
        &self.session
    }

    /// Send `text` and deliver the reply into the session.
    ///
    /// Refused with [`JoeyError::Offline`] when the backend is offline and
    /// with [`JoeyError::Busy`] while another send runs; neither touches the
    /// network. Cancelling `cancel` aborts the running attempt or backoff and
    /// returns [`JoeyError::Cancelled`] without retrying. Exhausting every
    /// attempt returns [`JoeyError::SendFailed`] with the outbound payload.
    pub async fn send(&self, text: &str, cancel: &CancellationToken) -> Result<SendReport> {
        let text = text.trim();
        if text.is_empty() {
            return Err(JoeyError::validation("Message cannot be empty"));
        }

        let health = self.health.current();
        if !health.accepts_sends() {
            info!(base = %health.base, "Send refused: backend offline");
            self.session.notify(Notice::Offline { base: health.base });
            return Err(JoeyError::Offline);
        }

        let _lease = match self.session.try_begin_send() {
            Ok(lease) => lease,
            Err(e) => {
                debug!("Send refused: another send is in flight");
                self.session.notify(Notice::Busy);
                return Err(e);
            }
        };

        let started = Instant::now();
        self.session.append_user(text);
        let slot = self.session.append_assistant_pending()?;
        let payload = SendPayload::new(
            &self.config.model,
            &self.config.provider,
            self.config.temperature,
            &self.session.history(),
        );

        let conversation_id = match self.session.ensure_conversation().await {
            Ok(id) => id,
            Err(e) => {
                warn!("Could not create conversation: {}", e);
                return Err(self.fail(slot, &payload, &e, 0));
            }
        };
        self.session.persist(Role::User, text).await;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(JoeyError::Cancelled),
            result = self.deliver(&payload, slot) => result,
        };

        match outcome {
            Ok(delivered) => {
                self.session
                    .finalize_assistant(delivered.slot, &delivered.text)?;
                self.health.record_send_outcome(false);
                let latency = started.elapsed();
                info!(
                    conversation_id = %conversation_id,
                    attempts = delivered.attempts,
                    chunks = delivered.chunks,
                    latency_ms = latency.as_millis() as u64,
                    "Reply delivered"
                );

                self.session
                    .persist(Role::Assistant, &delivered.text)
                    .await;
                if self.config.auto_title {
                    if let Some(first) = self.session.first_user_message() {
                        if let Err(e) = self.session.auto_title(&first).await {
                            warn!("Failed to store conversation title: {}", e);
                        }
                    }
                }

                Ok(SendReport {
                    conversation_id,
                    text: delivered.text,
                    mode: delivered.mode,
                    attempts: delivered.attempts,
                    chunks: delivered.chunks,
                    latency,
                })
            }
            Err(JoeyError::Cancelled) => {
                info!(conversation_id = %conversation_id, "Send cancelled");
                if let Some(active) = self.session.active_slot() {
                    self.session.cancel_pending(active)?;
                }
                Err(JoeyError::Cancelled)
            }
            Err(e) => {
                let attempts = match &e {
                    JoeyError::RetriesExhausted { attempts, .. } => attempts + 1,
                    _ => 1,
                };
                let slot = self.session.active_slot().unwrap_or(slot);
                Err(self.fail(slot, &payload, &e, attempts))
            }
        }
    }

    /// Stream attempt, then the fallback ladder
    async fn deliver(&self, payload: &SendPayload, slot: SlotToken) -> Result<Delivered> {
        match self.stream_attempt(payload, slot).await {
            Ok((text, chunks)) => {
                return Ok(Delivered {
                    text,
                    mode: DeliveryMode::Streamed,
                    attempts: 1,
                    chunks,
                    slot,
                })
            }
            Err(e) if e.is_retryable() => {
                warn!(status = ?e.transport_status(), "Stream failed, falling back: {}", e);
            }
            Err(e) => return Err(e),
        }

        let fallback_slot = self.session.take_over(slot)?;
        let (text, attempt) = retry_with_backoff(&self.config.fallback, |attempt| {
            debug!(attempt, "Non-streaming attempt");
            self.transport.send_chat_once(payload)
        })
        .await?;

        Ok(Delivered {
            text,
            mode: DeliveryMode::Fallback { attempt },
            attempts: attempt + 1,
            chunks: 0,
            slot: fallback_slot,
        })
    }

    /// Consume one stream into the slot; returns the text and chunk count
    async fn stream_attempt(
        &self,
        payload: &SendPayload,
        slot: SlotToken,
    ) -> Result<(String, usize)> {
        let idle = self.config.stream_idle_timeout;
        let idle_error =
            || JoeyError::timeout(format!("no stream data for {} ms", idle.as_millis()));

        let mut stream = timeout(idle, self.transport.stream_chat(payload))
            .await
            .map_err(|_| idle_error())??;

        let mut text = String::new();
        let mut chunks = 0;
        loop {
            match timeout(idle, stream.next()).await {
                Err(_) => return Err(idle_error()),
                Ok(None) | Ok(Some(Ok(StreamEvent::Done))) => break,
                Ok(Some(Ok(StreamEvent::Delta(piece)))) => {
                    self.session.apply_delta(slot, &piece)?;
                    text.push_str(&piece);
                    chunks += 1;
                }
                Ok(Some(Err(e))) => return Err(e),
            }
        }

        debug!(chunks, bytes = text.len(), "Stream completed");
        Ok((text, chunks))
    }

    /// Resolve the slot as a terminal failure and build the error for the caller
    fn fail(
        &self,
        slot: SlotToken,
        payload: &SendPayload,
        cause: &JoeyError,
        attempts: usize,
    ) -> JoeyError {
        let last_status = cause.transport_status();
        let failure = TerminalFailure {
            message: failure_message(last_status, cause),
            attempts,
            last_status,
            payload: payload
                .to_pretty_json()
                .unwrap_or_else(|e| format!("<payload could not be serialized: {}>", e)),
        };

        error!(attempts, status = ?last_status, "Send failed: {}", cause);
        if let Err(e) = self.session.fail_pending(slot, &failure) {
            warn!("Could not mark reply as failed: {}", e);
        }
        self.health.record_send_outcome(true);
        JoeyError::SendFailed(Box::new(failure))
    }
}

fn failure_message(status: Option<TransportStatus>, cause: &JoeyError) -> String {
    match status {
        Some(TransportStatus::Http(code)) => format!("The backend returned an error ({}).", code),
        Some(TransportStatus::Timeout) => "The backend stopped responding.".to_string(),
        Some(TransportStatus::Network) => "Could not reach the backend.".to_string(),
        Some(TransportStatus::Malformed) => {
            "The backend sent a response that could not be read.".to_string()
        }
        None => format!("The message could not be sent: {}", cause),
    }
}
