//! Contracts between the chat engine and its backends

use crate::streaming::DeltaStream;
use crate::types::{ConversationId, ConversationSummary, HealthReport, Message, Role, SendPayload};
use crate::Result;
use async_trait::async_trait;

/// Chat completion transport
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open a streaming request.
    ///
    /// Resolves once the backend has accepted the request; non-2xx answers
    /// fail here with a typed status. The returned stream yields deltas in
    /// arrival order and ends with exactly one [`StreamEvent::Done`](crate::StreamEvent::Done)
    /// unless it fails first.
    async fn stream_chat(&self, payload: &SendPayload) -> Result<DeltaStream>;

    /// Issue the same request with `stream=false` and return the reply text
    async fn send_chat_once(&self, payload: &SendPayload) -> Result<String>;
}

/// Backend reachability probe
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probe the backend. Never fails; unreachable backends report `ok: false`.
    async fn probe(&self) -> HealthReport;
}

/// Conversation persistence
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation
    async fn create(&self, title: &str) -> Result<ConversationSummary>;

    /// List conversations
    async fn list(&self) -> Result<Vec<ConversationSummary>>;

    /// Set a conversation's title
    async fn rename(&self, id: &ConversationId, title: &str) -> Result<()>;

    /// Delete a conversation
    async fn delete(&self, id: &ConversationId) -> Result<()>;

    /// Messages of a conversation, oldest first
    async fn messages(&self, id: &ConversationId) -> Result<Vec<Message>>;

    /// Append a message
    async fn append_message(&self, id: &ConversationId, role: Role, content: &str) -> Result<()>;
}
