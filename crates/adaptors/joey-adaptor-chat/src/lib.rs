//! Joey AI chat engine
//!
//! Wires the gateway transport into a chat session:
//!
//! - [`HealthMonitor`] polls the backend and gates sends while it is offline
//! - [`SendPipeline`] streams a reply and falls back to non-streaming retries
//! - [`ChatSession`] owns the conversation id, history and the pending slot
//! - [`MessageView`] renders message text into display blocks and publishes changes
//!
//! # Example
//!
//! ```no_run
//! use joey_adaptor_chat::{CancelToken, ChatClient};
//! use joey_core::ClientConfig;
//!
//! # async fn run() -> joey_core::Result<()> {
//! let client = ChatClient::connect(ClientConfig::from_env()).await?;
//! let report = client.send("hello", &CancelToken::new()).await?;
//! println!("{}", report.text);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod health;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod store;
pub mod title;

pub use health::HealthMonitor;
pub use pipeline::{DeliveryMode, PipelineConfig, SendPipeline, SendReport};
pub use render::{render_blocks, Block, MessageView, Notice, RenderSink, ViewEvent, ViewMessage};
pub use session::{ChatSession, SendLease, SlotToken};
pub use store::InMemoryConversationStore;
pub use title::{derive_title, is_placeholder, DEFAULT_TITLE};
/// Cancellation handle shared between the UI and a running send
pub use tokio_util::sync::CancellationToken as CancelToken;

use joey_core::{
    ChatTransport, ClientConfig, ConversationId, ConversationStore, ConversationSummary,
    HealthState, Result,
};
use joey_provider_gateway::{GatewayClient, HttpConversationStore};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// One chat window against the gateway
pub struct ChatClient {
    pipeline: SendPipeline,
    health: Arc<HealthMonitor>,
    view: Arc<MessageView>,
    store: Arc<dyn ConversationStore>,
    monitor_task: Option<JoinHandle<()>>,
}

impl ChatClient {
    /// Connect with a fresh conversation, created on first send
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        Self::build(config, None).await
    }

    /// Connect and continue an existing conversation
    pub async fn open(config: ClientConfig, id: ConversationId) -> Result<Self> {
        Self::build(config, Some(id)).await
    }

    async fn build(config: ClientConfig, id: Option<ConversationId>) -> Result<Self> {
        config.validate()?;

        let gateway = Arc::new(GatewayClient::new(&config)?);
        let store: Arc<dyn ConversationStore> = Arc::new(HttpConversationStore::new(&config)?);
        let view = Arc::new(MessageView::new());
        let session = match id {
            Some(id) => ChatSession::open(store.clone(), view.clone(), id).await?,
            None => ChatSession::new(store.clone(), view.clone()),
        };

        let health = Arc::new(HealthMonitor::new(
            gateway.clone(),
            gateway.base_url(),
            config.health_interval,
        ));
        let monitor_task = health.start().await;
        info!(backend = %gateway.base_url(), model = %config.model, "Chat client ready");

        let mut client = Self::from_parts(
            gateway,
            health,
            Arc::new(session),
            view,
            store,
            PipelineConfig::from(&config),
        );
        client.monitor_task = Some(monitor_task);
        Ok(client)
    }

    /// Assemble a client from existing parts; the health monitor is not started
    pub fn from_parts(
        transport: Arc<dyn ChatTransport>,
        health: Arc<HealthMonitor>,
        session: Arc<ChatSession>,
        view: Arc<MessageView>,
        store: Arc<dyn ConversationStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            pipeline: SendPipeline::new(transport, session, health.clone(), config),
            health,
            view,
            store,
            monitor_task: None,
        }
    }

    /// Send a message; see [`SendPipeline::send`]
    pub async fn send(&self, text: &str, cancel: &CancelToken) -> Result<SendReport> {
        self.pipeline.send(text, cancel).await
    }

    /// Current health
    pub fn health(&self) -> HealthState {
        self.health.current()
    }

    /// Probe the backend now
    pub async fn refresh_health(&self) -> HealthState {
        self.health.probe_once().await
    }

    /// Observe health changes
    pub fn subscribe_health(&self) -> watch::Receiver<HealthState> {
        self.health.subscribe()
    }

    /// Observe message list changes
    pub fn subscribe_view(&self) -> broadcast::Receiver<ViewEvent> {
        self.view.subscribe()
    }

    /// Rendered message list
    pub fn view(&self) -> &Arc<MessageView> {
        &self.view
    }

    /// The open conversation
    pub fn session(&self) -> &Arc<ChatSession> {
        self.pipeline.session()
    }

    /// All stored conversations
    pub async fn conversations(&self) -> Result<Vec<ConversationSummary>> {
        self.store.list().await
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        if let Some(task) = self.monitor_task.take() {
            task.abort();
        }
    }
}
