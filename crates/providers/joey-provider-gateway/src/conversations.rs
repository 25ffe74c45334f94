//! Conversation persistence over the gateway's REST routes

use crate::client::{check_status, get_http_client};
use async_trait::async_trait;
use joey_core::{
    validate_url, ClientConfig, ConversationId, ConversationStore, ConversationSummary, JoeyError,
    Message, MessageRecord, Result, Role, TransportStatus,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// List body, bare array or wrapped in an object
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(alias = "conversations", alias = "messages")]
        items: Vec<T>,
    },
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Listing::Bare(v) | Listing::Wrapped { items: v } => v,
        }
    }
}

/// [`ConversationStore`] backed by `/conversations` on the gateway
#[derive(Clone)]
pub struct HttpConversationStore {
    base_url: String,
    timeout: Duration,
    client: Arc<Client>,
}

impl HttpConversationStore {
    /// Create a store using the shared connection pool
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Self::with_http_client(config, get_http_client())
    }

    /// Create a store on a caller-supplied HTTP client
    pub fn with_http_client(config: &ClientConfig, client: Arc<Client>) -> Result<Self> {
        let base_url = config.backend_url.trim_end_matches('/').to_string();
        validate_url(&base_url)?;
        Ok(Self {
            base_url,
            timeout: config.request_timeout,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/conversations{}", self.base_url, path)
    }

    async fn get_list<T: DeserializeOwned>(&self, url: String) -> Result<Vec<T>> {
        let resp = self.client.get(url).timeout(self.timeout).send().await?;
        let listing: Listing<T> = check_status(resp).await?.json().await?;
        Ok(listing.into_vec())
    }
}

fn not_found_for(id: &ConversationId, err: JoeyError) -> JoeyError {
    match err.transport_status() {
        Some(TransportStatus::Http(404)) => JoeyError::not_found(format!("conversation {}", id)),
        _ => err,
    }
}

#[async_trait]
impl ConversationStore for HttpConversationStore {
    async fn create(&self, title: &str) -> Result<ConversationSummary> {
        let resp = self
            .client
            .post(self.url(""))
            .timeout(self.timeout)
            .json(&json!({ "title": title }))
            .send()
            .await?;
        let mut created: ConversationSummary = check_status(resp).await?.json().await?;
        if created.title.is_none() {
            created.title = Some(title.to_string());
        }
        debug!(conversation_id = %created.id, "Conversation created");
        Ok(created)
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>> {
        self.get_list(self.url("")).await
    }

    async fn rename(&self, id: &ConversationId, title: &str) -> Result<()> {
        let resp = self
            .client
            .patch(self.url(&format!("/{}", id)))
            .timeout(self.timeout)
            .json(&json!({ "title": title }))
            .send()
            .await?;
        check_status(resp).await.map_err(|e| not_found_for(id, e))?;
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<()> {
        let resp = self
            .client
            .delete(self.url(&format!("/{}", id)))
            .timeout(self.timeout)
            .send()
            .await?;
        check_status(resp).await.map_err(|e| not_found_for(id, e))?;
        Ok(())
    }

    async fn messages(&self, id: &ConversationId) -> Result<Vec<Message>> {
        let records: Vec<MessageRecord> = self
            .get_list(self.url(&format!("/{}/messages", id)))
            .await
            .map_err(|e| not_found_for(id, e))?;
        Ok(records.into_iter().map(MessageRecord::into_message).collect())
    }

    async fn append_message(&self, id: &ConversationId, role: Role, content: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("/{}/messages", id)))
            .timeout(self.timeout)
            .json(&json!({ "role": role, "content": content }))
            .send()
            .await?;
        check_status(resp).await.map_err(|e| not_found_for(id, e))?;
        Ok(())
    }
}
