//! In-memory conversation store
//!
//! Useful for tests and for running without a persistence backend.

use async_trait::async_trait;
use chrono::Utc;
use joey_core::{
    ConversationId, ConversationStore, ConversationSummary, JoeyError, Message, Result, Role,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct StoredConversation {
    summary: ConversationSummary,
    messages: Vec<Message>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    conversations: BTreeMap<i64, StoredConversation>,
}

/// Conversations kept in process memory with integer ids
#[derive(Clone, Default)]
pub struct InMemoryConversationStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryConversationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn key(id: &ConversationId) -> Result<i64> {
    id.as_str()
        .parse()
        .map_err(|_| JoeyError::not_found(format!("conversation {}", id)))
}

fn lookup<'a>(inner: &'a mut Inner, id: &ConversationId) -> Result<&'a mut StoredConversation> {
    let k = key(id)?;
    inner
        .conversations
        .get_mut(&k)
        .ok_or_else(|| JoeyError::not_found(format!("conversation {}", id)))
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self, title: &str) -> Result<ConversationSummary> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        let now = Utc::now().to_rfc3339();
        let summary = ConversationSummary {
            created_at: Some(now.clone()),
            updated_at: Some(now),
            ..ConversationSummary::new(ConversationId::from(id), Some(title.to_string()))
        };
        inner.conversations.insert(
            id,
            StoredConversation {
                summary: summary.clone(),
                messages: Vec::new(),
            },
        );
        Ok(summary)
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>> {
        Ok(self
            .lock()
            .conversations
            .values()
            .map(|c| c.summary.clone())
            .collect())
    }

    async fn rename(&self, id: &ConversationId, title: &str) -> Result<()> {
        let mut inner = self.lock();
        let conv = lookup(&mut inner, id)?;
        conv.summary.title = Some(title.to_string());
        conv.summary.updated_at = Some(Utc::now().to_rfc3339());
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<()> {
        let k = key(id)?;
        self.lock()
            .conversations
            .remove(&k)
            .map(|_| ())
            .ok_or_else(|| JoeyError::not_found(format!("conversation {}", id)))
    }

    async fn messages(&self, id: &ConversationId) -> Result<Vec<Message>> {
        let mut inner = self.lock();
        Ok(lookup(&mut inner, id)?.messages.clone())
    }

    async fn append_message(&self, id: &ConversationId, role: Role, content: &str) -> Result<()> {
        let mut inner = self.lock();
        lookup(&mut inner, id)?
            .messages
            .push(Message::new(role, content));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_list_delete() {
        let store = InMemoryConversationStore::new();
        let a = store.create("New Chat").await.unwrap();
        let b = store.create("Other").await.unwrap();
        assert_eq!(a.id, ConversationId::from(1_i64));
        assert_eq!(b.id, ConversationId::from(2_i64));

        store.rename(&a.id, "Renamed").await.unwrap();
        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title.as_deref(), Some("Renamed"));

        store.delete(&a.id).await.unwrap();
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert!(matches!(store.delete(&a.id).await, Err(JoeyError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_ids_are_not_reused() {
        let store = InMemoryConversationStore::new();
        let first = store.create("a").await.unwrap();
        store.delete(&first.id).await.unwrap();
        let second = store.create("b").await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_messages_in_order() {
        let store = InMemoryConversationStore::new();
        let conv = store.create("t").await.unwrap();
        store.append_message(&conv.id, Role::User, "one").await.unwrap();
        store.append_message(&conv.id, Role::Assistant, "two").await.unwrap();
        let msgs = store.messages(&conv.id).await.unwrap();
        assert_eq!(
            msgs.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["one", "two"]
        );
        assert!(store.messages(&ConversationId::from("nope")).await.is_err());
    }
}
