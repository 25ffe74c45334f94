//! Conversation session: identity, history and the pending reply slot
//!
//! A session is one open chat view. It owns the conversation id (created
//! lazily on first send), the completed message history used to build
//! payloads, and at most one pending assistant slot. Every write to the slot
//! presents a [`SlotToken`]; a token from an attempt that has since been
//! superseded is rejected, so an aborted attempt can never overwrite a later
//! one.

use crate::render::{Notice, RenderSink};
use crate::title::{derive_title, is_placeholder, DEFAULT_TITLE};
use joey_core::{
    ConversationId, ConversationStore, JoeyError, Message, Result, Role, TerminalFailure,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Claim on the pending slot held by one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotToken {
    id: Uuid,
    attempt: u64,
}

impl SlotToken {
    /// View id of the pending message
    pub fn message_id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug)]
struct PendingSlot {
    token: SlotToken,
    buffer: String,
}

#[derive(Debug, Default)]
struct SessionState {
    id: Option<ConversationId>,
    title: Option<String>,
    history: Vec<Message>,
    pending: Option<PendingSlot>,
    attempts: u64,
    titled: bool,
}

/// Exclusive right to run one send in a session.
///
/// Released on drop, whichever way the send ends.
#[derive(Debug)]
pub struct SendLease {
    in_flight: Arc<AtomicBool>,
}

impl Drop for SendLease {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

/// One open conversation
pub struct ChatSession {
    store: Arc<dyn ConversationStore>,
    sink: Arc<dyn RenderSink>,
    state: Mutex<SessionState>,
    in_flight: Arc<AtomicBool>,
}

impl ChatSession {
    /// Session without a conversation yet; one is created on first send
    pub fn new(store: Arc<dyn ConversationStore>, sink: Arc<dyn RenderSink>) -> Self {
        Self {
            store,
            sink,
            state: Mutex::new(SessionState::default()),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Adopt an existing conversation and load its history
    pub async fn open(
        store: Arc<dyn ConversationStore>,
        sink: Arc<dyn RenderSink>,
        id: ConversationId,
    ) -> Result<Self> {
        let history = store.messages(&id).await?;
        let title = store
            .list()
            .await?
            .into_iter()
            .find(|c| c.id == id)
            .and_then(|c| c.title);

        for message in &history {
            sink.push_message(Uuid::new_v4(), message, false);
        }
        info!(conversation_id = %id, messages = history.len(), "Opened conversation");

        let session = Self::new(store, sink);
        {
            let mut state = session.state();
            state.titled = !is_placeholder(title.as_deref());
            state.id = Some(id);
            state.title = title;
            state.history = history;
        }
        Ok(session)
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current conversation id, if one exists
    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.state().id.clone()
    }

    /// Current title
    pub fn title(&self) -> Option<String> {
        self.state().title.clone()
    }

    /// Completed messages, oldest first
    pub fn history(&self) -> Vec<Message> {
        self.state().history.clone()
    }

    /// Oldest user message in the history, whether or not its send succeeded
    pub fn first_user_message(&self) -> Option<String> {
        self.state()
            .history
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
    }

    /// Acquire the single in-flight send for this conversation
    pub fn try_begin_send(&self) -> Result<SendLease> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| JoeyError::Busy)?;
        Ok(SendLease {
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Whether a send currently holds the lease
    pub fn is_sending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Return the conversation id, creating the conversation on first use
    pub async fn ensure_conversation(&self) -> Result<ConversationId> {
        if let Some(id) = self.conversation_id() {
            return Ok(id);
        }

        let created = self.store.create(DEFAULT_TITLE).await?;
        let mut state = self.state();
        // another caller won the race; keep the first id
        if let Some(existing) = state.id.clone() {
            return Ok(existing);
        }
        info!(conversation_id = %created.id, "Created conversation");
        state.id = Some(created.id.clone());
        state.title = created.title.or_else(|| Some(DEFAULT_TITLE.to_string()));
        Ok(created.id)
    }

    /// Record and display a user message
    pub fn append_user(&self, text: &str) -> Message {
        let message = Message::user(text);
        let mut state = self.state();
        state.history.push(message.clone());
        self.sink.push_message(Uuid::new_v4(), &message, false);
        message
    }

    /// Open the pending assistant slot
    pub fn append_assistant_pending(&self) -> Result<SlotToken> {
        let mut state = self.state();
        if state.pending.is_some() {
            return Err(JoeyError::Busy);
        }
        state.attempts += 1;
        let token = SlotToken {
            id: Uuid::new_v4(),
            attempt: state.attempts,
        };
        state.pending = Some(PendingSlot {
            token,
            buffer: String::new(),
        });
        self.sink
            .push_message(token.id, &Message::assistant(""), true);
        debug!(message_id = %token.id, "Pending slot opened");
        Ok(token)
    }

    /// Token of the attempt that currently owns the slot
    pub fn active_slot(&self) -> Option<SlotToken> {
        self.state().pending.as_ref().map(|p| p.token)
    }

    /// Hand the slot to a new attempt, discarding text written so far.
    ///
    /// `token` stops being accepted.
    pub fn take_over(&self, token: SlotToken) -> Result<SlotToken> {
        let mut state = self.state();
        state.attempts += 1;
        let next_attempt = state.attempts;
        let slot = Self::owned_slot(&mut state, token)?;
        slot.token.attempt = next_attempt;
        slot.buffer.clear();
        let next = slot.token;
        self.sink.reset(next.id);
        Ok(next)
    }

    /// Append a streamed piece to the slot
    pub fn apply_delta(&self, token: SlotToken, piece: &str) -> Result<()> {
        let mut state = self.state();
        let slot = Self::owned_slot(&mut state, token)?;
        slot.buffer.push_str(piece);
        self.sink.render_incremental(token.id, piece);
        Ok(())
    }

    /// Text written to the slot so far
    pub fn pending_text(&self, token: SlotToken) -> Result<String> {
        let mut state = self.state();
        Ok(Self::owned_slot(&mut state, token)?.buffer.clone())
    }

    /// Complete the slot with `text` and add it to the history
    pub fn finalize_assistant(&self, token: SlotToken, text: &str) -> Result<Message> {
        let mut state = self.state();
        Self::owned_slot(&mut state, token)?;
        state.pending = None;
        let message = Message::assistant(text);
        state.history.push(message.clone());
        self.sink.finalize(token.id, text);
        Ok(message)
    }

    /// Replace the slot with a terminal error
    pub fn fail_pending(&self, token: SlotToken, failure: &TerminalFailure) -> Result<()> {
        let mut state = self.state();
        Self::owned_slot(&mut state, token)?;
        state.pending = None;
        self.sink.fail(token.id, failure);
        Ok(())
    }

    /// Close the slot after a cancellation, keeping any partial text on screen.
    ///
    /// Partial text does not join the history.
    pub fn cancel_pending(&self, token: SlotToken) -> Result<String> {
        let mut state = self.state();
        let partial = std::mem::take(&mut Self::owned_slot(&mut state, token)?.buffer);
        state.pending = None;
        self.sink.finalize(token.id, &partial);
        self.sink.notice(Notice::Cancelled);
        Ok(partial)
    }

    /// Show a notice in this session's view
    pub fn notify(&self, notice: Notice) {
        self.sink.notice(notice);
    }

    fn owned_slot(state: &mut SessionState, token: SlotToken) -> Result<&mut PendingSlot> {
        match state.pending.as_mut() {
            Some(slot) if slot.token == token => Ok(slot),
            _ => {
                warn!(message_id = %token.id, attempt = token.attempt, "Rejected write from a stale attempt");
                Err(JoeyError::StaleSlot)
            }
        }
    }

    /// Persist a message; failures are logged, never returned
    pub async fn persist(&self, role: Role, content: &str) {
        let Some(id) = self.conversation_id() else {
            return;
        };
        if let Err(e) = self.store.append_message(&id, role, content).await {
            warn!(conversation_id = %id, %role, "Failed to persist message: {}", e);
        }
    }

    /// Title the conversation from its first user message.
    ///
    /// Runs at most once per session and only while the title is empty or a
    /// placeholder. Returns the new title when one was set.
    pub async fn auto_title(&self, first_user_message: &str) -> Result<Option<String>> {
        let (id, title) = {
            let mut state = self.state();
            if state.titled || !is_placeholder(state.title.as_deref()) {
                state.titled = true;
                return Ok(None);
            }
            let Some(title) = derive_title(first_user_message) else {
                return Ok(None);
            };
            state.titled = true;
            state.title = Some(title.clone());
            (state.id.clone(), title)
        };

        self.sink.title_changed(&title);
        if let Some(id) = id {
            self.store.rename(&id, &title).await?;
            info!(conversation_id = %id, title = %title, "Conversation titled");
        }
        Ok(Some(title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::MessageView;
    use crate::store::InMemoryConversationStore;

    fn session() -> (ChatSession, Arc<MessageView>, Arc<InMemoryConversationStore>) {
        let view = Arc::new(MessageView::new());
        let store = Arc::new(InMemoryConversationStore::new());
        (ChatSession::new(store.clone(), view.clone()), view, store)
    }

    #[tokio::test]
    async fn test_ensure_conversation_is_idempotent() {
        let (session, _, store) = session();
        let a = session.ensure_conversation().await.unwrap();
        let b = session.ensure_conversation().await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert_eq!(session.title().as_deref(), Some("New Chat"));
    }

    #[test]
    fn test_single_pending_slot() {
        let (session, view, _) = session();
        session.append_user("hi");
        let token = session.append_assistant_pending().unwrap();
        assert!(matches!(session.append_assistant_pending(), Err(JoeyError::Busy)));
        assert_eq!(view.pending_count(), 1);

        session.apply_delta(token, "hel").unwrap();
        session.apply_delta(token, "lo").unwrap();
        assert_eq!(session.pending_text(token).unwrap(), "hello");

        session.finalize_assistant(token, "hello").unwrap();
        assert_eq!(view.pending_count(), 0);
        assert_eq!(session.history().len(), 2);
        assert!(session.active_slot().is_none());
    }

    #[test]
    fn test_stale_attempt_cannot_write() {
        let (session, view, _) = session();
        let first = session.append_assistant_pending().unwrap();
        session.apply_delta(first, "partial").unwrap();

        let second = session.take_over(first).unwrap();
        assert_eq!(second.message_id(), first.message_id());
        assert!(matches!(session.apply_delta(first, "late"), Err(JoeyError::StaleSlot)));
        assert!(matches!(session.finalize_assistant(first, "x"), Err(JoeyError::StaleSlot)));
        assert_eq!(session.pending_text(second).unwrap(), "");

        session.finalize_assistant(second, "fresh").unwrap();
        assert_eq!(view.snapshot()[0].text, "fresh");
        assert!(matches!(session.apply_delta(second, "after"), Err(JoeyError::StaleSlot)));
    }

    #[test]
    fn test_lease_released_on_drop() {
        let (session, _, _) = session();
        let lease = session.try_begin_send().unwrap();
        assert!(session.is_sending());
        assert!(matches!(session.try_begin_send(), Err(JoeyError::Busy)));
        drop(lease);
        assert!(!session.is_sending());
        assert!(session.try_begin_send().is_ok());
    }

    #[test]
    fn test_cancel_keeps_partial_out_of_history() {
        let (session, view, _) = session();
        session.append_user("tell me a story");
        let token = session.append_assistant_pending().unwrap();
        session.apply_delta(token, "Once upon").unwrap();

        assert_eq!(session.cancel_pending(token).unwrap(), "Once upon");
        assert_eq!(view.pending_count(), 0);
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_auto_title_once() {
        let (session, _, store) = session();
        let id = session.ensure_conversation().await.unwrap();

        let title = session.auto_title("what is a monad in haskell exactly").await.unwrap();
        assert_eq!(title.as_deref(), Some("What Is A Monad In..."));
        assert_eq!(session.auto_title("second message").await.unwrap(), None);

        let listed = store.list().await.unwrap();
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].title.as_deref(), Some("What Is A Monad In..."));
    }

    #[test]
    fn test_first_user_message_survives_failed_send() {
        let (session, _, _) = session();
        assert_eq!(session.first_user_message(), None);

        session.append_user("why is the sky blue");
        let token = session.append_assistant_pending().unwrap();
        let failure = TerminalFailure {
            message: "The backend returned an error (500).".to_string(),
            attempts: 4,
            last_status: None,
            payload: "{}".to_string(),
        };
        session.fail_pending(token, &failure).unwrap();
        session.append_user("hello?");

        assert_eq!(session.first_user_message().as_deref(), Some("why is the sky blue"));
    }

    #[tokio::test]
    async fn test_open_keeps_custom_title() {
        let store = Arc::new(InMemoryConversationStore::new());
        let created = store.create("Trip planning").await.unwrap();
        store.append_message(&created.id, Role::User, "hi").await.unwrap();
        store.append_message(&created.id, Role::Assistant, "hello").await.unwrap();

        let view = Arc::new(MessageView::new());
        let session = ChatSession::open(store.clone(), view.clone(), created.id.clone())
            .await
            .unwrap();
        assert_eq!(session.history().len(), 2);
        assert_eq!(view.snapshot().len(), 2);
        assert_eq!(session.auto_title("hi").await.unwrap(), None);
        assert_eq!(session.title().as_deref(), Some("Trip planning"));
    }
}
