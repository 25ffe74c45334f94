//! Render sink: turns reply text into display content
//!
//! Display content is always rebuilt from the full buffered text of a
//! message, never patched piece by piece, so rendering an incomplete buffer
//! and rendering the finished one are both pure functions of the text.

use chrono::{DateTime, Utc};
use joey_core::{Message, Role, TerminalFailure};
use regex::Regex;
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::sync::broadcast;
use uuid::Uuid;

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"^\s*```\s*([A-Za-z0-9_+#.-]*)\s*$").expect("fence pattern is valid")
    })
}

/// Display block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Block {
    /// Prose
    Text(String),
    /// Fenced code
    Code {
        /// Language tag after the opening fence
        lang: Option<String>,
        /// Code between the fences
        body: String,
        /// Whether the closing fence is present
        closed: bool,
    },
}

/// Split `text` into display blocks.
///
/// With `complete` set, a code fence still open at the end is closed.
pub fn render_blocks(text: &str, complete: bool) -> Vec<Block> {
    let fence = fence_pattern();
    let mut blocks = Vec::new();
    let mut prose: Vec<&str> = Vec::new();
    let mut code: Option<(Option<String>, Vec<&str>)> = None;

    for line in text.split('\n') {
        let marker = fence.captures(line);
        match (code.take(), marker) {
            (None, Some(caps)) => {
                if !prose.is_empty() {
                    blocks.push(Block::Text(prose.join("\n")));
                    prose.clear();
                }
                let lang = caps
                    .get(1)
                    .map(|m| m.as_str())
                    .filter(|l| !l.is_empty())
                    .map(str::to_string);
                code = Some((lang, Vec::new()));
            }
            (None, None) => prose.push(line),
            (Some((lang, body)), Some(_)) => blocks.push(Block::Code {
                lang,
                body: body.join("\n"),
                closed: true,
            }),
            (Some((lang, mut body)), None) => {
                body.push(line);
                code = Some((lang, body));
            }
        }
    }

    if let Some((lang, body)) = code {
        blocks.push(Block::Code {
            lang,
            body: body.join("\n"),
            closed: complete,
        });
    } else if !prose.is_empty() && !(prose.len() == 1 && prose[0].is_empty()) {
        blocks.push(Block::Text(prose.join("\n")));
    }

    blocks
}

/// Text form of rendered blocks
pub fn blocks_to_text(blocks: &[Block]) -> String {
    let parts: Vec<String> = blocks
        .iter()
        .map(|block| match block {
            Block::Text(t) => t.clone(),
            Block::Code { lang, body, closed } => {
                let mut out = format!("```{}\n{}", lang.as_deref().unwrap_or(""), body);
                if *closed {
                    out.push_str("\n```");
                }
                out
            }
        })
        .collect();
    parts.join("\n")
}

/// User-facing notice that is not tied to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// Send refused because the backend is offline
    Offline {
        /// Base the health probe reported
        base: String,
    },
    /// Send refused because another send is still running
    Busy,
    /// The running send was cancelled
    Cancelled,
}

/// Consumer of message list changes
pub trait RenderSink: Send + Sync {
    /// A message joined the list; `pending` marks the in-flight reply
    fn push_message(&self, id: Uuid, message: &Message, pending: bool);

    /// Append `piece` to the pending message and re-render it in full
    fn render_incremental(&self, id: Uuid, piece: &str);

    /// Discard the pending message's text; a new attempt takes the slot over
    fn reset(&self, id: Uuid);

    /// Fix the final text, clear the pending marker, render once more
    fn finalize(&self, id: Uuid, full_text: &str);

    /// Replace the pending message with an error
    fn fail(&self, id: Uuid, failure: &TerminalFailure);

    /// Show a notice
    fn notice(&self, notice: Notice);

    /// The conversation got a new title
    fn title_changed(&self, title: &str);
}

/// Message as displayed
#[derive(Debug, Clone, Serialize)]
pub struct ViewMessage {
    /// View-local id
    pub id: Uuid,
    /// Author
    pub role: Role,
    /// Accumulated text
    pub text: String,
    /// Display blocks rendered from `text`
    pub blocks: Vec<Block>,
    /// Still receiving text
    pub pending: bool,
    /// Terminal failure shown in place of a reply
    pub failure: Option<TerminalFailure>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl ViewMessage {
    /// Display text
    pub fn display(&self) -> String {
        match &self.failure {
            Some(f) => f.message.clone(),
            None => blocks_to_text(&self.blocks),
        }
    }

    fn rerender(&mut self) {
        self.blocks = render_blocks(&self.text, !self.pending);
    }
}

/// Change published by [`MessageView`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewEvent {
    /// Message added
    Appended {
        /// Message id
        id: Uuid,
        /// Author
        role: Role,
        /// Pending marker
        pending: bool,
    },
    /// Pending message grew by `piece`
    Updated {
        /// Message id
        id: Uuid,
        /// New text
        piece: String,
    },
    /// Pending message text was discarded
    Reset {
        /// Message id
        id: Uuid,
    },
    /// Message completed
    Finalized {
        /// Message id
        id: Uuid,
        /// Full final text
        text: String,
    },
    /// Message replaced by an error
    Failed {
        /// Message id
        id: Uuid,
        /// Error text
        message: String,
    },
    /// Notice
    Notice(Notice),
    /// New conversation title
    TitleChanged(String),
}

/// In-memory message list with change notifications
pub struct MessageView {
    messages: Mutex<Vec<ViewMessage>>,
    events: broadcast::Sender<ViewEvent>,
}

impl Default for MessageView {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageView {
    /// Create an empty view
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            messages: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Subscribe to changes
    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }

    /// Copy of the current list
    pub fn snapshot(&self) -> Vec<ViewMessage> {
        self.lock().clone()
    }

    /// Number of messages marked pending
    pub fn pending_count(&self) -> usize {
        self.lock().iter().filter(|m| m.pending).count()
    }

    /// Outbound payload of a failed message, for copying
    pub fn failure_payload(&self, id: Uuid) -> Option<String> {
        self.lock()
            .iter()
            .find(|m| m.id == id)
            .and_then(|m| m.failure.as_ref())
            .map(|f| f.payload.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ViewMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: ViewEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn with_pending<F>(&self, id: Uuid, f: F) -> bool
    where
        F: FnOnce(&mut ViewMessage),
    {
        let mut messages = self.lock();
        match messages.iter_mut().find(|m| m.id == id && m.pending) {
            Some(m) => {
                f(m);
                true
            }
            None => {
                tracing::debug!(%id, "Ignoring update for a message that is not pending");
                false
            }
        }
    }
}

impl RenderSink for MessageView {
    fn push_message(&self, id: Uuid, message: &Message, pending: bool) {
        let mut entry = ViewMessage {
            id,
            role: message.role,
            text: message.content.clone(),
            blocks: Vec::new(),
            pending,
            failure: None,
            created_at: message.created_at,
        };
        entry.rerender();
        self.lock().push(entry);
        self.publish(ViewEvent::Appended {
            id,
            role: message.role,
            pending,
        });
    }

    fn render_incremental(&self, id: Uuid, piece: &str) {
        let applied = self.with_pending(id, |m| {
            m.text.push_str(piece);
            m.rerender();
        });
        if applied {
            self.publish(ViewEvent::Updated {
                id,
                piece: piece.to_string(),
            });
        }
    }

    fn reset(&self, id: Uuid) {
        let applied = self.with_pending(id, |m| {
            m.text.clear();
            m.rerender();
        });
        if applied {
            self.publish(ViewEvent::Reset { id });
        }
    }

    fn finalize(&self, id: Uuid, full_text: &str) {
        let applied = self.with_pending(id, |m| {
            m.text = full_text.to_string();
            m.pending = false;
            m.rerender();
        });
        if applied {
            self.publish(ViewEvent::Finalized {
                id,
                text: full_text.to_string(),
            });
        }
    }

    fn fail(&self, id: Uuid, failure: &TerminalFailure) {
        let applied = self.with_pending(id, |m| {
            m.text.clear();
            m.blocks.clear();
            m.pending = false;
            m.failure = Some(failure.clone());
        });
        if applied {
            self.publish(ViewEvent::Failed {
                id,
                message: failure.message.clone(),
            });
        }
    }

    fn notice(&self, notice: Notice) {
        self.publish(ViewEvent::Notice(notice));
    }

    fn title_changed(&self, title: &str) {
        self.publish(ViewEvent::TitleChanged(title.to_string()));
    }
}
