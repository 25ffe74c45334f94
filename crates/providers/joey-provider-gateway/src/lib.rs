//! Joey AI gateway transport
//!
//! Talks to the chat gateway over HTTP:
//! - `POST /v1/chat/completions` as a Server-Sent Events stream or a single JSON reply
//! - `GET /v1/health` (or `/api/health`) for reachability
//! - `/conversations` routes for conversation persistence
//!
//! Every network and parse failure leaves this crate as a
//! [`JoeyError::Transport`](joey_core::JoeyError::Transport) carrying a status.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod conversations;
pub mod response;
pub mod sse;

pub use client::GatewayClient;
pub use conversations::HttpConversationStore;
pub use response::{extract_reply_text, resolve_health, ReplyShape};
pub use sse::{parse_frame, Frame, SseDecoder};
