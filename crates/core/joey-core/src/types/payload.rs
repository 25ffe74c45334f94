//! Outbound chat request payload

use super::{Message, Role};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Message as sent to the chat endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadMessage {
    /// Author
    pub role: Role,
    /// Message text
    pub content: String,
}

impl From<&Message> for PayloadMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

/// Body of one logical send.
///
/// Built once per send and shared by the stream attempt and every fallback
/// attempt, so all attempts serialize to the same bytes apart from `stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendPayload {
    /// Model name
    pub model: String,
    /// Provider routing hint for the gateway
    pub provider: String,
    /// Sampling temperature
    pub temperature: f64,
    /// Conversation history, oldest first
    pub messages: Vec<PayloadMessage>,
}

impl SendPayload {
    /// Build a payload from conversation history
    pub fn new(
        model: impl Into<String>,
        provider: impl Into<String>,
        temperature: f64,
        history: &[Message],
    ) -> Self {
        Self {
            model: model.into(),
            provider: provider.into(),
            temperature,
            messages: history.iter().map(PayloadMessage::from).collect(),
        }
    }

    /// Request envelope for the chat endpoint
    pub fn to_request(&self, stream: bool) -> ChatRequest<'_> {
        ChatRequest {
            payload: self,
            stream,
        }
    }

    /// Pretty JSON of the payload, used when surfacing a failed send
    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// `POST /v1/chat/completions` body
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    /// Shared payload
    #[serde(flatten)]
    pub payload: &'a SendPayload,
    /// Whether an event stream is requested
    pub stream: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> SendPayload {
        SendPayload::new(
            "qwen2.5-coder:7b",
            "ollama",
            0.2,
            &[Message::user("hello"), Message::assistant("hi there")],
        )
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(payload().to_request(true)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "qwen2.5-coder:7b",
                "provider": "ollama",
                "temperature": 0.2,
                "messages": [
                    {"role": "user", "content": "hello"},
                    {"role": "assistant", "content": "hi there"}
                ],
                "stream": true
            })
        );
    }

    #[test]
    fn test_stream_flag_is_the_only_difference() {
        let p = payload();
        let mut streamed = serde_json::to_value(p.to_request(true)).unwrap();
        let mut once = serde_json::to_value(p.to_request(false)).unwrap();
        streamed.as_object_mut().unwrap().remove("stream");
        once.as_object_mut().unwrap().remove("stream");
        assert_eq!(streamed, once);
    }

    #[test]
    fn test_pretty_json_roundtrips() {
        let p = payload();
        let text = p.to_pretty_json().unwrap();
        let back: SendPayload = serde_json::from_str(&text).unwrap();
        assert_eq!(back, p);
    }
}
