//! Chat message types

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Typed by the user
    User,
    /// Produced by the model
    Assistant,
    /// Instructions injected ahead of the conversation
    System,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Author
    pub role: Role,
    /// Message text
    pub content: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Message as stored by the conversation backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Backend row id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    /// Author
    pub role: Role,
    /// Message text
    pub content: String,
    /// Backend timestamp, format varies between deployments
    #[serde(default, alias = "created_at", skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

impl MessageRecord {
    /// Convert into a [`Message`], falling back to now for unreadable timestamps
    pub fn into_message(self) -> Message {
        let created_at = self
            .ts
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);
        Message {
            role: self.role,
            content: self.content,
            created_at,
        }
    }
}

/// Parse RFC 3339 or SQLite-style `YYYY-MM-DD HH:MM:SS` timestamps
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }

    #[test]
    fn test_record_timestamps() {
        let record: MessageRecord = serde_json::from_str(
            r#"{"id": 7, "role": "user", "content": "hi", "ts": "2024-03-01 10:20:30"}"#,
        )
        .unwrap();
        let msg = record.into_message();
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.created_at.to_rfc3339(), "2024-03-01T10:20:30+00:00");

        assert!(parse_timestamp("2024-03-01T10:20:30Z").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
