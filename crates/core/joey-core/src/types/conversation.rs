//! Conversation identity types

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Opaque conversation identifier.
///
/// Backends hand out either integers or strings; both are held as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wrap an identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier as text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for ConversationId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for ConversationId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Int(n) => ConversationId(n.to_string()),
            RawId::Text(s) => ConversationId(s),
        })
    }
}

/// Conversation as listed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Identifier
    pub id: ConversationId,
    /// Title, absent until one is set
    #[serde(default)]
    pub title: Option<String>,
    /// Hidden from the default list
    #[serde(default, deserialize_with = "bool_or_int")]
    pub archived: bool,
    /// Backend creation timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Backend update timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl ConversationSummary {
    /// Summary with only an id and title
    pub fn new(id: ConversationId, title: Option<String>) -> Self {
        Self {
            id,
            title,
            archived: false,
            created_at: None,
            updated_at: None,
        }
    }
}

// SQLite-backed deployments send 0/1
fn bool_or_int<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawFlag {
        Bool(bool),
        Int(i64),
    }

    Ok(match RawFlag::deserialize(deserializer)? {
        RawFlag::Bool(b) => b,
        RawFlag::Int(n) => n != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_int_or_string() {
        let a: ConversationId = serde_json::from_str("42").unwrap();
        let b: ConversationId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "42");

        let c: ConversationId = serde_json::from_str("\"c-9f2\"").unwrap();
        assert_eq!(c.as_str(), "c-9f2");
    }

    #[test]
    fn test_summary_defaults() {
        let summary: ConversationSummary = serde_json::from_str(r#"{"id": 3}"#).unwrap();
        assert_eq!(summary.id, ConversationId::from(3_i64));
        assert_eq!(summary.title, None);
        assert!(!summary.archived);

        let archived: ConversationSummary =
            serde_json::from_str(r#"{"id": 4, "title": "Old", "archived": 1}"#).unwrap();
        assert!(archived.archived);
    }
}
