//! Known response shapes of the gateway and its backends

use joey_core::HealthReport;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Reply body of a non-streaming chat request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyShape {
    /// OpenAI style: `choices[0].message.content`
    Choices(String),
    /// Ollama style: `message.content`
    Message(String),
    /// Bare `content`
    Flat(String),
}

#[derive(Deserialize)]
struct ChoicesReply {
    choices: Vec<ChoiceEntry>,
}

#[derive(Deserialize)]
struct ChoiceEntry {
    message: ContentField,
}

#[derive(Deserialize)]
struct MessageReply {
    message: ContentField,
}

#[derive(Deserialize)]
struct ContentField {
    content: String,
}

impl ReplyShape {
    /// Match `body` against the known shapes in priority order
    pub fn resolve(body: &Value) -> Option<Self> {
        if let Ok(reply) = ChoicesReply::deserialize(body) {
            if let Some(first) = reply.choices.into_iter().next() {
                return Some(ReplyShape::Choices(first.message.content));
            }
        }
        if let Ok(reply) = MessageReply::deserialize(body) {
            return Some(ReplyShape::Message(reply.message.content));
        }
        if let Ok(reply) = ContentField::deserialize(body) {
            return Some(ReplyShape::Flat(reply.content));
        }
        None
    }

    /// Reply text
    pub fn into_text(self) -> String {
        match self {
            ReplyShape::Choices(t) | ReplyShape::Message(t) | ReplyShape::Flat(t) => t,
        }
    }
}

/// Reply text of a non-streaming response, empty if no shape matches
pub fn extract_reply_text(body: &Value) -> String {
    match ReplyShape::resolve(body) {
        Some(shape) => shape.into_text(),
        None => {
            warn!("Unrecognised reply shape, using empty text");
            String::new()
        }
    }
}

#[derive(Deserialize)]
struct FlatHealth {
    ok: bool,
    #[serde(default)]
    base: Option<String>,
    #[serde(default, alias = "active_model")]
    model: Option<String>,
}

#[derive(Deserialize)]
struct NestedHealth {
    ollama: FlatHealth,
    #[serde(default)]
    active_model: Option<String>,
}

#[derive(Deserialize)]
struct StatusHealth {
    status: String,
    #[serde(default)]
    base: Option<String>,
    #[serde(default)]
    active_model: Option<String>,
}

/// Health body in one of the known shapes.
///
/// `{ok, base}` first, then `{ollama: {ok, base}}`, then `{status, active_model}`.
/// `default_base` fills in a missing base.
pub fn resolve_health(body: &Value, default_base: &str) -> Option<HealthReport> {
    let base_or = |b: Option<String>| b.unwrap_or_else(|| default_base.to_string());

    if let Ok(h) = FlatHealth::deserialize(body) {
        return Some(HealthReport {
            ok: h.ok,
            base: base_or(h.base),
            model: h.model,
        });
    }
    if let Ok(h) = NestedHealth::deserialize(body) {
        return Some(HealthReport {
            ok: h.ollama.ok,
            base: base_or(h.ollama.base),
            model: h.active_model.or(h.ollama.model),
        });
    }
    if let Ok(h) = StatusHealth::deserialize(body) {
        let ok = matches!(
            h.status.to_ascii_lowercase().as_str(),
            "ok" | "healthy" | "up"
        );
        return Some(HealthReport {
            ok,
            base: base_or(h.base),
            model: h.active_model,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_shapes_in_order() {
        assert_eq!(
            ReplyShape::resolve(&json!({"choices": [{"message": {"content": "hi"}}]})),
            Some(ReplyShape::Choices("hi".to_string()))
        );
        assert_eq!(
            ReplyShape::resolve(&json!({"message": {"role": "assistant", "content": "hey"}})),
            Some(ReplyShape::Message("hey".to_string()))
        );
        assert_eq!(
            ReplyShape::resolve(&json!({"content": "yo"})),
            Some(ReplyShape::Flat("yo".to_string()))
        );
    }

    #[test]
    fn test_invalid_shapes_fall_through() {
        // empty choices and a null content are not accepted as the first shape
        let body = json!({"choices": [], "content": "flat wins"});
        assert_eq!(extract_reply_text(&body), "flat wins");

        let body = json!({"choices": [{"message": {"content": null}}], "message": {"content": "m"}});
        assert_eq!(extract_reply_text(&body), "m");
    }

    #[test]
    fn test_unknown_shape_defaults_to_empty() {
        assert_eq!(extract_reply_text(&json!({"result": "?"})), "");
        assert_eq!(extract_reply_text(&json!("just a string")), "");
    }

    #[test]
    fn test_health_shapes() {
        let flat = resolve_health(&json!({"ok": true, "base": "http://ollama:11434"}), "gw").unwrap();
        assert!(flat.ok);
        assert_eq!(flat.base, "http://ollama:11434");

        let nested = resolve_health(&json!({"ollama": {"ok": false, "base": "b"}}), "gw").unwrap();
        assert!(!nested.ok);
        assert_eq!(nested.base, "b");

        let status =
            resolve_health(&json!({"status": "ok", "active_model": "llama3"}), "gw").unwrap();
        assert!(status.ok);
        assert_eq!(status.base, "gw");
        assert_eq!(status.model.as_deref(), Some("llama3"));

        assert!(resolve_health(&json!({"uptime": 3}), "gw").is_none());
    }
}
