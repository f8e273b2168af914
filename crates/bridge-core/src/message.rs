use serde::{Deserialize, Serialize};

/// One unread message pulled from the mailbox API. Immutable once received;
/// consumed exactly once by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub text: String,
    /// Server-side creation timestamp, opaque to us. Part of the dedup key.
    #[serde(default, rename = "created_at")]
    pub timestamp: String,
}

impl InboundMessage {
    pub fn new(text: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: timestamp.into(),
        }
    }
}

/// One line of the local outbox file, queued for delivery to the mailbox.
/// Lines are either JSON `{"text": ...}` payloads or plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub text: String,
}

impl OutboxEntry {
    /// Parse a single outbox line. Empty lines yield `None`; anything that
    /// is not a JSON object with a string `text` field is sent verbatim.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
            if let Some(text) = value.get("text").and_then(|t| t.as_str()) {
                return Some(Self {
                    text: text.to_string(),
                });
            }
        }
        Some(Self {
            text: line.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_parses_json_payload() {
        let entry = OutboxEntry::parse(r#"{"text":"deploy finished"}"#).unwrap();
        assert_eq!(entry.text, "deploy finished");
    }

    #[test]
    fn outbox_falls_back_to_plain_text() {
        let entry = OutboxEntry::parse("not json at all").unwrap();
        assert_eq!(entry.text, "not json at all");
        // JSON without a text field is forwarded verbatim too
        let entry = OutboxEntry::parse(r#"{"body":"x"}"#).unwrap();
        assert_eq!(entry.text, r#"{"body":"x"}"#);
    }

    #[test]
    fn outbox_skips_blank_lines() {
        assert!(OutboxEntry::parse("   ").is_none());
        assert!(OutboxEntry::parse("").is_none());
    }
}
