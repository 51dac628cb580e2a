//! Payload envelope for pinned content
//!
//! Every payload this service writes is wrapped with a creation timestamp
//! so retrieval can tell "the store returned garbage" apart from "the
//! author stored an empty payload". Content written by other tooling may
//! not be wrapped; unwrapping falls back to the raw body in that case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Wrapper written around every pinned payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinEnvelope {
    pub content: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl PinEnvelope {
    /// Wrap an opaque text payload.
    pub fn text(content: &str) -> Self {
        Self {
            content: JsonValue::String(content.to_string()),
            created_at: Utc::now(),
        }
    }

    /// Wrap a structured payload.
    pub fn structured(content: JsonValue) -> Self {
        Self {
            content,
            created_at: Utc::now(),
        }
    }

    /// Unwrap a fetched body.
    ///
    /// Returns the enveloped content when the body parses as an envelope;
    /// structured content comes back as its JSON text. Anything else is
    /// returned verbatim for forward compatibility with payloads written
    /// by other tooling.
    pub fn unwrap_text(body: &str) -> String {
        match serde_json::from_str::<PinEnvelope>(body) {
            Ok(envelope) => match envelope.content {
                JsonValue::String(text) => text,
                other => other.to_string(),
            },
            Err(_) => body.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_round_trip() {
        let envelope = PinEnvelope::text("chapter one, in which nothing happens");
        let body = serde_json::to_string(&envelope).unwrap();
        assert_eq!(
            PinEnvelope::unwrap_text(&body),
            "chapter one, in which nothing happens"
        );
    }

    #[test]
    fn structured_content_unwraps_to_json_text() {
        let envelope = PinEnvelope::structured(serde_json::json!({ "description": "a tale" }));
        let body = serde_json::to_string(&envelope).unwrap();
        let unwrapped = PinEnvelope::unwrap_text(&body);
        let parsed: serde_json::Value = serde_json::from_str(&unwrapped).unwrap();
        assert_eq!(parsed["description"], "a tale");
    }

    #[test]
    fn non_envelope_body_is_returned_verbatim() {
        assert_eq!(PinEnvelope::unwrap_text("plain text"), "plain text");
        assert_eq!(PinEnvelope::unwrap_text(r#"{"foo": 1}"#), r#"{"foo": 1}"#);
    }
}
