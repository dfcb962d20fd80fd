//! Envelope types for the chatrelay protocol.
//!
//! An envelope is the unit of communication between clients and the relay.
//! Envelopes are serialized as plain JSON so that any browser client can
//! produce and consume them without a protocol library.

use serde::{Deserialize, Serialize};

/// The kind of a chat event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    /// A user joined a channel.
    Join,
    /// A user left a channel.
    Leave,
    /// A regular chat message.
    Chat,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Join => write!(f, "JOIN"),
            EventKind::Leave => write!(f, "LEAVE"),
            EventKind::Chat => write!(f, "CHAT"),
        }
    }
}

/// A chat event envelope.
///
/// This is the JSON shape exchanged over the transport boundary:
///
/// ```json
/// { "type": "CHAT", "sender": "alice", "channel": "public", "content": "hi" }
/// ```
///
/// Inbound JOIN requests carry no `content`; the relay synthesizes it.
/// Every envelope delivered to subscribers carries a populated `content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Who produced the event.
    pub sender: String,
    /// Target channel.
    pub channel: String,
    /// Message text. Required for CHAT; synthesized for JOIN/LEAVE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Envelope {
    /// Create a CHAT envelope.
    #[must_use]
    pub fn chat(
        sender: impl Into<String>,
        channel: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            kind: EventKind::Chat,
            sender: sender.into(),
            channel: channel.into(),
            content: Some(content.into()),
        }
    }

    /// Create a synthetic JOIN broadcast with the canonical content.
    #[must_use]
    pub fn join(sender: impl Into<String>, channel: impl Into<String>) -> Self {
        let sender = sender.into();
        let content = format!("{sender} joined!");
        Self {
            kind: EventKind::Join,
            sender,
            channel: channel.into(),
            content: Some(content),
        }
    }

    /// Create a synthetic LEAVE broadcast with the canonical content.
    #[must_use]
    pub fn leave(sender: impl Into<String>, channel: impl Into<String>) -> Self {
        let sender = sender.into();
        let content = format!("{sender} left!");
        Self {
            kind: EventKind::Leave,
            sender,
            channel: channel.into(),
            content: Some(content),
        }
    }

    /// Create an inbound JOIN request as a client would send it (no content).
    #[must_use]
    pub fn join_request(sender: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Join,
            sender: sender.into(),
            channel: channel.into(),
            content: None,
        }
    }

    /// Get the content, or an empty string if unset.
    #[must_use]
    pub fn content(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_envelope() {
        let env = Envelope::chat("alice", "public", "hello");
        assert_eq!(env.kind, EventKind::Chat);
        assert_eq!(env.sender, "alice");
        assert_eq!(env.channel, "public");
        assert_eq!(env.content(), "hello");
    }

    #[test]
    fn test_synthetic_content() {
        let join = Envelope::join("alice", "public");
        assert_eq!(join.content(), "alice joined!");

        let leave = Envelope::leave("bob", "public");
        assert_eq!(leave.content(), "bob left!");
    }

    #[test]
    fn test_join_request_has_no_content() {
        let req = Envelope::join_request("alice", "public");
        assert_eq!(req.kind, EventKind::Join);
        assert!(req.content.is_none());
    }

    #[test]
    fn test_kind_serializes_uppercase() {
        let json = serde_json::to_string(&Envelope::chat("a", "c", "x")).unwrap();
        assert!(json.contains("\"type\":\"CHAT\""));

        let json = serde_json::to_string(&Envelope::join("a", "c")).unwrap();
        assert!(json.contains("\"type\":\"JOIN\""));
    }
}
