//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization, plus the `ChatMessage`
//! record kept in room history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message body that clients send to request a buzz alert
pub const BUZZ_SENTINEL: &str = "__BUZZ__";

/// What a stored message represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain chat text
    Text,
    /// Buzz alert; the body carries no payload
    Buzz,
}

/// A message as stored in room history and broadcast to members
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub author: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
}

impl ChatMessage {
    /// Plain text message stamped with the current UTC time
    pub fn text(author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            body: body.into(),
            timestamp: Utc::now(),
            kind: MessageKind::Text,
        }
    }

    /// Buzz alert stamped with the current UTC time
    pub fn buzz(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            body: BUZZ_SENTINEL.to_string(),
            timestamp: Utc::now(),
            kind: MessageKind::Buzz,
        }
    }

    pub fn is_buzz(&self) -> bool {
        self.kind == MessageKind::Buzz
    }
}

/// Whether client text asks for a buzz rather than a chat message
pub fn is_buzz_request(text: &str) -> bool {
    text.trim() == BUZZ_SENTINEL
}

/// Client → Server message
///
/// All actions a connection can invoke. Uses tagged enum with snake_case naming.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter a room (creating it if it has no traffic yet)
    Join { room: String, user: String },
    /// Leave a room
    Leave { room: String, user: String },
    /// Post a message, or a buzz when `text` is the sentinel
    Send {
        room: String,
        user: String,
        text: String,
    },
    /// Indicate the user is typing
    Typing { room: String, user: String },
    /// Move from one room to another
    SwitchRoom {
        #[serde(default)]
        from: String,
        to: String,
        user: String,
    },
}

/// Server → Client message
///
/// All events a connection can receive. Uses tagged enum with snake_case naming.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection successful, connection ID issued
    Connected { connection_id: String },
    /// Notice from the relay (joins, leaves, throttling)
    System { text: String },
    /// Recent messages of a room, oldest first
    History { messages: Vec<ChatMessage> },
    /// A message posted to a room
    Message { message: ChatMessage },
    /// Another member is typing
    Typing { user: String },
}

impl ServerMessage {
    pub fn system(text: impl Into<String>) -> Self {
        ServerMessage::System { text: text.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_deserialize() {
        let json = r#"{"type": "send", "room": "general", "user": "Alice", "text": "hi"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Send { room, user, text } => {
                assert_eq!(room, "general");
                assert_eq!(user, "Alice");
                assert_eq!(text, "hi");
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_switch_room_without_origin() {
        let json = r#"{"type": "switch_room", "to": "random", "user": "Alice"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::SwitchRoom { from, to, .. } => {
                assert!(from.is_empty());
                assert_eq!(to, "random");
            }
            _ => panic!("Wrong variant"),
        }
    }

    #[test]
    fn test_server_message_serialize() {
        let msg = ServerMessage::Connected {
            connection_id: "test-id".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"connected\""));
        assert!(json.contains("\"connection_id\":\"test-id\""));
    }

    #[test]
    fn test_chat_message_serialize() {
        let msg = ServerMessage::Message {
            message: ChatMessage::buzz("Alice"),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"message\""));
        assert!(json.contains("\"author\":\"Alice\""));
        assert!(json.contains("\"kind\":\"buzz\""));
        assert!(json.contains("\"timestamp\":"));
    }

    #[test]
    fn test_buzz_request_detection() {
        assert!(is_buzz_request("__BUZZ__"));
        assert!(is_buzz_request("  __BUZZ__\n"));
        assert!(!is_buzz_request("__buzz__"));
        assert!(!is_buzz_request("hello __BUZZ__"));
    }
}
