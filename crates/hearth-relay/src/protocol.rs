//! JSON wire protocol spoken over the relay WebSocket.
//!
//! Both directions are internally tagged on `type`. Outbound messages travel
//! through one broadcast channel wrapped in an [`Envelope`]; each
//! connection's send loop drops envelopes not addressed to it.

use serde::{Deserialize, Serialize};

use hearth_core::{ChatEvent, ConnectionId, Presence, Signal};

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask to join under a display identity.
    RegisterIdentity {
        name: String,
        #[serde(default = "default_color")]
        color: String,
        #[serde(default)]
        avatar: String,
    },
    /// Ordinary chat, a command, or a password answer.
    ChatMessage { text: String },
    PrivateMessage { recipient: String, text: String },
    Typing { is_typing: bool },
    Rename { name: String },
}

fn default_color() -> String {
    "#000000".to_string()
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full history, sent once on connect.
    HistorySnapshot { events: Vec<ChatEvent> },
    ChatEvent { event: ChatEvent },
    PresenceUpdate { users: Vec<Presence> },
    PrivateChatEvent { from: String, text: String },
    TypingIndicator { user: String, is_typing: bool },
    /// Current temp-disable flag, sent once on connect.
    DisableState { active: bool },
    DisableOn,
    DisableOff,
    HistoryCleared,
    ShutdownInitiated,
}

impl From<Signal> for ServerMessage {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::DisableOn => ServerMessage::DisableOn,
            Signal::DisableOff => ServerMessage::DisableOff,
            Signal::HistoryCleared => ServerMessage::HistoryCleared,
            Signal::ShutdownInitiated => ServerMessage::ShutdownInitiated,
        }
    }
}

/// Who should receive an outbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Only(ConnectionId),
    AllExcept(ConnectionId),
}

impl Audience {
    pub fn includes(&self, id: ConnectionId) -> bool {
        match *self {
            Audience::All => true,
            Audience::Only(to) => to == id,
            Audience::AllExcept(skip) => skip != id,
        }
    }
}

/// An outbound message with its audience, as carried by the broadcast channel.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub audience: Audience,
    pub message: ServerMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_messages_are_tagged_by_type() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "register_identity",
            "name": "Bob",
            "color": "#ff0000",
            "avatar": "B",
        }))
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::RegisterIdentity {
                name: "Bob".to_string(),
                color: "#ff0000".to_string(),
                avatar: "B".to_string(),
            }
        );

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"private_message","recipient":"Alice","text":"hi"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::PrivateMessage { .. }));
    }

    #[test]
    fn register_fills_missing_color_and_avatar() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"register_identity","name":"Bob"}"#).unwrap();
        let ClientMessage::RegisterIdentity { color, avatar, .. } = msg else {
            panic!("wrong variant");
        };
        assert_eq!(color, "#000000");
        assert_eq!(avatar, "");
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"delete","id":1}"#).is_err());
    }

    #[test]
    fn server_messages_serialize_flat() {
        let value = serde_json::to_value(ServerMessage::TypingIndicator {
            user: "Bob".to_string(),
            is_typing: true,
        })
        .unwrap();
        assert_eq!(value, json!({"type": "typing_indicator", "user": "Bob", "is_typing": true}));

        let value = serde_json::to_value(ServerMessage::from(Signal::HistoryCleared)).unwrap();
        assert_eq!(value, json!({"type": "history_cleared"}));
    }

    #[test]
    fn audience_filtering() {
        let a = ConnectionId::random();
        let b = ConnectionId::random();
        assert!(Audience::All.includes(a));
        assert!(Audience::Only(a).includes(a));
        assert!(!Audience::Only(a).includes(b));
        assert!(!Audience::AllExcept(a).includes(a));
        assert!(Audience::AllExcept(a).includes(b));
    }
}
