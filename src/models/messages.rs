use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::presence::CursorPosition;

/// Heartbeat sent by the client
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PingMessage {
    #[serde(default)]
    pub date: Option<String>,
}

/// Heartbeat reply from the server
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PongMessage {
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceEvent {
    #[serde(rename = "user_joined")]
    UserJoined,
    #[serde(rename = "user_left")]
    UserLeft,
}

/// Membership change on the connection's document scope
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PresenceMessage {
    pub event: PresenceEvent,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Full membership snapshot; when present it wins over the single event
    #[serde(default)]
    pub active_users: Option<Vec<String>>,
    /// Monotonic sequence for discarding out-of-order deliveries
    #[serde(default)]
    pub seq: Option<u64>,
}

/// Cursor update, sent in both directions
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CursorMoveMessage {
    pub user_id: String,
    pub position: CursorPosition,
}

/// A document's stored content or version list changed on the backend
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DocumentUpdateMessage {
    #[serde(default)]
    pub document_id: Option<String>,
}

/// Messages arriving on the multiplexed realtime socket
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", content = "payload")]
pub enum ReceivedMessage {
    #[serde(rename = "activity")]
    Activity(Value),
    #[serde(rename = "notification")]
    Notification(Value),
    #[serde(rename = "presence")]
    Presence(PresenceMessage),
    #[serde(rename = "cursor_move")]
    CursorMove(CursorMoveMessage),
    #[serde(rename = "document_change")]
    DocumentChange(Value),
    #[serde(rename = "document_update")]
    DocumentUpdate(DocumentUpdateMessage),
    #[serde(rename = "ping")]
    Ping(PingMessage),
    #[serde(rename = "pong")]
    Pong(PongMessage),
}

/// Messages the client sends over the realtime socket
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", content = "payload")]
pub enum SendMessage {
    #[serde(rename = "ping")]
    Ping(PingMessage),
    #[serde(rename = "cursor_move")]
    CursorMove(CursorMoveMessage),
    #[serde(rename = "document_change")]
    DocumentChange(Value),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ping_serializes_with_type_and_payload() {
        let ping = SendMessage::Ping(PingMessage {
            date: Some("2026-08-22T10:00:00Z".to_string()),
        });
        let value = serde_json::to_value(&ping).unwrap();
        assert_eq!(value["type"], "ping");
        assert_eq!(value["payload"]["date"], "2026-08-22T10:00:00Z");
    }

    #[test]
    fn cursor_move_round_trips() {
        let sent = SendMessage::CursorMove(CursorMoveMessage {
            user_id: "user-1".to_string(),
            position: CursorPosition { line: 12, column: 4 },
        });
        let raw = serde_json::to_string(&sent).unwrap();
        let received: ReceivedMessage = serde_json::from_str(&raw).unwrap();
        match received {
            ReceivedMessage::CursorMove(msg) => {
                assert_eq!(msg.user_id, "user-1");
                assert_eq!(msg.position, CursorPosition { line: 12, column: 4 });
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn parses_presence_frame() {
        let raw = json!({
            "type": "presence",
            "payload": {
                "event": "user_joined",
                "user_id": "user-2",
                "active_users": ["user-1", "user-2"],
                "seq": 7
            }
        });
        let message: ReceivedMessage = serde_json::from_value(raw).unwrap();
        match message {
            ReceivedMessage::Presence(msg) => {
                assert_eq!(msg.event, PresenceEvent::UserJoined);
                assert_eq!(msg.user_id.as_deref(), Some("user-2"));
                assert_eq!(msg.active_users.as_deref(), Some(&["user-1".to_string(), "user-2".to_string()][..]));
                assert_eq!(msg.seq, Some(7));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn parses_document_update_without_document_id() {
        let raw = json!({ "type": "document_update", "payload": {} });
        let message: ReceivedMessage = serde_json::from_value(raw).unwrap();
        match message {
            ReceivedMessage::DocumentUpdate(msg) => assert!(msg.document_id.is_none()),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn unknown_type_does_not_parse() {
        let raw = json!({ "type": "telemetry", "payload": { "cpu": 99 } });
        assert!(serde_json::from_value::<ReceivedMessage>(raw).is_err());
    }

    #[test]
    fn activity_payload_stays_opaque() {
        let raw = json!({
            "type": "activity",
            "payload": { "verb": "uploaded", "actor": "user-3", "target": "dataset-9" }
        });
        let message: ReceivedMessage = serde_json::from_value(raw).unwrap();
        match message {
            ReceivedMessage::Activity(payload) => assert_eq!(payload["verb"], "uploaded"),
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
