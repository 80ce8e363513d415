use serde::{Deserialize, Serialize};

use super::msg::MessageKind;

/// Connection-scoped authorization state, fixed at join time and passed
/// explicitly to every handler for the connection.
#[derive(Debug, Clone)]
pub struct RoomSession {
    pub room_id: String,
    pub user_id: String,
    pub elevated: bool,
}

/// Outcome of gating a moderation command against the connection's session.
#[derive(Debug)]
pub enum Gate<'a> {
    Authorized(&'a RoomSession),
    Denied,
}

pub fn moderation_gate(session: Option<&RoomSession>) -> Gate<'_> {
    match session {
        Some(session) if session.elevated => Gate::Authorized(session),
        _ => Gate::Denied,
    }
}

/// Client frames: JSON envelopes `{"event": ..., "data": ...}`.
///
/// Join and message fields are optional so incomplete frames surface as
/// descriptive error events instead of being dropped at the parser.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        mission_id: Option<String>,
        user_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        sender_id: Option<String>,
        content: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    BlockUser {
        room_id: String,
        target_user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    UnblockUser {
        room_id: String,
        target_user_id: String,
    },
    LockRoom(String),
    UnlockRoom(String),
    #[serde(rename_all = "camelCase")]
    PinMessage { room_id: String, content: String },
    #[serde(rename_all = "camelCase")]
    ClearPin { room_id: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SenderInfo {
    pub id: String,
    pub username: String,
}

/// Server frames, mirrored to the client as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    JoinedRoom {
        room_id: String,
        title: String,
        pinned_message: String,
        locked: bool,
    },
    JoinError {
        message: String,
    },
    Blocked {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    NewMessage {
        sender: SenderInfo,
        content: String,
        #[serde(rename = "type")]
        kind: MessageKind,
        time: String,
        created_at: i64,
    },
    MessageError {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    UserBlocked {
        target_user_id: String,
    },
    #[serde(rename_all = "camelCase")]
    UserUnblocked {
        target_user_id: String,
    },
    ChatLocked {
        message: String,
    },
    ChatUnlocked {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    MessagePinned {
        content: String,
        pinned_by: String,
    },
    #[serde(rename_all = "camelCase")]
    PinCleared {
        cleared_by: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames_parse() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"event":"joinRoom","data":{"missionId":"general","userId":"u1"}}"#,
        )
        .expect("parse joinRoom");
        match event {
            ClientEvent::JoinRoom { mission_id, user_id } => {
                assert_eq!(mission_id.as_deref(), Some("general"));
                assert_eq!(user_id.as_deref(), Some("u1"));
            }
            other => panic!("expected JoinRoom, got {other:?}"),
        }

        // Incomplete join data still parses; the gateway answers with joinError.
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"joinRoom","data":{}}"#).expect("parse empty join");
        assert!(matches!(
            event,
            ClientEvent::JoinRoom {
                mission_id: None,
                user_id: None
            }
        ));

        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"lockRoom","data":"room-1"}"#).expect("parse lock");
        match event {
            ClientEvent::LockRoom(room_id) => assert_eq!(room_id, "room-1"),
            other => panic!("expected LockRoom, got {other:?}"),
        }
    }

    #[test]
    fn server_frames_use_the_wire_names() {
        let frame = serde_json::to_value(ServerEvent::NewMessage {
            sender: SenderInfo {
                id: "u1".to_owned(),
                username: "ana".to_owned(),
            },
            content: "hola".to_owned(),
            kind: MessageKind::Text,
            time: "12:30:05".to_owned(),
            created_at: 1_700_000_000_000,
        })
        .expect("serialize");

        assert_eq!(frame["event"], "newMessage");
        assert_eq!(frame["data"]["sender"]["username"], "ana");
        assert_eq!(frame["data"]["type"], "text");
        assert_eq!(frame["data"]["createdAt"], 1_700_000_000_000_i64);

        let frame = serde_json::to_value(ServerEvent::UserBlocked {
            target_user_id: "u2".to_owned(),
        })
        .expect("serialize");
        assert_eq!(frame["event"], "userBlocked");
        assert_eq!(frame["data"]["targetUserId"], "u2");
    }

    #[test]
    fn gate_requires_an_elevated_session() {
        let plain = RoomSession {
            room_id: "r1".to_owned(),
            user_id: "u1".to_owned(),
            elevated: false,
        };
        assert!(matches!(moderation_gate(Some(&plain)), Gate::Denied));
        assert!(matches!(moderation_gate(None), Gate::Denied));

        let elevated = RoomSession {
            elevated: true,
            ..plain
        };
        assert!(matches!(
            moderation_gate(Some(&elevated)),
            Gate::Authorized(_)
        ));
    }
}
