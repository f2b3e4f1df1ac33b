//! Wire messages exchanged over the websocket, JSON tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::room::RoomSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMsg {
    CreateRoom { room_id: String, username: String },
    JoinRoom { room_id: String, username: String },
    RejoinRoom { room_id: String, username: String },
    /// `position` is signed so that out-of-range input reaches validation
    /// instead of failing to parse.
    MakeMove { room_id: String, position: i64, username: String },
    LeaveRoom { room_id: String, username: String },
    Ping,
}

impl ClientMsg {
    /// Username the client claims to act as, if the message carries one.
    pub fn username(&self) -> Option<&str> {
        match self {
            ClientMsg::CreateRoom { username, .. }
            | ClientMsg::JoinRoom { username, .. }
            | ClientMsg::RejoinRoom { username, .. }
            | ClientMsg::MakeMove { username, .. }
            | ClientMsg::LeaveRoom { username, .. } => Some(username),
            ClientMsg::Ping => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMsg {
    RoomCreated {
        room_id: String,
        #[serde(flatten)]
        room: RoomSnapshot,
    },
    RoomJoined { room_id: String },
    GameUpdate {
        room_id: String,
        #[serde(flatten)]
        room: RoomSnapshot,
    },
    GameError { message: String },
    Pong,
}

impl ServerMsg {
    pub fn error(err: impl std::fmt::Display) -> Self {
        ServerMsg::GameError { message: err.to_string() }
    }
}
