use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ChatMessage;

/// Max messages returned by one `chat:history` request.
pub const HISTORY_LIMIT_MAX: u32 = 100;
pub const HISTORY_LIMIT_DEFAULT: u32 = 50;

/// Max length of a chat message after trimming, in characters.
pub const CHAT_CONTENT_MAX: usize = 2000;

/// Presence snapshot of a connected user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineUser {
    pub user_id: Uuid,
    pub name: String,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Full list of users currently connected
    #[serde(rename = "presence:online")]
    PresenceOnline { users: Vec<OnlineUser> },

    /// Conversation with one peer, oldest first
    #[serde(rename = "chat:history")]
    ChatHistory {
        peer_id: Uuid,
        messages: Vec<ChatMessage>,
    },

    /// A message was sent by or to this user
    #[serde(rename = "chat:message")]
    ChatMessage(ChatMessage),

    #[serde(rename = "chat:error")]
    ChatError { message: String },
}

impl GatewayEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::ChatError { message: message.into() }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Re-send the online list to this connection only
    #[serde(rename = "presence:sync")]
    PresenceSync,

    #[serde(rename = "chat:history")]
    History {
        peer_id: Uuid,
        #[serde(default)]
        limit: Option<u32>,
    },

    #[serde(rename = "chat:send")]
    Send { to: Uuid, content: String },
}
