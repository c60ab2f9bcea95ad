use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{ChannelId, ChannelKind, MessageId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub channel_id: ChannelId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: ChannelKind,
    /// Participants; only populated for private message channels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePayload {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub sender: UserSummary,
    pub content: String,
    #[serde(default)]
    pub is_action: bool,
    pub sent_at: DateTime<Utc>,
    /// Echo id supplied by the sending client, returned verbatim by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub message: String,
    pub is_action: bool,
    pub uuid: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePrivateChannelRequest {
    pub target_id: UserId,
    #[serde(flatten)]
    pub message: OutgoingMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePrivateChannelResponse {
    pub channel: ChannelSummary,
    pub message: MessagePayload,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatesPayload {
    /// Channels the server has placed the user in since the last poll.
    #[serde(default)]
    pub channels: Vec<ChannelSummary>,
    #[serde(default)]
    pub messages: Vec<MessagePayload>,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
