//! Request/response seam between the channel manager and a chat server.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{ChannelId, MessageId, UserId},
    protocol::{
        ChannelSummary, CreatePrivateChannelResponse, MessagePayload, OutgoingMessage,
        UpdatesPayload, UserSummary,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendRequest {
    JoinChannel {
        channel_id: ChannelId,
    },
    LeaveChannel {
        channel_id: ChannelId,
    },
    FetchMessages {
        channel_id: ChannelId,
    },
    LookupUser {
        query: String,
    },
    PostMessage {
        channel_id: ChannelId,
        message: OutgoingMessage,
    },
    CreatePrivateChannel {
        target: UserId,
        message: OutgoingMessage,
    },
    ListChannels,
    PollUpdates {
        since: Option<MessageId>,
    },
}

impl BackendRequest {
    pub fn name(&self) -> &'static str {
        match self {
            BackendRequest::JoinChannel { .. } => "join_channel",
            BackendRequest::LeaveChannel { .. } => "leave_channel",
            BackendRequest::FetchMessages { .. } => "fetch_messages",
            BackendRequest::LookupUser { .. } => "lookup_user",
            BackendRequest::PostMessage { .. } => "post_message",
            BackendRequest::CreatePrivateChannel { .. } => "create_private_channel",
            BackendRequest::ListChannels => "list_channels",
            BackendRequest::PollUpdates { .. } => "poll_updates",
        }
    }
}

#[derive(Debug, Clone)]
pub enum BackendResponse {
    Joined(ChannelSummary),
    Left,
    Messages(Vec<MessagePayload>),
    User(UserSummary),
    MessagePosted(MessagePayload),
    PrivateChannelCreated(CreatePrivateChannelResponse),
    Channels(Vec<ChannelSummary>),
    Updates(UpdatesPayload),
}

impl BackendResponse {
    pub fn name(&self) -> &'static str {
        match self {
            BackendResponse::Joined(_) => "joined",
            BackendResponse::Left => "left",
            BackendResponse::Messages(_) => "messages",
            BackendResponse::User(_) => "user",
            BackendResponse::MessagePosted(_) => "message_posted",
            BackendResponse::PrivateChannelCreated(_) => "private_channel_created",
            BackendResponse::Channels(_) => "channels",
            BackendResponse::Updates(_) => "updates",
        }
    }
}

/// A request queued by the manager, waiting for the driver to execute it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub id: RequestId,
    pub request: BackendRequest,
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn join_channel(&self, channel_id: ChannelId) -> Result<ChannelSummary>;
    async fn leave_channel(&self, channel_id: ChannelId) -> Result<()>;
    async fn fetch_messages(&self, channel_id: ChannelId) -> Result<Vec<MessagePayload>>;
    async fn lookup_user(&self, query: &str) -> Result<UserSummary>;
    async fn post_message(
        &self,
        channel_id: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessagePayload>;
    async fn create_private_channel(
        &self,
        target: UserId,
        message: &OutgoingMessage,
    ) -> Result<CreatePrivateChannelResponse>;
    async fn list_channels(&self) -> Result<Vec<ChannelSummary>>;
    async fn poll_updates(&self, since: Option<MessageId>) -> Result<UpdatesPayload>;
}

pub async fn execute(backend: &dyn ChatBackend, request: &BackendRequest) -> Result<BackendResponse> {
    let response = match request {
        BackendRequest::JoinChannel { channel_id } => {
            BackendResponse::Joined(backend.join_channel(*channel_id).await?)
        }
        BackendRequest::LeaveChannel { channel_id } => {
            backend.leave_channel(*channel_id).await?;
            BackendResponse::Left
        }
        BackendRequest::FetchMessages { channel_id } => {
            BackendResponse::Messages(backend.fetch_messages(*channel_id).await?)
        }
        BackendRequest::LookupUser { query } => {
            BackendResponse::User(backend.lookup_user(query).await?)
        }
        BackendRequest::PostMessage {
            channel_id,
            message,
        } => BackendResponse::MessagePosted(backend.post_message(*channel_id, message).await?),
        BackendRequest::CreatePrivateChannel { target, message } => {
            BackendResponse::PrivateChannelCreated(
                backend.create_private_channel(*target, message).await?,
            )
        }
        BackendRequest::ListChannels => BackendResponse::Channels(backend.list_channels().await?),
        BackendRequest::PollUpdates { since } => {
            BackendResponse::Updates(backend.poll_updates(*since).await?)
        }
    };
    Ok(response)
}

pub struct MissingChatBackend;

#[async_trait]
impl ChatBackend for MissingChatBackend {
    async fn join_channel(&self, channel_id: ChannelId) -> Result<ChannelSummary> {
        Err(anyhow!("chat backend unavailable for channel {}", channel_id.0))
    }

    async fn leave_channel(&self, channel_id: ChannelId) -> Result<()> {
        Err(anyhow!("chat backend unavailable for channel {}", channel_id.0))
    }

    async fn fetch_messages(&self, channel_id: ChannelId) -> Result<Vec<MessagePayload>> {
        Err(anyhow!("chat backend unavailable for channel {}", channel_id.0))
    }

    async fn lookup_user(&self, _query: &str) -> Result<UserSummary> {
        Err(anyhow!("chat backend is unavailable"))
    }

    async fn post_message(
        &self,
        channel_id: ChannelId,
        _message: &OutgoingMessage,
    ) -> Result<MessagePayload> {
        Err(anyhow!("chat backend unavailable for channel {}", channel_id.0))
    }

    async fn create_private_channel(
        &self,
        target: UserId,
        _message: &OutgoingMessage,
    ) -> Result<CreatePrivateChannelResponse> {
        Err(anyhow!("chat backend unavailable for user {}", target.0))
    }

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>> {
        Err(anyhow!("chat backend is unavailable"))
    }

    async fn poll_updates(&self, _since: Option<MessageId>) -> Result<UpdatesPayload> {
        Err(anyhow!("chat backend is unavailable"))
    }
}
