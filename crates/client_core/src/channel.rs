//! Channel identity, metadata and per-channel message history.

use std::fmt;

use chrono::{DateTime, Utc};
use shared::{
    domain::{ChannelId, ChannelKind, MessageId, UserId},
    protocol::{ChannelSummary, MessagePayload, UserSummary},
};
use uuid::Uuid;

/// Local identity of a channel.
///
/// Private message channels are identified by the other participant so that a
/// channel opened locally (before the server assigned it an id) and the same
/// channel announced later by the server collapse into one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    Server(ChannelId),
    Private(UserId),
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKey::Server(id) => write!(f, "channel:{id}"),
            ChannelKey::Private(user_id) => write!(f, "pm:{user_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    key: ChannelKey,
    id: Option<ChannelId>,
    name: String,
    topic: String,
    kind: ChannelKind,
    users: Vec<UserSummary>,
}

impl ChannelInfo {
    pub fn new(
        id: ChannelId,
        name: impl Into<String>,
        topic: impl Into<String>,
        kind: ChannelKind,
    ) -> Self {
        Self {
            key: ChannelKey::Server(id),
            id: Some(id),
            name: name.into(),
            topic: topic.into(),
            kind,
            users: Vec::new(),
        }
    }

    /// A private channel with `user` that does not exist on the server yet.
    pub fn private(user: UserSummary) -> Self {
        Self {
            key: ChannelKey::Private(user.user_id),
            id: None,
            name: user.username.clone(),
            topic: String::new(),
            kind: ChannelKind::Pm,
            users: vec![user],
        }
    }

    /// Builds channel info from a server summary, dropping the local user
    /// from the participant list.
    pub fn from_summary(summary: ChannelSummary, local_user: UserId) -> Self {
        let users: Vec<UserSummary> = summary
            .users
            .into_iter()
            .filter(|user| user.user_id != local_user)
            .collect();
        let key = match (summary.kind, users.as_slice()) {
            (ChannelKind::Pm, [other]) => ChannelKey::Private(other.user_id),
            _ => ChannelKey::Server(summary.channel_id),
        };
        Self {
            key,
            id: Some(summary.channel_id),
            name: summary.name,
            topic: summary.description,
            kind: summary.kind,
            users,
        }
    }

    pub fn key(&self) -> ChannelKey {
        self.key
    }

    pub fn id(&self) -> Option<ChannelId> {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn users(&self) -> &[UserSummary] {
        &self.users
    }

    /// The other participant of a one-to-one private channel.
    pub fn private_target(&self) -> Option<&UserSummary> {
        match (self.kind, self.users.as_slice()) {
            (ChannelKind::Pm, [other]) => Some(other),
            _ => None,
        }
    }

    pub fn matches_search(&self, term: &str) -> bool {
        if term.is_empty() {
            return true;
        }
        let term = term.to_lowercase();
        self.name.to_lowercase().contains(&term) || self.topic.to_lowercase().contains(&term)
    }

    /// Takes server-side metadata while keeping the local key.
    pub(crate) fn absorb(&mut self, other: ChannelInfo) {
        self.id = other.id.or(self.id);
        self.name = other.name;
        self.topic = other.topic;
        self.kind = other.kind;
        if !other.users.is_empty() {
            self.users = other.users;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Chat,
    LocalEcho { echo_id: Uuid, failed: bool },
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Option<MessageId>,
    pub channel_id: Option<ChannelId>,
    pub sender: Option<UserSummary>,
    pub content: String,
    pub is_action: bool,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    /// Echo id the sending client attached, as returned by the server.
    pub uuid: Option<Uuid>,
}

impl Message {
    pub fn local_echo(
        channel_id: Option<ChannelId>,
        sender: UserSummary,
        content: impl Into<String>,
        is_action: bool,
        echo_id: Uuid,
    ) -> Self {
        Self {
            id: None,
            channel_id,
            sender: Some(sender),
            content: content.into(),
            is_action,
            timestamp: Utc::now(),
            kind: MessageKind::LocalEcho {
                echo_id,
                failed: false,
            },
            uuid: Some(echo_id),
        }
    }

    pub fn error(channel_id: Option<ChannelId>, description: impl Into<String>) -> Self {
        Self::local_notice(channel_id, description, MessageKind::Error)
    }

    pub fn info(channel_id: Option<ChannelId>, text: impl Into<String>) -> Self {
        Self::local_notice(channel_id, text, MessageKind::Info)
    }

    fn local_notice(
        channel_id: Option<ChannelId>,
        content: impl Into<String>,
        kind: MessageKind,
    ) -> Self {
        Self {
            id: None,
            channel_id,
            sender: None,
            content: content.into(),
            is_action: false,
            timestamp: Utc::now(),
            kind,
            uuid: None,
        }
    }

    pub fn echo_id(&self) -> Option<Uuid> {
        match self.kind {
            MessageKind::LocalEcho { echo_id, .. } => Some(echo_id),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }

    pub fn is_failed_echo(&self) -> bool {
        matches!(self.kind, MessageKind::LocalEcho { failed: true, .. })
    }

    fn failed(mut self) -> Self {
        if let MessageKind::LocalEcho { echo_id, .. } = self.kind {
            self.kind = MessageKind::LocalEcho {
                echo_id,
                failed: true,
            };
        }
        self
    }
}

impl From<MessagePayload> for Message {
    fn from(payload: MessagePayload) -> Self {
        Self {
            id: Some(payload.message_id),
            channel_id: Some(payload.channel_id),
            sender: Some(payload.sender),
            content: payload.content,
            is_action: payload.is_action,
            timestamp: payload.sent_at,
            kind: MessageKind::Chat,
            uuid: payload.uuid,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinState {
    /// Tracked locally only; the server has no channel to join yet.
    Local,
    Joining,
    Joined,
    Failed,
}

/// Result of merging server messages into a channel.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct MergeOutcome {
    pub added: Vec<Message>,
    pub replaced: Vec<(Uuid, Message)>,
}

impl MergeOutcome {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.replaced.is_empty()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum EchoConfirmation {
    Replaced(Message),
    Dropped,
    Missing,
}

#[derive(Debug, Clone)]
pub struct Channel {
    info: ChannelInfo,
    messages: Vec<Message>,
    session: u64,
    join_state: JoinState,
    history_loaded: bool,
}

impl Channel {
    pub(crate) fn new(info: ChannelInfo, session: u64, join_state: JoinState) -> Self {
        Self {
            info,
            messages: Vec::new(),
            session,
            join_state,
            history_loaded: false,
        }
    }

    pub fn info(&self) -> &ChannelInfo {
        &self.info
    }

    pub fn key(&self) -> ChannelKey {
        self.info.key
    }

    pub fn id(&self) -> Option<ChannelId> {
        self.info.id
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn users(&self) -> &[UserSummary] {
        &self.info.users
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn join_state(&self) -> JoinState {
        self.join_state
    }

    pub fn history_loaded(&self) -> bool {
        self.history_loaded
    }

    pub fn last_message_id(&self) -> Option<MessageId> {
        self.messages.iter().filter_map(|message| message.id).max()
    }

    pub(crate) fn session(&self) -> u64 {
        self.session
    }

    pub(crate) fn info_mut(&mut self) -> &mut ChannelInfo {
        &mut self.info
    }

    pub(crate) fn set_join_state(&mut self, join_state: JoinState) {
        self.join_state = join_state;
    }

    pub(crate) fn mark_history_loaded(&mut self) {
        self.history_loaded = true;
    }

    fn contains_message_id(&self, id: MessageId) -> bool {
        self.messages.iter().any(|message| message.id == Some(id))
    }

    /// Whether a server-confirmed copy of the echo `echo_id` is held.
    pub(crate) fn holds_confirmed_echo(&self, echo_id: Uuid) -> bool {
        self.messages
            .iter()
            .any(|message| message.id.is_some() && message.uuid == Some(echo_id))
    }

    fn echo_position(&self, echo_id: Uuid) -> Option<usize> {
        self.messages
            .iter()
            .position(|message| message.echo_id() == Some(echo_id))
    }

    /// Appends a message that has no server id (echo, error, info).
    pub(crate) fn push_local(&mut self, message: Message, max_history: usize) {
        self.messages.push(message);
        self.trim(max_history);
    }

    /// Merges confirmed messages in server order, skipping ids already held.
    /// A payload carrying the echo id of a pending local echo replaces it.
    pub(crate) fn merge_payloads(
        &mut self,
        mut payloads: Vec<MessagePayload>,
        max_history: usize,
    ) -> MergeOutcome {
        payloads.sort_by_key(|payload| payload.message_id);
        let mut outcome = MergeOutcome::default();

        for payload in payloads {
            if self.contains_message_id(payload.message_id) {
                continue;
            }
            if let Some(echo_id) = payload.uuid {
                if let Some(position) = self.echo_position(echo_id) {
                    let message = Message::from(payload);
                    self.messages[position] = message.clone();
                    outcome.replaced.push((echo_id, message));
                    continue;
                }
            }
            let message = Message::from(payload);
            self.insert_confirmed(message.clone());
            outcome.added.push(message);
        }

        self.trim(max_history);
        outcome
            .added
            .retain(|message| message.id.is_some_and(|id| self.contains_message_id(id)));
        outcome
            .replaced
            .retain(|(_, message)| message.id.is_some_and(|id| self.contains_message_id(id)));
        outcome
    }

    /// Swaps a pending echo for its confirmation. When the confirmed copy
    /// already arrived through an update the echo is dropped instead.
    pub(crate) fn confirm_echo(
        &mut self,
        echo_id: Uuid,
        payload: MessagePayload,
    ) -> EchoConfirmation {
        let Some(position) = self.echo_position(echo_id) else {
            return EchoConfirmation::Missing;
        };
        if self.contains_message_id(payload.message_id) {
            self.messages.remove(position);
            return EchoConfirmation::Dropped;
        }
        let message = Message::from(payload);
        self.messages[position] = message.clone();
        EchoConfirmation::Replaced(message)
    }

    pub(crate) fn fail_echo(&mut self, echo_id: Uuid) -> Option<Message> {
        let position = self.echo_position(echo_id)?;
        let failed = self.messages[position].clone().failed();
        self.messages[position] = failed.clone();
        Some(failed)
    }

    fn insert_confirmed(&mut self, message: Message) {
        let position = message.id.and_then(|id| {
            self.messages
                .iter()
                .position(|existing| existing.id.is_some_and(|existing_id| existing_id > id))
        });
        match position {
            Some(position) => self.messages.insert(position, message),
            None => self.messages.push(message),
        }
    }

    fn trim(&mut self, max_history: usize) {
        if self.messages.len() > max_history {
            let excess = self.messages.len() - max_history;
            self.messages.drain(..excess);
        }
    }
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
