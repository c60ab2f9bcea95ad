use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use shared::{
    domain::{ChannelId, MessageId},
    protocol::{MessagePayload, OutgoingMessage, UserSummary},
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    backend::{BackendRequest, BackendResponse, OutboundRequest, RequestId},
    channel::{Channel, ChannelInfo, ChannelKey, EchoConfirmation, JoinState, Message},
    command::{normalize_channel_name, parse_command, ChatCommand, HELP_TEXT},
    config::ChatSettings,
    error::ChatError,
};

const EVENT_CAPACITY: usize = 1024;

pub type RequestOutcome = Result<BackendResponse, ChatError>;

#[derive(Debug, Clone)]
pub enum ChannelEvent {
    ChannelJoined(ChannelKey),
    ChannelLeft(ChannelKey),
    /// Metadata, join state or server id of a joined channel changed.
    ChannelUpdated(ChannelKey),
    CurrentChannelChanged(Option<ChannelKey>),
    AvailableChannelsUpdated,
    MessagesAdded {
        channel: ChannelKey,
        messages: Vec<Message>,
    },
    MessageReplaced {
        channel: ChannelKey,
        echo_id: Uuid,
        message: Message,
    },
    MessageRemoved {
        channel: ChannelKey,
        echo_id: Uuid,
    },
    HighlightRequested {
        channel: ChannelKey,
        message_id: Option<MessageId>,
    },
}

#[derive(Debug, Clone)]
enum PendingRequest {
    Join {
        channel: ChannelKey,
        session: u64,
    },
    Leave {
        channel: ChannelKey,
    },
    FetchMessages {
        channel: ChannelKey,
        session: u64,
    },
    LookupUser {
        username: String,
        origin: Option<(ChannelKey, u64)>,
    },
    Post {
        channel: ChannelKey,
        session: u64,
        echo_id: Uuid,
    },
    ListChannels,
    Poll,
}

/// Joined channels, selection and the channel catalogue for one chat session.
///
/// The manager performs no I/O. Operations that need the server queue an
/// [`OutboundRequest`]; whoever drives the manager executes those requests
/// and reports each outcome exactly once through [`handle_response`].
/// Every state transition is published as a [`ChannelEvent`].
///
/// [`handle_response`]: ChannelManager::handle_response
pub struct ChannelManager {
    local_user: UserSummary,
    settings: ChatSettings,
    joined: IndexMap<ChannelKey, Channel>,
    current: Option<ChannelKey>,
    available: IndexMap<ChannelId, ChannelInfo>,
    known_users: HashMap<String, UserSummary>,
    pending: HashMap<RequestId, PendingRequest>,
    inflight_lookups: HashMap<String, RequestId>,
    outbound: VecDeque<OutboundRequest>,
    list_in_flight: bool,
    poll_in_flight: bool,
    /// Channels left while the current poll was in flight.
    left_during_poll: HashSet<ChannelKey>,
    poll_cursor: Option<MessageId>,
    next_request_id: u64,
    next_session: u64,
    events: broadcast::Sender<ChannelEvent>,
}

impl ChannelManager {
    pub fn new(local_user: UserSummary, settings: ChatSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            local_user,
            settings,
            joined: IndexMap::new(),
            current: None,
            available: IndexMap::new(),
            known_users: HashMap::new(),
            pending: HashMap::new(),
            inflight_lookups: HashMap::new(),
            outbound: VecDeque::new(),
            list_in_flight: false,
            poll_in_flight: false,
            left_during_poll: HashSet::new(),
            poll_cursor: None,
            next_request_id: 1,
            next_session: 1,
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<ChannelEvent> {
        self.events.clone()
    }

    pub fn local_user(&self) -> &UserSummary {
        &self.local_user
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn current_key(&self) -> Option<ChannelKey> {
        self.current
    }

    pub fn current_channel(&self) -> Option<&Channel> {
        self.current.and_then(|key| self.joined.get(&key))
    }

    pub fn channel(&self, key: ChannelKey) -> Option<&Channel> {
        self.joined.get(&key)
    }

    pub fn is_joined(&self, key: ChannelKey) -> bool {
        self.joined.contains_key(&key)
    }

    pub fn joined_channels(&self) -> impl Iterator<Item = &Channel> {
        self.joined.values()
    }

    pub fn available_channels(&self) -> impl Iterator<Item = &ChannelInfo> {
        self.available.values()
    }

    /// Browsable catalogue entries whose name or topic contains `term`,
    /// ignoring case. Multiplayer channels are never listed.
    pub fn search_available(&self, term: &str) -> Vec<&ChannelInfo> {
        let term = term.trim();
        self.available
            .values()
            .filter(|info| info.kind().is_browsable() && info.matches_search(term))
            .collect()
    }

    pub fn poll_cursor(&self) -> Option<MessageId> {
        self.poll_cursor
    }

    pub fn pending_request_count(&self) -> usize {
        self.pending.len()
    }

    /// Drains requests queued since the last call, oldest first.
    pub fn take_outbound(&mut self) -> Vec<OutboundRequest> {
        self.outbound.drain(..).collect()
    }

    /// Joins `info` unless a channel with the same key is already joined.
    /// Joining is optimistic: the channel is tracked before the server
    /// confirms, and stays tracked if the server refuses.
    pub fn join_channel(&mut self, info: ChannelInfo) -> ChannelKey {
        let key = info.key();
        if self.joined.contains_key(&key) {
            debug!(channel = %key, "channel already joined");
            return key;
        }

        let session = self.allocate_session();
        let channel_id = info.id();
        let join_state = if channel_id.is_some() {
            JoinState::Joining
        } else {
            JoinState::Local
        };
        self.joined
            .insert(key, Channel::new(info, session, join_state));
        self.emit(ChannelEvent::ChannelJoined(key));

        if let Some(channel_id) = channel_id {
            self.enqueue(
                BackendRequest::JoinChannel { channel_id },
                PendingRequest::Join {
                    channel: key,
                    session,
                },
            );
        }
        key
    }

    /// Removes a joined channel. Returns `false` if it was not joined.
    pub fn leave_channel(&mut self, key: ChannelKey) -> bool {
        let Some(channel) = self.joined.shift_remove(&key) else {
            debug!(channel = %key, "leave ignored for channel that is not joined");
            return false;
        };

        self.emit(ChannelEvent::ChannelLeft(key));
        if self.poll_in_flight {
            self.left_during_poll.insert(key);
        }
        if self.current == Some(key) {
            self.set_current(None);
        }

        if let Some(channel_id) = channel.id() {
            self.enqueue(
                BackendRequest::LeaveChannel { channel_id },
                PendingRequest::Leave { channel: key },
            );
        }
        true
    }

    /// Selects `info`, joining it first when needed. `None` clears the
    /// selection.
    pub fn select_channel(&mut self, info: Option<ChannelInfo>) -> Option<ChannelKey> {
        let key = info.map(|info| self.join_channel(info));
        self.set_current(key);
        key
    }

    pub fn select_joined(&mut self, key: ChannelKey) -> Result<(), ChatError> {
        if !self.joined.contains_key(&key) {
            return Err(ChatError::UnknownChannel(key.to_string()));
        }
        self.set_current(Some(key));
        Ok(())
    }

    /// Brings `info` into view for `message`: joins it if needed and makes
    /// it current no matter what was selected before.
    pub fn highlight_message(&mut self, message: &Message, info: ChannelInfo) -> ChannelKey {
        let key = self.join_channel(info);
        self.set_current(Some(key));
        self.emit(ChannelEvent::HighlightRequested {
            channel: key,
            message_id: message.id,
        });
        key
    }

    /// Opens (or reuses) the private channel with `user` and selects it.
    pub fn open_private_channel(&mut self, user: UserSummary) -> ChannelKey {
        self.known_users
            .insert(user.username.to_lowercase(), user.clone());
        let key = ChannelKey::Private(user.user_id);
        let key = if self.joined.contains_key(&key) {
            key
        } else {
            self.join_channel(ChannelInfo::private(user))
        };
        self.set_current(Some(key));
        key
    }

    /// Runs one line of user input against `target`, or the current channel
    /// when `target` is `None`.
    pub fn post_command(&mut self, text: &str, target: Option<ChannelKey>) -> Result<(), ChatError> {
        let Some(command) = parse_command(text) else {
            return Ok(());
        };
        let target = target.or(self.current).ok_or(ChatError::NoActiveChannel)?;
        if !self.joined.contains_key(&target) {
            return Err(ChatError::UnknownChannel(target.to_string()));
        }

        match command {
            ChatCommand::Message(content) => self.post_message(target, content, false)?,
            ChatCommand::Action(Some(action)) => self.post_message(target, action, true)?,
            ChatCommand::Action(None) => self.push_error(target, "Usage: /me [action]"),
            ChatCommand::OpenPrivate(Some(username)) => self.open_private_by_name(target, &username),
            ChatCommand::OpenPrivate(None) => self.push_error(target, "Usage: /chat [user]"),
            ChatCommand::Join(Some(name)) => self.join_by_name(target, &name),
            ChatCommand::Join(None) => self.push_error(target, "Usage: /join [channel]"),
            ChatCommand::Part(name) => self.part(target, name.as_deref()),
            ChatCommand::Help => self.push_notice(target, Message::info(None, HELP_TEXT)),
            ChatCommand::Unknown(word) => self.push_error(
                target,
                &format!("\"/{word}\" is not supported! For a list of supported commands see /help"),
            ),
        }
        Ok(())
    }

    /// Asks for the channel catalogue unless a listing is already in flight.
    pub fn refresh_channel_list(&mut self) -> bool {
        if self.list_in_flight {
            return false;
        }
        self.list_in_flight = true;
        self.enqueue(BackendRequest::ListChannels, PendingRequest::ListChannels);
        true
    }

    /// Queues one update poll; at most one is in flight at a time.
    pub fn poll_updates(&mut self) -> bool {
        if self.poll_in_flight {
            return false;
        }
        self.poll_in_flight = true;
        self.left_during_poll.clear();
        self.enqueue(
            BackendRequest::PollUpdates {
                since: self.poll_cursor,
            },
            PendingRequest::Poll,
        );
        true
    }

    /// Routes pushed messages to their joined channels. Messages for
    /// channels that are not joined are dropped.
    pub fn receive_messages(&mut self, payloads: Vec<MessagePayload>) {
        if let Some(highest) = payloads.iter().map(|payload| payload.message_id).max() {
            self.poll_cursor = self.poll_cursor.max(Some(highest));
        }

        let mut by_channel: IndexMap<ChannelId, Vec<MessagePayload>> = IndexMap::new();
        for payload in payloads {
            by_channel.entry(payload.channel_id).or_default().push(payload);
        }

        for (channel_id, payloads) in by_channel {
            match self.key_for_channel_id(channel_id) {
                Some(key) => self.merge_into(key, payloads),
                None => debug!(
                    channel_id = channel_id.0,
                    dropped = payloads.len(),
                    "dropping messages for channel that is not joined"
                ),
            }
        }
    }

    /// Resolves a request queued earlier. Each id resolves once; repeated or
    /// unknown ids are ignored.
    pub fn handle_response(&mut self, id: RequestId, outcome: RequestOutcome) {
        let Some(pending) = self.pending.remove(&id) else {
            warn!(request_id = id.0, "ignoring response for unknown request");
            return;
        };

        match pending {
            PendingRequest::Join { channel, session } => self.on_join(channel, session, outcome),
            PendingRequest::Leave { channel } => self.on_leave(channel, outcome),
            PendingRequest::FetchMessages { channel, session } => {
                self.on_fetch_messages(channel, session, outcome)
            }
            PendingRequest::LookupUser { username, origin } => {
                self.on_lookup_user(username, origin, outcome)
            }
            PendingRequest::Post {
                channel,
                session,
                echo_id,
            } => self.on_post(channel, session, echo_id, outcome),
            PendingRequest::ListChannels => self.on_list_channels(outcome),
            PendingRequest::Poll => self.on_poll(outcome),
        }
    }

    fn on_join(&mut self, key: ChannelKey, session: u64, outcome: RequestOutcome) {
        let result = match outcome {
            Ok(BackendResponse::Joined(summary)) => Ok(summary),
            Ok(other) => Err(unexpected("joined", &other)),
            Err(err) => Err(err),
        };
        let local_user_id = self.local_user.user_id;
        let max_history = self.settings.max_history;

        let Some(channel) = live_channel(&mut self.joined, key, session) else {
            debug!(channel = %key, "discarding join response for channel no longer joined");
            return;
        };

        match result {
            Ok(summary) => {
                channel
                    .info_mut()
                    .absorb(ChannelInfo::from_summary(summary, local_user_id));
                channel.set_join_state(JoinState::Joined);
                let channel_id = channel.id();
                info!(channel = %key, "joined channel");
                self.emit(ChannelEvent::ChannelUpdated(key));

                if self.settings.fetch_history_on_join {
                    if let Some(channel_id) = channel_id {
                        self.enqueue(
                            BackendRequest::FetchMessages { channel_id },
                            PendingRequest::FetchMessages {
                                channel: key,
                                session,
                            },
                        );
                    }
                }
            }
            Err(err) => {
                warn!(channel = %key, "join failed; keeping channel joined locally: {err}");
                channel.set_join_state(JoinState::Failed);
                let notice = Message::error(channel.id(), format!("Failed to join channel: {err}"));
                channel.push_local(notice.clone(), max_history);
                self.emit(ChannelEvent::ChannelUpdated(key));
                self.emit(ChannelEvent::MessagesAdded {
                    channel: key,
                    messages: vec![notice],
                });
            }
        }
    }

    fn on_leave(&mut self, key: ChannelKey, outcome: RequestOutcome) {
        match outcome {
            Ok(BackendResponse::Left) => debug!(channel = %key, "leave confirmed"),
            Ok(other) => {
                let err = unexpected("left", &other);
                warn!(channel = %key, "leave failed: {err}");
            }
            Err(err) => warn!(channel = %key, "leave failed: {err}"),
        }
    }

    fn on_fetch_messages(&mut self, key: ChannelKey, session: u64, outcome: RequestOutcome) {
        let result = match outcome {
            Ok(BackendResponse::Messages(messages)) => Ok(messages),
            Ok(other) => Err(unexpected("messages", &other)),
            Err(err) => Err(err),
        };
        let max_history = self.settings.max_history;

        let Some(channel) = live_channel(&mut self.joined, key, session) else {
            debug!(channel = %key, "discarding history for channel no longer joined");
            return;
        };

        match result {
            Ok(messages) => {
                channel.mark_history_loaded();
                self.merge_into(key, messages);
            }
            Err(err) => {
                warn!(channel = %key, "history fetch failed: {err}");
                let notice =
                    Message::error(channel.id(), format!("Failed to load messages: {err}"));
                channel.push_local(notice.clone(), max_history);
                self.emit(ChannelEvent::MessagesAdded {
                    channel: key,
                    messages: vec![notice],
                });
            }
        }
    }

    fn on_lookup_user(
        &mut self,
        username: String,
        origin: Option<(ChannelKey, u64)>,
        outcome: RequestOutcome,
    ) {
        self.inflight_lookups.remove(&username);
        let result = match outcome {
            Ok(BackendResponse::User(user)) => Ok(user),
            Ok(other) => Err(unexpected("user", &other)),
            Err(err) => Err(err),
        };

        match result {
            Ok(user) => {
                self.open_private_channel(user);
            }
            Err(err) => {
                warn!(username = %username, "user lookup failed: {err}");
                let live_origin = origin.filter(|(key, session)| {
                    self.joined
                        .get(key)
                        .is_some_and(|channel| channel.session() == *session)
                });
                match live_origin {
                    Some((key, _)) => self.push_error(key, "User not found."),
                    None => debug!(username = %username, "origin channel gone; lookup error discarded"),
                }
            }
        }
    }

    fn on_post(&mut self, key: ChannelKey, session: u64, echo_id: Uuid, outcome: RequestOutcome) {
        let local_user_id = self.local_user.user_id;
        let max_history = self.settings.max_history;

        let Some(channel) = live_channel(&mut self.joined, key, session) else {
            debug!(channel = %key, "discarding post response for channel no longer joined");
            return;
        };

        let confirmed = match outcome {
            Ok(BackendResponse::MessagePosted(payload)) => Ok(payload),
            Ok(BackendResponse::PrivateChannelCreated(created)) => {
                channel
                    .info_mut()
                    .absorb(ChannelInfo::from_summary(created.channel, local_user_id));
                channel.set_join_state(JoinState::Joined);
                self.emit(ChannelEvent::ChannelUpdated(key));
                Ok(created.message)
            }
            Ok(other) => Err(unexpected("message_posted", &other)),
            Err(err) => Err(err),
        };

        let Some(channel) = self.joined.get_mut(&key) else {
            return;
        };
        match confirmed {
            Ok(payload) => match channel.confirm_echo(echo_id, payload.clone()) {
                EchoConfirmation::Replaced(message) => self.emit(ChannelEvent::MessageReplaced {
                    channel: key,
                    echo_id,
                    message,
                }),
                EchoConfirmation::Dropped => self.emit(ChannelEvent::MessageRemoved {
                    channel: key,
                    echo_id,
                }),
                EchoConfirmation::Missing => self.merge_into(key, vec![payload]),
            },
            Err(err) => {
                let failed = channel.fail_echo(echo_id);
                if failed.is_none() && channel.holds_confirmed_echo(echo_id) {
                    debug!(channel = %key, "post errored after its message was delivered: {err}");
                    return;
                }
                warn!(channel = %key, "message post failed: {err}");
                let notice =
                    Message::error(channel.id(), format!("Message could not be sent: {err}"));
                channel.push_local(notice.clone(), max_history);
                if let Some(message) = failed {
                    self.emit(ChannelEvent::MessageReplaced {
                        channel: key,
                        echo_id,
                        message,
                    });
                }
                self.emit(ChannelEvent::MessagesAdded {
                    channel: key,
                    messages: vec![notice],
                });
            }
        }
    }

    fn on_list_channels(&mut self, outcome: RequestOutcome) {
        self.list_in_flight = false;
        match outcome {
            Ok(BackendResponse::Channels(channels)) => {
                let local_user_id = self.local_user.user_id;
                self.available = channels
                    .into_iter()
                    .map(|summary| {
                        (
                            summary.channel_id,
                            ChannelInfo::from_summary(summary, local_user_id),
                        )
                    })
                    .collect();
                info!(count = self.available.len(), "channel list refreshed");
                self.emit(ChannelEvent::AvailableChannelsUpdated);
            }
            Ok(other) => {
                let err = unexpected("channels", &other);
                warn!("channel list refresh failed: {err}");
            }
            Err(err) => warn!("channel list refresh failed: {err}"),
        }
    }

    fn on_poll(&mut self, outcome: RequestOutcome) {
        self.poll_in_flight = false;
        let left = std::mem::take(&mut self.left_during_poll);
        match outcome {
            Ok(BackendResponse::Updates(updates)) => {
                let local_user_id = self.local_user.user_id;
                for summary in updates.channels {
                    let info = ChannelInfo::from_summary(summary, local_user_id);
                    if left.contains(&info.key()) {
                        debug!(channel = %info.key(), "poll predates leave; not adopting channel");
                        continue;
                    }
                    self.adopt_channel(info);
                }
                self.receive_messages(updates.messages);
            }
            Ok(other) => {
                let err = unexpected("updates", &other);
                debug!("update poll failed: {err}");
            }
            Err(err) => debug!("update poll failed: {err}"),
        }
    }

    /// Tracks a channel the server already has the user in. No join request
    /// is issued.
    fn adopt_channel(&mut self, info: ChannelInfo) {
        let key = info.key();
        if let Some(channel) = self.joined.get_mut(&key) {
            channel.info_mut().absorb(info);
            if matches!(channel.join_state(), JoinState::Local | JoinState::Failed) {
                channel.set_join_state(JoinState::Joined);
            }
            self.emit(ChannelEvent::ChannelUpdated(key));
            return;
        }

        let session = self.allocate_session();
        self.joined
            .insert(key, Channel::new(info, session, JoinState::Joined));
        info!(channel = %key, "server placed user in channel");
        self.emit(ChannelEvent::ChannelJoined(key));
    }

    fn post_message(
        &mut self,
        key: ChannelKey,
        content: String,
        is_action: bool,
    ) -> Result<(), ChatError> {
        let local_user = self.local_user.clone();
        let max_history = self.settings.max_history;
        let Some(channel) = self.joined.get_mut(&key) else {
            return Err(ChatError::UnknownChannel(key.to_string()));
        };

        let echo_id = Uuid::new_v4();
        let message = OutgoingMessage {
            message: content.clone(),
            is_action,
            uuid: echo_id,
        };
        let request = match (channel.id(), channel.info().private_target()) {
            (Some(channel_id), _) => BackendRequest::PostMessage {
                channel_id,
                message,
            },
            (None, Some(target)) => BackendRequest::CreatePrivateChannel {
                target: target.user_id,
                message,
            },
            (None, None) => return Err(ChatError::UnknownChannel(key.to_string())),
        };

        let session = channel.session();
        let echo = Message::local_echo(channel.id(), local_user, content, is_action, echo_id);
        channel.push_local(echo.clone(), max_history);
        self.emit(ChannelEvent::MessagesAdded {
            channel: key,
            messages: vec![echo],
        });
        self.enqueue(
            request,
            PendingRequest::Post {
                channel: key,
                session,
                echo_id,
            },
        );
        Ok(())
    }

    fn open_private_by_name(&mut self, origin: ChannelKey, username: &str) {
        let lookup_key = username.to_lowercase();

        let existing = self
            .joined
            .values()
            .find(|channel| {
                channel
                    .info()
                    .private_target()
                    .is_some_and(|user| user.username.to_lowercase() == lookup_key)
            })
            .map(Channel::key);
        if let Some(key) = existing {
            debug!(channel = %key, "private channel already open");
            self.set_current(Some(key));
            return;
        }

        if let Some(user) = self.known_users.get(&lookup_key).cloned() {
            self.open_private_channel(user);
            return;
        }

        if self.inflight_lookups.contains_key(&lookup_key) {
            debug!(username = %username, "user lookup already in flight");
            return;
        }

        let origin = self
            .joined
            .get(&origin)
            .map(|channel| (origin, channel.session()));
        let id = self.enqueue(
            BackendRequest::LookupUser {
                query: username.to_string(),
            },
            PendingRequest::LookupUser {
                username: lookup_key.clone(),
                origin,
            },
        );
        self.inflight_lookups.insert(lookup_key, id);
    }

    fn join_by_name(&mut self, origin: ChannelKey, name: &str) {
        let wanted = normalize_channel_name(name);
        let found = self
            .available
            .values()
            .chain(self.joined.values().map(Channel::info))
            .find(|info| info.kind().is_browsable() && normalize_channel_name(info.name()) == wanted)
            .cloned();

        match found {
            Some(info) => {
                self.select_channel(Some(info));
            }
            None => self.push_error(origin, &format!("Channel '#{wanted}' could not be found.")),
        }
    }

    fn part(&mut self, target: ChannelKey, name: Option<&str>) {
        let Some(name) = name else {
            self.leave_channel(target);
            return;
        };
        let wanted = normalize_channel_name(name);
        let found = self
            .joined
            .values()
            .find(|channel| normalize_channel_name(channel.name()) == wanted)
            .map(Channel::key);
        match found {
            Some(key) => {
                self.leave_channel(key);
            }
            None => self.push_error(target, &format!("You are not in channel '#{wanted}'.")),
        }
    }

    fn merge_into(&mut self, key: ChannelKey, payloads: Vec<MessagePayload>) {
        let max_history = self.settings.max_history;
        let Some(channel) = self.joined.get_mut(&key) else {
            return;
        };
        let outcome = channel.merge_payloads(payloads, max_history);
        if outcome.is_empty() {
            return;
        }
        for (echo_id, message) in outcome.replaced {
            self.emit(ChannelEvent::MessageReplaced {
                channel: key,
                echo_id,
                message,
            });
        }
        if !outcome.added.is_empty() {
            self.emit(ChannelEvent::MessagesAdded {
                channel: key,
                messages: outcome.added,
            });
        }
    }

    fn push_error(&mut self, key: ChannelKey, description: &str) {
        let channel_id = self.joined.get(&key).and_then(Channel::id);
        self.push_notice(key, Message::error(channel_id, description));
    }

    fn push_notice(&mut self, key: ChannelKey, mut message: Message) {
        let max_history = self.settings.max_history;
        let Some(channel) = self.joined.get_mut(&key) else {
            return;
        };
        message.channel_id = channel.id();
        channel.push_local(message.clone(), max_history);
        self.emit(ChannelEvent::MessagesAdded {
            channel: key,
            messages: vec![message],
        });
    }

    fn key_for_channel_id(&self, channel_id: ChannelId) -> Option<ChannelKey> {
        if self.joined.contains_key(&ChannelKey::Server(channel_id)) {
            return Some(ChannelKey::Server(channel_id));
        }
        self.joined
            .values()
            .find(|channel| channel.id() == Some(channel_id))
            .map(Channel::key)
    }

    fn set_current(&mut self, key: Option<ChannelKey>) {
        if self.current == key {
            return;
        }
        self.current = key;
        self.emit(ChannelEvent::CurrentChannelChanged(key));
    }

    fn allocate_session(&mut self) -> u64 {
        let session = self.next_session;
        self.next_session += 1;
        session
    }

    fn enqueue(&mut self, request: BackendRequest, pending: PendingRequest) -> RequestId {
        let id = RequestId(self.next_request_id);
        self.next_request_id += 1;
        debug!(request_id = id.0, request = request.name(), "queued backend request");
        self.pending.insert(id, pending);
        self.outbound.push_back(OutboundRequest { id, request });
        id
    }

    fn emit(&self, event: ChannelEvent) {
        let _ = self.events.send(event);
    }
}

/// The joined channel for `key`, provided it still belongs to `session`.
fn live_channel(
    joined: &mut IndexMap<ChannelKey, Channel>,
    key: ChannelKey,
    session: u64,
) -> Option<&mut Channel> {
    joined
        .get_mut(&key)
        .filter(|channel| channel.session() == session)
}

fn unexpected(expected: &'static str, actual: &BackendResponse) -> ChatError {
    warn!(expected, actual = actual.name(), "unhandled response shape");
    ChatError::UnexpectedResponse {
        expected,
        actual: actual.name(),
    }
}

#[cfg(test)]
#[path = "tests/channel_manager_tests.rs"]
mod tests;
