use super::*;

use chrono::Utc;
use shared::{
    domain::{ChannelKind, UserId},
    protocol::{ChannelSummary, CreatePrivateChannelResponse, UpdatesPayload},
};

use crate::channel::MessageKind;

fn user(id: i64, name: &str) -> UserSummary {
    UserSummary {
        user_id: UserId(id),
        username: name.to_string(),
    }
}

fn me() -> UserSummary {
    user(1, "me")
}

fn peppy() -> UserSummary {
    user(2, "peppy")
}

fn manager() -> ChannelManager {
    ChannelManager::new(me(), ChatSettings::default())
}

fn summary(id: i64, name: &str, kind: ChannelKind) -> ChannelSummary {
    ChannelSummary {
        channel_id: ChannelId(id),
        name: name.to_string(),
        description: format!("{name} topic"),
        kind,
        users: Vec::new(),
    }
}

fn lobby() -> ChannelInfo {
    ChannelInfo::new(ChannelId(5), "#lobby", "casual talk", ChannelKind::Public)
}

fn osu() -> ChannelInfo {
    ChannelInfo::new(ChannelId(6), "#osu", "general", ChannelKind::Public)
}

fn payload(id: i64, channel_id: i64, content: &str) -> MessagePayload {
    MessagePayload {
        message_id: MessageId(id),
        channel_id: ChannelId(channel_id),
        sender: peppy(),
        content: content.to_string(),
        is_action: false,
        sent_at: Utc::now(),
        uuid: None,
    }
}

fn failure(reason: &str) -> RequestOutcome {
    Err(ChatError::Request(reason.to_string()))
}

fn single(manager: &mut ChannelManager) -> OutboundRequest {
    let mut outbound = manager.take_outbound();
    assert_eq!(outbound.len(), 1, "expected one request, got {outbound:?}");
    outbound.remove(0)
}

/// Joins `info` and confirms the join, leaving the history fetch unresolved.
fn join_confirmed(manager: &mut ChannelManager, info: ChannelInfo) -> (ChannelKey, OutboundRequest) {
    let key = manager.join_channel(info.clone());
    let join = single(manager);
    let channel_id = info.id().expect("server channel");
    let joined = summary(channel_id.0, info.name(), info.kind());
    manager.handle_response(join.id, Ok(BackendResponse::Joined(joined)));
    let fetch = single(manager);
    assert_eq!(fetch.request, BackendRequest::FetchMessages { channel_id });
    (key, fetch)
}

fn errors(manager: &ChannelManager, key: ChannelKey) -> Vec<String> {
    manager
        .channel(key)
        .expect("joined")
        .messages()
        .iter()
        .filter(|message| message.is_error())
        .map(|message| message.content.clone())
        .collect()
}

fn echo_uuid(request: &OutboundRequest) -> Uuid {
    match &request.request {
        BackendRequest::PostMessage { message, .. }
        | BackendRequest::CreatePrivateChannel { message, .. } => message.uuid,
        other => panic!("expected a post, got {other:?}"),
    }
}

#[test]
fn joining_twice_issues_one_request() {
    let mut manager = manager();
    let key = manager.join_channel(lobby());
    let first = single(&mut manager);
    assert_eq!(
        first.request,
        BackendRequest::JoinChannel {
            channel_id: ChannelId(5)
        }
    );
    assert_eq!(manager.channel(key).map(Channel::join_state), Some(JoinState::Joining));

    assert_eq!(manager.join_channel(lobby()), key);
    assert!(manager.take_outbound().is_empty());
    assert_eq!(manager.joined_channels().count(), 1);
}

#[test]
fn confirmed_join_loads_history() {
    let mut manager = manager();
    let (key, fetch) = join_confirmed(&mut manager, lobby());

    manager.handle_response(
        fetch.id,
        Ok(BackendResponse::Messages(vec![
            payload(11, 5, "second"),
            payload(10, 5, "first"),
        ])),
    );

    let channel = manager.channel(key).expect("joined");
    assert_eq!(channel.join_state(), JoinState::Joined);
    assert!(channel.history_loaded());
    let contents: Vec<_> = channel.messages().iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second"]);
    assert_eq!(manager.pending_request_count(), 0);
}

#[test]
fn history_fetch_can_be_disabled() {
    let settings = ChatSettings {
        fetch_history_on_join: false,
        ..ChatSettings::default()
    };
    let mut manager = ChannelManager::new(me(), settings);
    manager.join_channel(lobby());
    let join = single(&mut manager);
    manager.handle_response(
        join.id,
        Ok(BackendResponse::Joined(summary(5, "#lobby", ChannelKind::Public))),
    );
    assert!(manager.take_outbound().is_empty());
}

#[test]
fn failed_join_keeps_channel_with_error() {
    let mut manager = manager();
    let key = manager.join_channel(lobby());
    let join = single(&mut manager);

    manager.handle_response(join.id, failure("forbidden"));

    assert!(manager.is_joined(key));
    assert_eq!(manager.channel(key).map(Channel::join_state), Some(JoinState::Failed));
    let errors = errors(&manager, key);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Failed to join channel"));
    assert!(errors[0].contains("forbidden"));
}

#[test]
fn leaving_current_channel_clears_selection() {
    let mut manager = manager();
    let key = manager.select_channel(Some(lobby())).expect("selected");
    manager.take_outbound();

    assert!(manager.leave_channel(key));

    assert_eq!(manager.current_key(), None);
    assert!(manager.current_channel().is_none());
    assert!(!manager.is_joined(key));
    assert_eq!(
        single(&mut manager).request,
        BackendRequest::LeaveChannel {
            channel_id: ChannelId(5)
        }
    );
    assert!(!manager.leave_channel(key));
    assert!(manager.take_outbound().is_empty());
}

#[test]
fn leaving_other_channel_keeps_selection() {
    let mut manager = manager();
    let lobby_key = manager.join_channel(lobby());
    let osu_key = manager.select_channel(Some(osu())).expect("selected");
    manager.take_outbound();

    manager.leave_channel(lobby_key);

    assert_eq!(manager.current_key(), Some(osu_key));
}

#[test]
fn history_arriving_after_leave_is_discarded() {
    let mut manager = manager();
    let (key, fetch) = join_confirmed(&mut manager, lobby());
    manager.leave_channel(key);
    manager.take_outbound();

    manager.handle_response(fetch.id, Ok(BackendResponse::Messages(vec![payload(1, 5, "late")])));

    assert!(!manager.is_joined(key));
    assert_eq!(manager.pending_request_count(), 1);
}

#[test]
fn history_from_previous_membership_is_discarded_after_rejoin() {
    let mut manager = manager();
    let (key, stale_fetch) = join_confirmed(&mut manager, lobby());
    manager.leave_channel(key);
    manager.join_channel(lobby());
    let requests = manager.take_outbound();
    assert_eq!(requests.len(), 2);

    manager.handle_response(
        stale_fetch.id,
        Ok(BackendResponse::Messages(vec![payload(1, 5, "stale")])),
    );

    let channel = manager.channel(key).expect("rejoined");
    assert!(channel.messages().is_empty());
    assert!(!channel.history_loaded());
    assert_eq!(channel.join_state(), JoinState::Joining);
}

#[test]
fn highlight_switches_to_joined_channel() {
    let mut manager = manager();
    let lobby_key = manager.join_channel(lobby());
    manager.select_channel(Some(osu()));
    manager.take_outbound();
    let mut events = manager.subscribe_events();

    let message = Message::from(payload(40, 5, "look here"));
    let key = manager.highlight_message(&message, lobby());

    assert_eq!(key, lobby_key);
    assert_eq!(manager.current_key(), Some(lobby_key));
    assert!(manager.take_outbound().is_empty());
    assert!(matches!(
        events.try_recv(),
        Ok(ChannelEvent::CurrentChannelChanged(Some(k))) if k == lobby_key
    ));
    assert!(matches!(
        events.try_recv(),
        Ok(ChannelEvent::HighlightRequested { channel, message_id: Some(MessageId(40)) }) if channel == lobby_key
    ));
}

#[test]
fn highlight_joins_channel_never_joined() {
    let mut manager = manager();
    manager.select_channel(Some(osu()));
    manager.take_outbound();

    let message = Message::from(payload(40, 5, "look here"));
    let key = manager.highlight_message(&message, lobby());

    assert!(manager.is_joined(key));
    assert_eq!(manager.current_key(), Some(key));
    assert_eq!(
        single(&mut manager).request,
        BackendRequest::JoinChannel {
            channel_id: ChannelId(5)
        }
    );
}

#[test]
fn highlight_rejoins_channel_that_was_left() {
    let mut manager = manager();
    let key = manager.join_channel(lobby());
    manager.leave_channel(key);
    manager.take_outbound();

    let message = Message::from(payload(40, 5, "look here"));
    manager.highlight_message(&message, lobby());

    assert!(manager.is_joined(key));
    assert_eq!(manager.current_key(), Some(key));
    assert_eq!(manager.take_outbound().len(), 1);
}

#[test]
fn chat_command_opens_one_private_channel() {
    let mut manager = manager();
    let lobby_key = manager.select_channel(Some(lobby())).expect("selected");
    manager.take_outbound();

    manager.post_command("/chat peppy", None).expect("command");
    let lookup = single(&mut manager);
    assert_eq!(
        lookup.request,
        BackendRequest::LookupUser {
            query: "peppy".into()
        }
    );

    manager.post_command("/chat Peppy", None).expect("command");
    assert!(manager.take_outbound().is_empty());
    assert_eq!(manager.current_key(), Some(lobby_key));

    manager.handle_response(lookup.id, Ok(BackendResponse::User(peppy())));

    let pm_key = ChannelKey::Private(UserId(2));
    assert_eq!(manager.current_key(), Some(pm_key));
    let channel = manager.current_channel().expect("private channel");
    assert_eq!(channel.users(), &[peppy()]);
    assert_eq!(channel.join_state(), JoinState::Local);
    assert_eq!(manager.joined_channels().count(), 2);
    assert!(manager.take_outbound().is_empty());

    manager.post_command("/chat peppy", Some(lobby_key)).expect("command");
    assert!(manager.take_outbound().is_empty());
    assert_eq!(manager.current_key(), Some(pm_key));
    assert_eq!(manager.joined_channels().count(), 2);
}

#[test]
fn known_user_opens_without_lookup() {
    let mut manager = manager();
    let lobby_key = manager.select_channel(Some(lobby())).expect("selected");
    let pm_key = manager.open_private_channel(peppy());
    manager.leave_channel(pm_key);
    manager.select_joined(lobby_key).expect("select");
    manager.take_outbound();

    manager.post_command("/msg PEPPY", None).expect("command");

    assert!(manager.take_outbound().is_empty());
    assert_eq!(manager.current_key(), Some(pm_key));
}

#[test]
fn failed_lookup_reports_once_and_keeps_selection() {
    let mut manager = manager();
    let lobby_key = manager.select_channel(Some(lobby())).expect("selected");
    manager.take_outbound();

    manager.post_command("/chat nobody", None).expect("command");
    let lookup = single(&mut manager);
    manager.handle_response(lookup.id, failure("404 not found"));

    assert_eq!(errors(&manager, lobby_key), vec!["User not found.".to_string()]);
    assert_eq!(manager.current_key(), Some(lobby_key));
    let last = manager
        .current_channel()
        .and_then(Channel::last_message)
        .expect("error message");
    assert!(last.is_error());
    assert_eq!(last.content, "User not found.");
    assert_eq!(manager.joined_channels().count(), 1);

    manager.post_command("/chat nobody", None).expect("command");
    assert_eq!(manager.take_outbound().len(), 1);
}

#[test]
fn failed_lookup_is_dropped_when_origin_was_left() {
    let mut manager = manager();
    let lobby_key = manager.select_channel(Some(lobby())).expect("selected");
    manager.take_outbound();
    manager.post_command("/chat nobody", None).expect("command");
    let lookup = single(&mut manager);
    manager.leave_channel(lobby_key);
    manager.join_channel(lobby());
    manager.take_outbound();

    manager.handle_response(lookup.id, failure("404"));

    assert!(errors(&manager, lobby_key).is_empty());
}

#[test]
fn chat_without_username_shows_usage() {
    let mut manager = manager();
    let key = manager.select_channel(Some(lobby())).expect("selected");
    manager.take_outbound();

    manager.post_command("/chat", None).expect("command");

    assert_eq!(errors(&manager, key), vec!["Usage: /chat [user]".to_string()]);
    assert!(manager.take_outbound().is_empty());
}

#[test]
fn search_hides_multiplayer_channels() {
    let mut manager = manager();
    assert!(manager.refresh_channel_list());
    assert!(!manager.refresh_channel_list());
    let list = single(&mut manager);
    assert_eq!(list.request, BackendRequest::ListChannels);
    let mut events = manager.subscribe_events();

    manager.handle_response(
        list.id,
        Ok(BackendResponse::Channels(vec![
            summary(5, "#lobby", ChannelKind::Public),
            summary(6, "#osu", ChannelKind::Public),
            summary(9, "#mp_1234", ChannelKind::Multiplayer),
        ])),
    );

    assert!(matches!(events.try_recv(), Ok(ChannelEvent::AvailableChannelsUpdated)));
    assert_eq!(manager.available_channels().count(), 3);
    let all: Vec<_> = manager.search_available("").iter().map(|i| i.name().to_string()).collect();
    assert_eq!(all, vec!["#lobby", "#osu"]);
    assert_eq!(manager.search_available("LOB").len(), 1);
    assert!(manager.search_available("mp_").is_empty());
    assert_eq!(manager.search_available("osu topic").len(), 1);
    assert!(manager.refresh_channel_list());
}

#[test]
fn confirmed_post_leaves_one_message() {
    let mut manager = manager();
    let (key, fetch) = join_confirmed(&mut manager, lobby());
    manager.handle_response(fetch.id, Ok(BackendResponse::Messages(Vec::new())));
    manager.select_joined(key).expect("select");

    manager.post_command("hello", None).expect("post");
    let post = single(&mut manager);
    let uuid = echo_uuid(&post);
    let echo = manager.channel(key).and_then(Channel::last_message).expect("echo");
    assert_eq!(echo.echo_id(), Some(uuid));
    assert_eq!(echo.sender.as_ref(), Some(&me()));

    let mut confirmed = payload(50, 5, "hello");
    confirmed.sender = me();
    confirmed.uuid = Some(uuid);
    manager.handle_response(post.id, Ok(BackendResponse::MessagePosted(confirmed.clone())));
    manager.receive_messages(vec![confirmed]);

    let channel = manager.channel(key).expect("joined");
    assert_eq!(channel.messages().len(), 1);
    assert_eq!(channel.messages()[0].kind, MessageKind::Chat);
    assert_eq!(channel.messages()[0].id, Some(MessageId(50)));
}

#[test]
fn echo_confirmed_by_poll_before_post_response() {
    let mut manager = manager();
    let key = manager.select_channel(Some(lobby())).expect("selected");
    manager.take_outbound();

    manager.post_command("hello", None).expect("post");
    let post = single(&mut manager);
    let mut confirmed = payload(50, 5, "hello");
    confirmed.uuid = Some(echo_uuid(&post));

    manager.receive_messages(vec![confirmed.clone()]);
    manager.handle_response(post.id, Ok(BackendResponse::MessagePosted(confirmed)));

    let channel = manager.channel(key).expect("joined");
    assert_eq!(channel.messages().len(), 1);
    assert_eq!(channel.messages()[0].id, Some(MessageId(50)));
}

#[test]
fn post_error_after_pushed_copy_adds_no_error() {
    let mut manager = manager();
    let key = manager.select_channel(Some(lobby())).expect("selected");
    manager.take_outbound();

    manager.post_command("hello", None).expect("post");
    let post = single(&mut manager);
    let mut pushed = payload(50, 5, "hello");
    pushed.sender = me();
    pushed.uuid = Some(echo_uuid(&post));
    manager.receive_messages(vec![pushed]);

    manager.handle_response(post.id, failure("timeout"));

    let channel = manager.channel(key).expect("joined");
    assert_eq!(channel.messages().len(), 1);
    assert_eq!(channel.messages()[0].kind, MessageKind::Chat);
    assert!(errors(&manager, key).is_empty());
}

#[test]
fn failed_post_marks_echo_and_reports() {
    let mut manager = manager();
    let key = manager.select_channel(Some(lobby())).expect("selected");
    manager.take_outbound();

    manager.post_command("hello", None).expect("post");
    let post = single(&mut manager);
    manager.handle_response(post.id, failure("rate limited"));

    let channel = manager.channel(key).expect("joined");
    assert_eq!(channel.messages().len(), 2);
    assert!(channel.messages()[0].is_failed_echo());
    let errors = errors(&manager, key);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("rate limited"));
}

#[test]
fn first_private_post_creates_channel() {
    let mut manager = manager();
    let key = manager.open_private_channel(peppy());
    assert!(manager.take_outbound().is_empty());

    manager.post_command("hi there", None).expect("post");
    let create = single(&mut manager);
    let BackendRequest::CreatePrivateChannel { target, message } = &create.request else {
        panic!("expected channel creation, got {:?}", create.request);
    };
    assert_eq!(*target, UserId(2));
    assert_eq!(message.message, "hi there");

    let mut channel = summary(90, "peppy", ChannelKind::Pm);
    channel.users = vec![me(), peppy()];
    let mut first = payload(100, 90, "hi there");
    first.sender = me();
    first.uuid = Some(message.uuid);
    manager.handle_response(
        create.id,
        Ok(BackendResponse::PrivateChannelCreated(CreatePrivateChannelResponse {
            channel,
            message: first,
        })),
    );

    let channel = manager.channel(key).expect("private channel");
    assert_eq!(channel.id(), Some(ChannelId(90)));
    assert_eq!(channel.join_state(), JoinState::Joined);
    assert_eq!(channel.messages().len(), 1);
    assert_eq!(channel.messages()[0].id, Some(MessageId(100)));

    manager.receive_messages(vec![payload(101, 90, "hey")]);
    assert_eq!(manager.channel(key).map(|c| c.messages().len()), Some(2));

    manager.post_command("second", None).expect("post");
    assert!(matches!(
        single(&mut manager).request,
        BackendRequest::PostMessage { channel_id: ChannelId(90), .. }
    ));
}

#[test]
fn only_one_poll_in_flight_and_failures_add_nothing() {
    let mut manager = manager();
    let key = manager.join_channel(lobby());
    manager.take_outbound();

    assert!(manager.poll_updates());
    assert!(!manager.poll_updates());
    let poll = single(&mut manager);
    assert_eq!(poll.request, BackendRequest::PollUpdates { since: None });

    manager.handle_response(poll.id, failure("timeout"));

    assert!(manager.channel(key).expect("joined").messages().is_empty());
    assert!(manager.poll_updates());
}

#[test]
fn poll_adopts_server_channels_and_advances_cursor() {
    let mut manager = manager();
    manager.poll_updates();
    let poll = single(&mut manager);

    let mut pm = summary(70, "peppy", ChannelKind::Pm);
    pm.users = vec![peppy(), me()];
    manager.handle_response(
        poll.id,
        Ok(BackendResponse::Updates(UpdatesPayload {
            channels: vec![pm],
            messages: vec![payload(21, 70, "psst"), payload(20, 70, "hey"), payload(30, 99, "elsewhere")],
        })),
    );

    let key = ChannelKey::Private(UserId(2));
    let channel = manager.channel(key).expect("adopted");
    assert_eq!(channel.join_state(), JoinState::Joined);
    assert_eq!(channel.messages().len(), 2);
    assert_eq!(channel.messages()[0].content, "hey");
    assert_eq!(manager.poll_cursor(), Some(MessageId(30)));
    assert!(manager.take_outbound().is_empty());

    manager.poll_updates();
    assert_eq!(
        single(&mut manager).request,
        BackendRequest::PollUpdates {
            since: Some(MessageId(30))
        }
    );
}

#[test]
fn messages_for_unjoined_channels_are_dropped() {
    let mut manager = manager();
    let key = manager.join_channel(lobby());

    manager.receive_messages(vec![payload(1, 5, "mine"), payload(2, 6, "not mine")]);

    assert_eq!(manager.channel(key).map(|c| c.messages().len()), Some(1));
    assert!(!manager.is_joined(ChannelKey::Server(ChannelId(6))));
}

#[test]
fn post_without_target_is_rejected() {
    let mut manager = manager();
    assert_eq!(manager.post_command("hello", None), Err(ChatError::NoActiveChannel));
    assert_eq!(manager.post_command("   ", None), Ok(()));
    assert!(matches!(
        manager.post_command("hello", Some(ChannelKey::Server(ChannelId(5)))),
        Err(ChatError::UnknownChannel(_))
    ));
    assert!(manager.take_outbound().is_empty());
}

#[test]
fn post_to_explicit_target_ignores_selection() {
    let mut manager = manager();
    let lobby_key = manager.join_channel(lobby());
    let osu_key = manager.select_channel(Some(osu())).expect("selected");
    manager.take_outbound();

    manager.post_command("over there", Some(lobby_key)).expect("post");

    assert!(matches!(
        single(&mut manager).request,
        BackendRequest::PostMessage { channel_id: ChannelId(5), .. }
    ));
    assert_eq!(manager.current_key(), Some(osu_key));
}

#[test]
fn me_command_posts_an_action() {
    let mut manager = manager();
    let key = manager.select_channel(Some(lobby())).expect("selected");
    manager.take_outbound();

    manager.post_command("/me waves", None).expect("post");
    let BackendRequest::PostMessage { message, .. } = single(&mut manager).request else {
        panic!("expected a post");
    };
    assert!(message.is_action);
    assert_eq!(message.message, "waves");

    manager.post_command("/me", None).expect("post");
    assert!(manager.take_outbound().is_empty());
    assert_eq!(errors(&manager, key), vec!["Usage: /me [action]".to_string()]);
}

#[test]
fn join_command_uses_catalogue() {
    let mut manager = manager();
    let lobby_key = manager.select_channel(Some(lobby())).expect("selected");
    manager.refresh_channel_list();
    let list = manager.take_outbound().pop().expect("list request");
    manager.handle_response(
        list.id,
        Ok(BackendResponse::Channels(vec![
            summary(6, "#osu", ChannelKind::Public),
            summary(9, "#mp_1", ChannelKind::Multiplayer),
        ])),
    );

    manager.post_command("/join OSU", None).expect("command");
    assert_eq!(manager.current_key(), Some(ChannelKey::Server(ChannelId(6))));
    assert_eq!(single(&mut manager).request, BackendRequest::JoinChannel { channel_id: ChannelId(6) });

    manager.post_command("/join #mp_1", Some(lobby_key)).expect("command");
    assert!(manager.take_outbound().is_empty());
    assert_eq!(
        errors(&manager, lobby_key),
        vec!["Channel '#mp_1' could not be found.".to_string()]
    );
}

#[test]
fn part_command_leaves_channels() {
    let mut manager = manager();
    let lobby_key = manager.join_channel(lobby());
    let osu_key = manager.select_channel(Some(osu())).expect("selected");
    manager.take_outbound();

    manager.post_command("/part #nowhere", None).expect("command");
    assert_eq!(
        errors(&manager, osu_key),
        vec!["You are not in channel '#nowhere'.".to_string()]
    );

    manager.post_command("/leave #lobby", None).expect("command");
    assert!(!manager.is_joined(lobby_key));
    assert_eq!(manager.current_key(), Some(osu_key));

    manager.post_command("/part", None).expect("command");
    assert!(!manager.is_joined(osu_key));
    assert_eq!(manager.current_key(), None);
    assert_eq!(manager.take_outbound().len(), 2);
}

#[test]
fn help_and_unknown_commands_stay_local() {
    let mut manager = manager();
    let key = manager.select_channel(Some(lobby())).expect("selected");
    manager.take_outbound();

    manager.post_command("/help", None).expect("command");
    manager.post_command("/dance wildly", None).expect("command");

    let channel = manager.channel(key).expect("joined");
    assert_eq!(channel.messages()[0].kind, MessageKind::Info);
    assert_eq!(channel.messages()[0].content, HELP_TEXT);
    assert_eq!(
        errors(&manager, key),
        vec!["\"/dance\" is not supported! For a list of supported commands see /help".to_string()]
    );
    assert!(manager.take_outbound().is_empty());
}

#[test]
fn events_follow_membership_changes() {
    let mut manager = manager();
    let mut events = manager.subscribe_events();

    let key = manager.select_channel(Some(lobby())).expect("selected");
    manager.leave_channel(key);

    assert!(matches!(events.try_recv(), Ok(ChannelEvent::ChannelJoined(k)) if k == key));
    assert!(matches!(events.try_recv(), Ok(ChannelEvent::CurrentChannelChanged(Some(k))) if k == key));
    assert!(matches!(events.try_recv(), Ok(ChannelEvent::ChannelLeft(k)) if k == key));
    assert!(matches!(events.try_recv(), Ok(ChannelEvent::CurrentChannelChanged(None))));
    assert!(events.try_recv().is_err());
}

#[test]
fn responses_resolve_once() {
    let mut manager = manager();
    let key = manager.join_channel(lobby());
    let join = single(&mut manager);

    manager.handle_response(join.id, failure("first"));
    manager.handle_response(join.id, failure("second"));
    manager.handle_response(RequestId(999), failure("unknown"));

    assert_eq!(errors(&manager, key).len(), 1);
}

#[test]
fn history_is_capped() {
    let settings = ChatSettings {
        max_history: 2,
        ..ChatSettings::default()
    };
    let mut manager = ChannelManager::new(me(), settings);
    let key = manager.join_channel(lobby());

    manager.receive_messages(vec![payload(1, 5, "a"), payload(2, 5, "b"), payload(3, 5, "c")]);

    let contents: Vec<_> = manager
        .channel(key)
        .expect("joined")
        .messages()
        .iter()
        .map(|m| m.content.clone())
        .collect();
    assert_eq!(contents, vec!["b", "c"]);
}

#[test]
fn poll_issued_before_leave_does_not_restore_channel() {
    let mut manager = manager();
    let (key, fetch) = join_confirmed(&mut manager, lobby());
    manager.handle_response(fetch.id, Ok(BackendResponse::Messages(Vec::new())));
    manager.poll_updates();
    let poll = single(&mut manager);
    manager.leave_channel(key);
    manager.take_outbound();

    let updates = || UpdatesPayload {
        channels: vec![summary(5, "#lobby", ChannelKind::Public)],
        messages: vec![payload(60, 5, "after leave")],
    };
    manager.handle_response(poll.id, Ok(BackendResponse::Updates(updates())));

    assert!(!manager.is_joined(key));
    assert!(manager.take_outbound().is_empty());

    manager.poll_updates();
    let next = single(&mut manager);
    manager.handle_response(next.id, Ok(BackendResponse::Updates(updates())));

    assert_eq!(manager.channel(key).map(Channel::join_state), Some(JoinState::Joined));
}
