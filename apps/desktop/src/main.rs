use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use client_core::{
    load_settings, ChannelEvent, ChannelInfo, ChatClient, HttpChatBackend, Message, MessageKind,
};
use shared::{
    domain::{ChannelId, ChannelKind, UserId},
    protocol::UserSummary,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// Overrides `server_url` from client.toml.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    user_id: i64,
    #[arg(long)]
    username: String,
    /// Channel ids to join on startup. The first one is selected.
    #[arg(long = "channel")]
    channels: Vec<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    if let Some(token) = args.token {
        settings.access_token = Some(token);
    }

    let local_user = UserSummary {
        user_id: UserId(args.user_id),
        username: args.username,
    };
    let backend = Arc::new(HttpChatBackend::new(&settings, local_user.user_id)?);
    info!(server_url = %settings.server_url, user = %local_user.username, "starting chat");
    let client = ChatClient::new_with_backend(local_user, settings, backend);

    let printer = tokio::spawn(print_events(Arc::clone(&client)));
    client.refresh_channel_list().await;
    for (index, channel_id) in args.channels.iter().enumerate() {
        let info = ChannelInfo::new(
            ChannelId(*channel_id),
            format!("#{channel_id}"),
            "",
            ChannelKind::Public,
        );
        if index == 0 {
            client.select_channel(Some(info)).await;
        } else {
            client.join_channel(info).await;
        }
    }
    let poller = client.spawn_poller().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(rest) = line.trim().strip_prefix("/search") {
            for info in client.search_available(rest.trim()).await {
                println!("  {} ({:?}) {}", info.name(), info.kind(), info.topic());
            }
            continue;
        }
        if let Some(name) = line.trim().strip_prefix("/switch ") {
            switch_to(&client, name).await;
            continue;
        }
        if let Err(err) = client.post_command(&line).await {
            warn!("{err}");
        }
    }

    poller.abort();
    client.wait_idle().await;
    printer.abort();
    Ok(())
}

async fn switch_to(client: &Arc<ChatClient>, name: &str) {
    let wanted = client_core::command::normalize_channel_name(name);
    let found = client
        .joined_channels()
        .await
        .into_iter()
        .find(|channel| client_core::command::normalize_channel_name(channel.name()) == wanted);
    match found {
        Some(channel) => {
            if let Err(err) = client.select_joined(channel.key()).await {
                warn!("{err}");
            }
        }
        None => println!("not in channel #{wanted}"),
    }
}

async fn print_events(client: Arc<ChatClient>) {
    let mut events = client.subscribe_events();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event printer fell behind");
                continue;
            }
            Err(RecvError::Closed) => return,
        };
        match event {
            ChannelEvent::MessagesAdded { channel, messages } => {
                let name = channel_name(&client, channel).await;
                for message in &messages {
                    println!("[{name}] {}", render(message));
                }
            }
            ChannelEvent::MessageReplaced {
                channel, message, ..
            } if message.is_failed_echo() => {
                let name = channel_name(&client, channel).await;
                println!("[{name}] (not sent) {}", render(&message));
            }
            ChannelEvent::CurrentChannelChanged(Some(key)) => {
                println!("-- now talking in {}", channel_name(&client, key).await);
            }
            ChannelEvent::CurrentChannelChanged(None) => println!("-- no channel selected"),
            ChannelEvent::ChannelLeft(key) => println!("-- left {key}"),
            _ => {}
        }
    }
}

async fn channel_name(client: &ChatClient, key: client_core::ChannelKey) -> String {
    client
        .channel(key)
        .await
        .map(|channel| channel.name().to_string())
        .unwrap_or_else(|| key.to_string())
}

fn render(message: &Message) -> String {
    let timestamp = message.timestamp.format("%H:%M");
    let sender = message
        .sender
        .as_ref()
        .map(|sender| sender.username.as_str())
        .unwrap_or("*");
    match (&message.kind, message.is_action) {
        (MessageKind::Error, _) => format!("{timestamp} ! {}", message.content),
        (MessageKind::Info, _) => format!("{timestamp} * {}", message.content),
        (_, true) => format!("{timestamp} * {sender} {}", message.content),
        (_, false) => format!("{timestamp} <{sender}> {}", message.content),
    }
}
