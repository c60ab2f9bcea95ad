//! Slash-command parsing for text typed into a channel.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Plain text for the target channel.
    Message(String),
    /// `/me <action>`
    Action(Option<String>),
    /// `/chat <username>`, also `/query` and `/msg`
    OpenPrivate(Option<String>),
    /// `/join <channel>`
    Join(Option<String>),
    /// `/part [channel]`, also `/leave`
    Part(Option<String>),
    Help,
    Unknown(String),
}

pub const HELP_TEXT: &str = "Supported commands: /help, /me [action], /chat [user], /join [channel], /part [channel]";

/// Parses one line of input. Blank input yields `None`.
pub fn parse_command(text: &str) -> Option<ChatCommand> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let Some(body) = text.strip_prefix('/') else {
        return Some(ChatCommand::Message(text.to_string()));
    };

    let (word, rest) = match body.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (body, ""),
    };
    let argument = (!rest.is_empty()).then(|| rest.to_string());

    let command = match word.to_ascii_lowercase().as_str() {
        "me" => ChatCommand::Action(argument),
        "chat" | "query" | "msg" => ChatCommand::OpenPrivate(argument),
        "join" => ChatCommand::Join(argument),
        "part" | "leave" => ChatCommand::Part(argument),
        "help" => ChatCommand::Help,
        _ => ChatCommand::Unknown(word.to_string()),
    };
    Some(command)
}

/// Strips the conventional `#` prefix from channel names typed by users.
pub fn normalize_channel_name(name: &str) -> String {
    name.trim().trim_start_matches('#').to_lowercase()
}

#[cfg(test)]
#[path = "tests/command_tests.rs"]
mod tests;
