use std::{collections::HashMap, fs, path::Path, time::Duration};

pub const DEFAULT_SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSettings {
    pub server_url: String,
    pub access_token: Option<String>,
    pub poll_interval: Duration,
    pub max_history: usize,
    pub fetch_history_on_join: bool,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8443".into(),
            access_token: None,
            poll_interval: Duration::from_millis(1000),
            max_history: 300,
            fetch_history_on_join: true,
        }
    }
}

pub fn load_settings() -> ChatSettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then `path` if it parses, then environment overrides.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> ChatSettings {
    let mut settings = ChatSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            Ok(file_cfg) => apply_file_values(&mut settings, &file_cfg),
            Err(err) => tracing::warn!(path = %path.display(), "ignoring malformed settings file: {err}"),
        }
    }

    if let Some(v) = env("CHAT_SERVER_URL") {
        settings.server_url = v;
    }
    if let Some(v) = env("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Some(v) = env("CHAT_ACCESS_TOKEN") {
        settings.access_token = Some(v);
    }
    if let Some(v) = env("APP__ACCESS_TOKEN") {
        settings.access_token = Some(v);
    }

    if let Some(v) = env("APP__POLL_INTERVAL_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.poll_interval = Duration::from_millis(parsed.max(100));
        }
    }
    if let Some(v) = env("APP__MAX_HISTORY") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.max_history = parsed.max(1);
        }
    }
    if let Some(v) = env("APP__FETCH_HISTORY_ON_JOIN") {
        if let Some(parsed) = parse_flag(&v) {
            settings.fetch_history_on_join = parsed;
        }
    }

    settings
}

fn apply_file_values(settings: &mut ChatSettings, file_cfg: &HashMap<String, toml::Value>) {
    if let Some(v) = file_cfg.get("server_url").and_then(toml::Value::as_str) {
        settings.server_url = v.to_string();
    }
    if let Some(v) = file_cfg.get("access_token").and_then(toml::Value::as_str) {
        settings.access_token = Some(v.to_string());
    }
    if let Some(v) = file_cfg
        .get("poll_interval_ms")
        .and_then(toml::Value::as_integer)
    {
        settings.poll_interval = Duration::from_millis(v.max(100) as u64);
    }
    if let Some(v) = file_cfg.get("max_history").and_then(toml::Value::as_integer) {
        settings.max_history = v.max(1) as usize;
    }
    if let Some(v) = file_cfg
        .get("fetch_history_on_join")
        .and_then(toml::Value::as_bool)
    {
        settings.fetch_history_on_join = v;
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
