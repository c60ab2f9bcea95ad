//! Channel session management for the in-game chat overlay.
//!
//! [`ChannelManager`] holds joined channels, the current selection and the
//! channel catalogue, and turns user input into backend requests.
//! [`ChatClient`] runs those requests against a [`ChatBackend`] on tokio.

pub mod backend;
pub mod channel;
pub mod channel_manager;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod http_backend;

pub use backend::{ChatBackend, MissingChatBackend};
pub use channel::{Channel, ChannelInfo, ChannelKey, JoinState, Message, MessageKind};
pub use channel_manager::{ChannelEvent, ChannelManager};
pub use client::ChatClient;
pub use config::{load_settings, ChatSettings};
pub use error::ChatError;
pub use http_backend::HttpChatBackend;
