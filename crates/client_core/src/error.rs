use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("no channel selected")]
    NoActiveChannel,
    #[error("channel {0} is not joined")]
    UnknownChannel(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: &'static str,
    },
}

impl ChatError {
    pub fn from_backend(err: &anyhow::Error) -> Self {
        Self::Request(format!("{err:#}"))
    }
}
