use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{ChannelId, MessageId, UserId},
    error::ApiError,
    protocol::{
        ChannelSummary, CreatePrivateChannelRequest, CreatePrivateChannelResponse,
        MessagePayload, OutgoingMessage, UpdatesPayload, UserSummary,
    },
};
use url::Url;

use crate::{backend::ChatBackend, config::ChatSettings};

#[derive(Serialize)]
struct UpdatesQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    since: Option<i64>,
}

/// JSON-over-HTTP chat backend.
pub struct HttpChatBackend {
    http: Client,
    base_url: Url,
    access_token: Option<String>,
    local_user_id: UserId,
}

impl HttpChatBackend {
    pub fn new(settings: &ChatSettings, local_user_id: UserId) -> Result<Self> {
        let base_url = Url::parse(&settings.server_url)
            .with_context(|| format!("invalid server url: {}", settings.server_url))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(anyhow!("server_url must start with http:// or https://"));
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            access_token: settings.access_token.clone(),
            local_user_id,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("server url cannot be used as a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).send().await?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    fn membership_url(&self, channel_id: ChannelId) -> Result<Url> {
        self.endpoint(&[
            "chat",
            "channels",
            &channel_id.0.to_string(),
            "users",
            &self.local_user_id.0.to_string(),
        ])
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
        return Err(api_error.into());
    }
    Err(anyhow!("server returned {status}"))
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    async fn join_channel(&self, channel_id: ChannelId) -> Result<ChannelSummary> {
        let url = self.membership_url(channel_id)?;
        self.send_json(self.http.put(url))
            .await
            .with_context(|| format!("failed to join channel {}", channel_id.0))
    }

    async fn leave_channel(&self, channel_id: ChannelId) -> Result<()> {
        let url = self.membership_url(channel_id)?;
        self.send(self.http.delete(url))
            .await
            .with_context(|| format!("failed to leave channel {}", channel_id.0))?;
        Ok(())
    }

    async fn fetch_messages(&self, channel_id: ChannelId) -> Result<Vec<MessagePayload>> {
        let url = self.endpoint(&["chat", "channels", &channel_id.0.to_string(), "messages"])?;
        self.send_json(self.http.get(url))
            .await
            .with_context(|| format!("failed to fetch messages for channel {}", channel_id.0))
    }

    async fn lookup_user(&self, query: &str) -> Result<UserSummary> {
        let url = self.endpoint(&["users", query])?;
        self.send_json(self.http.get(url))
            .await
            .with_context(|| format!("failed to look up user '{query}'"))
    }

    async fn post_message(
        &self,
        channel_id: ChannelId,
        message: &OutgoingMessage,
    ) -> Result<MessagePayload> {
        let url = self.endpoint(&["chat", "channels", &channel_id.0.to_string(), "messages"])?;
        self.send_json(self.http.post(url).json(message))
            .await
            .with_context(|| format!("failed to post message to channel {}", channel_id.0))
    }

    async fn create_private_channel(
        &self,
        target: UserId,
        message: &OutgoingMessage,
    ) -> Result<CreatePrivateChannelResponse> {
        let url = self.endpoint(&["chat", "new"])?;
        let body = CreatePrivateChannelRequest {
            target_id: target,
            message: message.clone(),
        };
        self.send_json(self.http.post(url).json(&body))
            .await
            .with_context(|| format!("failed to open private channel with user {}", target.0))
    }

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>> {
        let url = self.endpoint(&["chat", "channels"])?;
        self.send_json(self.http.get(url))
            .await
            .context("failed to list channels")
    }

    async fn poll_updates(&self, since: Option<MessageId>) -> Result<UpdatesPayload> {
        let url = self.endpoint(&["chat", "updates"])?;
        let query = UpdatesQuery {
            since: since.map(|id| id.0),
        };
        self.send_json(self.http.get(url).query(&query))
            .await
            .context("failed to poll chat updates")
    }
}

#[cfg(test)]
#[path = "tests/http_backend_tests.rs"]
mod tests;
