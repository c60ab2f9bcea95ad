use std::sync::{Arc, Mutex as StdMutex};

use shared::protocol::{MessagePayload, UserSummary};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{
    backend::{self, ChatBackend, MissingChatBackend, OutboundRequest},
    channel::{Channel, ChannelInfo, ChannelKey, Message},
    channel_manager::{ChannelEvent, ChannelManager},
    config::ChatSettings,
    error::ChatError,
};

/// Drives a [`ChannelManager`] against a [`ChatBackend`].
///
/// Every mutation goes through one lock, so manager state is never touched
/// concurrently. Requests queued by an operation run as separate tasks and
/// report back whenever they finish, in whatever order that happens.
pub struct ChatClient {
    manager: Mutex<ChannelManager>,
    backend: Arc<dyn ChatBackend>,
    events: broadcast::Sender<ChannelEvent>,
    in_flight: StdMutex<Vec<JoinHandle<()>>>,
}

impl ChatClient {
    pub fn new(local_user: UserSummary, settings: ChatSettings) -> Arc<Self> {
        Self::new_with_backend(local_user, settings, Arc::new(MissingChatBackend))
    }

    pub fn new_with_backend(
        local_user: UserSummary,
        settings: ChatSettings,
        backend: Arc<dyn ChatBackend>,
    ) -> Arc<Self> {
        let manager = ChannelManager::new(local_user, settings);
        let events = manager.event_sender();
        Arc::new(Self {
            manager: Mutex::new(manager),
            backend,
            events,
            in_flight: StdMutex::new(Vec::new()),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    pub async fn join_channel(self: &Arc<Self>, info: ChannelInfo) -> ChannelKey {
        self.apply(|manager| manager.join_channel(info)).await
    }

    pub async fn leave_channel(self: &Arc<Self>, key: ChannelKey) -> bool {
        self.apply(|manager| manager.leave_channel(key)).await
    }

    pub async fn select_channel(self: &Arc<Self>, info: Option<ChannelInfo>) -> Option<ChannelKey> {
        self.apply(|manager| manager.select_channel(info)).await
    }

    pub async fn select_joined(self: &Arc<Self>, key: ChannelKey) -> Result<(), ChatError> {
        self.apply(|manager| manager.select_joined(key)).await
    }

    pub async fn highlight_message(
        self: &Arc<Self>,
        message: &Message,
        info: ChannelInfo,
    ) -> ChannelKey {
        self.apply(|manager| manager.highlight_message(message, info))
            .await
    }

    pub async fn open_private_channel(self: &Arc<Self>, user: UserSummary) -> ChannelKey {
        self.apply(|manager| manager.open_private_channel(user)).await
    }

    pub async fn post_command(self: &Arc<Self>, text: &str) -> Result<(), ChatError> {
        self.apply(|manager| manager.post_command(text, None)).await
    }

    pub async fn post_command_to(
        self: &Arc<Self>,
        text: &str,
        target: ChannelKey,
    ) -> Result<(), ChatError> {
        self.apply(|manager| manager.post_command(text, Some(target)))
            .await
    }

    pub async fn refresh_channel_list(self: &Arc<Self>) -> bool {
        self.apply(ChannelManager::refresh_channel_list).await
    }

    pub async fn poll_updates(self: &Arc<Self>) -> bool {
        self.apply(ChannelManager::poll_updates).await
    }

    pub async fn receive_messages(self: &Arc<Self>, payloads: Vec<MessagePayload>) {
        self.apply(|manager| manager.receive_messages(payloads))
            .await
    }

    pub async fn current_channel(&self) -> Option<Channel> {
        self.manager.lock().await.current_channel().cloned()
    }

    pub async fn channel(&self, key: ChannelKey) -> Option<Channel> {
        self.manager.lock().await.channel(key).cloned()
    }

    pub async fn joined_channels(&self) -> Vec<Channel> {
        self.manager
            .lock()
            .await
            .joined_channels()
            .cloned()
            .collect()
    }

    pub async fn search_available(&self, term: &str) -> Vec<ChannelInfo> {
        self.manager
            .lock()
            .await
            .search_available(term)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Polls for updates every `poll_interval` until the task is aborted.
    pub async fn spawn_poller(self: &Arc<Self>) -> JoinHandle<()> {
        let period = self.manager.lock().await.settings().poll_interval;
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_ms = period.as_millis() as u64, "chat: update poller started");
            loop {
                ticker.tick().await;
                if !client.poll_updates().await {
                    debug!("chat: previous poll still in flight");
                }
            }
        })
    }

    /// Waits until every request issued so far, and every follow-up request
    /// they caused, has been resolved.
    pub async fn wait_idle(&self) {
        loop {
            let handles = {
                let mut guard = self
                    .in_flight
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                std::mem::take(&mut *guard)
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                let _ = handle.await;
            }
        }
    }

    async fn apply<R>(self: &Arc<Self>, op: impl FnOnce(&mut ChannelManager) -> R) -> R {
        let (result, outbound) = {
            let mut manager = self.manager.lock().await;
            let result = op(&mut *manager);
            (result, manager.take_outbound())
        };
        self.dispatch(outbound);
        result
    }

    fn dispatch(self: &Arc<Self>, requests: Vec<OutboundRequest>) {
        if requests.is_empty() {
            return;
        }

        let mut spawned = Vec::with_capacity(requests.len());
        for outbound in requests {
            let client = Arc::clone(self);
            spawned.push(tokio::spawn(async move {
                let outcome = backend::execute(client.backend.as_ref(), &outbound.request)
                    .await
                    .map_err(|err| ChatError::from_backend(&err));
                let follow_up = {
                    let mut manager = client.manager.lock().await;
                    manager.handle_response(outbound.id, outcome);
                    manager.take_outbound()
                };
                client.dispatch(follow_up);
            }));
        }

        let mut guard = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.retain(|handle| !handle.is_finished());
        guard.extend(spawned);
    }
}

#[cfg(test)]
#[path = "tests/client_tests.rs"]
mod tests;
