//! Push-feed client facade

use std::sync::Arc;

use serde::de::DeserializeOwned;
use terminal_core::{ClientMessage, TopicDescriptor};
use terminal_proto::MessageCodec;
use tracing::debug;

use crate::channel::{ChannelHandle, ChannelOptions, SubscriptionChannel};
use crate::config::FeedConfig;
use crate::manager::{ConnectionManager, ConnectionProvider};

/// Opens subscription channels over one shared connection
///
/// Clones share the connection and the schema cache.
#[derive(Clone)]
pub struct FeedClient {
    provider: Arc<dyn ConnectionProvider>,
    codec: MessageCodec,
    options: ChannelOptions,
}

impl FeedClient {
    /// Client backed by a tokio-tungstenite connection and the global schema cache
    pub fn new(config: &FeedConfig) -> Self {
        debug!("[Feed] Client for {}", config.ws_url);
        Self {
            provider: Arc::new(ConnectionManager::websocket(config.ws_url.clone())),
            codec: MessageCodec::global(),
            options: ChannelOptions::from_config(config),
        }
    }

    pub fn with_provider(
        provider: Arc<dyn ConnectionProvider>,
        codec: MessageCodec,
        options: ChannelOptions,
    ) -> Self {
        Self {
            provider,
            codec,
            options,
        }
    }

    pub fn provider(&self) -> &Arc<dyn ConnectionProvider> {
        &self.provider
    }

    pub fn codec(&self) -> &MessageCodec {
        &self.codec
    }

    /// Options applied by [`FeedClient::subscribe`]
    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    /// Subscribe to `topic` with the default Subscribe request
    pub fn subscribe<T>(&self, topic: TopicDescriptor) -> ChannelHandle<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let request = ClientMessage::subscribe(topic.channel.clone());
        self.open(topic, request, self.options.clone())
    }

    /// Open a channel with an explicit control message and options
    pub fn open<T>(
        &self,
        topic: TopicDescriptor,
        request: ClientMessage,
        options: ChannelOptions,
    ) -> ChannelHandle<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        SubscriptionChannel::open(
            Arc::clone(&self.provider),
            self.codec.clone(),
            topic,
            request,
            options,
        )
    }
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("options", &self.options)
            .finish()
    }
}
