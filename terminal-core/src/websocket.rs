//! WebSocket control messages for the push-feed
//!
//! Text frames flow client -> server (subscribe/unsubscribe) and carry the
//! server's acknowledgements back. Market data itself arrives as binary
//! frames and is decoded elsewhere.

use serde::{Deserialize, Serialize};

use crate::error::{FeedError, FeedResult};

// ============================================================================
// Client -> Server Messages
// ============================================================================

/// Control message envelope sent as a UTF-8 text frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Optional client-chosen correlation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub payload: MessagePayload,
}

/// `{ "type": "Subscribe", "data": { "channel": ... } }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MessagePayload {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
}

impl ClientMessage {
    pub fn subscribe(channel: impl Into<String>) -> Self {
        Self {
            id: None,
            payload: MessagePayload::Subscribe {
                channel: channel.into(),
            },
        }
    }

    pub fn unsubscribe(channel: impl Into<String>) -> Self {
        Self {
            id: None,
            payload: MessagePayload::Unsubscribe {
                channel: channel.into(),
            },
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn channel(&self) -> &str {
        match &self.payload {
            MessagePayload::Subscribe { channel } | MessagePayload::Unsubscribe { channel } => {
                channel
            }
        }
    }

    /// Reject payloads the server could never route
    pub fn validate(&self) -> FeedResult<()> {
        let channel = self.channel();
        if channel.is_empty() {
            return Err(FeedError::validation("channel name is empty"));
        }
        if channel.chars().any(char::is_whitespace) {
            return Err(FeedError::validation(format!(
                "channel name contains whitespace: {channel:?}"
            )));
        }
        Ok(())
    }

    /// Validate, then serialize to the text frame body
    pub fn to_text(&self) -> FeedResult<String> {
        self.validate()?;
        serde_json::to_string(self).map_err(|e| FeedError::validation(e.to_string()))
    }
}

// ============================================================================
// Server -> Client Text Frames
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AckFrame {
    Subscribed { channel: String },
    Unsubscribed { channel: String },
}

/// A text frame from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerText {
    Subscribed { channel: String },
    Unsubscribed { channel: String },
    /// Anything else, e.g. `Invalid channel ...` or `Invalid message format`
    Notice(String),
}

impl ServerText {
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str::<AckFrame>(text) {
            Ok(AckFrame::Subscribed { channel }) => ServerText::Subscribed { channel },
            Ok(AckFrame::Unsubscribed { channel }) => ServerText::Unsubscribed { channel },
            Err(_) => ServerText::Notice(text.to_string()),
        }
    }
}

// ============================================================================
// Connection Readiness
// ============================================================================

/// Readiness of the shared push-feed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ReadyState {
    pub fn is_open(&self) -> bool {
        matches!(self, ReadyState::Open)
    }

    /// Closing or closed; the handle will never open again
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadyState::Closing | ReadyState::Closed)
    }
}
