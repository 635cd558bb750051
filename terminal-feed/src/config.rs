//! Push-feed configuration

use std::env;
use std::time::Duration;

use url::Url;

/// Base delay between reconnection attempts
pub const RECONNECT_DELAY_BASE: Duration = Duration::from_millis(3000);

/// Max reconnection attempts before a channel stalls
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Configuration for the push-feed client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Push-feed endpoint (`ws://` or `wss://`)
    pub ws_url: Url,
    /// Attempt `i` (1-based) fires `reconnect_delay * (i + 1)` after the close
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl FeedConfig {
    pub fn new(ws_url: Url) -> Self {
        Self {
            ws_url,
            reconnect_delay: RECONNECT_DELAY_BASE,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }

    /// Load configuration from environment variables
    ///
    /// Expects:
    /// - FEED_WS_URL: push-feed endpoint
    /// - FEED_RECONNECT_DELAY_MS (optional, default 3000)
    /// - FEED_MAX_RECONNECT_ATTEMPTS (optional, default 10)
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_url = env::var("FEED_WS_URL").map_err(|_| ConfigError::Missing("FEED_WS_URL"))?;
        let mut config = Self::new(parse_ws_url(&raw_url)?);

        if let Some(ms) = parse_var::<u64>("FEED_RECONNECT_DELAY_MS")? {
            config.reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var::<u32>("FEED_MAX_RECONNECT_ATTEMPTS")? {
            config.max_reconnect_attempts = attempts;
        }

        Ok(config)
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }
}

/// Parse and check a push-feed endpoint
pub fn parse_ws_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        error: e.to_string(),
    })?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            error: format!("unsupported scheme {other:?}, expected ws or wss"),
        }),
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                field: name,
                error: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("Invalid push-feed URL {url}: {error}")]
    InvalidUrl { url: String, error: String },

    #[error("Invalid value in {field}: {error}")]
    InvalidValue { field: &'static str, error: String },
}
