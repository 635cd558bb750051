//! Topics a subscription channel can ask the push-feed server for

use std::fmt;

use serde::{Deserialize, Serialize};

/// Schema bundle relative path for order book updates
pub const ORDER_BOOK_SCHEMA: &str = "ws_server/order_book.proto";
/// Schema bundle relative path for market price updates
pub const MARKET_PRICE_SCHEMA: &str = "ws_server/market_price.proto";
/// Schema bundle relative path for the shared envelope types
pub const COMMON_SCHEMA: &str = "ws_server/common.proto";

pub const MARKET_BOOK_TYPE: &str = "order_book.MarketBook";
pub const PRICE_PAYLOAD_TYPE: &str = "ws_market_price.WsParamsPayload";

/// Channel keys understood by the push-feed server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    /// `price_update:<marketId>`
    PriceUpdate(String),
    /// `order_book_update:<marketId>`
    OrderBookUpdate(String),
    PricePoster,
    OrderBookPoster,
}

impl ChannelType {
    /// Parse a server channel key. Unknown prefixes and empty market ids yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        if let Some(market_id) = s.strip_prefix("price_update:") {
            return Self::market_id(market_id).map(ChannelType::PriceUpdate);
        }
        if let Some(market_id) = s.strip_prefix("order_book_update:") {
            return Self::market_id(market_id).map(ChannelType::OrderBookUpdate);
        }
        if s.starts_with("price_poster") {
            return Some(ChannelType::PricePoster);
        }
        if s.starts_with("order_book_poster") {
            return Some(ChannelType::OrderBookPoster);
        }
        None
    }

    fn market_id(s: &str) -> Option<String> {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelType::PriceUpdate(id) => write!(f, "price_update:{id}"),
            ChannelType::OrderBookUpdate(id) => write!(f, "order_book_update:{id}"),
            ChannelType::PricePoster => f.write_str("price_poster"),
            ChannelType::OrderBookPoster => f.write_str("order_book_poster"),
        }
    }
}

/// How a channel's decoded stream retains arrivals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RetentionMode {
    /// Accumulate everything, newest item first (observed client behavior)
    NewestFirst,
    /// Accumulate everything in arrival order
    ArrivalOrder,
    /// Every arrival replaces the whole stream
    #[default]
    KeepLatest,
}

impl RetentionMode {
    /// Map the boolean "maintain previous messages" flag onto a mode
    pub fn from_retain_all(retain_all: bool) -> Self {
        if retain_all {
            RetentionMode::NewestFirst
        } else {
            RetentionMode::KeepLatest
        }
    }

    pub fn retains_history(&self) -> bool {
        !matches!(self, RetentionMode::KeepLatest)
    }
}

/// Identifies what a subscription channel wants from the server
///
/// Immutable for the lifetime of a channel; a different topic means a new channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicDescriptor {
    /// Server channel key, e.g. `order_book_update:<marketId>`
    pub channel: String,
    /// Schema source locator (path ending in `.proto`)
    pub schema_source: String,
    /// Fully qualified message type name within the schema
    pub type_name: String,
    pub retention: RetentionMode,
}

impl TopicDescriptor {
    pub fn new(
        channel: impl Into<String>,
        schema_source: impl Into<String>,
        type_name: impl Into<String>,
        retention: RetentionMode,
    ) -> Self {
        Self {
            channel: channel.into(),
            schema_source: schema_source.into(),
            type_name: type_name.into(),
            retention,
        }
    }

    /// Live order book for a market, latest snapshot only
    pub fn order_book(market_id: &str, schema_root: &str) -> Self {
        Self::new(
            ChannelType::OrderBookUpdate(market_id.to_string()).to_string(),
            schema_path(schema_root, ORDER_BOOK_SCHEMA),
            MARKET_BOOK_TYPE,
            RetentionMode::KeepLatest,
        )
    }

    /// Live YES/NO prices for a market, latest update only
    pub fn market_price(market_id: &str, schema_root: &str) -> Self {
        Self::new(
            ChannelType::PriceUpdate(market_id.to_string()).to_string(),
            schema_path(schema_root, MARKET_PRICE_SCHEMA),
            PRICE_PAYLOAD_TYPE,
            RetentionMode::KeepLatest,
        )
    }

    pub fn with_retention(mut self, retention: RetentionMode) -> Self {
        self.retention = retention;
        self
    }

    pub fn channel_type(&self) -> Option<ChannelType> {
        ChannelType::parse(&self.channel)
    }
}

impl fmt::Display for TopicDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.channel, self.type_name)
    }
}

fn schema_path(root: &str, relative: &str) -> String {
    let root = root.trim_end_matches('/');
    if root.is_empty() {
        relative.to_string()
    } else {
        format!("{root}/{relative}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_channel_keys() {
        assert_eq!(
            ChannelType::parse("order_book_update:mkt_1"),
            Some(ChannelType::OrderBookUpdate("mkt_1".to_string()))
        );
        assert_eq!(
            ChannelType::parse("price_update:67df943a-09a5-4ddb-adeb-11042c37c324"),
            Some(ChannelType::PriceUpdate(
                "67df943a-09a5-4ddb-adeb-11042c37c324".to_string()
            ))
        );
        assert_eq!(ChannelType::parse("price_poster"), Some(ChannelType::PricePoster));
        assert_eq!(ChannelType::parse("order_book_update:"), None);
        assert_eq!(ChannelType::parse("trades:mkt_1"), None);
    }

    #[test]
    fn test_channel_key_round_trips_through_display() {
        let channel = ChannelType::OrderBookUpdate("mkt_1".to_string());
        assert_eq!(channel.to_string(), "order_book_update:mkt_1");
        assert_eq!(ChannelType::parse(&channel.to_string()), Some(channel));
    }

    #[test]
    fn test_order_book_topic() {
        let topic = TopicDescriptor::order_book("mkt_1", "/proto/proto_defs/");
        assert_eq!(topic.channel, "order_book_update:mkt_1");
        assert_eq!(topic.schema_source, "/proto/proto_defs/ws_server/order_book.proto");
        assert_eq!(topic.type_name, "order_book.MarketBook");
        assert_eq!(topic.retention, RetentionMode::KeepLatest);

        let bare = TopicDescriptor::market_price("mkt_1", "");
        assert_eq!(bare.schema_source, "ws_server/market_price.proto");
    }

    #[test]
    fn test_topics_key_a_set() {
        let mut topics = std::collections::HashSet::new();
        topics.insert(TopicDescriptor::order_book("mkt_1", "/proto/proto_defs"));
        topics.insert(TopicDescriptor::order_book("mkt_1", "/proto/proto_defs"));
        topics.insert(
            TopicDescriptor::order_book("mkt_1", "/proto/proto_defs")
                .with_retention(RetentionMode::NewestFirst),
        );
        assert_eq!(topics.len(), 2);
    }

    #[test]
    fn test_retention_from_flag() {
        assert_eq!(RetentionMode::from_retain_all(true), RetentionMode::NewestFirst);
        assert_eq!(RetentionMode::from_retain_all(false), RetentionMode::KeepLatest);
        assert!(RetentionMode::ArrivalOrder.retains_history());
        assert!(!RetentionMode::KeepLatest.retains_history());
    }
}
