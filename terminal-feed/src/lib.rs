//! Push-feed client for the Prediction Market Terminal
//!
//! One WebSocket connection per process, shared by any number of
//! subscription channels. Each channel subscribes to a server channel,
//! decodes the binary frames it receives with its topic's protobuf schema
//! and exposes the decoded stream to its caller.
//!
//! ```no_run
//! use terminal_core::{Outcome, TopicDescriptor};
//! use terminal_feed::{FeedClient, FeedConfig};
//! use terminal_proto::MarketBook;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = FeedClient::new(&FeedConfig::from_env()?);
//! let mut books = client.subscribe::<MarketBook>(TopicDescriptor::order_book(
//!     "mkt_1",
//!     "/proto/proto_defs",
//! ));
//! while books.changed().await {
//!     if let Some(book) = books.latest() {
//!         println!("{:?}", book.to_view().spread(Outcome::Yes));
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod client;
pub mod config;
pub mod connection;
pub mod manager;
pub mod stream;

pub use channel::{
    ChannelHandle, ChannelOptions, ChannelState, ChannelStats, ChannelStream, ExhaustedCallback,
    SubscriptionChannel,
};
pub use client::FeedClient;
pub use config::{ConfigError, FeedConfig};
pub use connection::{Connection, ConnectionDriver, FrameListener, ListenerId, Outbound, OutboundFrames};
pub use manager::{ConnectionManager, ConnectionProvider, Connector, WsConnector};
pub use stream::apply_batch;
