//! Core types for the Prediction Market Terminal feed
//!
//! This crate defines the shared data structures used by the real-time
//! subscription layer: topics, control messages, readiness states, the
//! error taxonomy and the market views consumers render.

pub mod error;
pub mod market;
pub mod topic;
pub mod websocket;

pub use error::{FeedError, FeedResult};
pub use market::{BookSide, OrderBookLevel, OrderBookView, Outcome, PricePoint};
pub use topic::{ChannelType, RetentionMode, TopicDescriptor};
pub use websocket::{ClientMessage, MessagePayload, ReadyState, ServerText};
