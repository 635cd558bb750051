//! Push-feed schemas and codec for the Prediction Market Terminal
//!
//! Binary frames from the push-feed server are protobuf messages. This crate
//! holds the message definitions, a process-wide cache resolving
//! `(schema source, type name)` pairs to decoders, and the codec that turns
//! frames into plain structured values.

pub mod codec;
mod convert;
pub mod schema;
pub mod schema_cache;

pub use codec::MessageCodec;
pub use schema::order_book::MarketBook;
pub use schema::ws_market_price::WsParamsPayload;
pub use schema::{MessageSchema, ProstSchema, Verify};
pub use schema_cache::{BuiltinSchemas, SchemaCache, SchemaLoader};
