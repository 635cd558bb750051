//! Message schemas for push-feed frames
//!
//! Each schema bundle mirrors one `.proto` file served to clients. A bundle
//! maps fully qualified type names to a [`MessageSchema`], the decoder/encoder
//! pair the schema cache hands out.

pub mod order_book;
pub mod ws_common_types;
pub mod ws_market_price;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use terminal_core::topic::{COMMON_SCHEMA, MARKET_PRICE_SCHEMA, ORDER_BOOK_SCHEMA};
use terminal_core::{FeedError, FeedResult};

/// Post-decode (and pre-encode) conformance check for a message
pub trait Verify {
    fn verify(&self) -> Result<(), String>;
}

/// A resolved decoder/encoder for one message type
pub trait MessageSchema: Send + Sync + fmt::Debug {
    /// Fully qualified type name, e.g. `order_book.MarketBook`
    fn type_name(&self) -> &str;

    /// Decode one binary frame into a plain structured value
    fn decode(&self, bytes: &[u8]) -> FeedResult<Value>;

    /// Encode a plain structured value into binary
    fn encode(&self, value: &Value) -> FeedResult<Vec<u8>>;
}

/// [`MessageSchema`] backed by a prost message type
pub struct ProstSchema<M> {
    type_name: &'static str,
    _message: PhantomData<fn() -> M>,
}

impl<M> ProstSchema<M> {
    pub const fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            _message: PhantomData,
        }
    }
}

impl<M> fmt::Debug for ProstSchema<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProstSchema")
            .field("type_name", &self.type_name)
            .finish()
    }
}

impl<M> MessageSchema for ProstSchema<M>
where
    M: prost::Message + Default + Serialize + DeserializeOwned + Verify + 'static,
{
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn decode(&self, bytes: &[u8]) -> FeedResult<Value> {
        let message = M::decode(bytes).map_err(|e| classify_decode_error(self.type_name, &e, bytes))?;
        message
            .verify()
            .map_err(|e| FeedError::decode(format!("{}: {e}", self.type_name)))?;
        serde_json::to_value(&message).map_err(|e| FeedError::decode(e.to_string()))
    }

    fn encode(&self, value: &Value) -> FeedResult<Vec<u8>> {
        let message: M = serde_json::from_value(value.clone())
            .map_err(|e| FeedError::validation(format!("{}: {e}", self.type_name)))?;
        message
            .verify()
            .map_err(|e| FeedError::validation(format!("{}: {e}", self.type_name)))?;
        Ok(message.encode_to_vec())
    }
}

/// Running out of bytes mid-message is the truncated-frame category: a length
/// or fixed-width field overruns the buffer, or the last varint never
/// terminates. A wire-type mismatch is a well-formed frame of another schema
/// sharing the connection. Every other prost failure is a malformed frame.
fn classify_decode_error(type_name: &str, err: &prost::DecodeError, bytes: &[u8]) -> FeedError {
    let message = format!("{type_name}: {err}");
    let unterminated_varint = bytes.last().is_some_and(|byte| byte & 0x80 != 0);

    if message.contains("buffer underflow")
        || (message.contains("invalid varint") && unterminated_varint)
    {
        FeedError::truncated_frame(message)
    } else if message.contains("invalid wire type: ") {
        FeedError::foreign_frame(message)
    } else {
        FeedError::decode(message)
    }
}

type SchemaFactory = fn() -> Arc<dyn MessageSchema>;

/// One `.proto` file's worth of message types
#[derive(Debug, Clone, Copy)]
pub struct SchemaBundle {
    /// Path relative to the schema root, e.g. `ws_server/order_book.proto`
    pub path: &'static str,
    types: &'static [(&'static str, SchemaFactory)],
}

impl SchemaBundle {
    /// Whether a locator (possibly absolute or URL-like) names this bundle
    pub fn matches(&self, source: &str) -> bool {
        source == self.path
            || source
                .strip_suffix(self.path)
                .is_some_and(|prefix| prefix.ends_with('/'))
    }

    pub fn lookup(&self, type_name: &str) -> Option<Arc<dyn MessageSchema>> {
        self.types
            .iter()
            .find(|(name, _)| *name == type_name)
            .map(|(_, factory)| factory())
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.types.iter().map(|(name, _)| *name)
    }
}

fn prost_schema<M>(type_name: &'static str) -> Arc<dyn MessageSchema>
where
    M: prost::Message + Default + Serialize + DeserializeOwned + Verify + 'static,
{
    Arc::new(ProstSchema::<M>::new(type_name))
}

/// Bundles compiled into this crate
pub static BUILTIN_BUNDLES: &[SchemaBundle] = &[
    SchemaBundle {
        path: ORDER_BOOK_SCHEMA,
        types: &[
            ("order_book.MarketBook", || {
                prost_schema::<order_book::MarketBook>("order_book.MarketBook")
            }),
            ("order_book.OrderBook", || {
                prost_schema::<order_book::OrderBook>("order_book.OrderBook")
            }),
            ("order_book.OrderLevel", || {
                prost_schema::<order_book::OrderLevel>("order_book.OrderLevel")
            }),
        ],
    },
    SchemaBundle {
        path: MARKET_PRICE_SCHEMA,
        types: &[("ws_market_price.WsParamsPayload", || {
            prost_schema::<ws_market_price::WsParamsPayload>("ws_market_price.WsParamsPayload")
        })],
    },
    SchemaBundle {
        path: COMMON_SCHEMA,
        types: &[
            ("ws_common_types.WsMessage", || {
                prost_schema::<ws_common_types::WsMessage>("ws_common_types.WsMessage")
            }),
            ("ws_common_types.Payload", || {
                prost_schema::<ws_common_types::Payload>("ws_common_types.Payload")
            }),
            ("ws_common_types.WsData", || {
                prost_schema::<ws_common_types::WsData>("ws_common_types.WsData")
            }),
        ],
    },
];

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_bundle_matches_locators() {
        let bundle = &BUILTIN_BUNDLES[0];
        assert!(bundle.matches("ws_server/order_book.proto"));
        assert!(bundle.matches("/proto/proto_defs/ws_server/order_book.proto"));
        assert!(!bundle.matches("/proto/proto_defs/ws_server/xorder_book.proto"));
        assert!(!bundle.matches("ws_server/market_price.proto"));
    }

    #[test]
    fn test_decode_produces_camel_case_object() {
        let book = order_book::MarketBook {
            market_id: "mkt_1".to_string(),
            yes_book: Some(order_book::OrderBook {
                bids: vec![order_book::OrderLevel {
                    price: 0.45,
                    shares: 100.0,
                    users: 3,
                }],
                asks: vec![],
            }),
            no_book: None,
        };
        let schema = ProstSchema::<order_book::MarketBook>::new("order_book.MarketBook");
        let value = schema.decode(&book.encode_to_vec()).unwrap();

        assert_eq!(value["marketId"], "mkt_1");
        assert_eq!(value["yesBook"]["bids"][0]["price"], 0.45);
        assert_eq!(value["yesBook"]["bids"][0]["users"], 3);
        assert!(value["noBook"].is_null());
    }

    #[test]
    fn test_truncated_frame_is_classified() {
        let payload = ws_market_price::WsParamsPayload {
            market_id: "mkt_1".to_string(),
            yes_price: 0.4,
            no_price: 0.6,
            timestamp: 1_700_000_000,
        };
        let bytes = payload.encode_to_vec();
        let schema =
            ProstSchema::<ws_market_price::WsParamsPayload>::new("ws_market_price.WsParamsPayload");

        // cut in the middle of the 8-byte no_price double
        let err = schema.decode(&bytes[..bytes.len() - 12]).unwrap_err();
        assert!(err.is_truncated_frame(), "unexpected error: {err}");
    }

    #[test]
    fn test_frame_cut_inside_varint_is_truncated() {
        let payload = ws_market_price::WsParamsPayload {
            market_id: "mkt_1".to_string(),
            yes_price: 0.4,
            no_price: 0.6,
            timestamp: 1_700_000_000,
        };
        let bytes = payload.encode_to_vec();
        let schema =
            ProstSchema::<ws_market_price::WsParamsPayload>::new("ws_market_price.WsParamsPayload");

        // timestamp is a 5-byte varint at the end of the frame
        let err = schema.decode(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(err.is_truncated_frame(), "unexpected error: {err}");

        // a lone tag byte with its continuation bit set
        let err = schema.decode(&[0x80]).unwrap_err();
        assert!(err.is_truncated_frame(), "unexpected error: {err}");
    }

    #[test]
    fn test_other_schema_frame_is_foreign() {
        let payload = ws_market_price::WsParamsPayload {
            market_id: "mkt_1".to_string(),
            yes_price: 0.4,
            no_price: 0.6,
            timestamp: 1_700_000_000,
        };
        let schema = ProstSchema::<order_book::MarketBook>::new("order_book.MarketBook");
        let err = schema.decode(&payload.encode_to_vec()).unwrap_err();
        assert!(err.is_foreign_frame(), "unexpected error: {err}");
    }

    #[test]
    fn test_malformed_frame_is_decode_error() {
        let schema = ProstSchema::<order_book::MarketBook>::new("order_book.MarketBook");
        // field 1 with wire type 7 does not exist
        let err = schema.decode(&[0x0f, 0x00]).unwrap_err();
        assert!(matches!(err, FeedError::Decode(_)), "unexpected error: {err}");

        // an over-long varint that does terminate is corruption, not truncation
        let mut overlong = vec![0xff; 10];
        overlong.push(0x01);
        let err = schema.decode(&overlong).unwrap_err();
        assert!(matches!(err, FeedError::Decode(_)), "unexpected error: {err}");
    }

    #[test]
    fn test_verification_failure_is_decode_error() {
        let payload = ws_market_price::WsParamsPayload {
            market_id: "mkt_1".to_string(),
            yes_price: f64::NAN,
            no_price: 0.6,
            timestamp: 0,
        };
        let schema =
            ProstSchema::<ws_market_price::WsParamsPayload>::new("ws_market_price.WsParamsPayload");
        let err = schema.decode(&payload.encode_to_vec()).unwrap_err();
        assert!(matches!(err, FeedError::Decode(_)));
    }

    #[test]
    fn test_encode_rejects_nonconforming_value() {
        let schema = ProstSchema::<order_book::OrderLevel>::new("order_book.OrderLevel");
        let err = schema
            .encode(&serde_json::json!({ "price": "cheap" }))
            .unwrap_err();
        assert!(matches!(err, FeedError::Validation(_)));

        let err = schema
            .encode(&serde_json::json!({ "price": -1.0 }))
            .unwrap_err();
        assert!(matches!(err, FeedError::Validation(_)));
    }
}
