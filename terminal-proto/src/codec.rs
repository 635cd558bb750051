//! Message codec for push-feed payloads
//!
//! Encodes outgoing values and decodes incoming binary frames against a
//! schema resolved through the [`SchemaCache`].

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use terminal_core::{FeedError, FeedResult};

use crate::schema_cache::SchemaCache;

#[derive(Debug, Clone)]
pub struct MessageCodec {
    cache: Arc<SchemaCache>,
}

impl MessageCodec {
    pub fn new(cache: Arc<SchemaCache>) -> Self {
        Self { cache }
    }

    /// Codec over the process-wide builtin schema cache
    pub fn global() -> Self {
        Self::new(SchemaCache::global())
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    /// Encode `value` as `type_name`, failing with a validation error if it
    /// does not conform to the schema
    pub fn encode(&self, source: &str, type_name: &str, value: &Value) -> FeedResult<Bytes> {
        let schema = self.cache.resolve(source, type_name)?;
        schema.encode(value).map(Bytes::from)
    }

    /// Decode one binary frame into a plain structured value
    pub fn decode(&self, source: &str, type_name: &str, bytes: &[u8]) -> FeedResult<Value> {
        let schema = self.cache.resolve(source, type_name)?;
        schema.decode(bytes)
    }

    /// Decode one binary frame straight into a caller type
    pub fn decode_as<T: DeserializeOwned>(
        &self,
        source: &str,
        type_name: &str,
        bytes: &[u8],
    ) -> FeedResult<T> {
        let value = self.decode(source, type_name, bytes)?;
        serde_json::from_value(value)
            .map_err(|e| FeedError::decode(format!("{type_name}: {e}")))
    }
}
