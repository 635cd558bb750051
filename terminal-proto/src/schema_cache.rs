//! Process-wide schema cache
//!
//! Resolves a `(schema source, type name)` pair to a reusable
//! [`MessageSchema`]. Each distinct key is loaded at most once; later lookups
//! are pure cache hits. Entries are never evicted, the key space is bounded by
//! the handful of topics mounted at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use terminal_core::{FeedError, FeedResult};
use tracing::debug;

use crate::schema::{MessageSchema, SchemaBundle, BUILTIN_BUNDLES};

/// Loads schema definitions on a cache miss
pub trait SchemaLoader: Send + Sync {
    fn load(&self, source: &str, type_name: &str) -> FeedResult<Arc<dyn MessageSchema>>;
}

/// Loader over the bundles compiled into this crate
#[derive(Debug, Clone, Copy)]
pub struct BuiltinSchemas {
    bundles: &'static [SchemaBundle],
}

impl BuiltinSchemas {
    pub fn new() -> Self {
        Self {
            bundles: BUILTIN_BUNDLES,
        }
    }
}

impl Default for BuiltinSchemas {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaLoader for BuiltinSchemas {
    fn load(&self, source: &str, type_name: &str) -> FeedResult<Arc<dyn MessageSchema>> {
        if !source.ends_with(".proto") {
            return Err(FeedError::schema_load(
                source,
                type_name,
                "invalid file type, only .proto files are supported",
            ));
        }

        let bundle = self
            .bundles
            .iter()
            .find(|bundle| bundle.matches(source))
            .ok_or_else(|| FeedError::schema_load(source, type_name, "schema source not found"))?;

        bundle.lookup(type_name).ok_or_else(|| {
            FeedError::schema_load(
                source,
                type_name,
                format!("no such type in {}", bundle.path),
            )
        })
    }
}

/// Cache key: the exact pair, no partial matches
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SchemaKey {
    source: String,
    type_name: String,
}

/// Memoizing resolver in front of a [`SchemaLoader`]
pub struct SchemaCache {
    loader: Arc<dyn SchemaLoader>,
    entries: DashMap<SchemaKey, Arc<dyn MessageSchema>>,
    /// Loader invocations, successful or not
    loads: AtomicU64,
}

impl SchemaCache {
    pub fn new(loader: Arc<dyn SchemaLoader>) -> Self {
        Self {
            loader,
            entries: DashMap::new(),
            loads: AtomicU64::new(0),
        }
    }

    /// Cache over the builtin bundles
    pub fn builtin() -> Self {
        Self::new(Arc::new(BuiltinSchemas::new()))
    }

    /// The process-lifetime cache over the builtin bundles
    pub fn global() -> Arc<SchemaCache> {
        static GLOBAL: OnceLock<Arc<SchemaCache>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(SchemaCache::builtin())))
    }

    /// Resolve a schema, loading it on first use
    ///
    /// Failures are not cached; the caller decides whether to ask again.
    pub fn resolve(&self, source: &str, type_name: &str) -> FeedResult<Arc<dyn MessageSchema>> {
        let key = SchemaKey {
            source: source.to_string(),
            type_name: type_name.to_string(),
        };

        if let Some(schema) = self.entries.get(&key) {
            return Ok(Arc::clone(schema.value()));
        }

        // The vacant entry holds the shard lock, so concurrent misses on the
        // same key load once.
        match self.entries.entry(key) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                self.loads.fetch_add(1, Ordering::Relaxed);
                let schema = self.loader.load(source, type_name)?;
                debug!("[SchemaCache] Loaded {} from {}", type_name, source);
                Ok(Arc::clone(entry.insert(schema).value()))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("entries", &self.len())
            .field("loads", &self.load_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER_BOOK: &str = "/proto/proto_defs/ws_server/order_book.proto";

    #[test]
    fn test_resolve_is_memoized() {
        let cache = SchemaCache::builtin();

        let first = cache.resolve(ORDER_BOOK, "order_book.MarketBook").unwrap();
        let second = cache.resolve(ORDER_BOOK, "order_book.MarketBook").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.load_count(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(first.type_name(), "order_book.MarketBook");
    }

    #[test]
    fn test_key_is_exact_pair() {
        let cache = SchemaCache::builtin();
        cache.resolve(ORDER_BOOK, "order_book.MarketBook").unwrap();
        cache
            .resolve("ws_server/order_book.proto", "order_book.MarketBook")
            .unwrap();
        cache.resolve(ORDER_BOOK, "order_book.OrderLevel").unwrap();

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.load_count(), 3);
    }

    #[test]
    fn test_unknown_type_is_schema_load_error() {
        let cache = SchemaCache::builtin();
        let err = cache.resolve(ORDER_BOOK, "order_book.Missing").unwrap_err();
        assert!(matches!(err, FeedError::SchemaLoad { .. }));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_non_proto_source_is_rejected() {
        let cache = SchemaCache::builtin();
        let err = cache
            .resolve("/proto/order_book.json", "order_book.MarketBook")
            .unwrap_err();
        assert!(err.to_string().contains("only .proto files"));

        let err = cache
            .resolve("/proto/unknown.proto", "order_book.MarketBook")
            .unwrap_err();
        assert!(err.to_string().contains("schema source not found"));
    }

    #[test]
    fn test_concurrent_misses_load_once() {
        let cache = Arc::new(SchemaCache::builtin());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    cache
                        .resolve(ORDER_BOOK, "order_book.MarketBook")
                        .map(|_| ())
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }
        assert_eq!(cache.load_count(), 1);
    }
}
