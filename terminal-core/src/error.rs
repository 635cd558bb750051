//! Error types for the real-time feed

use thiserror::Error;

/// Feed-wide error type
///
/// Nothing in the subscription layer returns these across a channel's public
/// boundary. They are absorbed into channel state transitions or dropped
/// frames, and surface only through logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Schema source unreachable or type name unknown
    #[error("Schema load error ({source_locator} / {type_name}): {message}")]
    SchemaLoad {
        source_locator: String,
        type_name: String,
        message: String,
    },

    /// Frame bytes did not parse as the named type, or failed verification
    #[error("Decode error: {0}")]
    Decode(String),

    /// Frame ended before the message did (partial frame noise)
    #[error("Truncated frame: {0}")]
    TruncatedFrame(String),

    /// Well-formed frame encoded with a different schema
    #[error("Foreign frame: {0}")]
    ForeignFrame(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// Outgoing payload failed conformance checks before send
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FeedError {
    pub fn schema_load(
        source_locator: impl Into<String>,
        type_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        FeedError::SchemaLoad {
            source_locator: source_locator.into(),
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        FeedError::Decode(msg.into())
    }

    pub fn truncated_frame(msg: impl Into<String>) -> Self {
        FeedError::TruncatedFrame(msg.into())
    }

    pub fn foreign_frame(msg: impl Into<String>) -> Self {
        FeedError::ForeignFrame(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        FeedError::Transport(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        FeedError::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        FeedError::Config(msg.into())
    }

    /// Truncated frames are expected noise and must never be logged
    pub fn is_truncated_frame(&self) -> bool {
        matches!(self, FeedError::TruncatedFrame(_))
    }

    /// Frames for another topic share the connection and fail with this
    pub fn is_foreign_frame(&self) -> bool {
        matches!(self, FeedError::ForeignFrame(_))
    }
}

/// Result type alias for feed operations
pub type FeedResult<T> = Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_frame_is_distinguished() {
        assert!(FeedError::truncated_frame("buffer underflow").is_truncated_frame());
        assert!(!FeedError::decode("invalid wire type").is_truncated_frame());
        assert!(!FeedError::transport("reset").is_truncated_frame());
        assert!(!FeedError::foreign_frame("invalid wire type").is_truncated_frame());
    }

    #[test]
    fn test_foreign_frame_is_distinguished() {
        assert!(FeedError::foreign_frame("invalid wire type").is_foreign_frame());
        assert!(!FeedError::decode("invalid wire type value: 7").is_foreign_frame());
    }

    #[test]
    fn test_schema_load_display() {
        let err = FeedError::schema_load("a.proto", "order_book.Missing", "type not found");
        assert_eq!(
            err.to_string(),
            "Schema load error (a.proto / order_book.Missing): type not found"
        );
    }
}
