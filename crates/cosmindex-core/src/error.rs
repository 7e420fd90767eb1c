//! Error types for the ingestion pipeline.

use thiserror::Error;

/// Errors that can occur while ingesting chain data.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("node error: {0}")]
    Node(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("handler error in '{handler}': {reason}")]
    Handler { handler: String, reason: String },

    #[error("event '{event_type}' error: {reason}")]
    Event { event_type: String, reason: String },

    #[error("no attribute '{key}' in event '{event_type}'")]
    MissingAttribute { event_type: String, key: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("timestamp error: {0}")]
    Timestamp(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("queue closed")]
    QueueClosed,

    #[error("{0}")]
    Other(String),
}
