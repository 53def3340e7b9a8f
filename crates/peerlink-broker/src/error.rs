//! Error types for the broker.

use thiserror::Error;

/// Errors that can occur in broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The connection's outbound queue is closed.
    #[error("connection closed")]
    ChannelClosed,

    /// A stored attachment belongs to another connection.
    #[error("attachment belongs to {found}, not {expected}")]
    AttachmentMismatch {
        /// Connection being restored.
        expected: String,
        /// Identifier recorded in the attachment.
        found: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
