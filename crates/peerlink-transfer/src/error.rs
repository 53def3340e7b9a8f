//! Error types for transfer sessions.

use std::time::Duration;

use peerlink_protocol::ProtocolError;
use thiserror::Error;

/// Errors that can end or reject a transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The underlying data channel reported a send failure.
    #[error("transport send failed: {0}")]
    Transport(String),

    /// The underlying data channel is closed.
    #[error("data channel closed")]
    ChannelClosed,

    /// The reassembled payload does not hash to the announced checksum.
    #[error("checksum mismatch for {export_id}: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        /// Transfer identifier.
        export_id: String,
        /// Checksum carried by the End message.
        expected: String,
        /// Checksum of the reassembled bytes.
        actual: String,
    },

    /// A chunk index in `[0, totalChunks)` never arrived.
    #[error("checksum mismatch for {export_id}: chunk {index} missing")]
    MissingChunk {
        /// Transfer identifier.
        export_id: String,
        /// First missing index.
        index: u32,
    },

    /// The payload exceeds the configured size limit.
    #[error("transfer too large: {size} bytes (max {max})")]
    TooLarge {
        /// Announced or accumulated size.
        size: u64,
        /// Configured limit.
        max: u64,
    },

    /// No End message arrived within the idle window.
    #[error("transfer {export_id} idle for more than {idle:?}")]
    TimedOut {
        /// Transfer identifier.
        export_id: String,
        /// Configured idle window.
        idle: Duration,
    },

    /// A Start for another transfer replaced this one.
    #[error("transfer {export_id} superseded by {by}")]
    Superseded {
        /// Transfer that was dropped.
        export_id: String,
        /// Transfer that replaced it.
        by: String,
    },

    /// The sender's cancellation token fired.
    #[error("transfer cancelled")]
    Cancelled,

    /// Compressing or inflating the payload failed.
    #[error("compression error: {0}")]
    Compression(#[from] std::io::Error),

    /// An operation was attempted in the wrong session state.
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),
}

impl TransferError {
    /// True for checksum and missing-chunk failures.
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            TransferError::ChecksumMismatch { .. } | TransferError::MissingChunk { .. }
        )
    }
}

/// A specialized Result type for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;
