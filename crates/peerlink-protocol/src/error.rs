//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while decoding transfer messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The buffer was empty.
    #[error("empty message")]
    Empty,

    /// The leading byte is not one of the transfer discriminators.
    #[error("unknown message type: 0x{0:02x}")]
    UnknownType(u8),

    /// A typed decoder was handed a buffer of another kind.
    #[error("discriminator mismatch: expected 0x{expected:02x}, found 0x{found:02x}")]
    DiscriminatorMismatch {
        /// The discriminator the decoder accepts.
        expected: u8,
        /// The discriminator found in the buffer.
        found: u8,
    },

    /// The buffer ended before the header was complete.
    #[error("truncated message: {0}")]
    Truncated(&'static str),

    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid utf-8 in {field}: {source}")]
    InvalidUtf8 {
        /// Which field failed.
        field: &'static str,
        /// Underlying error.
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// The JSON body did not parse or did not match the schema.
    #[error("invalid json body: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON body parsed but violated a value constraint.
    #[error("schema violation: {0}")]
    Schema(String),
}

/// A specialized Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
