//! # Peerlink Protocol
//!
//! Wire codec for the chunked transfer protocol that runs over a direct
//! peer channel.
//!
//! The channel is shared with a causal-replication protocol that owns the
//! low byte range [`REPLICATION_RESERVED`]. Every transfer message starts
//! with one of three discriminator bytes chosen from the top of the byte
//! space, so a receiver can tell the two protocols apart by looking at the
//! first byte alone.
//!
//! ## Wire Format
//!
//! ```text
//! Start = [0xF0][JSON]
//! Chunk = [0xF1][u32 BE id len][id bytes][u32 BE index][raw bytes]
//! End   = [0xF2][JSON]
//! ```
//!
//! ## Example
//!
//! ```rust
//! use bytes::Bytes;
//! use peerlink_protocol::{decode_any, ChunkMessage, TransferMessage};
//!
//! let chunk = ChunkMessage::new("abc", 0, Bytes::from_static(b"hell"));
//! let decoded = decode_any(&chunk.encode()).unwrap();
//! assert!(matches!(decoded, TransferMessage::Chunk(c) if c.index == 0));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::ops::RangeInclusive;

mod error;
mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{
    chunk_header_len, decode_any, ChunkMessage, EndMessage, MessageKind, StartMessage,
    TransferMessage, TransferMetadata,
};

/// Discriminator of a Start message.
pub const START_TYPE: u8 = 0xF0;

/// Discriminator of a Chunk message.
pub const CHUNK_TYPE: u8 = 0xF1;

/// Discriminator of an End message.
pub const END_TYPE: u8 = 0xF2;

/// Lowest byte owned by the co-resident replication protocol.
pub const REPLICATION_RESERVED_MIN: u8 = 0x00;

/// Highest byte owned by the co-resident replication protocol.
pub const REPLICATION_RESERVED_MAX: u8 = 0x0F;

/// Leading bytes owned by the replication protocol. Never produced here.
pub const REPLICATION_RESERVED: RangeInclusive<u8> =
    REPLICATION_RESERVED_MIN..=REPLICATION_RESERVED_MAX;

/// The three transfer discriminators, in protocol order.
pub const TRANSFER_TYPES: [u8; 3] = [START_TYPE, CHUNK_TYPE, END_TYPE];

const _: () = {
    let mut i = 0;
    while i < TRANSFER_TYPES.len() {
        let b = TRANSFER_TYPES[i];
        assert!(b < REPLICATION_RESERVED_MIN || b > REPLICATION_RESERVED_MAX);
        i += 1;
    }
};

/// Returns true if `byte` is one of the transfer discriminators.
#[must_use]
pub fn is_transfer_byte(byte: u8) -> bool {
    TRANSFER_TYPES.contains(&byte)
}

/// Returns true if `byte` belongs to the replication protocol's range.
#[must_use]
pub fn is_replication_byte(byte: u8) -> bool {
    REPLICATION_RESERVED.contains(&byte)
}
