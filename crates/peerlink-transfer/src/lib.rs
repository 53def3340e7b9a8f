//! # Peerlink Transfer
//!
//! Moves one large payload between two peers over a direct data channel.
//!
//! - [`TransferSender`] splits a compressed payload into chunks sized for
//!   the channel and emits Start, every Chunk, then End.
//! - [`TransferReceiver`] reassembles chunks in index order, verifies the
//!   SHA-256 checksum and releases transfers that stall.
//! - [`ChannelDispatcher`] sits on the inbound side of the shared channel
//!   and splits transfer frames from replication frames by their first
//!   byte.
//!
//! There are no acknowledgements. The channel is assumed ordered and
//! reliable, and a send failure abandons the transfer.
//!
//! ## Example
//!
//! ```rust,no_run
//! use peerlink_protocol::TransferMetadata;
//! use peerlink_transfer::{CompressionLevel, OutgoingTransfer, TransferConfig, TransferSender};
//!
//! # async fn demo(channel: tokio::sync::mpsc::Sender<bytes::Bytes>) -> peerlink_transfer::Result<()> {
//! let transfer = OutgoingTransfer::from_raw(
//!     "export-1",
//!     TransferMetadata::default(),
//!     b"transcript",
//!     CompressionLevel::Default,
//! )?;
//! let mut sender = TransferSender::new(transfer, &TransferConfig::default())?;
//! let receipt = sender.send(&channel).await?;
//! println!("sent {} chunks", receipt.total_chunks);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod checksum;
mod compression;
mod config;
mod dispatcher;
mod error;
mod receiver;
mod sender;

pub use channel::DataChannel;
pub use checksum::{checksum, checksum_matches};
pub use compression::{compress, decompress, CompressionLevel};
pub use config::{
    TransferConfig, DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_MAX_TRANSFER_BYTES,
};
pub use dispatcher::{ChannelDispatcher, ReplicationHandler, Route, TransferSink};
pub use error::{Result, TransferError};
pub use receiver::{CompletedTransfer, ReceiveOutcome, ReceiverState, TransferReceiver};
pub use sender::{
    OutgoingTransfer, SenderState, TransferProgress, TransferReceipt, TransferSender,
};
