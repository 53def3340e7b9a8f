//! Transfer tuning.

use std::time::Duration;

use peerlink_protocol::chunk_header_len;

/// Largest frame the data channel is assumed to carry.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024;

/// How long a receiver waits between messages before abandoning a transfer.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Largest compressed payload a receiver will accept.
pub const DEFAULT_MAX_TRANSFER_BYTES: u64 = 512 * 1024 * 1024;

/// Limits shared by senders and receivers.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Maximum size of one encoded frame, header included.
    pub max_message_size: usize,
    /// Receiver idle window.
    pub idle_timeout: Duration,
    /// Receiver payload cap.
    pub max_transfer_bytes: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_transfer_bytes: DEFAULT_MAX_TRANSFER_BYTES,
        }
    }
}

impl TransferConfig {
    /// Payload bytes per chunk for a given transfer, never zero.
    #[must_use]
    pub fn chunk_size_for(&self, export_id: &str) -> usize {
        self.max_message_size
            .saturating_sub(chunk_header_len(export_id))
            .max(1)
    }
}
