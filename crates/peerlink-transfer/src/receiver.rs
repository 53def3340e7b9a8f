//! Receiving side of a transfer.
//!
//! One receiver tracks at most one active transfer per peer link. Chunks
//! may arrive in any order and are stored by index; the End message
//! triggers reassembly and checksum verification. Messages for any other
//! transfer are ignored.

use std::collections::BTreeMap;

use bytes::{Bytes, BytesMut};
use peerlink_protocol::{
    ChunkMessage, EndMessage, ProtocolError, StartMessage, TransferMessage, TransferMetadata,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::checksum::{checksum, checksum_matches};
use crate::compression::decompress;
use crate::config::TransferConfig;
use crate::{Result, TransferError};

/// Receiver session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// No transfer in progress.
    WaitingForStart,
    /// A Start was accepted; chunks are accumulating.
    ReceivingChunks,
    /// The End message arrived and the payload is being checked.
    Verifying,
    /// The last transfer verified.
    Complete,
    /// The last transfer was rejected or abandoned.
    Failed,
}

/// A verified transfer, handed to the consumer.
#[derive(Debug, Clone)]
pub struct CompletedTransfer {
    /// Transfer identifier.
    pub export_id: String,
    /// Provenance announced in the Start message.
    pub metadata: TransferMetadata,
    /// Announced size after decompression.
    pub total_bytes: u64,
    /// Reassembled compressed payload.
    pub payload: Bytes,
    /// Checksum the payload matched.
    pub checksum: String,
}

impl CompletedTransfer {
    /// Inflate the payload. Output is capped at the announced size.
    pub fn decompress(&self) -> Result<Vec<u8>> {
        Ok(decompress(&self.payload, self.total_bytes)?)
    }
}

/// Result of feeding a message to the receiver.
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// A transfer verified.
    Completed(CompletedTransfer),
    /// A transfer ended without a payload.
    Failed {
        /// Transfer identifier.
        export_id: String,
        /// Why it ended.
        error: TransferError,
    },
}

#[derive(Debug)]
struct ActiveTransfer {
    start: StartMessage,
    chunks: BTreeMap<u32, Bytes>,
    received_bytes: u64,
    last_activity: Instant,
}

impl ActiveTransfer {
    fn new(start: StartMessage) -> Self {
        Self {
            start,
            chunks: BTreeMap::new(),
            received_bytes: 0,
            last_activity: Instant::now(),
        }
    }

    fn export_id(&self) -> &str {
        &self.start.export_id
    }

    fn first_missing(&self) -> Option<u32> {
        (0..self.start.total_chunks).find(|i| !self.chunks.contains_key(i))
    }

    fn assemble(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.received_bytes as usize);
        for chunk in self.chunks.values() {
            buf.extend_from_slice(chunk);
        }
        buf.freeze()
    }
}

/// Reassembles and verifies incoming transfers.
#[derive(Debug)]
pub struct TransferReceiver {
    config: TransferConfig,
    state: ReceiverState,
    active: Option<ActiveTransfer>,
}

impl TransferReceiver {
    /// Create a receiver waiting for a Start.
    pub fn new(config: TransferConfig) -> Self {
        Self {
            config,
            state: ReceiverState::WaitingForStart,
            active: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Identifier of the transfer in progress, if any.
    pub fn active_export_id(&self) -> Option<&str> {
        self.active.as_ref().map(ActiveTransfer::export_id)
    }

    /// Distinct chunk indices held for the active transfer.
    pub fn received_chunks(&self) -> usize {
        self.active.as_ref().map_or(0, |a| a.chunks.len())
    }

    /// Bytes held for the active transfer.
    pub fn buffered_bytes(&self) -> u64 {
        self.active.as_ref().map_or(0, |a| a.received_bytes)
    }

    /// When the active transfer times out if nothing else arrives.
    pub fn idle_deadline(&self) -> Option<Instant> {
        self.active
            .as_ref()
            .map(|a| a.last_activity + self.config.idle_timeout)
    }

    /// Feed one decoded message.
    pub fn handle(&mut self, message: TransferMessage) -> Option<ReceiveOutcome> {
        match message {
            TransferMessage::Start(start) => self.on_start(start),
            TransferMessage::Chunk(chunk) => self.on_chunk(chunk),
            TransferMessage::End(end) => self.on_end(end),
        }
    }

    /// Abandon the active transfer if it has been idle too long.
    pub fn expire_idle(&mut self) -> Option<ReceiveOutcome> {
        let deadline = self.idle_deadline()?;
        if Instant::now() < deadline {
            return None;
        }
        let active = self.active.take()?;
        self.state = ReceiverState::Failed;
        warn!(
            export_id = %active.export_id(),
            chunks = active.chunks.len(),
            "Transfer idle, releasing buffer"
        );
        let export_id = active.start.export_id;
        Some(ReceiveOutcome::Failed {
            error: TransferError::TimedOut {
                export_id: export_id.clone(),
                idle: self.config.idle_timeout,
            },
            export_id,
        })
    }

    fn on_start(&mut self, start: StartMessage) -> Option<ReceiveOutcome> {
        let max = self.config.max_transfer_bytes;
        if start.compressed_bytes > max {
            warn!(
                export_id = %start.export_id,
                compressed_bytes = start.compressed_bytes,
                max,
                "Rejecting oversized transfer"
            );
            let error = TransferError::TooLarge {
                size: start.compressed_bytes,
                max,
            };
            return Some(self.reject_start(start, error));
        }

        // Every chunk but the lone chunk of an empty payload carries a byte.
        if u64::from(start.total_chunks) > start.compressed_bytes.max(1) {
            warn!(
                export_id = %start.export_id,
                chunks = start.total_chunks,
                compressed_bytes = start.compressed_bytes,
                "Rejecting transfer with more chunks than bytes"
            );
            let error = ProtocolError::Schema(format!(
                "totalChunks {} exceeds compressedBytes {}",
                start.total_chunks, start.compressed_bytes
            ))
            .into();
            return Some(self.reject_start(start, error));
        }

        let superseded = match self.active.take() {
            Some(active) if active.export_id() == start.export_id => {
                debug!(export_id = %start.export_id, "Duplicate start ignored");
                self.active = Some(active);
                return None;
            }
            Some(active) => {
                warn!(
                    export_id = %active.export_id(),
                    by = %start.export_id,
                    "Transfer superseded"
                );
                Some(ReceiveOutcome::Failed {
                    error: TransferError::Superseded {
                        export_id: active.start.export_id.clone(),
                        by: start.export_id.clone(),
                    },
                    export_id: active.start.export_id,
                })
            }
            None => None,
        };

        info!(
            export_id = %start.export_id,
            chunks = start.total_chunks,
            compressed_bytes = start.compressed_bytes,
            "Receiving transfer"
        );
        self.active = Some(ActiveTransfer::new(start));
        self.state = ReceiverState::ReceivingChunks;
        superseded
    }

    /// Refuse a Start without disturbing the active transfer.
    fn reject_start(&mut self, start: StartMessage, error: TransferError) -> ReceiveOutcome {
        if self.active.is_none() {
            self.state = ReceiverState::Failed;
        }
        ReceiveOutcome::Failed {
            export_id: start.export_id,
            error,
        }
    }

    fn on_chunk(&mut self, chunk: ChunkMessage) -> Option<ReceiveOutcome> {
        let max_bytes = self.config.max_transfer_bytes;
        let active = match self.active.as_mut() {
            Some(active) if active.export_id() == chunk.export_id => active,
            _ => {
                debug!(export_id = %chunk.export_id, index = chunk.index, "Ignoring stale chunk");
                return None;
            }
        };

        if chunk.index >= active.start.total_chunks {
            warn!(
                export_id = %chunk.export_id,
                index = chunk.index,
                total = active.start.total_chunks,
                "Chunk index out of range"
            );
            return None;
        }

        let len = chunk.data.len() as u64;
        if let Some(previous) = active.chunks.insert(chunk.index, chunk.data) {
            active.received_bytes -= previous.len() as u64;
        }
        active.received_bytes += len;
        active.last_activity = Instant::now();

        if active.received_bytes > max_bytes {
            let size = active.received_bytes;
            let export_id = chunk.export_id;
            warn!(export_id = %export_id, size, "Transfer exceeded size limit");
            self.active = None;
            self.state = ReceiverState::Failed;
            return Some(ReceiveOutcome::Failed {
                export_id,
                error: TransferError::TooLarge {
                    size,
                    max: max_bytes,
                },
            });
        }
        None
    }

    fn on_end(&mut self, end: EndMessage) -> Option<ReceiveOutcome> {
        let active = match self.active.take() {
            Some(active) if active.export_id() == end.export_id => active,
            other => {
                debug!(export_id = %end.export_id, "Ignoring end for unknown transfer");
                self.active = other;
                return None;
            }
        };
        self.state = ReceiverState::Verifying;

        match Self::verify(&active, &end) {
            Ok(payload) => {
                info!(
                    export_id = %end.export_id,
                    bytes = payload.len(),
                    "Transfer complete"
                );
                self.state = ReceiverState::Complete;
                Some(ReceiveOutcome::Completed(CompletedTransfer {
                    export_id: active.start.export_id,
                    metadata: active.start.metadata,
                    total_bytes: active.start.total_bytes,
                    payload,
                    checksum: end.checksum,
                }))
            }
            Err(error) => {
                warn!(export_id = %end.export_id, error = %error, "Transfer rejected");
                self.state = ReceiverState::Failed;
                Some(ReceiveOutcome::Failed {
                    export_id: end.export_id,
                    error,
                })
            }
        }
    }

    fn verify(active: &ActiveTransfer, end: &EndMessage) -> Result<Bytes> {
        if let Some(index) = active.first_missing() {
            return Err(TransferError::MissingChunk {
                export_id: end.export_id.clone(),
                index,
            });
        }

        let payload = active.assemble();
        if payload.len() as u64 != active.start.compressed_bytes {
            warn!(
                export_id = %end.export_id,
                announced = active.start.compressed_bytes,
                received = payload.len(),
                "Compressed size differs from start message"
            );
        }

        let actual = checksum(&payload);
        if !checksum_matches(&end.checksum, &actual) {
            return Err(TransferError::ChecksumMismatch {
                export_id: end.export_id.clone(),
                expected: end.checksum.clone(),
                actual,
            });
        }
        Ok(payload)
    }
}
