//! Sending side of a transfer.
//!
//! The sender emits one Start, every Chunk in ascending index order, then
//! one End carrying the checksum of the full compressed payload. It never
//! waits for acknowledgements; delivery and ordering belong to the data
//! channel. A send failure abandons the transfer.

use bytes::Bytes;
use peerlink_protocol::{ChunkMessage, EndMessage, StartMessage, TransferMetadata};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::DataChannel;
use crate::checksum::checksum;
use crate::compression::{compress, CompressionLevel};
use crate::config::TransferConfig;
use crate::{Result, TransferError};

/// Sender session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Nothing sent yet.
    Idle,
    /// Emitting the Start message.
    SendingStart,
    /// Emitting chunks.
    SendingChunks,
    /// The End message has been handed to the channel.
    SentEnd,
    /// Every frame was sent.
    Done,
    /// The channel failed; the transfer is abandoned.
    Failed,
    /// The cancellation token fired.
    Cancelled,
}

impl SenderState {
    /// True once the session can make no further progress.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SenderState::Done | SenderState::Failed | SenderState::Cancelled
        )
    }
}

/// Progress snapshot published while sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferProgress {
    /// Chunk frames handed to the channel.
    pub chunks_sent: u32,
    /// Chunks in the transfer.
    pub total_chunks: u32,
    /// Payload bytes handed to the channel.
    pub bytes_sent: u64,
}

/// A payload ready to be sent.
#[derive(Debug, Clone)]
pub struct OutgoingTransfer {
    export_id: String,
    metadata: TransferMetadata,
    payload: Bytes,
    total_bytes: u64,
}

impl OutgoingTransfer {
    /// Wrap an already-compressed payload.
    pub fn from_compressed(
        export_id: impl Into<String>,
        metadata: TransferMetadata,
        payload: Bytes,
        total_bytes: u64,
    ) -> Self {
        Self {
            export_id: export_id.into(),
            metadata,
            payload,
            total_bytes,
        }
    }

    /// Compress `raw` and wrap the result.
    pub fn from_raw(
        export_id: impl Into<String>,
        metadata: TransferMetadata,
        raw: &[u8],
        level: CompressionLevel,
    ) -> Result<Self> {
        let compressed = compress(raw, level)?;
        Ok(Self::from_compressed(
            export_id,
            metadata,
            Bytes::from(compressed),
            raw.len() as u64,
        ))
    }

    /// Transfer identifier.
    pub fn export_id(&self) -> &str {
        &self.export_id
    }

    /// Size of the chunked (compressed) payload.
    pub fn compressed_bytes(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Size before compression.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

/// Summary of a completed send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    /// Transfer identifier.
    pub export_id: String,
    /// Chunks emitted.
    pub total_chunks: u32,
    /// Compressed bytes emitted.
    pub compressed_bytes: u64,
    /// Checksum carried by the End message.
    pub checksum: String,
}

/// Drives one outgoing transfer.
#[derive(Debug)]
pub struct TransferSender {
    transfer: OutgoingTransfer,
    chunk_size: usize,
    total_chunks: u32,
    checksum: String,
    state: SenderState,
    cancel: CancellationToken,
    progress: watch::Sender<TransferProgress>,
}

impl TransferSender {
    /// Prepare a sender. The checksum is computed here, before chunking.
    pub fn new(transfer: OutgoingTransfer, config: &TransferConfig) -> Result<Self> {
        let chunk_size = config.chunk_size_for(&transfer.export_id);
        let chunks = transfer.payload.len().div_ceil(chunk_size).max(1);
        let total_chunks = u32::try_from(chunks).map_err(|_| TransferError::TooLarge {
            size: transfer.compressed_bytes(),
            max: u64::from(u32::MAX) * chunk_size as u64,
        })?;
        let checksum = checksum(&transfer.payload);
        let (progress, _) = watch::channel(TransferProgress {
            total_chunks,
            ..TransferProgress::default()
        });

        Ok(Self {
            transfer,
            chunk_size,
            total_chunks,
            checksum,
            state: SenderState::Idle,
            cancel: CancellationToken::new(),
            progress,
        })
    }

    /// Use an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this transfer when fired.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Watch progress as frames are sent.
    pub fn subscribe_progress(&self) -> watch::Receiver<TransferProgress> {
        self.progress.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> SenderState {
        self.state
    }

    /// Number of chunks this transfer will emit.
    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    /// Payload bytes per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Checksum of the compressed payload.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// The Start message for this transfer.
    pub fn start_message(&self) -> StartMessage {
        StartMessage {
            export_id: self.transfer.export_id.clone(),
            total_chunks: self.total_chunks,
            total_bytes: self.transfer.total_bytes,
            compressed_bytes: self.transfer.compressed_bytes(),
            metadata: self.transfer.metadata.clone(),
        }
    }

    /// Chunk `index` of the payload, a zero-copy slice.
    fn chunk(&self, index: u32) -> ChunkMessage {
        let len = self.transfer.payload.len();
        let offset = u64::from(index) * self.chunk_size as u64;
        let start = usize::try_from(offset).map_or(len, |o| o.min(len));
        let end = start.saturating_add(self.chunk_size).min(len);
        ChunkMessage::new(
            self.transfer.export_id.clone(),
            index,
            self.transfer.payload.slice(start..end),
        )
    }

    /// Send the whole transfer over `channel`.
    pub async fn send<C>(&mut self, channel: &C) -> Result<TransferReceipt>
    where
        C: DataChannel + ?Sized,
    {
        if self.state != SenderState::Idle {
            return Err(TransferError::InvalidState("sender already used"));
        }

        let export_id = self.transfer.export_id.clone();
        info!(
            export_id = %export_id,
            chunks = self.total_chunks,
            compressed_bytes = self.transfer.compressed_bytes(),
            "Starting transfer"
        );

        self.state = SenderState::SendingStart;
        let start = self.fail_on_err(self.start_message().encode().map_err(Into::into))?;
        self.emit(channel, start).await?;

        self.state = SenderState::SendingChunks;
        let mut bytes_sent = 0u64;
        for index in 0..self.total_chunks {
            let chunk = self.chunk(index);
            let len = chunk.data.len() as u64;
            self.emit(channel, chunk.encode()).await?;

            bytes_sent += len;
            self.progress.send_replace(TransferProgress {
                chunks_sent: index + 1,
                total_chunks: self.total_chunks,
                bytes_sent,
            });
            debug!(export_id = %export_id, index, "Chunk sent");
        }

        let end = EndMessage {
            export_id: export_id.clone(),
            checksum: self.checksum.clone(),
        };
        let end = self.fail_on_err(end.encode().map_err(Into::into))?;
        self.emit(channel, end).await?;
        self.state = SenderState::SentEnd;

        info!(export_id = %export_id, "Transfer sent");
        self.state = SenderState::Done;

        Ok(TransferReceipt {
            export_id,
            total_chunks: self.total_chunks,
            compressed_bytes: self.transfer.compressed_bytes(),
            checksum: self.checksum.clone(),
        })
    }

    /// Hand one frame to the channel unless cancelled first.
    async fn emit<C>(&mut self, channel: &C, frame: Bytes) -> Result<()>
    where
        C: DataChannel + ?Sized,
    {
        let cancel = self.cancel.clone();
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            sent = channel.send(frame) => sent,
        };
        self.fail_on_err(sent)
    }

    fn fail_on_err<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.state = match e {
                TransferError::Cancelled => SenderState::Cancelled,
                _ => SenderState::Failed,
            };
            warn!(
                export_id = %self.transfer.export_id,
                error = %e,
                "Transfer abandoned"
            );
        }
        result
    }
}
