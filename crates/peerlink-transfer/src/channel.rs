//! The direct peer data channel.
//!
//! The channel is ordered and reliable; sessions never acknowledge or
//! retransmit on top of it.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{Result, TransferError};

/// Outbound half of a direct peer channel.
#[async_trait]
pub trait DataChannel: Send + Sync {
    /// Send one binary frame.
    async fn send(&self, frame: Bytes) -> Result<()>;
}

#[async_trait]
impl DataChannel for mpsc::Sender<Bytes> {
    async fn send(&self, frame: Bytes) -> Result<()> {
        mpsc::Sender::send(self, frame)
            .await
            .map_err(|_| TransferError::ChannelClosed)
    }
}

#[async_trait]
impl DataChannel for mpsc::UnboundedSender<Bytes> {
    async fn send(&self, frame: Bytes) -> Result<()> {
        mpsc::UnboundedSender::send(self, frame).map_err(|_| TransferError::ChannelClosed)
    }
}
