//! Demultiplexing of the shared peer data channel.
//!
//! Every inbound frame is routed on its first byte before anything else
//! touches it. Transfer discriminators go to the local receiver; all other
//! frames are forwarded byte-for-byte to the replication protocol.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use peerlink_protocol::{decode_any, is_transfer_byte};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TransferConfig;
use crate::receiver::{CompletedTransfer, ReceiveOutcome, ReceiverState, TransferReceiver};
use crate::TransferError;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

/// The co-resident replication protocol.
pub trait ReplicationHandler: Send + Sync + 'static {
    /// Consume one replication frame, exactly as received.
    fn handle(&self, frame: Bytes);
}

/// Consumer of finished transfers.
pub trait TransferSink: Send + Sync + 'static {
    /// A transfer verified.
    fn on_complete(&self, transfer: CompletedTransfer);

    /// A transfer was rejected or abandoned.
    fn on_failed(&self, export_id: &str, error: &TransferError);
}

/// Where a frame went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Forwarded to the replication handler.
    Replication,
    /// Decoded and fed to the transfer receiver.
    Transfer,
    /// Carried a transfer discriminator but failed to decode.
    Dropped,
}

/// Routes frames from one peer data channel.
pub struct ChannelDispatcher {
    replication: Arc<dyn ReplicationHandler>,
    sink: Arc<dyn TransferSink>,
    receiver: TransferReceiver,
    sweep_interval: Duration,
}

impl ChannelDispatcher {
    /// Create a dispatcher for one peer link.
    pub fn new(
        config: TransferConfig,
        replication: Arc<dyn ReplicationHandler>,
        sink: Arc<dyn TransferSink>,
    ) -> Self {
        let sweep_interval = (config.idle_timeout / 4).max(MIN_SWEEP_INTERVAL);
        Self {
            replication,
            sink,
            receiver: TransferReceiver::new(config),
            sweep_interval,
        }
    }

    /// State of the transfer receiver.
    pub fn receiver_state(&self) -> ReceiverState {
        self.receiver.state()
    }

    /// Route one inbound frame.
    pub fn dispatch(&mut self, frame: Bytes) -> Route {
        match frame.first() {
            Some(&b) if is_transfer_byte(b) => {}
            _ => {
                self.replication.handle(frame);
                return Route::Replication;
            }
        }

        match decode_any(&frame) {
            Ok(message) => {
                if let Some(outcome) = self.receiver.handle(message) {
                    self.deliver(outcome);
                }
                Route::Transfer
            }
            Err(e) => {
                warn!(error = %e, len = frame.len(), "Dropping malformed transfer frame");
                Route::Dropped
            }
        }
    }

    /// Release a transfer that has gone idle.
    pub fn sweep(&mut self) {
        if let Some(outcome) = self.receiver.expire_idle() {
            self.deliver(outcome);
        }
    }

    /// Pump `frames` until the stream ends or `cancel` fires.
    pub async fn run(mut self, mut frames: mpsc::Receiver<Bytes>, cancel: CancellationToken) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Channel dispatcher started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Channel dispatcher cancelled");
                    break;
                }
                frame = frames.recv() => match frame {
                    Some(frame) => {
                        self.dispatch(frame);
                    }
                    None => {
                        debug!("Data channel closed");
                        break;
                    }
                },
                _ = sweep.tick() => self.sweep(),
            }
        }

        info!("Channel dispatcher stopped");
    }

    fn deliver(&self, outcome: ReceiveOutcome) {
        match outcome {
            ReceiveOutcome::Completed(transfer) => self.sink.on_complete(transfer),
            ReceiveOutcome::Failed { export_id, error } => {
                self.sink.on_failed(&export_id, &error)
            }
        }
    }
}
