//! Connection handles.
//!
//! A [`Connection`] is the socket-side object a host keeps for each peer. It
//! outlives broker state: after the host suspends and resumes, the same
//! handle comes back with its attachment intact while the registry starts
//! empty.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::attachment::Attachment;
use crate::error::BrokerError;
use crate::Result;

/// Unique identifier for a connection.
pub type ConnectionId = String;

/// A live link to one peer.
#[derive(Debug)]
pub struct Connection {
    /// Unique connection identifier.
    pub id: ConnectionId,
    /// Outbound queue drained by the socket writer.
    sender: mpsc::UnboundedSender<String>,
    /// Serialized [`Attachment`], kept by the host across suspension.
    attachment: Mutex<Option<String>>,
}

impl Connection {
    /// Create a connection with an outbound queue.
    pub fn new(id: ConnectionId, sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id,
            sender,
            attachment: Mutex::new(None),
        }
    }

    /// Queue a message for this peer.
    pub fn send(&self, message: String) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| BrokerError::ChannelClosed)
    }

    /// True once the socket writer has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Persist `attachment` on this connection.
    pub fn serialize_attachment(&self, attachment: &Attachment) -> Result<()> {
        let json = attachment.to_json()?;
        *self.attachment.lock() = Some(json);
        Ok(())
    }

    /// Read back the stored attachment, if any.
    pub fn deserialize_attachment(&self) -> Result<Option<Attachment>> {
        let stored = self.attachment.lock().clone();
        stored.as_deref().map(Attachment::from_json).transpose()
    }

    /// Raw stored attachment.
    pub fn raw_attachment(&self) -> Option<String> {
        self.attachment.lock().clone()
    }

    /// Overwrite the raw stored attachment.
    pub fn set_raw_attachment(&self, raw: Option<String>) {
        *self.attachment.lock() = raw;
    }

    /// Drop the stored attachment.
    pub fn clear_attachment(&self) {
        self.attachment.lock().take();
    }
}

/// Handle for receiving messages queued for a connection.
pub type ConnectionReceiver = mpsc::UnboundedReceiver<String>;

/// Create a connection with its message receiver.
pub fn create_connection(id: ConnectionId) -> (Arc<Connection>, ConnectionReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let connection = Arc::new(Connection::new(id, sender));
    (connection, receiver)
}
