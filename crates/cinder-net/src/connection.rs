//! Outbound side of a TCP client, as seen by the simulation.

use std::sync::Arc;

use cinder_protocol::{Connection, Record, SendError};
use tokio::sync::{mpsc, watch};

use crate::ConnectionId;

/// A client connection fed through a bounded queue drained by the
/// connection's writer task.
///
/// `send` never blocks: when the queue is full the client is considered too
/// slow, the connection is closed and the record is dropped.
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    id: ConnectionId,
    tx: mpsc::Sender<Record>,
    closed: Arc<watch::Sender<bool>>,
}

impl ChannelConnection {
    /// Creates a connection with room for `capacity` queued records, and the
    /// receiving end for the writer task.
    pub fn new(id: ConnectionId, capacity: usize) -> (Self, mpsc::Receiver<Record>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        (
            Self {
                id,
                tx,
                closed: Arc::new(closed),
            },
            rx,
        )
    }

    /// Transport-level id of this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Resolves once the connection has been closed from either side.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so `wait_for` cannot fail here.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Connection for ChannelConnection {
    fn send(&self, record: Record) -> Result<(), SendError> {
        if !self.is_connected() {
            return Err(SendError::Closed);
        }
        match self.tx.try_send(record) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("outbound queue of {:?} is full, disconnecting", self.id);
                self.close();
                Err(SendError::Backpressure)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.close();
                Err(SendError::Closed)
            }
        }
    }

    fn is_connected(&self) -> bool {
        !*self.closed.borrow()
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }
}
