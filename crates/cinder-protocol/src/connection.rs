//! The outbound seam between the simulation and a client transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender};

use crate::Record;

/// Reasons an outbound record could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The connection is closed; the record was dropped.
    #[error("connection closed")]
    Closed,
    /// The outbound queue is full; the connection has been closed.
    #[error("outbound queue full")]
    Backpressure,
}

/// A client connection that accepts structured records.
///
/// `send` must never block the caller: it either queues the record or fails.
/// Delivery is ordered per connection.
pub trait Connection: Send {
    /// Queues `record` for delivery.
    fn send(&self, record: Record) -> Result<(), SendError>;

    /// Whether the peer is still reachable.
    fn is_connected(&self) -> bool;

    /// Closes the connection. Later sends fail with [`SendError::Closed`].
    fn close(&self);
}

/// In-process connection backed by an unbounded channel. The receiving half
/// sees records in send order.
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    tx: Sender<Record>,
    open: Arc<AtomicBool>,
}

impl MemoryConnection {
    /// Creates a connection and the receiver observing its records.
    pub fn pair() -> (Self, Receiver<Record>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (
            Self {
                tx,
                open: Arc::new(AtomicBool::new(true)),
            },
            rx,
        )
    }
}

impl Connection for MemoryConnection {
    fn send(&self, record: Record) -> Result<(), SendError> {
        if !self.is_connected() {
            return Err(SendError::Closed);
        }
        self.tx.send(record).map_err(|_| {
            self.open.store(false, Ordering::Release);
            SendError::Closed
        })
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}
