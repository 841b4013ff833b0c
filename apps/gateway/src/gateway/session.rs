//! Per-connection outbound channel.
//!
//! Every event destined for a connection goes through a bounded queue drained
//! by that connection's writer task. Producers never wait: when a peer stalls
//! and its queue fills up, further events for that peer are dropped.

use std::sync::Arc;

use roomcast_common::ConnectionId;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::events::ServerEvent;

/// An item queued for the writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    Event(Arc<ServerEvent>),
    Ping,
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Peer's queue was full; the event was discarded.
    Dropped,
    /// Writer task is gone (connection closing or closed).
    Closed,
    /// No such connection is registered.
    Missed,
}

/// Sending half of a connection's outbound queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionSender {
    /// Create a sender with a fresh connection id and its matching receiver.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        Self::with_id(ConnectionId::generate(), capacity)
    }

    pub fn with_id(id: ConnectionId, capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn deliver(&self, event: Arc<ServerEvent>) -> Delivery {
        self.push(Outbound::Event(event))
    }

    pub fn ping(&self) -> Delivery {
        self.push(Outbound::Ping)
    }

    fn push(&self, item: Outbound) -> Delivery {
        match self.tx.try_send(item) {
            Ok(()) => Delivery::Sent,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %self.id, "outbound queue full, dropping event");
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}
