//! Per-session send gate.
//!
//! Both the command loop and the upstream pump write to the client through a
//! [`SendGate`]. The gate feeds a single writer task, so frames from the two
//! producers are serialized and never interleave on the socket.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use super::messages::{RelayOutgoingMessage, RelayRoute};

/// Default capacity of the queue between a gate and its writer.
pub const GATE_CHANNEL_CAPACITY: usize = 1024;

/// The client transport can no longer be written to or read from.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("Client transport closed")]
    Closed,

    #[error("Client transport error: {0}")]
    Failed(String),
}

/// Cloneable write handle for one client connection.
#[derive(Debug, Clone)]
pub struct SendGate {
    tx: mpsc::Sender<RelayRoute>,
}

impl SendGate {
    pub fn new(tx: mpsc::Sender<RelayRoute>) -> Self {
        Self { tx }
    }

    /// Create a gate and the receiver its writer task drains.
    pub fn channel(capacity: usize) -> (SendGate, mpsc::Receiver<RelayRoute>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Queue one message for the client.
    pub async fn send(&self, message: RelayOutgoingMessage) -> Result<(), TransportError> {
        self.tx
            .send(RelayRoute::Outgoing(message))
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Ask the writer to close the client transport.
    ///
    /// Non-blocking so it can run while the registry lock is held. Returns
    /// false if the writer is already gone or its queue is full.
    pub fn close(&self) -> bool {
        match self.tx.try_send(RelayRoute::Close) {
            Ok(()) => true,
            Err(e) => {
                debug!("Close request not queued: {}", e);
                false
            }
        }
    }

    /// Whether the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_keep_order() {
        let (gate, mut rx) = SendGate::channel(8);
        let other = gate.clone();

        gate.send(RelayOutgoingMessage::error("one")).await.unwrap();
        other.send(RelayOutgoingMessage::error("two")).await.unwrap();

        assert_eq!(
            rx.recv().await,
            Some(RelayRoute::Outgoing(RelayOutgoingMessage::error("one")))
        );
        assert_eq!(
            rx.recv().await,
            Some(RelayRoute::Outgoing(RelayOutgoingMessage::error("two")))
        );
    }

    #[tokio::test]
    async fn test_close_route() {
        let (gate, mut rx) = SendGate::channel(8);
        assert!(gate.close());
        assert_eq!(rx.recv().await, Some(RelayRoute::Close));
    }

    #[tokio::test]
    async fn test_send_after_writer_gone() {
        let (gate, rx) = SendGate::channel(8);
        drop(rx);

        assert!(gate.is_closed());
        assert_eq!(
            gate.send(RelayOutgoingMessage::error("lost")).await,
            Err(TransportError::Closed)
        );
        assert!(!gate.close());
    }
}
