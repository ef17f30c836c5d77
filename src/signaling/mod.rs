//! Signaling channel
//!
//! Typed send/receive surface over an external transport. The channel knows
//! nothing about session state; it only moves [`SignalingMessage`]s.
//!
//! ```text
//! PeerSession --SignalSender--> outbound mpsc --> transport pump --> remote
//! remote --> transport pump --> inbound mpsc --> SignalingChannel::recv
//! ```

pub mod types;
pub mod websocket;

pub use types::{IceCandidate, SdpType, SessionDescription, SignalingMessage};

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{CallError, Result};

/// Default capacity of the signaling queues
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Cloneable sending half handed to sessions
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::Sender<SignalingMessage>,
}

impl SignalSender {
    pub fn new(tx: mpsc::Sender<SignalingMessage>) -> Self {
        Self { tx }
    }

    /// Transmit a message to the remote peer
    pub async fn send(&self, message: SignalingMessage) -> Result<()> {
        debug!("Sending signal: {}", message.event_name());
        self.tx
            .send(message)
            .await
            .map_err(|e| CallError::Signaling(format!("Signaling channel closed: {}", e)))
    }

    /// Whether the transport side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Bidirectional signaling channel
pub struct SignalingChannel {
    sender: SignalSender,
    receiver: mpsc::Receiver<SignalingMessage>,
}

impl SignalingChannel {
    /// Wrap an outbound sender and an inbound receiver fed by a transport
    pub fn new(
        outbound: mpsc::Sender<SignalingMessage>,
        inbound: mpsc::Receiver<SignalingMessage>,
    ) -> Self {
        Self {
            sender: SignalSender::new(outbound),
            receiver: inbound,
        }
    }

    /// Two channels wired back to back in memory
    pub fn memory_pair(capacity: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(capacity);
        let (b_tx, a_rx) = mpsc::channel(capacity);
        (Self::new(a_tx, a_rx), Self::new(b_tx, b_rx))
    }

    /// Connect to a WebSocket signaling relay
    pub async fn connect_websocket(url: &str, capacity: usize) -> Result<Self> {
        websocket::connect(url, capacity).await
    }

    /// Sending half for a session
    pub fn sender(&self) -> SignalSender {
        self.sender.clone()
    }

    pub async fn send(&self, message: SignalingMessage) -> Result<()> {
        self.sender.send(message).await
    }

    /// Next message from the remote peer, `None` once the transport is gone
    pub async fn recv(&mut self) -> Option<SignalingMessage> {
        let message = self.receiver.recv().await;
        if let Some(ref m) = message {
            debug!("Received signal: {}", m.event_name());
        }
        message
    }

    pub fn split(self) -> (SignalSender, mpsc::Receiver<SignalingMessage>) {
        (self.sender, self.receiver)
    }
}
