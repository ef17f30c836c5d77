//! Peer connection seam
//!
//! [`PeerTransport`] is the connection resource a session owns. Host callbacks
//! (gathered candidates, incoming tracks, ICE state) are delivered in order on
//! the [`TransportEvents`] channel created alongside the transport.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::state::IceConnectionState;
use crate::error::Result;
use crate::events::RemoteTrackInfo;
use crate::media::LocalTrack;
use crate::signaling::{IceCandidate, SessionDescription};

/// Event raised by the underlying connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Local candidate gathered; `None` when gathering completes
    CandidateGenerated(Option<IceCandidate>),
    TrackAdded(RemoteTrackInfo),
    IceStateChanged(IceConnectionState),
}

pub type TransportEvents = mpsc::UnboundedReceiver<TransportEvent>;
pub type TransportEventSender = mpsc::UnboundedSender<TransportEvent>;

/// Create the ordered event channel for a transport
pub fn event_channel() -> (TransportEventSender, TransportEvents) {
    mpsc::unbounded_channel()
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: &SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()>;

    /// Discard the pending local or remote offer and return to stable
    async fn rollback(&self) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()>;

    async fn add_track(&self, track: &LocalTrack) -> Result<()>;

    /// Swap the track on the sender currently carrying `old`
    ///
    /// Must not change transceiver direction or trigger renegotiation.
    async fn replace_track(&self, old: &LocalTrack, new: &LocalTrack) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
