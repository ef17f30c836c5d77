//! Peer session module
//!
//! One [`PeerSession`] per call. It owns the peer connection (behind the
//! [`PeerTransport`] seam), walks the offer/answer state machine and buffers
//! remote ICE candidates until a remote description exists.
//!
//! Architecture:
//! ```text
//! SignalingChannel --recv--> PeerSession::handle_signal
//!                                  |
//!                                  v
//!                      PeerTransport (RtcPeerTransport)
//!                                  |
//!             TransportEvents (candidates, tracks, ICE state)
//!                                  |
//!                                  v
//!           SignalSender (to peer) + EventBus (to the UI layer)
//! ```

pub mod candidates;
#[cfg(test)]
pub(crate) mod fake;
pub mod mdns;
pub mod peer;
pub mod remote;
pub mod rtc;
pub mod state;
pub mod transport;

pub use peer::{PeerSession, SessionConfig, SessionInfo};
pub use remote::RemoteStream;
pub use rtc::RtcPeerTransport;
pub use state::{IceConnectionState, Role, SignalingState};
pub use transport::{PeerTransport, TransportEvent, TransportEvents};
