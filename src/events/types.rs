//! Session event types
//!
//! Everything the UI layer can observe about a call is published as one of
//! these events.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::media::MediaKind;
use crate::session::{IceConnectionState, SignalingState};
use crate::signaling::IceCandidate;

/// Remote track description carried by `session.track_added`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTrackInfo {
    pub id: String,
    pub kind: MediaKind,
    pub stream_id: String,
}

/// Session event enumeration
///
/// Tagged with the event name for serialization:
/// ```json
/// {
///   "event": "session.ice_state_changed",
///   "data": { "session_id": "...", "state": "connected" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    // ============================================================================
    // Negotiation
    // ============================================================================
    #[serde(rename = "session.signaling_state_changed")]
    SignalingStateChanged {
        session_id: String,
        state: SignalingState,
    },

    /// A local candidate was gathered and handed to signaling
    ///
    /// `candidate` is `None` when gathering finished.
    #[serde(rename = "session.candidate_generated")]
    CandidateGenerated {
        session_id: String,
        candidate: Option<IceCandidate>,
    },

    // ============================================================================
    // Connection
    // ============================================================================
    #[serde(rename = "session.ice_state_changed")]
    IceStateChanged {
        session_id: String,
        state: IceConnectionState,
    },

    /// ICE failed; the session is unusable and should be torn down
    #[serde(rename = "session.connection_failed")]
    ConnectionFailed { session_id: String, reason: String },

    #[serde(rename = "session.closed")]
    Closed { session_id: String },

    // ============================================================================
    // Media
    // ============================================================================
    /// The remote peer started sending a track
    #[serde(rename = "session.track_added")]
    TrackAdded {
        session_id: String,
        track: RemoteTrackInfo,
    },

    /// Capture or enumeration failed
    #[serde(rename = "media.device_error")]
    DeviceError {
        kind: Option<MediaKind>,
        device_id: Option<String>,
        error_kind: ErrorKind,
        message: String,
    },

    #[serde(rename = "media.track_toggled")]
    TrackToggled { kind: MediaKind, enabled: bool },

    /// The outbound track of `kind` now comes from a different device
    #[serde(rename = "media.track_switched")]
    TrackSwitched {
        kind: MediaKind,
        old_track: String,
        new_track: String,
        device_id: String,
    },
}

impl SessionEvent {
    /// Get the event name (for filtering/routing)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SignalingStateChanged { .. } => "session.signaling_state_changed",
            Self::CandidateGenerated { .. } => "session.candidate_generated",
            Self::IceStateChanged { .. } => "session.ice_state_changed",
            Self::ConnectionFailed { .. } => "session.connection_failed",
            Self::Closed { .. } => "session.closed",
            Self::TrackAdded { .. } => "session.track_added",
            Self::DeviceError { .. } => "media.device_error",
            Self::TrackToggled { .. } => "media.track_toggled",
            Self::TrackSwitched { .. } => "media.track_switched",
        }
    }

    /// Session this event belongs to, if any
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::SignalingStateChanged { session_id, .. }
            | Self::CandidateGenerated { session_id, .. }
            | Self::IceStateChanged { session_id, .. }
            | Self::ConnectionFailed { session_id, .. }
            | Self::Closed { session_id }
            | Self::TrackAdded { session_id, .. } => Some(session_id),
            Self::DeviceError { .. } | Self::TrackToggled { .. } | Self::TrackSwitched { .. } => {
                None
            }
        }
    }

    /// Whether the UI should treat this as a terminal failure
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Closed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization() {
        let event = SessionEvent::IceStateChanged {
            session_id: "s1".to_string(),
            state: IceConnectionState::Connected,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("session.ice_state_changed"));
        assert!(json.contains("\"connected\""));

        let event = SessionEvent::DeviceError {
            kind: Some(MediaKind::Video),
            device_id: Some("device-42".to_string()),
            error_kind: ErrorKind::DeviceAccess,
            message: "busy".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("media.device_error"));
        assert!(json.contains("device_access"));
    }

    #[test]
    fn test_event_name_matches_tag() {
        let event = SessionEvent::Closed {
            session_id: "s1".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], event.event_name());
        assert_eq!(event.session_id(), Some("s1"));
        assert!(event.is_terminal());
    }
}
