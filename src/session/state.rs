//! Session roles and state enums

use serde::{Deserialize, Serialize};

/// Which side initiates the first offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Caller,
    Callee,
}

impl Role {
    /// Default glare policy: the callee yields
    pub fn default_polite(&self) -> bool {
        matches!(self, Role::Callee)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Caller => write!(f, "caller"),
            Role::Callee => write!(f, "callee"),
        }
    }
}

/// Offer/answer state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

impl std::fmt::Display for SignalingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalingState::Stable => write!(f, "stable"),
            SignalingState::HaveLocalOffer => write!(f, "have-local-offer"),
            SignalingState::HaveRemoteOffer => write!(f, "have-remote-offer"),
            SignalingState::Closed => write!(f, "closed"),
        }
    }
}

/// ICE connection state as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

impl IceConnectionState {
    /// Media can flow
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            IceConnectionState::Connected | IceConnectionState::Completed
        )
    }
}

impl std::fmt::Display for IceConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IceConnectionState::New => write!(f, "new"),
            IceConnectionState::Checking => write!(f, "checking"),
            IceConnectionState::Connected => write!(f, "connected"),
            IceConnectionState::Completed => write!(f, "completed"),
            IceConnectionState::Failed => write!(f, "failed"),
            IceConnectionState::Disconnected => write!(f, "disconnected"),
            IceConnectionState::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_string(&SignalingState::HaveLocalOffer).unwrap(),
            "\"have-local-offer\""
        );
        assert_eq!(SignalingState::HaveRemoteOffer.to_string(), "have-remote-offer");
        assert_eq!(
            serde_json::to_string(&IceConnectionState::Disconnected).unwrap(),
            "\"disconnected\""
        );
    }

    #[test]
    fn test_default_polite() {
        assert!(Role::Callee.default_polite());
        assert!(!Role::Caller.default_polite());
    }
}
