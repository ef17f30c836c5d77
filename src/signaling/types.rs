//! Signaling message types

use serde::{Deserialize, Serialize};

use crate::error::{CallError, Result};

/// Signaling events exchanged between the two participants
///
/// Serialized as `{"event": "offer", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SignalingMessage {
    #[serde(rename = "offer")]
    Offer(SessionDescription),
    #[serde(rename = "answer")]
    Answer(SessionDescription),
    /// `None` is the end-of-candidates sentinel
    #[serde(rename = "ice-candidate")]
    IceCandidate(Option<IceCandidate>),
    /// The remote side ended the call
    #[serde(rename = "hangup")]
    Hangup,
}

impl SignalingMessage {
    /// Event name on the wire
    pub fn event_name(&self) -> &'static str {
        match self {
            SignalingMessage::Offer(_) => "offer",
            SignalingMessage::Answer(_) => "answer",
            SignalingMessage::IceCandidate(_) => "ice-candidate",
            SignalingMessage::Hangup => "hangup",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl std::fmt::Display for SdpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdpType::Offer => write!(f, "offer"),
            SdpType::Answer => write!(f, "answer"),
        }
    }
}

/// Session description (offer or answer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// SDP content
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Check that this is a well-formed description of the expected type
    pub fn validate(&self, expected: SdpType) -> Result<()> {
        if self.sdp_type != expected {
            return Err(CallError::Negotiation(format!(
                "Expected {} description, got {}",
                expected, self.sdp_type
            )));
        }
        if !self.sdp.trim_start().starts_with("v=") {
            return Err(CallError::Negotiation(format!(
                "Malformed {} description: missing version line",
                self.sdp_type
            )));
        }
        Ok(())
    }
}

/// ICE candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate string
    pub candidate: String,
    /// SDP mid (media ID)
    #[serde(rename = "sdpMid")]
    pub sdp_mid: Option<String>,
    /// SDP mline index
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    /// Username fragment
    #[serde(rename = "usernameFragment", default)]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }

    pub fn with_mid(mut self, mid: impl Into<String>, index: u16) -> Self {
        self.sdp_mid = Some(mid.into());
        self.sdp_mline_index = Some(index);
        self
    }

    /// An empty candidate string also marks end-of-candidates
    pub fn is_end_of_candidates(&self) -> bool {
        self.candidate.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let msg = SignalingMessage::Offer(SessionDescription::offer("v=0\r\n"));
        let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["event"], "offer");
        assert_eq!(json["data"]["type"], "offer");
        assert_eq!(json["data"]["sdp"], "v=0\r\n");
    }

    #[test]
    fn test_candidate_sentinel() {
        let msg = SignalingMessage::from_json(r#"{"event":"ice-candidate","data":null}"#).unwrap();
        assert_eq!(msg, SignalingMessage::IceCandidate(None));
        assert_eq!(msg.event_name(), "ice-candidate");

        let msg = SignalingMessage::from_json(
            r#"{"event":"ice-candidate","data":{"candidate":"candidate:1 1 udp 1 10.0.0.1 5000 typ host","sdpMid":"0","sdpMLineIndex":0}}"#,
        )
        .unwrap();
        match msg {
            SignalingMessage::IceCandidate(Some(c)) => {
                assert_eq!(c.sdp_mid.as_deref(), Some("0"));
                assert!(c.username_fragment.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_hangup() {
        let msg = SignalingMessage::from_json(r#"{"event":"hangup"}"#).unwrap();
        assert_eq!(msg, SignalingMessage::Hangup);
    }

    #[test]
    fn test_validate_description() {
        assert!(SessionDescription::offer("v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\n")
            .validate(SdpType::Offer)
            .is_ok());
        assert!(SessionDescription::offer("garbage")
            .validate(SdpType::Offer)
            .is_err());
        assert!(SessionDescription::answer("v=0\r\n")
            .validate(SdpType::Offer)
            .is_err());
    }

    #[test]
    fn test_empty_candidate_is_sentinel() {
        assert!(IceCandidate::new("  ").is_end_of_candidates());
        assert!(!IceCandidate::new("candidate:1").with_mid("0", 0).is_end_of_candidates());
    }
}
