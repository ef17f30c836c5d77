use serde::{Deserialize, Serialize};

use crate::media::MediaConstraints;
use crate::session::candidates::DEFAULT_CANDIDATE_QUEUE_CAPACITY;
use crate::session::Role;
use crate::signaling::DEFAULT_CHANNEL_CAPACITY;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// Peer connection settings
    pub rtc: RtcConfig,
    /// Signaling relay settings
    pub signaling: SignalingConfig,
    /// Default capture request
    pub media: MediaConstraints,
    /// Session policy
    pub session: SessionSettings,
}

/// Peer connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcConfig {
    /// STUN server URLs
    pub stun_servers: Vec<String>,
    /// TURN server configuration
    pub turn_servers: Vec<TurnServer>,
    /// mDNS candidate handling
    pub mdns_mode: MdnsMode,
    /// Remote candidates held until a remote description exists
    pub candidate_queue_capacity: usize,
}

impl Default for RtcConfig {
    fn default() -> Self {
        Self {
            // Host candidates are enough on a LAN; configure STUN/TURN for remote peers
            stun_servers: vec![],
            turn_servers: vec![],
            mdns_mode: MdnsMode::QueryOnly,
            candidate_queue_capacity: DEFAULT_CANDIDATE_QUEUE_CAPACITY,
        }
    }
}

/// TURN server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnServer {
    /// TURN server URLs (e.g., ["turn:turn.example.com:3478?transport=udp"])
    pub urls: Vec<String>,
    /// Username for TURN authentication
    pub username: String,
    /// Credential for TURN authentication
    pub credential: String,
}

impl TurnServer {
    pub fn new(url: String, username: String, credential: String) -> Self {
        Self {
            urls: vec![url],
            username,
            credential,
        }
    }
}

/// mDNS mode for ICE host candidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MdnsMode {
    Disabled,
    /// Resolve `.local` candidates but gather plain host addresses
    #[default]
    QueryOnly,
    QueryAndGather,
}

/// Signaling relay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// WebSocket relay URL (e.g., "ws://127.0.0.1:8443/call/room-1")
    pub url: Option<String>,
    /// Capacity of the inbound/outbound queues
    pub channel_capacity: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Session policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub role: Role,
    /// Glare policy override; by default the callee is polite
    pub polite: Option<bool>,
    /// Tear the session down when ICE fails
    pub close_on_failure: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            role: Role::Caller,
            polite: None,
            close_on_failure: true,
        }
    }
}
