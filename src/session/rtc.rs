//! WebRTC peer connection transport

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::ice::mdns::MulticastDnsMode;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_remote::TrackRemote;

use super::mdns::{default_mdns_host_name, effective_mdns_mode};
use super::state::IceConnectionState;
use super::transport::{event_channel, PeerTransport, TransportEvent, TransportEvents};
use crate::config::RtcConfig;
use crate::error::{CallError, Result};
use crate::events::RemoteTrackInfo;
use crate::media::{LocalTrack, MediaKind};
use crate::signaling::{IceCandidate, SdpType, SessionDescription};

impl From<RTCIceConnectionState> for IceConnectionState {
    fn from(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::Checking => IceConnectionState::Checking,
            RTCIceConnectionState::Connected => IceConnectionState::Connected,
            RTCIceConnectionState::Completed => IceConnectionState::Completed,
            RTCIceConnectionState::Failed => IceConnectionState::Failed,
            RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
            RTCIceConnectionState::Closed => IceConnectionState::Closed,
            _ => IceConnectionState::New,
        }
    }
}

/// ICE server list from configuration
pub fn ice_servers(config: &RtcConfig) -> Vec<RTCIceServer> {
    let mut servers = vec![];

    for stun_url in &config.stun_servers {
        servers.push(RTCIceServer {
            urls: vec![stun_url.clone()],
            ..Default::default()
        });
    }

    for turn in &config.turn_servers {
        servers.push(RTCIceServer {
            urls: turn.urls.clone(),
            username: turn.username.clone(),
            credential: turn.credential.clone(),
            ..Default::default()
        });
    }

    servers
}

fn to_rtc_description(description: &SessionDescription) -> Result<RTCSessionDescription> {
    let parsed = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp.clone()),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp.clone()),
    };
    parsed.map_err(|e| {
        CallError::Negotiation(format!("Invalid SDP {}: {}", description.sdp_type, e))
    })
}

fn from_rtc_description(description: RTCSessionDescription) -> Result<SessionDescription> {
    match description.sdp_type {
        RTCSdpType::Offer => Ok(SessionDescription::offer(description.sdp)),
        RTCSdpType::Answer => Ok(SessionDescription::answer(description.sdp)),
        other => Err(CallError::Internal(format!(
            "Unexpected description type: {}",
            other
        ))),
    }
}

fn to_candidate_init(candidate: &IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate.clone(),
        sdp_mid: candidate.sdp_mid.clone(),
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: candidate.username_fragment.clone(),
    }
}

/// Peer connection backed by webrtc-rs
pub struct RtcPeerTransport {
    session_id: String,
    pc: Arc<RTCPeerConnection>,
    /// Senders keyed by the local track they currently carry
    senders: Mutex<HashMap<String, Arc<RTCRtpSender>>>,
}

impl RtcPeerTransport {
    /// Create a new peer connection and its ordered event channel
    pub async fn new(config: &RtcConfig, session_id: &str) -> Result<(Arc<Self>, TransportEvents)> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| CallError::Internal(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(|e| {
            CallError::Internal(format!("Failed to register interceptors: {}", e))
        })?;

        let mut setting_engine = SettingEngine::default();
        let mode = effective_mdns_mode(config.mdns_mode);
        setting_engine.set_ice_multicast_dns_mode(mode);
        if mode == MulticastDnsMode::QueryAndGather {
            setting_engine.set_multicast_dns_host_name(default_mdns_host_name(session_id));
        }
        debug!("WebRTC mDNS mode: {:?} (session {})", mode, session_id);

        let api = APIBuilder::new()
            .with_setting_engine(setting_engine)
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers(config),
            ..Default::default()
        };

        let pc = api.new_peer_connection(rtc_config).await.map_err(|e| {
            CallError::Internal(format!("Failed to create peer connection: {}", e))
        })?;

        let transport = Arc::new(Self {
            session_id: session_id.to_string(),
            pc: Arc::new(pc),
            senders: Mutex::new(HashMap::new()),
        });
        let events = transport.setup_event_handlers();

        info!("Peer connection created for session {}", session_id);
        Ok((transport, events))
    }

    /// Route connection callbacks into one ordered channel
    fn setup_event_handlers(&self) -> TransportEvents {
        let (tx, rx) = event_channel();

        let candidates = tx.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                let candidates = candidates.clone();

                Box::pin(async move {
                    let candidate = match candidate {
                        Some(c) => match c.to_json() {
                            Ok(init) => Some(IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                                username_fragment: init.username_fragment,
                            }),
                            Err(e) => {
                                warn!("Failed to serialize local candidate: {}", e);
                                return;
                            }
                        },
                        None => None,
                    };
                    let _ = candidates.send(TransportEvent::CandidateGenerated(candidate));
                })
            }));

        let tracks = tx.clone();
        let session_id = self.session_id.clone();
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let tracks = tracks.clone();
                let session_id = session_id.clone();

                Box::pin(async move {
                    let kind = match track.kind() {
                        RTPCodecType::Audio => MediaKind::Audio,
                        RTPCodecType::Video => MediaKind::Video,
                        _ => return,
                    };
                    let info = RemoteTrackInfo {
                        id: track.id().to_string(),
                        kind,
                        stream_id: track.stream_id().to_string(),
                    };
                    debug!("Session {} remote {} track {}", session_id, kind, info.id);
                    let _ = tracks.send(TransportEvent::TrackAdded(info));
                })
            },
        ));

        let states = tx;
        self.pc
            .on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                let states = states.clone();

                Box::pin(async move {
                    if state == RTCIceConnectionState::Unspecified {
                        return;
                    }
                    let _ = states.send(TransportEvent::IceStateChanged(state.into()));
                })
            }));

        rx
    }
}

#[async_trait]
impl PeerTransport for RtcPeerTransport {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| CallError::Negotiation(format!("Failed to create offer: {}", e)))?;
        from_rtc_description(offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| CallError::Negotiation(format!("Failed to create answer: {}", e)))?;
        from_rtc_description(answer)
    }

    async fn set_local_description(&self, description: &SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.pc.set_local_description(description).await.map_err(|e| {
            CallError::Negotiation(format!("Failed to set local description: {}", e))
        })
    }

    async fn set_remote_description(&self, description: &SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.pc.set_remote_description(description).await.map_err(|e| {
            CallError::Negotiation(format!("Failed to set remote description: {}", e))
        })
    }

    async fn rollback(&self) -> Result<()> {
        let mut rollback = RTCSessionDescription::default();
        rollback.sdp_type = RTCSdpType::Rollback;

        let result = match self.pc.signaling_state() {
            RTCSignalingState::HaveLocalOffer => self.pc.set_local_description(rollback).await,
            RTCSignalingState::HaveRemoteOffer => self.pc.set_remote_description(rollback).await,
            _ => return Ok(()),
        };
        result.map_err(|e| CallError::Negotiation(format!("Rollback failed: {}", e)))
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        self.pc
            .add_ice_candidate(to_candidate_init(candidate))
            .await
            .map_err(|e| CallError::Negotiation(format!("Failed to add ICE candidate: {}", e)))
    }

    async fn add_track(&self, track: &LocalTrack) -> Result<()> {
        let sender = self.pc.add_track(track.rtc_track()).await.map_err(|e| {
            CallError::Negotiation(format!("Failed to add {} track: {}", track.kind(), e))
        })?;
        self.senders.lock().insert(track.id().to_string(), sender);
        Ok(())
    }

    async fn replace_track(&self, old: &LocalTrack, new: &LocalTrack) -> Result<()> {
        let sender = self.senders.lock().remove(old.id()).ok_or_else(|| {
            CallError::Negotiation(format!("Track {} has no sender", old.id()))
        })?;

        if let Err(e) = sender.replace_track(Some(new.rtc_track())).await {
            self.senders.lock().insert(old.id().to_string(), sender);
            return Err(CallError::Negotiation(format!(
                "Failed to replace {} track: {}",
                old.kind(),
                e
            )));
        }

        self.senders.lock().insert(new.id().to_string(), sender);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.senders.lock().clear();
        self.pc
            .close()
            .await
            .map_err(|e| CallError::Internal(format!("Failed to close peer connection: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TurnServer;

    #[test]
    fn test_ice_servers() {
        let config = RtcConfig {
            stun_servers: vec!["stun:stun.example.com:3478".to_string()],
            turn_servers: vec![TurnServer::new(
                "turn:turn.example.com:3478".to_string(),
                "user".to_string(),
                "secret".to_string(),
            )],
            ..Default::default()
        };

        let servers = ice_servers(&config);
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].urls, vec!["stun:stun.example.com:3478"]);
        assert_eq!(servers[1].username, "user");
        assert_eq!(servers[1].credential, "secret");
    }

    #[test]
    fn test_ice_state_mapping() {
        assert_eq!(
            IceConnectionState::from(RTCIceConnectionState::Completed),
            IceConnectionState::Completed
        );
        assert_eq!(
            IceConnectionState::from(RTCIceConnectionState::Failed),
            IceConnectionState::Failed
        );
    }

    #[tokio::test]
    async fn test_loopback_negotiation() {
        let config = RtcConfig {
            mdns_mode: crate::config::MdnsMode::Disabled,
            ..Default::default()
        };
        let (caller, _caller_events) = RtcPeerTransport::new(&config, "caller").await.unwrap();
        let (callee, _callee_events) = RtcPeerTransport::new(&config, "callee").await.unwrap();

        let video = LocalTrack::new(MediaKind::Video, "cam-0", "Camera");
        caller.add_track(&video).await.unwrap();

        let offer = caller.create_offer().await.unwrap();
        assert_eq!(offer.sdp_type, SdpType::Offer);
        caller.set_local_description(&offer).await.unwrap();

        callee.set_remote_description(&offer).await.unwrap();
        let answer = callee.create_answer().await.unwrap();
        callee.set_local_description(&answer).await.unwrap();
        caller.set_remote_description(&answer).await.unwrap();

        // swapping the outbound track needs no new offer
        let replacement = LocalTrack::new(MediaKind::Video, "cam-1", "Camera 2");
        caller.replace_track(&video, &replacement).await.unwrap();
        assert!(caller.replace_track(&video, &replacement).await.is_err());

        caller.close().await.unwrap();
        callee.close().await.unwrap();
    }
}
