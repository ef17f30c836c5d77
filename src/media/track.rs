//! Local media tracks
//!
//! A [`LocalTrack`] is a cheap handle over shared state: the capture provider
//! creates it, the device controller holds it, and at most one session
//! references it for transmission.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Stream ID used for every locally captured track
pub const LOCAL_STREAM_ID: &str = "rtc-call-local";

/// Track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio/opus",
            MediaKind::Video => "video/VP8",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// RTP codec capability used when sending a track of `kind`
pub fn codec_capability(kind: MediaKind) -> RTCRtpCodecCapability {
    match kind {
        MediaKind::Audio => RTCRtpCodecCapability {
            mime_type: kind.mime_type().to_string(),
            clock_rate: 48000,
            channels: 2,
            sdp_fmtp_line: "minptime=10;useinbandfec=1".to_string(),
            rtcp_feedback: vec![],
        },
        MediaKind::Video => RTCRtpCodecCapability {
            mime_type: kind.mime_type().to_string(),
            clock_rate: 90000,
            channels: 0,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        },
    }
}

struct TrackInner {
    id: String,
    kind: MediaKind,
    device_id: String,
    label: String,
    enabled: AtomicBool,
    stopped: watch::Sender<bool>,
    /// Set while a session transmits this track
    attached: AtomicBool,
    rtc: Arc<TrackLocalStaticSample>,
}

/// Locally captured audio or video track
#[derive(Clone)]
pub struct LocalTrack {
    inner: Arc<TrackInner>,
}

impl LocalTrack {
    /// Create a live, enabled track for a device
    pub fn new(kind: MediaKind, device_id: impl Into<String>, label: impl Into<String>) -> Self {
        let id = format!("{}-{}", kind, uuid::Uuid::new_v4());
        let rtc = Arc::new(TrackLocalStaticSample::new(
            codec_capability(kind),
            id.clone(),
            LOCAL_STREAM_ID.to_string(),
        ));
        let (stopped, _) = watch::channel(false);

        Self {
            inner: Arc::new(TrackInner {
                id,
                kind,
                device_id: device_id.into(),
                label: label.into(),
                enabled: AtomicBool::new(true),
                stopped,
                attached: AtomicBool::new(false),
                rtc,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Set the enabled flag; a stopped track stays disabled
    pub fn set_enabled(&self, enabled: bool) -> bool {
        let enabled = enabled && !self.is_stopped();
        self.inner.enabled.store(enabled, Ordering::SeqCst);
        enabled
    }

    /// Flip the enabled flag and return the new value
    pub fn toggle(&self) -> bool {
        self.set_enabled(!self.is_enabled())
    }

    /// Stop the track. Idempotent.
    pub fn stop(&self) {
        self.inner.enabled.store(false, Ordering::SeqCst);
        let was_stopped = self.inner.stopped.send_replace(true);
        if !was_stopped {
            debug!("Track {} stopped", self.inner.id);
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.stopped.borrow()
    }

    /// Watch that flips to `true` when the track stops
    ///
    /// Capture providers use this to release the underlying device.
    pub fn stopped_signal(&self) -> watch::Receiver<bool> {
        self.inner.stopped.subscribe()
    }

    /// Track handed to the peer connection
    pub fn rtc_track(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.inner.rtc.clone()
    }

    /// Sample writer for the capture pipeline
    pub fn sample_writer(&self) -> Arc<TrackLocalStaticSample> {
        self.inner.rtc.clone()
    }

    /// Mark the track as transmitted by a session
    ///
    /// Returns `false` if another session already holds it.
    pub fn claim(&self) -> bool {
        self.inner
            .attached
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn release(&self) {
        self.inner.attached.store(false, Ordering::SeqCst);
    }

    pub fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::SeqCst)
    }
}

impl PartialEq for LocalTrack {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for LocalTrack {}

impl std::fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("device_id", &self.inner.device_id)
            .field("enabled", &self.is_enabled())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Set of tracks returned by one capture request
#[derive(Debug, Clone, Default)]
pub struct LocalStream {
    pub tracks: Vec<LocalTrack>,
}

impl LocalStream {
    pub fn new(tracks: Vec<LocalTrack>) -> Self {
        Self { tracks }
    }

    pub fn track(&self, kind: MediaKind) -> Option<&LocalTrack> {
        self.tracks.iter().find(|t| t.kind() == kind)
    }

    pub fn audio(&self) -> Option<&LocalTrack> {
        self.track(MediaKind::Audio)
    }

    pub fn video(&self) -> Option<&LocalTrack> {
        self.track(MediaKind::Video)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
