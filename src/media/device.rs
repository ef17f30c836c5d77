//! Capture device inventory and the capture provider seam

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::track::{LocalTrack, MediaKind};
use crate::error::Result;

/// Device category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Camera,
    Microphone,
    Speaker,
}

impl DeviceKind {
    /// Capture kind for input devices; speakers have none
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            DeviceKind::Camera => Some(MediaKind::Video),
            DeviceKind::Microphone => Some(MediaKind::Audio),
            DeviceKind::Speaker => None,
        }
    }

    pub fn for_capture(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => DeviceKind::Microphone,
            MediaKind::Video => DeviceKind::Camera,
        }
    }
}

/// Media device information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDeviceInfo {
    /// Stable device identifier (e.g., "/dev/video0" or "hw:1,0")
    pub device_id: String,
    pub kind: DeviceKind,
    /// Human-readable label
    pub label: String,
}

impl MediaDeviceInfo {
    pub fn new(device_id: impl Into<String>, kind: DeviceKind, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            kind,
            label: label.into(),
        }
    }
}

/// What to capture in one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
    /// Preferred microphone, default device when unset
    pub audio_device: Option<String>,
    /// Preferred camera, default device when unset
    pub video_device: Option<String>,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
            audio_device: None,
            video_device: None,
        }
    }
}

impl MediaConstraints {
    pub fn audio_only() -> Self {
        Self {
            video: false,
            ..Default::default()
        }
    }

    pub fn video_only() -> Self {
        Self {
            audio: false,
            ..Default::default()
        }
    }

    /// Requested kinds paired with their preferred device
    pub fn requests(&self) -> Vec<(MediaKind, Option<&str>)> {
        let mut requests = Vec::with_capacity(2);
        if self.audio {
            requests.push((MediaKind::Audio, self.audio_device.as_deref()));
        }
        if self.video {
            requests.push((MediaKind::Video, self.video_device.as_deref()));
        }
        requests
    }
}

/// Source of local capture tracks
///
/// Implementations map host failures to [`crate::CallError::DeviceAccess`].
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    /// Open a device of `kind` and return a live track
    ///
    /// `device_id = None` selects the default device.
    async fn open(&self, kind: MediaKind, device_id: Option<&str>) -> Result<LocalTrack>;

    /// Current device inventory
    async fn enumerate(&self) -> Result<Vec<MediaDeviceInfo>>;
}
