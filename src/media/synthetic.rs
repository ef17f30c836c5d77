//! Synthetic capture provider
//!
//! Produces tracks without touching hardware. Used for headless clients and
//! for tests; devices can be marked as denied to exercise failure paths, and a
//! device with a live track reports busy until that track stops.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::debug;

use super::device::{CaptureProvider, DeviceKind, MediaDeviceInfo};
use super::track::{LocalTrack, MediaKind};
use crate::error::{CallError, Result};

pub struct SyntheticCaptureProvider {
    devices: Mutex<Vec<MediaDeviceInfo>>,
    denied: Mutex<HashSet<String>>,
    opened: Mutex<Vec<LocalTrack>>,
}

impl SyntheticCaptureProvider {
    /// Provider with one camera, one microphone and one speaker
    pub fn new() -> Self {
        Self::with_devices(vec![
            MediaDeviceInfo::new("synthetic-camera-0", DeviceKind::Camera, "Synthetic Camera"),
            MediaDeviceInfo::new(
                "synthetic-microphone-0",
                DeviceKind::Microphone,
                "Synthetic Microphone",
            ),
            MediaDeviceInfo::new("synthetic-speaker-0", DeviceKind::Speaker, "Synthetic Speaker"),
        ])
    }

    pub fn with_devices(devices: Vec<MediaDeviceInfo>) -> Self {
        Self {
            devices: Mutex::new(devices),
            denied: Mutex::new(HashSet::new()),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Simulate hot-plugging a device
    pub fn add_device(&self, device: MediaDeviceInfo) {
        self.devices.lock().push(device);
    }

    pub fn remove_device(&self, device_id: &str) {
        self.devices.lock().retain(|d| d.device_id != device_id);
    }

    /// Refuse future opens of `device_id` as if permission were denied
    pub fn deny(&self, device_id: &str) {
        self.denied.lock().insert(device_id.to_string());
    }

    pub fn allow(&self, device_id: &str) {
        self.denied.lock().remove(device_id);
    }

    /// Every track this provider handed out, in order
    pub fn opened_tracks(&self) -> Vec<LocalTrack> {
        self.opened.lock().clone()
    }
}

impl Default for SyntheticCaptureProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureProvider for SyntheticCaptureProvider {
    async fn open(&self, kind: MediaKind, device_id: Option<&str>) -> Result<LocalTrack> {
        let wanted = DeviceKind::for_capture(kind);
        let device = {
            let devices = self.devices.lock();
            match device_id {
                Some(id) => devices
                    .iter()
                    .find(|d| d.device_id == id && d.kind == wanted)
                    .cloned(),
                None => devices.iter().find(|d| d.kind == wanted).cloned(),
            }
        };

        let device = device.ok_or_else(|| {
            CallError::DeviceAccess(match device_id {
                Some(id) => format!("No {} device named {}", kind, id),
                None => format!("No {} device available", kind),
            })
        })?;

        if self.denied.lock().contains(&device.device_id) {
            return Err(CallError::DeviceAccess(format!(
                "Permission denied for {}",
                device.device_id
            )));
        }

        let mut opened = self.opened.lock();
        if opened
            .iter()
            .any(|t| t.device_id() == device.device_id && !t.is_stopped())
        {
            return Err(CallError::DeviceAccess(format!(
                "Device {} is busy",
                device.device_id
            )));
        }

        let track = LocalTrack::new(kind, device.device_id.clone(), device.label.clone());
        debug!("Opened synthetic {} track {} on {}", kind, track.id(), device.device_id);
        opened.push(track.clone());
        Ok(track)
    }

    async fn enumerate(&self) -> Result<Vec<MediaDeviceInfo>> {
        Ok(self.devices.lock().clone())
    }
}
