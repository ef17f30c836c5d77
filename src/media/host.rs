//! Host capture provider (V4L2 cameras, ALSA microphones and speakers)
//!
//! Opening a device validates access and keeps the handle open until the
//! returned track stops, so a second open of the same device reports busy.
//! Frame capture and encoding into the track's sample writer are left to the
//! application pipeline.

use alsa::{Direction, PCM};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{debug, info};
use v4l::capability::Flags;
use v4l::Device;

use super::device::{CaptureProvider, DeviceKind, MediaDeviceInfo};
use super::track::{LocalTrack, MediaKind};
use crate::error::{CallError, Result};

/// Number of PCM devices probed per sound card
const ALSA_DEVICES_PER_CARD: i32 = 8;

#[derive(Debug, Default)]
pub struct HostCaptureProvider;

impl HostCaptureProvider {
    pub fn new() -> Self {
        Self
    }
}

fn open_error(device: &str, e: std::io::Error) -> CallError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => {
            CallError::DeviceAccess(format!("Permission denied for {}", device))
        }
        std::io::ErrorKind::NotFound => {
            CallError::DeviceAccess(format!("No such device: {}", device))
        }
        _ => CallError::DeviceAccess(format!("Failed to open {}: {}", device, e)),
    }
}

/// Open a V4L2 node and check it can capture
fn open_camera(path: &Path) -> Result<(Device, String)> {
    let name = path.display().to_string();
    let device = Device::with_path(path).map_err(|e| open_error(&name, e))?;
    let caps = device
        .query_caps()
        .map_err(|e| CallError::DeviceAccess(format!("Failed to query {}: {}", name, e)))?;

    if !(caps.capabilities.contains(Flags::VIDEO_CAPTURE)
        || caps.capabilities.contains(Flags::VIDEO_CAPTURE_MPLANE))
    {
        return Err(CallError::DeviceAccess(format!(
            "{} is not a capture device",
            name
        )));
    }

    Ok((device, caps.card))
}

fn enumerate_cameras() -> Result<Vec<MediaDeviceInfo>> {
    let mut cameras = Vec::new();

    let entries = std::fs::read_dir("/dev")
        .map_err(|e| CallError::DeviceAccess(format!("Failed to read /dev: {}", e)))?;

    for entry in entries.flatten() {
        let path = entry.path();
        let is_video_node = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("video"))
            .unwrap_or(false);
        if !is_video_node {
            continue;
        }

        match open_camera(&path) {
            Ok((_, card)) => cameras.push(MediaDeviceInfo::new(
                path.display().to_string(),
                DeviceKind::Camera,
                card,
            )),
            Err(e) => debug!("Skipping {:?}: {}", path, e),
        }
    }

    cameras.sort_by(|a, b| a.device_id.cmp(&b.device_id));
    Ok(cameras)
}

fn enumerate_alsa(direction: Direction, kind: DeviceKind) -> Vec<MediaDeviceInfo> {
    let mut devices = Vec::new();

    for card in alsa::card::Iter::new() {
        let card = match card {
            Ok(c) => c,
            Err(e) => {
                debug!("Error iterating card: {}", e);
                continue;
            }
        };

        let card_index = card.get_index();
        let card_name = card.get_name().unwrap_or_else(|_| "Unknown".to_string());
        let card_longname = card.get_longname().unwrap_or_else(|_| card_name.clone());

        for device_index in 0..ALSA_DEVICES_PER_CARD {
            let name = format!("hw:{},{}", card_index, device_index);
            if PCM::new(&name, direction, false).is_ok() {
                devices.push(MediaDeviceInfo::new(
                    name,
                    kind,
                    format!("{} - Device {}", card_longname, device_index),
                ));
            }
        }
    }

    if PCM::new("default", direction, false).is_ok() {
        devices.insert(
            0,
            MediaDeviceInfo::new("default", kind, "Default Audio Device"),
        );
    }

    devices
}

/// Keep `handle` alive until the track stops
fn hold_until_stopped<H: Send + 'static>(handle: H, mut stopped: watch::Receiver<bool>) {
    tokio::spawn(async move {
        let _handle = handle;
        while !*stopped.borrow() {
            if stopped.changed().await.is_err() {
                break;
            }
        }
    });
}

#[async_trait]
impl CaptureProvider for HostCaptureProvider {
    async fn open(&self, kind: MediaKind, device_id: Option<&str>) -> Result<LocalTrack> {
        let device_id = device_id.map(str::to_string);

        let track = match kind {
            MediaKind::Video => {
                let path = match device_id {
                    Some(id) => PathBuf::from(id),
                    None => {
                        let cameras = tokio::task::spawn_blocking(enumerate_cameras)
                            .await
                            .map_err(|e| CallError::Internal(e.to_string()))??;
                        let first = cameras.into_iter().next().ok_or_else(|| {
                            CallError::DeviceAccess("No video capture devices found".to_string())
                        })?;
                        PathBuf::from(first.device_id)
                    }
                };

                let (device, card) = open_camera(&path)?;
                let track = LocalTrack::new(kind, path.display().to_string(), card);
                hold_until_stopped(device, track.stopped_signal());
                track
            }
            MediaKind::Audio => {
                let name = device_id.unwrap_or_else(|| "default".to_string());
                let pcm = PCM::new(&name, Direction::Capture, false).map_err(|e| {
                    CallError::DeviceAccess(format!("Failed to open {}: {}", name, e))
                })?;
                let track = LocalTrack::new(kind, name.clone(), name);
                hold_until_stopped(pcm, track.stopped_signal());
                track
            }
        };

        info!("Opened {} device {}", kind, track.device_id());
        Ok(track)
    }

    async fn enumerate(&self) -> Result<Vec<MediaDeviceInfo>> {
        tokio::task::spawn_blocking(|| {
            let mut devices = enumerate_cameras()?;
            devices.extend(enumerate_alsa(Direction::Capture, DeviceKind::Microphone));
            devices.extend(enumerate_alsa(Direction::Playback, DeviceKind::Speaker));
            info!("Found {} media devices", devices.len());
            Ok(devices)
        })
        .await
        .map_err(|e| CallError::Internal(e.to_string()))?
    }
}
