//! Media device controller
//!
//! Owns the local capture tracks: acquisition, mute toggles and device
//! switching. When bound to a [`PeerSession`], switched tracks are swapped on
//! the session's senders in place.

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::device::{CaptureProvider, MediaConstraints, MediaDeviceInfo};
use super::track::{LocalStream, LocalTrack, MediaKind};
use crate::error::{CallError, Result};
use crate::events::{EventBus, SessionEvent};
use crate::session::PeerSession;

pub struct MediaDeviceController {
    provider: Arc<dyn CaptureProvider>,
    events: Arc<EventBus>,
    audio: RwLock<Option<LocalTrack>>,
    video: RwLock<Option<LocalTrack>>,
    session: RwLock<Option<Arc<PeerSession>>>,
    /// Serializes acquisition and device switches
    capture_lock: Mutex<()>,
}

impl MediaDeviceController {
    pub fn new(provider: Arc<dyn CaptureProvider>, events: Arc<EventBus>) -> Self {
        Self {
            provider,
            events,
            audio: RwLock::new(None),
            video: RwLock::new(None),
            session: RwLock::new(None),
            capture_lock: Mutex::new(()),
        }
    }

    fn slot(&self, kind: MediaKind) -> &RwLock<Option<LocalTrack>> {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }

    /// Open every requested device, all or nothing
    ///
    /// Tracks from a previous acquisition are stopped first.
    pub async fn acquire_local_media(&self, constraints: &MediaConstraints) -> Result<LocalStream> {
        let requests = constraints.requests();
        if requests.is_empty() {
            return Err(CallError::DeviceAccess(
                "Constraints request neither audio nor video".to_string(),
            ));
        }

        let _capture = self.capture_lock.lock().await;

        for kind in [MediaKind::Audio, MediaKind::Video] {
            if let Some(previous) = self.slot(kind).write().await.take() {
                previous.stop();
            }
        }

        let mut opened: Vec<LocalTrack> = Vec::with_capacity(requests.len());
        for (kind, device_id) in requests {
            match self.provider.open(kind, device_id).await {
                Ok(track) => opened.push(track),
                Err(e) => {
                    for track in &opened {
                        track.stop();
                    }
                    return Err(self.device_error(Some(kind), device_id, e));
                }
            }
        }

        for track in &opened {
            info!(
                "Acquired {} track {} from {}",
                track.kind(),
                track.id(),
                track.device_id()
            );
            *self.slot(track.kind()).write().await = Some(track.clone());
        }

        Ok(LocalStream::new(opened))
    }

    /// Tracks currently held
    pub async fn local_stream(&self) -> LocalStream {
        let mut tracks = Vec::with_capacity(2);
        for kind in [MediaKind::Audio, MediaKind::Video] {
            if let Some(track) = self.slot(kind).read().await.clone() {
                tracks.push(track);
            }
        }
        LocalStream::new(tracks)
    }

    pub async fn track(&self, kind: MediaKind) -> Option<LocalTrack> {
        self.slot(kind).read().await.clone()
    }

    /// Flip the audio track's enabled flag; `false` without an audio track
    pub async fn toggle_audio(&self) -> bool {
        self.toggle(MediaKind::Audio).await
    }

    /// Flip the video track's enabled flag; `false` without a video track
    pub async fn toggle_video(&self) -> bool {
        self.toggle(MediaKind::Video).await
    }

    async fn toggle(&self, kind: MediaKind) -> bool {
        let Some(track) = self.slot(kind).read().await.clone() else {
            return false;
        };

        let enabled = track.toggle();
        info!("{} track {} {}", kind, track.id(), if enabled { "enabled" } else { "muted" });
        self.events
            .publish(SessionEvent::TrackToggled { kind, enabled });
        enabled
    }

    /// Move video capture to another camera (`None` = default camera)
    pub async fn switch_camera(&self, device_id: Option<&str>) -> Result<LocalTrack> {
        self.switch_device(MediaKind::Video, device_id).await
    }

    /// Move audio capture to another microphone
    pub async fn switch_audio_device(&self, device_id: &str) -> Result<LocalTrack> {
        self.switch_device(MediaKind::Audio, Some(device_id)).await
    }

    /// Stop the current track of `kind`, open the new device and swap it in
    ///
    /// The enabled flag carries over. On failure the old track stays stopped
    /// and the slot is left empty.
    async fn switch_device(&self, kind: MediaKind, device_id: Option<&str>) -> Result<LocalTrack> {
        let _capture = self.capture_lock.lock().await;

        let old = self.slot(kind).read().await.clone();
        let enabled = old.as_ref().map(|t| t.is_enabled()).unwrap_or(true);
        if let Some(old) = &old {
            old.stop();
        }

        let new = match self.provider.open(kind, device_id).await {
            Ok(track) => track,
            Err(e) => {
                *self.slot(kind).write().await = None;
                return Err(self.device_error(Some(kind), device_id, e));
            }
        };
        new.set_enabled(enabled);

        let session = self.session.read().await.clone();
        let mut replaced = old;
        if let Some(session) = session {
            // After a failed switch the slot is empty but the session still
            // sends the stopped track; swap that one so no new sender appears.
            let outgoing = session.local_track(kind);
            let result = match &outgoing {
                Some(current) => session.replace_local_track(current, &new).await,
                None => session.attach_local_track(&new).await,
            };
            if let Err(e) = result {
                warn!("Failed to hand {} track {} to session: {}", kind, new.id(), e);
                new.stop();
                *self.slot(kind).write().await = None;
                return Err(e);
            }
            if outgoing.is_some() {
                replaced = outgoing;
            }
        }

        *self.slot(kind).write().await = Some(new.clone());

        info!(
            "Switched {} capture to {} (track {})",
            kind,
            new.device_id(),
            new.id()
        );
        self.events.publish(SessionEvent::TrackSwitched {
            kind,
            old_track: replaced.map(|t| t.id().to_string()).unwrap_or_default(),
            new_track: new.id().to_string(),
            device_id: new.device_id().to_string(),
        });
        Ok(new)
    }

    /// Current capture and playback device inventory
    pub async fn enumerate_devices(&self) -> Result<Vec<MediaDeviceInfo>> {
        self.provider
            .enumerate()
            .await
            .map_err(|e| self.device_error(None, None, e))
    }

    /// Attach the held tracks to `session` and follow it on device switches
    pub async fn attach_to(&self, session: Arc<PeerSession>) -> Result<()> {
        let _capture = self.capture_lock.lock().await;

        for kind in [MediaKind::Audio, MediaKind::Video] {
            let track = self.slot(kind).read().await.clone();
            if let Some(track) = track {
                session.attach_local_track(&track).await?;
            }
        }

        info!("Media bound to session {}", session.id());
        *self.session.write().await = Some(session);
        Ok(())
    }

    /// Stop following the bound session
    pub async fn detach(&self) -> Option<Arc<PeerSession>> {
        self.session.write().await.take()
    }

    /// Stop and drop every held track
    pub async fn stop_all(&self) {
        let _capture = self.capture_lock.lock().await;
        for kind in [MediaKind::Audio, MediaKind::Video] {
            if let Some(track) = self.slot(kind).write().await.take() {
                track.stop();
            }
        }
    }

    /// Publish a device error and return it as `DeviceAccess`
    fn device_error(
        &self,
        kind: Option<MediaKind>,
        device_id: Option<&str>,
        err: CallError,
    ) -> CallError {
        let err = match err {
            CallError::DeviceAccess(_) => err,
            other => CallError::DeviceAccess(other.to_string()),
        };
        warn!("Device error: {}", err);
        self.events.publish(SessionEvent::DeviceError {
            kind,
            device_id: device_id.map(str::to_string),
            error_kind: err.kind(),
            message: err.to_string(),
        });
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::media::device::DeviceKind;
    use crate::media::SyntheticCaptureProvider;
    use crate::session::fake::FakeTransport;
    use crate::session::{Role, SessionConfig, SignalingState};
    use crate::signaling::SignalingChannel;
    use tokio::sync::broadcast;

    fn controller() -> (
        MediaDeviceController,
        Arc<SyntheticCaptureProvider>,
        broadcast::Receiver<SessionEvent>,
    ) {
        let provider = Arc::new(SyntheticCaptureProvider::new());
        provider.add_device(MediaDeviceInfo::new("device-42", DeviceKind::Camera, "Camera 42"));
        let bus = Arc::new(EventBus::new());
        let events = bus.subscribe();
        (
            MediaDeviceController::new(provider.clone(), bus),
            provider,
            events,
        )
    }

    fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_acquire_audio_and_video() {
        let (controller, _, _) = controller();
        let stream = controller
            .acquire_local_media(&MediaConstraints::default())
            .await
            .unwrap();

        assert_eq!(stream.len(), 2);
        assert!(stream.audio().unwrap().is_enabled());
        assert!(stream.video().unwrap().is_enabled());
        assert_eq!(controller.local_stream().await.len(), 2);
    }

    #[tokio::test]
    async fn test_acquire_is_all_or_nothing() {
        let (controller, provider, mut events) = controller();
        provider.deny("synthetic-camera-0");

        let err = controller
            .acquire_local_media(&MediaConstraints::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::DeviceAccess(_)));
        assert!(controller.local_stream().await.is_empty());

        // the microphone opened first was released
        let opened = provider.opened_tracks();
        assert_eq!(opened.len(), 1);
        assert!(opened[0].is_stopped());

        let events = drain(&mut events);
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::DeviceError { error_kind: ErrorKind::DeviceAccess, .. }
        )));
    }

    #[tokio::test]
    async fn test_toggle_flips_enabled() {
        let (controller, _, mut events) = controller();
        assert!(!controller.toggle_video().await);

        controller
            .acquire_local_media(&MediaConstraints::default())
            .await
            .unwrap();
        let audio = controller.track(MediaKind::Audio).await.unwrap();

        assert!(!controller.toggle_audio().await);
        assert!(!audio.is_enabled());
        assert!(controller.toggle_audio().await);
        assert!(audio.is_enabled());

        let toggles: Vec<_> = drain(&mut events)
            .into_iter()
            .filter(|e| e.event_name() == "media.track_toggled")
            .collect();
        assert_eq!(toggles.len(), 2);
    }

    #[tokio::test]
    async fn test_switch_camera_replaces_sender_track() {
        let (controller, _, _) = controller();
        controller
            .acquire_local_media(&MediaConstraints::default())
            .await
            .unwrap();

        let (local, remote) = SignalingChannel::memory_pair(8);
        let (transport, transport_events) = FakeTransport::new();
        let session = PeerSession::new(
            SessionConfig::new(Role::Caller),
            transport.clone(),
            transport_events,
            local.sender(),
            Arc::new(EventBus::new()),
        );
        controller.attach_to(session.clone()).await.unwrap();
        session.create_offer().await.unwrap();

        let old = controller.track(MediaKind::Video).await.unwrap();
        controller.toggle_video().await;

        let new = controller.switch_camera(Some("device-42")).await.unwrap();

        assert!(old.is_stopped());
        assert_eq!(new.device_id(), "device-42");
        assert!(!new.is_enabled());
        assert_eq!(session.local_track(MediaKind::Video), Some(new.clone()));
        assert!(transport.sending().contains(&new.id().to_string()));
        assert!(!transport.sending().contains(&old.id().to_string()));
        assert_eq!(session.signaling_state(), SignalingState::HaveLocalOffer);

        // only the initial offer went out
        let (_, mut outbox) = remote.split();
        assert!(matches!(outbox.try_recv(), Ok(crate::signaling::SignalingMessage::Offer(_))));
        assert!(outbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_switch_to_missing_device_fails() {
        let (controller, _, mut events) = controller();
        controller
            .acquire_local_media(&MediaConstraints::video_only())
            .await
            .unwrap();
        let old = controller.track(MediaKind::Video).await.unwrap();

        let err = controller.switch_camera(Some("device-99")).await.unwrap_err();

        assert!(matches!(err, CallError::DeviceAccess(_)));
        assert!(old.is_stopped());
        assert!(controller.track(MediaKind::Video).await.is_none());
        assert!(drain(&mut events)
            .iter()
            .any(|e| e.event_name() == "media.device_error"));

        // a later switch recovers
        assert!(controller.switch_camera(None).await.is_ok());
    }

    #[tokio::test]
    async fn test_switch_retry_after_failure_reuses_sender() {
        let (controller, _, _) = controller();
        controller
            .acquire_local_media(&MediaConstraints::video_only())
            .await
            .unwrap();

        let (local, _remote) = SignalingChannel::memory_pair(8);
        let (transport, transport_events) = FakeTransport::new();
        let session = PeerSession::new(
            SessionConfig::new(Role::Caller),
            transport.clone(),
            transport_events,
            local.sender(),
            Arc::new(EventBus::new()),
        );
        controller.attach_to(session.clone()).await.unwrap();
        session.create_offer().await.unwrap();
        session
            .apply_answer(crate::signaling::SessionDescription::answer("v=0\r\n"))
            .await
            .unwrap();
        let old = controller.track(MediaKind::Video).await.unwrap();

        assert!(controller.switch_camera(Some("device-99")).await.is_err());
        let calls_after_failure = transport.calls().len();

        let new = controller.switch_camera(Some("device-42")).await.unwrap();

        let video: Vec<_> = session
            .local_tracks()
            .into_iter()
            .filter(|t| t.kind() == MediaKind::Video)
            .collect();
        assert_eq!(video, vec![new.clone()]);
        assert_eq!(transport.sending(), vec![new.id().to_string()]);
        assert!(!transport.calls()[calls_after_failure..]
            .iter()
            .any(|c| c.starts_with("add_track")));
        assert!(old.is_stopped());
        assert!(!old.is_attached());
        assert_eq!(session.signaling_state(), SignalingState::Stable);
    }

    #[tokio::test]
    async fn test_switch_audio_device() {
        let (controller, provider, mut events) = controller();
        provider.add_device(MediaDeviceInfo::new(
            "usb-mic",
            DeviceKind::Microphone,
            "USB Microphone",
        ));
        controller
            .acquire_local_media(&MediaConstraints::audio_only())
            .await
            .unwrap();

        let new = controller.switch_audio_device("usb-mic").await.unwrap();
        assert_eq!(new.kind(), MediaKind::Audio);
        assert!(new.is_enabled());
        assert!(drain(&mut events)
            .iter()
            .any(|e| e.event_name() == "media.track_switched"));
    }

    #[tokio::test]
    async fn test_enumerate_devices() {
        let (controller, _, _) = controller();
        let devices = controller.enumerate_devices().await.unwrap();
        assert!(devices.iter().any(|d| d.device_id == "device-42"));
        assert!(devices.iter().any(|d| d.kind == DeviceKind::Speaker));
    }
}
