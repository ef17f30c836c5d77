//! Peer session
//!
//! Drives one call's offer/answer/ICE exchange and owns the connection
//! resource end to end.
//!
//! Negotiating operations (`create_offer`, `create_answer`, `apply_answer`,
//! `add_remote_candidate`, `attach_local_track`) queue on a per-session lock
//! and run one at a time in arrival order. `close` never waits for that lock:
//! it cancels whatever is in flight, and an interrupted operation returns an
//! error instead of publishing its result.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::candidates::{CandidateQueue, DEFAULT_CANDIDATE_QUEUE_CAPACITY};
use super::remote::RemoteStream;
use super::rtc::RtcPeerTransport;
use super::state::{IceConnectionState, Role, SignalingState};
use super::transport::{PeerTransport, TransportEvent, TransportEvents};
use crate::config::RtcConfig;
use crate::error::{CallError, Result};
use crate::events::{EventBus, SessionEvent};
use crate::media::{LocalTrack, MediaKind};
use crate::signaling::{IceCandidate, SdpType, SessionDescription, SignalSender, SignalingMessage};

/// Parameters for one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub session_id: String,
    pub role: Role,
    /// Yield to the remote offer on glare
    pub polite: bool,
    pub candidate_queue_capacity: usize,
    /// Close automatically when ICE fails
    pub close_on_failure: bool,
}

impl SessionConfig {
    pub fn new(role: Role) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            role,
            polite: role.default_polite(),
            candidate_queue_capacity: DEFAULT_CANDIDATE_QUEUE_CAPACITY,
            close_on_failure: true,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_polite(mut self, polite: bool) -> Self {
        self.polite = polite;
        self
    }

    pub fn with_candidate_queue_capacity(mut self, capacity: usize) -> Self {
        self.candidate_queue_capacity = capacity;
        self
    }

    pub fn with_close_on_failure(mut self, close_on_failure: bool) -> Self {
        self.close_on_failure = close_on_failure;
        self
    }
}

/// Session snapshot for the UI layer
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub role: Role,
    pub polite: bool,
    pub signaling_state: SignalingState,
    pub ice_state: IceConnectionState,
    pub local_tracks: usize,
    pub remote_tracks: usize,
    pub created_at: DateTime<Utc>,
}

/// State guarded by the negotiation lock
struct Negotiation {
    has_remote_description: bool,
    /// At least one offer/answer exchange completed
    negotiated: bool,
    pending: CandidateQueue,
}

pub struct PeerSession {
    id: String,
    role: Role,
    polite: bool,
    close_on_failure: bool,
    created_at: DateTime<Utc>,
    transport: Arc<dyn PeerTransport>,
    signals: SignalSender,
    events: Arc<EventBus>,
    negotiation: Mutex<Negotiation>,
    signaling_state: watch::Sender<SignalingState>,
    ice_state: watch::Sender<IceConnectionState>,
    local_tracks: parking_lot::Mutex<Vec<LocalTrack>>,
    remote_stream: RemoteStream,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl PeerSession {
    /// Create a session over an existing transport
    ///
    /// Spawns the task that turns `transport_events` into signaling messages
    /// and session events.
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn PeerTransport>,
        transport_events: TransportEvents,
        signals: SignalSender,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        let (signaling_state, _) = watch::channel(SignalingState::Stable);
        let (ice_state, _) = watch::channel(IceConnectionState::New);

        let session = Arc::new(Self {
            id: config.session_id,
            role: config.role,
            polite: config.polite,
            close_on_failure: config.close_on_failure,
            created_at: Utc::now(),
            transport,
            signals,
            events,
            negotiation: Mutex::new(Negotiation {
                has_remote_description: false,
                negotiated: false,
                pending: CandidateQueue::new(config.candidate_queue_capacity),
            }),
            signaling_state,
            ice_state,
            local_tracks: parking_lot::Mutex::new(Vec::new()),
            remote_stream: RemoteStream::new(),
            cancel: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(Self::run_event_pump(
            Arc::downgrade(&session),
            transport_events,
            session.cancel.clone(),
        ));

        info!(
            "Session {} created (role: {}, polite: {})",
            session.id, session.role, session.polite
        );
        session
    }

    /// Create a session backed by a new WebRTC peer connection
    pub async fn connect(
        config: SessionConfig,
        rtc: &RtcConfig,
        signals: SignalSender,
        events: Arc<EventBus>,
    ) -> Result<Arc<Self>> {
        let (transport, transport_events) = RtcPeerTransport::new(rtc, &config.session_id).await?;
        Ok(Self::new(config, transport, transport_events, signals, events))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_polite(&self) -> bool {
        self.polite
    }

    pub fn signaling_state(&self) -> SignalingState {
        *self.signaling_state.borrow()
    }

    pub fn ice_connection_state(&self) -> IceConnectionState {
        *self.ice_state.borrow()
    }

    pub fn watch_signaling_state(&self) -> watch::Receiver<SignalingState> {
        self.signaling_state.subscribe()
    }

    pub fn watch_ice_state(&self) -> watch::Receiver<IceConnectionState> {
        self.ice_state.subscribe()
    }

    /// Tracks received from the peer
    pub fn remote_stream(&self) -> &RemoteStream {
        &self.remote_stream
    }

    pub fn local_tracks(&self) -> Vec<LocalTrack> {
        self.local_tracks.lock().clone()
    }

    pub fn local_track(&self, kind: MediaKind) -> Option<LocalTrack> {
        self.local_tracks
            .lock()
            .iter()
            .find(|t| t.kind() == kind)
            .cloned()
    }

    pub async fn pending_candidate_count(&self) -> usize {
        self.negotiation.lock().await.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            role: self.role,
            polite: self.polite,
            signaling_state: self.signaling_state(),
            ice_state: self.ice_connection_state(),
            local_tracks: self.local_tracks.lock().len(),
            remote_tracks: self.remote_stream.len(),
            created_at: self.created_at,
        }
    }

    // ========================================================================
    // Offer / answer
    // ========================================================================

    /// Create, apply and send a local offer
    pub async fn create_offer(&self) -> Result<SessionDescription> {
        let neg = self
            .lock_negotiation()
            .await
            .ok_or_else(|| self.closed_error("create offer"))?;

        match self.signaling_state() {
            SignalingState::Stable => {}
            SignalingState::HaveLocalOffer => {
                warn!("Session {}: offer requested while one is outstanding", self.id);
                return Err(CallError::Negotiation(format!(
                    "Session {} already has an outstanding offer",
                    self.id
                )));
            }
            SignalingState::HaveRemoteOffer => {
                return Err(CallError::Negotiation(format!(
                    "Session {} is answering a remote offer",
                    self.id
                )));
            }
            SignalingState::Closed => return Err(self.closed_error("create offer")),
        }

        if self.role == Role::Callee && !neg.negotiated {
            return Err(CallError::Negotiation(format!(
                "Session {} is the callee and waits for the remote offer",
                self.id
            )));
        }
        if self.ice_connection_state() == IceConnectionState::Failed {
            return Err(CallError::ConnectionFailure(format!(
                "Session {} connection failed; start a new session",
                self.id
            )));
        }

        let offer = self
            .guarded("create offer", self.transport.create_offer())
            .await?;
        self.guarded(
            "create offer",
            self.transport.set_local_description(&offer),
        )
        .await?;
        self.transition(SignalingState::HaveLocalOffer)?;

        if let Err(e) = self
            .guarded(
                "send offer",
                self.signals.send(SignalingMessage::Offer(offer.clone())),
            )
            .await
        {
            if !self.is_closed() {
                warn!("Session {}: failed to send offer, rolling back: {}", self.id, e);
                self.roll_back_to_stable().await;
            }
            return Err(e);
        }

        info!("Session {} sent offer", self.id);
        Ok(offer)
    }

    /// Apply a remote offer, then create, apply and send the answer
    pub async fn create_answer(&self, offer: SessionDescription) -> Result<SessionDescription> {
        offer.validate(SdpType::Offer)?;

        let mut neg = self
            .lock_negotiation()
            .await
            .ok_or_else(|| self.closed_error("answer"))?;

        match self.signaling_state() {
            SignalingState::Stable => {}
            SignalingState::HaveLocalOffer => {
                if !self.polite {
                    warn!(
                        "Session {}: offer collision, keeping local offer (impolite)",
                        self.id
                    );
                    return Err(CallError::StaleSignal(format!(
                        "Session {} ignores colliding remote offer",
                        self.id
                    )));
                }
                info!(
                    "Session {}: offer collision, rolling back local offer (polite)",
                    self.id
                );
                self.guarded("rollback", self.transport.rollback()).await?;
                self.transition(SignalingState::Stable)?;
            }
            SignalingState::HaveRemoteOffer => {
                return Err(CallError::Negotiation(format!(
                    "Session {} is already answering a remote offer",
                    self.id
                )));
            }
            SignalingState::Closed => return Err(self.closed_error("answer")),
        }

        self.guarded(
            "apply offer",
            self.transport.set_remote_description(&offer),
        )
        .await?;
        let first_remote = !neg.has_remote_description;
        neg.has_remote_description = true;
        self.transition(SignalingState::HaveRemoteOffer)?;
        let drained = self.drain_pending(&mut neg).await;

        let answer = match self.generate_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                if !self.is_closed() {
                    warn!("Session {}: answer failed, rolling back: {}", self.id, e);
                    self.roll_back_to_stable().await;
                    if first_remote {
                        // the offer they were applied to is gone; keep them for the next one
                        neg.has_remote_description = false;
                        neg.pending.requeue(drained);
                    }
                }
                return Err(e);
            }
        };

        self.transition(SignalingState::Stable)?;
        neg.negotiated = true;

        self.guarded(
            "send answer",
            self.signals.send(SignalingMessage::Answer(answer.clone())),
        )
        .await?;
        info!("Session {} sent answer", self.id);
        Ok(answer)
    }

    async fn generate_answer(&self) -> Result<SessionDescription> {
        let answer = self
            .guarded("create answer", self.transport.create_answer())
            .await?;
        self.guarded(
            "create answer",
            self.transport.set_local_description(&answer),
        )
        .await?;
        Ok(answer)
    }

    /// Apply the remote answer to our outstanding offer
    pub async fn apply_answer(&self, answer: SessionDescription) -> Result<()> {
        let mut neg = self
            .lock_negotiation()
            .await
            .ok_or_else(|| CallError::StaleSignal(format!("Session {} is closed", self.id)))?;

        let state = self.signaling_state();
        if state != SignalingState::HaveLocalOffer {
            return Err(CallError::StaleSignal(format!(
                "Session {} received an answer in state {}",
                self.id, state
            )));
        }
        answer.validate(SdpType::Answer)?;

        self.guarded(
            "apply answer",
            self.transport.set_remote_description(&answer),
        )
        .await?;
        neg.has_remote_description = true;
        neg.negotiated = true;
        self.transition(SignalingState::Stable)?;
        self.drain_pending(&mut neg).await;

        info!("Session {} applied answer", self.id);
        Ok(())
    }

    // ========================================================================
    // ICE
    // ========================================================================

    /// Apply a remote candidate, or queue it until a remote description exists
    ///
    /// `None` and empty candidates mark end-of-candidates and are ignored.
    pub async fn add_remote_candidate(&self, candidate: Option<IceCandidate>) -> Result<()> {
        let candidate = match candidate {
            Some(c) if !c.is_end_of_candidates() => c,
            _ => {
                debug!("Session {}: remote end-of-candidates", self.id);
                return Ok(());
            }
        };

        let mut neg = self
            .lock_negotiation()
            .await
            .ok_or_else(|| CallError::StaleSignal(format!("Session {} is closed", self.id)))?;

        if neg.has_remote_description {
            self.guarded(
                "add candidate",
                self.transport.add_ice_candidate(&candidate),
            )
            .await
        } else {
            debug!(
                "Session {}: queueing candidate until remote description ({} pending)",
                self.id,
                neg.pending.len() + 1
            );
            neg.pending.push(candidate)
        }
    }

    /// Apply queued candidates in arrival order and return the drained batch
    async fn drain_pending(&self, neg: &mut Negotiation) -> Vec<IceCandidate> {
        let pending = neg.pending.drain();
        if pending.is_empty() {
            return pending;
        }

        debug!(
            "Session {}: applying {} queued candidates",
            self.id,
            pending.len()
        );
        for candidate in &pending {
            if self.cancel.is_cancelled() {
                break;
            }
            if let Err(e) = self.transport.add_ice_candidate(candidate).await {
                warn!("Session {}: queued candidate rejected: {}", self.id, e);
            }
        }
        pending
    }

    // ========================================================================
    // Local tracks
    // ========================================================================

    /// Start sending a local track
    pub async fn attach_local_track(&self, track: &LocalTrack) -> Result<()> {
        let _neg = self
            .lock_negotiation()
            .await
            .ok_or_else(|| self.closed_error("attach track"))?;

        if self.local_tracks.lock().contains(track) {
            return Ok(());
        }
        if track.is_stopped() {
            return Err(CallError::Negotiation(format!(
                "Track {} is stopped",
                track.id()
            )));
        }
        if !track.claim() {
            return Err(CallError::TrackInUse(track.id().to_string()));
        }

        if let Err(e) = self
            .guarded("attach track", self.transport.add_track(track))
            .await
        {
            track.release();
            return Err(e);
        }

        {
            let mut tracks = self.local_tracks.lock();
            if self.is_closed() {
                track.release();
                return Err(self.closed_error("attach track"));
            }
            tracks.push(track.clone());
        }

        info!(
            "Session {}: attached {} track {}",
            self.id,
            track.kind(),
            track.id()
        );
        Ok(())
    }

    /// Swap an attached track in place without renegotiating
    pub async fn replace_local_track(&self, old: &LocalTrack, new: &LocalTrack) -> Result<()> {
        if self.is_closed() {
            return Err(self.closed_error("replace track"));
        }
        if old.kind() != new.kind() {
            return Err(CallError::Negotiation(format!(
                "Cannot replace {} track with {} track",
                old.kind(),
                new.kind()
            )));
        }
        if !self.local_tracks.lock().contains(old) {
            return Err(CallError::Negotiation(format!(
                "Track {} is not attached to session {}",
                old.id(),
                self.id
            )));
        }
        if !new.claim() {
            return Err(CallError::TrackInUse(new.id().to_string()));
        }

        if let Err(e) = self
            .guarded("replace track", self.transport.replace_track(old, new))
            .await
        {
            new.release();
            return Err(e);
        }

        {
            let mut tracks = self.local_tracks.lock();
            if self.is_closed() {
                new.stop();
                new.release();
                return Err(self.closed_error("replace track"));
            }
            if let Some(slot) = tracks.iter_mut().find(|t| *t == old) {
                *slot = new.clone();
            }
        }
        old.release();

        info!(
            "Session {}: replaced {} track {} -> {}",
            self.id,
            new.kind(),
            old.id(),
            new.id()
        );
        Ok(())
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Close the session. Idempotent and safe mid-negotiation.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.cancel.cancel();
        self.signaling_state.send_replace(SignalingState::Closed);

        for track in self.local_tracks.lock().iter() {
            track.stop();
            track.release();
        }

        if let Err(e) = self.transport.close().await {
            warn!("Session {}: failed to close connection: {}", self.id, e);
        }
        self.ice_state.send_replace(IceConnectionState::Closed);

        self.events.publish(SessionEvent::SignalingStateChanged {
            session_id: self.id.clone(),
            state: SignalingState::Closed,
        });
        self.events.publish(SessionEvent::IceStateChanged {
            session_id: self.id.clone(),
            state: IceConnectionState::Closed,
        });
        self.events.publish(SessionEvent::Closed {
            session_id: self.id.clone(),
        });

        info!("Session {} closed", self.id);
        Ok(())
    }

    /// Tell the peer the call is over, then close
    pub async fn hangup(&self) -> Result<()> {
        if !self.is_closed() {
            if let Err(e) = self.signals.send(SignalingMessage::Hangup).await {
                warn!("Session {}: failed to send hangup: {}", self.id, e);
            }
        }
        self.close().await
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Route an incoming signaling message
    ///
    /// Stale messages are logged and dropped; other errors are returned.
    pub async fn handle_signal(&self, message: SignalingMessage) -> Result<()> {
        let event = message.event_name();

        let result = match message {
            SignalingMessage::Offer(offer) => self.create_answer(offer).await.map(|_| ()),
            SignalingMessage::Answer(answer) => self.apply_answer(answer).await,
            SignalingMessage::IceCandidate(candidate) => {
                self.add_remote_candidate(candidate).await
            }
            SignalingMessage::Hangup => {
                info!("Session {}: remote hung up", self.id);
                self.close().await
            }
        };

        match result {
            Err(e) if e.is_stale() => {
                warn!("Session {}: dropping {} signal: {}", self.id, event, e);
                Ok(())
            }
            other => other,
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Wait for the negotiation lock; `None` if the session closes first
    async fn lock_negotiation(&self) -> Option<MutexGuard<'_, Negotiation>> {
        if self.is_closed() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            guard = self.negotiation.lock() => Some(guard),
        }
    }

    /// Run a host operation, abandoning it if the session closes meanwhile
    async fn guarded<T, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.closed_error(operation)),
            result = future => {
                if self.cancel.is_cancelled() {
                    return Err(self.closed_error(operation));
                }
                result
            }
        }
    }

    fn closed_error(&self, operation: &str) -> CallError {
        CallError::Negotiation(format!(
            "Session {} is closed ({} discarded)",
            self.id, operation
        ))
    }

    /// Move to `to` unless the session has closed
    fn transition(&self, to: SignalingState) -> Result<()> {
        let mut closed = false;
        let changed = self.signaling_state.send_if_modified(|state| {
            if *state == SignalingState::Closed {
                closed = true;
                return false;
            }
            if *state == to {
                return false;
            }
            *state = to;
            true
        });

        if closed {
            return Err(self.closed_error("state transition"));
        }
        if changed {
            debug!("Session {} signaling state: {}", self.id, to);
            self.events.publish(SessionEvent::SignalingStateChanged {
                session_id: self.id.clone(),
                state: to,
            });
        }
        Ok(())
    }

    async fn roll_back_to_stable(&self) {
        if let Err(e) = self.transport.rollback().await {
            warn!("Session {}: rollback failed: {}", self.id, e);
        }
        let _ = self.transition(SignalingState::Stable);
    }

    async fn run_event_pump(
        session: Weak<Self>,
        mut events: TransportEvents,
        cancel: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(e) => e,
                    None => break,
                },
            };

            let Some(session) = session.upgrade() else {
                break;
            };
            session.handle_transport_event(event).await;
        }
    }

    async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::CandidateGenerated(candidate) => {
                if self.is_closed() {
                    return;
                }
                self.events.publish(SessionEvent::CandidateGenerated {
                    session_id: self.id.clone(),
                    candidate: candidate.clone(),
                });
                if let Err(e) = self
                    .signals
                    .send(SignalingMessage::IceCandidate(candidate))
                    .await
                {
                    warn!("Session {}: failed to send candidate: {}", self.id, e);
                }
            }
            TransportEvent::TrackAdded(track) => {
                if self.remote_stream.push(track.clone()) {
                    info!(
                        "Session {}: remote {} track {}",
                        self.id, track.kind, track.id
                    );
                    self.events.publish(SessionEvent::TrackAdded {
                        session_id: self.id.clone(),
                        track,
                    });
                }
            }
            TransportEvent::IceStateChanged(state) => {
                if self.is_closed() {
                    return;
                }
                let changed = self.ice_state.send_if_modified(|current| {
                    if *current == state || *current == IceConnectionState::Closed {
                        return false;
                    }
                    *current = state;
                    true
                });
                if !changed {
                    return;
                }

                info!("Session {} ICE state: {}", self.id, state);
                self.events.publish(SessionEvent::IceStateChanged {
                    session_id: self.id.clone(),
                    state,
                });

                if state == IceConnectionState::Failed {
                    warn!("Session {}: ICE connection failed", self.id);
                    self.events.publish(SessionEvent::ConnectionFailed {
                        session_id: self.id.clone(),
                        reason: "ICE connection failed".to_string(),
                    });
                    if self.close_on_failure {
                        let _ = self.close().await;
                    }
                }
            }
        }
    }
}

/// Dropping an open session releases its tracks and closes the transport on
/// the current runtime. Without a runtime the transport is only dropped;
/// call [`PeerSession::close`] to tear down deterministically.
impl Drop for PeerSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        warn!("Session {} dropped without close", self.id);
        for track in self.local_tracks.get_mut().iter() {
            track.stop();
            track.release();
        }

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let transport = self.transport.clone();
            let id = self.id.clone();
            handle.spawn(async move {
                if let Err(e) = transport.close().await {
                    warn!("Session {}: failed to close connection: {}", id, e);
                }
            });
        }
    }
}
